//! Character LCD mirror.
//!
//! Keeps the intended screen contents locally and pushes them to the board
//! only when something changed, so the serial line stays quiet while the
//! user is idle.
use panel_proto::protocol::{PanelCommand, PanelReply};
use panel_proto::state::MAX_VOLUME;
use tracing::{debug, info, warn};

use crate::error::PanelResult;
use crate::serial::SerialLink;

pub const DEFAULT_COLS: usize = 16;
pub const DEFAULT_ROWS: usize = 2;

/// Panels the firmware ships with.  Anything else is treated as the default.
const SUPPORTED_GEOMETRIES: &[(usize, usize)] = &[(16, 2), (16, 4), (20, 4)];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    /// One string per row.
    Text,
    /// Label on the second-to-last row, bar graph on the last.
    Bar,
}

pub struct Display {
    cols: usize,
    rows: usize,
    mode: DisplayMode,
    lines: Vec<String>,
    bar_label: String,
    bar_value: u8,
    dirty: bool,
}

impl Default for Display {
    fn default() -> Self {
        Self::new()
    }
}

impl Display {
    pub fn new() -> Self {
        Self {
            cols: DEFAULT_COLS,
            rows: DEFAULT_ROWS,
            mode: DisplayMode::Text,
            lines: vec![String::new(); DEFAULT_ROWS],
            bar_label: String::new(),
            bar_value: 0,
            dirty: false,
        }
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn mode(&self) -> DisplayMode {
        self.mode
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn line(&self, index: usize) -> Option<&str> {
        self.lines.get(index).map(String::as_str)
    }

    /// Query the geometry and blank every row.  The blank screen is pushed on
    /// the next `update()`.
    pub async fn init(&mut self, link: &mut SerialLink) -> PanelResult<()> {
        self.configure_geometry(link).await?;
        self.mode = DisplayMode::Text;
        self.lines = vec![String::new(); self.rows];
        self.bar_label.clear();
        self.bar_value = 0;
        self.dirty = true;
        Ok(())
    }

    /// Ask the board for its geometry.  Returns false when it stayed at the
    /// 16×2 default (no reply, or a size we do not lay out for).
    pub async fn configure_geometry(&mut self, link: &mut SerialLink) -> PanelResult<bool> {
        self.resize(DEFAULT_COLS, DEFAULT_ROWS);

        let reply = link.query(&PanelCommand::QueryConfig).await?;
        match PanelReply::parse(&reply) {
            Some(PanelReply::Display { cols, rows })
                if SUPPORTED_GEOMETRIES.contains(&(cols, rows)) =>
            {
                self.resize(cols, rows);
                info!("Display is {}x{}", cols, rows);
                Ok(true)
            }
            Some(PanelReply::Display { cols, rows }) => {
                warn!(
                    "Unsupported display {}x{}, using {}x{}",
                    cols, rows, DEFAULT_COLS, DEFAULT_ROWS
                );
                Ok(false)
            }
            _ => {
                debug!("No display geometry reply ({:?}), using default", reply);
                Ok(false)
            }
        }
    }

    fn resize(&mut self, cols: usize, rows: usize) {
        if (cols, rows) != (self.cols, self.rows) {
            self.dirty = true;
        }
        self.cols = cols;
        self.rows = rows;
        self.lines.resize(rows, String::new());
    }

    pub fn set_mode(&mut self, mode: DisplayMode) {
        if self.mode != mode {
            self.mode = mode;
            self.dirty = true;
        }
    }

    /// Set one text row.  Rows past the bottom are ignored.
    pub fn set_line(&mut self, index: usize, text: &str) {
        self.set_mode(DisplayMode::Text);
        if let Some(line) = self.lines.get_mut(index) {
            if line != text {
                *line = text.to_string();
                self.dirty = true;
            }
        }
    }

    /// Set every text row; rows without an entry are blanked.
    pub fn set_lines<S: AsRef<str>>(&mut self, lines: &[S]) {
        for row in 0..self.rows {
            let text = lines.get(row).map(AsRef::as_ref).unwrap_or("");
            self.set_line(row, text);
        }
    }

    pub fn set_bar(&mut self, label: &str, value: u8) {
        self.set_mode(DisplayMode::Bar);
        let value = value.min(MAX_VOLUME);
        if self.bar_label != label || self.bar_value != value {
            self.bar_label = label.to_string();
            self.bar_value = value;
            self.dirty = true;
        }
    }

    /// Truncate or right-pad to exactly one row.
    fn fit(&self, text: &str) -> String {
        let truncated: String = text.chars().take(self.cols).collect();
        format!("{:<width$}", truncated, width = self.cols)
    }

    /// Commands that redraw the whole screen for the current mode.
    pub fn render_commands(&self) -> Vec<PanelCommand> {
        match self.mode {
            DisplayMode::Text => self
                .lines
                .iter()
                .enumerate()
                .map(|(i, line)| PanelCommand::Text {
                    row: i + 1,
                    text: self.fit(line),
                })
                .collect(),
            DisplayMode::Bar => {
                let label_row = self.rows - 1;
                let mut commands: Vec<PanelCommand> = (1..label_row)
                    .map(|row| PanelCommand::Text {
                        row,
                        text: self.fit(""),
                    })
                    .collect();
                commands.push(PanelCommand::Text {
                    row: label_row,
                    text: self.fit(&self.bar_label),
                });
                commands.push(PanelCommand::Bar {
                    row: self.rows,
                    value: self.bar_value,
                });
                commands
            }
        }
    }

    /// Push the screen if it changed.  Returns whether anything was sent.
    pub async fn update(&mut self, link: &mut SerialLink) -> PanelResult<bool> {
        if !self.dirty {
            return Ok(false);
        }
        for command in self.render_commands() {
            link.send(&command).await?;
        }
        self.dirty = false;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeBoard;
    use panel_proto::config::SerialConfig;

    async fn open_link(board: &FakeBoard) -> SerialLink {
        let mut link = board.link();
        link.configure(&SerialConfig {
            boot_settle_ms: 0,
            write_settle_ms: 0,
            ..SerialConfig::default()
        })
        .unwrap();
        link.open().await.unwrap();
        link
    }

    #[test]
    fn test_fit_truncates_and_pads() {
        let display = Display::new();
        assert_eq!(display.fit("abc"), "abc             ");
        assert_eq!(display.fit("Radio Paradise Main Mix"), "Radio Paradise M");
        assert_eq!(display.fit("ÅÄÖ").chars().count(), 16);
    }

    #[test]
    fn test_text_render() {
        let mut display = Display::new();
        display.set_lines(&["Station 0", "Playing: 1 / 5"]);
        assert!(display.is_dirty());
        assert_eq!(
            display.render_commands(),
            [
                PanelCommand::Text {
                    row: 1,
                    text: "Station 0       ".into()
                },
                PanelCommand::Text {
                    row: 2,
                    text: "Playing: 1 / 5  ".into()
                },
            ]
        );
    }

    #[test]
    fn test_bar_render_on_two_rows() {
        let mut display = Display::new();
        display.set_bar("Volume: 45%", 45);
        assert_eq!(display.mode(), DisplayMode::Bar);
        assert_eq!(
            display.render_commands(),
            [
                PanelCommand::Text {
                    row: 1,
                    text: "Volume: 45%     ".into()
                },
                PanelCommand::Bar { row: 2, value: 45 },
            ]
        );
    }

    #[test]
    fn test_unchanged_content_stays_clean() {
        let mut display = Display::new();
        display.set_lines(&["a", "b"]);
        display.dirty = false;
        display.set_lines(&["a", "b"]);
        display.set_line(7, "off screen");
        assert!(!display.is_dirty());
        display.set_line(1, "c");
        assert!(display.is_dirty());
    }

    #[tokio::test]
    async fn test_four_row_bar_layout() {
        let board = FakeBoard::with_display(16, 4);
        let mut link = open_link(&board).await;
        let mut display = Display::new();

        display.init(&mut link).await.unwrap();
        assert_eq!((display.cols(), display.rows()), (16, 4));
        assert!(display.update(&mut link).await.unwrap());
        board.take_written();

        display.set_bar("Volume: 45%", 45);
        assert!(display.update(&mut link).await.unwrap());
        assert_eq!(
            board.take_written(),
            [
                "TEXT1:                ",
                "TEXT2:                ",
                "TEXT3:Volume: 45%     ",
                "BAR4:45",
            ]
        );

        // Nothing changed: nothing sent
        display.set_bar("Volume: 45%", 45);
        assert!(!display.update(&mut link).await.unwrap());
        assert!(board.take_written().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_geometry_keeps_default() {
        let board = FakeBoard::with_display(40, 2);
        let mut link = open_link(&board).await;
        let mut display = Display::new();
        assert!(!display.configure_geometry(&mut link).await.unwrap());
        assert_eq!((display.cols(), display.rows()), (16, 2));

        let silent = FakeBoard::new();
        let mut link = open_link(&silent).await;
        assert!(!display.configure_geometry(&mut link).await.unwrap());
        assert_eq!((display.cols(), display.rows()), (16, 2));
    }
}
