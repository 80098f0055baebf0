//! Line protocol spoken with the panel microcontroller.
//!
//! Every message is one ASCII line.  Requests go host → board, replies come
//! back only for `READ:` and `CFG:`:
//!
//! ```text
//!   READ:                 → VALUES:<ticks>:<button>
//!   CFG:                  → DISPLAY:<cols>:<rows>
//!   TEXT<row>:<text>        (row is 1-based)
//!   BAR<row>:<0-100>
//!   SET_ENC:<ticks>
//!   LED_RED:<0|1>
//!   LED_GREEN:<0|1>
//! ```
use std::fmt;

/// Raw encoder ticks per logical step.  Fixed by the board's encoder resolution.
pub const TICKS_PER_STEP: i64 = 4;

pub const VALUES_TAG: &str = "VALUES";
pub const DISPLAY_TAG: &str = "DISPLAY";

/// Host → board commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelCommand {
    /// Poll encoder and button state.
    Read,
    /// Ask for the display geometry.
    QueryConfig,
    Text { row: usize, text: String },
    Bar { row: usize, value: u8 },
    /// Force the hardware encoder count (raw ticks).
    SetEncoder(i64),
    LedRed(bool),
    LedGreen(bool),
}

impl PanelCommand {
    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for PanelCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PanelCommand::Read => write!(f, "READ:"),
            PanelCommand::QueryConfig => write!(f, "CFG:"),
            PanelCommand::Text { row, text } => write!(f, "TEXT{}:{}", row, text),
            PanelCommand::Bar { row, value } => write!(f, "BAR{}:{}", row, value),
            PanelCommand::SetEncoder(ticks) => write!(f, "SET_ENC:{}", ticks),
            PanelCommand::LedRed(on) => write!(f, "LED_RED:{}", u8::from(*on)),
            PanelCommand::LedGreen(on) => write!(f, "LED_GREEN:{}", u8::from(*on)),
        }
    }
}

/// Board → host replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelReply {
    /// Encoder ticks and button level.  A field the board left out (or sent
    /// garbled) is `None`.
    Values {
        ticks: Option<i64>,
        button: Option<i64>,
    },
    Display { cols: usize, rows: usize },
}

impl PanelReply {
    /// Parse one reply line.  Returns `None` for empty or unknown lines.
    pub fn parse(line: &str) -> Option<Self> {
        let mut fields = line.trim().split(':');
        match fields.next()? {
            VALUES_TAG => {
                let ticks = fields.next().and_then(|v| v.trim().parse().ok());
                let button = fields.next().and_then(|v| v.trim().parse().ok());
                Some(PanelReply::Values { ticks, button })
            }
            DISPLAY_TAG => {
                let cols = fields.next()?.trim().parse().ok()?;
                let rows = fields.next()?.trim().parse().ok()?;
                Some(PanelReply::Display { cols, rows })
            }
            _ => None,
        }
    }
}

/// Logical encoder value for a raw tick count: `round(ticks / 4)`, halves away from zero.
pub fn ticks_to_steps(ticks: i64) -> i64 {
    (ticks as f64 / TICKS_PER_STEP as f64).round() as i64
}

pub fn steps_to_ticks(steps: i64) -> i64 {
    steps * TICKS_PER_STEP
}
