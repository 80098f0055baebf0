/// Panel control loop.
///
/// ```text
///   poll_once ──► READ: ──► changed? ──► button edge (debounced) ──► enter()
///                                   └──► render() ──► Display::update
///             └──► commit() when the knob has rested long enough
///   any Err  ──► recover(): close everything, reinitialize, retry with backoff
/// ```
///
/// Everything runs on one task; the `Panel` owns the serial link, the
/// display mirror and the player, so nothing is shared or locked.
use std::time::{Duration, Instant};

use panel_proto::config::{Config, SerialConfig, TimingConfig};
use panel_proto::protocol::{ticks_to_steps, PanelCommand, PanelReply};
use panel_proto::stations::StationList;
use tracing::{error, info, warn};

use crate::display::Display;
use crate::error::{PanelError, PanelResult};
use crate::playback::Playback;
use crate::player::PlayerBackend;
use crate::screen::UiState;
use crate::serial::SerialLink;

#[derive(Debug, Clone, Copy)]
pub struct Timing {
    pub poll_interval: Duration,
    pub failure_backoff: Duration,
    pub button_debounce: Duration,
    pub station_commit: Duration,
    pub volume_commit: Duration,
}

impl From<&TimingConfig> for Timing {
    fn from(config: &TimingConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            failure_backoff: Duration::from_millis(config.failure_backoff_ms),
            button_debounce: Duration::from_millis(config.button_debounce_ms),
            station_commit: Duration::from_millis(config.station_commit_ms),
            volume_commit: Duration::from_millis(config.volume_commit_ms),
        }
    }
}

pub struct Panel {
    pub(crate) link: SerialLink,
    pub(crate) display: Display,
    pub(crate) playback: Playback,
    pub(crate) timing: Timing,
    pub(crate) ui: UiState,
    /// Logical encoder value in the active screen's domain.
    pub(crate) encoder: i64,
    /// Last time the board reported something different.
    pub(crate) last_change: Instant,
    serial_config: SerialConfig,
    last_press: Option<Instant>,
    last_reading: String,
    button: bool,
}

impl Panel {
    pub fn new(config: &Config, stations: StationList) -> Self {
        Self::with_link(config, stations, SerialLink::system())
    }

    pub fn with_link(config: &Config, stations: StationList, link: SerialLink) -> Self {
        let playback = Playback::new(
            PlayerBackend::from_config(&config.player),
            stations,
            config.daemon.state_file.clone(),
            Duration::from_millis(config.player.now_playing_refresh_ms),
        );
        Self {
            link,
            display: Display::new(),
            playback,
            timing: Timing::from(&config.timing),
            ui: UiState::Playing,
            encoder: 0,
            last_change: Instant::now(),
            serial_config: config.serial.clone(),
            last_press: None,
            last_reading: String::new(),
            button: false,
        }
    }

    pub fn ui_state(&self) -> UiState {
        self.ui
    }

    pub fn encoder_value(&self) -> i64 {
        self.encoder
    }

    pub fn playback(&self) -> &Playback {
        &self.playback
    }

    pub fn display(&self) -> &Display {
        &self.display
    }

    /// Tear down the serial link and the player session and bring everything
    /// back up from scratch, ending on the Playing screen.
    pub async fn reinitialize(&mut self) -> PanelResult<()> {
        self.link.close();
        self.playback.disconnect();

        self.link.configure(&self.serial_config)?;
        self.link.open().await?;
        self.playback.initialize(&mut self.link).await?;
        self.display.init(&mut self.link).await?;

        self.ui = UiState::Playing;
        self.last_reading.clear();
        self.button = false;
        self.last_press = None;
        self.last_change = Instant::now();
        let ui = self.ui;
        ui.enter(self).await?;

        info!(
            "Panel ready: {} stations, station {} at volume {}",
            self.playback.station_count(),
            self.playback.current_index(),
            self.playback.volume()
        );
        Ok(())
    }

    /// One pass of the control loop.
    pub async fn poll_once(&mut self, now: Instant) -> PanelResult<()> {
        let reading = self.link.query(&PanelCommand::Read).await?;
        let mut mode_changed = false;

        if !reading.is_empty() && reading != self.last_reading {
            self.last_change = now;
            self.apply_reading(&reading);
            self.last_reading = reading;

            if self.button && self.debounce_elapsed(now) {
                self.last_press = Some(now);
                self.ui = self.ui.toggled();
                mode_changed = true;
                info!("Switched to {:?} screen", self.ui);
            }

            let ui = self.ui;
            if mode_changed {
                ui.enter(self).await?;
            }
            ui.render(self, now).await?;
        }

        if !mode_changed {
            let ui = self.ui;
            ui.commit(self, now).await?;
        }
        Ok(())
    }

    /// A garbled encoder field keeps the previous value; a garbled button
    /// reads as released.
    fn apply_reading(&mut self, reading: &str) {
        match PanelReply::parse(reading) {
            Some(PanelReply::Values { ticks, button }) => {
                if let Some(ticks) = ticks {
                    self.encoder = ticks_to_steps(ticks);
                }
                self.button = button.is_some_and(|level| level != 0);
            }
            _ => warn!("Unexpected reply to READ: {:?}", reading),
        }
    }

    fn debounce_elapsed(&self, now: Instant) -> bool {
        match self.last_press {
            Some(at) => now.saturating_duration_since(at) >= self.timing.button_debounce,
            None => true,
        }
    }

    /// Reinitialize until it works.  `cause` is the failure that got us here.
    pub async fn recover(&mut self, cause: Option<PanelError>) {
        if let Some(err) = cause {
            log_failure(&err);
        }
        loop {
            match self.reinitialize().await {
                Ok(()) => return,
                Err(err) => {
                    error!(
                        "Initialisation failed: {}; retrying in {:?}",
                        err, self.timing.failure_backoff
                    );
                    tokio::time::sleep(self.timing.failure_backoff).await;
                }
            }
        }
    }

    /// Run forever.
    pub async fn run(&mut self) {
        self.recover(None).await;
        loop {
            if let Err(err) = self.poll_once(Instant::now()).await {
                self.recover(Some(err)).await;
            }
            tokio::time::sleep(self.timing.poll_interval).await;
        }
    }
}

fn log_failure(err: &PanelError) {
    match err {
        PanelError::Connection(_) | PanelError::Auth(_) => {
            warn!("Player session lost: {}", err)
        }
        PanelError::DeviceTimeout(_) | PanelError::Configuration(_) => {
            warn!("Panel link failed: {}", err)
        }
        PanelError::Protocol { .. }
        | PanelError::Compatibility { .. }
        | PanelError::InvalidArgument(_) => error!("Player rejected a command: {}", err),
        PanelError::Io(_) => error!("I/O failure: {}", err),
    }
    info!("Reinitialising panel");
}
