//! The two panel screens.
//!
//! Playing: the encoder browses stations, a station is tuned once the knob
//! rests on it.  Volume: the encoder is the volume, applied almost at once.
//! The button flips between them.
use std::time::Instant;

use panel_proto::protocol::{steps_to_ticks, PanelCommand};
use panel_proto::state::MAX_VOLUME;
use tracing::debug;

use crate::error::PanelResult;
use crate::supervisor::Panel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiState {
    Playing,
    Volume,
}

impl UiState {
    pub fn toggled(self) -> Self {
        match self {
            UiState::Playing => UiState::Volume,
            UiState::Volume => UiState::Playing,
        }
    }

    /// Inclusive encoder range for this screen.
    pub fn domain(self, panel: &Panel) -> (i64, i64) {
        match self {
            UiState::Playing => (0, (panel.playback.station_count() as i64 - 1).max(0)),
            UiState::Volume => (0, MAX_VOLUME as i64),
        }
    }

    /// Point the encoder at the current station or volume and switch the LEDs.
    pub async fn enter(self, panel: &mut Panel) -> PanelResult<()> {
        let value = match self {
            UiState::Playing => panel.playback.current_index() as i64,
            UiState::Volume => panel.playback.volume() as i64,
        };
        let (low, high) = self.domain(panel);
        panel.encoder = value.clamp(low, high);
        panel
            .link
            .send(&PanelCommand::SetEncoder(steps_to_ticks(panel.encoder)))
            .await?;

        let (red, green) = match self {
            UiState::Playing => (false, true),
            UiState::Volume => (true, false),
        };
        panel.link.send(&PanelCommand::LedRed(red)).await?;
        panel.link.send(&PanelCommand::LedGreen(green)).await?;
        Ok(())
    }

    /// Bring the screen in line with the encoder and flush it if it changed.
    pub async fn render(self, panel: &mut Panel, now: Instant) -> PanelResult<()> {
        self.constrain_encoder(panel).await?;

        match self {
            UiState::Playing => render_playing(panel, now).await?,
            UiState::Volume => {
                let volume = panel.encoder;
                panel
                    .display
                    .set_bar(&format!("Volume: {}%", volume), volume as u8);
            }
        }

        panel.display.update(&mut panel.link).await?;
        Ok(())
    }

    /// Apply the encoder value once it has been still long enough.
    pub async fn commit(self, panel: &mut Panel, now: Instant) -> PanelResult<()> {
        let idle = now.saturating_duration_since(panel.last_change);
        match self {
            UiState::Playing => {
                if panel.playback.station_count() == 0 {
                    return Ok(());
                }
                let pending = !panel.playback.is_playing()
                    || panel.playback.current_index() as i64 != panel.encoder;
                if pending && idle >= panel.timing.station_commit {
                    panel.playback.play(panel.encoder).await?;
                }
            }
            UiState::Volume => {
                let pending = panel.playback.volume() as i64 != panel.encoder;
                if pending && idle >= panel.timing.volume_commit {
                    panel.playback.set_volume(panel.encoder).await?;
                }
            }
        }
        Ok(())
    }

    /// Clamp into the domain; the hardware counter is corrected when it was out.
    async fn constrain_encoder(self, panel: &mut Panel) -> PanelResult<()> {
        let (low, high) = self.domain(panel);
        let clamped = panel.encoder.clamp(low, high);
        if clamped != panel.encoder {
            debug!("Encoder {} outside {}..={}, clamping", panel.encoder, low, high);
            panel.encoder = clamped;
            panel
                .link
                .send(&PanelCommand::SetEncoder(steps_to_ticks(clamped)))
                .await?;
        }
        Ok(())
    }
}

async fn render_playing(panel: &mut Panel, now: Instant) -> PanelResult<()> {
    let count = panel.playback.station_count();
    let name = match usize::try_from(panel.encoder)
        .ok()
        .and_then(|i| panel.playback.station(i))
    {
        Some(station) => station.name().to_string(),
        None => {
            panel.display.set_lines(&["No stations"]);
            return Ok(());
        }
    };
    let position = format!("Playing: {} / {}", panel.encoder + 1, count);

    if panel.display.rows() >= 4 {
        let now_playing = panel.playback.now_playing(now).await?.clone();
        panel
            .display
            .set_lines(&[name, now_playing.title, now_playing.name, position]);
    } else {
        panel.display.set_lines(&[name, position]);
    }
    Ok(())
}
