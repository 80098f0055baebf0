use std::path::PathBuf;
use std::time::{Duration, Instant};

use panel_proto::protocol::{steps_to_ticks, PanelCommand};
use panel_proto::state::{clamp_volume, PersistedState, MAX_VOLUME};
use panel_proto::stations::{Station, StationList};
use tracing::{info, warn};

use crate::error::PanelResult;
use crate::player::{NowPlaying, PlayerBackend};
use crate::serial::SerialLink;

/// Maps station indices and volume onto the player and keeps the state file
/// in step with what the user picked.
pub struct Playback {
    player: PlayerBackend,
    stations: StationList,
    state_file: PathBuf,
    current_index: usize,
    volume: u8,
    is_playing: bool,
    now_playing: NowPlaying,
    now_playing_at: Option<Instant>,
    now_playing_ttl: Duration,
}

impl Playback {
    pub fn new(
        player: PlayerBackend,
        stations: StationList,
        state_file: PathBuf,
        now_playing_ttl: Duration,
    ) -> Self {
        Self {
            player,
            stations,
            state_file,
            current_index: 0,
            volume: MAX_VOLUME,
            is_playing: false,
            now_playing: NowPlaying::default(),
            now_playing_at: None,
            now_playing_ttl,
        }
    }

    /// Open the player session, load every station into its queue and restore
    /// the saved station and volume.  The encoder is moved to the restored
    /// station so the panel and the player agree.
    pub async fn initialize(&mut self, link: &mut SerialLink) -> PanelResult<()> {
        self.player.connect().await?;

        let urls: Vec<&str> = self.stations.all().iter().map(Station::url).collect();
        self.player.load_playlist(&urls).await?;

        // Rebuilding the queue stopped playback
        self.is_playing = false;
        self.now_playing = NowPlaying::default();
        self.now_playing_at = None;

        if let Some(state) = PersistedState::load(&self.state_file) {
            self.current_index = state.station_index;
            self.volume = state.volume;
            info!(
                "Restored station {} at volume {}",
                self.current_index, self.volume
            );
            link.send(&PanelCommand::SetEncoder(steps_to_ticks(
                self.current_index as i64,
            )))
            .await?;
            self.player.set_volume(self.volume).await?;
        }
        Ok(())
    }

    pub fn disconnect(&mut self) {
        self.player.disconnect();
    }

    /// Play the station at `index`.  An index outside the list resets the
    /// selection to the first station without touching the player.
    pub async fn play(&mut self, index: i64) -> PanelResult<()> {
        let valid = usize::try_from(index)
            .ok()
            .filter(|&i| i < self.stations.len());
        match valid {
            Some(i) => {
                self.player.play(i).await?;
                self.is_playing = true;
                self.current_index = i;
                self.now_playing_at = None;
                if let Some(station) = self.stations.get(i) {
                    info!("Playing station {}: {}", i, station.name());
                }
            }
            None => {
                warn!("Station {} does not exist, selecting the first one", index);
                self.current_index = 0;
            }
        }
        self.persist()
    }

    pub async fn stop(&mut self) -> PanelResult<()> {
        self.player.stop().await?;
        self.is_playing = false;
        Ok(())
    }

    pub async fn set_volume(&mut self, volume: i64) -> PanelResult<()> {
        self.volume = clamp_volume(volume);
        self.persist()?;
        self.player.set_volume(self.volume).await
    }

    pub fn station_count(&self) -> usize {
        self.stations.len()
    }

    pub fn station(&self, index: usize) -> Option<&Station> {
        self.stations.get(index)
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    /// Title and stream name, fetched from the player at most once per refresh
    /// interval.  Empty while nothing plays.
    pub async fn now_playing(&mut self, now: Instant) -> PanelResult<&NowPlaying> {
        let stale = match self.now_playing_at {
            Some(at) => now.saturating_duration_since(at) >= self.now_playing_ttl,
            None => true,
        };
        if stale {
            self.now_playing = if self.is_playing {
                self.player.now_playing().await?
            } else {
                NowPlaying::default()
            };
            self.now_playing_at = Some(now);
        }
        Ok(&self.now_playing)
    }

    fn persist(&self) -> PanelResult<()> {
        let state = PersistedState {
            station_index: self.current_index,
            volume: self.volume,
        };
        state.save(&self.state_file)?;
        Ok(())
    }
}
