use std::time::Duration;

use panel_proto::config::{PlayerConfig, PlayerTransport};
use tracing::debug;

use crate::error::PanelResult;
use crate::mpc::MpcClient;
use crate::mpd::MpdClient;

/// Title and stream name of whatever is playing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NowPlaying {
    pub title: String,
    pub name: String,
}

/// The two ways of driving the player, behind one set of operations.
pub enum PlayerBackend {
    Socket(MpdClient),
    Command(MpcClient),
}

impl PlayerBackend {
    pub fn from_config(config: &PlayerConfig) -> Self {
        match config.transport {
            PlayerTransport::Socket => PlayerBackend::Socket(MpdClient::new(
                config.host.clone(),
                config.port,
                config.password.clone(),
                Duration::from_millis(config.io_timeout_ms),
            )),
            PlayerTransport::Mpc => PlayerBackend::Command(MpcClient::new(
                config.mpc_binary.clone(),
                config.host.clone(),
                config.port,
                config.password.clone(),
            )),
        }
    }

    pub async fn connect(&mut self) -> PanelResult<()> {
        match self {
            PlayerBackend::Socket(client) => client.open().await,
            PlayerBackend::Command(client) => client.connect().await,
        }
    }

    pub fn disconnect(&mut self) {
        match self {
            PlayerBackend::Socket(client) => client.disconnect(),
            PlayerBackend::Command(client) => client.disconnect(),
        }
    }

    /// Stop, then replace the player's queue with `urls` in order.
    pub async fn load_playlist(&mut self, urls: &[&str]) -> PanelResult<()> {
        debug!("Loading {} stations into the player", urls.len());
        match self {
            PlayerBackend::Socket(client) => {
                client.stop().await?;
                client.playlist_clear().await?;
                client.playlist_add_bulk(urls).await
            }
            PlayerBackend::Command(client) => {
                client.stop().await?;
                client.playlist_clear().await?;
                for url in urls {
                    client.playlist_add(url).await?;
                }
                Ok(())
            }
        }
    }

    /// Start the queue entry at `index` (0-based).
    pub async fn play(&mut self, index: usize) -> PanelResult<()> {
        match self {
            PlayerBackend::Socket(client) => client.play(index).await,
            PlayerBackend::Command(client) => client.play(index).await,
        }
    }

    pub async fn stop(&mut self) -> PanelResult<()> {
        match self {
            PlayerBackend::Socket(client) => client.stop().await,
            PlayerBackend::Command(client) => client.stop().await,
        }
    }

    pub async fn pause(&mut self) -> PanelResult<()> {
        match self {
            PlayerBackend::Socket(client) => client.pause().await,
            PlayerBackend::Command(client) => client.pause().await,
        }
    }

    pub async fn set_volume(&mut self, volume: u8) -> PanelResult<()> {
        match self {
            PlayerBackend::Socket(client) => client.set_volume(volume as i64).await.map(|_| ()),
            PlayerBackend::Command(client) => client.set_volume(volume as i64).await.map(|_| ()),
        }
    }

    pub async fn now_playing(&mut self) -> PanelResult<NowPlaying> {
        match self {
            PlayerBackend::Socket(client) => {
                let mut song = client.current_song().await?;
                Ok(NowPlaying {
                    title: song.remove("Title").unwrap_or_default(),
                    name: song.remove("Name").unwrap_or_default(),
                })
            }
            PlayerBackend::Command(client) => {
                let (title, name) = client.current().await?;
                Ok(NowPlaying { title, name })
            }
        }
    }
}
