use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::platform;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub stations: StationsConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub timing: TimingConfig,
}

/// Serial link to the panel microcontroller.
///
/// Parity and flow control stay strings here; the link validates them when it
/// is configured so a bad value surfaces as a configuration error instead of a
/// config-file parse failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    #[serde(default = "platform::default_serial_device")]
    pub device: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// `none`, `odd` or `even`
    #[serde(default = "default_parity")]
    pub parity: String,
    #[serde(default = "default_char_length")]
    pub char_length: u8,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    /// `none`, `software` (xon/xoff) or `hardware` (rts/cts)
    #[serde(default = "default_flow_control")]
    pub flow_control: String,
    /// The board resets when the port opens; wait this long before talking to it.
    #[serde(default = "default_boot_settle_ms")]
    pub boot_settle_ms: u64,
    /// Pause after every written line so the board can process it.
    #[serde(default = "default_write_settle_ms")]
    pub write_settle_ms: u64,
    /// Per-read timeout while polling for reply bytes.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Consecutive empty replies tolerated before the device is considered gone.
    #[serde(default = "default_max_silent_reads")]
    pub max_silent_reads: u32,
}

/// How the daemon reaches the music player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlayerTransport {
    /// Speak the player's text protocol over TCP.
    #[default]
    Socket,
    /// Drive the `mpc` command-line helper.
    Mpc,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    #[serde(default)]
    pub transport: PlayerTransport,
    #[serde(default = "default_player_host")]
    pub host: String,
    #[serde(default = "default_player_port")]
    pub port: u16,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_mpc_binary")]
    pub mpc_binary: PathBuf,
    /// Upper bound for connecting and for waiting on any single reply line.
    #[serde(default = "default_io_timeout_ms")]
    pub io_timeout_ms: u64,
    /// Minimum age of the cached now-playing title before it is fetched again.
    #[serde(default = "default_now_playing_refresh_ms")]
    pub now_playing_refresh_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationsConfig {
    /// Extended M3U station list.  Defaults to `$XDG_CONFIG_HOME/radio-panel/radio.m3u`.
    #[serde(default = "default_playlist")]
    pub playlist: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Two-field `<station>:<volume>` state file.
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
}

/// Control loop pacing.  The defaults match the panel firmware and are rarely
/// worth changing outside tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_failure_backoff_ms")]
    pub failure_backoff_ms: u64,
    #[serde(default = "default_button_debounce_ms")]
    pub button_debounce_ms: u64,
    #[serde(default = "default_station_commit_ms")]
    pub station_commit_ms: u64,
    #[serde(default = "default_volume_commit_ms")]
    pub volume_commit_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            device: platform::default_serial_device(),
            baud_rate: default_baud_rate(),
            parity: default_parity(),
            char_length: default_char_length(),
            stop_bits: default_stop_bits(),
            flow_control: default_flow_control(),
            boot_settle_ms: default_boot_settle_ms(),
            write_settle_ms: default_write_settle_ms(),
            read_timeout_ms: default_read_timeout_ms(),
            max_silent_reads: default_max_silent_reads(),
        }
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            transport: PlayerTransport::default(),
            host: default_player_host(),
            port: default_player_port(),
            password: None,
            mpc_binary: default_mpc_binary(),
            io_timeout_ms: default_io_timeout_ms(),
            now_playing_refresh_ms: default_now_playing_refresh_ms(),
        }
    }
}

impl Default for StationsConfig {
    fn default() -> Self {
        Self {
            playlist: default_playlist(),
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            state_file: default_state_file(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            failure_backoff_ms: default_failure_backoff_ms(),
            button_debounce_ms: default_button_debounce_ms(),
            station_commit_ms: default_station_commit_ms(),
            volume_commit_ms: default_volume_commit_ms(),
        }
    }
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_parity() -> String {
    "none".to_string()
}

fn default_char_length() -> u8 {
    8
}

fn default_stop_bits() -> u8 {
    1
}

fn default_flow_control() -> String {
    "none".to_string()
}

fn default_boot_settle_ms() -> u64 {
    2000
}

fn default_write_settle_ms() -> u64 {
    100
}

fn default_read_timeout_ms() -> u64 {
    10
}

fn default_max_silent_reads() -> u32 {
    50
}

fn default_player_host() -> String {
    "127.0.0.1".to_string()
}

fn default_player_port() -> u16 {
    6600
}

fn default_mpc_binary() -> PathBuf {
    PathBuf::from("mpc")
}

fn default_io_timeout_ms() -> u64 {
    10_000
}

fn default_now_playing_refresh_ms() -> u64 {
    5000
}

fn default_playlist() -> PathBuf {
    platform::config_dir().join("radio.m3u")
}

fn default_state_file() -> PathBuf {
    platform::data_dir().join("current_state.txt")
}

fn default_poll_interval_ms() -> u64 {
    50
}

fn default_failure_backoff_ms() -> u64 {
    2000
}

fn default_button_debounce_ms() -> u64 {
    1000
}

fn default_station_commit_ms() -> u64 {
    500
}

fn default_volume_commit_ms() -> u64 {
    50
}

impl Config {
    /// Load the config from `RADIO_PANEL_CONFIG` or the default location,
    /// writing a default file first if none exists.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(config_path: &Path) -> anyhow::Result<Self> {
        if !config_path.exists() {
            let config = Self::default();
            config.save_to(config_path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(config_path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to(&self, config_path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        match std::env::var_os(platform::CONFIG_ENV) {
            Some(path) if !path.is_empty() => PathBuf::from(path),
            _ => platform::config_dir().join("config.toml"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            player: PlayerConfig::default(),
            stations: StationsConfig::default(),
            daemon: DaemonConfig::default(),
            timing: TimingConfig::default(),
        }
    }
}
