use std::fmt;
use std::path::Path;

pub const MAX_VOLUME: u8 = 100;

/// Station and volume that survive a restart.  Stored as a single
/// `<station_index>:<volume>` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistedState {
    pub station_index: usize,
    pub volume: u8,
}

impl PersistedState {
    pub fn new(station_index: usize, volume: i64) -> Self {
        Self {
            station_index,
            volume: clamp_volume(volume),
        }
    }

    /// Parse the state line.  Anything that is not two integers separated by
    /// `:` is treated as "no saved state".
    pub fn parse(content: &str) -> Option<Self> {
        let (index, volume) = content.trim().split_once(':')?;
        let index = index.trim().parse::<i64>().ok()?;
        let volume = volume.trim().parse::<i64>().ok()?;
        Some(Self::new(usize::try_from(index).unwrap_or(0), volume))
    }

    /// Returns `None` when the file is missing or unreadable.
    pub fn load(path: &Path) -> Option<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let state = Self::parse(&content);
                if state.is_none() {
                    tracing::warn!("Ignoring malformed state file {:?}", path);
                }
                state
            }
            Err(_) => None,
        }
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, self.to_string())
    }
}

impl fmt::Display for PersistedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.station_index, self.volume)
    }
}

pub fn clamp_volume(volume: i64) -> u8 {
    volume.clamp(0, MAX_VOLUME as i64) as u8
}
