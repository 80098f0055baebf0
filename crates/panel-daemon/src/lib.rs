pub mod display;
pub mod error;
pub mod mpc;
pub mod mpd;
pub mod playback;
pub mod player;
pub mod screen;
pub mod serial;
pub mod supervisor;

#[cfg(test)]
mod testing;

pub use error::{PanelError, PanelResult};
