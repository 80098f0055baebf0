use thiserror::Error;

pub type PanelResult<T> = Result<T, PanelError>;

#[derive(Error, Debug)]
pub enum PanelError {
    /// Cannot reach the player, or the session was lost.
    #[error("player connection error: {0}")]
    Connection(String),
    #[error("player authentication failed: {0}")]
    Auth(String),
    /// The connected player version does not support the command.
    #[error("command '{command}' unsupported by player {version}: {reason}")]
    Compatibility {
        command: String,
        version: String,
        reason: String,
    },
    /// The platform rejected a serial setting.
    #[error("serial configuration rejected: {0}")]
    Configuration(String),
    /// The player answered with an error line.
    #[error("player error: {message}")]
    Protocol { message: String },
    /// The panel board stopped answering.
    #[error("panel device timeout: {0}")]
    DeviceTimeout(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
