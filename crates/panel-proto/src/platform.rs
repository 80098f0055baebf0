use std::path::PathBuf;

/// Environment variable that points the daemon at a specific config file.
pub const CONFIG_ENV: &str = "RADIO_PANEL_CONFIG";

const APP_DIR: &str = "radio-panel";

pub fn data_dir() -> PathBuf {
    // Use ~/.local/share/radio-panel/ (XDG standard) on every unix, including macOS
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".local")
            .join("share")
            .join(APP_DIR)
    }
    #[cfg(windows)]
    {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }
}

pub fn config_dir() -> PathBuf {
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join(APP_DIR)
    }

    #[cfg(windows)]
    {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }
}

/// Default serial device for the panel's USB-serial adapter.
pub fn default_serial_device() -> String {
    #[cfg(target_os = "macos")]
    {
        "/dev/cu.usbserial".to_string()
    }
    #[cfg(all(unix, not(target_os = "macos")))]
    {
        "/dev/ttyUSB0".to_string()
    }
    #[cfg(windows)]
    {
        "COM3".to_string()
    }
}
