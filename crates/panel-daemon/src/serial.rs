//! Serial link to the panel microcontroller.
//!
//! The board has no framing beyond newlines and answers only `READ:` and
//! `CFG:`.  A reply is considered complete when a read returns less than a
//! full chunk, which at 9600 baud and a short per-read timeout means the
//! board has gone quiet.
use std::io::{Read, Write};
use std::time::Duration;

use panel_proto::config::SerialConfig;
use panel_proto::protocol::PanelCommand;
use serialport::{DataBits, FlowControl, Parity, StopBits};
use tracing::{debug, info};

use crate::error::{PanelError, PanelResult};

const READ_CHUNK: usize = 128;
/// Longest reply accepted from the board; the rest is left for the next read.
const MAX_REPLY_BYTES: usize = 4096;

/// Byte stream to the board.  Implemented for every `Read + Write + Send`
/// (a real `serialport` handle, or an in-memory fake in tests).
pub trait LinkPort: Read + Write + Send {}

impl<T: Read + Write + Send + ?Sized> LinkPort for T {}

/// Opens the physical port.  Split out so the control loop can be driven
/// without hardware.
pub trait PortOpener: Send {
    fn open(&self, settings: &PortSettings) -> PanelResult<Box<dyn LinkPort>>;
}

/// Validated line settings.
#[derive(Debug, Clone, PartialEq)]
pub struct PortSettings {
    pub device: String,
    pub baud_rate: u32,
    pub parity: Parity,
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
    pub flow_control: FlowControl,
    pub read_timeout: Duration,
}

impl PortSettings {
    pub fn from_config(config: &SerialConfig) -> PanelResult<Self> {
        if config.device.trim().is_empty() {
            return Err(PanelError::Configuration("empty device path".to_string()));
        }
        if config.baud_rate == 0 {
            return Err(PanelError::Configuration("baud rate must be positive".to_string()));
        }

        let parity = match config.parity.to_ascii_lowercase().as_str() {
            "none" => Parity::None,
            "odd" => Parity::Odd,
            "even" => Parity::Even,
            other => {
                return Err(PanelError::Configuration(format!(
                    "unknown parity '{}'",
                    other
                )))
            }
        };

        let data_bits = match config.char_length {
            5 => DataBits::Five,
            6 => DataBits::Six,
            7 => DataBits::Seven,
            8 => DataBits::Eight,
            other => {
                return Err(PanelError::Configuration(format!(
                    "character length {} not in 5-8",
                    other
                )))
            }
        };

        let stop_bits = match config.stop_bits {
            1 => StopBits::One,
            2 => StopBits::Two,
            other => {
                return Err(PanelError::Configuration(format!(
                    "stop bits must be 1 or 2, got {}",
                    other
                )))
            }
        };

        let flow_control = match config.flow_control.to_ascii_lowercase().as_str() {
            "none" => FlowControl::None,
            "software" | "xonxoff" => FlowControl::Software,
            "hardware" | "rtscts" => FlowControl::Hardware,
            other => {
                return Err(PanelError::Configuration(format!(
                    "unknown flow control '{}'",
                    other
                )))
            }
        };

        Ok(Self {
            device: config.device.clone(),
            baud_rate: config.baud_rate,
            parity,
            data_bits,
            stop_bits,
            flow_control,
            read_timeout: Duration::from_millis(config.read_timeout_ms),
        })
    }
}

/// Opens real devices through `serialport`.
pub struct SystemPorts;

impl PortOpener for SystemPorts {
    fn open(&self, settings: &PortSettings) -> PanelResult<Box<dyn LinkPort>> {
        let port = serialport::new(settings.device.as_str(), settings.baud_rate)
            .parity(settings.parity)
            .data_bits(settings.data_bits)
            .stop_bits(settings.stop_bits)
            .flow_control(settings.flow_control)
            .timeout(settings.read_timeout)
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::InvalidInput => PanelError::Configuration(format!(
                    "{}: {}",
                    settings.device, e.description
                )),
                _ => PanelError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("cannot open {}: {}", settings.device, e.description),
                )),
            })?;
        Ok(Box::new(port))
    }
}

pub struct SerialLink {
    opener: Box<dyn PortOpener>,
    settings: Option<PortSettings>,
    port: Option<Box<dyn LinkPort>>,
    boot_settle: Duration,
    write_settle: Duration,
    /// Zero disables the silence check.
    max_silent_reads: u32,
    silent_reads: u32,
}

impl SerialLink {
    pub fn new(opener: Box<dyn PortOpener>) -> Self {
        Self {
            opener,
            settings: None,
            port: None,
            boot_settle: Duration::ZERO,
            write_settle: Duration::ZERO,
            max_silent_reads: 0,
            silent_reads: 0,
        }
    }

    pub fn system() -> Self {
        Self::new(Box::new(SystemPorts))
    }

    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }

    pub fn settings(&self) -> Option<&PortSettings> {
        self.settings.as_ref()
    }

    /// Validate and store line settings.  Does nothing while the port is open.
    pub fn configure(&mut self, config: &SerialConfig) -> PanelResult<()> {
        if self.port.is_some() {
            debug!("serial: already open, keeping current settings");
            return Ok(());
        }
        let settings = PortSettings::from_config(config)?;
        self.boot_settle = Duration::from_millis(config.boot_settle_ms);
        self.write_settle = Duration::from_millis(config.write_settle_ms);
        self.max_silent_reads = config.max_silent_reads;
        self.settings = Some(settings);
        Ok(())
    }

    /// Open the device and wait out the board's reset.
    pub async fn open(&mut self) -> PanelResult<()> {
        if self.port.is_some() {
            return Ok(());
        }
        let settings = self.settings.as_ref().ok_or_else(|| {
            PanelError::Configuration("link opened before it was configured".to_string())
        })?;

        info!(
            "serial: opening {} at {} baud",
            settings.device, settings.baud_rate
        );
        let port = self.opener.open(settings)?;
        self.port = Some(port);
        self.silent_reads = 0;

        tokio::time::sleep(self.boot_settle).await;
        Ok(())
    }

    pub fn close(&mut self) {
        if self.port.take().is_some() {
            info!("serial: port closed");
        }
    }

    fn port_mut(&mut self) -> PanelResult<&mut Box<dyn LinkPort>> {
        self.port.as_mut().ok_or_else(|| {
            PanelError::Io(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "serial port is not open",
            ))
        })
    }

    /// Write one line and give the board time to act on it.
    pub async fn send_line(&mut self, text: &str) -> PanelResult<()> {
        let port = self.port_mut()?;
        debug!("serial: > {}", text);

        let mut data = Vec::with_capacity(text.len() + 1);
        data.extend_from_slice(text.as_bytes());
        data.push(b'\n');
        port.write_all(&data)?;
        port.flush()?;

        tokio::time::sleep(self.write_settle).await;
        Ok(())
    }

    pub async fn send(&mut self, command: &PanelCommand) -> PanelResult<()> {
        self.send_line(&command.encode()).await
    }

    /// Send `request` and collect whatever the board answers, trimmed.
    /// An empty string means the board said nothing this time.
    pub async fn read(&mut self, request: &str) -> PanelResult<String> {
        self.send_line(request).await?;

        let port = self.port_mut()?;
        let mut content = Vec::new();
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            let n = match port.read(&mut chunk) {
                Ok(n) => n,
                Err(e)
                    if matches!(
                        e.kind(),
                        std::io::ErrorKind::TimedOut
                            | std::io::ErrorKind::WouldBlock
                            | std::io::ErrorKind::Interrupted
                    ) =>
                {
                    0
                }
                Err(e) => return Err(e.into()),
            };
            content.extend_from_slice(&chunk[..n]);
            if n < READ_CHUNK || content.len() >= MAX_REPLY_BYTES {
                break;
            }
        }

        let reply = String::from_utf8_lossy(&content).trim().to_string();
        if reply.is_empty() {
            self.silent_reads += 1;
            if self.max_silent_reads > 0 && self.silent_reads > self.max_silent_reads {
                return Err(PanelError::DeviceTimeout(format!(
                    "no reply to {} after {} attempts",
                    request, self.silent_reads
                )));
            }
        } else {
            self.silent_reads = 0;
            debug!("serial: < {}", reply);
        }
        Ok(reply)
    }

    pub async fn query(&mut self, command: &PanelCommand) -> PanelResult<String> {
        self.read(&command.encode()).await
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        self.close();
    }
}
