//! Line-oriented transports feeding the frame reader.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use std::time::Duration;

use serialport::{SerialPort, SerialPortType};
use thiserror::Error;

use super::frame::FramingError;

/// Baud rate of the reference sensor controller.
pub const DEFAULT_BAUD_RATE: u32 = 460_800;

/// Sensor link errors.
#[derive(Error, Debug)]
pub enum SensorError {
    #[error("Sensor port {port} unavailable: {reason}")]
    TransportUnavailable { port: String, reason: String },
    #[error(transparent)]
    Framing(#[from] FramingError),
}

impl SensorError {
    /// Whether the link can no longer deliver frames.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::TransportUnavailable { .. } => true,
            Self::Framing(e) => e.is_fatal(),
        }
    }
}

/// A source of newline-terminated text lines.
///
/// `read_line` follows [`BufRead::read_line`]: it appends to `buf` and
/// returns `Ok(0)` at end of stream. Timeouts surface as
/// [`io::ErrorKind::TimedOut`] with any partial line left in `buf`.
pub trait LineSource: Send {
    fn read_line(&mut self, buf: &mut String) -> io::Result<usize>;

    /// Bytes already received but not yet consumed.
    fn backlog(&self) -> usize;
}

impl<T: LineSource + ?Sized> LineSource for Box<T> {
    fn read_line(&mut self, buf: &mut String) -> io::Result<usize> {
        (**self).read_line(buf)
    }

    fn backlog(&self) -> usize {
        (**self).backlog()
    }
}

/// Information about an available serial port.
#[derive(Debug, Clone)]
pub struct PortInfo {
    pub name: String,
    pub description: Option<String>,
}

/// Serial connection to the sensor controller.
///
/// # Example
/// ```rust,no_run
/// use std::time::Duration;
/// use knee_control::sensor::SerialLink;
///
/// let link = SerialLink::open("/dev/ttyACM0", 460_800, Duration::from_millis(100));
/// ```
pub struct SerialLink {
    port_name: String,
    reader: BufReader<Box<dyn SerialPort>>,
}

impl SerialLink {
    /// Open the port. Failure maps to [`SensorError::TransportUnavailable`].
    pub fn open(port: &str, baud_rate: u32, read_timeout: Duration) -> Result<Self, SensorError> {
        let serial = serialport::new(port, baud_rate)
            .timeout(read_timeout)
            .open()
            .map_err(|e| SensorError::TransportUnavailable {
                port: port.to_string(),
                reason: e.to_string(),
            })?;

        tracing::info!("Opened sensor port {} @ {} baud", port, baud_rate);

        Ok(Self {
            port_name: port.to_string(),
            reader: BufReader::new(serial),
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// List serial ports visible to the system.
    pub fn list_ports() -> Result<Vec<PortInfo>, SensorError> {
        let ports = serialport::available_ports().map_err(|e| {
            SensorError::TransportUnavailable {
                port: "*".to_string(),
                reason: e.to_string(),
            }
        })?;

        Ok(ports
            .into_iter()
            .map(|p| {
                let description = match p.port_type {
                    SerialPortType::UsbPort(usb) => Some(
                        usb.product
                            .unwrap_or_else(|| format!("USB {:04x}:{:04x}", usb.vid, usb.pid)),
                    ),
                    SerialPortType::BluetoothPort => Some("Bluetooth".to_string()),
                    SerialPortType::PciPort => Some("PCI".to_string()),
                    SerialPortType::Unknown => None,
                };
                PortInfo {
                    name: p.port_name,
                    description,
                }
            })
            .collect())
    }
}

impl LineSource for SerialLink {
    fn read_line(&mut self, buf: &mut String) -> io::Result<usize> {
        self.reader.read_line(buf)
    }

    fn backlog(&self) -> usize {
        let queued = self.reader.get_ref().bytes_to_read().unwrap_or(0) as usize;
        self.reader.buffer().len() + queued
    }
}

/// Replays a recorded capture (one frame per line) as if it were live.
///
/// Recorded lines never count as backlog, so every line becomes a frame.
pub struct ReplaySource<R> {
    reader: BufReader<R>,
}

impl ReplaySource<File> {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self::new(File::open(path)?))
    }
}

impl<R: Read + Send> ReplaySource<R> {
    pub fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
        }
    }
}

impl<R: Read + Send> LineSource for ReplaySource<R> {
    fn read_line(&mut self, buf: &mut String) -> io::Result<usize> {
        self.reader.read_line(buf)
    }

    fn backlog(&self) -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_replay_source_reads_lines() {
        let mut source = ReplaySource::new(Cursor::new("1,2\n3,4\n"));
        let mut line = String::new();
        assert_eq!(source.read_line(&mut line).unwrap(), 4);
        assert_eq!(line, "1,2\n");
        assert_eq!(source.backlog(), 0);
        line.clear();
        source.read_line(&mut line).unwrap();
        line.clear();
        assert_eq!(source.read_line(&mut line).unwrap(), 0);
    }

    #[test]
    fn test_open_missing_port_is_unavailable() {
        let err = SerialLink::open("/dev/knee-control-missing", DEFAULT_BAUD_RATE, Duration::from_millis(10))
            .err()
            .unwrap();
        assert!(matches!(err, SensorError::TransportUnavailable { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_framing_error_fatality_passes_through() {
        let err: SensorError = FramingError::InvalidEncoding.into();
        assert!(!err.is_fatal());
        let err: SensorError = FramingError::StreamClosed.into();
        assert!(err.is_fatal());
    }
}
