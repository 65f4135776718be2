//! The radio's UART.

use std::io::{Read, Write};
use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::info;

use crate::error::{Result, TransportError};

/// Default UART rate of the radio firmware.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Serial line settings. The radio always runs 8N1 without flow control.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    pub baud_rate: u32,
    /// Upper bound on a single read; keeps reader loops responsive.
    pub read_timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: Duration::from_millis(50),
        }
    }
}

/// An open serial device.
///
/// Reads time out after `read_timeout` with `ErrorKind::TimedOut`, which
/// the frame reader treats as "no data yet".
pub struct SerialDevice {
    port: Box<dyn SerialPort>,
    path: String,
}

impl SerialDevice {
    pub fn open(path: &str, config: &SerialConfig) -> Result<Self> {
        let port = serialport::new(path, config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(config.read_timeout)
            .open()
            .map_err(|source| TransportError::Serial {
                path: path.to_string(),
                source,
            })?;

        info!(path, baud = config.baud_rate, "opened serial device");

        Ok(Self {
            port,
            path: path.to_string(),
        })
    }

    /// A second handle on the same device, so reads and writes can live on
    /// different threads.
    pub fn try_clone(&self) -> Result<Self> {
        let port = self
            .port
            .try_clone()
            .map_err(|source| TransportError::Serial {
                path: self.path.clone(),
                source,
            })?;
        Ok(Self {
            port,
            path: self.path.clone(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Read for SerialDevice {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.port.read(buf)
    }
}

impl Write for SerialDevice {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.port.flush()
    }
}

impl std::fmt::Debug for SerialDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialDevice")
            .field("path", &self.path)
            .finish()
    }
}
