//! Serial port transport for the appliance link.
//!
//! The appliance's RS-232 interface runs at a fixed 300 baud, 8N1, with no
//! flow control. At that rate a three-byte command occupies the wire for
//! roughly 100 ms, which is why [`Transport::send`] resolves only once the
//! bytes have been flushed to the port.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{FlowControl, SerialPortBuilderExt, SerialStream};
use tracing::{debug, info, trace, warn};

use atelier_core::error::{Error, Result};
use atelier_core::transport::Transport;

pub use tokio_serial::{DataBits, Parity, StopBits};

/// Baud rate of the appliance's serial interface.
pub const DEFAULT_BAUD_RATE: u32 = 300;

/// Line settings for the port.
///
/// The defaults match the appliance. Only USB adapters with unusual
/// firmware should need anything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialConfig {
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
    pub parity: Parity,
}

impl Default for SerialConfig {
    fn default() -> Self {
        SerialConfig {
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
        }
    }
}

impl SerialConfig {
    /// 8N1 at `baud_rate`.
    pub fn with_baud_rate(baud_rate: u32) -> Self {
        SerialConfig {
            baud_rate,
            ..SerialConfig::default()
        }
    }
}

fn map_io_error(e: io::Error) -> Error {
    match e.kind() {
        io::ErrorKind::BrokenPipe | io::ErrorKind::NotConnected | io::ErrorKind::UnexpectedEof => {
            Error::ConnectionLost
        }
        _ => Error::Io(e),
    }
}

/// The appliance's serial link.
pub struct SerialTransport {
    stream: Option<SerialStream>,
    path: String,
}

impl SerialTransport {
    /// Open `path` at `baud_rate` with 8N1 framing.
    ///
    /// ```no_run
    /// # use atelier_transport::SerialTransport;
    /// # async fn example() -> atelier_core::Result<()> {
    /// let transport = SerialTransport::open("/dev/ttyUSB0", 300).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn open(path: &str, baud_rate: u32) -> Result<Self> {
        Self::open_with_config(path, SerialConfig::with_baud_rate(baud_rate)).await
    }

    pub async fn open_with_config(path: &str, config: SerialConfig) -> Result<Self> {
        debug!(port = %path, ?config, "opening serial port");

        let stream = tokio_serial::new(path, config.baud_rate)
            .data_bits(config.data_bits)
            .stop_bits(config.stop_bits)
            .parity(config.parity)
            .flow_control(FlowControl::None)
            .open_native_async()
            .map_err(|e| Error::Transport(format!("cannot open {path}: {e}")))?;

        info!(port = %path, baud_rate = config.baud_rate, "serial port opened");
        Ok(SerialTransport {
            stream: Some(stream),
            path: path.to_string(),
        })
    }

    fn stream(&mut self) -> Result<&mut SerialStream> {
        self.stream.as_mut().ok_or(Error::NotConnected)
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        trace!(port = %self.path, ?data, "write");
        let stream = self.stream()?;
        stream.write_all(data).await.map_err(map_io_error)?;
        // Resolve only once the bytes have left the driver's buffer.
        stream.flush().await.map_err(map_io_error)
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let path = self.path.clone();
        let stream = self.stream()?;
        match tokio::time::timeout(timeout, stream.read(buf)).await {
            Err(_) => Err(Error::Timeout),
            Ok(Ok(0)) => {
                warn!(port = %path, "serial port closed by peer");
                Err(Error::ConnectionLost)
            }
            Ok(Ok(n)) => {
                trace!(port = %path, data = ?&buf[..n], "read");
                Ok(n)
            }
            Ok(Err(e)) => Err(map_io_error(e)),
        }
    }

    async fn close(&mut self) -> Result<()> {
        let Some(mut stream) = self.stream.take() else {
            return Ok(());
        };
        // The descriptor is released when the stream drops, flushed or not.
        stream
            .flush()
            .await
            .map_err(|e| Error::Transport(format!("flush of {} failed: {e}", self.path)))?;
        info!(port = %self.path, "serial port closed");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}
