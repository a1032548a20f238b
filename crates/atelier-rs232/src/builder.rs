//! AtelierBuilder -- fluent builder for constructing [`AtelierDevice`]
//! instances.
//!
//! Separates configuration from construction so that callers can set up
//! the serial port and the protocol timings before the transport is opened
//! and the IO task starts.
//!
//! # Example
//!
//! ```no_run
//! use atelier_rs232::builder::AtelierBuilder;
//! use std::time::Duration;
//!
//! # async fn example() -> atelier_core::Result<()> {
//! let device = AtelierBuilder::new()
//!     .serial_port("/dev/ttyUSB0")
//!     .name("Living Room")
//!     .liveness_timeout(Duration::from_millis(500))
//!     .build()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use tokio::sync::broadcast;

use atelier_core::error::{Error, Result};
use atelier_core::transport::Transport;
use atelier_core::types::DeviceInfo;
use atelier_transport::{SerialTransport, DEFAULT_BAUD_RATE};

use crate::device::AtelierDevice;
use crate::io::{self, IoConfig};

/// Capacity of the state event channel.
const EVENT_CAPACITY: usize = 256;

/// Fluent builder for [`AtelierDevice`].
///
/// Every timing defaults to the value measured on real appliances, so the
/// simplest usage is:
///
/// ```ignore
/// let device = AtelierBuilder::new()
///     .serial_port("/dev/ttyUSB0")
///     .build()
///     .await?;
/// ```
pub struct AtelierBuilder {
    serial_port: Option<String>,
    baud_rate: u32,
    name: String,
    model: String,
    io: IoConfig,
}

impl Default for AtelierBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AtelierBuilder {
    pub fn new() -> Self {
        AtelierBuilder {
            serial_port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            name: "Atelier".to_string(),
            model: "Atelier".to_string(),
            io: IoConfig::default(),
        }
    }

    /// Set the serial port path (e.g. `/dev/ttyUSB0` or `COM3`).
    pub fn serial_port(mut self, port: &str) -> Self {
        self.serial_port = Some(port.to_string());
        self
    }

    /// Override the baud rate (default: 300).
    pub fn baud_rate(mut self, baud: u32) -> Self {
        self.baud_rate = baud;
        self
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    /// Pause between consecutive writes (default: 500ms).
    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.io.scheduler.settle_delay = delay;
        self
    }

    /// Pause after a status request (default: 3s).
    pub fn status_settle_delay(mut self, delay: Duration) -> Self {
        self.io.scheduler.status_settle_delay = delay;
        self
    }

    /// Window within which consecutive volume commands are taken as seen
    /// by the front panel (default: 3s).
    pub fn display_refresh_window(mut self, window: Duration) -> Self {
        self.io.scheduler.display_refresh_window = window;
        self
    }

    /// Age after which the believed state is refreshed (default: 60s).
    pub fn staleness_threshold(mut self, threshold: Duration) -> Self {
        self.io.staleness_threshold = threshold;
        self
    }

    /// Wait for an answer to a status request before declaring the
    /// appliance off (default: 2s).
    pub fn liveness_timeout(mut self, timeout: Duration) -> Self {
        self.io.liveness_timeout = timeout;
        self
    }

    /// Steps after which a volume ramp gives up (default: 250).
    pub fn max_ramp_steps(mut self, steps: u32) -> Self {
        self.io.max_ramp_steps = steps;
        self
    }

    /// Idle receive timeout of the IO loop (default: 100ms).
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.io.read_timeout = timeout;
        self
    }

    /// Build an [`AtelierDevice`] with a caller-provided transport.
    ///
    /// This is the primary entry point for testing (pass a
    /// `MockTransport` from `atelier-test-harness`). Must be called from
    /// within a tokio runtime.
    pub async fn build_with_transport(self, transport: Box<dyn Transport>) -> Result<AtelierDevice> {
        if self.io.scheduler.settle_delay.is_zero() {
            return Err(Error::InvalidParameter(
                "settle_delay must be greater than zero".into(),
            ));
        }
        if self.io.read_timeout.is_zero() {
            return Err(Error::InvalidParameter(
                "read_timeout must be greater than zero".into(),
            ));
        }

        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let io = io::spawn_io_task(transport, self.io, event_tx.clone());
        let info = DeviceInfo {
            name: self.name,
            model: self.model,
            port: self.serial_port,
        };
        Ok(AtelierDevice::new(io, event_tx, info))
    }

    /// Build an [`AtelierDevice`] using a serial transport.
    ///
    /// Requires that [`serial_port()`](Self::serial_port) has been called.
    pub async fn build(self) -> Result<AtelierDevice> {
        let port = self
            .serial_port
            .as_ref()
            .ok_or_else(|| Error::InvalidParameter("serial_port is required for build()".into()))?;

        let transport = SerialTransport::open(port, self.baud_rate).await?;
        self.build_with_transport(Box::new(transport)).await
    }
}
