//! Transport implementations for the Atelier driver.
//!
//! This crate provides [`SerialTransport`], the concrete implementation of
//! the [`Transport`](atelier_core::Transport) trait from `atelier-core` for
//! the RS-232 link to the appliance.
//!
//! # Example
//!
//! ```no_run
//! use atelier_transport::SerialTransport;
//! use atelier_core::transport::Transport;
//! use std::time::Duration;
//!
//! # async fn example() -> atelier_core::Result<()> {
//! let mut transport = SerialTransport::open("/dev/ttyUSB0", 300).await?;
//!
//! // Ask the appliance to report its status.
//! transport.send(b"0:7").await?;
//!
//! let mut buf = [0u8; 64];
//! let n = transport.receive(&mut buf, Duration::from_secs(2)).await?;
//! # Ok(())
//! # }
//! ```

pub mod serial;

pub use serial::{DataBits, Parity, SerialConfig, SerialTransport, StopBits, DEFAULT_BAUD_RATE};
