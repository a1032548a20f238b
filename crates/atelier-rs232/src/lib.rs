//! atelier-rs232: Driver for Atelier receivers over an RS-232 link.
//!
//! The appliance takes one three-byte command at a time, applies it slowly,
//! and reports changed fields as terse `;<code>;<payload>` status lines
//! rather than answering commands. This crate queues and paces the
//! commands, tracks what the appliance is believed to be doing, negotiates
//! absolute volume targets one step at a time, and infers power-off from
//! silence.
//!
//! # Quick start
//!
//! ```no_run
//! use atelier_rs232::AtelierBuilder;
//!
//! # async fn example() -> atelier_core::Result<()> {
//! let device = AtelierBuilder::new()
//!     .serial_port("/dev/ttyUSB0")
//!     .build()
//!     .await?;
//!
//! device.set_power(true).await?;
//! device.set_volume(35).await?;
//! println!("{:?}", device.state().await?);
//! device.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod commands;
pub mod device;
pub mod io;
pub mod liveness;
pub mod protocol;
pub mod ramp;
pub mod scheduler;
pub mod state;

pub use builder::AtelierBuilder;
pub use commands::{Command, Effect};
pub use device::{AtelierDevice, FieldReceiver};
pub use io::IoConfig;
