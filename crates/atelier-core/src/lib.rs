//! atelier-core: Core traits, types, and error definitions for the Atelier
//! RS-232 driver.
//!
//! This crate defines the abstractions shared by the transport, the mock
//! harness, and the protocol driver. Presentation layers (CLI tools, home
//! automation bridges) depend on these types without pulling in the serial
//! stack.
//!
//! # Key types
//!
//! - [`Transport`] -- byte-level communication channel
//! - [`DeviceState`] -- believed state of the appliance
//! - [`StateEvent`] -- per-field change notifications
//! - [`Error`] / [`Result`] -- error handling

pub mod error;
pub mod events;
pub mod helpers;
pub mod transport;
pub mod types;

// Re-export key types at crate root for ergonomic `use atelier_core::*`.
pub use error::{Error, Result};
pub use events::{Field, StateEvent};
pub use helpers::{absolute_volume, relative_volume};
pub use transport::Transport;
pub use types::*;
