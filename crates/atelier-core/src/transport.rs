//! Transport trait for appliance communication.
//!
//! The [`Transport`] trait abstracts over the physical link to the receiver.
//! The production implementation is the 300 baud serial port in
//! `atelier-transport`; tests use `MockTransport` from
//! `atelier-test-harness`.
//!
//! The protocol driver operates on a `Transport` rather than directly on a
//! serial port, so the command scheduler and status parser can be exercised
//! deterministically without hardware.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Asynchronous byte-level transport to the appliance.
///
/// Implementations handle buffering and error reporting at the physical
/// layer. Line framing and status decoding live in the protocol driver.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send raw bytes to the appliance.
    ///
    /// Resolves once all bytes have been handed to the underlying port
    /// (the write-completion notification of the link).
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive bytes from the appliance into the provided buffer.
    ///
    /// Returns the number of bytes actually read. Will wait up to `timeout`
    /// for data to arrive; returns [`Error::Timeout`](crate::error::Error::Timeout)
    /// if no data is received within the deadline.
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Close the transport connection.
    ///
    /// After calling `close()`, subsequent `send()` and `receive()` calls
    /// should return [`Error::NotConnected`](crate::error::Error::NotConnected).
    async fn close(&mut self) -> Result<()>;

    /// Check whether the transport is currently connected.
    fn is_connected(&self) -> bool;
}
