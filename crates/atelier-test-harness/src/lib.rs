//! atelier-test-harness: Test utilities and mock transports for the
//! Atelier driver.
//!
//! This crate provides [`MockTransport`] for deterministic testing of the
//! command scheduler and status parser without a real appliance, and
//! [`MockHandle`] for driving and inspecting the mock after it has been
//! moved into the IO task.

pub mod mock_serial;

pub use mock_serial::{MockHandle, MockTransport, SentWrite};
