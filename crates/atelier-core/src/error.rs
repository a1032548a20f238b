//! Error types for the Atelier driver.
//!
//! All fallible operations across the workspace return [`Result<T>`], which
//! uses [`Error`] as the error type.
//!
//! Malformed status frames are not errors: the appliance shares the line
//! with noise, and such lines are dropped at the parser.

/// The error type for all Atelier driver operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The serial port could not be opened, written, or closed.
    #[error("transport error: {0}")]
    Transport(String),

    /// No data arrived within the receive timeout.
    ///
    /// Routine on this link: the appliance only talks when something
    /// changed or a status report was requested.
    #[error("timeout waiting for response")]
    Timeout,

    /// The caller broke a precondition, such as a volume above 100.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The port is closed or the IO task has stopped.
    #[error("not connected")]
    NotConnected,

    /// The port went away underneath the driver.
    #[error("connection lost")]
    ConnectionLost,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;
