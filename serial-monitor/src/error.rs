//! Common error types for serial-monitor.
//!
//! This module provides a centralized Error enum using thiserror, with
//! conversions from the underlying error types used throughout the crate.

use thiserror::Error;

/// Main error type for serial-monitor operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The transport or its serial handshake could not be established
    #[error("Connection error: {0}")]
    Connection(String),

    /// I/O errors on an established connection or on output
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Convenience type alias for Results using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
