//! Hardware error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HardwareError {
    /// The kind name is unknown, or no driver is registered for it.
    #[error("unsupported device: {0}")]
    UnsupportedDevice(String),

    /// The registry produced a driver of a different role than requested.
    #[error("device {name} is not {expected}")]
    WrongRole { name: String, expected: &'static str },

    #[error("communication error: {0}")]
    Io(#[from] std::io::Error),
}
