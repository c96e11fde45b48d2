//! Core error types for labbook-core.
//!
//! Uses `thiserror` for structured, matchable error variants covering the
//! few ways a domain value can be malformed before it reaches storage.

use thiserror::Error;

/// Core errors produced by the labbook-core crate.
#[derive(Debug, Error, PartialEq)]
pub enum CoreError {
    /// Tray holes are numbered from 1.
    #[error("invalid hole number: {hole}")]
    InvalidHole { hole: u32 },

    /// A flux value or its uncertainty was not a finite number, or the
    /// uncertainty was negative.
    #[error("invalid flux value: j={value}, j_err={error}")]
    InvalidFlux { value: f64, error: f64 },
}
