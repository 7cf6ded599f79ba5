//! Internal propagation errors.
//!
//! These errors describe why an extraction or injection attempt failed. They
//! never escape the propagation layer: extraction failures are logged and
//! degrade to "no context" (the caller starts a new trace), they are not
//! surfaced to the hop's caller.

use thiserror::Error;

/// Error during trace context extraction or injection.
#[derive(Error, Debug, Copy, Clone)]
#[error("cannot {}: {} ({})", operation, message, propagator_name)]
pub struct Error {
    /// What went wrong, e.g. `"trace id not found"`.
    message: &'static str,
    /// Which propagator hit it, e.g. `"http-headers"`.
    propagator_name: &'static str,
    /// `"extract"` or `"inject"`.
    operation: &'static str,
}

impl Error {
    /// Creates an extraction error.
    #[must_use]
    pub fn extract(message: &'static str, propagator_name: &'static str) -> Self {
        Self {
            message,
            propagator_name,
            operation: "extract",
        }
    }

    /// Creates an injection error.
    #[must_use]
    pub fn inject(message: &'static str, propagator_name: &'static str) -> Self {
        Self {
            message,
            propagator_name,
            operation: "inject",
        }
    }
}
