//! Error types for icepick-core

use thiserror::Error;

/// Core error type
///
/// A missing sync pattern is not an error: [`crate::frame::find_sync`]
/// returns `None` for it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Input buffer has the wrong length
    #[error("invalid input: expected {expected} bytes, got {actual}")]
    InvalidInput {
        /// Required length in bytes
        expected: usize,
        /// Length that was supplied
        actual: usize,
    },

    /// Sense channel index outside 0..=15
    #[error("invalid sense channel {0}")]
    InvalidChannel(u8),

    /// Value does not fit the field it is sent in
    #[error("{what} out of range: {value}")]
    OutOfRange {
        /// Name of the parameter
        what: &'static str,
        /// Rejected value
        value: u32,
    },

    /// Polling for a result gave up
    #[error("timed out waiting for {what}")]
    Timeout {
        /// What was being waited for
        what: &'static str,
    },

    /// The probe or bench instrument reported a failure
    #[error("probe error: {0}")]
    Probe(String),

    /// Configuration could not be loaded
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
