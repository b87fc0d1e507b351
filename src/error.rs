//! Error types for sluice.

use thiserror::Error;

/// Result type for sluice operations.
pub type Result<T> = std::result::Result<T, SluiceError>;

/// Errors surfaced by the sequencing core.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SluiceError {
    /// Cooperative cancellation: the barrier was alerted while waiting.
    #[error("alerted")]
    Alerted,

    /// A non-blocking claim was denied because the ring is full.
    #[error("insufficient capacity")]
    InsufficientCapacity,

    /// API misuse detected at a checked boundary.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}

impl SluiceError {
    /// True for the cancellation signal raised out of a wait strategy.
    pub fn is_alerted(&self) -> bool {
        matches!(self, SluiceError::Alerted)
    }
}
