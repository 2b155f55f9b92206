//! Error types for the Keel state stores.

use thiserror::Error;

use crate::types::TargetKind;

/// Result type alias for state operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors raised when resolving or validating state.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: TargetKind, id: String },

    /// Client input that is missing or malformed; the message is
    /// surfaced to the caller verbatim.
    #[error("{0}")]
    Invalid(&'static str),
}
