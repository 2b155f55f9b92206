//! Dispatch error types.

use std::time::Duration;

use keel_state::TargetKind;
use thiserror::Error;

/// Errors that end a single dispatch attempt. None of them are retried.
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("failed to decode kubeconfig: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("invalid kubeconfig: {0}")]
    Kubeconfig(String),

    #[error("failed to create kubernetes client: {0}")]
    Client(String),

    #[error("kubernetes API request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("kubernetes API returned {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("agent {0} is offline")]
    AgentOffline(String),

    #[error("agent {0} is not registered")]
    AgentUnknown(String),

    #[error("{executor} executor cannot handle {kind} targets")]
    Unsupported {
        executor: &'static str,
        kind: TargetKind,
    },

    #[error("dispatch timed out after {0:?}")]
    TimedOut(Duration),

    #[error("executor panicked")]
    Panicked,

    #[error("dispatcher is shutting down")]
    ShuttingDown,
}

pub type ExecuteResult<T> = Result<T, ExecuteError>;
