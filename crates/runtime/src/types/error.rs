//! Error types for the gateway runtime

use std::time::Duration;
use thiserror::Error;

use crate::state::ExecutionPhase;
use crate::config::ConfigError;

/// Main runtime error type
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Sandbox error: {0}")]
    Sandbox(#[from] SandboxError),

    #[error("Audit error: {0}")]
    Audit(#[from] AuditError),

    #[error("State machine error: {0}")]
    Transition(#[from] TransitionError),
}

/// Failures of the isolation layer itself.
///
/// A program that runs and exits non-zero is not a `SandboxError`; it is a
/// normal result carrying its exit code.
#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("Sandbox creation failed: {0}")]
    CreationFailed(String),

    #[error("Failed to spawn process '{program}': {reason}")]
    SpawnFailed { program: String, reason: String },

    #[error("Execution timed out after {0:?}")]
    Timeout(Duration),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Sandbox {0} already finished")]
    AlreadyFinished(String),

    #[error("Sandbox teardown failed: {0}")]
    TeardownFailed(String),
}

/// Audit sink errors
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Failed to serialize audit entry: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to write audit entry: {0}")]
    Io(#[from] std::io::Error),
}

/// An attempted state change outside the permitted transition graph.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Illegal transition from {from} to {to}")]
    Illegal {
        from: ExecutionPhase,
        to: ExecutionPhase,
    },

    #[error("Rejection already recorded for this request")]
    RejectionAlreadySet,
}
