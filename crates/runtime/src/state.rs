//! Execution state machine
//!
//! ```text
//! REQUEST_RECEIVED -> VALIDATION -> REJECTED
//!                               \-> SANDBOX_CREATED -> REJECTED
//!                                                  \-> EXECUTION -> SANDBOX_DESTROYED -> RESPONSE
//!                                                                                    \-> REJECTED
//! ```
//!
//! One `ExecutionState` exists per request and lives only as long as the
//! handling flow that owns it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{ExecutionRequest, Rejection, TransitionError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionPhase {
    RequestReceived,
    Validation,
    Rejected,
    SandboxCreated,
    Execution,
    SandboxDestroyed,
    Response,
}

impl ExecutionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionPhase::RequestReceived => "REQUEST_RECEIVED",
            ExecutionPhase::Validation => "VALIDATION",
            ExecutionPhase::Rejected => "REJECTED",
            ExecutionPhase::SandboxCreated => "SANDBOX_CREATED",
            ExecutionPhase::Execution => "EXECUTION",
            ExecutionPhase::SandboxDestroyed => "SANDBOX_DESTROYED",
            ExecutionPhase::Response => "RESPONSE",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionPhase::Rejected | ExecutionPhase::Response)
    }

    pub fn can_transition_to(&self, next: ExecutionPhase) -> bool {
        use ExecutionPhase::*;
        matches!(
            (self, next),
            (RequestReceived, Validation)
                | (Validation, Rejected)
                | (Validation, SandboxCreated)
                | (SandboxCreated, Execution)
                | (SandboxCreated, Rejected)
                | (Execution, SandboxDestroyed)
                | (SandboxDestroyed, Response)
                | (SandboxDestroyed, Rejected)
        )
    }
}

impl fmt::Display for ExecutionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-request progress record.
#[derive(Debug, Clone)]
pub struct ExecutionState<'a> {
    phase: ExecutionPhase,
    request: &'a ExecutionRequest,
    rejection: Option<Rejection>,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub artifacts: Vec<String>,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl<'a> ExecutionState<'a> {
    pub fn new(request: &'a ExecutionRequest) -> Self {
        Self {
            phase: ExecutionPhase::RequestReceived,
            request,
            rejection: None,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            artifacts: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn phase(&self) -> ExecutionPhase {
        self.phase
    }

    pub fn request(&self) -> &'a ExecutionRequest {
        self.request
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        self.rejection.as_ref()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Move to `next`. Entering a terminal phase stamps the finish time.
    pub fn transition(&mut self, next: ExecutionPhase) -> Result<(), TransitionError> {
        if !self.phase.can_transition_to(next) {
            return Err(TransitionError::Illegal {
                from: self.phase,
                to: next,
            });
        }

        tracing::debug!(
            execution_request_id = %self.request.execution_request_id,
            from = %self.phase,
            to = %next,
            "Execution phase transition"
        );
        self.phase = next;
        if next.is_terminal() && self.finished_at.is_none() {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Record the rejection and enter `REJECTED`.
    pub fn reject(&mut self, rejection: Rejection) -> Result<(), TransitionError> {
        if self.rejection.is_some() {
            return Err(TransitionError::RejectionAlreadySet);
        }
        self.transition(ExecutionPhase::Rejected)?;
        self.rejection = Some(rejection);
        Ok(())
    }
}
