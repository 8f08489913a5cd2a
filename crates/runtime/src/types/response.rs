//! Records returned to the caller of "submit execution request".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::rejection::RejectionCode;

/// Final status of an execution that was not rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionStatus {
    Success,
    Error,
}

impl CompletionStatus {
    pub fn from_exit_code(exit_code: i32) -> Self {
        if exit_code == 0 {
            CompletionStatus::Success
        } else {
            CompletionStatus::Error
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionRecord {
    pub execution_request_id: String,
    /// Always `"rejected"` on the wire.
    pub status: String,
    pub rejection_code: RejectionCode,
    pub reason: String,
    pub trace_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRecord {
    pub execution_request_id: String,
    pub status: CompletionStatus,
    pub exit_code: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Response to one submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExecutionResponse {
    Rejected(RejectionRecord),
    Completed(CompletionRecord),
}

impl ExecutionResponse {
    pub fn rejected(
        execution_request_id: impl Into<String>,
        code: RejectionCode,
        reason: impl Into<String>,
        trace_id: impl Into<String>,
    ) -> Self {
        ExecutionResponse::Rejected(RejectionRecord {
            execution_request_id: execution_request_id.into(),
            status: "rejected".to_string(),
            rejection_code: code,
            reason: reason.into(),
            trace_id: trace_id.into(),
            timestamp: Utc::now(),
        })
    }

    pub fn execution_request_id(&self) -> &str {
        match self {
            ExecutionResponse::Rejected(r) => &r.execution_request_id,
            ExecutionResponse::Completed(c) => &c.execution_request_id,
        }
    }

    pub fn rejection_code(&self) -> Option<RejectionCode> {
        match self {
            ExecutionResponse::Rejected(r) => Some(r.rejection_code),
            ExecutionResponse::Completed(_) => None,
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, ExecutionResponse::Rejected(_))
    }

    pub fn as_completed(&self) -> Option<&CompletionRecord> {
        match self {
            ExecutionResponse::Completed(c) => Some(c),
            ExecutionResponse::Rejected(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_wire_shape() {
        let response = ExecutionResponse::rejected(
            "req-1",
            RejectionCode::StateReplay,
            "Replay attempt detected",
            "trace",
        );
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["status"], "rejected");
        assert_eq!(value["rejection_code"], "R-STATE-002");
        assert_eq!(value["execution_request_id"], "req-1");
        assert!(value.get("timestamp").is_some());
    }

    #[test]
    fn test_completion_omits_uncaptured_streams() {
        let now = Utc::now();
        let response = ExecutionResponse::Completed(CompletionRecord {
            execution_request_id: "req-2".to_string(),
            status: CompletionStatus::from_exit_code(3),
            exit_code: 3,
            stdout: None,
            stderr: Some("boom".to_string()),
            artifacts: Vec::new(),
            started_at: now,
            finished_at: now,
        });
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["status"], "error");
        assert!(value.get("stdout").is_none());
        assert!(value.get("artifacts").is_none());
        assert_eq!(value["stderr"], "boom");
    }
}
