//! Audit projection and sinks
//!
//! Every finished request is reduced to an [`AuditEntry`] before it leaves the
//! gateway. The entry carries identifiers, the outcome and timestamps only;
//! parameters and captured output never reach a sink.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use crate::state::{ExecutionPhase, ExecutionState};
use crate::types::{AuditError, RejectionCode};

/// Tracing target used by [`TracingAuditSink`].
pub const AUDIT_TARGET: &str = "execgate::audit";

/// Minimal, non-sensitive record of one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub execution_request_id: String,
    pub intent_id: String,
    pub tenant_id: String,
    pub subject_id: String,
    pub trace_id: String,
    pub sandbox_profile: String,
    pub final_state: ExecutionPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_code: Option<RejectionCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

/// Maps execution state onto audit entries.
pub struct AuditProjector;

impl AuditProjector {
    pub fn project(state: &ExecutionState<'_>) -> AuditEntry {
        let request = state.request();
        AuditEntry {
            execution_request_id: request.execution_request_id.clone(),
            intent_id: request.intent_ref.intent_id.clone(),
            tenant_id: request.context.tenant_id.clone(),
            subject_id: request.context.subject_id.clone(),
            trace_id: request.context.trace_id.clone(),
            sandbox_profile: request.sandbox.profile.clone(),
            final_state: state.phase(),
            rejection_code: state.rejection().map(|r| r.code),
            exit_code: state.exit_code,
            started_at: state.started_at(),
            finished_at: state.finished_at(),
        }
    }
}

/// Destination for audit entries.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: &AuditEntry) -> Result<(), AuditError>;
}

/// Emits one structured `info` event per entry on the `execgate::audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        tracing::info!(
            target: AUDIT_TARGET,
            execution_request_id = %entry.execution_request_id,
            intent_id = %entry.intent_id,
            tenant_id = %entry.tenant_id,
            subject_id = %entry.subject_id,
            trace_id = %entry.trace_id,
            sandbox_profile = %entry.sandbox_profile,
            final_state = %entry.final_state,
            rejection_code = entry.rejection_code.map(|c| c.as_str()),
            exit_code = entry.exit_code,
            started_at = %entry.started_at,
            finished_at = ?entry.finished_at,
            "execution audit"
        );
        Ok(())
    }
}

/// Appends entries to a file as JSON lines.
pub struct JsonlFileAuditSink {
    file_path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonlFileAuditSink {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }
}

#[async_trait]
impl AuditSink for JsonlFileAuditSink {
    async fn record(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        // Whole lines only, even with concurrent writers.
        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.file_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Keeps entries in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        self.entries.lock().push(entry.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ExecutionRequest, Rejection};
    use serde_json::json;
    use tempfile::TempDir;

    fn request() -> ExecutionRequest {
        let mut request = ExecutionRequest::default();
        request.execution_request_id = "req-1".to_string();
        request.intent_ref.intent_id = "intent-1".to_string();
        request.context.tenant_id = "tenant-1".to_string();
        request.context.subject_id = "subject-1".to_string();
        request.context.trace_id = "trace-1".to_string();
        request.sandbox.profile = "default".to_string();
        request.execution_spec.parameters = json!({ "token": "hunter2" })
            .as_object()
            .cloned()
            .unwrap();
        request
    }

    fn completed(request: &ExecutionRequest) -> ExecutionState<'_> {
        let mut state = ExecutionState::new(request);
        for phase in [
            ExecutionPhase::Validation,
            ExecutionPhase::SandboxCreated,
            ExecutionPhase::Execution,
            ExecutionPhase::SandboxDestroyed,
            ExecutionPhase::Response,
        ] {
            state.transition(phase).unwrap();
        }
        state.exit_code = Some(0);
        state.stdout = "sensitive output".to_string();
        state
    }

    #[test]
    fn test_projection_of_completed_run() {
        let request = request();
        let state = completed(&request);
        let entry = AuditProjector::project(&state);

        assert_eq!(entry.execution_request_id, "req-1");
        assert_eq!(entry.final_state, ExecutionPhase::Response);
        assert_eq!(entry.exit_code, Some(0));
        assert_eq!(entry.rejection_code, None);
        assert!(entry.finished_at.is_some());

        let text = serde_json::to_string(&entry).unwrap();
        assert!(!text.contains("hunter2"));
        assert!(!text.contains("sensitive output"));
    }

    #[test]
    fn test_projection_of_rejection() {
        let request = request();
        let mut state = ExecutionState::new(&request);
        state.transition(ExecutionPhase::Validation).unwrap();
        state
            .reject(Rejection::new(RejectionCode::SecuritySecrets, "secret"))
            .unwrap();

        let entry = AuditProjector::project(&state);
        assert_eq!(entry.final_state, ExecutionPhase::Rejected);
        assert_eq!(entry.rejection_code, Some(RejectionCode::SecuritySecrets));
        assert_eq!(entry.exit_code, None);

        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["rejection_code"], "R-SEC-003");
        assert_eq!(value["final_state"], "REJECTED");
    }

    #[tokio::test]
    async fn test_jsonl_sink_appends_lines() {
        let dir = TempDir::new().unwrap();
        let sink = JsonlFileAuditSink::new(dir.path().join("audit").join("entries.jsonl"));
        let request = request();
        let entry = AuditProjector::project(&completed(&request));

        sink.record(&entry).await.unwrap();
        sink.record(&entry).await.unwrap();

        let content = tokio::fs::read_to_string(sink.path()).await.unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let decoded: AuditEntry = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(decoded, entry);
    }

    #[tokio::test]
    async fn test_memory_and_tracing_sinks() {
        let request = request();
        let entry = AuditProjector::project(&completed(&request));

        let memory = MemoryAuditSink::new();
        memory.record(&entry).await.unwrap();
        assert_eq!(memory.len(), 1);
        assert_eq!(memory.entries()[0], entry);

        TracingAuditSink.record(&entry).await.unwrap();
    }
}
