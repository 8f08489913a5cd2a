//! Sandbox lifecycle
//!
//! A sandbox is created, executed once and destroyed once. The isolation
//! technology sits behind [`SandboxBackend`]; the gateway only ever talks to
//! [`SandboxLifecycle`].
//!
//! [`Sandbox`] is a plain value (identifier, profile, finished flag). The
//! live resource a backend hands back is held by [`ActiveSandbox`], and
//! [`SandboxLifecycle::destroy`] consumes it, so a created sandbox cannot be
//! torn down twice or leaked past the flow that created it.

pub mod process;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::quantity::{CpuQuantity, MemoryQuantity};
use crate::types::{ExecutionRequest, SandboxError, SandboxId, SandboxProfile};
use crate::validation::ParsedLimits;

pub use process::ProcessBackend;

/// Identity and status of one sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sandbox {
    pub id: SandboxId,
    pub profile: SandboxProfile,
    pub finished: bool,
}

impl Sandbox {
    pub fn new(profile: SandboxProfile) -> Self {
        Self {
            id: SandboxId::new(),
            profile,
            finished: false,
        }
    }
}

/// Limits a backend must enforce, already checked against policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SandboxLimits {
    pub cpu: CpuQuantity,
    pub memory: MemoryQuantity,
    pub timeout: Duration,
}

impl From<ParsedLimits> for SandboxLimits {
    fn from(limits: ParsedLimits) -> Self {
        Self {
            cpu: limits.cpu,
            memory: limits.memory,
            timeout: Duration::from_millis(limits.timeout_ms),
        }
    }
}

/// What a single run produced.
///
/// A non-zero `exit_code` is a normal outcome, not an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
    /// Requested output files that exist after the run, relative to the sandbox.
    pub artifacts: Vec<String>,
    pub execution_time_ms: u64,
}

/// Isolation technology that can materialize sandboxes.
#[async_trait]
pub trait SandboxBackend: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Prepare an isolated environment for `request`. Nothing runs yet.
    async fn create(
        &self,
        sandbox: &Sandbox,
        request: &ExecutionRequest,
        limits: &SandboxLimits,
    ) -> Result<Box<dyn SandboxResource>, SandboxError>;
}

/// A live environment produced by a backend.
#[async_trait]
pub trait SandboxResource: Send {
    /// Run the prepared program to completion or timeout.
    async fn execute(&mut self) -> Result<ExecutionOutput, SandboxError>;

    /// Release everything the resource holds.
    async fn destroy(&mut self) -> Result<(), SandboxError>;
}

/// A created sandbox together with its live resource.
pub struct ActiveSandbox {
    sandbox: Sandbox,
    resource: Box<dyn SandboxResource>,
}

impl ActiveSandbox {
    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }
}

impl std::fmt::Debug for ActiveSandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveSandbox")
            .field("sandbox", &self.sandbox)
            .finish_non_exhaustive()
    }
}

/// create → execute → destroy over a backend.
#[derive(Clone)]
pub struct SandboxLifecycle {
    backend: Arc<dyn SandboxBackend>,
}

impl SandboxLifecycle {
    pub fn new(backend: Arc<dyn SandboxBackend>) -> Self {
        Self { backend }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub async fn create(
        &self,
        profile: SandboxProfile,
        request: &ExecutionRequest,
        limits: &SandboxLimits,
    ) -> Result<ActiveSandbox, SandboxError> {
        let sandbox = Sandbox::new(profile);
        let resource = self.backend.create(&sandbox, request, limits).await?;
        tracing::debug!(
            sandbox_id = %sandbox.id,
            profile = %profile,
            backend = self.backend.name(),
            "Sandbox created"
        );
        Ok(ActiveSandbox { sandbox, resource })
    }

    /// Run the sandbox. A sandbox runs at most once, whatever the outcome.
    pub async fn execute(&self, active: &mut ActiveSandbox) -> Result<ExecutionOutput, SandboxError> {
        if active.sandbox.finished {
            return Err(SandboxError::AlreadyFinished(active.sandbox.id.to_string()));
        }
        let result = active.resource.execute().await;
        active.sandbox.finished = true;
        result
    }

    /// Tear the sandbox down. Consumes it; returns the final sandbox value.
    pub async fn destroy(&self, mut active: ActiveSandbox) -> Result<Sandbox, SandboxError> {
        active.resource.destroy().await?;
        tracing::debug!(sandbox_id = %active.sandbox.id, "Sandbox destroyed");
        Ok(active.sandbox)
    }
}

impl std::fmt::Debug for SandboxLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxLifecycle")
            .field("backend", &self.backend.name())
            .finish()
    }
}
