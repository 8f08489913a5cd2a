//! Gateway facade
//!
//! Wires the admission pipeline, the replay guard, the sandbox lifecycle and
//! the audit sink into one `submit` operation. Each submission is handled
//! entirely inside the caller's future; the only state shared between
//! submissions is the request cache.

use std::sync::Arc;
use uuid::Uuid;

use crate::audit::{AuditProjector, AuditSink, TracingAuditSink};
use crate::cache::{CacheSweeper, RequestCache};
use crate::config::GatewayConfig;
use crate::sandbox::{ProcessBackend, SandboxBackend, SandboxLifecycle, SandboxLimits};
use crate::state::{ExecutionPhase, ExecutionState};
use crate::types::{
    is_valid_identifier, CompletionRecord, CompletionStatus, ExecutionRequest, ExecutionResponse,
    GatewayError, Rejection, RejectionCode, SandboxProfile, TransitionError, Verdict,
};
use crate::validation::{IntentRegistry, ParsedLimits, ValidationPipeline};

/// Builder for [`ExecutionGateway`].
pub struct GatewayBuilder {
    config: GatewayConfig,
    backend: Option<Arc<dyn SandboxBackend>>,
    audit_sink: Option<Arc<dyn AuditSink>>,
    intent_registry: Option<Arc<dyn IntentRegistry>>,
    cache: Option<Arc<RequestCache>>,
}

impl GatewayBuilder {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            backend: None,
            audit_sink: None,
            intent_registry: None,
            cache: None,
        }
    }

    /// Sandbox backend; defaults to [`ProcessBackend`].
    pub fn backend(mut self, backend: Arc<dyn SandboxBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Audit sink; defaults to [`TracingAuditSink`].
    pub fn audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit_sink = Some(sink);
        self
    }

    pub fn intent_registry(mut self, registry: Arc<dyn IntentRegistry>) -> Self {
        self.intent_registry = Some(registry);
        self
    }

    /// Share an existing replay guard.
    pub fn cache(mut self, cache: Arc<RequestCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn build(self) -> Result<ExecutionGateway, GatewayError> {
        self.config.validate()?;

        let backend = self
            .backend
            .unwrap_or_else(|| {
                Arc::new(ProcessBackend::new(self.config.sandbox.clone())) as Arc<dyn SandboxBackend>
            });
        let audit = self
            .audit_sink
            .unwrap_or_else(|| Arc::new(TracingAuditSink) as Arc<dyn AuditSink>);
        let cache = self.cache.unwrap_or_default();
        let pipeline = ValidationPipeline::new(self.config.policy.clone(), self.intent_registry);
        let sweeper = CacheSweeper::new(cache.clone(), &self.config.replay);

        tracing::debug!(backend = backend.name(), "Execution gateway assembled");

        Ok(ExecutionGateway {
            config: self.config,
            pipeline,
            cache,
            sweeper,
            lifecycle: SandboxLifecycle::new(backend),
            audit,
        })
    }
}

/// Admission-controlled execution of single requests.
pub struct ExecutionGateway {
    config: GatewayConfig,
    pipeline: ValidationPipeline,
    cache: Arc<RequestCache>,
    sweeper: CacheSweeper,
    lifecycle: SandboxLifecycle,
    audit: Arc<dyn AuditSink>,
}

impl ExecutionGateway {
    pub fn builder(config: GatewayConfig) -> GatewayBuilder {
        GatewayBuilder::new(config)
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<RequestCache> {
        &self.cache
    }

    pub fn sweeper(&self) -> &CacheSweeper {
        &self.sweeper
    }

    /// Run the admission pipeline only. Nothing is executed or consumed.
    pub fn dry_run(&self, request: &ExecutionRequest) -> Verdict {
        self.pipeline.validate(request, &self.cache)
    }

    /// Decode a raw payload and submit it. Undecodable payloads are rejected
    /// with `R-SCHEMA-001` and are not audited.
    pub async fn submit_json(&self, payload: &[u8]) -> ExecutionResponse {
        match serde_json::from_slice::<ExecutionRequest>(payload) {
            Ok(request) => self.submit(request).await,
            Err(e) => {
                // The decoder's message quotes payload content; keep it out of the logs.
                tracing::info!(
                    code = %RejectionCode::SchemaMalformed,
                    category = ?e.classify(),
                    line = e.line(),
                    column = e.column(),
                    "Rejected malformed payload"
                );
                Self::reject_malformed(salvage_request_id(payload), "Malformed request payload")
            }
        }
    }

    /// `R-SCHEMA-001` record for a payload that never reached decoding, such
    /// as a body over the size limit.
    pub fn reject_malformed(
        execution_request_id: impl Into<String>,
        reason: impl Into<String>,
    ) -> ExecutionResponse {
        ExecutionResponse::rejected(
            execution_request_id,
            RejectionCode::SchemaMalformed,
            reason,
            Uuid::new_v4().to_string(),
        )
    }

    /// Admit, execute and audit one request.
    pub async fn submit(&self, request: ExecutionRequest) -> ExecutionResponse {
        let mut state = ExecutionState::new(&request);

        if let Err(e) = self.drive(&mut state).await {
            tracing::error!(
                execution_request_id = %request.execution_request_id,
                "Execution state machine violation: {}",
                e
            );
            // Best effort: the phase may not allow REJECTED.
            let _ = state.reject(Rejection::new(
                RejectionCode::StateInternal,
                "Internal execution state error",
            ));
            self.record_audit(&state).await;
            return ExecutionResponse::rejected(
                request.execution_request_id.clone(),
                RejectionCode::StateInternal,
                "Internal execution state error",
                response_trace_id(&request),
            );
        }

        self.record_audit(&state).await;
        self.respond(&state)
    }

    async fn drive(&self, state: &mut ExecutionState<'_>) -> Result<(), TransitionError> {
        let request = state.request();
        state.transition(ExecutionPhase::Validation)?;

        if let Verdict::Reject(rejection) = self.pipeline.validate(request, &self.cache) {
            tracing::info!(code = %rejection.code, "Execution request rejected");
            return state.reject(rejection);
        }

        let limits = match ParsedLimits::from_request(request) {
            Ok(limits) => SandboxLimits::from(limits),
            Err(verdict) => {
                let rejection = verdict.rejection().cloned().unwrap_or_else(|| {
                    Rejection::new(RejectionCode::StateInternal, "Unparseable resource limits")
                });
                return state.reject(rejection);
            }
        };
        let Ok(profile) = request.sandbox.profile.parse::<SandboxProfile>() else {
            return state.reject(Rejection::new(
                RejectionCode::SandboxInvalidProfile,
                format!("Invalid sandbox profile: {}", request.sandbox.profile),
            ));
        };

        // Consume the id. Losing a race to a concurrent duplicate is a replay.
        if !self.cache.try_consume(&request.execution_request_id) {
            tracing::info!(code = %RejectionCode::StateReplay, "Execution request rejected");
            return state.reject(Rejection::new(
                RejectionCode::StateReplay,
                "Replay attempt detected",
            ));
        }

        state.transition(ExecutionPhase::SandboxCreated)?;
        let mut active = match self.lifecycle.create(profile, request, &limits).await {
            Ok(active) => active,
            Err(e) => {
                tracing::error!(
                    execution_request_id = %request.execution_request_id,
                    "Sandbox creation failed: {}",
                    e
                );
                return state.reject(Rejection::new(
                    RejectionCode::SandboxCreateFailed,
                    "Sandbox creation failed",
                ));
            }
        };

        state.transition(ExecutionPhase::Execution)?;
        let result = self.lifecycle.execute(&mut active).await;

        if let Err(e) = self.lifecycle.destroy(active).await {
            tracing::error!(
                execution_request_id = %request.execution_request_id,
                "Sandbox teardown failed: {}",
                e
            );
        }
        state.transition(ExecutionPhase::SandboxDestroyed)?;

        match result {
            Ok(output) => {
                state.exit_code = Some(output.exit_code);
                state.stdout = output.stdout;
                state.stderr = output.stderr;
                state.artifacts = output.artifacts;
                state.transition(ExecutionPhase::Response)
            }
            Err(e) => {
                tracing::error!(
                    execution_request_id = %request.execution_request_id,
                    "Sandbox execution failed: {}",
                    e
                );
                state.reject(Rejection::new(
                    RejectionCode::SandboxExecutionFailed,
                    format!("Sandbox execution failed: {}", e),
                ))
            }
        }
    }

    async fn record_audit(&self, state: &ExecutionState<'_>) {
        let entry = AuditProjector::project(state);
        if let Err(e) = self.audit.record(&entry).await {
            tracing::error!(
                execution_request_id = %entry.execution_request_id,
                "Failed to record audit entry: {}",
                e
            );
        }
    }

    fn respond(&self, state: &ExecutionState<'_>) -> ExecutionResponse {
        let request = state.request();

        if let Some(rejection) = state.rejection() {
            return ExecutionResponse::rejected(
                request.execution_request_id.clone(),
                rejection.code,
                rejection.reason.clone(),
                response_trace_id(request),
            );
        }

        let exit_code = state.exit_code.unwrap_or(-1);
        let wanted = &request.artifacts;
        ExecutionResponse::Completed(CompletionRecord {
            execution_request_id: request.execution_request_id.clone(),
            status: CompletionStatus::from_exit_code(exit_code),
            exit_code,
            stdout: wanted.capture_stdout.then(|| state.stdout.clone()),
            stderr: wanted.capture_stderr.then(|| state.stderr.clone()),
            artifacts: state.artifacts.clone(),
            started_at: state.started_at(),
            finished_at: state.finished_at().unwrap_or_else(chrono::Utc::now),
        })
    }
}

impl std::fmt::Debug for ExecutionGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionGateway")
            .field("lifecycle", &self.lifecycle)
            .field("cache_entries", &self.cache.len())
            .finish_non_exhaustive()
    }
}

/// The caller's trace id when it is well formed, otherwise a fresh one.
fn response_trace_id(request: &ExecutionRequest) -> String {
    if is_valid_identifier(&request.context.trace_id) {
        request.context.trace_id.clone()
    } else {
        Uuid::new_v4().to_string()
    }
}

/// Pull `execution_request_id` out of a payload that failed typed decoding.
fn salvage_request_id(payload: &[u8]) -> String {
    serde_json::from_slice::<serde_json::Value>(payload)
        .ok()
        .and_then(|value| {
            value
                .get("execution_request_id")
                .and_then(|id| id.as_str())
                .map(str::to_string)
        })
        .unwrap_or_default()
}
