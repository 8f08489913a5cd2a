//! Admission pipeline
//!
//! Seven validators run in a fixed order and the first rejection wins:
//!
//! 1. schema      - mandatory fields present
//! 2. context     - tenant / subject / trace identifiers
//! 3. intent      - intent reference (and optional registry lookup)
//! 4. security    - network, privileged profile, secret-like parameters
//! 5. sandbox     - admissible profile
//! 6. resources   - limits present and under the policy ceilings
//! 7. state       - replay guard and anti-chaining
//!
//! Cheap structural checks come first, privilege checks precede resource
//! checks, and the stateful replay lookup runs last. Validators never mutate
//! the replay guard; consuming an id is the caller's job after a full allow.

pub mod context;
pub mod intent;
pub mod resources;
pub mod sandbox;
pub mod schema;
pub mod security;
pub mod state;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::cache::RequestCache;
use crate::config::ResourcePolicy;
use crate::types::{ExecutionRequest, Verdict};

pub use context::ContextValidator;
pub use intent::{InMemoryIntentRegistry, IntentRegistry, IntentStatus, IntentValidator};
pub use resources::{ParsedLimits, ResourcesValidator};
pub use sandbox::SandboxValidator;
pub use schema::SchemaValidator;
pub use security::SecurityValidator;
pub use state::StateValidator;

/// Pipeline stage names, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStage {
    Schema,
    Context,
    Intent,
    Security,
    Sandbox,
    Resources,
    State,
}

impl fmt::Display for ValidationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValidationStage::Schema => "schema",
            ValidationStage::Context => "context",
            ValidationStage::Intent => "intent",
            ValidationStage::Security => "security",
            ValidationStage::Sandbox => "sandbox",
            ValidationStage::Resources => "resources",
            ValidationStage::State => "state",
        };
        f.write_str(name)
    }
}

/// Read-only inputs shared by every stage besides the request itself.
pub struct ValidationContext<'a> {
    pub cache: &'a RequestCache,
}

/// One admission check.
pub trait Validator: Send + Sync {
    fn stage(&self) -> ValidationStage;

    fn validate(&self, request: &ExecutionRequest, ctx: &ValidationContext<'_>) -> Verdict;
}

/// The ordered list of validators.
pub struct ValidationPipeline {
    stages: Vec<Box<dyn Validator>>,
}

impl ValidationPipeline {
    /// Build the standard seven-stage pipeline. The stage order is fixed.
    pub fn new(policy: ResourcePolicy, intent_registry: Option<Arc<dyn IntentRegistry>>) -> Self {
        let stages: Vec<Box<dyn Validator>> = vec![
            Box::new(SchemaValidator),
            Box::new(ContextValidator),
            Box::new(IntentValidator::new(intent_registry)),
            Box::new(SecurityValidator),
            Box::new(SandboxValidator),
            Box::new(ResourcesValidator::new(policy)),
            Box::new(StateValidator),
        ];
        Self { stages }
    }

    pub fn stages(&self) -> Vec<ValidationStage> {
        self.stages.iter().map(|v| v.stage()).collect()
    }

    /// Run every stage in order, stopping at the first rejection.
    pub fn validate(&self, request: &ExecutionRequest, cache: &RequestCache) -> Verdict {
        let ctx = ValidationContext { cache };
        for validator in &self.stages {
            let verdict = validator.validate(request, &ctx);
            if let Verdict::Reject(rejection) = &verdict {
                tracing::debug!(
                    stage = %validator.stage(),
                    code = %rejection.code,
                    "Validation stage rejected request"
                );
                return verdict;
            }
        }
        Verdict::Allow
    }
}

impl Default for ValidationPipeline {
    fn default() -> Self {
        Self::new(ResourcePolicy::default(), None)
    }
}

/// Request builders shared by the stage tests.
#[cfg(test)]
pub(crate) mod fixtures {
    use crate::types::*;
    use serde_json::Map;

    pub const TENANT: &str = "0b6f6a8e-3d1c-4d55-9f3e-6d1b2c4a7e90";
    pub const SUBJECT: &str = "5e2d9c41-8a7b-4f0e-b1d3-7c6e5a4b3f21";
    pub const TRACE: &str = "a1b2c3d4-e5f6-4a7b-8c9d-0e1f2a3b4c5d";
    pub const INTENT: &str = "9f8e7d6c-5b4a-4392-8170-6f5e4d3c2b1a";

    pub fn valid_request() -> ExecutionRequest {
        ExecutionRequest {
            execution_request_id: "c3d4e5f6-a7b8-4c9d-8e0f-1a2b3c4d5e6f".to_string(),
            execution_request_version: "1.0".to_string(),
            intent_ref: IntentRef {
                intent_id: INTENT.to_string(),
                intent_version: "1.0".to_string(),
                trace_id: TRACE.to_string(),
            },
            execution_spec: ExecutionSpec {
                executor: "execution".to_string(),
                target: "echo hello".to_string(),
                parameters: Map::new(),
            },
            context: RequestContext {
                tenant_id: TENANT.to_string(),
                subject_id: SUBJECT.to_string(),
                workspace_id: None,
                trace_id: TRACE.to_string(),
            },
            sandbox: SandboxRequest {
                profile: "default".to_string(),
                network: "disabled".to_string(),
                filesystem: "ephemeral".to_string(),
            },
            resources: ResourceRequest {
                cpu: "500m".to_string(),
                memory: "128Mi".to_string(),
                timeout_ms: Some(5000),
            },
            artifacts: ArtifactRequest {
                capture_stdout: true,
                capture_stderr: true,
                output_files: Vec::new(),
                persist: false,
            },
            audit: AuditMetadata::default(),
        }
    }
}
