//! Stage 1: mandatory field presence.

use super::{ValidationContext, ValidationStage, Validator};
use crate::types::{ExecutionRequest, RejectionCode, Verdict};

pub struct SchemaValidator;

impl SchemaValidator {
    /// Wire path of the first mandatory field that is absent, in check order.
    pub fn first_missing_field(request: &ExecutionRequest) -> Option<&'static str> {
        let checks: [(&'static str, bool); 12] = [
            (
                "execution_request_id",
                request.execution_request_id.is_empty(),
            ),
            ("intent_ref.intent_id", request.intent_ref.intent_id.is_empty()),
            (
                "intent_ref.intent_version",
                request.intent_ref.intent_version.is_empty(),
            ),
            (
                "execution_spec.executor",
                request.execution_spec.executor.is_empty(),
            ),
            (
                "execution_spec.target",
                request.execution_spec.target.is_empty(),
            ),
            ("context.tenant_id", request.context.tenant_id.is_empty()),
            ("context.subject_id", request.context.subject_id.is_empty()),
            ("context.trace_id", request.context.trace_id.is_empty()),
            ("sandbox.profile", request.sandbox.profile.is_empty()),
            ("resources.cpu", request.resources.cpu.is_empty()),
            ("resources.memory", request.resources.memory.is_empty()),
            ("resources.timeout_ms", request.resources.timeout().is_none()),
        ];

        checks
            .into_iter()
            .find(|(_, missing)| *missing)
            .map(|(field, _)| field)
    }
}

impl Validator for SchemaValidator {
    fn stage(&self) -> ValidationStage {
        ValidationStage::Schema
    }

    fn validate(&self, request: &ExecutionRequest, _ctx: &ValidationContext<'_>) -> Verdict {
        match Self::first_missing_field(request) {
            Some(field) => Verdict::reject(
                RejectionCode::SchemaMissingField,
                format!("Missing mandatory field: {}", field),
            ),
            None => Verdict::Allow,
        }
    }
}
