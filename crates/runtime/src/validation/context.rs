//! Stage 2: caller identity and trace.

use super::{ValidationContext, ValidationStage, Validator};
use crate::types::{is_valid_identifier, ExecutionRequest, RejectionCode, Verdict};

/// Tenant, subject and trace must be present and valid identifiers. A badly
/// formatted value gets the same code as a missing one.
pub struct ContextValidator;

impl Validator for ContextValidator {
    fn stage(&self) -> ValidationStage {
        ValidationStage::Context
    }

    fn validate(&self, request: &ExecutionRequest, _ctx: &ValidationContext<'_>) -> Verdict {
        let context = &request.context;
        let fields = [
            ("tenant_id", &context.tenant_id, RejectionCode::ContextTenant),
            ("subject_id", &context.subject_id, RejectionCode::ContextSubject),
            ("trace_id", &context.trace_id, RejectionCode::ContextTrace),
        ];

        for (name, value, code) in &fields {
            if value.is_empty() {
                return Verdict::reject(*code, format!("Missing {}", name));
            }
        }

        for (name, value, code) in &fields {
            if !is_valid_identifier(value) {
                return Verdict::reject(*code, format!("Invalid {} format", name));
            }
        }

        Verdict::Allow
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::RequestCache;
    use crate::validation::fixtures::valid_request;

    fn run(request: &ExecutionRequest) -> Verdict {
        let cache = RequestCache::new();
        ContextValidator.validate(request, &ValidationContext { cache: &cache })
    }

    #[test]
    fn test_valid_context() {
        assert!(run(&valid_request()).is_allow());
    }

    #[test]
    fn test_missing_fields_map_to_codes() {
        let mut request = valid_request();
        request.context.subject_id.clear();
        let verdict = run(&request);
        let rejection = verdict.rejection().unwrap();
        assert_eq!(rejection.code, RejectionCode::ContextSubject);
        assert_eq!(rejection.reason, "Missing subject_id");
    }

    #[test]
    fn test_invalid_format_reuses_missing_code() {
        let mut request = valid_request();
        request.context.tenant_id = "acme-corp".to_string();
        let verdict = run(&request);
        let rejection = verdict.rejection().unwrap();
        assert_eq!(rejection.code, RejectionCode::ContextTenant);
        assert_eq!(rejection.reason, "Invalid tenant_id format");

        let mut request = valid_request();
        request.context.trace_id = "not-a-trace".to_string();
        assert_eq!(
            run(&request).rejection().map(|r| r.code),
            Some(RejectionCode::ContextTrace)
        );
    }

    #[test]
    fn test_missing_checked_before_format() {
        let mut request = valid_request();
        request.context.tenant_id = "bad".to_string();
        request.context.trace_id.clear();
        assert_eq!(
            run(&request).rejection().map(|r| r.code),
            Some(RejectionCode::ContextTrace)
        );
    }
}
