//! Stage 7: lifecycle state.
//!
//! Replay detection reads the replay guard; it never writes it.

use super::{ValidationContext, ValidationStage, Validator};
use crate::types::{ExecutionRequest, RejectionCode, Verdict};

pub struct StateValidator;

impl Validator for StateValidator {
    fn stage(&self) -> ValidationStage {
        ValidationStage::State
    }

    fn validate(&self, request: &ExecutionRequest, ctx: &ValidationContext<'_>) -> Verdict {
        if ctx.cache.contains(&request.execution_request_id) {
            return Verdict::reject(RejectionCode::StateReplay, "Replay attempt detected");
        }

        // One authorization trace justifies exactly one execution trace.
        if request.intent_ref.trace_id != request.context.trace_id {
            return Verdict::reject(
                RejectionCode::StateChained,
                "Chained execution attempt detected",
            );
        }

        Verdict::Allow
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::RequestCache;
    use crate::validation::fixtures::valid_request;

    #[test]
    fn test_fresh_request_allowed() {
        let cache = RequestCache::new();
        let verdict = StateValidator.validate(&valid_request(), &ValidationContext { cache: &cache });
        assert!(verdict.is_allow());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_replay_checked_before_chaining() {
        let cache = RequestCache::new();
        let mut request = valid_request();
        request.intent_ref.trace_id.clear();
        cache.insert(&request.execution_request_id);

        let verdict = StateValidator.validate(&request, &ValidationContext { cache: &cache });
        assert_eq!(
            verdict.rejection().map(|r| r.code),
            Some(RejectionCode::StateReplay)
        );
    }

    #[test]
    fn test_empty_intent_trace_is_chaining() {
        let cache = RequestCache::new();
        let mut request = valid_request();
        request.intent_ref.trace_id.clear();
        let verdict = StateValidator.validate(&request, &ValidationContext { cache: &cache });
        assert_eq!(
            verdict.rejection().map(|r| r.code),
            Some(RejectionCode::StateChained)
        );
    }
}
