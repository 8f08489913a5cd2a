//! Stage 3: intent reference.
//!
//! The structural checks are local. Whether the intent exists and is still
//! open is answered by an external registry; when none is configured that
//! lookup is skipped and `R-INTENT-002` / `R-INTENT-004` are never raised.

use parking_lot::RwLock;
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use super::{ValidationContext, ValidationStage, Validator};
use crate::types::{is_valid_identifier, ExecutionRequest, RejectionCode, Verdict};

/// Two-component dotted numeric version, e.g. `1.0`.
static INTENT_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]+\.[0-9]+$").unwrap_or_else(|e| panic!("intent version pattern: {}", e))
});

/// Registry answer for an intent reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentStatus {
    Open,
    Closed,
    Unknown,
}

/// Lookup into the upstream authorization system.
pub trait IntentRegistry: Send + Sync {
    fn lookup(&self, intent_id: &str, intent_version: &str) -> IntentStatus;
}

/// Registry held in memory, keyed by `(intent_id, intent_version)`.
#[derive(Debug, Default)]
pub struct InMemoryIntentRegistry {
    intents: RwLock<HashMap<(String, String), IntentStatus>>,
}

impl InMemoryIntentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, intent_id: &str, intent_version: &str, status: IntentStatus) {
        self.intents
            .write()
            .insert((intent_id.to_string(), intent_version.to_string()), status);
    }
}

impl IntentRegistry for InMemoryIntentRegistry {
    fn lookup(&self, intent_id: &str, intent_version: &str) -> IntentStatus {
        self.intents
            .read()
            .get(&(intent_id.to_string(), intent_version.to_string()))
            .copied()
            .unwrap_or(IntentStatus::Unknown)
    }
}

pub struct IntentValidator {
    registry: Option<Arc<dyn IntentRegistry>>,
}

impl IntentValidator {
    pub fn new(registry: Option<Arc<dyn IntentRegistry>>) -> Self {
        Self { registry }
    }

    pub fn is_valid_version(version: &str) -> bool {
        INTENT_VERSION.is_match(version)
    }
}

impl Validator for IntentValidator {
    fn stage(&self) -> ValidationStage {
        ValidationStage::Intent
    }

    fn validate(&self, request: &ExecutionRequest, _ctx: &ValidationContext<'_>) -> Verdict {
        let intent = &request.intent_ref;

        if intent.intent_id.is_empty() {
            return Verdict::reject(RejectionCode::IntentMissing, "Missing intent_id");
        }
        if !is_valid_identifier(&intent.intent_id) {
            return Verdict::reject(RejectionCode::IntentMissing, "Invalid intent_id format");
        }
        if !Self::is_valid_version(&intent.intent_version) {
            return Verdict::reject(
                RejectionCode::IntentVersion,
                "Invalid intent_version format",
            );
        }

        if let Some(registry) = &self.registry {
            match registry.lookup(&intent.intent_id, &intent.intent_version) {
                IntentStatus::Open => {}
                IntentStatus::Unknown => {
                    return Verdict::reject(RejectionCode::IntentUnknown, "Unknown intent_id")
                }
                IntentStatus::Closed => {
                    return Verdict::reject(RejectionCode::IntentClosed, "Intent already closed")
                }
            }
        }

        Verdict::Allow
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::RequestCache;
    use crate::validation::fixtures::{valid_request, INTENT};

    fn run(validator: &IntentValidator, request: &ExecutionRequest) -> Option<RejectionCode> {
        let cache = RequestCache::new();
        validator
            .validate(request, &ValidationContext { cache: &cache })
            .rejection()
            .map(|r| r.code)
    }

    #[test]
    fn test_version_pattern() {
        assert!(IntentValidator::is_valid_version("1.0"));
        assert!(IntentValidator::is_valid_version("12.345"));
        assert!(!IntentValidator::is_valid_version("1"));
        assert!(!IntentValidator::is_valid_version("1.0.0"));
        assert!(!IntentValidator::is_valid_version("v1.0"));
        assert!(!IntentValidator::is_valid_version("1."));
        assert!(!IntentValidator::is_valid_version(""));
    }

    #[test]
    fn test_intent_id_format() {
        let validator = IntentValidator::new(None);
        let mut request = valid_request();
        request.intent_ref.intent_id = "intent-7".to_string();
        assert_eq!(run(&validator, &request), Some(RejectionCode::IntentMissing));
    }

    #[test]
    fn test_bad_version() {
        let validator = IntentValidator::new(None);
        let mut request = valid_request();
        request.intent_ref.intent_version = "latest".to_string();
        assert_eq!(run(&validator, &request), Some(RejectionCode::IntentVersion));
    }

    #[test]
    fn test_no_registry_skips_lookup() {
        let validator = IntentValidator::new(None);
        assert_eq!(run(&validator, &valid_request()), None);
    }

    #[test]
    fn test_registry_lookup() {
        let registry = Arc::new(InMemoryIntentRegistry::new());
        let validator = IntentValidator::new(Some(registry.clone() as Arc<dyn IntentRegistry>));
        let request = valid_request();

        assert_eq!(run(&validator, &request), Some(RejectionCode::IntentUnknown));

        registry.register(INTENT, "1.0", IntentStatus::Closed);
        assert_eq!(run(&validator, &request), Some(RejectionCode::IntentClosed));

        registry.register(INTENT, "1.0", IntentStatus::Open);
        assert_eq!(run(&validator, &request), None);
    }
}
