//! Stage 4: security posture.
//!
//! The secret scan is a conservative heuristic over the serialized
//! parameters. It catches obvious credential passing, it does not prove the
//! absence of secrets, and it will flag innocent keys such as `"secretary"`.

use super::{ValidationContext, ValidationStage, Validator};
use crate::types::{
    ExecutionRequest, RejectionCode, SandboxProfile, Verdict, NETWORK_DISABLED,
};

/// Substrings that mark a parameter payload as secret-bearing. Lowercase.
pub const SECRET_PATTERNS: [&str; 5] = [
    "password",
    "secret",
    "api_key",
    "private_key",
    "credential",
];

/// First secret-indicative pattern found in `text`, case-insensitively.
pub fn find_secret_pattern(text: &str) -> Option<&'static str> {
    let lower = text.to_lowercase();
    SECRET_PATTERNS
        .iter()
        .copied()
        .find(|pattern| lower.contains(pattern))
}

pub struct SecurityValidator;

impl Validator for SecurityValidator {
    fn stage(&self) -> ValidationStage {
        ValidationStage::Security
    }

    fn validate(&self, request: &ExecutionRequest, _ctx: &ValidationContext<'_>) -> Verdict {
        // An empty network field means no network was requested.
        let network = request.sandbox.network.as_str();
        if !network.is_empty() && network != NETWORK_DISABLED {
            return Verdict::reject(
                RejectionCode::SecurityNetwork,
                "Network access requested but forbidden by policy",
            );
        }

        if request.sandbox.profile == SandboxProfile::Privileged.as_str() {
            return Verdict::reject(
                RejectionCode::SecurityPrivileged,
                "Privileged sandbox requested without approval",
            );
        }

        let serialized = match serde_json::to_string(&request.execution_spec.parameters) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("Could not serialize parameters for secret scan: {}", e);
                return Verdict::reject(
                    RejectionCode::SecuritySecrets,
                    "Parameters could not be inspected",
                );
            }
        };
        if let Some(pattern) = find_secret_pattern(&serialized) {
            tracing::debug!(pattern, "Secret-like pattern in execution parameters");
            return Verdict::reject(
                RejectionCode::SecuritySecrets,
                "Attempt to access secrets detected",
            );
        }

        Verdict::Allow
    }
}
