//! Stage 5: sandbox profile.

use super::{ValidationContext, ValidationStage, Validator};
use crate::types::{ExecutionRequest, RejectionCode, SandboxProfile, Verdict};

/// Only `default` and `restricted` are admitted. `privileged` never reaches
/// this stage through the pipeline since the security stage rejects it first.
pub struct SandboxValidator;

impl Validator for SandboxValidator {
    fn stage(&self) -> ValidationStage {
        ValidationStage::Sandbox
    }

    fn validate(&self, request: &ExecutionRequest, _ctx: &ValidationContext<'_>) -> Verdict {
        let requested = request.sandbox.profile.as_str();
        match requested.parse::<SandboxProfile>() {
            Ok(profile) if profile.is_admissible() => Verdict::Allow,
            _ => Verdict::reject(
                RejectionCode::SandboxInvalidProfile,
                format!("Invalid sandbox profile: {}", requested),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::RequestCache;
    use crate::validation::fixtures::valid_request;

    fn run(profile: &str) -> Verdict {
        let cache = RequestCache::new();
        let mut request = valid_request();
        request.sandbox.profile = profile.to_string();
        SandboxValidator.validate(&request, &ValidationContext { cache: &cache })
    }

    #[test]
    fn test_admissible_profiles() {
        assert!(run("default").is_allow());
        assert!(run("restricted").is_allow());
    }

    #[test]
    fn test_other_profiles_rejected() {
        for profile in ["privileged", "Default", "docker", " default"] {
            let verdict = run(profile);
            let rejection = verdict.rejection().unwrap();
            assert_eq!(rejection.code, RejectionCode::SandboxInvalidProfile);
            assert!(rejection.reason.ends_with(profile));
        }
    }
}
