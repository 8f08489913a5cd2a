//! Stage 6: resource limits.
//!
//! Limits are parsed into millicores, bytes and milliseconds before they are
//! compared with the policy ceilings.

use super::{ValidationContext, ValidationStage, Validator};
use crate::config::ResourcePolicy;
use crate::quantity::{CpuQuantity, MemoryQuantity};
use crate::types::{ExecutionRequest, RejectionCode, Verdict};

/// Requested limits after parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedLimits {
    pub cpu: CpuQuantity,
    pub memory: MemoryQuantity,
    pub timeout_ms: u64,
}

impl ParsedLimits {
    /// Parse the textual limits of a request. Missing, unparseable or zero
    /// quantities are reported with the "missing" code of their field.
    pub fn from_request(request: &ExecutionRequest) -> Result<Self, Verdict> {
        let resources = &request.resources;

        if resources.cpu.is_empty() {
            return Err(Verdict::reject(RejectionCode::ResourcesCpu, "Missing CPU limit"));
        }
        if resources.memory.is_empty() {
            return Err(Verdict::reject(
                RejectionCode::ResourcesMemory,
                "Missing memory limit",
            ));
        }
        let Some(timeout_ms) = resources.timeout() else {
            return Err(Verdict::reject(RejectionCode::ResourcesTimeout, "Missing timeout"));
        };

        let cpu = match resources.cpu.parse::<CpuQuantity>() {
            Ok(cpu) if !cpu.is_zero() => cpu,
            Ok(_) => {
                return Err(Verdict::reject(
                    RejectionCode::ResourcesCpu,
                    "CPU limit must be greater than zero",
                ))
            }
            Err(e) => {
                return Err(Verdict::reject(
                    RejectionCode::ResourcesCpu,
                    format!("Invalid CPU limit: {}", e),
                ))
            }
        };

        let memory = match resources.memory.parse::<MemoryQuantity>() {
            Ok(memory) if !memory.is_zero() => memory,
            Ok(_) => {
                return Err(Verdict::reject(
                    RejectionCode::ResourcesMemory,
                    "Memory limit must be greater than zero",
                ))
            }
            Err(e) => {
                return Err(Verdict::reject(
                    RejectionCode::ResourcesMemory,
                    format!("Invalid memory limit: {}", e),
                ))
            }
        };

        Ok(Self {
            cpu,
            memory,
            timeout_ms,
        })
    }

    pub fn within(&self, policy: &ResourcePolicy) -> bool {
        self.cpu <= policy.max_cpu
            && self.memory <= policy.max_memory
            && self.timeout_ms <= policy.max_timeout_ms
    }
}

pub struct ResourcesValidator {
    policy: ResourcePolicy,
}

impl ResourcesValidator {
    pub fn new(policy: ResourcePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ResourcePolicy {
        &self.policy
    }
}

impl Validator for ResourcesValidator {
    fn stage(&self) -> ValidationStage {
        ValidationStage::Resources
    }

    fn validate(&self, request: &ExecutionRequest, _ctx: &ValidationContext<'_>) -> Verdict {
        let limits = match ParsedLimits::from_request(request) {
            Ok(limits) => limits,
            Err(verdict) => return verdict,
        };

        if !limits.within(&self.policy) {
            return Verdict::reject(
                RejectionCode::ResourcesExceedPolicy,
                format!(
                    "Resource limits exceed policy (max cpu {}, max memory {}, max timeout {}ms)",
                    self.policy.max_cpu, self.policy.max_memory, self.policy.max_timeout_ms
                ),
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

    fn run(cpu: &str, memory: &str, timeout_ms: Option<u64>) -> Option<RejectionCode> {
        let cache = RequestCache::new();
        let mut request = valid_request();
        request.resources.cpu = cpu.to_string();
        request.resources.memory = memory.to_string();
        request.resources.timeout_ms = timeout_ms;
        ResourcesValidator::new(ResourcePolicy::default())
            .validate(&request, &ValidationContext { cache: &cache })
            .rejection()
            .map(|r| r.code)
    }

    #[test]
    fn test_within_policy() {
        assert_eq!(run("500m", "128Mi", Some(5000)), None);
        assert_eq!(run("2000m", "512Mi", Some(300_000)), None);
        assert_eq!(run("2", "512Mi", Some(1)), None);
    }

    #[test]
    fn test_ceiling_adjacent_values_compare_numerically() {
        // Both of these would be misordered by string comparison.
        assert_eq!(run("300m", "128Mi", Some(5000)), None);
        assert_eq!(run("4000m", "128Mi", Some(5000)), Some(RejectionCode::ResourcesExceedPolicy));
        assert_eq!(run("2001m", "128Mi", Some(5000)), Some(RejectionCode::ResourcesExceedPolicy));
        assert_eq!(run("500m", "1Gi", Some(5000)), Some(RejectionCode::ResourcesExceedPolicy));
        assert_eq!(run("500m", "96Mi", Some(5000)), None);
    }

    #[test]
    fn test_timeout_ceiling() {
        assert_eq!(
            run("500m", "128Mi", Some(300_001)),
            Some(RejectionCode::ResourcesExceedPolicy)
        );
    }

    #[test]
    fn test_missing_limits() {
        assert_eq!(run("", "128Mi", Some(5000)), Some(RejectionCode::ResourcesCpu));
        assert_eq!(run("500m", "", Some(5000)), Some(RejectionCode::ResourcesMemory));
        assert_eq!(run("500m", "128Mi", None), Some(RejectionCode::ResourcesTimeout));
        assert_eq!(run("500m", "128Mi", Some(0)), Some(RejectionCode::ResourcesTimeout));
    }

    #[test]
    fn test_unparseable_limits_reuse_missing_codes() {
        assert_eq!(run("fast", "128Mi", Some(5000)), Some(RejectionCode::ResourcesCpu));
        assert_eq!(run("0m", "128Mi", Some(5000)), Some(RejectionCode::ResourcesCpu));
        assert_eq!(run("500m", "lots", Some(5000)), Some(RejectionCode::ResourcesMemory));
        assert_eq!(run("500m", "0Mi", Some(5000)), Some(RejectionCode::ResourcesMemory));
    }

    #[test]
    fn test_custom_policy() {
        let policy = ResourcePolicy {
            max_cpu: CpuQuantity::from_millicores(250),
            ..Default::default()
        };
        let validator = ResourcesValidator::new(policy);
        let cache = RequestCache::new();
        let request = valid_request();
        let verdict = validator.validate(&request, &ValidationContext { cache: &cache });
        assert_eq!(
            verdict.rejection().map(|r| r.code),
            Some(RejectionCode::ResourcesExceedPolicy)
        );
        assert_eq!(validator.policy().max_cpu.millicores(), 250);
    }
}
