//! Canonical execution request
//!
//! Every field defaults when absent so that the schema stage, not the JSON
//! decoder, is the one that names a missing field.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Network mode that counts as "no network requested".
pub const NETWORK_DISABLED: &str = "disabled";

/// An explicit `null` decodes like an absent field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionRequest {
    #[serde(deserialize_with = "null_as_default")]
    pub execution_request_id: String,
    #[serde(skip_serializing_if = "String::is_empty", deserialize_with = "null_as_default")]
    pub execution_request_version: String,
    #[serde(deserialize_with = "null_as_default")]
    pub intent_ref: IntentRef,
    #[serde(deserialize_with = "null_as_default")]
    pub execution_spec: ExecutionSpec,
    #[serde(deserialize_with = "null_as_default")]
    pub context: RequestContext,
    #[serde(deserialize_with = "null_as_default")]
    pub sandbox: SandboxRequest,
    #[serde(deserialize_with = "null_as_default")]
    pub resources: ResourceRequest,
    #[serde(deserialize_with = "null_as_default")]
    pub artifacts: ArtifactRequest,
    #[serde(deserialize_with = "null_as_default")]
    pub audit: AuditMetadata,
}

/// Reference to the upstream authorization decision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntentRef {
    #[serde(deserialize_with = "null_as_default")]
    pub intent_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub intent_version: String,
    #[serde(deserialize_with = "null_as_default")]
    pub trace_id: String,
}

/// What to run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionSpec {
    #[serde(deserialize_with = "null_as_default")]
    pub executor: String,
    #[serde(deserialize_with = "null_as_default")]
    pub target: String,
    #[serde(deserialize_with = "null_as_default")]
    pub parameters: Map<String, Value>,
}

impl ExecutionSpec {
    /// String entries of `parameters.args`, in order. Non-string entries are skipped.
    pub fn string_args(&self) -> Vec<String> {
        match self.parameters.get("args") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Caller identity and trace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestContext {
    #[serde(deserialize_with = "null_as_default")]
    pub tenant_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub subject_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub trace_id: String,
}

/// Requested isolation posture.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxRequest {
    #[serde(deserialize_with = "null_as_default")]
    pub profile: String,
    #[serde(deserialize_with = "null_as_default")]
    pub network: String,
    #[serde(deserialize_with = "null_as_default")]
    pub filesystem: String,
}

/// Requested limits, still in their caller-supplied textual form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceRequest {
    #[serde(deserialize_with = "null_as_default")]
    pub cpu: String,
    #[serde(deserialize_with = "null_as_default")]
    pub memory: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl ResourceRequest {
    /// Timeout in milliseconds, treating zero as absent.
    pub fn timeout(&self) -> Option<u64> {
        self.timeout_ms.filter(|ms| *ms > 0)
    }
}

/// What the caller wants back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactRequest {
    #[serde(deserialize_with = "null_as_default")]
    pub capture_stdout: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub capture_stderr: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub output_files: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub persist: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditMetadata {
    #[serde(deserialize_with = "null_as_default")]
    pub execution_trace_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub parent_trace_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub requested_by: String,
    #[serde(deserialize_with = "null_as_default")]
    pub timestamp: String,
}

/// Named isolation profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxProfile {
    Default,
    Restricted,
    Privileged,
}

impl SandboxProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            SandboxProfile::Default => "default",
            SandboxProfile::Restricted => "restricted",
            SandboxProfile::Privileged => "privileged",
        }
    }

    /// Profiles the pipeline may admit on its own.
    pub fn is_admissible(&self) -> bool {
        matches!(self, SandboxProfile::Default | SandboxProfile::Restricted)
    }
}

impl fmt::Display for SandboxProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SandboxProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(SandboxProfile::Default),
            "restricted" => Ok(SandboxProfile::Restricted),
            "privileged" => Ok(SandboxProfile::Privileged),
            other => Err(format!("unknown sandbox profile: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_fields_decode_as_empty() {
        let request: ExecutionRequest =
            serde_json::from_value(json!({ "execution_request_id": "abc" })).unwrap();
        assert_eq!(request.execution_request_id, "abc");
        assert!(request.context.tenant_id.is_empty());
        assert_eq!(request.resources.timeout_ms, None);
        assert!(request.execution_spec.parameters.is_empty());
    }

    #[test]
    fn test_null_fields_decode_as_absent() {
        let request: ExecutionRequest = serde_json::from_value(json!({
            "execution_request_id": "abc",
            "context": { "tenant_id": null, "subject_id": "s", "workspace_id": null },
            "sandbox": null,
            "resources": { "cpu": null, "timeout_ms": null },
            "artifacts": { "capture_stdout": null, "output_files": null }
        }))
        .unwrap();
        assert!(request.context.tenant_id.is_empty());
        assert_eq!(request.context.subject_id, "s");
        assert_eq!(request.context.workspace_id, None);
        assert_eq!(request.sandbox, SandboxRequest::default());
        assert!(request.resources.cpu.is_empty());
        assert_eq!(request.resources.timeout_ms, None);
        assert!(!request.artifacts.capture_stdout);
        assert!(request.artifacts.output_files.is_empty());
    }

    #[test]
    fn test_zero_timeout_counts_as_absent() {
        let resources = ResourceRequest {
            timeout_ms: Some(0),
            ..Default::default()
        };
        assert_eq!(resources.timeout(), None);
    }

    #[test]
    fn test_string_args_skip_non_strings() {
        let spec: ExecutionSpec = serde_json::from_value(json!({
            "executor": "execution",
            "target": "echo",
            "parameters": { "args": ["a", 1, "b", null] }
        }))
        .unwrap();
        assert_eq!(spec.string_args(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_profile_parsing() {
        assert_eq!("default".parse::<SandboxProfile>(), Ok(SandboxProfile::Default));
        assert!("Default".parse::<SandboxProfile>().is_err());
        assert!(!SandboxProfile::Privileged.is_admissible());
    }
}
