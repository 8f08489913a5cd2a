//! Rejection taxonomy
//!
//! The closed set of codes the gateway hands back to callers and auditors.
//! Codes are part of the external contract: a code is never reassigned to a
//! different condition, new conditions get new codes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Violation class, rendered as the code prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RejectionClass {
    Context,
    Intent,
    Schema,
    Security,
    Sandbox,
    Resources,
    State,
}

impl RejectionClass {
    pub fn prefix(&self) -> &'static str {
        match self {
            RejectionClass::Context => "R-CTX",
            RejectionClass::Intent => "R-INTENT",
            RejectionClass::Schema => "R-SCHEMA",
            RejectionClass::Security => "R-SEC",
            RejectionClass::Sandbox => "R-SBX",
            RejectionClass::Resources => "R-RES",
            RejectionClass::State => "R-STATE",
        }
    }
}

impl fmt::Display for RejectionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Stable rejection codes.
///
/// Some codes are reserved for collaborators outside the core and are never
/// raised by the built-in validators: `IntentUnknown` and `IntentClosed` come
/// from an intent registry, `StateConsumed` and `StateMutation` from a durable
/// request store, `ContextWorkspaceMismatch`, `SchemaUnknownFields` and
/// `SandboxEscalation` from deployments that add those checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum RejectionCode {
    ContextTenant,
    ContextSubject,
    ContextTrace,
    ContextWorkspaceMismatch,

    IntentMissing,
    IntentUnknown,
    IntentVersion,
    IntentClosed,

    SchemaMalformed,
    SchemaUnknownFields,
    SchemaMissingField,

    SecurityNetwork,
    SecurityPrivileged,
    SecuritySecrets,

    SandboxInvalidProfile,
    SandboxEscalation,
    SandboxCreateFailed,
    SandboxExecutionFailed,

    ResourcesCpu,
    ResourcesMemory,
    ResourcesTimeout,
    ResourcesExceedPolicy,

    StateConsumed,
    StateReplay,
    StateMutation,
    StateChained,
    StateInternal,
}

impl RejectionCode {
    /// Every code, in taxonomy order.
    pub const ALL: [RejectionCode; 27] = [
        RejectionCode::ContextTenant,
        RejectionCode::ContextSubject,
        RejectionCode::ContextTrace,
        RejectionCode::ContextWorkspaceMismatch,
        RejectionCode::IntentMissing,
        RejectionCode::IntentUnknown,
        RejectionCode::IntentVersion,
        RejectionCode::IntentClosed,
        RejectionCode::SchemaMalformed,
        RejectionCode::SchemaUnknownFields,
        RejectionCode::SchemaMissingField,
        RejectionCode::SecurityNetwork,
        RejectionCode::SecurityPrivileged,
        RejectionCode::SecuritySecrets,
        RejectionCode::SandboxInvalidProfile,
        RejectionCode::SandboxEscalation,
        RejectionCode::SandboxCreateFailed,
        RejectionCode::SandboxExecutionFailed,
        RejectionCode::ResourcesCpu,
        RejectionCode::ResourcesMemory,
        RejectionCode::ResourcesTimeout,
        RejectionCode::ResourcesExceedPolicy,
        RejectionCode::StateConsumed,
        RejectionCode::StateReplay,
        RejectionCode::StateMutation,
        RejectionCode::StateChained,
        RejectionCode::StateInternal,
    ];

    pub fn class(&self) -> RejectionClass {
        use RejectionCode::*;
        match self {
            ContextTenant | ContextSubject | ContextTrace | ContextWorkspaceMismatch => {
                RejectionClass::Context
            }
            IntentMissing | IntentUnknown | IntentVersion | IntentClosed => RejectionClass::Intent,
            SchemaMalformed | SchemaUnknownFields | SchemaMissingField => RejectionClass::Schema,
            SecurityNetwork | SecurityPrivileged | SecuritySecrets => RejectionClass::Security,
            SandboxInvalidProfile | SandboxEscalation | SandboxCreateFailed
            | SandboxExecutionFailed => RejectionClass::Sandbox,
            ResourcesCpu | ResourcesMemory | ResourcesTimeout | ResourcesExceedPolicy => {
                RejectionClass::Resources
            }
            StateConsumed | StateReplay | StateMutation | StateChained | StateInternal => {
                RejectionClass::State
            }
        }
    }

    /// Wire form, e.g. `R-SEC-002`.
    pub fn as_str(&self) -> &'static str {
        use RejectionCode::*;
        match self {
            ContextTenant => "R-CTX-001",
            ContextSubject => "R-CTX-002",
            ContextTrace => "R-CTX-003",
            ContextWorkspaceMismatch => "R-CTX-004",
            IntentMissing => "R-INTENT-001",
            IntentUnknown => "R-INTENT-002",
            IntentVersion => "R-INTENT-003",
            IntentClosed => "R-INTENT-004",
            SchemaMalformed => "R-SCHEMA-001",
            SchemaUnknownFields => "R-SCHEMA-002",
            SchemaMissingField => "R-SCHEMA-003",
            SecurityNetwork => "R-SEC-001",
            SecurityPrivileged => "R-SEC-002",
            SecuritySecrets => "R-SEC-003",
            SandboxInvalidProfile => "R-SBX-001",
            SandboxEscalation => "R-SBX-002",
            SandboxCreateFailed => "R-SBX-003",
            SandboxExecutionFailed => "R-SBX-004",
            ResourcesCpu => "R-RES-001",
            ResourcesMemory => "R-RES-002",
            ResourcesTimeout => "R-RES-003",
            ResourcesExceedPolicy => "R-RES-004",
            StateConsumed => "R-STATE-001",
            StateReplay => "R-STATE-002",
            StateMutation => "R-STATE-003",
            StateChained => "R-STATE-004",
            StateInternal => "R-STATE-005",
        }
    }

    pub fn description(&self) -> &'static str {
        use RejectionCode::*;
        match self {
            ContextTenant => "Missing or invalid tenant_id",
            ContextSubject => "Missing or invalid subject_id",
            ContextTrace => "Missing or invalid trace_id",
            ContextWorkspaceMismatch => "Workspace mismatch",
            IntentMissing => "Missing or invalid intent_id",
            IntentUnknown => "Unknown intent_id",
            IntentVersion => "Intent version mismatch",
            IntentClosed => "Intent already closed",
            SchemaMalformed => "Payload not matching schema",
            SchemaUnknownFields => "Unknown fields present",
            SchemaMissingField => "Missing mandatory fields",
            SecurityNetwork => "Network access requested but forbidden",
            SecurityPrivileged => "Privileged sandbox requested without approval",
            SecuritySecrets => "Attempt to access secrets",
            SandboxInvalidProfile => "Invalid sandbox profile",
            SandboxEscalation => "Sandbox profile escalation",
            SandboxCreateFailed => "Sandbox creation failed",
            SandboxExecutionFailed => "Sandbox execution failed",
            ResourcesCpu => "CPU limit missing",
            ResourcesMemory => "Memory limit missing",
            ResourcesTimeout => "Timeout missing",
            ResourcesExceedPolicy => "Resource limits exceed policy",
            StateConsumed => "Execution request already consumed",
            StateReplay => "Replay attempt detected",
            StateMutation => "Mutation detected",
            StateChained => "Chained execution attempt",
            StateInternal => "Internal lifecycle violation",
        }
    }
}

impl fmt::Display for RejectionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unrecognised code string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown rejection code: {0}")]
pub struct UnknownRejectionCode(pub String);

impl FromStr for RejectionCode {
    type Err = UnknownRejectionCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RejectionCode::ALL
            .iter()
            .copied()
            .find(|code| code.as_str() == s)
            .ok_or_else(|| UnknownRejectionCode(s.to_string()))
    }
}

impl From<RejectionCode> for String {
    fn from(code: RejectionCode) -> Self {
        code.as_str().to_string()
    }
}

impl TryFrom<String> for RejectionCode {
    type Error = UnknownRejectionCode;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A classified denial: the code plus a caller-facing reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub code: RejectionCode,
    pub reason: String,
}

impl Rejection {
    pub fn new(code: RejectionCode, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.reason)
    }
}

/// Outcome of a validation stage or of the whole pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Reject(Rejection),
}

impl Verdict {
    pub fn reject(code: RejectionCode, reason: impl Into<String>) -> Self {
        Verdict::Reject(Rejection::new(code, reason))
    }

    pub fn is_allow(&self) -> bool {
        matches!(self, Verdict::Allow)
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Verdict::Allow => None,
            Verdict::Reject(rejection) => Some(rejection),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_codes_are_unique() {
        let wire: HashSet<&str> = RejectionCode::ALL.iter().map(|c| c.as_str()).collect();
        assert_eq!(wire.len(), RejectionCode::ALL.len());
    }

    #[test]
    fn test_code_prefix_matches_class() {
        for code in RejectionCode::ALL {
            let prefix = format!("{}-", code.class().prefix());
            assert!(
                code.as_str().starts_with(&prefix),
                "{} does not start with {}",
                code,
                prefix
            );
        }
    }

    #[test]
    fn test_known_wire_values() {
        assert_eq!(RejectionCode::SchemaMissingField.as_str(), "R-SCHEMA-003");
        assert_eq!(RejectionCode::SecurityPrivileged.as_str(), "R-SEC-002");
        assert_eq!(RejectionCode::StateReplay.as_str(), "R-STATE-002");
        assert_eq!(RejectionCode::StateChained.as_str(), "R-STATE-004");
        assert_eq!(RejectionCode::ResourcesExceedPolicy.as_str(), "R-RES-004");
    }

    #[test]
    fn test_parse_and_serde() {
        assert_eq!(
            "R-SBX-001".parse::<RejectionCode>().unwrap(),
            RejectionCode::SandboxInvalidProfile
        );
        assert!("R-SBX-999".parse::<RejectionCode>().is_err());

        let json = serde_json::to_string(&RejectionCode::SecuritySecrets).unwrap();
        assert_eq!(json, "\"R-SEC-003\"");
    }

    #[test]
    fn test_verdict_helpers() {
        let verdict = Verdict::reject(RejectionCode::StateReplay, "Replay attempt detected");
        assert!(!verdict.is_allow());
        assert_eq!(
            verdict.rejection().map(|r| r.code),
            Some(RejectionCode::StateReplay)
        );
        assert!(Verdict::Allow.rejection().is_none());
    }
}
