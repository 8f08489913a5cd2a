//! Core types and data structures for the gateway runtime

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod error;
pub mod rejection;
pub mod request;
pub mod response;

pub use error::*;
pub use rejection::*;
pub use request::*;
pub use response::*;

/// Unique identifier for sandboxes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SandboxId(pub Uuid);

impl SandboxId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SandboxId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SandboxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SandboxId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Whether `value` is a syntactically valid 128-bit identifier (UUID text).
pub fn is_valid_identifier(value: &str) -> bool {
    Uuid::parse_str(value).is_ok()
}
