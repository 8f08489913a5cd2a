//! execgate runtime
//!
//! Admission control for sandboxed execution requests. A request passes a
//! fixed seven-stage validation pipeline, is checked against the replay
//! guard, runs once in a short-lived sandbox and is reduced to a minimal
//! audit entry. Every denial carries a stable rejection code.

pub mod audit;
pub mod cache;
pub mod config;
pub mod gateway;
pub mod quantity;
pub mod sandbox;
pub mod state;
pub mod types;
pub mod validation;

// Re-export commonly used types
pub use audit::{AuditEntry, AuditProjector, AuditSink, JsonlFileAuditSink, MemoryAuditSink, TracingAuditSink};
pub use cache::{CacheSweeper, RequestCache};
pub use config::{ConfigError, GatewayConfig, LogFormat, ResourcePolicy};
pub use gateway::{ExecutionGateway, GatewayBuilder};
pub use quantity::{CpuQuantity, MemoryQuantity, QuantityError};
pub use sandbox::{
    ExecutionOutput, ProcessBackend, Sandbox, SandboxBackend, SandboxLifecycle, SandboxLimits,
    SandboxResource,
};
pub use state::{ExecutionPhase, ExecutionState};
pub use types::*;
pub use validation::{ValidationPipeline, ValidationStage, Validator};

/// Crate version, reported by the health endpoint.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
