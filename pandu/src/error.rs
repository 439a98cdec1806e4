//! Top-level error for engine operations.
//!
//! Component-local errors (`GatewayError`, `ToolSourceError`, `StoreError`,
//! `RetrievalError`, `CacheError`) live next to their components and convert
//! into this type at the orchestrator boundary.

use thiserror::Error;

use crate::llm::GatewayError;
use crate::memory::StoreError;
use crate::tools::ToolSourceError;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed input to the core API (e.g. empty query).
    #[error("validation failed: {0}")]
    Validation(String),
    /// Every model in the fallback cascade failed.
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    /// Tool subsystem failure that could not be absorbed as an observation.
    #[error(transparent)]
    Tool(#[from] ToolSourceError),
    /// Persistent store failure that could not be degraded away.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Internal invariant violation.
    #[error("execution failed: {0}")]
    Execution(String),
}
