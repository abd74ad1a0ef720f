//! deployflow - declarative on-chain deployments
//!
//! Modules declare deployment actions and their dependencies; the engine
//! resolves them into an execution graph, runs independent actions
//! concurrently, and drives every transaction to confirmation, replacing
//! stalled ones with fee-bumped resends.

pub mod artifacts;
pub mod chain;
pub mod config;
pub mod core;
pub mod error;
pub mod journal;
pub mod module;
pub mod providers;

// Re-exports
pub use artifacts::{Artifact, ArtifactStore};
pub use chain::{DevChain, DevChainConfig, TransactionEngine};
pub use config::{Config, EngineConfig, JsonParameters};
pub use core::{
    transform, ActionOptions, DeclarativeGraph, DeploymentResult, ExecutionGraph, Executor,
    Handle, ModuleBuilder, Services, VertexEvent, VertexOutcome, VertexOutput,
};
pub use error::{DeployError, ParamErrorKind};
pub use journal::DeploymentJournal;
pub use module::{load_module, ModuleFile};

/// Result type alias
pub type Result<T> = anyhow::Result<T>;
