//! Core engine - graph model, resolution, transformation, scheduling, execution

pub mod adjacency;
pub mod builder;
pub mod executor;
pub mod future;
pub mod graph;
pub mod plan;
pub mod scheduler;
pub mod transform;

pub use adjacency::{Adjacency, VertexId};
pub use builder::{ActionOptions, Handle, ModuleBuilder};
pub use executor::{
    DeploymentResult, Executor, Services, VertexEvent, VertexOutcome, VertexOutput, VertexReport,
};
pub use future::{
    ArgValue, Future, ParameterFuture, ParameterKind, RegisteredParameters, ResolutionContext,
    ResolvedArg, VertexRef,
};
pub use graph::{DeclarativeGraph, DeclarativeKind, DeclarativeVertex};
pub use plan::{ExecutionGraph, ExecutionNode, ExecutionVertex};
pub use scheduler::{Scheduler, VertexStatus};
pub use transform::transform;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, crate::error::DeployError>;
