//! Feature flag dependency graph engine.
//!
//! - [`graph`]: adjacency view of flags and dependency edges
//! - [`validator`]: existence, cycle and redundancy checks for a dependency set
//! - [`lifecycle`]: activation/deactivation state machine
//! - [`audit`]: audit entries written in the same snapshot as each change
//! - [`projection`]: flat and nested response shapes
//! - [`service`]: the orchestrating [`FlagService`]

pub mod audit;
pub mod error;
pub mod graph;
pub mod lifecycle;
pub mod projection;
pub mod service;
pub mod validator;

pub use error::FlagError;
pub use graph::{DependencyGraph, IntegrityViolation};
pub use lifecycle::{FlagState, Transition};
pub use projection::{FlagTree, FlagView};
pub use service::{FlagService, Page, DEFAULT_PAGE_LIMIT};
pub use validator::validate_dependencies;

pub use flaggraph_storage::{
    AuditLogEntry, AuditLogFilter, AuditOperation, FlagId, FlagRecord, FlagSnapshot,
    FlagStorage, MemoryStorage, StorageError, SYSTEM_ACTOR,
};
