pub mod conformance;
mod error;
mod memory;
mod record;
mod traits;

pub use error::StorageError;
pub use memory::{MemorySnapshot, MemoryStorage};
pub use record::{
    AuditLogEntry, AuditLogFilter, AuditOperation, FlagId, FlagRecord, FlagSnapshot,
    NewAuditLogEntry, ParseOperationError, SYSTEM_ACTOR,
};
pub use traits::FlagStorage;
