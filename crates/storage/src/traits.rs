use async_trait::async_trait;

use crate::error::StorageError;
use crate::record::{AuditLogEntry, AuditLogFilter, FlagId, FlagRecord, NewAuditLogEntry};

/// The storage trait for flaggraph backends.
///
/// A `FlagStorage` implementation provides durable, transactional storage
/// for flags, their dependency edges, and the append-only audit log.
///
/// ## Snapshot Semantics
///
/// Every mutating call, and every read that feeds a validation decision,
/// takes `&mut Self::Snapshot`, a type representing an in-progress
/// transaction. The lifecycle is:
///
/// 1. `begin_snapshot()`: start a transaction, returns a `Snapshot`
/// 2. Call read and mutating methods with `&mut snapshot`
/// 3. `commit_snapshot(snapshot)`: commit and consume the transaction
///    OR `abort_snapshot(snapshot)`: roll back and consume the transaction
///
/// If a `Snapshot` is dropped without committing, the underlying transaction
/// MUST be rolled back.
///
/// ## Isolation
///
/// Reads made through a snapshot must observe one consistent state of the
/// graph for the snapshot's whole lifetime, and two snapshots whose writes
/// would jointly break a graph invariant must not both commit. Serializable
/// isolation (or a single writer) satisfies this.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` to be used in axum
/// application state and across async task boundaries.
#[async_trait]
pub trait FlagStorage: Send + Sync + 'static {
    /// The snapshot (transaction) type used by this storage backend.
    type Snapshot: Send;

    // ── Snapshot lifecycle ────────────────────────────────────────────────────

    /// Begin a new snapshot (transaction).
    async fn begin_snapshot(&self) -> Result<Self::Snapshot, StorageError>;

    /// Commit a snapshot, making all mutations durable and visible.
    async fn commit_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    /// Abort (roll back) a snapshot, discarding all mutations.
    async fn abort_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    // ── Reads (within snapshot) ───────────────────────────────────────────────

    async fn find_flag_by_id(
        &self,
        snapshot: &mut Self::Snapshot,
        id: FlagId,
    ) -> Result<Option<FlagRecord>, StorageError>;

    async fn find_flag_by_name(
        &self,
        snapshot: &mut Self::Snapshot,
        name: &str,
    ) -> Result<Option<FlagRecord>, StorageError>;

    /// Return exactly the flags whose ids appear in `ids`.
    ///
    /// Missing ids are silently skipped; callers compare lengths to detect
    /// them. Duplicate ids in the input yield one record.
    async fn find_flags_by_ids(
        &self,
        snapshot: &mut Self::Snapshot,
        ids: &[FlagId],
    ) -> Result<Vec<FlagRecord>, StorageError>;

    /// Every flag with its dependency edges, ordered by id.
    async fn load_flags(
        &self,
        snapshot: &mut Self::Snapshot,
    ) -> Result<Vec<FlagRecord>, StorageError>;

    // ── Writes (within snapshot) ──────────────────────────────────────────────

    /// Insert a new, inactive flag with the given dependency edges.
    ///
    /// Returns the stored record with its assigned id. Returns
    /// `Err(StorageError::DuplicateName)` if the name is taken. Edge
    /// validity is the caller's responsibility.
    async fn insert_flag(
        &self,
        snapshot: &mut Self::Snapshot,
        name: &str,
        dependencies: &[FlagId],
    ) -> Result<FlagRecord, StorageError>;

    /// Persist the `is_active` column of an existing flag.
    ///
    /// Returns `Err(StorageError::FlagNotFound)` if no such flag exists.
    async fn save_flag(
        &self,
        snapshot: &mut Self::Snapshot,
        flag: &FlagRecord,
    ) -> Result<(), StorageError>;

    /// Append an audit entry, assigning its id and timestamp.
    ///
    /// Must be called in the SAME snapshot as the state change it documents:
    /// no state change without an audit entry, and no entry without the
    /// change.
    async fn append_audit_log(
        &self,
        snapshot: &mut Self::Snapshot,
        entry: NewAuditLogEntry,
    ) -> Result<AuditLogEntry, StorageError>;

    // ── Query operations (outside snapshot, committed state) ─────────────────

    async fn get_flag(&self, id: FlagId) -> Result<Option<FlagRecord>, StorageError>;

    async fn get_flag_by_name(&self, name: &str) -> Result<Option<FlagRecord>, StorageError>;

    /// All flags, ordered by id, dependencies included.
    async fn list_flags(&self) -> Result<Vec<FlagRecord>, StorageError>;

    /// Audit entries matching `filter`, newest first.
    ///
    /// Ordered by timestamp descending, ties broken by id descending.
    /// - `limit`: maximum number of results (0 = no limit)
    /// - `offset`: number of matching entries to skip
    async fn query_audit_logs(
        &self,
        filter: &AuditLogFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<AuditLogEntry>, StorageError>;
}
