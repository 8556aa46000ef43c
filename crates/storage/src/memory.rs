//! In-memory reference backend.
//!
//! Committed state lives behind an `Arc` that is swapped wholesale on
//! commit. A snapshot holds the single writer lock for its whole lifetime
//! and mutates a private copy of the committed state, so writers are
//! serialized and readers only ever observe committed state.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::error::StorageError;
use crate::record::{AuditLogEntry, AuditLogFilter, FlagId, FlagRecord, NewAuditLogEntry};
use crate::traits::FlagStorage;

#[derive(Debug, Clone)]
struct MemoryState {
    flags: BTreeMap<FlagId, FlagRecord>,
    audit_log: Vec<AuditLogEntry>,
    next_flag_id: FlagId,
    next_audit_id: i64,
    last_timestamp: Option<OffsetDateTime>,
}

impl Default for MemoryState {
    fn default() -> Self {
        MemoryState {
            flags: BTreeMap::new(),
            audit_log: Vec::new(),
            next_flag_id: 1,
            next_audit_id: 1,
            last_timestamp: None,
        }
    }
}

impl MemoryState {
    fn find_by_name(&self, name: &str) -> Option<&FlagRecord> {
        self.flags.values().find(|f| f.name == name)
    }
}

/// An open transaction against [`MemoryStorage`].
///
/// Dropping it without committing discards every write and releases the
/// writer lock.
pub struct MemorySnapshot {
    state: MemoryState,
    _writer: OwnedMutexGuard<()>,
}

/// A `FlagStorage` backend that keeps everything in process memory.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    committed: RwLock<Arc<MemoryState>>,
    writer: Arc<Mutex<()>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    async fn committed(&self) -> Arc<MemoryState> {
        self.committed.read().await.clone()
    }
}

/// Next audit timestamp: wall-clock now, clamped so it never runs backwards.
fn next_timestamp(last: Option<OffsetDateTime>) -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    match last {
        Some(prev) if prev > now => prev,
        _ => now,
    }
}

#[async_trait]
impl FlagStorage for MemoryStorage {
    type Snapshot = MemorySnapshot;

    async fn begin_snapshot(&self) -> Result<MemorySnapshot, StorageError> {
        let writer = self.writer.clone().lock_owned().await;
        let state = (*self.committed().await).clone();
        Ok(MemorySnapshot {
            state,
            _writer: writer,
        })
    }

    async fn commit_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StorageError> {
        let MemorySnapshot { state, _writer } = snapshot;
        *self.committed.write().await = Arc::new(state);
        tracing::debug!("memory snapshot committed");
        Ok(())
    }

    async fn abort_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StorageError> {
        drop(snapshot);
        tracing::debug!("memory snapshot aborted");
        Ok(())
    }

    async fn find_flag_by_id(
        &self,
        snapshot: &mut MemorySnapshot,
        id: FlagId,
    ) -> Result<Option<FlagRecord>, StorageError> {
        Ok(snapshot.state.flags.get(&id).cloned())
    }

    async fn find_flag_by_name(
        &self,
        snapshot: &mut MemorySnapshot,
        name: &str,
    ) -> Result<Option<FlagRecord>, StorageError> {
        Ok(snapshot.state.find_by_name(name).cloned())
    }

    async fn find_flags_by_ids(
        &self,
        snapshot: &mut MemorySnapshot,
        ids: &[FlagId],
    ) -> Result<Vec<FlagRecord>, StorageError> {
        Ok(snapshot
            .state
            .flags
            .values()
            .filter(|f| ids.contains(&f.id))
            .cloned()
            .collect())
    }

    async fn load_flags(
        &self,
        snapshot: &mut MemorySnapshot,
    ) -> Result<Vec<FlagRecord>, StorageError> {
        Ok(snapshot.state.flags.values().cloned().collect())
    }

    async fn insert_flag(
        &self,
        snapshot: &mut MemorySnapshot,
        name: &str,
        dependencies: &[FlagId],
    ) -> Result<FlagRecord, StorageError> {
        let state = &mut snapshot.state;
        if state.find_by_name(name).is_some() {
            return Err(StorageError::DuplicateName {
                name: name.to_string(),
            });
        }
        let record = FlagRecord {
            id: state.next_flag_id,
            name: name.to_string(),
            is_active: false,
            dependencies: dependencies.to_vec(),
        };
        state.next_flag_id += 1;
        state.flags.insert(record.id, record.clone());
        Ok(record)
    }

    async fn save_flag(
        &self,
        snapshot: &mut MemorySnapshot,
        flag: &FlagRecord,
    ) -> Result<(), StorageError> {
        let stored = snapshot
            .state
            .flags
            .get_mut(&flag.id)
            .ok_or(StorageError::FlagNotFound { id: flag.id })?;
        stored.is_active = flag.is_active;
        Ok(())
    }

    async fn append_audit_log(
        &self,
        snapshot: &mut MemorySnapshot,
        entry: NewAuditLogEntry,
    ) -> Result<AuditLogEntry, StorageError> {
        let state = &mut snapshot.state;
        let at = next_timestamp(state.last_timestamp);
        let timestamp = at
            .format(&Rfc3339)
            .map_err(|e| StorageError::Backend(format!("timestamp formatting: {e}")))?;
        let stored = AuditLogEntry::from_new(state.next_audit_id, timestamp, entry);
        state.next_audit_id += 1;
        state.last_timestamp = Some(at);
        state.audit_log.push(stored.clone());
        Ok(stored)
    }

    async fn get_flag(&self, id: FlagId) -> Result<Option<FlagRecord>, StorageError> {
        Ok(self.committed().await.flags.get(&id).cloned())
    }

    async fn get_flag_by_name(&self, name: &str) -> Result<Option<FlagRecord>, StorageError> {
        Ok(self.committed().await.find_by_name(name).cloned())
    }

    async fn list_flags(&self) -> Result<Vec<FlagRecord>, StorageError> {
        Ok(self.committed().await.flags.values().cloned().collect())
    }

    async fn query_audit_logs(
        &self,
        filter: &AuditLogFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<AuditLogEntry>, StorageError> {
        let state = self.committed().await;
        // Append order is id order and timestamps never decrease, so
        // reverse append order is timestamp-descending with id tie-break.
        let matching = state
            .audit_log
            .iter()
            .rev()
            .filter(|e| filter.matches(e))
            .skip(offset)
            .cloned();
        Ok(if limit == 0 {
            matching.collect()
        } else {
            matching.take(limit).collect()
        })
    }
}
