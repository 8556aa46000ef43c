//! Audit recorder.
//!
//! Builds audit entries from detached flag snapshots and appends them in
//! the caller's snapshot, so the entry commits or rolls back together with
//! the change it documents.

use flaggraph_storage::{
    AuditLogEntry, AuditOperation, FlagRecord, FlagStorage, NewAuditLogEntry, StorageError,
};

use crate::lifecycle::Transition;

/// Entry for a newly created flag: no previous state.
pub fn creation_entry(flag: &FlagRecord, actor: Option<&str>) -> NewAuditLogEntry {
    NewAuditLogEntry {
        flag_id: flag.id,
        flag_name: flag.name.clone(),
        operation: AuditOperation::Create,
        previous_state: None,
        new_state: Some(flag.snapshot()),
        reason: Some(format!("Flag '{}' created", flag.name)),
        actor: actor.map(str::to_string),
    }
}

/// Entry for a state transition from `before` to `after`.
pub fn transition_entry(
    before: &FlagRecord,
    after: &FlagRecord,
    transition: Transition,
    reason: Option<&str>,
    actor: Option<&str>,
) -> NewAuditLogEntry {
    NewAuditLogEntry {
        flag_id: after.id,
        flag_name: after.name.clone(),
        operation: transition.operation(),
        previous_state: Some(before.snapshot()),
        new_state: Some(after.snapshot()),
        reason: Some(reason.unwrap_or(transition.default_reason()).to_string()),
        actor: actor.map(str::to_string),
    }
}

/// Append `entry` inside `snapshot`. Fails only on storage errors.
pub async fn record<S: FlagStorage>(
    storage: &S,
    snapshot: &mut S::Snapshot,
    entry: NewAuditLogEntry,
) -> Result<AuditLogEntry, StorageError> {
    let stored = storage.append_audit_log(snapshot, entry).await?;
    tracing::debug!(
        audit_id = stored.id,
        flag_id = stored.flag_id,
        operation = %stored.operation,
        "audit entry recorded"
    );
    Ok(stored)
}
