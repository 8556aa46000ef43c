use std::future::Future;
use std::sync::Arc;

use super::TestResult;
use crate::{AuditLogFilter, AuditOperation, FlagStorage, NewAuditLogEntry, StorageError};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: FlagStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_inserts_same_name_exactly_one_wins",
        concurrent_inserts_same_name_exactly_one_wins(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_inserts_distinct_names_all_succeed",
        concurrent_inserts_distinct_names_all_succeed(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_toggles_are_serialized",
        concurrent_toggles_are_serialized(factory).await,
    ));

    results
}

// ── Concurrent insert: exactly one wins ─────────────────────────────────────

/// N tasks each open a snapshot, check the name is free, and insert it.
/// Exactly one commit succeeds; every other task must observe the name as
/// taken, either through the lookup or through `DuplicateName`.
async fn concurrent_inserts_same_name_exactly_one_wins<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: FlagStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);

    let mut handles = Vec::new();
    for _ in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let mut snap = s.begin_snapshot().await?;
            if s.find_flag_by_name(&mut snap, "contended").await?.is_some() {
                s.abort_snapshot(snap).await?;
                return Ok(false);
            }
            match s.insert_flag(&mut snap, "contended", &[]).await {
                Ok(_) => {
                    s.commit_snapshot(snap).await?;
                    Ok(true) // won
                }
                Err(StorageError::DuplicateName { .. }) => {
                    s.abort_snapshot(snap).await?;
                    Ok(false) // lost
                }
                Err(e) => {
                    let _ = s.abort_snapshot(snap).await;
                    Err(e)
                }
            }
        }));
    }

    let mut winners = 0usize;
    for handle in handles {
        let won = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
        if won {
            winners += 1;
        }
    }

    if winners != 1 {
        return Err(format!("expected exactly 1 winner, got {winners}"));
    }
    let flags = storage.list_flags().await.map_err(|e| e.to_string())?;
    if flags.len() != 1 {
        return Err(format!("expected 1 committed flag, got {}", flags.len()));
    }
    Ok(())
}

// ── Concurrent inserts of different names: all succeed ──────────────────────

async fn concurrent_inserts_distinct_names_all_succeed<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: FlagStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let mut snap = s.begin_snapshot().await?;
            let flag = s.insert_flag(&mut snap, &format!("flag-{i}"), &[]).await?;
            s.commit_snapshot(snap).await?;
            Ok::<_, StorageError>(flag.id)
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        let id = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e| format!("storage error: {e}"))?;
        ids.push(id);
    }
    ids.sort_unstable();
    ids.dedup();
    if ids.len() != N {
        return Err(format!("expected {N} distinct ids, got {}", ids.len()));
    }
    Ok(())
}

// ── Read-modify-write under contention ──────────────────────────────────────

/// N tasks each read a flag, flip it, and record the flip with the state
/// they read as `previous_state`. With serialized snapshots every entry's
/// previous state is the prior entry's new state and no flip is lost.
async fn concurrent_toggles_are_serialized<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FlagStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    let flag = super::seed_flag(storage.as_ref(), "flip", &[]).await?;

    let mut handles = Vec::new();
    for _ in 0..N {
        let s = storage.clone();
        let id = flag.id;
        handles.push(tokio::spawn(async move {
            let mut snap = s.begin_snapshot().await?;
            let current = s
                .find_flag_by_id(&mut snap, id)
                .await?
                .ok_or(StorageError::FlagNotFound { id })?;
            tokio::task::yield_now().await;
            let mut next = current.clone();
            next.is_active = !current.is_active;
            s.save_flag(&mut snap, &next).await?;
            let operation = if next.is_active {
                AuditOperation::Activate
            } else {
                AuditOperation::Deactivate
            };
            s.append_audit_log(
                &mut snap,
                NewAuditLogEntry {
                    flag_id: id,
                    flag_name: next.name.clone(),
                    operation,
                    previous_state: Some(current.snapshot()),
                    new_state: Some(next.snapshot()),
                    reason: None,
                    actor: None,
                },
            )
            .await?;
            s.commit_snapshot(snap).await
        }));
    }

    for handle in handles {
        handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e| format!("storage error: {e}"))?;
    }

    let mut logs = storage
        .query_audit_logs(&AuditLogFilter::for_flag(flag.id), 0, 0)
        .await
        .map_err(|e| e.to_string())?;
    logs.reverse();
    if logs.len() != N {
        return Err(format!("expected {N} entries, got {}", logs.len()));
    }
    for pair in logs.windows(2) {
        let before = pair[0].new_state.as_ref().map(|s| s.is_active);
        let after = pair[1].previous_state.as_ref().map(|s| s.is_active);
        if before != after {
            return Err(format!(
                "lost update between audit entries {} and {}",
                pair[0].id, pair[1].id
            ));
        }
    }
    let stored = storage
        .get_flag(flag.id)
        .await
        .map_err(|e| e.to_string())?
        .ok_or("flag missing")?;
    if stored.is_active != (N % 2 == 1) {
        return Err(format!("final state after {N} flips is {}", stored.is_active));
    }
    Ok(())
}
