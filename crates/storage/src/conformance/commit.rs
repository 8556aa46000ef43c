use std::future::Future;

use super::{make_entry, seed_flag, TestResult};
use crate::{AuditLogFilter, AuditOperation, FlagStorage};

pub(super) async fn run_commit_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: FlagStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    // Change + audit atomicity
    results.push(TestResult::from_result(
        "commit",
        "flag_and_audit_visible_together_after_commit",
        flag_and_audit_visible_together_after_commit(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "state_change_and_audit_neither_visible_after_abort",
        state_change_and_audit_neither_visible_after_abort(factory).await,
    ));

    // Multiple changes
    results.push(TestResult::from_result(
        "commit",
        "multiple_changes_in_one_snapshot_all_visible",
        multiple_changes_in_one_snapshot_all_visible(factory).await,
    ));

    // Edge cases
    results.push(TestResult::from_result(
        "commit",
        "commit_empty_snapshot",
        commit_empty_snapshot(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "save_flag_does_not_rename",
        save_flag_does_not_rename(factory).await,
    ));

    results
}

// ── Change + audit atomicity ─────────────────────────────────────────────────

async fn flag_and_audit_visible_together_after_commit<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: FlagStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let flag = s
        .insert_flag(&mut snap, "atomic", &[])
        .await
        .map_err(|e| e.to_string())?;
    let entry = s
        .append_audit_log(&mut snap, make_entry(&flag, AuditOperation::Create, Some("alice")))
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    if s.get_flag(flag.id).await.map_err(|e| e.to_string())?.is_none() {
        return Err("flag missing after commit".to_string());
    }
    let logs = s
        .query_audit_logs(&AuditLogFilter::for_flag(flag.id), 0, 0)
        .await
        .map_err(|e| e.to_string())?;
    if logs != vec![entry] {
        return Err(format!("expected exactly the appended entry, got {logs:?}"));
    }
    Ok(())
}

async fn state_change_and_audit_neither_visible_after_abort<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: FlagStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut flag = seed_flag(&s, "stay-off", &[]).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    flag.is_active = true;
    s.save_flag(&mut snap, &flag)
        .await
        .map_err(|e| e.to_string())?;
    s.append_audit_log(&mut snap, make_entry(&flag, AuditOperation::Activate, None))
        .await
        .map_err(|e| e.to_string())?;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;

    let stored = s
        .get_flag(flag.id)
        .await
        .map_err(|e| e.to_string())?
        .ok_or("flag missing")?;
    if stored.is_active {
        return Err("aborted activation persisted".to_string());
    }
    let logs = s
        .query_audit_logs(&AuditLogFilter::default(), 0, 0)
        .await
        .map_err(|e| e.to_string())?;
    if !logs.is_empty() {
        return Err(format!("aborted audit entry persisted: {logs:?}"));
    }
    Ok(())
}

// ── Multiple changes ─────────────────────────────────────────────────────────

async fn multiple_changes_in_one_snapshot_all_visible<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: FlagStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let mut base = s
        .insert_flag(&mut snap, "base", &[])
        .await
        .map_err(|e| e.to_string())?;
    let top = s
        .insert_flag(&mut snap, "top", &[base.id])
        .await
        .map_err(|e| e.to_string())?;
    base.is_active = true;
    s.save_flag(&mut snap, &base)
        .await
        .map_err(|e| e.to_string())?;
    for (flag, op) in [
        (&base, AuditOperation::Create),
        (&top, AuditOperation::Create),
        (&base, AuditOperation::Activate),
    ] {
        s.append_audit_log(&mut snap, make_entry(flag, op, None))
            .await
            .map_err(|e| e.to_string())?;
    }
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let flags = s.list_flags().await.map_err(|e| e.to_string())?;
    if flags.len() != 2 || !flags[0].is_active || flags[1].dependencies != vec![base.id] {
        return Err(format!("unexpected committed flags: {flags:?}"));
    }
    let logs = s
        .query_audit_logs(&AuditLogFilter::default(), 0, 0)
        .await
        .map_err(|e| e.to_string())?;
    if logs.len() != 3 {
        return Err(format!("expected 3 audit entries, got {}", logs.len()));
    }
    Ok(())
}

// ── Edge cases ───────────────────────────────────────────────────────────────

async fn commit_empty_snapshot<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FlagStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.commit_snapshot(snap)
        .await
        .map_err(|e| format!("empty commit failed: {e}"))
}

/// Names are immutable: `save_flag` persists only the active column.
async fn save_flag_does_not_rename<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FlagStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut flag = seed_flag(&s, "original", &[]).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    flag.name = "renamed".to_string();
    flag.is_active = true;
    s.save_flag(&mut snap, &flag)
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let stored = s
        .get_flag(flag.id)
        .await
        .map_err(|e| e.to_string())?
        .ok_or("flag missing")?;
    if stored.name != "original" || !stored.is_active {
        return Err(format!("unexpected stored flag: {stored:?}"));
    }
    Ok(())
}
