//! Snapshot isolation conformance tests.
//!
//! Verifies that uncommitted writes are invisible outside a snapshot,
//! committed writes are visible, and aborted or dropped writes are discarded.

use std::future::Future;

use super::{make_entry, seed_flag, TestResult};
use crate::{AuditLogFilter, AuditOperation, FlagStorage};

pub(super) async fn run_snapshot_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: FlagStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "snapshot",
        "snapshot_reads_own_writes",
        snapshot_reads_own_writes(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "uncommitted_flag_invisible",
        uncommitted_flag_invisible(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "uncommitted_state_change_invisible",
        uncommitted_state_change_invisible(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "committed_state_change_visible",
        committed_state_change_visible(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "abort_discards_flag_and_audit",
        abort_discards_flag_and_audit(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "dropped_snapshot_discards_writes",
        dropped_snapshot_discards_writes(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "sequential_snapshots_see_prior_commits",
        sequential_snapshots_see_prior_commits(factory).await,
    ));

    results
}

async fn snapshot_reads_own_writes<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FlagStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let flag = s
        .insert_flag(&mut snap, "own", &[])
        .await
        .map_err(|e| e.to_string())?;
    let by_id = s
        .find_flag_by_id(&mut snap, flag.id)
        .await
        .map_err(|e| e.to_string())?;
    let by_name = s
        .find_flag_by_name(&mut snap, "own")
        .await
        .map_err(|e| e.to_string())?;
    let all = s.load_flags(&mut snap).await.map_err(|e| e.to_string())?;
    let _ = s.abort_snapshot(snap).await;

    if by_id.as_ref() != Some(&flag) || by_name.as_ref() != Some(&flag) {
        return Err("snapshot did not observe its own insert".to_string());
    }
    if all.len() != 1 {
        return Err(format!("load_flags: expected 1 flag, got {}", all.len()));
    }
    Ok(())
}

async fn uncommitted_flag_invisible<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FlagStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let flag = s
        .insert_flag(&mut snap, "pending", &[])
        .await
        .map_err(|e| e.to_string())?;

    let by_id = s.get_flag(flag.id).await.map_err(|e| e.to_string())?;
    let by_name = s
        .get_flag_by_name("pending")
        .await
        .map_err(|e| e.to_string())?;
    let listed = s.list_flags().await.map_err(|e| e.to_string())?;
    let _ = s.abort_snapshot(snap).await;

    if by_id.is_some() || by_name.is_some() || !listed.is_empty() {
        return Err("uncommitted flag visible outside its snapshot".to_string());
    }
    Ok(())
}

async fn uncommitted_state_change_invisible<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FlagStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut flag = seed_flag(&s, "toggle-me", &[]).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    flag.is_active = true;
    s.save_flag(&mut snap, &flag)
        .await
        .map_err(|e| e.to_string())?;
    let seen = s
        .get_flag(flag.id)
        .await
        .map_err(|e| e.to_string())?
        .ok_or("committed flag missing")?;
    let _ = s.abort_snapshot(snap).await;

    if seen.is_active {
        return Err("uncommitted activation visible outside snapshot".to_string());
    }
    Ok(())
}

async fn committed_state_change_visible<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FlagStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut flag = seed_flag(&s, "toggle-me", &[]).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    flag.is_active = true;
    s.save_flag(&mut snap, &flag)
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let seen = s
        .get_flag(flag.id)
        .await
        .map_err(|e| e.to_string())?
        .ok_or("committed flag missing")?;
    if !seen.is_active {
        return Err("committed activation not visible".to_string());
    }
    Ok(())
}

async fn abort_discards_flag_and_audit<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FlagStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let flag = s
        .insert_flag(&mut snap, "doomed", &[])
        .await
        .map_err(|e| e.to_string())?;
    s.append_audit_log(&mut snap, make_entry(&flag, AuditOperation::Create, None))
        .await
        .map_err(|e| e.to_string())?;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;

    let listed = s.list_flags().await.map_err(|e| e.to_string())?;
    let logs = s
        .query_audit_logs(&AuditLogFilter::default(), 0, 0)
        .await
        .map_err(|e| e.to_string())?;
    if !listed.is_empty() || !logs.is_empty() {
        return Err(format!(
            "abort left {} flags and {} audit entries behind",
            listed.len(),
            logs.len()
        ));
    }
    Ok(())
}

async fn dropped_snapshot_discards_writes<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FlagStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    {
        let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
        s.insert_flag(&mut snap, "dropped", &[])
            .await
            .map_err(|e| e.to_string())?;
    }
    let listed = s.list_flags().await.map_err(|e| e.to_string())?;
    if !listed.is_empty() {
        return Err("dropped snapshot's insert became visible".to_string());
    }
    // The backend must still accept new snapshots.
    seed_flag(&s, "after-drop", &[]).await?;
    Ok(())
}

async fn sequential_snapshots_see_prior_commits<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FlagStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let first = seed_flag(&s, "first", &[]).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let seen = s
        .find_flag_by_id(&mut snap, first.id)
        .await
        .map_err(|e| e.to_string())?;
    let _ = s.abort_snapshot(snap).await;

    if seen.is_none() {
        return Err("second snapshot did not see first commit".to_string());
    }
    Ok(())
}
