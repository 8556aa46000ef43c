use std::future::Future;

use super::TestResult;
use crate::{AuditLogFilter, FlagRecord, FlagStorage, StorageError};

pub(super) async fn run_error_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: FlagStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "error",
        "save_flag_nonexistent",
        save_flag_nonexistent(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "get_flag_nonexistent_is_none",
        get_flag_nonexistent_is_none(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "find_flag_by_name_nonexistent_is_none",
        find_flag_by_name_nonexistent_is_none(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "query_audit_logs_empty",
        query_audit_logs_empty(factory).await,
    ));

    results
}

// ── 1. save_flag on a missing row returns FlagNotFound with the id ───────────

async fn save_flag_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FlagStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let ghost = FlagRecord {
        id: 999,
        name: "ghost".to_string(),
        is_active: true,
        dependencies: vec![],
    };
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let result = s.save_flag(&mut snap, &ghost).await;
    let _ = s.abort_snapshot(snap).await;
    match result {
        Err(StorageError::FlagNotFound { id: 999 }) => Ok(()),
        other => Err(format!("expected FlagNotFound {{ id: 999 }}, got {other:?}")),
    }
}

// ── 2. Lookups of missing rows are not errors ────────────────────────────────

async fn get_flag_nonexistent_is_none<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FlagStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.get_flag(42).await {
        Ok(None) => Ok(()),
        other => Err(format!("expected Ok(None), got {other:?}")),
    }
}

async fn find_flag_by_name_nonexistent_is_none<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FlagStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let result = s.find_flag_by_name(&mut snap, "missing").await;
    let _ = s.abort_snapshot(snap).await;
    match result {
        Ok(None) => Ok(()),
        other => Err(format!("expected Ok(None), got {other:?}")),
    }
}

async fn query_audit_logs_empty<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FlagStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let logs = s
        .query_audit_logs(&AuditLogFilter::default(), 10, 0)
        .await
        .map_err(|e| e.to_string())?;
    if !logs.is_empty() {
        return Err(format!("expected no entries, got {}", logs.len()));
    }
    Ok(())
}
