//! Audit log conformance tests.
//!
//! Entries are append-only: ids strictly increase, timestamps never go
//! backwards, and queries return newest first with filters and pagination.

use std::future::Future;

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use super::{make_entry, seed_flag, TestResult};
use crate::{AuditLogEntry, AuditLogFilter, AuditOperation, FlagRecord, FlagStorage};

pub(super) async fn run_audit_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: FlagStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "audit",
        "append_assigns_increasing_ids",
        append_assigns_increasing_ids(factory).await,
    ));
    results.push(TestResult::from_result(
        "audit",
        "timestamps_non_decreasing",
        timestamps_non_decreasing(factory).await,
    ));
    results.push(TestResult::from_result(
        "audit",
        "snapshots_stored_verbatim",
        snapshots_stored_verbatim(factory).await,
    ));
    results.push(TestResult::from_result(
        "audit",
        "query_returns_newest_first",
        query_returns_newest_first(factory).await,
    ));
    results.push(TestResult::from_result(
        "audit",
        "query_filters_by_flag_operation_actor",
        query_filters_by_flag_operation_actor(factory).await,
    ));
    results.push(TestResult::from_result(
        "audit",
        "query_limit_and_offset",
        query_limit_and_offset(factory).await,
    ));

    results
}

/// Commit one flag and `n` activate entries for it; returns them in append order.
async fn seed_history<S: FlagStorage>(
    s: &S,
    name: &str,
    n: usize,
    actor: Option<&str>,
) -> Result<(FlagRecord, Vec<AuditLogEntry>), String> {
    let flag = seed_flag(s, name, &[]).await?;
    let mut appended = Vec::new();
    for _ in 0..n {
        let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
        let entry = s
            .append_audit_log(&mut snap, make_entry(&flag, AuditOperation::Activate, actor))
            .await
            .map_err(|e| e.to_string())?;
        s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;
        appended.push(entry);
    }
    Ok((flag, appended))
}

async fn append_assigns_increasing_ids<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FlagStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let (_, entries) = seed_history(&s, "ids", 4, None).await?;
    if entries.windows(2).any(|w| w[0].id >= w[1].id) {
        let ids: Vec<_> = entries.iter().map(|e| e.id).collect();
        return Err(format!("audit ids not strictly increasing: {ids:?}"));
    }
    Ok(())
}

async fn timestamps_non_decreasing<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FlagStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let (_, entries) = seed_history(&s, "clock", 5, None).await?;
    let mut previous: Option<OffsetDateTime> = None;
    for e in &entries {
        let at = OffsetDateTime::parse(&e.timestamp, &Rfc3339)
            .map_err(|err| format!("timestamp {:?} is not RFC 3339: {err}", e.timestamp))?;
        if previous.is_some_and(|p| at < p) {
            return Err(format!("timestamp went backwards at entry {}", e.id));
        }
        previous = Some(at);
    }
    Ok(())
}

async fn snapshots_stored_verbatim<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FlagStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let base = seed_flag(&s, "base", &[]).await?;
    let mut top = seed_flag(&s, "top", &[base.id]).await?;
    top.is_active = true;
    let draft = make_entry(&top, AuditOperation::Activate, Some("alice"));

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.append_audit_log(&mut snap, draft.clone())
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let logs = s
        .query_audit_logs(&AuditLogFilter::for_flag(top.id), 0, 0)
        .await
        .map_err(|e| e.to_string())?;
    let stored = logs.first().ok_or("entry missing")?;
    if stored.previous_state != draft.previous_state
        || stored.new_state != draft.new_state
        || stored.reason != draft.reason
        || stored.actor != draft.actor
        || stored.flag_name != "top"
    {
        return Err(format!("entry altered on append: {stored:?}"));
    }
    Ok(())
}

async fn query_returns_newest_first<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FlagStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let (_, entries) = seed_history(&s, "order", 3, None).await?;
    let logs = s
        .query_audit_logs(&AuditLogFilter::default(), 0, 0)
        .await
        .map_err(|e| e.to_string())?;
    let got: Vec<_> = logs.iter().map(|e| e.id).collect();
    let want: Vec<_> = entries.iter().rev().map(|e| e.id).collect();
    if got != want {
        return Err(format!("expected newest first {want:?}, got {got:?}"));
    }
    Ok(())
}

async fn query_filters_by_flag_operation_actor<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FlagStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let (alpha, _) = seed_history(&s, "alpha", 2, Some("alice")).await?;
    let (beta, _) = seed_history(&s, "beta", 1, Some("bob")).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.append_audit_log(&mut snap, make_entry(&beta, AuditOperation::Create, None))
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let by_flag = s
        .query_audit_logs(&AuditLogFilter::for_flag(alpha.id), 0, 0)
        .await
        .map_err(|e| e.to_string())?;
    if by_flag.len() != 2 || by_flag.iter().any(|e| e.flag_id != alpha.id) {
        return Err(format!("flag filter returned {by_flag:?}"));
    }

    let by_actor = s
        .query_audit_logs(
            &AuditLogFilter {
                actor: Some("bob".to_string()),
                ..AuditLogFilter::default()
            },
            0,
            0,
        )
        .await
        .map_err(|e| e.to_string())?;
    if by_actor.len() != 1 || by_actor[0].flag_id != beta.id {
        return Err(format!("actor filter returned {by_actor:?}"));
    }

    let by_operation = s
        .query_audit_logs(
            &AuditLogFilter {
                operation: Some(AuditOperation::Create),
                ..AuditLogFilter::default()
            },
            0,
            0,
        )
        .await
        .map_err(|e| e.to_string())?;
    if by_operation.len() != 1 || by_operation[0].actor.is_some() {
        return Err(format!("operation filter returned {by_operation:?}"));
    }
    Ok(())
}

async fn query_limit_and_offset<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FlagStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let (_, entries) = seed_history(&s, "paged", 5, None).await?;
    let newest_first: Vec<_> = entries.iter().rev().map(|e| e.id).collect();

    let page = s
        .query_audit_logs(&AuditLogFilter::default(), 2, 1)
        .await
        .map_err(|e| e.to_string())?;
    let got: Vec<_> = page.iter().map(|e| e.id).collect();
    if got != newest_first[1..3] {
        return Err(format!(
            "limit 2 offset 1: expected {:?}, got {got:?}",
            &newest_first[1..3]
        ));
    }

    let past_end = s
        .query_audit_logs(&AuditLogFilter::default(), 10, 10)
        .await
        .map_err(|e| e.to_string())?;
    if !past_end.is_empty() {
        return Err(format!("offset past end returned {} entries", past_end.len()));
    }

    let unlimited = s
        .query_audit_logs(&AuditLogFilter::default(), 0, 0)
        .await
        .map_err(|e| e.to_string())?;
    if unlimited.len() != 5 {
        return Err(format!("limit 0: expected 5 entries, got {}", unlimited.len()));
    }
    Ok(())
}
