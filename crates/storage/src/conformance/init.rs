//! Flag insertion conformance tests.

use std::future::Future;

use super::{seed_flag, TestResult};
use crate::{FlagStorage, StorageError};

pub(super) async fn run_init_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: FlagStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "init",
        "insert_assigns_increasing_ids",
        insert_assigns_increasing_ids(factory).await,
    ));
    results.push(TestResult::from_result(
        "init",
        "inserted_flag_is_inactive",
        inserted_flag_is_inactive(factory).await,
    ));
    results.push(TestResult::from_result(
        "init",
        "inserted_flag_keeps_dependencies",
        inserted_flag_keeps_dependencies(factory).await,
    ));
    results.push(TestResult::from_result(
        "init",
        "duplicate_name_in_same_snapshot_rejected",
        duplicate_name_in_same_snapshot_rejected(factory).await,
    ));
    results.push(TestResult::from_result(
        "init",
        "duplicate_name_across_snapshots_rejected",
        duplicate_name_across_snapshots_rejected(factory).await,
    ));
    results.push(TestResult::from_result(
        "init",
        "find_flags_by_ids_returns_matching_subset",
        find_flags_by_ids_returns_matching_subset(factory).await,
    ));
    results.push(TestResult::from_result(
        "init",
        "list_flags_ordered_by_id",
        list_flags_ordered_by_id(factory).await,
    ));

    results
}

/// Each insert gets a strictly larger id than the one before.
async fn insert_assigns_increasing_ids<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FlagStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let a = seed_flag(&s, "a", &[]).await?;
    let b = seed_flag(&s, "b", &[]).await?;
    let c = seed_flag(&s, "c", &[]).await?;
    if !(a.id < b.id && b.id < c.id) {
        return Err(format!(
            "ids not increasing: {}, {}, {}",
            a.id, b.id, c.id
        ));
    }
    Ok(())
}

async fn inserted_flag_is_inactive<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FlagStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let flag = seed_flag(&s, "fresh", &[]).await?;
    if flag.is_active {
        return Err("insert_flag returned an active flag".to_string());
    }
    let stored = s
        .get_flag(flag.id)
        .await
        .map_err(|e| e.to_string())?
        .ok_or("committed flag not found")?;
    if stored.is_active || stored.name != "fresh" {
        return Err(format!("unexpected stored flag: {stored:?}"));
    }
    Ok(())
}

async fn inserted_flag_keeps_dependencies<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FlagStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let a = seed_flag(&s, "a", &[]).await?;
    let b = seed_flag(&s, "b", &[]).await?;
    let c = seed_flag(&s, "c", &[a.id, b.id]).await?;
    let stored = s
        .get_flag(c.id)
        .await
        .map_err(|e| e.to_string())?
        .ok_or("committed flag not found")?;
    if stored.dependencies != vec![a.id, b.id] {
        return Err(format!(
            "expected dependencies [{}, {}], got {:?}",
            a.id, b.id, stored.dependencies
        ));
    }
    Ok(())
}

async fn duplicate_name_in_same_snapshot_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FlagStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.insert_flag(&mut snap, "dup", &[])
        .await
        .map_err(|e| e.to_string())?;
    let second = s.insert_flag(&mut snap, "dup", &[]).await;
    let _ = s.abort_snapshot(snap).await;
    match second {
        Err(StorageError::DuplicateName { name }) if name == "dup" => Ok(()),
        other => Err(format!("expected DuplicateName(dup), got {other:?}")),
    }
}

async fn duplicate_name_across_snapshots_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FlagStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_flag(&s, "dup", &[]).await?;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let second = s.insert_flag(&mut snap, "dup", &[]).await;
    let _ = s.abort_snapshot(snap).await;
    match second {
        Err(StorageError::DuplicateName { .. }) => Ok(()),
        other => Err(format!("expected DuplicateName, got {other:?}")),
    }
}

async fn find_flags_by_ids_returns_matching_subset<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FlagStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let a = seed_flag(&s, "a", &[]).await?;
    let b = seed_flag(&s, "b", &[]).await?;
    seed_flag(&s, "c", &[]).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let found = s
        .find_flags_by_ids(&mut snap, &[b.id, 999, a.id])
        .await
        .map_err(|e| e.to_string())?;
    let _ = s.abort_snapshot(snap).await;

    let mut ids: Vec<_> = found.iter().map(|f| f.id).collect();
    ids.sort_unstable();
    if ids != vec![a.id, b.id] {
        return Err(format!("expected [{}, {}], got {ids:?}", a.id, b.id));
    }
    Ok(())
}

async fn list_flags_ordered_by_id<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FlagStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    for name in ["zeta", "alpha", "mid"] {
        seed_flag(&s, name, &[]).await?;
    }
    let flags = s.list_flags().await.map_err(|e| e.to_string())?;
    let names: Vec<_> = flags.iter().map(|f| f.name.as_str()).collect();
    if names != ["zeta", "alpha", "mid"] {
        return Err(format!("expected insertion (id) order, got {names:?}"));
    }
    Ok(())
}
