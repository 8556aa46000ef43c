//! Conformance test suite for `FlagStorage` implementations.
//!
//! This module provides a backend-agnostic test suite that any `FlagStorage`
//! implementation can run to verify correctness. The suite covers:
//!
//! - **Initialization**: flag insertion, id assignment, duplicate names
//! - **Snapshot isolation**: uncommitted writes invisible, committed writes visible
//! - **Atomic commit**: flag changes and audit entries land together or not at all
//! - **Audit log**: ordering, filtering, pagination, monotonic ids and timestamps
//! - **Error handling**: correct error variants for invalid operations
//! - **Concurrency**: racing snapshots are serialized
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function that
//! creates a fresh, empty storage instance for each test:
//!
//! ```ignore
//! use flaggraph_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn postgres_conformance() {
//!     let report = run_conformance_suite(|| async {
//!         create_test_postgres_storage().await
//!     }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod audit;
mod commit;
mod concurrent;
mod error;
mod init;
mod snapshot;

use std::fmt;
use std::future::Future;

use crate::record::{AuditOperation, FlagId, FlagRecord, NewAuditLogEntry};
use crate::FlagStorage;

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "init", "snapshot", "commit").
    pub category: String,
    /// Test name (e.g. "insert_assigns_increasing_ids").
    pub name: String,
    /// Whether the test passed.
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn pass(category: &str, name: &str) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: true,
            message: None,
        }
    }

    fn fail(category: &str, name: &str, msg: String) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: false,
            message: Some(msg),
        }
    }

    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self::pass(category, name),
            Err(msg) => Self::fail(category, name, msg),
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite against a storage backend.
///
/// The `factory` function is called once per test to create a fresh, empty
/// storage instance, ensuring test isolation.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: FlagStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(init::run_init_tests(&factory).await);
    results.extend(error::run_error_tests(&factory).await);
    results.extend(snapshot::run_snapshot_tests(&factory).await);
    results.extend(commit::run_commit_tests(&factory).await);
    results.extend(audit::run_audit_tests(&factory).await);
    results.extend(concurrent::run_concurrent_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Insert and commit a flag in its own snapshot.
async fn seed_flag<S: FlagStorage>(
    storage: &S,
    name: &str,
    dependencies: &[FlagId],
) -> Result<FlagRecord, String> {
    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    let flag = storage
        .insert_flag(&mut snap, name, dependencies)
        .await
        .map_err(|e| format!("insert {name}: {e}"))?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit {name}: {e}"))?;
    Ok(flag)
}

/// An audit entry documenting `operation` on `flag`, with `flag` as the new state.
fn make_entry(flag: &FlagRecord, operation: AuditOperation, actor: Option<&str>) -> NewAuditLogEntry {
    let previous_state = match operation {
        AuditOperation::Create => None,
        _ => {
            let mut before = flag.snapshot();
            before.is_active = !flag.is_active;
            Some(before)
        }
    };
    NewAuditLogEntry {
        flag_id: flag.id,
        flag_name: flag.name.clone(),
        operation,
        previous_state,
        new_state: Some(flag.snapshot()),
        reason: Some(format!("conformance {operation}")),
        actor: actor.map(str::to_string),
    }
}
