//! Flag service: composes validation, the lifecycle state machine and the
//! audit recorder into the externally visible operations.
//!
//! Every mutating operation runs inside one storage snapshot covering its
//! checks, its writes and its audit entries. Any failure aborts the
//! snapshot, so nothing is partially applied.

use std::sync::Arc;

use flaggraph_storage::{
    AuditLogEntry, AuditLogFilter, FlagId, FlagRecord, FlagStorage, StorageError, SYSTEM_ACTOR,
};

use crate::audit;
use crate::error::FlagError;
use crate::graph::DependencyGraph;
use crate::lifecycle::{self, FlagState, Transition};
use crate::projection::FlagTree;
use crate::validator::validate_dependencies;

/// Page size used when a caller does not ask for one.
pub const DEFAULT_PAGE_LIMIT: usize = 100;

/// Pagination for audit queries. `limit = 0` means no limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: usize,
    pub offset: usize,
}

impl Default for Page {
    fn default() -> Self {
        Page {
            limit: DEFAULT_PAGE_LIMIT,
            offset: 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Intent {
    Toggle,
    Explicit(Transition),
}

/// The flag orchestrator. Cheap to clone; clones share the storage handle.
pub struct FlagService<S> {
    storage: Arc<S>,
}

impl<S> Clone for FlagService<S> {
    fn clone(&self) -> Self {
        FlagService {
            storage: self.storage.clone(),
        }
    }
}

impl<S: FlagStorage> FlagService<S> {
    pub fn new(storage: Arc<S>) -> Self {
        FlagService { storage }
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    // ── Mutations ────────────────────────────────────────────────────────────

    /// Create an inactive flag depending on `dependencies`.
    pub async fn create_flag(
        &self,
        name: &str,
        dependencies: &[FlagId],
        actor: Option<&str>,
    ) -> Result<FlagRecord, FlagError> {
        if name.trim().is_empty() {
            return Err(FlagError::EmptyName);
        }
        let mut snapshot = self.storage.begin_snapshot().await?;
        let outcome = self
            .create_in(&mut snapshot, name, dependencies, actor)
            .await;
        let flag = self
            .finish(snapshot, outcome)
            .await
            .inspect_err(|e| log_rejection("create_flag", e))?;
        tracing::info!(flag_id = flag.id, name = %flag.name, "flag created");
        Ok(flag)
    }

    /// Activate an inactive flag or deactivate an active one.
    pub async fn toggle_flag(
        &self,
        id: FlagId,
        actor: Option<&str>,
    ) -> Result<FlagRecord, FlagError> {
        self.run_transition(id, Intent::Toggle, actor).await
    }

    /// Activate `id`; a no-op if it is already active.
    pub async fn activate_flag(
        &self,
        id: FlagId,
        actor: Option<&str>,
    ) -> Result<FlagRecord, FlagError> {
        self.run_transition(id, Intent::Explicit(Transition::Activate), actor)
            .await
    }

    /// Deactivate `id`; a no-op if it is already inactive.
    pub async fn deactivate_flag(
        &self,
        id: FlagId,
        actor: Option<&str>,
    ) -> Result<FlagRecord, FlagError> {
        self.run_transition(id, Intent::Explicit(Transition::Deactivate), actor)
            .await
    }

    /// Force `id` inactive without the dependents check.
    ///
    /// Active transitive dependents are auto-disabled first in the same
    /// snapshot, each with its own audit entry. An already-inactive flag is
    /// returned unchanged and nothing is recorded.
    pub async fn auto_disable_flag(
        &self,
        id: FlagId,
        reason: Option<&str>,
    ) -> Result<FlagRecord, FlagError> {
        let mut snapshot = self.storage.begin_snapshot().await?;
        let outcome = self.auto_disable_in(&mut snapshot, id, reason).await;
        let (flag, cascaded) = self
            .finish(snapshot, outcome)
            .await
            .inspect_err(|e| log_rejection("auto_disable_flag", e))?;
        tracing::info!(flag_id = id, cascaded, "flag auto-disabled");
        Ok(flag)
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    pub async fn get_flag(&self, id: FlagId) -> Result<FlagRecord, FlagError> {
        self.storage
            .get_flag(id)
            .await?
            .ok_or(FlagError::NotFound { id })
    }

    pub async fn get_flag_by_name(&self, name: &str) -> Result<FlagRecord, FlagError> {
        self.storage
            .get_flag_by_name(name)
            .await?
            .ok_or_else(|| FlagError::NameNotFound {
                name: name.to_string(),
            })
    }

    /// `id` with its dependencies expanded into nested objects.
    pub async fn get_flag_tree(&self, id: FlagId) -> Result<FlagTree, FlagError> {
        let graph = DependencyGraph::new(self.storage.list_flags().await?);
        let root = graph.get(id).ok_or(FlagError::NotFound { id })?;
        Ok(FlagTree::build(root, &graph))
    }

    pub async fn list_flags(&self) -> Result<Vec<FlagRecord>, FlagError> {
        Ok(self.storage.list_flags().await?)
    }

    /// Audit entries matching `filter`, newest first.
    pub async fn list_audit_logs(
        &self,
        filter: &AuditLogFilter,
        page: Page,
    ) -> Result<Vec<AuditLogEntry>, FlagError> {
        Ok(self
            .storage
            .query_audit_logs(filter, page.limit, page.offset)
            .await?)
    }

    // ── Snapshot bodies ──────────────────────────────────────────────────────

    async fn create_in(
        &self,
        snapshot: &mut S::Snapshot,
        name: &str,
        dependencies: &[FlagId],
        actor: Option<&str>,
    ) -> Result<FlagRecord, FlagError> {
        let storage = self.storage.as_ref();

        if storage.find_flag_by_name(snapshot, name).await?.is_some() {
            return Err(FlagError::DuplicateName {
                name: name.to_string(),
            });
        }

        let mut unique = dependencies.to_vec();
        unique.sort_unstable();
        unique.dedup();
        let found = storage.find_flags_by_ids(snapshot, &unique).await?;
        if found.len() != unique.len() {
            let missing = unique
                .into_iter()
                .filter(|id| !found.iter().any(|f| f.id == *id))
                .collect();
            return Err(FlagError::DependenciesNotFound { missing });
        }

        let graph = DependencyGraph::new(storage.load_flags(snapshot).await?);
        validate_dependencies(None, dependencies, &graph)?;

        let flag = storage
            .insert_flag(snapshot, name, dependencies)
            .await
            .map_err(|e| match e {
                StorageError::DuplicateName { name } => FlagError::DuplicateName { name },
                other => FlagError::Storage(other),
            })?;
        audit::record(storage, snapshot, audit::creation_entry(&flag, actor)).await?;
        Ok(flag)
    }

    async fn run_transition(
        &self,
        id: FlagId,
        intent: Intent,
        actor: Option<&str>,
    ) -> Result<FlagRecord, FlagError> {
        let mut snapshot = self.storage.begin_snapshot().await?;
        let outcome = self.transition_in(&mut snapshot, id, intent, actor).await;
        let flag = self
            .finish(snapshot, outcome)
            .await
            .inspect_err(|e| log_rejection("transition", e))?;
        tracing::info!(flag_id = id, is_active = flag.is_active, "flag transition applied");
        Ok(flag)
    }

    async fn transition_in(
        &self,
        snapshot: &mut S::Snapshot,
        id: FlagId,
        intent: Intent,
        actor: Option<&str>,
    ) -> Result<FlagRecord, FlagError> {
        let storage = self.storage.as_ref();
        let current = storage
            .find_flag_by_id(snapshot, id)
            .await?
            .ok_or(FlagError::NotFound { id })?;
        let graph = DependencyGraph::new(storage.load_flags(snapshot).await?);

        let transition = match intent {
            Intent::Toggle => Transition::for_toggle(FlagState::of(&current)),
            Intent::Explicit(t) => t,
        };
        let Some(next) = lifecycle::apply(transition, &current, &graph)? else {
            return Ok(current);
        };

        storage.save_flag(snapshot, &next).await?;
        let entry = audit::transition_entry(&current, &next, transition, None, actor);
        audit::record(storage, snapshot, entry).await?;
        Ok(next)
    }

    async fn auto_disable_in(
        &self,
        snapshot: &mut S::Snapshot,
        id: FlagId,
        reason: Option<&str>,
    ) -> Result<(FlagRecord, usize), FlagError> {
        let storage = self.storage.as_ref();
        let current = storage
            .find_flag_by_id(snapshot, id)
            .await?
            .ok_or(FlagError::NotFound { id })?;
        if !current.is_active {
            return Ok((current, 0));
        }

        let mut graph = DependencyGraph::new(storage.load_flags(snapshot).await?);
        let cascade_reason = format!(
            "Automatically disabled: dependency '{}' was disabled",
            current.name
        );
        let mut cascaded = 0;
        for dependent in graph.disable_order(id) {
            let Some(before) = graph.get(dependent).cloned() else {
                continue;
            };
            if let Some(after) = self
                .force_disable(snapshot, &before, &graph, Some(&cascade_reason))
                .await?
            {
                graph.update(after);
                cascaded += 1;
            }
        }

        let disabled = self
            .force_disable(snapshot, &current, &graph, reason)
            .await?;
        Ok((disabled.unwrap_or(current), cascaded))
    }

    async fn force_disable(
        &self,
        snapshot: &mut S::Snapshot,
        before: &FlagRecord,
        graph: &DependencyGraph,
        reason: Option<&str>,
    ) -> Result<Option<FlagRecord>, FlagError> {
        let storage = self.storage.as_ref();
        let Some(after) = lifecycle::apply(Transition::AutoDisable, before, graph)? else {
            return Ok(None);
        };
        storage.save_flag(snapshot, &after).await?;
        let entry = audit::transition_entry(
            before,
            &after,
            Transition::AutoDisable,
            reason,
            Some(SYSTEM_ACTOR),
        );
        audit::record(storage, snapshot, entry).await?;
        Ok(Some(after))
    }

    /// Commit on success, abort on failure.
    async fn finish<T>(
        &self,
        snapshot: S::Snapshot,
        outcome: Result<T, FlagError>,
    ) -> Result<T, FlagError> {
        match outcome {
            Ok(value) => {
                self.storage.commit_snapshot(snapshot).await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(abort) = self.storage.abort_snapshot(snapshot).await {
                    tracing::error!(error = %abort, "snapshot abort failed");
                }
                Err(e)
            }
        }
    }
}

fn log_rejection(operation: &str, err: &FlagError) {
    if err.is_business() {
        tracing::info!(operation, error = %err, "operation rejected");
    } else {
        tracing::error!(operation, error = %err, "operation failed");
    }
}
