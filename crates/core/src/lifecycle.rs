//! Flag lifecycle state machine.
//!
//! Two states, three transitions:
//!
//! | transition    | from     | to       | precondition                         |
//! |---------------|----------|----------|--------------------------------------|
//! | `Activate`    | Inactive | Active   | every direct dependency is active    |
//! | `Deactivate`  | Active   | Inactive | no active flag depends on this one   |
//! | `AutoDisable` | Active   | Inactive | none (system-initiated)              |
//!
//! Applying a transition to a flag already in the target state is a no-op.

use flaggraph_storage::{AuditOperation, FlagRecord};
use serde::Serialize;

use crate::error::FlagError;
use crate::graph::DependencyGraph;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagState {
    Inactive,
    Active,
}

impl FlagState {
    pub fn of(flag: &FlagRecord) -> Self {
        if flag.is_active {
            FlagState::Active
        } else {
            FlagState::Inactive
        }
    }

    pub fn is_active(self) -> bool {
        self == FlagState::Active
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Activate,
    Deactivate,
    AutoDisable,
}

impl Transition {
    /// The transition a manual toggle performs from `state`.
    pub fn for_toggle(state: FlagState) -> Self {
        match state {
            FlagState::Inactive => Transition::Activate,
            FlagState::Active => Transition::Deactivate,
        }
    }

    pub fn target(self) -> FlagState {
        match self {
            Transition::Activate => FlagState::Active,
            Transition::Deactivate | Transition::AutoDisable => FlagState::Inactive,
        }
    }

    pub fn operation(self) -> AuditOperation {
        match self {
            Transition::Activate => AuditOperation::Activate,
            Transition::Deactivate => AuditOperation::Deactivate,
            Transition::AutoDisable => AuditOperation::AutoDisable,
        }
    }

    /// Audit reason used when the caller supplies none.
    pub fn default_reason(self) -> &'static str {
        match self {
            Transition::Activate => "Manual activation",
            Transition::Deactivate => "Manual deactivation",
            Transition::AutoDisable => "Automatically disabled by system",
        }
    }
}

/// Check `transition`'s precondition for `flag` against `graph`.
///
/// Returns `Ok(None)` when the flag is already in the target state,
/// `Ok(Some(next))` with the post-transition record otherwise. The input
/// record is never modified.
pub fn apply(
    transition: Transition,
    flag: &FlagRecord,
    graph: &DependencyGraph,
) -> Result<Option<FlagRecord>, FlagError> {
    if FlagState::of(flag) == transition.target() {
        return Ok(None);
    }

    match transition {
        Transition::Activate => {
            let inactive: Vec<String> = flag
                .dependencies
                .iter()
                .filter(|&&dep| !graph.get(dep).is_some_and(|d| d.is_active))
                .map(|&dep| match graph.get(dep) {
                    Some(d) => d.name.clone(),
                    None => dep.to_string(),
                })
                .collect();
            if !inactive.is_empty() {
                return Err(FlagError::DependencyNotActive {
                    flag: flag.name.clone(),
                    inactive,
                });
            }
        }
        Transition::Deactivate => {
            let blocking: Vec<String> = graph
                .active_dependents(flag.id)
                .into_iter()
                .filter(|d| d.id != flag.id)
                .map(|d| d.name.clone())
                .collect();
            if !blocking.is_empty() {
                return Err(FlagError::DependentsActive {
                    flag: flag.name.clone(),
                    dependents: blocking,
                });
            }
        }
        Transition::AutoDisable => {}
    }

    let mut next = flag.clone();
    next.is_active = transition.target().is_active();
    Ok(Some(next))
}
