//! Dependency validation: existence, cycles, redundancy.
//!
//! Pure function over a [`DependencyGraph`]; persisting the edges is the
//! caller's job.

use std::collections::BTreeSet;

use flaggraph_storage::FlagId;

use crate::error::FlagError;
use crate::graph::DependencyGraph;

/// Check that `candidate` may depend on exactly the ids in `proposed`.
///
/// `candidate` is `None` for a flag that has not been assigned an id yet;
/// nothing in the graph can reach such a flag, so the cycle checks are
/// skipped. `proposed` is the flag's complete dependency set.
///
/// Checks run in this order and stop at the first failure:
/// 1. every proposed id exists (`DependenciesNotFound`, all missing ids)
/// 2. no id is listed twice (`RedundantEdge` with itself)
/// 3. no self-reference (`Cycle`)
/// 4. `candidate` is not reachable from any proposed id (`Cycle`)
/// 5. no proposed id is reachable from another (`RedundantEdge`)
pub fn validate_dependencies(
    candidate: Option<FlagId>,
    proposed: &[FlagId],
    graph: &DependencyGraph,
) -> Result<(), FlagError> {
    if proposed.is_empty() {
        return Ok(());
    }

    let missing: BTreeSet<FlagId> = proposed
        .iter()
        .copied()
        .filter(|id| !graph.contains(*id))
        .collect();
    if !missing.is_empty() {
        return Err(FlagError::DependenciesNotFound {
            missing: missing.into_iter().collect(),
        });
    }

    let mut seen = BTreeSet::new();
    for &id in proposed {
        if !seen.insert(id) {
            return Err(FlagError::RedundantEdge {
                dependency: id,
                implied_by: id,
            });
        }
    }

    if let Some(origin) = candidate {
        if proposed.contains(&origin) {
            return Err(FlagError::Cycle {
                origin,
                via: origin,
            });
        }
    }

    // Reachability is computed once per proposed id and reused by both
    // remaining checks. Never cached across calls.
    let reach: Vec<(FlagId, BTreeSet<FlagId>)> = proposed
        .iter()
        .map(|&dep| (dep, graph.reachable_from(dep)))
        .collect();

    if let Some(origin) = candidate {
        if let Some((via, _)) = reach.iter().find(|(_, r)| r.contains(&origin)) {
            return Err(FlagError::Cycle { origin, via: *via });
        }
    }

    for (via, reachable) in &reach {
        if let Some(&implied) = proposed
            .iter()
            .find(|&&other| other != *via && reachable.contains(&other))
        {
            return Err(FlagError::RedundantEdge {
                dependency: implied,
                implied_by: *via,
            });
        }
    }

    Ok(())
}
