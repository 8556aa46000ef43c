//! In-memory view of the flag dependency graph.
//!
//! Built from one consistent read of the store (`load_flags` inside a
//! snapshot) and used by validation, the lifecycle checks and the nested
//! projection. Node = flag, edge `A -> B` = "A requires B to be active".

use std::collections::{BTreeMap, BTreeSet};

use flaggraph_storage::{FlagId, FlagRecord};

/// Adjacency view of the dependency relation keyed by origin id, plus the
/// reverse (dependents) index.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    flags: BTreeMap<FlagId, FlagRecord>,
    dependents: BTreeMap<FlagId, Vec<FlagId>>,
}

/// A broken graph invariant, reported by [`DependencyGraph::integrity_violations`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityViolation {
    /// Edge to an id that is not in the graph.
    DanglingEdge { from: FlagId, to: FlagId },
    /// The flag can reach itself.
    Cycle { id: FlagId },
    /// `to` is a direct dependency of `from` that is also reachable via `via`.
    RedundantEdge { from: FlagId, to: FlagId, via: FlagId },
    /// Active flag with an inactive direct dependency.
    InactiveDependency { flag: FlagId, dependency: FlagId },
}

impl DependencyGraph {
    pub fn new(flags: impl IntoIterator<Item = FlagRecord>) -> Self {
        let flags: BTreeMap<FlagId, FlagRecord> =
            flags.into_iter().map(|f| (f.id, f)).collect();
        let mut dependents: BTreeMap<FlagId, Vec<FlagId>> = BTreeMap::new();
        for flag in flags.values() {
            for &dep in &flag.dependencies {
                dependents.entry(dep).or_default().push(flag.id);
            }
        }
        DependencyGraph { flags, dependents }
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    pub fn contains(&self, id: FlagId) -> bool {
        self.flags.contains_key(&id)
    }

    pub fn get(&self, id: FlagId) -> Option<&FlagRecord> {
        self.flags.get(&id)
    }

    /// All flags in id order.
    pub fn flags(&self) -> impl Iterator<Item = &FlagRecord> {
        self.flags.values()
    }

    /// Direct dependencies of `id`; empty for unknown ids.
    pub fn dependencies(&self, id: FlagId) -> &[FlagId] {
        self.flags
            .get(&id)
            .map(|f| f.dependencies.as_slice())
            .unwrap_or_default()
    }

    /// Flags that list `id` as a direct dependency, in id order.
    pub fn dependents(&self, id: FlagId) -> Vec<&FlagRecord> {
        let mut out: Vec<&FlagRecord> = self
            .dependents
            .get(&id)
            .into_iter()
            .flatten()
            .filter_map(|d| self.flags.get(d))
            .collect();
        out.sort_by_key(|f| f.id);
        out
    }

    /// Active flags that list `id` as a direct dependency.
    pub fn active_dependents(&self, id: FlagId) -> Vec<&FlagRecord> {
        self.dependents(id)
            .into_iter()
            .filter(|f| f.is_active)
            .collect()
    }

    /// Every id reachable from `start` by following dependency edges,
    /// excluding `start` itself unless a cycle leads back to it.
    ///
    /// Iterative worklist with a visited set: each node is expanded at most
    /// once, so this is O(V + E) and terminates on any graph.
    pub fn reachable_from(&self, start: FlagId) -> BTreeSet<FlagId> {
        let mut reached = BTreeSet::new();
        let mut worklist: Vec<FlagId> = self.dependencies(start).to_vec();
        while let Some(id) = worklist.pop() {
            if !reached.insert(id) {
                continue;
            }
            worklist.extend(
                self.dependencies(id)
                    .iter()
                    .copied()
                    .filter(|d| !reached.contains(d)),
            );
        }
        reached
    }

    /// Active transitive dependents of `id`, ordered so that every flag
    /// comes before each flag it depends on. `id` itself is excluded.
    ///
    /// Disabling in this order never leaves an active flag pointing at an
    /// inactive dependency.
    pub fn disable_order(&self, id: FlagId) -> Vec<FlagId> {
        let mut order = Vec::new();
        let mut entered = BTreeSet::new();
        let mut stack = vec![(id, false)];
        while let Some((node, exiting)) = stack.pop() {
            if exiting {
                if node != id {
                    order.push(node);
                }
                continue;
            }
            if !entered.insert(node) {
                continue;
            }
            stack.push((node, true));
            for dependent in self.active_dependents(node) {
                if !entered.contains(&dependent.id) {
                    stack.push((dependent.id, false));
                }
            }
        }
        order
    }

    /// Replace the stored record for `flag.id`. Edges are fixed at creation,
    /// so only the state of an existing node changes.
    pub fn update(&mut self, flag: FlagRecord) {
        if let Some(slot) = self.flags.get_mut(&flag.id) {
            *slot = flag;
        }
    }

    /// Check acyclicity, minimality and the activation invariant over the
    /// whole graph.
    pub fn integrity_violations(&self) -> Vec<IntegrityViolation> {
        let mut violations = Vec::new();
        for flag in self.flags.values() {
            for &dep in &flag.dependencies {
                match self.flags.get(&dep) {
                    None => violations.push(IntegrityViolation::DanglingEdge {
                        from: flag.id,
                        to: dep,
                    }),
                    Some(target) if flag.is_active && !target.is_active => {
                        violations.push(IntegrityViolation::InactiveDependency {
                            flag: flag.id,
                            dependency: dep,
                        })
                    }
                    Some(_) => {}
                }
            }

            if self.reachable_from(flag.id).contains(&flag.id) {
                violations.push(IntegrityViolation::Cycle { id: flag.id });
            }

            for (i, &via) in flag.dependencies.iter().enumerate() {
                let reach = self.reachable_from(via);
                for (j, &to) in flag.dependencies.iter().enumerate() {
                    if i != j && (to == via || reach.contains(&to)) {
                        violations.push(IntegrityViolation::RedundantEdge {
                            from: flag.id,
                            to,
                            via,
                        });
                    }
                }
            }
        }
        violations
    }
}
