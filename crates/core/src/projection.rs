//! Read-only response shapes derived from a flag record.

use std::collections::BTreeSet;

use flaggraph_storage::{FlagId, FlagRecord};
use serde::Serialize;

use crate::graph::DependencyGraph;

/// Shallow projection: dependencies as ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlagView {
    pub id: FlagId,
    pub name: String,
    pub is_active: bool,
    pub dependencies: Vec<FlagId>,
}

impl From<&FlagRecord> for FlagView {
    fn from(flag: &FlagRecord) -> Self {
        FlagView {
            id: flag.id,
            name: flag.name.clone(),
            is_active: flag.is_active,
            dependencies: flag.dependencies.clone(),
        }
    }
}

/// Recursive projection: dependencies as nested objects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlagTree {
    pub id: FlagId,
    pub name: String,
    pub is_active: bool,
    pub dependencies: Vec<FlagTree>,
}

impl FlagTree {
    /// Expand `root` through `graph`.
    ///
    /// A dependency already on the current path is emitted without children,
    /// and ids missing from the graph are skipped, so this terminates even
    /// on a corrupt graph.
    pub fn build(root: &FlagRecord, graph: &DependencyGraph) -> Self {
        let mut path = BTreeSet::new();
        Self::expand(root, graph, &mut path)
    }

    fn expand(flag: &FlagRecord, graph: &DependencyGraph, path: &mut BTreeSet<FlagId>) -> Self {
        let mut node = FlagTree {
            id: flag.id,
            name: flag.name.clone(),
            is_active: flag.is_active,
            dependencies: Vec::new(),
        };
        if !path.insert(flag.id) {
            return node;
        }
        node.dependencies = flag
            .dependencies
            .iter()
            .filter_map(|&dep| graph.get(dep))
            .map(|dep| Self::expand(dep, graph, path))
            .collect();
        path.remove(&flag.id);
        node
    }
}
