use flaggraph_storage::{FlagId, StorageError};

/// Everything a flag operation can fail with.
///
/// All variants except `Storage` are business-rule failures: deterministic
/// for a given graph state, never partially applied, and not worth retrying
/// without changing the input or the graph.
#[derive(Debug, thiserror::Error)]
pub enum FlagError {
    #[error("flag not found: {id}")]
    NotFound { id: FlagId },

    #[error("flag not found: '{name}'")]
    NameNotFound { name: String },

    #[error("one or more dependencies not found: {}", join_ids(.missing))]
    DependenciesNotFound { missing: Vec<FlagId> },

    #[error("flag with this name already exists: '{name}'")]
    DuplicateName { name: String },

    #[error("flag name must not be empty")]
    EmptyName,

    /// Adding the edge `origin -> via` would close a cycle. `origin == via`
    /// for a self-reference.
    #[error("circular dependency detected: edge {origin} -> {via} closes a cycle")]
    Cycle { origin: FlagId, via: FlagId },

    /// `dependency` is already reachable through `implied_by`.
    #[error("{}", redundant_message(.dependency, .implied_by))]
    RedundantEdge {
        dependency: FlagId,
        implied_by: FlagId,
    },

    #[error(
        "all dependencies must be active to activate '{flag}' (inactive: {})",
        quote_names(.inactive)
    )]
    DependencyNotActive { flag: String, inactive: Vec<String> },

    #[error("{}", dependents_message(.flag, .dependents))]
    DependentsActive {
        flag: String,
        dependents: Vec<String>,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl FlagError {
    /// True for business-rule failures, false for storage failures.
    pub fn is_business(&self) -> bool {
        !matches!(self, FlagError::Storage(_))
    }
}

fn join_ids(ids: &[FlagId]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn quote_names(names: &[String]) -> String {
    names
        .iter()
        .map(|n| format!("'{n}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn redundant_message(dependency: &FlagId, implied_by: &FlagId) -> String {
    if dependency == implied_by {
        format!("redundant dependency: {dependency} is listed more than once")
    } else {
        format!(
            "redundant dependency: {dependency} is already implied by dependency {implied_by}"
        )
    }
}

fn dependents_message(flag: &str, dependents: &[String]) -> String {
    match dependents {
        [single] => format!("cannot deactivate '{flag}': flag '{single}' depends on it"),
        many => format!(
            "cannot deactivate '{flag}': flags {} depend on it",
            quote_names(many)
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_dependent_named_alone() {
        let err = FlagError::DependentsActive {
            flag: "flagX".to_string(),
            dependents: vec!["flagY".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "cannot deactivate 'flagX': flag 'flagY' depends on it"
        );
    }

    #[test]
    fn multiple_dependents_enumerated() {
        let err = FlagError::DependentsActive {
            flag: "base".to_string(),
            dependents: vec!["a".to_string(), "b".to_string(), "c".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "cannot deactivate 'base': flags 'a', 'b', 'c' depend on it"
        );
    }

    #[test]
    fn missing_dependencies_message() {
        let err = FlagError::DependenciesNotFound {
            missing: vec![999, 1000],
        };
        assert_eq!(
            err.to_string(),
            "one or more dependencies not found: 999, 1000"
        );
    }

    #[test]
    fn duplicate_edge_message() {
        let dup = FlagError::RedundantEdge {
            dependency: 2,
            implied_by: 2,
        };
        assert_eq!(dup.to_string(), "redundant dependency: 2 is listed more than once");
    }

    #[test]
    fn storage_errors_are_not_business_errors() {
        let err = FlagError::from(StorageError::Backend("connection reset".to_string()));
        assert!(!err.is_business());
        assert_eq!(err.to_string(), "storage backend error: connection reset");
        assert!(FlagError::EmptyName.is_business());
    }
}
