//! End-to-end flag service behavior over the in-memory backend.

use std::sync::Arc;

use flaggraph_core::{
    AuditLogFilter, AuditOperation, FlagError, FlagService, FlagView, MemoryStorage, Page,
    SYSTEM_ACTOR,
};

fn service() -> FlagService<MemoryStorage> {
    FlagService::new(Arc::new(MemoryStorage::new()))
}

async fn all_logs(svc: &FlagService<MemoryStorage>) -> Vec<flaggraph_core::AuditLogEntry> {
    svc.list_audit_logs(&AuditLogFilter::default(), Page { limit: 0, offset: 0 })
        .await
        .unwrap()
}

async fn assert_integrity(svc: &FlagService<MemoryStorage>) {
    let graph = flaggraph_core::DependencyGraph::new(svc.list_flags().await.unwrap());
    let violations = graph.integrity_violations();
    assert!(violations.is_empty(), "integrity violations: {violations:?}");
}

#[tokio::test]
async fn create_flag_without_dependencies() {
    let svc = service();
    let flag = svc.create_flag("flagA", &[], None).await.unwrap();
    assert_eq!(flag.name, "flagA");
    assert!(!flag.is_active);
    assert!(flag.dependencies.is_empty());

    let view = FlagView::from(&svc.get_flag(flag.id).await.unwrap());
    assert_eq!(view.dependencies, Vec::<i64>::new());
}

#[tokio::test]
async fn create_with_missing_dependency_rejected() {
    let svc = service();
    let err = svc.create_flag("flagB", &[999], None).await.unwrap_err();
    assert!(matches!(&err, FlagError::DependenciesNotFound { missing } if missing == &vec![999]));
    assert!(err.to_string().contains("one or more dependencies not found"));
    assert!(svc.list_flags().await.unwrap().is_empty());
    assert!(all_logs(&svc).await.is_empty());
}

#[tokio::test]
async fn duplicate_name_rejected() {
    let svc = service();
    svc.create_flag("flagA", &[], None).await.unwrap();
    let err = svc.create_flag("flagA", &[], None).await.unwrap_err();
    assert!(matches!(err, FlagError::DuplicateName { ref name } if name == "flagA"));
    assert_eq!(svc.list_flags().await.unwrap().len(), 1);
}

#[tokio::test]
async fn blank_name_rejected() {
    let svc = service();
    assert!(matches!(
        svc.create_flag("  ", &[], None).await,
        Err(FlagError::EmptyName)
    ));
}

#[tokio::test]
async fn redundant_dependency_rejected() {
    let svc = service();
    let a = svc.create_flag("flagA", &[], None).await.unwrap();
    let b = svc.create_flag("flagB", &[a.id], None).await.unwrap();
    let err = svc
        .create_flag("flagC", &[b.id, a.id], None)
        .await
        .unwrap_err();
    match err {
        FlagError::RedundantEdge {
            dependency,
            implied_by,
        } => {
            assert_eq!(dependency, a.id);
            assert_eq!(implied_by, b.id);
        }
        other => panic!("expected RedundantEdge, got {other:?}"),
    }
    assert!(svc.get_flag_by_name("flagC").await.is_err());

    // The minimal form is accepted.
    let c = svc.create_flag("flagC", &[b.id], None).await.unwrap();
    assert_eq!(c.dependencies, vec![b.id]);
    assert_integrity(&svc).await;
}

#[tokio::test]
async fn activation_requires_active_dependencies() {
    let svc = service();
    let dep1 = svc.create_flag("dep1", &[], None).await.unwrap();
    let flag3 = svc.create_flag("flag3", &[dep1.id], None).await.unwrap();

    let err = svc.toggle_flag(flag3.id, None).await.unwrap_err();
    assert!(err.to_string().contains("all dependencies must be active"));
    assert!(!svc.get_flag(flag3.id).await.unwrap().is_active);

    assert!(svc.toggle_flag(dep1.id, None).await.unwrap().is_active);
    assert!(svc.toggle_flag(flag3.id, None).await.unwrap().is_active);
    assert_integrity(&svc).await;
}

#[tokio::test]
async fn activate_then_deactivate_writes_three_entries() {
    let svc = service();
    let flag5 = svc.create_flag("flag5", &[], Some("alice")).await.unwrap();
    svc.toggle_flag(flag5.id, Some("alice")).await.unwrap();
    let off = svc.toggle_flag(flag5.id, Some("bob")).await.unwrap();
    assert!(!off.is_active);

    let mut logs = all_logs(&svc).await;
    assert_eq!(logs.len(), 3);
    logs.reverse();
    let ops: Vec<_> = logs.iter().map(|e| e.operation).collect();
    assert_eq!(
        ops,
        vec![
            AuditOperation::Create,
            AuditOperation::Activate,
            AuditOperation::Deactivate
        ]
    );
    assert!(logs.windows(2).all(|w| w[0].id < w[1].id));

    assert!(logs[0].previous_state.is_none());
    assert!(logs[1..].iter().all(|e| e.previous_state.is_some()));
    assert!(logs.iter().all(|e| e.new_state.is_some()));
    assert_eq!(logs[1].reason.as_deref(), Some("Manual activation"));
    assert_eq!(logs[2].reason.as_deref(), Some("Manual deactivation"));
    assert_eq!(logs[2].actor.as_deref(), Some("bob"));
    assert!(logs[2].previous_state.as_ref().unwrap().is_active);
    assert!(!logs[2].new_state.as_ref().unwrap().is_active);
}

#[tokio::test]
async fn deactivation_blocked_by_active_dependent() {
    let svc = service();
    let x = svc.create_flag("flagX", &[], None).await.unwrap();
    svc.toggle_flag(x.id, None).await.unwrap();
    let y = svc.create_flag("flagY", &[x.id], None).await.unwrap();
    svc.toggle_flag(y.id, None).await.unwrap();

    let err = svc.toggle_flag(x.id, None).await.unwrap_err();
    assert!(matches!(err, FlagError::DependentsActive { .. }));
    assert!(err.to_string().contains("'flagY'"));
    assert!(svc.get_flag(x.id).await.unwrap().is_active);

    // Rejections leave no trace in the audit log.
    let deactivations = svc
        .list_audit_logs(
            &AuditLogFilter {
                operation: Some(AuditOperation::Deactivate),
                ..AuditLogFilter::default()
            },
            Page::default(),
        )
        .await
        .unwrap();
    assert!(deactivations.is_empty());
}

#[tokio::test]
async fn deactivation_names_every_blocking_dependent() {
    let svc = service();
    let base = svc.create_flag("base", &[], None).await.unwrap();
    svc.toggle_flag(base.id, None).await.unwrap();
    for name in ["one", "two"] {
        let f = svc.create_flag(name, &[base.id], None).await.unwrap();
        svc.toggle_flag(f.id, None).await.unwrap();
    }
    let err = svc.deactivate_flag(base.id, None).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "cannot deactivate 'base': flags 'one', 'two' depend on it"
    );
}

#[tokio::test]
async fn explicit_transitions_are_idempotent() {
    let svc = service();
    let f = svc.create_flag("explicit", &[], None).await.unwrap();
    assert!(!svc.deactivate_flag(f.id, None).await.unwrap().is_active);
    assert!(svc.activate_flag(f.id, None).await.unwrap().is_active);
    assert!(svc.activate_flag(f.id, None).await.unwrap().is_active);
    assert_eq!(all_logs(&svc).await.len(), 2);
}

#[tokio::test]
async fn toggle_unknown_flag_is_not_found() {
    let svc = service();
    assert!(matches!(
        svc.toggle_flag(42, None).await,
        Err(FlagError::NotFound { id: 42 })
    ));
    assert!(matches!(
        svc.auto_disable_flag(42, None).await,
        Err(FlagError::NotFound { id: 42 })
    ));
}

#[tokio::test]
async fn auto_disable_inactive_flag_is_noop() {
    let svc = service();
    let f = svc.create_flag("idle", &[], None).await.unwrap();
    let before = all_logs(&svc).await.len();
    let same = svc.auto_disable_flag(f.id, Some("upstream outage")).await.unwrap();
    assert_eq!(same, f);
    assert_eq!(all_logs(&svc).await.len(), before);
}

#[tokio::test]
async fn auto_disable_cascades_to_active_dependents() {
    let svc = service();
    let root = svc.create_flag("root", &[], None).await.unwrap();
    let mid = svc.create_flag("mid", &[root.id], None).await.unwrap();
    let leaf = svc.create_flag("leaf", &[mid.id], None).await.unwrap();
    let idle = svc.create_flag("idle", &[root.id], None).await.unwrap();
    for id in [root.id, mid.id, leaf.id] {
        svc.toggle_flag(id, None).await.unwrap();
    }

    let disabled = svc
        .auto_disable_flag(root.id, Some("upstream outage"))
        .await
        .unwrap();
    assert!(!disabled.is_active);
    for f in svc.list_flags().await.unwrap() {
        assert!(!f.is_active, "{} still active", f.name);
    }
    assert_integrity(&svc).await;

    let auto = svc
        .list_audit_logs(
            &AuditLogFilter {
                operation: Some(AuditOperation::AutoDisable),
                ..AuditLogFilter::default()
            },
            Page::default(),
        )
        .await
        .unwrap();
    // Newest first: root last to be disabled, leaf first.
    let names: Vec<_> = auto.iter().map(|e| e.flag_name.as_str()).collect();
    assert_eq!(names, vec!["root", "mid", "leaf"]);
    assert!(auto.iter().all(|e| e.actor.as_deref() == Some(SYSTEM_ACTOR)));
    assert_eq!(auto[0].reason.as_deref(), Some("upstream outage"));
    assert_eq!(
        auto[2].reason.as_deref(),
        Some("Automatically disabled: dependency 'root' was disabled")
    );
    assert!(auto.iter().all(|e| e.flag_id != idle.id));
}

#[tokio::test]
async fn auto_disable_default_reason() {
    let svc = service();
    let f = svc.create_flag("solo", &[], None).await.unwrap();
    svc.toggle_flag(f.id, None).await.unwrap();
    svc.auto_disable_flag(f.id, None).await.unwrap();
    let latest = &all_logs(&svc).await[0];
    assert_eq!(latest.operation, AuditOperation::AutoDisable);
    assert_eq!(
        latest.reason.as_deref(),
        Some("Automatically disabled by system")
    );
}

#[tokio::test]
async fn nested_and_flat_projections_agree() {
    let svc = service();
    let a = svc.create_flag("a", &[], None).await.unwrap();
    let b = svc.create_flag("b", &[a.id], None).await.unwrap();
    let c = svc.create_flag("c", &[b.id], None).await.unwrap();

    let flat = FlagView::from(&svc.get_flag(c.id).await.unwrap());
    let tree = svc.get_flag_tree(c.id).await.unwrap();
    let nested_ids: Vec<_> = tree.dependencies.iter().map(|d| d.id).collect();
    assert_eq!(flat.dependencies, nested_ids);
    assert_eq!(tree.dependencies[0].dependencies[0].name, "a");
    assert!(matches!(
        svc.get_flag_tree(99).await,
        Err(FlagError::NotFound { id: 99 })
    ));
}

#[tokio::test]
async fn audit_queries_filter_and_paginate() {
    let svc = service();
    let a = svc.create_flag("a", &[], Some("alice")).await.unwrap();
    let b = svc.create_flag("b", &[], Some("bob")).await.unwrap();
    svc.toggle_flag(a.id, Some("alice")).await.unwrap();
    svc.toggle_flag(a.id, Some("alice")).await.unwrap();

    let for_a = svc
        .list_audit_logs(&AuditLogFilter::for_flag(a.id), Page::default())
        .await
        .unwrap();
    assert_eq!(for_a.len(), 3);
    assert_eq!(for_a[0].operation, AuditOperation::Deactivate);

    let by_bob = svc
        .list_audit_logs(
            &AuditLogFilter {
                actor: Some("bob".to_string()),
                ..AuditLogFilter::default()
            },
            Page::default(),
        )
        .await
        .unwrap();
    assert_eq!(by_bob.len(), 1);
    assert_eq!(by_bob[0].flag_id, b.id);

    let page = svc
        .list_audit_logs(&AuditLogFilter::default(), Page { limit: 2, offset: 1 })
        .await
        .unwrap();
    let ops: Vec<_> = page.iter().map(|e| e.operation).collect();
    assert_eq!(ops, vec![AuditOperation::Activate, AuditOperation::Create]);
}

#[tokio::test]
async fn concurrent_creates_of_one_name_admit_one() {
    let svc = service();
    let mut handles = Vec::new();
    for _ in 0..8 {
        let svc = svc.clone();
        handles.push(tokio::spawn(async move {
            svc.create_flag("racy", &[], None).await
        }));
    }
    let mut created = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(_) => created += 1,
            Err(FlagError::DuplicateName { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(created, 1);
    assert_eq!(all_logs(&svc).await.len(), 1);
}
