//! Trait contract tests for RegistryClient.
//!
//! These tests verify the behavioral contract of the registry client
//! using the in-memory fake. Any conforming implementation must pass these.

use suite_registry::fakes::MemoryRegistry;
use suite_registry::*;

fn seeded() -> MemoryRegistry {
    MemoryRegistry::with_records([
        RegistryRecord::new("@suite/core").published_at("1.0.0"),
        RegistryRecord::new("@suite/logger")
            .with_dependencies(vec!["@suite/core".into()])
            .with_status(PackageStatus::NeedsPlan),
        RegistryRecord::new("@suite/cache")
            .with_dependencies(vec!["@suite/core".into(), "@suite/logger".into()])
            .with_status(PackageStatus::NeedsPlan),
        RegistryRecord::new("@suite/http")
            .with_status(PackageStatus::Planned)
            .with_plan("plans/packages/http.md", "plan/http"),
    ])
}

#[tokio::test]
async fn get_returns_none_for_unknown_name() {
    let registry = seeded();
    assert!(registry.get("@suite/nope").await.unwrap().is_none());
}

#[tokio::test]
async fn get_returns_record() {
    let registry = seeded();
    let record = registry.get("@suite/core").await.unwrap().unwrap();
    assert!(record.is_published_at("1.0.0"));
}

#[tokio::test]
async fn get_dependents_lists_every_dependent() {
    let registry = seeded();
    let mut names: Vec<String> = registry
        .get_dependents("@suite/core")
        .await
        .unwrap()
        .into_iter()
        .map(|d| d.name)
        .collect();
    names.sort();
    assert_eq!(names, vec!["@suite/cache", "@suite/logger"]);
}

#[tokio::test]
async fn update_creates_missing_record() {
    let registry = seeded();
    registry
        .update("@suite/new", &RegistryUpdate::status(PackageStatus::NeedsPlan))
        .await
        .unwrap();
    let record = registry.get("@suite/new").await.unwrap().unwrap();
    assert_eq!(record.status, PackageStatus::NeedsPlan);
}

#[tokio::test]
async fn update_plan_ready_moves_out_of_needs_plan() {
    let registry = seeded();
    registry
        .update(
            "@suite/logger",
            &RegistryUpdate::plan_ready("plans/packages/logger.md", "plan/logger"),
        )
        .await
        .unwrap();

    let pending = registry
        .query_by_status(PackageStatus::NeedsPlan, 10)
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].name, "@suite/cache");
}

#[tokio::test]
async fn query_by_status_respects_limit() {
    let registry = seeded();
    let pending = registry
        .query_by_status(PackageStatus::NeedsPlan, 1)
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
}

#[tokio::test]
async fn offline_registry_fails_transiently() {
    let registry = seeded();
    registry.set_offline(true);
    let err = registry.get("@suite/core").await.unwrap_err();
    assert!(err.is_transient());
    assert_eq!(registry.get_calls(), 1);

    registry.set_offline(false);
    assert!(registry.get("@suite/core").await.unwrap().is_some());
}
