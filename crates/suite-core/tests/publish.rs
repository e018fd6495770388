//! Publish coordinator behaviour on a real (temp) workspace.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use suite_core::{
    propagate_to_dependents, PublishCoordinator, PublishReceipt, PublishTransport, SuiteConfig,
    SuiteError, Visibility,
};
use suite_registry::fakes::MemoryRegistry;
use suite_registry::RegistryRecord;

fn write_manifest(root: &Path, dir: &str, manifest: serde_json::Value) {
    let path = root.join("packages").join(dir).join("package.json");
    std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    std::fs::write(path, serde_json::to_string_pretty(&manifest).expect("encode")).expect("write");
}

fn manifest(root: &Path, dir: &str) -> serde_json::Value {
    let text = std::fs::read_to_string(root.join("packages").join(dir).join("package.json"))
        .expect("read");
    serde_json::from_str(&text).expect("json")
}

/// Counts publish calls; optionally rejects every publish.
#[derive(Default)]
struct CountingTransport {
    publishes: AtomicUsize,
    reject: bool,
}

#[async_trait]
impl PublishTransport for CountingTransport {
    async fn is_published(&self, _name: &str, _version: &str) -> suite_core::Result<bool> {
        Ok(false)
    }

    async fn publish(
        &self,
        _package_dir: &Path,
        _visibility: Visibility,
        _dry_run: bool,
    ) -> suite_core::Result<PublishReceipt> {
        self.publishes.fetch_add(1, Ordering::SeqCst);
        if self.reject {
            return Err(SuiteError::Transport("403 Forbidden".to_string()));
        }
        Ok(PublishReceipt {
            location: Some("https://registry.test/@suite/a".to_string()),
        })
    }
}

fn coordinator(
    root: &Path,
    registry: Arc<MemoryRegistry>,
    transport: Arc<CountingTransport>,
) -> PublishCoordinator {
    PublishCoordinator::new(
        Arc::new(SuiteConfig::for_workspace(root)),
        registry,
        transport,
    )
}

#[test]
fn propagation_updates_exactly_the_dependents() {
    let ws = tempfile::tempdir().expect("tempdir");
    let root = ws.path();
    write_manifest(root, "a", json!({ "name": "@suite/a", "version": "1.0.0" }));
    write_manifest(
        root,
        "b",
        json!({ "name": "@suite/b", "version": "1.0.0", "dependencies": { "@suite/a": "1.0.0" } }),
    );
    write_manifest(
        root,
        "c",
        json!({ "name": "@suite/c", "version": "1.0.0", "devDependencies": { "@suite/a": "1.0.0" } }),
    );
    write_manifest(
        root,
        "d",
        json!({ "name": "@suite/d", "version": "1.0.0", "dependencies": { "@suite/z": "1.0.0" } }),
    );
    let untouched = std::fs::read_to_string(root.join("packages/d/package.json")).expect("read");

    let updates = propagate_to_dependents("@suite/a", "1.1.0", root).expect("propagate");

    let mut names: Vec<&str> = updates.iter().map(|u| u.package.as_str()).collect();
    names.sort();
    assert_eq!(names, vec!["@suite/b", "@suite/c"]);
    assert_eq!(manifest(root, "b")["dependencies"]["@suite/a"], "1.1.0");
    assert_eq!(manifest(root, "c")["devDependencies"]["@suite/a"], "1.1.0");
    assert_eq!(
        std::fs::read_to_string(root.join("packages/d/package.json")).expect("read"),
        untouched
    );
    assert_eq!(manifest(root, "a")["version"], "1.0.0");
}

#[test]
fn propagation_keeps_ranges_and_skips_local_protocols() {
    let ws = tempfile::tempdir().expect("tempdir");
    let root = ws.path();
    write_manifest(
        root,
        "b",
        json!({
            "name": "@suite/b",
            "version": "1.0.0",
            "dependencies": { "@suite/a": "^1.0.0" },
            "devDependencies": { "@suite/a": "workspace:*" }
        }),
    );

    let updates = propagate_to_dependents("@suite/a", "2.0.0", root).expect("propagate");
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].section, "dependencies");
    assert_eq!(updates[0].previous_spec, "^1.0.0");
    assert_eq!(updates[0].new_spec, "^2.0.0");
    assert_eq!(manifest(root, "b")["devDependencies"]["@suite/a"], "workspace:*");

    // Second pass has nothing left to change.
    assert!(propagate_to_dependents("@suite/a", "2.0.0", root)
        .expect("propagate")
        .is_empty());
}

#[tokio::test]
async fn publishing_twice_issues_one_registry_publish() {
    let ws = tempfile::tempdir().expect("tempdir");
    let root = ws.path();
    write_manifest(root, "a", json!({ "name": "@suite/a", "version": "0.9.0" }));
    let dir = root.join("packages/a");

    let registry = Arc::new(MemoryRegistry::new());
    let transport = Arc::new(CountingTransport::default());
    let publisher = coordinator(root, registry.clone(), transport.clone());

    let first = publisher
        .publish(&dir, "1.0.0", Visibility::Public, false)
        .await
        .expect("publish");
    assert!(first.success);
    assert!(!first.already_published);
    assert_eq!(first.location.as_deref(), Some("https://registry.test/@suite/a"));
    assert_eq!(manifest(root, "a")["version"], "1.0.0");
    assert!(registry
        .snapshot("@suite/a")
        .expect("record")
        .is_published_at("1.0.0"));

    let second = publisher
        .publish(&dir, "1.0.0", Visibility::Public, false)
        .await
        .expect("publish");
    assert!(second.success);
    assert!(second.already_published);
    assert_eq!(transport.publishes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn registry_record_alone_blocks_republish() {
    let ws = tempfile::tempdir().expect("tempdir");
    let root = ws.path();
    write_manifest(root, "a", json!({ "name": "@suite/a", "version": "1.0.0" }));

    // Crash after publish, before anything local was recorded.
    let registry = Arc::new(MemoryRegistry::with_records([
        RegistryRecord::new("@suite/a").published_at("1.0.0"),
    ]));
    let transport = Arc::new(CountingTransport::default());
    let outcome = coordinator(root, registry, transport.clone())
        .publish(&root.join("packages/a"), "1.0.0", Visibility::Public, false)
        .await
        .expect("publish");
    assert!(outcome.already_published);
    assert_eq!(transport.publishes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn rejected_publish_restores_manifest() {
    let ws = tempfile::tempdir().expect("tempdir");
    let root = ws.path();
    write_manifest(root, "a", json!({ "name": "@suite/a", "version": "0.9.0" }));

    let registry = Arc::new(MemoryRegistry::new());
    let transport = Arc::new(CountingTransport {
        reject: true,
        ..CountingTransport::default()
    });
    let outcome = coordinator(root, registry.clone(), transport)
        .publish(&root.join("packages/a"), "1.0.0", Visibility::Restricted, false)
        .await
        .expect("publish returns an outcome");

    assert!(!outcome.success);
    assert!(outcome.error.as_deref().unwrap_or("").contains("403"));
    assert_eq!(manifest(root, "a")["version"], "0.9.0");
    assert!(registry.snapshot("@suite/a").is_none());
}

#[tokio::test]
async fn dry_run_leaves_workspace_and_registry_alone() {
    let ws = tempfile::tempdir().expect("tempdir");
    let root = ws.path();
    write_manifest(root, "a", json!({ "name": "@suite/a", "version": "0.9.0" }));

    let registry = Arc::new(MemoryRegistry::new());
    let transport = Arc::new(CountingTransport::default());
    let outcome = coordinator(root, registry.clone(), transport.clone())
        .publish(&root.join("packages/a"), "1.0.0", Visibility::Public, true)
        .await
        .expect("publish");

    assert!(outcome.success);
    assert!(outcome.dry_run);
    assert_eq!(transport.publishes.load(Ordering::SeqCst), 1);
    assert_eq!(manifest(root, "a")["version"], "0.9.0");
    assert!(registry.updates().is_empty());
}

#[tokio::test]
async fn malformed_version_is_an_error() {
    let ws = tempfile::tempdir().expect("tempdir");
    let root = ws.path();
    write_manifest(root, "a", json!({ "name": "@suite/a", "version": "0.9.0" }));

    let err = coordinator(
        root,
        Arc::new(MemoryRegistry::new()),
        Arc::new(CountingTransport::default()),
    )
    .publish(&root.join("packages/a"), "not-a-version", Visibility::Public, false)
    .await
    .unwrap_err();
    assert!(matches!(err, SuiteError::Publish(_)));
}
