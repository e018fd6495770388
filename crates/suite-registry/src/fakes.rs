//! In-memory fake registry (testing only)
//!
//! [`MemoryRegistry`] satisfies the [`RegistryClient`] contract without a
//! network. It also counts calls and can be switched "offline" so callers'
//! transient-failure handling can be exercised.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::client::RegistryClient;
use crate::error::RegistryError;
use crate::record::{DependentRef, PackageStatus, RegistryRecord, RegistryUpdate, StatusMatch};
use crate::RegistryResult;

/// In-memory registry backed by a `BTreeMap<name, record>` (ordered for determinism).
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    records: Mutex<BTreeMap<String, RegistryRecord>>,
    updates: Mutex<Vec<(String, RegistryUpdate)>>,
    offline: AtomicBool,
    get_calls: AtomicUsize,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the registry with records.
    pub fn with_records(records: impl IntoIterator<Item = RegistryRecord>) -> Self {
        let registry = Self::new();
        for r in records {
            registry.insert(r);
        }
        registry
    }

    /// Insert or replace a record.
    pub fn insert(&self, record: RegistryRecord) {
        self.lock_records().insert(record.name.clone(), record);
    }

    /// Snapshot of a record, bypassing the call counters.
    pub fn snapshot(&self, name: &str) -> Option<RegistryRecord> {
        self.lock_records().get(name).cloned()
    }

    /// Every update applied so far, in order.
    pub fn updates(&self) -> Vec<(String, RegistryUpdate)> {
        self.updates
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Number of `get` calls served (including failed ones while offline).
    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    /// While offline every call fails with a transport error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn lock_records(&self) -> MutexGuard<'_, BTreeMap<String, RegistryRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_online(&self) -> RegistryResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RegistryError::Transport(
                "memory registry is offline".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl RegistryClient for MemoryRegistry {
    async fn get(&self, name: &str) -> RegistryResult<Option<RegistryRecord>> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        Ok(self.lock_records().get(name).cloned())
    }

    async fn get_dependents(&self, name: &str) -> RegistryResult<Vec<DependentRef>> {
        self.check_online()?;
        Ok(self
            .lock_records()
            .values()
            .filter(|r| r.dependencies.iter().any(|d| d == name))
            .map(|r| DependentRef {
                name: r.name.clone(),
            })
            .collect())
    }

    async fn update(&self, name: &str, fields: &RegistryUpdate) -> RegistryResult<()> {
        self.check_online()?;
        {
            let mut records = self.lock_records();
            let record = records
                .entry(name.to_string())
                .or_insert_with(|| RegistryRecord::new(name));
            record.apply(fields);
        }
        self.updates
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((name.to_string(), fields.clone()));
        Ok(())
    }

    async fn query_by_status(
        &self,
        status: PackageStatus,
        limit: usize,
    ) -> RegistryResult<Vec<StatusMatch>> {
        self.check_online()?;
        Ok(self
            .lock_records()
            .values()
            .filter(|r| r.status == status)
            .take(limit)
            .map(|r| StatusMatch {
                name: r.name.clone(),
                plan_path: r.plan_path.clone(),
            })
            .collect())
    }
}
