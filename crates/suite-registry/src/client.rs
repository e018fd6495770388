//! The registry client contract.
//!
//! Implementations are stateless transports: every call goes to the
//! registry and nothing is cached between calls. In-memory fakes live in
//! [`crate::fakes`].

use async_trait::async_trait;

use crate::record::{DependentRef, PackageStatus, RegistryRecord, RegistryUpdate, StatusMatch};
use crate::RegistryResult;

/// Remote-procedure facade over the package metadata service.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Fetch a package record. `Ok(None)` when the registry does not know the name.
    async fn get(&self, name: &str) -> RegistryResult<Option<RegistryRecord>>;

    /// Packages that declare a dependency on `name`.
    async fn get_dependents(&self, name: &str) -> RegistryResult<Vec<DependentRef>>;

    /// Apply a partial update to a package record.
    async fn update(&self, name: &str, fields: &RegistryUpdate) -> RegistryResult<()>;

    /// Packages currently in `status`, at most `limit` of them.
    async fn query_by_status(
        &self,
        status: PackageStatus,
        limit: usize,
    ) -> RegistryResult<Vec<StatusMatch>>;
}
