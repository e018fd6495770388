//! Suite-Registry: package metadata registry client
//!
//! This crate is the leaf of the suite build orchestrator. It talks to the
//! package metadata service that records each package's dependencies,
//! publish status and implementation-plan location.
//!
//! ## Layer 0 - Registry transport
//!
//! The client holds no state of its own; every call is a request/response
//! round trip.
//!
//! ## Key Components
//!
//! - `RegistryClient`: async trait for `get`, `getDependents`, `update`, `queryByStatus`
//! - `HttpRegistryClient`: bearer-authenticated RPC over HTTP
//! - `fakes::MemoryRegistry`: in-memory implementation for tests

mod client;
mod error;
pub mod fakes;
pub mod http;
mod record;

pub use client::RegistryClient;
pub use error::RegistryError;
pub use http::{unwrap_response, HttpRegistryClient, RegistryConfig};
pub use record::{DependentRef, PackageStatus, RegistryRecord, RegistryUpdate, StatusMatch};

/// Result type for registry operations
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;
