//! Signal transports into the plan coordinator.
//!
//! Sending is fire-and-forget: no reply comes back and callers are expected
//! to treat an `Err` as a warning, never as a reason to fail a build.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::request::PlanRequest;
use crate::{CoordinatorError, CoordinatorResult};

/// Spool location relative to a workspace root.
pub const SPOOL_DIR: &str = ".suite/plan-requests";

/// Anything that can hand a [`PlanRequest`] to a coordinator.
#[async_trait]
pub trait PlanSignal: Send + Sync {
    async fn send(&self, request: PlanRequest) -> CoordinatorResult<()>;
}

/// In-process transport: a clone of the coordinator's inbox sender.
#[derive(Debug, Clone)]
pub struct ChannelSignal {
    tx: mpsc::UnboundedSender<PlanRequest>,
}

impl ChannelSignal {
    pub fn new(tx: mpsc::UnboundedSender<PlanRequest>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl PlanSignal for ChannelSignal {
    async fn send(&self, request: PlanRequest) -> CoordinatorResult<()> {
        self.tx
            .send(request)
            .map_err(|_| CoordinatorError::SignalClosed)
    }
}

/// Cross-process transport: one JSON file per request in a spool directory.
///
/// Files are written under a temporary name and renamed into place so a
/// reader never sees a partial request.
#[derive(Debug, Clone)]
pub struct SpoolSignal {
    dir: PathBuf,
}

impl SpoolSignal {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Spool under `<workspace>/.suite/plan-requests`.
    pub fn for_workspace(root: &Path) -> Self {
        Self::new(root.join(SPOOL_DIR))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl PlanSignal for SpoolSignal {
    async fn send(&self, request: PlanRequest) -> CoordinatorResult<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let id = uuid::Uuid::new_v4();
        let tmp = self.dir.join(format!(".{id}.tmp"));
        let path = self.dir.join(format!("{id}.json"));
        let body = serde_json::to_vec_pretty(&request)?;
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(package = %request.package, path = %path.display(), "plan request spooled");
        Ok(())
    }
}

/// Take every complete request out of a spool directory, oldest first.
///
/// Unreadable files are logged and removed so one bad file cannot wedge the
/// inbox. A missing directory is an empty spool.
pub async fn drain_spool(dir: &Path) -> CoordinatorResult<Vec<PlanRequest>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut requests = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let bytes = tokio::fs::read(&path).await?;
        match serde_json::from_slice::<PlanRequest>(&bytes) {
            Ok(request) => requests.push(request),
            Err(e) => warn!(path = %path.display(), error = %e, "discarding malformed plan request"),
        }
        tokio::fs::remove_file(&path).await?;
    }

    requests.sort_by_key(|r| r.created_at);
    Ok(requests)
}
