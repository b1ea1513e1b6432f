use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

use super::types::{QueueState, RequestId};
use crate::paths;

/// Directory-backed request queue.
///
/// A request is an empty marker file; moving it between the sibling state
/// directories with `rename` is the only state transition, so a marker is always in
/// exactly one place.
#[derive(Debug, Clone)]
pub struct RequestQueue {
    requests_dir: PathBuf,
    results_dir: PathBuf,
}

/// Proof that a request was claimed into `processing`
#[derive(Debug)]
#[must_use = "a claimed request must be completed or failed"]
pub struct Ticket {
    id: RequestId,
}

impl Ticket {
    pub fn id(&self) -> &RequestId {
        &self.id
    }
}

impl RequestQueue {
    pub fn new(base_dir: &Path) -> Self {
        Self {
            requests_dir: paths::requests_dir(base_dir),
            results_dir: paths::results_dir(base_dir),
        }
    }

    pub fn dir(&self, state: QueueState) -> PathBuf {
        self.requests_dir.join(state.dir_name())
    }

    fn marker(&self, state: QueueState, id: &RequestId) -> PathBuf {
        self.dir(state).join(id.marker_name())
    }

    /// Create the queue and results directories
    pub async fn init(&self) -> Result<()> {
        for state in QueueState::ALL {
            fs::create_dir_all(self.dir(state))
                .await
                .with_context(|| format!("creating {} directory", state))?;
        }
        fs::create_dir_all(&self.results_dir)
            .await
            .context("creating results directory")?;
        Ok(())
    }

    /// Requests in `state`, oldest first
    pub async fn list(&self, state: QueueState) -> Result<Vec<RequestId>> {
        let dir = self.dir(state);
        let mut ids = Vec::new();
        if !dir.exists() {
            return Ok(ids);
        }

        let mut entries = fs::read_dir(&dir)
            .await
            .with_context(|| format!("reading {} directory", state))?;
        while let Some(entry) = entries.next_entry().await? {
            if let Some(id) = RequestId::from_marker(&entry.path()) {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }

    pub async fn oldest_pending(&self) -> Result<Option<RequestId>> {
        Ok(self.list(QueueState::Pending).await?.into_iter().next())
    }

    /// Every queue directory currently holding `id`
    pub async fn locate(&self, id: &RequestId) -> Result<Vec<QueueState>> {
        let mut found = Vec::new();
        for state in QueueState::ALL {
            if fs::try_exists(self.marker(state, id)).await? {
                found.push(state);
            }
        }
        Ok(found)
    }

    /// Drop a new marker into `pending`
    pub async fn enqueue(&self, id: &RequestId) -> Result<()> {
        fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.marker(QueueState::Pending, id))
            .await
            .with_context(|| format!("creating request {}", id))?;
        Ok(())
    }

    /// Enqueue a request named after the current local time
    pub async fn submit(&self) -> Result<RequestId> {
        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S").to_string();
        let mut id = RequestId::new(stamp.clone());
        let mut suffix = 1;
        while !self.locate(&id).await?.is_empty() {
            id = RequestId::new(format!("{}-{}", stamp, suffix));
            suffix += 1;
        }
        self.enqueue(&id).await?;
        info!(target: "queue", request = %id, "request submitted");
        Ok(id)
    }

    /// Atomically move a pending request into `processing`
    pub async fn claim(&self, id: &RequestId) -> Result<Ticket> {
        self.transition(id, QueueState::Pending, QueueState::Processing)
            .await?;
        Ok(Ticket { id: id.clone() })
    }

    pub async fn complete(&self, ticket: Ticket) -> Result<()> {
        self.transition(&ticket.id, QueueState::Processing, QueueState::Completed)
            .await
    }

    pub async fn fail(&self, ticket: Ticket) -> Result<()> {
        self.transition(&ticket.id, QueueState::Processing, QueueState::Failed)
            .await
    }

    async fn transition(&self, id: &RequestId, from: QueueState, to: QueueState) -> Result<()> {
        fs::rename(self.marker(from, id), self.marker(to, id))
            .await
            .with_context(|| format!("moving request {} from {} to {}", id, from, to))?;
        info!(target: "queue", request = %id, from = %from, to = %to, "request moved");
        Ok(())
    }

    /// Move every request left in `processing` back to `pending`.
    ///
    /// Idempotent: safe at startup, at shutdown, and when nothing is in flight.
    pub async fn requeue_processing(&self) -> Result<Vec<RequestId>> {
        let mut moved = Vec::new();
        for id in self.list(QueueState::Processing).await? {
            match self
                .transition(&id, QueueState::Processing, QueueState::Pending)
                .await
            {
                Ok(()) => moved.push(id),
                Err(e) => warn!(target: "queue", request = %id, error = %format!("{:#}", e), "failed to requeue"),
            }
        }
        if !moved.is_empty() {
            info!(target: "queue", count = moved.len(), "requeued interrupted requests");
        }
        Ok(moved)
    }

    /// Result bundle directory of `id`
    pub fn bundle_dir(&self, id: &RequestId) -> PathBuf {
        self.results_dir.join(id.as_str())
    }

    pub async fn create_bundle(&self, id: &RequestId) -> Result<PathBuf> {
        let dir = self.bundle_dir(id);
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("creating result bundle {}", dir.display()))?;
        Ok(dir)
    }
}
