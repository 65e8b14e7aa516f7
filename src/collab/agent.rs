use crate::collab::types::{Branch, HistoryId, LogEntry, Metadata, PeerId};
use std::collections::{HashMap, HashSet};
use tokio::time::Duration;

/// Agent is the node-local durability collaborator: it owns the on-disk log,
/// the node's consensus metadata, and branch storage on this node and its
/// peers. This crate only consumes the interface; the wire protocol and disk
/// format live with the implementation.
#[async_trait::async_trait]
pub trait Agent: Send + Sync + 'static {
    async fn get_metadata(&self) -> Result<Metadata, AgentError>;

    /// Returns the committed log. Callers filter; the agent does not know
    /// which entries a given RSM cares about.
    async fn get_log(&self) -> Result<Vec<LogEntry>, AgentError>;

    /// Stores `branch` durably at each of `peers`. Best-effort per peer; the
    /// timeout bounds each peer RPC, not the whole call.
    async fn store_branch(&self, peers: &[PeerId], branch: &Branch, timeout: Duration) -> PeerOutcomes;

    /// Stores `branch` durably on this node.
    async fn local_store_branch(&self, branch: &Branch, timeout: Duration) -> Result<(), AgentError>;

    /// Removes the branch for `history_id` at each of `peers`. Idempotent from
    /// the caller's view: `NoBranch` and `BadBranch` mean the branch is
    /// already gone or superseded.
    async fn undo_branch(&self, peers: &[PeerId], history_id: HistoryId, timeout: Duration) -> PeerOutcomes;
}

/// Per-peer results of a multi-peer branch operation.
#[derive(Debug, Default)]
pub struct PeerOutcomes {
    pub ok: HashSet<PeerId>,
    pub errors: HashMap<PeerId, AgentError>,
}

impl PeerOutcomes {
    pub fn all_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum AgentError {
    #[error("branch history does not match the peer's current history")]
    HistoryMismatch,

    #[error("no branch installed for that history")]
    NoBranch,

    #[error("a different branch is installed: {0}")]
    BadBranch(String),

    #[error("peer did not respond within the timeout")]
    Timeout,

    #[error("agent failure: {0}")]
    Failed(String),
}
