use crate::collab::agent::{Agent, AgentError, PeerOutcomes};
use crate::collab::types::{Branch, HistoryId, LogEntry, Metadata, PeerId, Seqno};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::time::Duration;

// Like the consensus server it pairs with, a production agent talks to disk
// and to remote peers. This one theoretically models both in memory: peers
// succeed unless a failure has been scripted for them. Good enough for local
// runs and for exercising the host and coordinator.
pub struct InMemoryAgent {
    state: Mutex<AgentState>,
}

struct AgentState {
    metadata: Metadata,
    log: Vec<LogEntry>,

    // Branches installed per peer (self included), keyed by history.
    branches: HashMap<PeerId, HashMap<HistoryId, Branch>>,

    store_branch_failures: HashMap<PeerId, AgentError>,
    undo_branch_failures: HashMap<PeerId, AgentError>,
    local_store_branch_failure: Option<AgentError>,

    // Every undo_branch call, for callers that assert rollback happened.
    undo_calls: Vec<(Vec<PeerId>, HistoryId)>,
}

impl InMemoryAgent {
    pub fn new(metadata: Metadata) -> Self {
        InMemoryAgent {
            state: Mutex::new(AgentState {
                metadata,
                log: Vec::new(),
                branches: HashMap::new(),
                store_branch_failures: HashMap::new(),
                undo_branch_failures: HashMap::new(),
                local_store_branch_failure: None,
                undo_calls: Vec::new(),
            }),
        }
    }

    /// Appends a committed entry. The caller is responsible for seqno order,
    /// same as the real log.
    pub fn append_entry(&self, entry: LogEntry) {
        let mut state = self.lock();
        if let Some(last) = state.log.last() {
            assert!(
                entry.seqno > last.seqno,
                "log must be appended in seqno order: {:?} after {:?}",
                entry.seqno,
                last.seqno,
            );
        }
        state.log.push(entry);
    }

    /// Advances the committed seqno and returns the fresh metadata record,
    /// ready to be published on a metadata bus.
    pub fn set_committed_seqno(&self, committed_seqno: Seqno) -> Metadata {
        let mut state = self.lock();
        state.metadata.committed_seqno = committed_seqno;
        state.metadata.clone()
    }

    pub fn fail_store_branch(&self, peer: PeerId, error: AgentError) {
        self.lock().store_branch_failures.insert(peer, error);
    }

    pub fn fail_undo_branch(&self, peer: PeerId, error: AgentError) {
        self.lock().undo_branch_failures.insert(peer, error);
    }

    pub fn fail_local_store_branch(&self, error: AgentError) {
        self.lock().local_store_branch_failure = Some(error);
    }

    /// Every `undo_branch` call so far, in call order.
    pub fn undo_calls(&self) -> Vec<(Vec<PeerId>, HistoryId)> {
        self.lock().undo_calls.clone()
    }

    /// Peers currently holding a branch for `history_id`.
    pub fn peers_holding_branch(&self, history_id: HistoryId) -> Vec<PeerId> {
        let state = self.lock();
        let mut peers: Vec<PeerId> = state
            .branches
            .iter()
            .filter(|(_, by_history)| by_history.contains_key(&history_id))
            .map(|(peer, _)| peer.clone())
            .collect();
        peers.sort();
        peers
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, AgentState> {
        self.state.lock().expect("InMemoryAgent mutex guard poison")
    }
}

#[async_trait::async_trait]
impl Agent for InMemoryAgent {
    async fn get_metadata(&self) -> Result<Metadata, AgentError> {
        Ok(self.lock().metadata.clone())
    }

    async fn get_log(&self) -> Result<Vec<LogEntry>, AgentError> {
        Ok(self.lock().log.clone())
    }

    async fn store_branch(&self, peers: &[PeerId], branch: &Branch, _timeout: Duration) -> PeerOutcomes {
        let mut state = self.lock();
        let mut outcomes = PeerOutcomes::default();
        for peer in peers {
            match state.store_branch_failures.get(peer) {
                Some(error) => {
                    outcomes.errors.insert(peer.clone(), error.clone());
                }
                None => {
                    state
                        .branches
                        .entry(peer.clone())
                        .or_default()
                        .insert(branch.history_id, branch.clone());
                    outcomes.ok.insert(peer.clone());
                }
            }
        }
        outcomes
    }

    async fn local_store_branch(&self, branch: &Branch, _timeout: Duration) -> Result<(), AgentError> {
        let mut state = self.lock();
        if let Some(error) = state.local_store_branch_failure.clone() {
            return Err(error);
        }

        let me = state.metadata.peer.clone();
        state
            .branches
            .entry(me)
            .or_default()
            .insert(branch.history_id, branch.clone());
        Ok(())
    }

    async fn undo_branch(&self, peers: &[PeerId], history_id: HistoryId, _timeout: Duration) -> PeerOutcomes {
        let mut state = self.lock();
        state.undo_calls.push((peers.to_vec(), history_id));

        let mut outcomes = PeerOutcomes::default();
        for peer in peers {
            if let Some(error) = state.undo_branch_failures.get(peer) {
                outcomes.errors.insert(peer.clone(), error.clone());
                continue;
            }

            let removed = state
                .branches
                .get_mut(peer)
                .and_then(|by_history| by_history.remove(&history_id));
            match removed {
                Some(_) => {
                    outcomes.ok.insert(peer.clone());
                }
                None => {
                    outcomes.errors.insert(peer.clone(), AgentError::NoBranch);
                }
            }
        }
        outcomes
    }
}
