use crate::api::options::CoordinatorOptionsValidated;
use crate::collab::{Agent, AgentError, Branch, HistoryId, PeerId, PeerOutcomes};
use crate::coordinator::coordinator_api::{CancelError, FailoverError};
use bytes::Bytes;
use std::fmt;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

enum Request {
    Failover {
        keep_peers: Vec<PeerId>,
        opaque: Bytes,
        callback: oneshot::Sender<Result<Branch, FailoverError>>,
    },
    TryCancel {
        branch: Branch,
        callback: oneshot::Sender<Result<(), CancelError>>,
    },
}

impl Debug for Request {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Request::Failover { keep_peers, .. } => f.debug_struct("Failover").field("keep_peers", keep_peers).finish(),
            Request::TryCancel { branch, .. } => f.debug_struct("TryCancel").field("branch", branch).finish(),
        }
    }
}

/// FailoverClient is the handle for issuing failover and cancel operations.
/// The coordinator behind it handles one operation at a time; concurrent
/// callers queue in its mailbox.
#[derive(Clone)]
pub struct FailoverClient {
    sender: mpsc::Sender<Request>,
}

impl FailoverClient {
    /// Installs a fresh history branch on `keep_peers`, superseding the
    /// current history. On success the branch is durably stored at every kept
    /// peer and the consensus collaborator will begin a new term in the new
    /// history. The returned branch is the caller's ticket for `try_cancel`.
    pub async fn failover(&self, keep_peers: Vec<PeerId>, opaque: Bytes) -> Result<Branch, FailoverError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(Request::Failover {
                keep_peers,
                opaque,
                callback: tx,
            })
            .await
            .map_err(|_| FailoverError::CoordinatorStopped)?;

        rx.await.map_err(|_| FailoverError::CoordinatorStopped)?
    }

    /// Removes a previously installed branch from all its peers. Idempotent:
    /// canceling an already-canceled or superseded branch succeeds.
    pub async fn try_cancel(&self, branch: Branch) -> Result<(), CancelError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(Request::TryCancel { branch, callback: tx })
            .await
            .map_err(|_| CancelError::CoordinatorStopped)?;

        rx.await.map_err(|_| CancelError::CoordinatorStopped)?
    }
}

/// FailoverCoordinator forcibly moves consensus forward when a subset of
/// peers is gone: it durably installs a new history branch on the peers being
/// kept, in two phases (remote, then local), rolling back best-effort when a
/// phase fails.
pub(crate) struct FailoverCoordinator {
    logger: slog::Logger,
    agent: Arc<dyn Agent>,
    options: CoordinatorOptionsValidated,
    receiver: mpsc::Receiver<Request>,
}

impl FailoverCoordinator {
    pub fn new(
        logger: slog::Logger,
        agent: Arc<dyn Agent>,
        options: CoordinatorOptionsValidated,
    ) -> (Self, FailoverClient) {
        let (sender, receiver) = mpsc::channel(options.mailbox_size);
        let coordinator = FailoverCoordinator {
            logger,
            agent,
            options,
            receiver,
        };
        (coordinator, FailoverClient { sender })
    }

    pub async fn run_event_loop(mut self) {
        // One request at a time. Unlike the host actor, handlers here await
        // their RPCs directly; the mailbox is the serialization point.
        while let Some(request) = self.receiver.recv().await {
            slog::debug!(self.logger, "Received: {:?}", request);
            match request {
                Request::Failover {
                    keep_peers,
                    opaque,
                    callback,
                } => {
                    let result = self.handle_failover(keep_peers, opaque).await;
                    let _ = callback.send(result);
                }
                Request::TryCancel { branch, callback } => {
                    let result = self.handle_try_cancel(branch).await;
                    let _ = callback.send(result);
                }
            }
        }
    }

    async fn handle_failover(&self, keep_peers: Vec<PeerId>, opaque: Bytes) -> Result<Branch, FailoverError> {
        let metadata = self.agent.get_metadata().await?;
        let me = metadata.peer;
        if !keep_peers.contains(&me) {
            return Err(FailoverError::NotInPeers { me, keep: keep_peers });
        }

        let branch = Branch {
            history_id: HistoryId::fresh(),
            old_history_id: metadata.history_id,
            coordinator: me.clone(),
            peers: keep_peers.clone(),
            opaque,
        };
        let followers: Vec<PeerId> = keep_peers.into_iter().filter(|peer| *peer != me).collect();

        slog::info!(
            self.logger,
            "Failover: installing branch {:?} (supersedes {:?}) on {:?}",
            branch.history_id,
            branch.old_history_id,
            branch.peers,
        );

        // Phase A: install at every follower.
        let outcomes = self
            .agent
            .store_branch(&followers, &branch, self.options.store_branch_timeout)
            .await;
        if !outcomes.all_ok() {
            let (incompatible_peers, failed_peers) = classify_store_errors(outcomes);
            slog::warn!(
                self.logger,
                "Failover rejected (incompatible: {:?}, failed: {:?}); rolling back",
                incompatible_peers,
                failed_peers,
            );
            self.undo_best_effort(&followers, branch.history_id, self.options.cleanup_branch_timeout)
                .await;
            return Err(FailoverError::Aborted {
                incompatible_peers,
                failed_peers,
            });
        }

        // Phase B: install locally. Only now is the branch authoritative.
        if let Err(error) = self
            .agent
            .local_store_branch(&branch, self.options.store_branch_timeout)
            .await
        {
            slog::warn!(self.logger, "Local branch install failed: {}; rolling back", error);
            self.undo_best_effort(&followers, branch.history_id, self.options.cleanup_branch_timeout)
                .await;
            return Err(FailoverError::Aborted {
                incompatible_peers: Vec::new(),
                failed_peers: vec![me],
            });
        }

        slog::info!(self.logger, "Failover complete: branch {:?} installed", branch.history_id);
        Ok(branch)
    }

    async fn handle_try_cancel(&self, branch: Branch) -> Result<(), CancelError> {
        slog::info!(
            self.logger,
            "Canceling branch {:?} at {:?}",
            branch.history_id,
            branch.peers,
        );

        let outcomes = self
            .agent
            .undo_branch(&branch.peers, branch.history_id, self.options.cancel_branch_timeout)
            .await;

        let mut failed_peers: Vec<PeerId> = outcomes
            .errors
            .into_iter()
            .filter(|(_, error)| !undo_error_is_success(error))
            .map(|(peer, _)| peer)
            .collect();

        if failed_peers.is_empty() {
            Ok(())
        } else {
            failed_peers.sort();
            Err(CancelError::FailedPeers(failed_peers))
        }
    }

    async fn undo_best_effort(&self, peers: &[PeerId], history_id: HistoryId, timeout: tokio::time::Duration) {
        let outcomes = self.agent.undo_branch(peers, history_id, timeout).await;
        // Rollback is best-effort; the authoritative result is the phase that
        // failed. Log and move on.
        for (peer, error) in outcomes.errors {
            slog::warn!(self.logger, "Rollback of {:?} at {:?} failed: {}", history_id, peer, error);
        }
    }
}

fn classify_store_errors(outcomes: PeerOutcomes) -> (Vec<PeerId>, Vec<PeerId>) {
    let mut incompatible_peers = Vec::new();
    let mut failed_peers = Vec::new();
    for (peer, error) in outcomes.errors {
        match error {
            AgentError::HistoryMismatch => incompatible_peers.push(peer),
            _ => failed_peers.push(peer),
        }
    }
    incompatible_peers.sort();
    failed_peers.sort();
    (incompatible_peers, failed_peers)
}

/// The branch being already gone or superseded is what cancel wanted anyway.
fn undo_error_is_success(error: &AgentError) -> bool {
    matches!(error, AgentError::NoBranch | AgentError::BadBranch(_))
}
