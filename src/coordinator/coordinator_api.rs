use crate::collab::{AgentError, PeerId};

#[derive(Debug, thiserror::Error)]
pub enum FailoverError {
    #[error("local peer {me:?} is not in the keep set {keep:?}")]
    NotInPeers { me: PeerId, keep: Vec<PeerId> },

    /// Some kept peers would not take the branch. Rollback was attempted at
    /// every non-self keep peer before returning.
    #[error("failover aborted (incompatible: {incompatible_peers:?}, failed: {failed_peers:?})")]
    Aborted {
        /// Peers that rejected the branch with a history mismatch.
        incompatible_peers: Vec<PeerId>,
        /// Peers that errored any other way (including self, when the local
        /// install failed).
        failed_peers: Vec<PeerId>,
    },

    /// The local agent could not even be consulted for metadata.
    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error("failover coordinator has stopped")]
    CoordinatorStopped,
}

#[derive(Debug, thiserror::Error)]
pub enum CancelError {
    /// Peers that neither confirmed the undo nor reported the branch as
    /// already gone.
    #[error("peers could not confirm branch removal: {0:?}")]
    FailedPeers(Vec<PeerId>),

    #[error("failover coordinator has stopped")]
    CoordinatorStopped,
}
