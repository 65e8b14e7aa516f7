use crate::collab::{LeaderError, LogEntry, Revision, Seqno};
use tokio::time::Duration;

/// Which consistency a read-side operation wants.
///
/// `Leader` answers from the established leader's local applied state.
/// `Quorum` additionally confirms the leader-term still holds a quorum before
/// answering, which makes the returned revision linearizable.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ReadKind {
    Leader,
    Quorum,
}

#[derive(Debug)]
pub struct SyncRevisionInput {
    pub revision: Revision,
    /// Deadline for the host-owned wait timer. `sync_revision` parks until the
    /// revision is applied or this fires.
    pub timeout: Duration,
}

/// What a finished log-reader task hands back to the host.
#[derive(Debug)]
pub struct LogReadOutput {
    /// The committed seqno the reader scanned up to. May exceed the seqno of
    /// the last returned entry when trailing entries were filtered out.
    pub high_seqno: Seqno,
    pub entries: Vec<LogEntry>,
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("this node is not the leader")]
    NotLeader,

    #[error("leadership was lost before the command was observed to commit")]
    LeaderLost,

    #[error("leader-side failure: {0}")]
    Leader(#[from] LeaderError),

    #[error("timed out waiting for the command to commit")]
    Timeout,

    #[error("RSM host has stopped")]
    HostStopped,
}

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("timed out waiting for the query reply")]
    Timeout,

    #[error("RSM host has stopped")]
    HostStopped,
}

#[derive(Debug, thiserror::Error)]
pub enum SyncRevisionError {
    /// The requested revision's history differs from the applied history.
    /// May be spurious across a history transition: the host only tracks the
    /// history it is currently on, not the seqno ranges of past histories.
    #[error("requested revision is on a different history than the applied one")]
    HistoryMismatch,

    #[error("revision was not applied within the timeout")]
    Timeout,

    #[error("RSM host has stopped")]
    HostStopped,
}

#[derive(Debug, thiserror::Error)]
pub enum AppliedRevisionError {
    #[error("this node is not the leader")]
    NotLeader,

    #[error("leader-side failure: {0}")]
    Leader(#[from] LeaderError),

    #[error("timed out waiting for the applied revision")]
    Timeout,

    #[error("RSM host has stopped")]
    HostStopped,
}

/// Errors of the composed `sync` operation (applied-revision read followed by
/// a local catch-up to that revision).
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("this node is not the leader")]
    NotLeader,

    #[error("leader-side failure: {0}")]
    Leader(LeaderError),

    #[error("applied history changed while syncing")]
    HistoryMismatch,

    #[error("sync did not complete within the timeout")]
    Timeout,

    #[error("RSM host has stopped")]
    HostStopped,
}

impl From<AppliedRevisionError> for SyncError {
    fn from(e: AppliedRevisionError) -> Self {
        match e {
            AppliedRevisionError::NotLeader => SyncError::NotLeader,
            AppliedRevisionError::Leader(inner) => SyncError::Leader(inner),
            AppliedRevisionError::Timeout => SyncError::Timeout,
            AppliedRevisionError::HostStopped => SyncError::HostStopped,
        }
    }
}

impl From<SyncRevisionError> for SyncError {
    fn from(e: SyncRevisionError) -> Self {
        match e {
            SyncRevisionError::HistoryMismatch => SyncError::HistoryMismatch,
            SyncRevisionError::Timeout => SyncError::Timeout,
            SyncRevisionError::HostStopped => SyncError::HostStopped,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LocalRevisionError {
    #[error("no RSM with that name is running")]
    NotRunning,
}
