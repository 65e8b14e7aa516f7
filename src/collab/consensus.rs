use crate::collab::types::{CorrelationId, HistoryId, Seqno, Term};
use bytes::Bytes;

/// ConsensusServer is the leader-election and replication collaborator. The
/// RSM host registers itself at startup and then issues fire-and-forget
/// requests correlated by tags; the server answers through the registered
/// [`ConsensusSink`] whenever it has an outcome or a term transition to
/// report.
pub trait ConsensusServer: Send + Sync + 'static {
    /// Registers a named RSM. If this node currently holds an established or
    /// establishing term, it is returned so the host can start out as leader.
    fn register_rsm(&self, name: &str, sink: Box<dyn ConsensusSink>) -> Option<TermEstablishment>;

    /// Submits a command for replication under `(history_id, term)`. The
    /// outcome arrives later as `command_accepted` or `command_rejected` with
    /// the same tag.
    fn rsm_command(&self, tag: CorrelationId, history_id: HistoryId, term: Term, name: &str, command: Bytes);

    /// Asks the server to confirm that `(history_id, term)` still holds a
    /// quorum. The outcome arrives later as `quorum_ok` or `quorum_failed`
    /// with the same tag.
    fn sync_quorum(&self, tag: CorrelationId, history_id: HistoryId, term: Term);
}

/// ConsensusSink is how the consensus server talks back to a registered RSM
/// host. Deliveries are enqueued into the host's mailbox; they must never
/// block, so every method is synchronous fire-and-forget.
pub trait ConsensusSink: Send + Sync + 'static {
    fn command_accepted(&self, tag: CorrelationId, seqno: Seqno);
    fn command_rejected(&self, tag: CorrelationId, error: LeaderError);
    fn quorum_ok(&self, tag: CorrelationId);
    fn quorum_failed(&self, tag: CorrelationId, error: LeaderError);
    fn term_established(&self, establishment: TermEstablishment);
    fn term_finished(&self, history_id: HistoryId, term: Term);
}

/// A term this node holds (or is establishing). `seqno` is the position the
/// local RSM must have applied before the leader may serve; until then the
/// host stays in `WaitForSeqno`.
#[derive(Copy, Clone, Debug)]
pub struct TermEstablishment {
    pub history_id: HistoryId,
    pub term: Term,
    pub seqno: Seqno,
}

/// Opaque leader-side failure reported by the consensus server. The host
/// never interprets it; it is propagated to the waiting client as-is.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct LeaderError(pub String);
