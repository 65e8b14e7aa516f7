use bytes::Bytes;
use std::fmt;
use uuid::Uuid;

/// HistoryId identifies an epoch of consensus. A new history begins when a
/// failover branch is installed or a comparable reconfiguration occurs.
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct HistoryId(Uuid);

impl HistoryId {
    /// Sentinel for "no history yet". Real histories are random UUIDs, so the
    /// nil UUID never collides with one.
    pub const NONE: HistoryId = HistoryId(Uuid::nil());

    pub fn new(id: Uuid) -> Self {
        HistoryId(id)
    }

    pub fn fresh() -> Self {
        HistoryId(Uuid::new_v4())
    }

    pub fn into_inner(self) -> Uuid {
        self.0
    }
}

impl fmt::Debug for HistoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Seqno is a monotonic log position within a history. Real seqnos start at 1;
/// 0 is the "nothing applied yet" sentinel.
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Seqno(u64);

impl Seqno {
    pub const NONE: Seqno = Seqno(0);

    pub fn new(seqno: u64) -> Self {
        Seqno(seqno)
    }

    pub fn val(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for Seqno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Term is a leader election epoch within a history.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub struct Term(u64);

impl Term {
    pub fn new(term: u64) -> Self {
        Term(term)
    }

    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Revision is the position of a state machine in the committed log: the
/// history it is on and the last seqno it absorbed.
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct Revision {
    pub history_id: HistoryId,
    pub seqno: Seqno,
}

impl Revision {
    pub const NONE: Revision = Revision {
        history_id: HistoryId::NONE,
        seqno: Seqno::NONE,
    };

    pub fn new(history_id: HistoryId, seqno: Seqno) -> Self {
        Revision { history_id, seqno }
    }
}

impl fmt::Debug for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:?}, {:?})", self.history_id, self.seqno)
    }
}

/// PeerId is the ID of a node participating in the consensus cluster.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(peer_id: impl Into<String>) -> Self {
        PeerId(peer_id.into())
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// CorrelationId is an opaque token matching a fire-and-forget request with
/// the outcome that is later delivered to the issuing actor's mailbox.
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct CorrelationId(u64);

impl CorrelationId {
    pub fn new(tag: u64) -> Self {
        CorrelationId(tag)
    }
}

impl fmt::Debug for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A single entry of the shared committed log, as handed out by the agent.
#[derive(Clone, Debug)]
pub struct LogEntry {
    pub seqno: Seqno,
    pub term: Term,
    pub history_id: HistoryId,
    pub value: EntryValue,
}

#[derive(Clone, Debug)]
pub enum EntryValue {
    /// A command targeted at a specific named RSM. The payload is the encoded
    /// form of that machine's command type.
    RsmCommand { rsm_name: String, command: Bytes },

    /// A membership/history boundary. The only entry kind permitted to change
    /// `history_id` relative to the previous entry.
    ConfigEntry { config: Bytes },
}

/// Branch declares an intent to begin a new history at a chosen set of peers,
/// superseding `old_history_id`. Durably stored at each kept peer.
#[derive(Clone, Debug)]
pub struct Branch {
    pub history_id: HistoryId,
    pub old_history_id: HistoryId,
    pub coordinator: PeerId,
    pub peers: Vec<PeerId>,
    pub opaque: Bytes,
}

/// Metadata is the agent's snapshot of this node's consensus state.
#[derive(Clone, Debug)]
pub struct Metadata {
    pub peer: PeerId,
    pub history_id: HistoryId,
    pub committed_seqno: Seqno,
}
