use crate::collab::{AgentError, Revision};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

/// StateMachine is the application-specific, deterministic view of applying
/// the replicated log in sequentially consistent order. One instance is owned
/// by one RSM host; the host is the only caller, so no method call ever
/// overlaps another.
///
/// Commands cross the log boundary and therefore must be serializable; the
/// host encodes them with bincode on submission and decodes them back when the
/// committed entry is applied.
pub trait StateMachine: Send + 'static {
    type Command: Serialize + DeserializeOwned + Debug + Send + 'static;
    type Reply: Debug + Send + 'static;
    type Query: Debug + Send + 'static;
    type QueryReply: Debug + Send + 'static;
    type Info: Debug + Send + 'static;

    /// Called on the leader before a command is submitted to consensus.
    /// `Accept` means "durably replicate this command"; `Reject` short-circuits
    /// with a reply and nothing is written to the log.
    fn handle_command(&mut self, command: &Self::Command, applied: Revision) -> CommandDecision<Self::Reply>;

    /// Called exactly once per committed command entry, in seqno order.
    /// `entry` is the revision the command was committed at; `applied` is the
    /// machine's revision before this entry. The reply is delivered to the
    /// waiting client if this node still leads the term the command was
    /// accepted in.
    fn apply_command(&mut self, command: Self::Command, entry: Revision, applied: Revision) -> Self::Reply;

    /// Serves a local read against current machine state. Called on leaders
    /// and followers alike; consistency is the caller's business (see
    /// `sync`/`sync_revision`).
    fn handle_query(&mut self, query: Self::Query, applied: Revision) -> Self::QueryReply;

    /// Out-of-band message forwarded by the host. Returning `Stop` shuts the
    /// host down cleanly.
    fn handle_info(&mut self, _info: Self::Info, _applied: Revision) -> InfoDisposition {
        InfoDisposition::Continue
    }

    /// Called once when the host stops, whatever the reason.
    fn terminate(&mut self, _reason: &Reason, _applied: Revision) {}
}

#[derive(Debug)]
pub enum CommandDecision<R> {
    Accept,
    Reject(R),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum InfoDisposition {
    Continue,
    Stop,
}

/// Why an RSM host stopped.
#[derive(Debug)]
pub enum Reason {
    /// Every client handle was dropped.
    Shutdown,

    /// The state machine returned [`InfoDisposition::Stop`].
    Stopped,

    /// The log reader failed. The host cannot make progress without the log,
    /// so this is fatal; a supervisor may recreate the host.
    ReaderDied(AgentError),
}
