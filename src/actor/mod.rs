use crate::api::StateMachine;
use crate::collab::{
    AgentError, ConsensusSink, CorrelationId, HistoryId, LeaderError, Metadata, Revision, Seqno, Term,
    TermEstablishment,
};
use crate::host::{
    AppliedRevisionError, CommandError, LogReadOutput, QueryError, ReadKind, RsmHost, SyncRevisionError,
    SyncRevisionInput, SyncWaitKey,
};
use std::error::Error;
use std::fmt;
use std::fmt::{Debug, Formatter};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Duration;

/// Everything the RSM host actor can receive. The comments describe handling
/// per leadership state.
pub(crate) enum Event<M: StateMachine> {
    // Follower: reply NotLeader.
    // Leader/WaitForSeqno: postpone until Established.
    // Leader/Established: handle_command, then submit to consensus and park the client.
    Command(M::Command, Callback<M::Reply, CommandError>),

    // Any state: serve from local machine state.
    Query(M::Query, Callback<M::QueryReply, QueryError>),

    // Any state: reply now if applied covers it, park with a timer otherwise.
    SyncRevision(SyncRevisionInput, Callback<(), SyncRevisionError>),

    // Follower: reply NotLeader.
    // Leader/WaitForSeqno: postpone until Established.
    // Leader/Established: reply locally (Leader kind) or round-trip a quorum sync (Quorum kind).
    GetAppliedRevision(ReadKind, Callback<Revision, AppliedRevisionError>),

    // Any state: forward to the machine's handle_info.
    Info(M::Info),

    // Any state: adopt the new committed seqno, maybe start a reader.
    MetadataEvent(Metadata),

    // Any state: apply the delivered entries in order.
    LogRead(LogReadOutput),

    // Any state: fatal. The host terminates with ReaderDied.
    ReaderFailed(AgentError),

    // Leader: resolve the parked command for this tag.
    // Follower: the registration was already swept; resolve or drop.
    CommandOutcome(CorrelationId, CommandOutcome),

    // Leader: resolve the parked quorum read for this tag.
    QuorumOutcome(CorrelationId, Result<(), LeaderError>),

    // Follower only: become leader (possibly waiting for a seqno first).
    TermEstablished(TermEstablishment),

    // Leader only: sweep accepted commands with LeaderLost, become follower.
    TermFinished { history_id: HistoryId, term: Term },

    // Any state: time out the sync-revision waiter with this key, if it is
    // still parked. A racing fire after release is drained silently.
    SyncWaitTimeout(SyncWaitKey),
}

#[derive(Debug)]
pub(crate) enum CommandOutcome {
    Accepted(Seqno),
    Rejected(LeaderError),
}

// Hand-written: derived Debug would demand Debug on the machine type itself.
impl<M: StateMachine> Debug for Event<M> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Event::Command(command, _) => f.debug_tuple("Command").field(command).finish(),
            Event::Query(query, _) => f.debug_tuple("Query").field(query).finish(),
            Event::SyncRevision(input, _) => f.debug_tuple("SyncRevision").field(input).finish(),
            Event::GetAppliedRevision(kind, _) => f.debug_tuple("GetAppliedRevision").field(kind).finish(),
            Event::Info(info) => f.debug_tuple("Info").field(info).finish(),
            Event::MetadataEvent(metadata) => f.debug_tuple("MetadataEvent").field(metadata).finish(),
            Event::LogRead(output) => f.debug_tuple("LogRead").field(output).finish(),
            Event::ReaderFailed(error) => f.debug_tuple("ReaderFailed").field(error).finish(),
            Event::CommandOutcome(tag, outcome) => f.debug_tuple("CommandOutcome").field(tag).field(outcome).finish(),
            Event::QuorumOutcome(tag, result) => f.debug_tuple("QuorumOutcome").field(tag).field(result).finish(),
            Event::TermEstablished(establishment) => f.debug_tuple("TermEstablished").field(establishment).finish(),
            Event::TermFinished { history_id, term } => f
                .debug_struct("TermFinished")
                .field("history_id", history_id)
                .field("term", term)
                .finish(),
            Event::SyncWaitTimeout(key) => f.debug_tuple("SyncWaitTimeout").field(key).finish(),
        }
    }
}

pub(crate) struct Callback<O: Debug, E: Error>(oneshot::Sender<Result<O, E>>);

impl<O: Debug, E: Error> Debug for Callback<O, E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback").finish()
    }
}

impl<O: Debug, E: Error> Callback<O, E> {
    #[cfg(test)]
    pub fn from_sender(sender: oneshot::Sender<Result<O, E>>) -> Self {
        Callback(sender)
    }

    pub fn send(self, message: Result<O, E>) {
        // The caller may have timed out and dropped its receiver. Fine.
        let _ = self.0.send(message);
    }
}

/// ActorClient is the strong handle to a host mailbox. The host shuts down
/// (Reason::Shutdown) once every strong handle is dropped; internal tasks use
/// [`WeakActorClient`] so they never keep the host alive on their own.
pub(crate) struct ActorClient<M: StateMachine> {
    sender: mpsc::UnboundedSender<Event<M>>,
}

// Derived Clone would require M: Clone.
impl<M: StateMachine> Clone for ActorClient<M> {
    fn clone(&self) -> Self {
        ActorClient {
            sender: self.sender.clone(),
        }
    }
}

impl<M: StateMachine> ActorClient<M> {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Event<M>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ActorClient { sender: tx }, rx)
    }

    pub fn weak(&self) -> WeakActorClient<M> {
        WeakActorClient {
            sender: self.sender.downgrade(),
        }
    }

    pub async fn command(&self, command: M::Command) -> Result<M::Reply, CommandError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(Event::Command(command, Callback(tx)))
            .map_err(|_| CommandError::HostStopped)?;

        rx.await.map_err(|_| CommandError::HostStopped)?
    }

    pub async fn query(&self, query: M::Query) -> Result<M::QueryReply, QueryError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(Event::Query(query, Callback(tx)))
            .map_err(|_| QueryError::HostStopped)?;

        rx.await.map_err(|_| QueryError::HostStopped)?
    }

    pub async fn sync_revision(&self, revision: Revision, timeout: Duration) -> Result<(), SyncRevisionError> {
        let (tx, rx) = oneshot::channel();
        let input = SyncRevisionInput { revision, timeout };
        self.sender
            .send(Event::SyncRevision(input, Callback(tx)))
            .map_err(|_| SyncRevisionError::HostStopped)?;

        rx.await.map_err(|_| SyncRevisionError::HostStopped)?
    }

    pub async fn get_applied_revision(&self, kind: ReadKind) -> Result<Revision, AppliedRevisionError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(Event::GetAppliedRevision(kind, Callback(tx)))
            .map_err(|_| AppliedRevisionError::HostStopped)?;

        rx.await.map_err(|_| AppliedRevisionError::HostStopped)?
    }

    pub fn deliver_info(&self, info: M::Info) {
        let _ = self.sender.send(Event::Info(info));
    }
}

/// WeakActorClient is held by spawned tasks (reader, timers, metadata
/// forwarder) and by the consensus server as its delivery sink. Sends are
/// fire-and-forget; a send to a stopped host is dropped on the floor.
pub(crate) struct WeakActorClient<M: StateMachine> {
    sender: mpsc::WeakUnboundedSender<Event<M>>,
}

impl<M: StateMachine> Clone for WeakActorClient<M> {
    fn clone(&self) -> Self {
        WeakActorClient {
            sender: self.sender.clone(),
        }
    }
}

impl<M: StateMachine> WeakActorClient<M> {
    /// Returns false once the host is gone, so loops holding this handle can
    /// exit.
    pub fn metadata_event(&self, metadata: Metadata) -> bool {
        self.send(Event::MetadataEvent(metadata))
    }

    pub fn log_read(&self, output: LogReadOutput) {
        self.send(Event::LogRead(output));
    }

    pub fn reader_failed(&self, error: AgentError) {
        self.send(Event::ReaderFailed(error));
    }

    pub fn sync_wait_timeout(&self, key: SyncWaitKey) {
        self.send(Event::SyncWaitTimeout(key));
    }

    fn send(&self, event: Event<M>) -> bool {
        match self.sender.upgrade() {
            Some(sender) => sender.send(event).is_ok(),
            None => false,
        }
    }
}

impl<M: StateMachine> ConsensusSink for WeakActorClient<M> {
    fn command_accepted(&self, tag: CorrelationId, seqno: Seqno) {
        self.send(Event::CommandOutcome(tag, CommandOutcome::Accepted(seqno)));
    }

    fn command_rejected(&self, tag: CorrelationId, error: LeaderError) {
        self.send(Event::CommandOutcome(tag, CommandOutcome::Rejected(error)));
    }

    fn quorum_ok(&self, tag: CorrelationId) {
        self.send(Event::QuorumOutcome(tag, Ok(())));
    }

    fn quorum_failed(&self, tag: CorrelationId, error: LeaderError) {
        self.send(Event::QuorumOutcome(tag, Err(error)));
    }

    fn term_established(&self, establishment: TermEstablishment) {
        self.send(Event::TermEstablished(establishment));
    }

    fn term_finished(&self, history_id: HistoryId, term: Term) {
        self.send(Event::TermFinished { history_id, term });
    }
}

/// HostActor is the RSM host logic in actor model.
pub(crate) struct HostActor<M: StateMachine> {
    logger: slog::Logger,
    receiver: mpsc::UnboundedReceiver<Event<M>>,
    host: RsmHost<M>,
}

impl<M: StateMachine> HostActor<M> {
    pub fn new(logger: slog::Logger, receiver: mpsc::UnboundedReceiver<Event<M>>, host: RsmHost<M>) -> Self {
        HostActor { logger, receiver, host }
    }

    pub async fn run_event_loop(mut self) {
        let reason = loop {
            match self.receiver.recv().await {
                Some(event) => {
                    slog::trace!(self.logger, "Received: {:?}", event);
                    if let Some(reason) = self.host.handle_event(event) {
                        break reason;
                    }
                }
                None => break crate::api::Reason::Shutdown,
            }
        };

        slog::info!(self.logger, "Host event loop exiting: {:?}", reason);
        self.host.shut_down(reason);
    }
}
