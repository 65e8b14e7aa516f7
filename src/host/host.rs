use crate::actor::{Callback, CommandOutcome, Event, WeakActorClient};
use crate::api::{CommandDecision, InfoDisposition, Reason, StateMachine};
use crate::collab::{
    Agent, ConsensusServer, CorrelationId, EntryValue, HistoryId, LogEntry, Metadata, Revision, Seqno, Term,
    TermEstablishment,
};
use crate::host::host_api::{
    AppliedRevisionError, CommandError, LogReadOutput, ReadKind, SyncRevisionError, SyncRevisionInput,
};
use crate::host::leadership::{Admission, Leadership};
use crate::host::pending::{InFlight, PendingClients};
use crate::host::reader;
use crate::host::revision_table::RevisionTable;
use crate::host::sync_wait::{SyncWaitKey, SyncWaitQueue};
use bytes::Bytes;
use std::sync::Arc;

pub(crate) struct RsmHostConfig<M: StateMachine> {
    pub logger: slog::Logger,
    pub name: String,
    pub machine: M,
    pub consensus: Arc<dyn ConsensusServer>,
    pub agent: Arc<dyn Agent>,
    pub actor_client: WeakActorClient<M>,
    pub revision_table: RevisionTable,
    /// From `register_rsm`: present when this node already holds a term.
    pub initial_term: Option<TermEstablishment>,
}

/// RsmHost owns one named state machine and everything needed to drive it
/// from the committed log. All state is exclusive to the actor task; handlers
/// run to completion and never await.
pub(crate) struct RsmHost<M: StateMachine> {
    logger: slog::Logger,
    name: String,
    machine: M,
    consensus: Arc<dyn ConsensusServer>,
    agent: Arc<dyn Agent>,
    actor_client: WeakActorClient<M>,
    revision_table: RevisionTable,

    /// Last entry fed to the machine.
    applied: Revision,
    /// Highest seqno scanned from the log. May exceed `applied.seqno` when
    /// trailing entries were filtered out.
    read_seqno: Seqno,
    /// Highest committed seqno this host knows about, from metadata events.
    available_seqno: Seqno,

    pending: PendingClients<M>,
    sync_waiters: SyncWaitQueue,
    reader_running: bool,
    leadership: Leadership,
    postponed: Vec<Postponed<M>>,
    next_tag: u64,
}

/// Leader-only requests that arrived during WaitForSeqno, kept in arrival
/// order for redelivery.
enum Postponed<M: StateMachine> {
    Command(M::Command, Callback<M::Reply, CommandError>),
    AppliedRevision(ReadKind, Callback<Revision, AppliedRevisionError>),
}

impl<M: StateMachine> RsmHost<M> {
    pub fn new(config: RsmHostConfig<M>) -> Self {
        let leadership = Leadership::from_registration(config.initial_term, Seqno::NONE);
        slog::info!(config.logger, "Starting host: {:?}", leadership);

        // Publish the sentinel revision up front: a running host with an
        // empty machine is distinct from no host at all.
        config.revision_table.publish(&config.name, Revision::NONE);

        RsmHost {
            logger: config.logger,
            name: config.name,
            machine: config.machine,
            consensus: config.consensus,
            agent: config.agent,
            actor_client: config.actor_client,
            revision_table: config.revision_table,
            applied: Revision::NONE,
            read_seqno: Seqno::NONE,
            available_seqno: Seqno::NONE,
            pending: PendingClients::new(),
            sync_waiters: SyncWaitQueue::new(),
            reader_running: false,
            leadership,
            postponed: Vec::new(),
            next_tag: 0,
        }
    }

    // This must NOT be async. Any long running work is spawned on another
    // task and comes back as a later event.
    pub fn handle_event(&mut self, event: Event<M>) -> Option<Reason> {
        match event {
            Event::Command(command, callback) => {
                self.handle_command(command, callback);
                None
            }
            Event::Query(query, callback) => {
                let reply = self.machine.handle_query(query, self.applied);
                callback.send(Ok(reply));
                None
            }
            Event::SyncRevision(input, callback) => {
                self.handle_sync_revision(input, callback);
                None
            }
            Event::GetAppliedRevision(kind, callback) => {
                self.handle_get_applied_revision(kind, callback);
                None
            }
            Event::Info(info) => match self.machine.handle_info(info, self.applied) {
                InfoDisposition::Continue => None,
                InfoDisposition::Stop => Some(Reason::Stopped),
            },
            Event::MetadataEvent(metadata) => {
                self.handle_metadata(metadata);
                None
            }
            Event::LogRead(output) => {
                self.handle_log_read(output);
                None
            }
            Event::ReaderFailed(error) => {
                slog::error!(self.logger, "Log reader failed: {}", error);
                Some(Reason::ReaderDied(error))
            }
            Event::CommandOutcome(tag, outcome) => {
                self.handle_command_outcome(tag, outcome);
                None
            }
            Event::QuorumOutcome(tag, result) => {
                self.handle_quorum_outcome(tag, result);
                None
            }
            Event::TermEstablished(establishment) => {
                self.handle_term_established(establishment);
                None
            }
            Event::TermFinished { history_id, term } => {
                self.handle_term_finished(history_id, term);
                None
            }
            Event::SyncWaitTimeout(key) => {
                self.sync_waiters.fire_timeout(key);
                None
            }
        }
    }

    fn handle_command(&mut self, command: M::Command, callback: Callback<M::Reply, CommandError>) {
        match self.leadership.admission() {
            Admission::Reject => callback.send(Err(CommandError::NotLeader)),
            Admission::Postpone => self.postponed.push(Postponed::Command(command, callback)),
            Admission::Serve { history_id, term } => {
                match self.machine.handle_command(&command, self.applied) {
                    CommandDecision::Reject(reply) => callback.send(Ok(reply)),
                    CommandDecision::Accept => {
                        let encoded = bincode::serialize(&command).expect("command must be bincode-serializable");
                        let tag = self.fresh_tag();
                        self.pending.park_command(tag, callback);
                        self.consensus
                            .rsm_command(tag, history_id, term, &self.name, Bytes::from(encoded));
                    }
                }
            }
        }
    }

    fn handle_get_applied_revision(&mut self, kind: ReadKind, callback: Callback<Revision, AppliedRevisionError>) {
        match self.leadership.admission() {
            Admission::Reject => callback.send(Err(AppliedRevisionError::NotLeader)),
            Admission::Postpone => self.postponed.push(Postponed::AppliedRevision(kind, callback)),
            Admission::Serve { history_id, term } => match kind {
                ReadKind::Leader => callback.send(Ok(self.applied)),
                ReadKind::Quorum => {
                    let tag = self.fresh_tag();
                    self.pending.park_quorum(tag, callback);
                    self.consensus.sync_quorum(tag, history_id, term);
                }
            },
        }
    }

    fn handle_sync_revision(&mut self, input: SyncRevisionInput, callback: Callback<(), SyncRevisionError>) {
        let requested = input.revision;
        if requested.history_id != self.applied.history_id {
            callback.send(Err(SyncRevisionError::HistoryMismatch));
        } else if requested.seqno <= self.applied.seqno {
            callback.send(Ok(()));
        } else {
            let key = SyncWaitKey {
                seqno: requested.seqno,
                tag: self.fresh_tag(),
            };
            let timer_client = self.actor_client.clone();
            self.sync_waiters
                .park(key, requested.history_id, callback, input.timeout, move |fired| {
                    timer_client.sync_wait_timeout(fired);
                });
        }
    }

    fn handle_metadata(&mut self, metadata: Metadata) {
        if metadata.committed_seqno > self.available_seqno {
            self.available_seqno = metadata.committed_seqno;
        }
        self.maybe_start_reader();
    }

    fn maybe_start_reader(&mut self) {
        if !self.reader_running && self.available_seqno > self.read_seqno {
            reader::spawn_reader(
                self.agent.clone(),
                self.name.clone(),
                self.read_seqno,
                self.available_seqno,
                self.actor_client.clone(),
            );
            self.reader_running = true;
        }
    }

    fn handle_log_read(&mut self, output: LogReadOutput) {
        self.reader_running = false;

        for entry in output.entries {
            self.apply_entry(entry);
        }
        if output.high_seqno > self.read_seqno {
            self.read_seqno = output.high_seqno;
        }

        self.revision_table.publish(&self.name, self.applied);

        // Metadata may have advanced while we were reading.
        self.maybe_start_reader();

        if self.leadership.note_applied_seqno(self.applied.seqno) {
            slog::info!(self.logger, "Leadership established: {:?}", self.leadership);
            self.redeliver_postponed();
        }
    }

    fn apply_entry(&mut self, entry: LogEntry) {
        assert!(
            entry.seqno > self.applied.seqno,
            "entries must apply in ascending seqno order: {:?} after {:?}",
            entry.seqno,
            self.applied.seqno,
        );

        match entry.value {
            EntryValue::RsmCommand { rsm_name, command } => {
                assert_eq!(rsm_name, self.name, "reader delivered a command for another RSM");
                assert_eq!(
                    entry.history_id, self.applied.history_id,
                    "command entry on a history this host never adopted",
                );

                let entry_revision = Revision::new(entry.history_id, entry.seqno);
                let command: M::Command =
                    bincode::deserialize(&command).expect("malformed command payload in committed entry");
                let reply = self.machine.apply_command(command, entry_revision, self.applied);

                self.applied.seqno = entry.seqno;
                self.dispatch_command_reply(entry.seqno, entry.term, reply);
                self.sync_waiters.release_through(self.applied);
            }
            EntryValue::ConfigEntry { .. } => {
                if entry.history_id != self.applied.history_id {
                    slog::info!(
                        self.logger,
                        "Adopting history {:?} at seqno {:?} (was {:?})",
                        entry.history_id,
                        entry.seqno,
                        self.applied.history_id,
                    );
                    self.applied = Revision::new(entry.history_id, entry.seqno);
                    self.sync_waiters.sweep_history_mismatch(entry.history_id);
                    self.sync_waiters.release_through(self.applied);
                }
            }
        }
    }

    /// A command's reply goes to its parked client only when the applying
    /// entry's term matches the term we currently lead. Under any other term
    /// the client stays parked; the term_finished sweep owns it.
    fn dispatch_command_reply(&mut self, seqno: Seqno, entry_term: Term, reply: M::Reply) {
        match self.leadership.current_term() {
            Some(term) if term == entry_term => {
                if let Some(callback) = self.pending.take_accepted(seqno) {
                    callback.send(Ok(reply));
                }
            }
            _ => {}
        }
    }

    fn handle_command_outcome(&mut self, tag: CorrelationId, outcome: CommandOutcome) {
        match outcome {
            CommandOutcome::Accepted(seqno) => {
                if !self.pending.promote_to_accepted(tag, seqno) {
                    slog::warn!(self.logger, "Accept outcome for unknown tag {:?} at {:?}", tag, seqno);
                }
            }
            CommandOutcome::Rejected(error) => match self.pending.take_in_flight(tag) {
                Some(InFlight::Command(callback)) => callback.send(Err(CommandError::Leader(error))),
                Some(InFlight::Quorum(_)) => panic!("command outcome delivered for quorum-sync tag {:?}", tag),
                None => slog::warn!(self.logger, "Reject outcome for unknown tag {:?}", tag),
            },
        }
    }

    fn handle_quorum_outcome(&mut self, tag: CorrelationId, result: Result<(), crate::collab::LeaderError>) {
        match self.pending.take_in_flight(tag) {
            Some(InFlight::Quorum(callback)) => match result {
                Ok(()) => callback.send(Ok(self.applied)),
                Err(error) => callback.send(Err(AppliedRevisionError::Leader(error))),
            },
            Some(InFlight::Command(_)) => panic!("quorum outcome delivered for command tag {:?}", tag),
            None => slog::warn!(self.logger, "Quorum outcome for unknown tag {:?}", tag),
        }
    }

    fn handle_term_established(&mut self, establishment: TermEstablishment) {
        slog::info!(
            self.logger,
            "Term established: history={:?} term={:?} wait_seqno={:?}",
            establishment.history_id,
            establishment.term,
            establishment.seqno,
        );
        self.leadership.establish(establishment, self.applied.seqno);
        if matches!(self.leadership.admission(), Admission::Serve { .. }) {
            self.redeliver_postponed();
        }
    }

    fn handle_term_finished(&mut self, history_id: HistoryId, term: Term) {
        slog::info!(self.logger, "Term finished: history={:?} term={:?}", history_id, term);
        self.leadership.finish(history_id, term);

        for callback in self.pending.sweep_accepted() {
            callback.send(Err(CommandError::LeaderLost));
        }

        // Anything postponed during WaitForSeqno is redelivered and now gets
        // the follower answer.
        self.redeliver_postponed();
    }

    fn redeliver_postponed(&mut self) {
        for request in std::mem::take(&mut self.postponed) {
            match request {
                Postponed::Command(command, callback) => self.handle_command(command, callback),
                Postponed::AppliedRevision(kind, callback) => self.handle_get_applied_revision(kind, callback),
            }
        }
    }

    fn fresh_tag(&mut self) -> CorrelationId {
        self.next_tag += 1;
        CorrelationId::new(self.next_tag)
    }

    /// Final cleanup once the event loop has decided to exit.
    pub fn shut_down(mut self, reason: Reason) {
        let (in_flight, accepted) = self.pending.drain_all();
        for entry in in_flight {
            match entry {
                InFlight::Command(callback) => callback.send(Err(CommandError::HostStopped)),
                InFlight::Quorum(callback) => callback.send(Err(AppliedRevisionError::HostStopped)),
            }
        }
        for callback in accepted {
            callback.send(Err(CommandError::HostStopped));
        }
        for callback in self.sync_waiters.drain_all() {
            callback.send(Err(SyncRevisionError::HostStopped));
        }

        self.revision_table.remove(&self.name);
        self.machine.terminate(&reason, self.applied);
    }
}
