use crate::actor::Callback;
use crate::api::StateMachine;
use crate::collab::{CorrelationId, Revision, Seqno};
use crate::host::host_api::{AppliedRevisionError, CommandError};
use std::collections::HashMap;

/// PendingClients parks clients whose replies depend on a later event: a
/// consensus outcome for the request's tag, the apply of the entry a command
/// was accepted at, or a term ending. Parked replies are pure data; no task
/// blocks on them.
pub(crate) struct PendingClients<M: StateMachine> {
    in_flight: HashMap<CorrelationId, InFlight<M>>,
    accepted: HashMap<Seqno, Callback<M::Reply, CommandError>>,
}

pub(crate) enum InFlight<M: StateMachine> {
    Command(Callback<M::Reply, CommandError>),
    Quorum(Callback<Revision, AppliedRevisionError>),
}

impl<M: StateMachine> PendingClients<M> {
    pub fn new() -> Self {
        PendingClients {
            in_flight: HashMap::new(),
            accepted: HashMap::new(),
        }
    }

    pub fn park_command(&mut self, tag: CorrelationId, callback: Callback<M::Reply, CommandError>) {
        let previous = self.in_flight.insert(tag, InFlight::Command(callback));
        assert!(previous.is_none(), "duplicate pending registration for {:?}", tag);
    }

    pub fn park_quorum(&mut self, tag: CorrelationId, callback: Callback<Revision, AppliedRevisionError>) {
        let previous = self.in_flight.insert(tag, InFlight::Quorum(callback));
        assert!(previous.is_none(), "duplicate pending registration for {:?}", tag);
    }

    /// Takes the in-flight registration for a delivered outcome. None means
    /// the registration was already swept (e.g. term ended first); the
    /// outcome is stale and the caller drops it.
    pub fn take_in_flight(&mut self, tag: CorrelationId) -> Option<InFlight<M>> {
        self.in_flight.remove(&tag)
    }

    /// Moves a command registration from its tag to the seqno consensus
    /// accepted it at. The client stays parked until that entry applies.
    pub fn promote_to_accepted(&mut self, tag: CorrelationId, seqno: Seqno) -> bool {
        match self.in_flight.remove(&tag) {
            Some(InFlight::Command(callback)) => {
                let previous = self.accepted.insert(seqno, callback);
                assert!(previous.is_none(), "two commands accepted at {:?}", seqno);
                true
            }
            Some(InFlight::Quorum(_)) => {
                panic!("consensus accepted a command under a quorum-sync tag {:?}", tag)
            }
            None => false,
        }
    }

    pub fn take_accepted(&mut self, seqno: Seqno) -> Option<Callback<M::Reply, CommandError>> {
        self.accepted.remove(&seqno)
    }

    /// Term over: every accepted-but-unobserved command gets swept. The
    /// still-in-flight registrations stay; the consensus server owes each of
    /// them a terminal outcome.
    pub fn sweep_accepted(&mut self) -> Vec<Callback<M::Reply, CommandError>> {
        self.accepted.drain().map(|(_, callback)| callback).collect()
    }

    /// Host going away: everything parked gets drained.
    pub fn drain_all(&mut self) -> (Vec<InFlight<M>>, Vec<Callback<M::Reply, CommandError>>) {
        let in_flight = self.in_flight.drain().map(|(_, entry)| entry).collect();
        let accepted = self.accepted.drain().map(|(_, callback)| callback).collect();
        (in_flight, accepted)
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.in_flight.is_empty() && self.accepted.is_empty()
    }
}
