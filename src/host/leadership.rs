use crate::collab::{HistoryId, Seqno, Term, TermEstablishment};
use std::fmt;

/// Leadership is the host's view of whether this node leads the consensus
/// term for its history, and whether the local applied state has caught up
/// far enough to serve.
pub(crate) struct Leadership {
    state: State,
}

enum State {
    Follower,
    Leader {
        history_id: HistoryId,
        term: Term,
        status: LeaderStatus,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum LeaderStatus {
    /// The term was established at this seqno; commands and applied-revision
    /// reads are postponed until the host has applied up to it.
    WaitForSeqno(Seqno),
    Established,
}

/// What the host may do with a leader-only request right now.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum Admission {
    /// Established leader: handle it.
    Serve { history_id: HistoryId, term: Term },
    /// Leader waiting for its seqno: park and redeliver when established.
    Postpone,
    /// Not the leader.
    Reject,
}

impl Leadership {
    pub fn new_follower() -> Self {
        Leadership { state: State::Follower }
    }

    /// Initial state from registration: hosts created on a leading node start
    /// out in the middle of that node's term.
    pub fn from_registration(establishment: Option<TermEstablishment>, applied_seqno: Seqno) -> Self {
        let mut leadership = Leadership::new_follower();
        if let Some(establishment) = establishment {
            leadership.establish(establishment, applied_seqno);
        }
        leadership
    }

    pub fn admission(&self) -> Admission {
        match &self.state {
            State::Follower => Admission::Reject,
            State::Leader {
                status: LeaderStatus::WaitForSeqno(_),
                ..
            } => Admission::Postpone,
            State::Leader {
                history_id,
                term,
                status: LeaderStatus::Established,
            } => Admission::Serve {
                history_id: *history_id,
                term: *term,
            },
        }
    }

    /// The term this node leads, established or not.
    pub fn current_term(&self) -> Option<Term> {
        match &self.state {
            State::Follower => None,
            State::Leader { term, .. } => Some(*term),
        }
    }

    pub fn establish(&mut self, establishment: TermEstablishment, applied_seqno: Seqno) {
        assert!(
            matches!(self.state, State::Follower),
            "term_established while already leading term {:?}",
            self.current_term(),
        );

        let status = if applied_seqno >= establishment.seqno {
            LeaderStatus::Established
        } else {
            LeaderStatus::WaitForSeqno(establishment.seqno)
        };
        self.state = State::Leader {
            history_id: establishment.history_id,
            term: establishment.term,
            status,
        };
    }

    /// Transitions WaitForSeqno → Established once applied state has caught
    /// up. Returns true when the transition happened on this call.
    pub fn note_applied_seqno(&mut self, applied_seqno: Seqno) -> bool {
        if let State::Leader { status, .. } = &mut self.state {
            if let LeaderStatus::WaitForSeqno(wanted) = *status {
                if applied_seqno >= wanted {
                    *status = LeaderStatus::Established;
                    return true;
                }
            }
        }
        false
    }

    pub fn finish(&mut self, history_id: HistoryId, term: Term) {
        match &self.state {
            State::Leader {
                history_id: current_history,
                term: current_term,
                ..
            } => {
                assert_eq!(
                    (*current_history, *current_term),
                    (history_id, term),
                    "term_finished for a term this host does not lead",
                );
            }
            State::Follower => panic!("term_finished while follower"),
        }

        self.state = State::Follower;
    }
}

impl fmt::Debug for Leadership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            State::Follower => write!(f, "Follower"),
            State::Leader {
                term,
                status: LeaderStatus::Established,
                ..
            } => write!(f, "Leader(Term={:?})", term),
            State::Leader {
                term,
                status: LeaderStatus::WaitForSeqno(seqno),
                ..
            } => write!(f, "Leader(Term={:?}, WaitForSeqno={:?})", term, seqno),
        }
    }
}
