#![allow(dead_code)] // Each integration test binary uses a subset of the harness.

use bytes::Bytes;
use rsm_rs::{
    create_rsm_host, metadata_bus, CommandDecision, ConsensusServer, ConsensusSink, CorrelationId, EntryValue,
    HistoryId, HostConfig, InMemoryAgent, InfoDisposition, LeaderError, LogEntry, Metadata, MetadataBus, PeerId,
    Revision, RevisionTable, RsmClient, Seqno, StateMachine, Term, TermEstablishment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::time::{Duration, Instant};

pub fn test_logger() -> slog::Logger {
    slog::Logger::root(slog::Discard, slog::o!())
}

// ---------- Test state machine ----------

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum KvCommand {
    Put { key: String, value: String },
}

pub fn put(key: &str, value: &str) -> KvCommand {
    KvCommand::Put {
        key: key.to_string(),
        value: value.to_string(),
    }
}

#[derive(Debug, Eq, PartialEq)]
pub enum KvReply {
    Stored { revision: Revision },
    KeyForbidden,
}

#[derive(Debug)]
pub enum KvQuery {
    Get(String),
    AppliedRevision,
}

#[derive(Debug, Eq, PartialEq)]
pub enum KvQueryReply {
    Value(Option<String>),
    AppliedRevision(Revision),
}

#[derive(Debug)]
pub enum KvInfo {
    Stop,
}

/// Small KV store. Keys starting with "forbidden" are rejected before they
/// reach consensus, which exercises the short-circuit reply path.
#[derive(Default)]
pub struct KvMachine {
    entries: HashMap<String, String>,
}

impl StateMachine for KvMachine {
    type Command = KvCommand;
    type Reply = KvReply;
    type Query = KvQuery;
    type QueryReply = KvQueryReply;
    type Info = KvInfo;

    fn handle_command(&mut self, command: &KvCommand, _applied: Revision) -> CommandDecision<KvReply> {
        let KvCommand::Put { key, .. } = command;
        if key.starts_with("forbidden") {
            CommandDecision::Reject(KvReply::KeyForbidden)
        } else {
            CommandDecision::Accept
        }
    }

    fn apply_command(&mut self, command: KvCommand, entry: Revision, _applied: Revision) -> KvReply {
        let KvCommand::Put { key, value } = command;
        self.entries.insert(key, value);
        KvReply::Stored { revision: entry }
    }

    fn handle_query(&mut self, query: KvQuery, applied: Revision) -> KvQueryReply {
        match query {
            KvQuery::Get(key) => KvQueryReply::Value(self.entries.get(&key).cloned()),
            KvQuery::AppliedRevision => KvQueryReply::AppliedRevision(applied),
        }
    }

    fn handle_info(&mut self, info: KvInfo, _applied: Revision) -> InfoDisposition {
        match info {
            KvInfo::Stop => InfoDisposition::Stop,
        }
    }
}

// ---------- Scripted consensus server ----------

#[derive(Debug)]
pub struct CommandCall {
    pub tag: CorrelationId,
    pub history_id: HistoryId,
    pub term: Term,
    pub name: String,
    pub command: Bytes,
}

#[derive(Debug)]
pub struct QuorumCall {
    pub tag: CorrelationId,
    pub history_id: HistoryId,
    pub term: Term,
}

/// A consensus server driven entirely by the test: it records what the host
/// submits and delivers whatever outcomes the test scripts through the
/// captured sink.
#[derive(Default)]
pub struct TestConsensus {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    sink: Option<Box<dyn ConsensusSink>>,
    initial_term: Option<TermEstablishment>,
    commands: Vec<CommandCall>,
    quorums: Vec<QuorumCall>,
}

impl TestConsensus {
    pub fn new() -> Arc<Self> {
        Arc::new(TestConsensus::default())
    }

    pub fn with_initial_term(establishment: TermEstablishment) -> Arc<Self> {
        let consensus = TestConsensus::default();
        consensus.lock().initial_term = Some(establishment);
        Arc::new(consensus)
    }

    pub fn establish_term(&self, establishment: TermEstablishment) {
        self.sink(|sink| sink.term_established(establishment));
    }

    pub fn finish_term(&self, history_id: HistoryId, term: Term) {
        self.sink(|sink| sink.term_finished(history_id, term));
    }

    pub fn accept_command(&self, tag: CorrelationId, seqno: Seqno) {
        self.sink(|sink| sink.command_accepted(tag, seqno));
    }

    pub fn reject_command(&self, tag: CorrelationId, error: &str) {
        self.sink(|sink| sink.command_rejected(tag, LeaderError(error.to_string())));
    }

    pub fn ack_quorum(&self, tag: CorrelationId) {
        self.sink(|sink| sink.quorum_ok(tag));
    }

    pub fn fail_quorum(&self, tag: CorrelationId, error: &str) {
        self.sink(|sink| sink.quorum_failed(tag, LeaderError(error.to_string())));
    }

    pub async fn next_command(&self) -> CommandCall {
        wait_for(|| {
            let mut inner = self.lock();
            if inner.commands.is_empty() {
                None
            } else {
                Some(inner.commands.remove(0))
            }
        })
        .await
    }

    pub async fn next_quorum(&self) -> QuorumCall {
        wait_for(|| {
            let mut inner = self.lock();
            if inner.quorums.is_empty() {
                None
            } else {
                Some(inner.quorums.remove(0))
            }
        })
        .await
    }

    pub fn quorum_call_count(&self) -> usize {
        self.lock().quorums.len()
    }

    fn sink<F: FnOnce(&dyn ConsensusSink)>(&self, deliver: F) {
        let inner = self.lock();
        let sink = inner.sink.as_ref().expect("no RSM registered yet");
        deliver(sink.as_ref());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("TestConsensus mutex guard poison")
    }
}

impl ConsensusServer for TestConsensus {
    fn register_rsm(&self, _name: &str, sink: Box<dyn ConsensusSink>) -> Option<TermEstablishment> {
        let mut inner = self.lock();
        inner.sink = Some(sink);
        inner.initial_term
    }

    fn rsm_command(&self, tag: CorrelationId, history_id: HistoryId, term: Term, name: &str, command: Bytes) {
        self.lock().commands.push(CommandCall {
            tag,
            history_id,
            term,
            name: name.to_string(),
            command,
        });
    }

    fn sync_quorum(&self, tag: CorrelationId, history_id: HistoryId, term: Term) {
        self.lock().quorums.push(QuorumCall { tag, history_id, term });
    }
}

// ---------- Host harness ----------

pub struct HostHarness {
    pub agent: Arc<InMemoryAgent>,
    pub consensus: Arc<TestConsensus>,
    pub bus: MetadataBus,
    pub revision_table: RevisionTable,
    pub client: RsmClient<KvMachine>,
}

impl HostHarness {
    pub fn spawn(name: &str, consensus: Arc<TestConsensus>) -> Self {
        let agent = Arc::new(InMemoryAgent::new(Metadata {
            peer: PeerId::new("node-1"),
            history_id: HistoryId::NONE,
            committed_seqno: Seqno::NONE,
        }));
        let (bus, listener) = metadata_bus::new();
        let revision_table = RevisionTable::new();

        let client = create_rsm_host(HostConfig {
            name: name.to_string(),
            machine: KvMachine::default(),
            consensus: consensus.clone() as Arc<dyn rsm_rs::ConsensusServer>,
            agent: agent.clone() as Arc<dyn rsm_rs::Agent>,
            metadata_listener: listener,
            revision_table: revision_table.clone(),
            logger: test_logger(),
        });

        HostHarness {
            agent,
            consensus,
            bus,
            revision_table,
            client,
        }
    }

    pub fn append_config(&self, history_id: HistoryId, term: Term, seqno: u64) {
        self.agent.append_entry(LogEntry {
            seqno: Seqno::new(seqno),
            term,
            history_id,
            value: EntryValue::ConfigEntry { config: Bytes::new() },
        });
    }

    pub fn append_command(&self, history_id: HistoryId, term: Term, seqno: u64, command: &KvCommand) {
        self.append_command_for(history_id, term, seqno, self.client.name(), command);
    }

    pub fn append_command_for(&self, history_id: HistoryId, term: Term, seqno: u64, rsm_name: &str, command: &KvCommand) {
        let encoded = bincode::serialize(command).expect("test command serializes");
        self.agent.append_entry(LogEntry {
            seqno: Seqno::new(seqno),
            term,
            history_id,
            value: EntryValue::RsmCommand {
                rsm_name: rsm_name.to_string(),
                command: Bytes::from(encoded),
            },
        });
    }

    /// Marks everything up to `seqno` committed and announces it on the bus.
    pub fn commit(&self, seqno: u64) {
        let metadata = self.agent.set_committed_seqno(Seqno::new(seqno));
        self.bus.publish(metadata);
    }

    /// Waits until the host has applied `revision` (published to the shared
    /// revision table).
    pub async fn wait_applied(&self, history_id: HistoryId, seqno: u64) {
        let wanted = Revision::new(history_id, Seqno::new(seqno));
        wait_for(|| match self.revision_table.get(self.client.name()) {
            Some(revision) if revision.history_id == wanted.history_id && revision.seqno >= wanted.seqno => Some(()),
            _ => None,
        })
        .await;
    }

    /// Round-trips a query through the mailbox, guaranteeing every previously
    /// enqueued event has been handled.
    pub async fn barrier(&self) {
        self.client
            .query(KvQuery::AppliedRevision, Duration::from_secs(5))
            .await
            .expect("barrier query");
    }
}

pub fn establishment(history_id: HistoryId, term: u64, seqno: u64) -> TermEstablishment {
    TermEstablishment {
        history_id,
        term: Term::new(term),
        seqno: Seqno::new(seqno),
    }
}

/// Polls `check` until it yields a value, panicking after a few seconds.
pub async fn wait_for<T, F: FnMut() -> Option<T>>(mut check: F) -> T {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(value) = check() {
            return value;
        }
        if Instant::now() > deadline {
            panic!("condition not reached within deadline");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
