mod actor;
mod api;
mod collab;
mod coordinator;
mod host;

pub use api::create_rsm_host;
pub use api::try_create_failover_coordinator;
pub use api::CommandDecision;
pub use api::CoordinatorConfig;
pub use api::CoordinatorCreationError;
pub use api::CoordinatorOptions;
pub use api::HostConfig;
pub use api::InfoDisposition;
pub use api::Reason;
pub use api::RsmClient;
pub use api::StateMachine;
pub use collab::metadata_bus;
pub use collab::Agent;
pub use collab::AgentError;
pub use collab::Branch;
pub use collab::ConsensusServer;
pub use collab::ConsensusSink;
pub use collab::CorrelationId;
pub use collab::EntryValue;
pub use collab::HistoryId;
pub use collab::InMemoryAgent;
pub use collab::LeaderError;
pub use collab::LogEntry;
pub use collab::Metadata;
pub use collab::MetadataBus;
pub use collab::MetadataListener;
pub use collab::PeerId;
pub use collab::PeerOutcomes;
pub use collab::Revision;
pub use collab::Seqno;
pub use collab::Term;
pub use collab::TermEstablishment;
pub use coordinator::CancelError;
pub use coordinator::FailoverClient;
pub use coordinator::FailoverError;
pub use host::AppliedRevisionError;
pub use host::CommandError;
pub use host::LocalRevisionError;
pub use host::QueryError;
pub use host::ReadKind;
pub use host::RevisionTable;
pub use host::SyncError;
pub use host::SyncRevisionError;

// The root mod has no code on purpose: only `mod` statements and flat `pub
// use` exports, so each internal mod can be organized freely and the public
// surface stays in one place.
