//! Interfaces this crate consumes from its collaborators (consensus server,
//! durability agent, metadata bus) and the data model shared with them.
mod agent;
mod consensus;
mod in_memory;
pub mod metadata_bus;
mod types;

pub use agent::Agent;
pub use agent::AgentError;
pub use agent::PeerOutcomes;
pub use consensus::ConsensusServer;
pub use consensus::ConsensusSink;
pub use consensus::LeaderError;
pub use consensus::TermEstablishment;
pub use in_memory::InMemoryAgent;
pub use metadata_bus::MetadataBus;
pub use metadata_bus::MetadataListener;
pub use types::Branch;
pub use types::CorrelationId;
pub use types::EntryValue;
pub use types::HistoryId;
pub use types::LogEntry;
pub use types::Metadata;
pub use types::PeerId;
pub use types::Revision;
pub use types::Seqno;
pub use types::Term;
