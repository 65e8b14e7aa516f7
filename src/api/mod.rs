//! This mod holds the code for the library's client-facing API.
mod client;
pub(crate) mod options;
mod state_machine;
mod wiring;

pub use client::RsmClient;
pub use options::CoordinatorOptions;
pub use state_machine::CommandDecision;
pub use state_machine::InfoDisposition;
pub use state_machine::Reason;
pub use state_machine::StateMachine;
pub use wiring::create_rsm_host;
pub use wiring::try_create_failover_coordinator;
pub use wiring::CoordinatorConfig;
pub use wiring::CoordinatorCreationError;
pub use wiring::HostConfig;
