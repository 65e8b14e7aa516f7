use crate::actor::{ActorClient, HostActor, WeakActorClient};
use crate::api::client::RsmClient;
use crate::api::options::{CoordinatorOptions, CoordinatorOptionsValidated};
use crate::api::state_machine::StateMachine;
use crate::collab::{Agent, ConsensusServer, MetadataListener};
use crate::coordinator::{FailoverClient, FailoverCoordinator};
use crate::host::{RevisionTable, RsmHost, RsmHostConfig};
use std::convert::TryFrom;
use std::sync::Arc;

pub struct HostConfig<M: StateMachine> {
    /// Name of the RSM; commands in the shared log are routed by it.
    pub name: String,
    /// The machine instance, already initialized by the embedder.
    pub machine: M,
    pub consensus: Arc<dyn ConsensusServer>,
    pub agent: Arc<dyn Agent>,
    pub metadata_listener: MetadataListener,
    /// Shared across hosts in the process; the embedder typically creates one.
    pub revision_table: RevisionTable,
    pub logger: slog::Logger,
}

/// Creates and starts an RSM host, returning its client. The host registers
/// with the consensus server (possibly learning it already leads a term),
/// then runs on its own task until every client clone is dropped.
pub fn create_rsm_host<M: StateMachine>(config: HostConfig<M>) -> RsmClient<M> {
    let logger = config.logger.new(slog::o!("RsmName" => config.name.clone()));

    let (actor_client, actor_queue_rx) = ActorClient::new();

    let initial_term = config
        .consensus
        .register_rsm(&config.name, Box::new(actor_client.weak()));

    let host = RsmHost::new(RsmHostConfig {
        logger: logger.clone(),
        name: config.name.clone(),
        machine: config.machine,
        consensus: config.consensus,
        agent: config.agent,
        actor_client: actor_client.weak(),
        revision_table: config.revision_table.clone(),
        initial_term,
    });

    tokio::spawn(forward_metadata(config.metadata_listener, actor_client.weak()));

    let host_actor = HostActor::new(logger, actor_queue_rx, host);
    tokio::spawn(host_actor.run_event_loop());

    RsmClient::new(config.name, actor_client, config.revision_table)
}

// Turns bus updates into mailbox events. Holds only a weak client, so the
// forwarder dies with the host instead of keeping it alive.
async fn forward_metadata<M: StateMachine>(mut listener: MetadataListener, actor_client: WeakActorClient<M>) {
    if let Some(metadata) = listener.current() {
        if !actor_client.metadata_event(metadata) {
            return;
        }
    }

    while let Some(metadata) = listener.next().await {
        if !actor_client.metadata_event(metadata) {
            return;
        }
    }
}

pub struct CoordinatorConfig {
    pub agent: Arc<dyn Agent>,
    pub logger: slog::Logger,
    pub options: CoordinatorOptions,
}

#[derive(Debug, thiserror::Error)]
pub enum CoordinatorCreationError {
    #[error("Illegal options for configuring coordinator: {0}")]
    IllegalOptions(String),
}

/// Creates and starts the node's failover coordinator, returning its client.
pub fn try_create_failover_coordinator(config: CoordinatorConfig) -> Result<FailoverClient, CoordinatorCreationError> {
    let options = CoordinatorOptionsValidated::try_from(config.options)
        .map_err(|e| CoordinatorCreationError::IllegalOptions(e.to_string()))?;

    let logger = config.logger.new(slog::o!("Component" => "FailoverCoordinator"));
    let (coordinator, client) = FailoverCoordinator::new(logger, config.agent, options);
    tokio::spawn(coordinator.run_event_loop());

    Ok(client)
}
