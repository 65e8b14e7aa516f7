use crate::actor::WeakActorClient;
use crate::api::StateMachine;
use crate::collab::{Agent, EntryValue, Seqno};
use crate::host::host_api::LogReadOutput;
use std::sync::Arc;

/// Spawns the one-shot log reader. The host guarantees at most one is running
/// at a time; the task fetches the log, filters it down to what this RSM
/// consumes, and delivers the batch (or its failure) back into the mailbox.
pub(crate) fn spawn_reader<M: StateMachine>(
    agent: Arc<dyn Agent>,
    rsm_name: String,
    read_seqno: Seqno,
    available_seqno: Seqno,
    actor_client: WeakActorClient<M>,
) {
    tokio::task::spawn(async move {
        match agent.get_log().await {
            Ok(log) => {
                let entries = log
                    .into_iter()
                    .filter(|entry| entry.seqno > read_seqno && entry.seqno <= available_seqno)
                    .filter(|entry| match &entry.value {
                        EntryValue::RsmCommand { rsm_name: target, .. } => *target == rsm_name,
                        EntryValue::ConfigEntry { .. } => true,
                    })
                    .collect();

                actor_client.log_read(LogReadOutput {
                    high_seqno: available_seqno,
                    entries,
                });
            }
            Err(error) => {
                actor_client.reader_failed(error);
            }
        }
    });
}
