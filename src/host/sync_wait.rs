use crate::actor::Callback;
use crate::api::StateMachine;
use crate::collab::{CorrelationId, HistoryId, Revision, Seqno};
use crate::host::host_api::SyncRevisionError;
use std::collections::BTreeMap;
use tokio::task::JoinHandle;
use tokio::time::Duration;

/// Key of a parked sync-revision request. Ordered by seqno first so that
/// "release everything at or below the applied seqno" is an ascending sweep
/// from the front of the map.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct SyncWaitKey {
    pub(crate) seqno: Seqno,
    pub(crate) tag: CorrelationId,
}

struct Waiter {
    history_id: HistoryId,
    callback: Callback<(), SyncRevisionError>,
    timer: JoinHandle<()>,
}

/// SyncWaitQueue parks `sync_revision` callers whose requested seqno has not
/// been applied yet. Each waiter owns a timer task that fires a timeout event
/// back into the host mailbox; release aborts the timer, and a fire that
/// races a release finds its key gone and is dropped.
pub(crate) struct SyncWaitQueue {
    waiters: BTreeMap<SyncWaitKey, Waiter>,
}

impl SyncWaitQueue {
    pub fn new() -> Self {
        SyncWaitQueue {
            waiters: BTreeMap::new(),
        }
    }

    /// Parks a waiter and arms its timer. `fire` is invoked from the timer
    /// task to enqueue the timeout event (the queue itself never touches the
    /// mailbox).
    pub fn park<F>(
        &mut self,
        key: SyncWaitKey,
        history_id: HistoryId,
        callback: Callback<(), SyncRevisionError>,
        timeout: Duration,
        fire: F,
    ) where
        F: FnOnce(SyncWaitKey) + Send + 'static,
    {
        let timer = tokio::task::spawn(async move {
            tokio::time::sleep(timeout).await;
            fire(key);
        });

        let previous = self.waiters.insert(
            key,
            Waiter {
                history_id,
                callback,
                timer,
            },
        );
        assert!(previous.is_none(), "duplicate sync waiter for {:?}", key);
    }

    /// Releases every waiter whose seqno the applied revision now covers.
    pub fn release_through(&mut self, applied: Revision) {
        while let Some(entry) = self.waiters.first_entry() {
            if entry.key().seqno > applied.seqno {
                break;
            }
            let waiter = entry.remove();
            waiter.timer.abort();
            waiter.callback.send(Ok(()));
        }
    }

    /// History transition: every waiter parked against a different history
    /// can never be satisfied and is failed out.
    pub fn sweep_history_mismatch(&mut self, new_history_id: HistoryId) {
        let diverged: Vec<SyncWaitKey> = self
            .waiters
            .iter()
            .filter(|(_, waiter)| waiter.history_id != new_history_id)
            .map(|(key, _)| *key)
            .collect();

        for key in diverged {
            let waiter = self.waiters.remove(&key).expect("key collected above");
            waiter.timer.abort();
            waiter.callback.send(Err(SyncRevisionError::HistoryMismatch));
        }
    }

    /// Timer fired. Returns false for a stale fire that raced a release.
    pub fn fire_timeout(&mut self, key: SyncWaitKey) -> bool {
        match self.waiters.remove(&key) {
            Some(waiter) => {
                waiter.callback.send(Err(SyncRevisionError::Timeout));
                true
            }
            None => false,
        }
    }

    pub fn drain_all(&mut self) -> Vec<Callback<(), SyncRevisionError>> {
        let waiters = std::mem::take(&mut self.waiters);
        waiters
            .into_values()
            .map(|waiter| {
                waiter.timer.abort();
                waiter.callback
            })
            .collect()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.waiters.len()
    }
}
