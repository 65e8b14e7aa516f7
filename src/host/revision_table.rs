use crate::collab::Revision;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// RevisionTable is the process-wide `(rsm name → last applied revision)`
/// table. Each host is the sole writer for its own name; any caller may read
/// without going through the host's mailbox.
#[derive(Clone, Default)]
pub struct RevisionTable {
    inner: Arc<RwLock<HashMap<String, Revision>>>,
}

impl RevisionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Revision> {
        self.inner
            .read()
            .expect("RevisionTable read lock poisoned")
            .get(name)
            .copied()
    }

    pub(crate) fn publish(&self, name: &str, revision: Revision) {
        let mut table = self.inner.write().expect("RevisionTable write lock poisoned");
        if let Some(previous) = table.get(name) {
            if previous.history_id == revision.history_id {
                assert!(
                    revision.seqno >= previous.seqno,
                    "revision for '{}' moved backwards within a history: {:?} after {:?}",
                    name,
                    revision,
                    previous,
                );
            }
        }
        table.insert(name.to_string(), revision);
    }

    pub(crate) fn remove(&self, name: &str) {
        self.inner
            .write()
            .expect("RevisionTable write lock poisoned")
            .remove(name);
    }
}
