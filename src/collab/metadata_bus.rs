use crate::collab::types::Metadata;
use tokio::sync::watch;

/// Creates a connected publisher/listener pair. The agent (or whoever owns
/// metadata) publishes; each RSM host holds a listener.
pub fn new() -> (MetadataBus, MetadataListener) {
    let (snd, rcv) = watch::channel(None);

    (MetadataBus { snd }, MetadataListener { rcv })
}

/// MetadataBus carries fresh metadata records to subscribed hosts. Like a
/// watch channel, intermediate records may be clobbered: a slow listener only
/// observes the most recent record, which is all the host needs (it reacts to
/// the latest `committed_seqno`, not to each step).
pub struct MetadataBus {
    snd: watch::Sender<Option<Metadata>>,
}

impl MetadataBus {
    pub fn publish(&self, metadata: Metadata) {
        let _ = self.snd.send(Some(metadata));
    }
}

#[derive(Clone)]
pub struct MetadataListener {
    rcv: watch::Receiver<Option<Metadata>>,
}

impl MetadataListener {
    /// The most recently published record, if any was published yet.
    pub fn current(&self) -> Option<Metadata> {
        self.rcv.borrow().clone()
    }

    /// `next()` returns the next fresh record, or None once the bus has been
    /// dropped.
    pub async fn next(&mut self) -> Option<Metadata> {
        loop {
            self.rcv.changed().await.ok()?;
            if let Some(metadata) = self.rcv.borrow().clone() {
                return Some(metadata);
            }
        }
    }
}
