use crate::actor::ActorClient;
use crate::api::state_machine::StateMachine;
use crate::collab::Revision;
use crate::host::{
    AppliedRevisionError, CommandError, LocalRevisionError, QueryError, ReadKind, RevisionTable, SyncError,
    SyncRevisionError,
};
use tokio::time::{Duration, Instant};

/// RsmClient is the handle to one running RSM host. All calls are synchronous
/// from the caller's perspective, with explicit timeouts; the host parks the
/// request and replies when the triggering event arrives.
///
/// Dropping every clone of the client shuts the host down.
pub struct RsmClient<M: StateMachine> {
    name: String,
    actor_client: ActorClient<M>,
    revision_table: RevisionTable,
}

// Derived Clone would require M: Clone.
impl<M: StateMachine> Clone for RsmClient<M> {
    fn clone(&self) -> Self {
        RsmClient {
            name: self.name.clone(),
            actor_client: self.actor_client.clone(),
            revision_table: self.revision_table.clone(),
        }
    }
}

impl<M: StateMachine> RsmClient<M> {
    pub(crate) fn new(name: String, actor_client: ActorClient<M>, revision_table: RevisionTable) -> Self {
        RsmClient {
            name,
            actor_client,
            revision_table,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs a command through consensus. Replies with the machine's
    /// `apply_command` output once the committed entry has been applied
    /// locally, under the same leader term that accepted it.
    pub async fn command(&self, command: M::Command, timeout: Duration) -> Result<M::Reply, CommandError> {
        match tokio::time::timeout(timeout, self.actor_client.command(command)).await {
            Ok(result) => result,
            Err(_elapsed) => Err(CommandError::Timeout),
        }
    }

    /// Reads the local machine state. No consistency guarantee beyond "some
    /// applied prefix"; combine with `sync`/`sync_revision` for more.
    pub async fn query(&self, query: M::Query, timeout: Duration) -> Result<M::QueryReply, QueryError> {
        match tokio::time::timeout(timeout, self.actor_client.query(query)).await {
            Ok(result) => result,
            Err(_elapsed) => Err(QueryError::Timeout),
        }
    }

    /// Waits until the host has applied at least `revision`. The wait timer
    /// is owned by the host; this call returns when the revision is applied,
    /// the timer fires, or the applied history diverges from the requested
    /// one.
    pub async fn sync_revision(&self, revision: Revision, timeout: Duration) -> Result<(), SyncRevisionError> {
        self.actor_client.sync_revision(revision, timeout).await
    }

    /// The leader's applied revision: immediate from an established leader
    /// (`ReadKind::Leader`), or confirmed against a quorum first
    /// (`ReadKind::Quorum`).
    pub async fn get_applied_revision(&self, kind: ReadKind, timeout: Duration) -> Result<Revision, AppliedRevisionError> {
        match tokio::time::timeout(timeout, self.actor_client.get_applied_revision(kind)).await {
            Ok(result) => result,
            Err(_elapsed) => Err(AppliedRevisionError::Timeout),
        }
    }

    /// Catches the local machine up to the leader's applied revision: reads
    /// the applied revision at `kind` consistency, then waits until it is
    /// applied locally, all under one deadline.
    pub async fn sync(&self, kind: ReadKind, timeout: Duration) -> Result<(), SyncError> {
        let deadline = Instant::now() + timeout;

        let revision = self.get_applied_revision(kind, timeout).await?;

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(SyncError::Timeout);
        }
        self.sync_revision(revision, remaining).await?;
        Ok(())
    }

    /// The last revision this host published to the shared revision table.
    /// Reads the table directly; never touches the host's mailbox.
    pub fn get_local_revision(&self) -> Result<Revision, LocalRevisionError> {
        self.revision_table.get(&self.name).ok_or(LocalRevisionError::NotRunning)
    }

    /// Forwards an out-of-band message to the machine's `handle_info`.
    pub fn deliver_info(&self, info: M::Info) {
        self.actor_client.deliver_info(info);
    }
}
