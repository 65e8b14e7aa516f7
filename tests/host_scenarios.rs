mod common;

use common::*;
use rsm_rs::{
    AppliedRevisionError, CommandError, HistoryId, LocalRevisionError, ReadKind, Revision, Seqno, SyncRevisionError,
    Term,
};
use tokio::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn command_on_follower_is_not_leader() {
    let harness = HostHarness::spawn("kv", TestConsensus::new());

    let result = harness.client.command(put("k", "v"), TIMEOUT).await;
    assert!(matches!(result, Err(CommandError::NotLeader)));
}

#[tokio::test]
async fn applied_revision_on_follower_is_not_leader() {
    let harness = HostHarness::spawn("kv", TestConsensus::new());

    let result = harness.client.get_applied_revision(ReadKind::Leader, TIMEOUT).await;
    assert!(matches!(result, Err(AppliedRevisionError::NotLeader)));
}

#[tokio::test]
async fn command_commits_and_replies_with_apply_output() {
    let history = HistoryId::fresh();
    let term = Term::new(2);
    let harness = HostHarness::spawn("kv", TestConsensus::new());

    harness.append_config(history, term, 1);
    harness.commit(1);
    harness.wait_applied(history, 1).await;
    harness.consensus.establish_term(establishment(history, 2, 1));
    harness.barrier().await;

    let client = harness.client.clone();
    let pending = tokio::spawn(async move { client.command(put("color", "red"), TIMEOUT).await });

    let call = harness.consensus.next_command().await;
    assert_eq!(call.history_id, history);
    assert_eq!(call.term, term);
    assert_eq!(call.name, "kv");
    let submitted: KvCommand = bincode::deserialize(&call.command).unwrap();
    assert_eq!(submitted, put("color", "red"));

    harness.consensus.accept_command(call.tag, Seqno::new(2));
    harness.append_command(history, term, 2, &put("color", "red"));
    harness.commit(2);

    let reply = pending.await.unwrap().unwrap();
    assert_eq!(
        reply,
        KvReply::Stored {
            revision: Revision::new(history, Seqno::new(2)),
        }
    );

    // The applied command is visible to queries.
    let value = harness
        .client
        .query(KvQuery::Get("color".to_string()), TIMEOUT)
        .await
        .unwrap();
    assert_eq!(value, KvQueryReply::Value(Some("red".to_string())));
}

#[tokio::test]
async fn rejected_command_replies_without_touching_consensus() {
    let history = HistoryId::fresh();
    let harness = HostHarness::spawn("kv", TestConsensus::new());

    harness.append_config(history, Term::new(1), 1);
    harness.commit(1);
    harness.wait_applied(history, 1).await;
    harness.consensus.establish_term(establishment(history, 1, 1));
    harness.barrier().await;

    let reply = harness.client.command(put("forbidden-key", "v"), TIMEOUT).await.unwrap();
    assert_eq!(reply, KvReply::KeyForbidden);
}

#[tokio::test]
async fn leader_side_rejection_propagates() {
    let history = HistoryId::fresh();
    let harness = HostHarness::spawn("kv", TestConsensus::new());

    harness.append_config(history, Term::new(1), 1);
    harness.commit(1);
    harness.wait_applied(history, 1).await;
    harness.consensus.establish_term(establishment(history, 1, 1));
    harness.barrier().await;

    let client = harness.client.clone();
    let pending = tokio::spawn(async move { client.command(put("k", "v"), TIMEOUT).await });

    let call = harness.consensus.next_command().await;
    harness.consensus.reject_command(call.tag, "not enough peers");

    let result = pending.await.unwrap();
    match result {
        Err(CommandError::Leader(inner)) => assert_eq!(inner.0, "not enough peers"),
        other => panic!("expected leader error, got {:?}", other),
    }
}

// Leadership established mid-log: reads are postponed until the host applies
// the term's start seqno, then a quorum read answers with the caught-up
// revision.
#[tokio::test]
async fn quorum_read_waits_for_term_start_seqno() {
    let history = HistoryId::fresh();
    let term = Term::new(3);
    let harness = HostHarness::spawn("kv", TestConsensus::new());

    harness.append_config(history, term, 1);
    for seqno in 2..=5 {
        harness.append_command(history, term, seqno, &put(&format!("k{}", seqno), "v"));
    }
    harness.commit(5);
    harness.wait_applied(history, 5).await;

    harness.consensus.establish_term(establishment(history, 3, 10));
    harness.barrier().await;

    let client = harness.client.clone();
    let pending = tokio::spawn(async move { client.get_applied_revision(ReadKind::Quorum, TIMEOUT).await });

    // Still waiting for seqno 10: the read must be postponed, not submitted.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(harness.consensus.quorum_call_count(), 0);

    for seqno in 6..=10 {
        harness.append_command(history, term, seqno, &put(&format!("k{}", seqno), "v"));
    }
    harness.commit(10);

    let call = harness.consensus.next_quorum().await;
    assert_eq!(call.history_id, history);
    assert_eq!(call.term, term);
    harness.consensus.ack_quorum(call.tag);

    let revision = pending.await.unwrap().unwrap();
    assert_eq!(revision, Revision::new(history, Seqno::new(10)));
}

#[tokio::test]
async fn sync_revision_already_applied_is_immediate() {
    let history = HistoryId::fresh();
    let term = Term::new(1);
    let harness = HostHarness::spawn("kv", TestConsensus::new());

    harness.append_config(history, term, 1);
    for seqno in 2..=7 {
        harness.append_command(history, term, seqno, &put(&format!("k{}", seqno), "v"));
    }
    harness.commit(7);
    harness.wait_applied(history, 7).await;

    let result = harness
        .client
        .sync_revision(Revision::new(history, Seqno::new(5)), TIMEOUT)
        .await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn sync_revision_ahead_of_applied_times_out() {
    let history = HistoryId::fresh();
    let term = Term::new(1);
    let harness = HostHarness::spawn("kv", TestConsensus::new());

    harness.append_config(history, term, 1);
    for seqno in 2..=7 {
        harness.append_command(history, term, seqno, &put(&format!("k{}", seqno), "v"));
    }
    harness.commit(7);
    harness.wait_applied(history, 7).await;

    let started = tokio::time::Instant::now();
    let result = harness
        .client
        .sync_revision(Revision::new(history, Seqno::new(9)), Duration::from_millis(50))
        .await;
    assert!(matches!(result, Err(SyncRevisionError::Timeout)));
    assert!(started.elapsed() >= Duration::from_millis(50));
}

#[tokio::test]
async fn sync_revision_releases_once_entry_applies() {
    let history = HistoryId::fresh();
    let term = Term::new(1);
    let harness = HostHarness::spawn("kv", TestConsensus::new());

    harness.append_config(history, term, 1);
    harness.commit(1);
    harness.wait_applied(history, 1).await;

    let client = harness.client.clone();
    let pending =
        tokio::spawn(async move { client.sync_revision(Revision::new(history, Seqno::new(3)), TIMEOUT).await });

    harness.append_command(history, term, 2, &put("a", "1"));
    harness.append_command(history, term, 3, &put("b", "2"));
    harness.commit(3);

    assert!(pending.await.unwrap().is_ok());
}

#[tokio::test]
async fn sync_revision_for_other_history_is_mismatch() {
    let history = HistoryId::fresh();
    let harness = HostHarness::spawn("kv", TestConsensus::new());

    harness.append_config(history, Term::new(1), 1);
    harness.commit(1);
    harness.wait_applied(history, 1).await;

    let result = harness
        .client
        .sync_revision(Revision::new(HistoryId::fresh(), Seqno::new(1)), TIMEOUT)
        .await;
    assert!(matches!(result, Err(SyncRevisionError::HistoryMismatch)));
}

// A history transition fails out every waiter parked against the old history
// and moves the applied revision to the config entry's.
#[tokio::test]
async fn history_transition_sweeps_parked_sync_revisions() {
    let h1 = HistoryId::fresh();
    let term = Term::new(1);
    let harness = HostHarness::spawn("kv", TestConsensus::new());

    harness.append_config(h1, term, 1);
    for seqno in 2..=20 {
        harness.append_command(h1, term, seqno, &put(&format!("k{}", seqno), "v"));
    }
    harness.commit(20);
    harness.wait_applied(h1, 20).await;

    let client = harness.client.clone();
    let pending_25 = tokio::spawn(async move { client.sync_revision(Revision::new(h1, Seqno::new(25)), TIMEOUT).await });
    let client = harness.client.clone();
    let pending_30 = tokio::spawn(async move { client.sync_revision(Revision::new(h1, Seqno::new(30)), TIMEOUT).await });
    harness.barrier().await;

    let h2 = HistoryId::fresh();
    harness.append_config(h2, Term::new(2), 22);
    harness.commit(22);

    assert!(matches!(pending_25.await.unwrap(), Err(SyncRevisionError::HistoryMismatch)));
    assert!(matches!(pending_30.await.unwrap(), Err(SyncRevisionError::HistoryMismatch)));

    harness.wait_applied(h2, 22).await;
    let local = harness.client.get_local_revision().unwrap();
    assert_eq!(local, Revision::new(h2, Seqno::new(22)));
}

// Term ends between acceptance and apply: the parked client learns the
// leadership is gone instead of waiting forever.
#[tokio::test]
async fn accepted_command_is_swept_with_leader_lost_on_term_end() {
    let history = HistoryId::fresh();
    let harness = HostHarness::spawn("kv", TestConsensus::new());

    harness.append_config(history, Term::new(4), 1);
    harness.commit(1);
    harness.wait_applied(history, 1).await;
    harness.consensus.establish_term(establishment(history, 4, 1));
    harness.barrier().await;

    let client = harness.client.clone();
    let pending = tokio::spawn(async move { client.command(put("k", "v"), TIMEOUT).await });

    let call = harness.consensus.next_command().await;
    harness.consensus.accept_command(call.tag, Seqno::new(42));

    harness.consensus.finish_term(history, Term::new(4));

    let result = pending.await.unwrap();
    assert!(matches!(result, Err(CommandError::LeaderLost)));

    // And the host is a follower again.
    let follower = harness.client.command(put("k2", "v"), TIMEOUT).await;
    assert!(matches!(follower, Err(CommandError::NotLeader)));
}

#[tokio::test]
async fn leader_read_answers_immediately_when_established() {
    let history = HistoryId::fresh();
    let consensus = TestConsensus::with_initial_term(establishment(history, 7, 0));
    let harness = HostHarness::spawn("kv", consensus);

    // Established from registration (wait seqno 0 is already covered).
    let revision = harness.client.get_applied_revision(ReadKind::Leader, TIMEOUT).await.unwrap();
    assert_eq!(revision, Revision::NONE);
}

#[tokio::test]
async fn sync_leader_kind_catches_up_local_state() {
    let history = HistoryId::fresh();
    let term = Term::new(2);
    let harness = HostHarness::spawn("kv", TestConsensus::new());

    harness.append_config(history, term, 1);
    for seqno in 2..=4 {
        harness.append_command(history, term, seqno, &put(&format!("k{}", seqno), "v"));
    }
    harness.commit(4);
    harness.wait_applied(history, 4).await;
    harness.consensus.establish_term(establishment(history, 2, 4));
    harness.barrier().await;

    assert!(harness.client.sync(ReadKind::Leader, TIMEOUT).await.is_ok());
}

#[tokio::test]
async fn entries_for_other_rsms_are_skipped() {
    let history = HistoryId::fresh();
    let term = Term::new(1);
    let harness = HostHarness::spawn("kv", TestConsensus::new());

    harness.append_config(history, term, 1);
    harness.append_command_for(history, term, 2, "other-rsm", &put("x", "y"));
    harness.append_command(history, term, 3, &put("mine", "1"));
    harness.commit(3);

    harness.wait_applied(history, 3).await;
    let value = harness
        .client
        .query(KvQuery::Get("mine".to_string()), TIMEOUT)
        .await
        .unwrap();
    assert_eq!(value, KvQueryReply::Value(Some("1".to_string())));
    let other = harness.client.query(KvQuery::Get("x".to_string()), TIMEOUT).await.unwrap();
    assert_eq!(other, KvQueryReply::Value(None));
}

#[tokio::test]
async fn local_revision_publishes_monotonically() {
    let history = HistoryId::fresh();
    let term = Term::new(1);
    let harness = HostHarness::spawn("kv", TestConsensus::new());

    // Before any log activity the host publishes the sentinel.
    wait_for(|| harness.revision_table.get("kv")).await;
    assert_eq!(harness.client.get_local_revision().unwrap(), Revision::NONE);

    harness.append_config(history, term, 1);
    harness.commit(1);
    harness.wait_applied(history, 1).await;

    harness.append_command(history, term, 2, &put("a", "1"));
    harness.commit(2);
    harness.wait_applied(history, 2).await;

    assert_eq!(
        harness.client.get_local_revision().unwrap(),
        Revision::new(history, Seqno::new(2)),
    );
}

#[tokio::test]
async fn stop_info_shuts_the_host_down() {
    let harness = HostHarness::spawn("kv", TestConsensus::new());
    harness.barrier().await;

    harness.client.deliver_info(KvInfo::Stop);

    // The revision table entry disappears with the host.
    wait_for(|| match harness.revision_table.get("kv") {
        None => Some(()),
        Some(_) => None,
    })
    .await;
    assert!(matches!(
        harness.client.get_local_revision(),
        Err(LocalRevisionError::NotRunning),
    ));

    let result = harness.client.command(put("k", "v"), TIMEOUT).await;
    assert!(matches!(result, Err(CommandError::HostStopped)));
}
