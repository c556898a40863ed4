use tokio_util::sync::CancellationToken;
use warden_core::{
  deletion::{DeletionStatus, NewDeletionRequest},
  retention::RetentionPolicy,
  settings::{self, Settings as _},
};

use super::{Fixture, MARCH_10, Seed, hex_id};
use crate::{CollectSummary, Error, ProcessSummary, RetentionOutcome};

const P: u8 = 0x50;
const Q: u8 = 0x51;

const DAY: i64 = 86_400;

// ─── delete_before ───────────────────────────────────────────────────────────

#[tokio::test]
async fn kind_exception_keeps_old_profile() {
  let t = MARCH_10;
  let f = Fixture::seeded([
    Seed::new(1, P, t - 100, 0),
    Seed::new(2, P, t - 50, 1),
    Seed::new(3, P, t - 10, 3),
  ])
  .await;

  let handle = f.stores.events().open_for_write().await.unwrap();
  let deleted = handle
    .delete_before(t - 30, &["kind:0"], None, &CancellationToken::new())
    .await
    .unwrap();
  handle.close().await.unwrap();

  assert_eq!(deleted, 1);
  assert_eq!(f.relay.ids(), [1, 3]);
}

#[tokio::test]
async fn delete_before_is_idempotent() {
  let f = Fixture::seeded([
    Seed::new(1, P, MARCH_10 - 3 * DAY, 1),
    Seed::new(2, Q, MARCH_10 - 2 * DAY, 1),
    Seed::new(3, Q, MARCH_10, 1),
  ])
  .await;
  let cancel = CancellationToken::new();
  let rules: [&str; 0] = [];

  let handle = f.stores.events().open_for_write().await.unwrap();
  let first = handle.delete_before(MARCH_10 - DAY, &rules, None, &cancel).await.unwrap();
  let survivors = f.relay.ids();
  let second = handle.delete_before(MARCH_10 - DAY, &rules, None, &cancel).await.unwrap();
  handle.close().await.unwrap();

  assert_eq!(first, 2);
  assert_eq!(second, 0);
  assert_eq!(f.relay.ids(), survivors);
  assert_eq!(survivors, [3]);
}

#[tokio::test]
async fn operator_rule_resolves_at_call_time() {
  let f = Fixture::seeded([
    Seed::new(1, P, MARCH_10 - 10, 0),
    Seed::new(2, P, MARCH_10 - 10, 1),
    Seed::new(3, Q, MARCH_10 - 10, 1),
    Seed::new(4, Q, MARCH_10 - 10, 0),
    Seed::new(5, Q, MARCH_10 - 10, 7),
  ])
  .await;
  let rules = ["kind:0", "pubkey:operator"];
  let operator = hex_id(P);

  let handle = f.stores.events().open_for_write().await.unwrap();
  let deleted = handle
    .delete_before(MARCH_10, &rules, Some(&operator), &CancellationToken::new())
    .await
    .unwrap();
  handle.close().await.unwrap();

  assert_eq!(deleted, 2);
  assert_eq!(f.relay.ids(), [1, 2, 4]);
}

#[tokio::test]
async fn operator_rule_without_operator_excludes_nothing() {
  let f = Fixture::seeded([Seed::new(1, P, MARCH_10 - 10, 1), Seed::new(2, Q, MARCH_10 - 10, 1)]).await;

  let handle = f.stores.events().open_for_write().await.unwrap();
  let deleted = handle
    .delete_before(MARCH_10, &["pubkey:operator", "kind:nope", "bogus"], None, &CancellationToken::new())
    .await
    .unwrap();
  handle.close().await.unwrap();

  assert_eq!(deleted, 2);
  assert!(f.relay.ids().is_empty());
}

#[tokio::test]
async fn explicit_pubkey_rule_protects_author() {
  let f = Fixture::seeded([Seed::new(1, P, MARCH_10 - 10, 1), Seed::new(2, Q, MARCH_10 - 10, 1)]).await;
  let rule = format!("pubkey:{}", hex_id(Q));

  let handle = f.stores.events().open_for_write().await.unwrap();
  handle
    .delete_before(MARCH_10, &[rule], None, &CancellationToken::new())
    .await
    .unwrap();
  handle.close().await.unwrap();

  assert_eq!(f.relay.ids(), [2]);
}

#[tokio::test]
async fn deletion_cascades_to_tags() {
  let f = Fixture::seeded([
    Seed::new(1, P, MARCH_10 - 10, 1).tag(["t", "nostr"]).tag(["p".to_owned(), hex_id(Q)]),
    Seed::new(2, P, MARCH_10 + 10, 1).tag(["t", "rust"]),
  ])
  .await;
  assert_eq!(f.relay.count("tag"), 3);

  let handle = f.stores.events().open_for_write().await.unwrap();
  let rules: [&str; 0] = [];
  handle
    .delete_before(MARCH_10, &rules, None, &CancellationToken::new())
    .await
    .unwrap();
  handle.close().await.unwrap();

  assert_eq!(f.relay.count("tag"), 1);
}

#[tokio::test]
async fn cancelled_delete_touches_nothing() {
  let f = Fixture::seeded([Seed::new(1, P, MARCH_10 - 10, 1)]).await;
  let cancel = CancellationToken::new();
  cancel.cancel();

  let handle = f.stores.events().open_for_write().await.unwrap();
  let rules: [&str; 0] = [];
  let err = handle.delete_before(MARCH_10, &rules, None, &cancel).await.unwrap_err();
  handle.close().await.unwrap();

  assert!(matches!(err, Error::Cancelled));
  assert_eq!(f.relay.ids(), [1]);
}

// ─── delete_by_ids ───────────────────────────────────────────────────────────

#[tokio::test]
async fn delete_by_ids_handles_empty_and_missing_ids() {
  let f = Fixture::seeded([Seed::new(1, P, MARCH_10, 1), Seed::new(2, P, MARCH_10, 1)]).await;
  let cancel = CancellationToken::new();
  let handle = f.stores.events().open_for_write().await.unwrap();

  let none: [String; 0] = [];
  assert_eq!(handle.delete_by_ids(&none, &cancel).await.unwrap(), 0);
  assert_eq!(handle.delete_by_ids(&[hex_id(1), hex_id(9)], &cancel).await.unwrap(), 1);
  assert_eq!(handle.delete_by_ids(&[hex_id(1)], &cancel).await.unwrap(), 0);

  let err = handle.delete_by_ids(&["zz"], &cancel).await.unwrap_err();
  assert!(matches!(err, Error::Core(_)));
  handle.close().await.unwrap();

  assert_eq!(f.relay.ids(), [2]);
}

#[tokio::test]
async fn delete_by_ids_spans_statement_chunks() {
  let f = Fixture::new().await;
  for i in 0..=255u8 {
    f.relay.insert(Seed::new(i, P, MARCH_10, 1));
  }
  // Repeat ids to push the bound-parameter count past one chunk.
  let ids: Vec<String> = (0..=255u8).chain(0..=255u8).chain(0..=255u8).map(hex_id).collect();

  let handle = f.stores.events().open_for_write().await.unwrap();
  let deleted = handle.delete_by_ids(&ids, &CancellationToken::new()).await.unwrap();
  handle.close().await.unwrap();

  assert_eq!(deleted, 256);
  assert_eq!(f.relay.count("event"), 0);
}

#[tokio::test]
async fn delete_by_ids_from_author_skips_other_authors() {
  let f = Fixture::seeded([Seed::new(1, P, MARCH_10, 1), Seed::new(2, Q, MARCH_10, 1)]).await;

  let handle = f.stores.events().open_for_write().await.unwrap();
  let deleted = handle
    .delete_by_ids_from_author(&[hex_id(1), hex_id(2)], &hex_id(P), &CancellationToken::new())
    .await
    .unwrap();
  handle.close().await.unwrap();

  assert_eq!(deleted, 1);
  assert_eq!(f.relay.ids(), [2]);
}

#[tokio::test]
async fn empty_id_list_is_a_no_op_whatever_the_author() {
  let f = Fixture::seeded([Seed::new(1, P, MARCH_10, 1)]).await;
  let handle = f.stores.events().open_for_write().await.unwrap();
  let none: [String; 0] = [];
  let deleted = handle
    .delete_by_ids_from_author(&none, "bad", &CancellationToken::new())
    .await
    .unwrap();
  handle.close().await.unwrap();

  assert_eq!(deleted, 0);
  assert_eq!(f.relay.ids(), [1]);
}

#[tokio::test]
async fn vacuum_and_integrity_check() {
  let f = Fixture::seeded([Seed::new(1, P, MARCH_10, 1)]).await;
  let handle = f.stores.events().open_for_write().await.unwrap();
  handle.vacuum().await.unwrap();
  assert_eq!(handle.integrity_check().await.unwrap(), ["ok"]);
  handle.close().await.unwrap();
}

// ─── apply_retention ─────────────────────────────────────────────────────────

#[tokio::test]
async fn disabled_retention_is_a_no_op() {
  let f = Fixture::seeded([Seed::new(1, P, MARCH_10 - 400 * DAY, 1)]).await;
  let outcome = f.stores.apply_retention(MARCH_10, &CancellationToken::new()).await.unwrap();
  assert_eq!(outcome, None);
  assert_eq!(f.relay.ids(), [1]);
  assert_eq!(f.stores.control().retention_policy().await.unwrap().last_run, None);
}

#[tokio::test]
async fn apply_retention_uses_stored_policy_and_operator() {
  let f = Fixture::seeded([
    Seed::new(1, P, MARCH_10 - 10 * DAY, 1),
    Seed::new(2, Q, MARCH_10 - 10 * DAY, 1),
    Seed::new(3, Q, MARCH_10 - 10 * DAY, 0),
    Seed::new(4, Q, MARCH_10 - DAY, 1),
  ])
  .await;
  let control = f.stores.control();
  control
    .save_retention_policy(&RetentionPolicy {
      retention_days: 7,
      exceptions: vec!["kind:0".into(), "pubkey:operator".into()],
      ..Default::default()
    })
    .await
    .unwrap();
  control.set(settings::OPERATOR_PUBKEY, &hex_id(P)).await.unwrap();

  let outcome = f.stores.apply_retention(MARCH_10, &CancellationToken::new()).await.unwrap();
  assert_eq!(outcome, Some(RetentionOutcome { cutoff: MARCH_10 - 7 * DAY, deleted: 1 }));
  assert_eq!(f.relay.ids(), [1, 3, 4]);
  assert_eq!(control.retention_policy().await.unwrap().last_run, Some(MARCH_10));

  // Changing the operator changes what the same rules protect.
  control.set(settings::OPERATOR_PUBKEY, &hex_id(Q)).await.unwrap();
  let outcome = f.stores.apply_retention(MARCH_10, &CancellationToken::new()).await.unwrap();
  assert_eq!(outcome.map(|o| o.deleted), Some(1));
  assert_eq!(f.relay.ids(), [3, 4]);
}

// ─── process_deletion_requests ───────────────────────────────────────────────

#[tokio::test]
async fn admin_requests_are_always_processed() {
  let f = Fixture::seeded([Seed::new(1, P, MARCH_10, 1), Seed::new(2, Q, MARCH_10, 1)]).await;
  let control = f.stores.control();
  let id = control
    .enqueue(&NewDeletionRequest::admin(hex_id(2), "admin", Some("spam".into())))
    .await
    .unwrap();

  let summary = f.stores.process_deletion_requests(&CancellationToken::new()).await.unwrap();
  assert_eq!(summary, ProcessSummary { processed: 1, failed: 0, deferred: 0, deleted: 1 });
  assert_eq!(f.relay.ids(), [1]);

  let request = control.get_deletion_request(id).await.unwrap().unwrap();
  assert_eq!(request.status, DeletionStatus::Processed);
  assert_eq!(request.deleted_count, 1);
  assert!(request.processed_at.is_some());
}

#[tokio::test]
async fn protocol_requests_wait_for_policy_and_respect_authorship() {
  let f = Fixture::seeded([Seed::new(1, P, MARCH_10, 1), Seed::new(2, Q, MARCH_10, 1)]).await;
  let control = f.stores.control();
  let id = control
    .enqueue(&NewDeletionRequest {
      event_id:     hex_id(0xd1),
      requested_by: hex_id(P),
      target_ids:   vec![hex_id(1), hex_id(2)],
      reason:       None,
    })
    .await
    .unwrap();

  let cancel = CancellationToken::new();
  let summary = f.stores.process_deletion_requests(&cancel).await.unwrap();
  assert_eq!(summary.deferred, 1);
  assert_eq!(f.relay.ids(), [1, 2]);
  assert_eq!(
    control.get_deletion_request(id).await.unwrap().unwrap().status,
    DeletionStatus::Pending
  );

  control
    .save_retention_policy(&RetentionPolicy { honor_deletion_requests: true, ..Default::default() })
    .await
    .unwrap();
  let summary = f.stores.process_deletion_requests(&cancel).await.unwrap();
  assert_eq!(summary, ProcessSummary { processed: 1, failed: 0, deferred: 0, deleted: 1 });
  assert_eq!(f.relay.ids(), [2]);
}

#[tokio::test]
async fn failing_request_is_marked_failed_and_others_continue() {
  let f = Fixture::seeded([Seed::new(1, P, MARCH_10, 1)]).await;
  let control = f.stores.control();
  control
    .save_retention_policy(&RetentionPolicy { honor_deletion_requests: true, ..Default::default() })
    .await
    .unwrap();
  let bad = control
    .enqueue(&NewDeletionRequest {
      event_id:     hex_id(0xd2),
      requested_by: "not-a-pubkey".into(),
      target_ids:   vec![hex_id(1)],
      reason:       None,
    })
    .await
    .unwrap();
  let good = control
    .enqueue(&NewDeletionRequest::admin(hex_id(1), "admin", None))
    .await
    .unwrap();

  let summary = f.stores.process_deletion_requests(&CancellationToken::new()).await.unwrap();
  assert_eq!(summary, ProcessSummary { processed: 1, failed: 1, deferred: 0, deleted: 1 });

  let bad = control.get_deletion_request(bad).await.unwrap().unwrap();
  assert_eq!(bad.status, DeletionStatus::Failed);
  assert_eq!(bad.deleted_count, 0);
  let good = control.get_deletion_request(good).await.unwrap().unwrap();
  assert_eq!(good.status, DeletionStatus::Processed);
  assert!(control.list_pending().await.unwrap().is_empty());
}

#[tokio::test]
async fn empty_queue_does_not_open_the_event_store() {
  let dir = tempfile::tempdir().unwrap();
  let stores = super::open_stores(dir.path()).await;
  let summary = stores.process_deletion_requests(&CancellationToken::new()).await.unwrap();
  assert_eq!(summary, ProcessSummary::default());
}

// ─── collect_deletion_requests ───────────────────────────────────────────────

fn e_tag(byte: u8) -> [String; 2] { ["e".to_owned(), hex_id(byte)] }

#[tokio::test]
async fn deletion_events_are_queued_once_and_honoured_by_author() {
  let f = Fixture::seeded([
    Seed::new(1, P, MARCH_10, 1),
    Seed::new(2, Q, MARCH_10, 1),
    Seed::new(0xd1, P, MARCH_10 + 10, 5).content("oops").tag(e_tag(1)).tag(e_tag(2)),
    Seed::new(0xd2, Q, MARCH_10 + 20, 5).content("no targets"),
    Seed::new(0xd3, Q, MARCH_10 - DAY, 5).tag(e_tag(2)),
  ])
  .await;
  let cancel = CancellationToken::new();

  let summary = f.stores.collect_deletion_requests(None, &cancel).await.unwrap();
  assert_eq!(summary, CollectSummary { scanned: 3, queued: 2, already_queued: 0, ignored: 1 });

  let again = f.stores.collect_deletion_requests(Some(MARCH_10), &cancel).await.unwrap();
  assert_eq!(again, CollectSummary { scanned: 2, queued: 0, already_queued: 1, ignored: 1 });

  let control = f.stores.control();
  let pending = control.list_pending().await.unwrap();
  assert_eq!(pending.len(), 2);
  assert_eq!(pending[0].event_id, hex_id(0xd3));
  assert_eq!(pending[1].event_id, hex_id(0xd1));
  assert_eq!(pending[1].requested_by, hex_id(P));
  assert_eq!(pending[1].target_ids, [hex_id(1), hex_id(2)]);
  assert_eq!(pending[1].reason.as_deref(), Some("oops"));

  control
    .save_retention_policy(&RetentionPolicy { honor_deletion_requests: true, ..Default::default() })
    .await
    .unwrap();
  let processed = f.stores.process_deletion_requests(&cancel).await.unwrap();
  assert_eq!(processed, ProcessSummary { processed: 2, failed: 0, deferred: 0, deleted: 2 });
  assert_eq!(f.relay.ids(), [0xd1, 0xd2, 0xd3]);
}

#[tokio::test]
async fn collecting_stops_on_cancel() {
  let f = Fixture::seeded([Seed::new(0xd1, P, MARCH_10, 5).tag(e_tag(1))]).await;
  let cancel = CancellationToken::new();
  cancel.cancel();

  let err = f.stores.collect_deletion_requests(None, &cancel).await.unwrap_err();
  assert!(matches!(err, Error::Cancelled));
  assert!(f.stores.control().list_pending().await.unwrap().is_empty());
}
