//! Integration tests for the write → invalidate → publish path.

use std::sync::Arc;
use std::time::Duration;

use herald_core::{ChangeEvent, HeraldError, NotificationDraft, NotificationId, UserId};
use herald_storage::NotificationStore;
use herald_test_utils::assertions::{assert_newest_first, titles};
use herald_test_utils::fixtures::draft;
use herald_test_utils::generators::arb_draft;
use proptest::prelude::*;

#[path = "support/harness.rs"]
mod test_harness;
use test_harness::harness;

fn info(title: &str) -> NotificationDraft {
    draft(title, &format!("{} message", title), "info")
}

#[tokio::test]
async fn test_create_then_read_is_fresh_and_ordered() {
    let h = harness();
    let user = UserId::now_v7();
    let mut sub = h.broadcast.attach();

    // Warm the cache with the empty snapshot.
    let empty = h.processor.snapshot(user).await.unwrap();
    assert!(empty.value().is_empty());
    assert_eq!(h.cache.len(), 1);

    let a = h.processor.create(user, &info("A")).await.unwrap();
    assert!(h.cache.is_empty(), "create must drop the cached snapshot");
    let b = h.processor.create(user, &info("B")).await.unwrap();

    assert_eq!(h.store.inner().len(), 2);
    let first = sub.try_recv().unwrap();
    let second = sub.try_recv().unwrap();
    assert_eq!(first.event, ChangeEvent::Created { notification: a });
    assert_eq!(second.event, ChangeEvent::Created { notification: b });
    assert!(first.seq < second.seq);

    let read = h.processor.snapshot(user).await.unwrap();
    assert!(read.was_cache_miss());
    assert_eq!(titles(read.value()), vec!["B", "A"]);

    let again = h.processor.snapshot(user).await.unwrap();
    assert!(again.was_cache_hit());
    assert_eq!(titles(again.value()), vec!["B", "A"]);
}

#[tokio::test]
async fn test_set_read_on_missing_id_is_silent() {
    let h = harness();
    let user = UserId::now_v7();
    let mut sub = h.broadcast.attach();
    let missing = NotificationId::now_v7();

    let err = h.processor.set_read(missing, user, true).await.unwrap_err();

    assert_eq!(err, HeraldError::NotFound { id: missing });
    assert_eq!(h.cache.invalidate_calls(), 0);
    assert!(sub.try_recv().is_none());
}

#[tokio::test]
async fn test_other_users_notification_is_not_found() {
    let h = harness();
    let owner = UserId::now_v7();
    let intruder = UserId::now_v7();
    let mut sub = h.broadcast.attach();

    let created = h.processor.create(owner, &info("mine")).await.unwrap();
    sub.try_recv().unwrap();

    assert!(matches!(
        h.processor.delete(created.id, intruder).await,
        Err(HeraldError::NotFound { .. })
    ));
    assert!(matches!(
        h.processor.set_read(created.id, intruder, true).await,
        Err(HeraldError::NotFound { .. })
    ));
    assert!(sub.try_recv().is_none());
    assert_eq!(h.store.inner().len(), 1);
}

#[tokio::test]
async fn test_store_failure_emits_nothing() {
    let h = harness();
    let user = UserId::now_v7();
    let mut sub = h.broadcast.attach();
    h.processor.snapshot(user).await.unwrap();
    h.store.fail_writes(true);

    let err = h.processor.create(user, &info("lost")).await.unwrap_err();

    assert!(matches!(err, HeraldError::StoreUnavailable { .. }));
    assert!(sub.try_recv().is_none());
    assert_eq!(h.cache.invalidate_calls(), 0);
    // The cached empty snapshot is still correct.
    assert!(h.processor.snapshot(user).await.unwrap().was_cache_hit());
}

#[tokio::test]
async fn test_validation_failure_touches_nothing() {
    let h = harness();
    let user = UserId::now_v7();
    let mut sub = h.broadcast.attach();

    let err = h
        .processor
        .create(user, &draft("", "body", "info"))
        .await
        .unwrap_err();

    assert!(matches!(err, HeraldError::Validation(_)));
    assert!(h.store.inner().is_empty());
    assert!(sub.try_recv().is_none());
}

#[tokio::test]
async fn test_invalidation_failure_still_broadcasts() {
    let h = harness();
    let user = UserId::now_v7();
    let mut sub = h.broadcast.attach();
    h.cache.fail_invalidations(true);

    let created = h.processor.create(user, &info("A")).await.unwrap();

    assert_eq!(h.cache.invalidate_calls(), 1);
    let envelope = sub.try_recv().unwrap();
    assert_eq!(envelope.event.notification_id(), created.id);
}

#[tokio::test]
async fn test_caller_timeout_after_write_still_invalidates_and_publishes() {
    let h = harness();
    let user = UserId::now_v7();
    let mut sub = h.broadcast.attach();
    assert!(h.processor.snapshot(user).await.unwrap().value().is_empty());
    h.cache.delay_invalidations(Duration::from_millis(100));

    let outcome =
        tokio::time::timeout(Duration::from_millis(20), h.processor.create(user, &info("A")))
            .await;
    assert!(outcome.is_err(), "caller gave up while invalidate was pending");

    let envelope = tokio::time::timeout(Duration::from_secs(2), sub.recv())
        .await
        .expect("Created was never published")
        .unwrap();
    assert!(matches!(envelope.event, ChangeEvent::Created { .. }));
    assert_eq!(h.cache.invalidate_calls(), 1);

    let read = h.processor.snapshot(user).await.unwrap();
    assert!(read.was_cache_miss());
    assert_eq!(titles(read.value()), vec!["A"]);
}

#[tokio::test]
async fn test_broken_cache_reads_fall_through_to_store() {
    let h = harness();
    let user = UserId::now_v7();
    h.processor.create(user, &info("A")).await.unwrap();
    h.cache.fail_gets(true);

    let read = h.processor.snapshot(user).await.unwrap();

    assert!(read.was_cache_miss());
    assert_eq!(titles(read.value()), vec!["A"]);
}

#[tokio::test]
async fn test_update_then_delete_lifecycle() {
    let h = harness();
    let user = UserId::now_v7();
    let mut sub = h.broadcast.attach();

    let created = h.processor.create(user, &info("A")).await.unwrap();
    h.processor.snapshot(user).await.unwrap();

    let updated = h.processor.set_read(created.id, user, true).await.unwrap();
    assert!(updated.read);
    assert!(h.cache.is_empty());
    let read = h.processor.snapshot(user).await.unwrap();
    assert!(read.value()[0].read);

    h.processor.delete(created.id, user).await.unwrap();
    assert!(h.processor.snapshot(user).await.unwrap().value().is_empty());

    let kinds: Vec<_> = std::iter::from_fn(|| sub.try_recv())
        .map(|e| e.event.event_type())
        .collect();
    assert_eq!(kinds, vec!["created", "updated", "deleted"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_publish_in_write_order() {
    let h = harness();
    let user = UserId::now_v7();
    let mut sub = h.broadcast.attach();

    let mut handles = Vec::new();
    for i in 0..32 {
        let processor = Arc::clone(&h.processor);
        handles.push(tokio::spawn(async move {
            processor.create(user, &info(&format!("n{}", i))).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let events: Vec<_> = std::iter::from_fn(|| sub.try_recv()).collect();
    assert_eq!(events.len(), 32);
    let timestamps: Vec<_> = events
        .iter()
        .map(|e| match &e.event {
            ChangeEvent::Created { notification } => notification.timestamp,
            other => panic!("unexpected event {:?}", other),
        })
        .collect();
    assert!(timestamps.windows(2).all(|w| w[0] < w[1]));

    let snapshot = h.processor.snapshot(user).await.unwrap().into_value();
    assert_eq!(snapshot.len(), 32);
    assert_newest_first(&snapshot);
}

#[tokio::test]
async fn test_create_for_all_fans_out() {
    let h = harness();
    let users = [UserId::now_v7(), UserId::now_v7(), UserId::now_v7()];
    let mut sub = h.broadcast.attach();

    let created = h
        .processor
        .create_for_all(&users, &draft("Maintenance", "Tonight", "alert"))
        .await
        .unwrap();

    assert_eq!(created.len(), 3);
    for (user, notification) in users.iter().zip(&created) {
        assert_eq!(notification.user_id, *user);
        let snapshot = h.processor.snapshot(*user).await.unwrap().into_value();
        assert_eq!(titles(&snapshot), vec!["Maintenance"]);
    }
    let recipients: Vec<_> = std::iter::from_fn(|| sub.try_recv())
        .map(|e| e.event.user_id())
        .collect();
    assert_eq!(recipients, users.to_vec());
}

#[tokio::test]
async fn test_create_for_all_stops_at_store_failure() {
    let h = harness();
    let users = [UserId::now_v7(), UserId::now_v7(), UserId::now_v7()];
    let mut sub = h.broadcast.attach();
    h.store.fail_inserts_after(1);

    let err = h
        .processor
        .create_for_all(&users, &info("partial"))
        .await
        .unwrap_err();

    assert!(matches!(err, HeraldError::StoreUnavailable { .. }));
    assert_eq!(h.store.inner().len(), 1);
    let events: Vec<_> = std::iter::from_fn(|| sub.try_recv()).collect();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event.user_id(), users[0]);
}

#[tokio::test]
async fn test_create_for_nobody_is_empty() {
    let h = harness();
    let created = h.processor.create_for_all(&[], &info("x")).await.unwrap();
    assert!(created.is_empty());
}

// ============================================================================
// PROPERTY TESTS
// ============================================================================

#[derive(Debug, Clone)]
enum Op {
    Create(NotificationDraft),
    Toggle(usize),
    Delete(usize),
    Read,
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => arb_draft().prop_map(Op::Create),
        2 => any::<usize>().prop_map(Op::Toggle),
        1 => any::<usize>().prop_map(Op::Delete),
        2 => Just(Op::Read),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Reads through the cache always match the store after any mutation sequence.
    #[test]
    fn prop_snapshot_matches_store(ops in prop::collection::vec(arb_op(), 1..24)) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let h = harness();
            let user = UserId::now_v7();

            for op in ops {
                let current = h.store.find_by_user(user).await.unwrap();
                match op {
                    Op::Create(d) => {
                        h.processor.create(user, &d).await.unwrap();
                    }
                    Op::Toggle(i) if !current.is_empty() => {
                        let target = &current[i % current.len()];
                        h.processor.set_read(target.id, user, !target.read).await.unwrap();
                    }
                    Op::Delete(i) if !current.is_empty() => {
                        let target = &current[i % current.len()];
                        h.processor.delete(target.id, user).await.unwrap();
                    }
                    _ => {}
                }

                let cached = h.processor.snapshot(user).await.unwrap().into_value();
                let stored = h.store.find_by_user(user).await.unwrap();
                prop_assert_eq!(cached, stored);
            }
            Ok(())
        })?;
    }
}
