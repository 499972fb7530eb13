// Expectation change log: replay, triage log, undo and incomplete changes.

mod common;

use common::fixtures::over;
use common::{Fault, FaultyStore, Stores, labels};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tryjob_core::Label;
use tryjob_metadata::models::{EXP_CHANGE_KIND, TEST_DIGEST_EXP_KIND};
use tryjob_metadata::{ExpectationRepo, MetadataError};
use tryjob_storage::{DocumentStore, Key, KeyId, Kind, MemoryStore, Query};

async fn count_kind(store: &dyn DocumentStore, kind: Kind) -> usize {
    store
        .query(&Query::new("gold-test", kind).keys_only())
        .await
        .unwrap()
        .len()
}

/// Wait for the background cleanup of a failed change to finish.
async fn wait_until_no_changes(store: &dyn DocumentStore) -> bool {
    for _ in 0..200 {
        if count_kind(store, EXP_CHANGE_KIND).await == 0
            && count_kind(store, TEST_DIGEST_EXP_KIND).await == 0
        {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Write an incomplete change directly, bypassing `add_change`.
async fn put_incomplete_change(
    store: &dyn DocumentStore,
    id: i64,
    issue_id: i64,
    timestamp_ms: i64,
    label: &str,
) {
    let key = Key::id("gold-test", EXP_CHANGE_KIND, id);
    store
        .put(
            &key,
            json!({"issue_id": issue_id, "user_id": "x@x.com", "timestamp_ms": timestamp_ms, "ok": false}),
        )
        .await
        .unwrap();
    store
        .put(
            &key.child(TEST_DIGEST_EXP_KIND, KeyId::Id(id)).unwrap(),
            json!({"name": "blur", "digest": "d1", "label": label}),
        )
        .await
        .unwrap();
}

fn now_ms() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

#[tokio::test]
async fn test_later_change_wins() {
    let stores = Stores::new().await;
    for store in stores.all() {
        store
            .add_change(1, &labels(&[("blur", "d1", Label::Positive)]), "a@x.com")
            .await
            .unwrap();
        store
            .add_change(
                1,
                &labels(&[("blur", "d1", Label::Negative), ("blur", "d2", Label::Positive)]),
                "b@x.com",
            )
            .await
            .unwrap();
        store
            .add_change(2, &labels(&[("blur", "d1", Label::Positive)]), "a@x.com")
            .await
            .unwrap();

        let exp = store.get_expectations(1).await.unwrap();
        assert_eq!(exp.classification("blur", "d1"), Label::Negative);
        assert_eq!(exp.classification("blur", "d2"), Label::Positive);
        assert_eq!(exp.len(), 2);

        let other = store.get_expectations(2).await.unwrap();
        assert_eq!(other.classification("blur", "d1"), Label::Positive);
    }
}

#[tokio::test]
async fn test_incomplete_changes_are_ignored() {
    let stores = Stores::new().await;
    for store in stores.all() {
        let documents = store.document_store().as_ref();
        put_incomplete_change(documents, 5_000, 1, 0, "negative").await;
        store
            .add_change(1, &labels(&[("blur", "d1", Label::Positive)]), "a@x.com")
            .await
            .unwrap();
        put_incomplete_change(documents, 5_001, 1, now_ms() + 60_000, "negative").await;

        let exp = store.get_expectations(1).await.unwrap();
        assert_eq!(exp.classification("blur", "d1"), Label::Positive);

        let (entries, total) = store.query_log(1, 0, 10, false).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(entries.len(), 1);
    }
}

#[tokio::test]
async fn test_empty_change_rejected() {
    let stores = Stores::new().await;
    for store in stores.all() {
        let result = store.add_change(1, &labels(&[]), "a@x.com").await;
        assert!(matches!(result, Err(MetadataError::Validation(_))));
        assert_eq!(count_kind(store.document_store().as_ref(), EXP_CHANGE_KIND).await, 0);
    }
}

#[tokio::test]
async fn test_query_log_pages_newest_first() {
    let stores = Stores::new().await;
    for store in stores.all() {
        let mut ids = Vec::new();
        for (user, triples) in [
            ("a@x.com", vec![("blur", "d1", Label::Positive)]),
            ("b@x.com", vec![("blur", "d1", Label::Negative), ("blur", "d2", Label::Positive)]),
            ("c@x.com", vec![("shadow", "s1", Label::Positive)]),
        ] {
            ids.push(store.add_change(9, &labels(&triples), user).await.unwrap());
        }

        let (page, total) = store.query_log(9, 0, 2, false).await.unwrap();
        assert_eq!(total, 3);
        let page_ids: Vec<i64> = page.iter().map(|e| e.change_id).collect();
        assert_eq!(page_ids, [ids[2], ids[1]]);
        assert_eq!(page[0].user_id, "c@x.com");
        assert_eq!(page[1].change_count, 2);
        assert!(page.iter().all(|e| e.details.is_empty()));

        let (page, total) = store.query_log(9, 2, 2, true).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].change_id, ids[0]);
        assert_eq!(page[0].details.len(), 1);
        assert_eq!(page[0].details[0].label, Label::Positive);

        let (page, total) = store.query_log(9, 10, 2, false).await.unwrap();
        assert!(page.is_empty());
        assert_eq!(total, 3);

        assert!(matches!(
            store.query_log(9, 0, 0, false).await,
            Err(MetadataError::Validation(_))
        ));
    }
}

#[tokio::test]
async fn test_undo_restores_prior_labels() {
    let stores = Stores::new().await;
    for store in stores.all() {
        store
            .add_change(3, &labels(&[("blur", "a", Label::Positive)]), "a@x.com")
            .await
            .unwrap();
        let second = store
            .add_change(
                3,
                &labels(&[("blur", "a", Label::Negative), ("blur", "b", Label::Positive)]),
                "b@x.com",
            )
            .await
            .unwrap();

        let restored = store.undo_change(3, second, "admin@x.com").await.unwrap();
        assert_eq!(
            restored,
            labels(&[("blur", "a", Label::Positive), ("blur", "b", Label::Untriaged)])
        );

        let exp = store.get_expectations(3).await.unwrap();
        assert_eq!(exp.classification("blur", "a"), Label::Positive);
        assert_eq!(exp.classification("blur", "b"), Label::Untriaged);

        let (log, total) = store.query_log(3, 0, 1, false).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(log[0].user_id, "admin@x.com");
    }
}

#[tokio::test]
async fn test_undo_unknown_change_is_not_found() {
    let stores = Stores::new().await;
    for store in stores.all() {
        let id = store
            .add_change(3, &labels(&[("blur", "a", Label::Positive)]), "a@x.com")
            .await
            .unwrap();

        assert!(matches!(
            store.undo_change(3, id + 1000, "admin@x.com").await,
            Err(MetadataError::NotFound(_))
        ));
        assert!(matches!(
            store.undo_change(4, id, "admin@x.com").await,
            Err(MetadataError::NotFound(_))
        ));
    }
}

#[tokio::test]
async fn test_failed_triples_write_is_cleaned_up() {
    let inner: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let store = over(FaultyStore::new(
        Arc::clone(&inner),
        vec![Fault::PutMulti(TEST_DIGEST_EXP_KIND)],
    ));

    let result = store
        .add_change(1, &labels(&[("blur", "d1", Label::Positive)]), "a@x.com")
        .await;
    match result {
        Err(MetadataError::Storage(err)) => assert!(err.to_string().contains("put_multi")),
        other => panic!("unexpected result: {other:?}"),
    }

    assert!(wait_until_no_changes(inner.as_ref()).await);
    assert!(store.get_expectations(1).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_completion_is_cleaned_up() {
    let inner: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let store = over(FaultyStore::new(
        Arc::clone(&inner),
        vec![Fault::CompleteChange],
    ));

    let result = store
        .add_change(1, &labels(&[("blur", "d1", Label::Positive)]), "a@x.com")
        .await;
    assert!(matches!(result, Err(MetadataError::Storage(_))));

    assert!(wait_until_no_changes(inner.as_ref()).await);
}

#[tokio::test]
async fn test_purge_removes_only_stale_incomplete_changes() {
    let stores = Stores::new().await;
    for store in stores.all() {
        let documents = store.document_store().as_ref();
        store
            .add_change(1, &labels(&[("blur", "d1", Label::Positive)]), "a@x.com")
            .await
            .unwrap();
        put_incomplete_change(documents, 7_000, 1, 1_000, "negative").await;
        put_incomplete_change(documents, 7_001, 2, now_ms(), "negative").await;

        let removed = store.purge_abandoned_changes().await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(count_kind(documents, EXP_CHANGE_KIND).await, 2);
        assert_eq!(count_kind(documents, TEST_DIGEST_EXP_KIND).await, 2);

        let removed = store
            .purge_incomplete_changes(OffsetDateTime::now_utc() + time::Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(count_kind(documents, EXP_CHANGE_KIND).await, 1);

        let exp = store.get_expectations(1).await.unwrap();
        assert_eq!(exp.classification("blur", "d1"), Label::Positive);
    }
}
