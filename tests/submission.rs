// tests/submission.rs
//
// At-most-once dispatch: concurrent coordinators racing for the same item
// dispatch it exactly once; failed dispatches are final.

mod common;

use std::sync::Arc;

use common::{new_item, MockPlatform};
use content_curator::model::{Category, InsertOutcome, SourceSeed, SubmissionStatus};
use content_curator::store::{ContentStore, InMemoryStore, SqliteStore};
use content_curator::submit::{SubmissionCoordinator, SubmitOutcome};

async fn race(store: Arc<dyn ContentStore>) {
    let source = store
        .upsert_source(&SourceSeed::new("Blog", "https://blog.example.com"))
        .await
        .unwrap();
    let id = match store
        .insert_item(&new_item("https://blog.example.com/race", 0.8, Category::CaseStudy, source))
        .await
        .unwrap()
    {
        InsertOutcome::Inserted(id) => id,
        other => panic!("unexpected insert outcome: {other:?}"),
    };
    let item = store.get_item(id).await.unwrap().unwrap();

    let platform = Arc::new(MockPlatform::new());
    let a = SubmissionCoordinator::new(store.clone(), platform.clone());
    let b = SubmissionCoordinator::new(store.clone(), platform.clone());

    let (ra, rb) = tokio::join!(a.submit(&item), b.submit(&item));
    let outcomes = [ra.unwrap(), rb.unwrap()];

    assert_eq!(platform.calls(), 1);
    assert_eq!(outcomes.iter().filter(|o| o.is_submitted()).count(), 1);
    assert_eq!(
        outcomes
            .iter()
            .filter(|o| matches!(o, SubmitOutcome::Skipped))
            .count(),
        1
    );

    let stored = store.get_item(id).await.unwrap().unwrap();
    assert!(stored.processed);
    assert_eq!(stored.status, SubmissionStatus::Submitted);
    assert_eq!(store.recent_submissions(10).await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn racing_coordinators_dispatch_once_in_memory() {
    race(Arc::new(InMemoryStore::new())).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn racing_coordinators_dispatch_once_in_sqlite() {
    race(Arc::new(SqliteStore::open_in_memory().await.unwrap())).await;
}

#[tokio::test]
async fn failed_dispatch_is_recorded_and_not_retried() {
    let store: Arc<dyn ContentStore> = Arc::new(InMemoryStore::new());
    let url = "https://blog.example.com/fails";
    let InsertOutcome::Inserted(id) = store
        .insert_item(&new_item(url, 0.9, Category::IndustryNews, 1))
        .await
        .unwrap()
    else {
        panic!("insert failed");
    };
    let item = store.get_item(id).await.unwrap().unwrap();

    let platform = Arc::new(MockPlatform::failing_for(&[url]));
    let coord = SubmissionCoordinator::new(store.clone(), platform.clone());

    let first = coord.submit(&item).await.unwrap();
    assert!(!first.is_submitted());
    match &first {
        SubmitOutcome::Dispatched(rec) => {
            assert_eq!(rec.status, SubmissionStatus::DispatchFailed);
            assert!(rec.error.as_deref().unwrap().contains("workflow unavailable"));
        }
        SubmitOutcome::Skipped => panic!("first submit must dispatch"),
    }

    let second = coord.submit(&item).await.unwrap();
    assert_eq!(second, SubmitOutcome::Skipped);
    assert_eq!(platform.calls(), 1);

    let stored = store.get_item(id).await.unwrap().unwrap();
    assert_eq!(stored.status, SubmissionStatus::DispatchFailed);
    assert!(store.get_unprocessed_items(0.0).await.unwrap().is_empty());
}
