//! Cache behavior against a counting backend.

mod common;

use common::{global, CountingStore};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use warden_data::{DataStore, ImmutableSubjectData};
use warden_runtime::{CacheError, DataListener, ListenerMode, SubjectDataCache, Tier};
use warden_types::{ErrorCode, SubjectKind, SubjectType};

fn cache_over(store: Arc<CountingStore>) -> Arc<SubjectDataCache> {
    let kind: Arc<dyn SubjectKind> =
        Arc::new(SubjectType::<String>::string_builder("user").build());
    Arc::new(SubjectDataCache::new(kind, Tier::Persistent, store))
}

fn counter_of(data: &ImmutableSubjectData) -> u32 {
    data.segment(&global())
        .option("counter")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

fn increment(data: ImmutableSubjectData) -> ImmutableSubjectData {
    let next = counter_of(&data) + 1;
    data.with_segment(global(), |s| s.with_option("counter", next.to_string()))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_reads_share_one_load() {
    let store = CountingStore::new();
    store.set_load_delay(Duration::from_millis(50));
    let cache = cache_over(store.clone());

    let reads: Vec<_> = (0..16)
        .map(|_| {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.data("alice").await })
        })
        .collect();
    for read in reads {
        read.await.expect("task").expect("load");
    }

    assert_eq!(store.loads(), 1);
    cache.data("alice").await.expect("cached");
    assert_eq!(store.loads(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_updates_are_not_lost() {
    let store = CountingStore::new();
    store
        .save(
            "user",
            "bob",
            &ImmutableSubjectData::new().with_segment(global(), |s| s.with_option("counter", "5")),
        )
        .await
        .expect("seed");
    let cache = cache_over(store.clone());

    const N: u32 = 32;
    let updates: Vec<_> = (0..N)
        .map(|_| {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.update("bob", increment).await })
        })
        .collect();
    for update in updates {
        update.await.expect("task").expect("update");
    }

    assert_eq!(counter_of(&cache.data("bob").await.expect("data")), N + 5);
    assert_eq!(
        counter_of(&store.load("user", "bob").await.expect("stored")),
        N + 5
    );
}

#[tokio::test]
async fn failed_write_is_not_applied() {
    let store = CountingStore::new();
    let cache = cache_over(store.clone());
    let fired = Arc::new(AtomicUsize::new(0));
    let hits = Arc::clone(&fired);
    let listener: Arc<DataListener> = Arc::new(move |_, _| {
        hits.fetch_add(1, Ordering::SeqCst);
    });
    cache.add_listener("carol", listener, ListenerMode::Strong);

    let before = cache.update("carol", increment).await.expect("first update");
    store.fail_writes(true);

    let err = cache
        .update("carol", increment)
        .await
        .expect_err("backend rejects");
    assert!(matches!(err, CacheError::Store(_)));
    assert_eq!(err.code(), "CACHE_STORE");
    assert!(cache.remove("carol").await.is_err());

    assert_eq!(cache.cached("carol"), Some(before.clone()));
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    store.fail_writes(false);
    let after = cache.update("carol", increment).await.expect("recovered");
    assert_eq!(counter_of(&after), counter_of(&before) + 1);
    assert_eq!(fired.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn every_listener_fires_once_per_change() {
    let cache = cache_over(CountingStore::new());
    let fired = Arc::new(AtomicUsize::new(0));
    let mut keep = Vec::new();
    for mode in [ListenerMode::Strong, ListenerMode::Weak, ListenerMode::Strong] {
        let hits = Arc::clone(&fired);
        let listener: Arc<DataListener> = Arc::new(move |id, _| {
            assert_eq!(id, "dave");
            hits.fetch_add(1, Ordering::SeqCst);
        });
        cache.add_listener("dave", Arc::clone(&listener), mode);
        keep.push(listener);
    }

    cache.update("dave", increment).await.expect("update");
    assert_eq!(fired.load(Ordering::SeqCst), 3);
    cache.update("erin", increment).await.expect("other subject");
    assert_eq!(fired.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn weak_listener_dropped_by_owner_goes_quiet() {
    let cache = cache_over(CountingStore::new());
    let fired = Arc::new(AtomicUsize::new(0));
    let hits = Arc::clone(&fired);
    let listener: Arc<DataListener> = Arc::new(move |_, _| {
        hits.fetch_add(1, Ordering::SeqCst);
    });
    cache.add_listener("frank", Arc::clone(&listener), ListenerMode::Weak);

    cache.update("frank", increment).await.expect("update");
    drop(listener);
    cache.update("frank", increment).await.expect("update");

    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert_eq!(cache.listener_count("frank"), 0);
}

#[tokio::test]
async fn remove_fires_empty_and_returns_previous() {
    let store = CountingStore::new();
    let cache = cache_over(store.clone());
    let last_empty = Arc::new(AtomicUsize::new(0));
    let flag = Arc::clone(&last_empty);
    let listener: Arc<DataListener> = Arc::new(move |_, data| {
        flag.store(usize::from(data.is_empty()), Ordering::SeqCst);
    });
    cache.add_listener("gina", listener, ListenerMode::Strong);

    let written = cache.update("gina", increment).await.expect("update");
    assert!(cache.is_registered("gina").await.expect("query"));

    let previous = cache.remove("gina").await.expect("remove");
    assert_eq!(previous, written);
    assert_eq!(last_empty.load(Ordering::SeqCst), 1);
    assert!(!cache.is_registered("gina").await.expect("query"));
    assert!(cache.data("gina").await.expect("data").is_empty());
}

#[tokio::test]
async fn invalidate_reloads_from_store() {
    let store = CountingStore::new();
    let cache = cache_over(store.clone());
    cache.data("hank").await.expect("load");
    cache.data("hank").await.expect("cached");
    assert_eq!(store.loads(), 1);

    cache.invalidate("hank").await;
    cache.data("hank").await.expect("reload");
    assert_eq!(store.loads(), 2);
}
