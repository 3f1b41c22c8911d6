// tests/metadata_sync.rs

mod common;
use crate::common::init_tracing;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use pitrix::BoxFuture;
use pitrix::errors::PitrixError;
use pitrix::provider::StopSignal;
use pitrix::store::{MemoryStore, MetadataStore, spawn_sync};

/// Store whose backend never comes up: every call fails.
#[derive(Debug, Default)]
struct UnreachableStore {
    reads: AtomicUsize,
}

impl UnreachableStore {
    fn unreachable() -> PitrixError {
        PitrixError::IoError(std::io::Error::other("metadata backend unreachable"))
    }
}

impl MetadataStore for UnreachableStore {
    fn put<'a>(&'a self, _key: &'a str, _value: &'a str) -> BoxFuture<'a> {
        Box::pin(async { Err(Self::unreachable()) })
    }

    fn get<'a>(&'a self, _key: &'a str) -> BoxFuture<'a, Option<String>> {
        Box::pin(async { Err(Self::unreachable()) })
    }

    fn get_prefix<'a>(&'a self, _prefix: &'a str) -> BoxFuture<'a, BTreeMap<String, String>> {
        Box::pin(async move {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Err(Self::unreachable())
        })
    }

    fn delete<'a>(&'a self, _key: &'a str) -> BoxFuture<'a, usize> {
        Box::pin(async { Err(Self::unreachable()) })
    }
}

#[tokio::test]
async fn sync_publishes_changes_and_stops_on_signal() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    store.put("/clusters/cl-1/cluster/app_id", "app-1").await.unwrap();
    store.put("/clusters/cl-2/cluster/app_id", "app-2").await.unwrap();

    let stop = StopSignal::new();
    let mut handle = spawn_sync(
        store.clone(),
        "/clusters/cl-1".to_string(),
        Duration::from_millis(10),
        stop.clone(),
    );

    tokio::time::timeout(Duration::from_secs(2), handle.snapshots.changed())
        .await
        .expect("first snapshot")
        .unwrap();
    {
        let snapshot = handle.snapshots.borrow_and_update();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot["/clusters/cl-1/cluster/app_id"], "app-1");
    }

    store.put("/clusters/cl-1/env/port", "8080").await.unwrap();
    tokio::time::timeout(Duration::from_secs(2), handle.snapshots.changed())
        .await
        .expect("updated snapshot")
        .unwrap();
    assert_eq!(handle.snapshots.borrow()["/clusters/cl-1/env/port"], "8080");

    stop.stop();
    tokio::time::timeout(Duration::from_secs(1), handle.task)
        .await
        .expect("sync loop must exit promptly")
        .unwrap();
}

#[tokio::test]
async fn sync_exits_during_a_long_pause() {
    let store: Arc<dyn MetadataStore> = Arc::new(MemoryStore::new());
    let stop = StopSignal::new();
    let handle = spawn_sync(
        store,
        "/clusters".to_string(),
        Duration::from_secs(3600),
        stop.clone(),
    );

    tokio::time::sleep(Duration::from_millis(20)).await;
    stop.stop();
    tokio::time::timeout(Duration::from_secs(1), handle.task)
        .await
        .expect("stop must interrupt the pause")
        .unwrap();
}

#[tokio::test]
async fn sync_exits_while_retrying_a_failed_first_read() {
    let store = Arc::new(UnreachableStore::default());
    let stop = StopSignal::new();
    let handle = spawn_sync(
        store.clone(),
        "/clusters".to_string(),
        Duration::from_millis(10),
        stop.clone(),
    );

    // Let a few reads fail so the loop is in its retry cycle.
    tokio::time::timeout(Duration::from_secs(2), async {
        while store.reads.load(Ordering::SeqCst) < 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("sync loop must keep retrying");

    stop.stop();
    tokio::time::timeout(Duration::from_secs(1), handle.task)
        .await
        .expect("stop must end the retry loop")
        .unwrap();
    assert!(handle.snapshots.borrow().is_empty());
}
