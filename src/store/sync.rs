// src/store/sync.rs

//! Background mirroring of a store prefix.
//!
//! The sync loop reads the prefix at a fixed interval and publishes a snapshot
//! whenever it changes. Failed reads are retried at the same interval. The
//! loop exits as soon as the stop signal fires, including in the middle of a
//! retry pause.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::provider::StopSignal;
use crate::store::MetadataStore;

pub type Snapshot = BTreeMap<String, String>;

/// Handle to a running sync loop.
#[derive(Debug)]
pub struct SyncHandle {
    pub snapshots: watch::Receiver<Snapshot>,
    pub task: JoinHandle<()>,
}

pub fn spawn_sync(
    store: Arc<dyn MetadataStore>,
    prefix: String,
    interval: Duration,
    stop: StopSignal,
) -> SyncHandle {
    let (tx, rx) = watch::channel(Snapshot::new());

    let task = tokio::spawn(async move {
        info!(%prefix, ?interval, "metadata sync started");
        let mut failures = 0u32;

        loop {
            if stop.is_stopped() {
                break;
            }

            match store.get_prefix(&prefix).await {
                Ok(snapshot) => {
                    failures = 0;
                    tx.send_if_modified(|current| {
                        if *current == snapshot {
                            false
                        } else {
                            debug!(%prefix, keys = snapshot.len(), "metadata changed");
                            *current = snapshot;
                            true
                        }
                    });
                }
                Err(err) => {
                    failures += 1;
                    warn!(%prefix, error = %err, failures, "metadata sync read failed; retrying");
                }
            }

            tokio::select! {
                _ = sleep(interval) => {}
                _ = stop.stopped() => break,
            }
        }

        info!(%prefix, "metadata sync stopped");
    });

    SyncHandle {
        snapshots: rx,
        task,
    }
}
