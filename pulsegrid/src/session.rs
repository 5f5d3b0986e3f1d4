//! One dashboard session: store, history loader and live feed wired together.
//!
//! Startup order is seed, then backfill, then live connect; the feed is gated on
//! the backfill finishing (successfully or not). Teardown stops the feed first so
//! no sample lands after [`Session::shutdown`] returns.

use std::sync::Arc;

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::api::MetricsApi;
use crate::config::Config;
use crate::loader::HistoryLoader;
use crate::notify::SharedNotifier;
use crate::store::{Snapshot, Store, StoreHandle};
use crate::types::SeriesKey;
use crate::ws::{FeedState, LiveFeed};

pub struct Session {
    store: StoreHandle,
    store_task: JoinHandle<()>,
    loader: HistoryLoader,
    feed: LiveFeed,
    startup: JoinHandle<()>,
}

impl Session {
    pub fn start(cfg: &Config, api: Arc<dyn MetricsApi>, notifier: SharedNotifier) -> Self {
        let (store, store_task) = Store::spawn(Snapshot::new(cfg.window, cfg.backfill));
        let loader = HistoryLoader::new(api, store.clone(), notifier.clone(), cfg.history_limit);

        let (ready_tx, ready_rx) = oneshot::channel::<()>();
        let startup = {
            let loader = loader.clone();
            tokio::spawn(async move {
                match loader.seed_and_backfill().await {
                    Ok(n) => info!(backfilled = n, "startup backfill done"),
                    Err(e) => warn!(error = %e, "startup backfill skipped"),
                }
                let _ = ready_tx.send(());
            })
        };

        // a dropped sender (startup aborted) opens the gate as well
        let gate = async move {
            let _ = ready_rx.await;
        };
        let feed = LiveFeed::connect_after(cfg.feed(), store.clone(), notifier, gate);

        Self {
            store,
            store_task,
            loader,
            feed,
            startup,
        }
    }

    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    pub fn feed_state(&self) -> watch::Receiver<FeedState> {
        self.feed.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.feed.is_connected()
    }

    /// Re-run the backfill for every known series in the background.
    pub fn reload(&self) -> JoinHandle<usize> {
        let loader = self.loader.clone();
        tokio::spawn(async move { loader.backfill_all().await })
    }

    /// Re-run the backfill for one server's series in the background.
    pub fn reload_server(&self, server_id: &str) -> JoinHandle<usize> {
        let keys: Vec<SeriesKey> = self
            .store
            .snapshot()
            .keys()
            .into_iter()
            .filter(|k| k.server_id == server_id)
            .collect();
        let loader = self.loader.clone();
        tokio::spawn(async move { loader.backfill(&keys).await })
    }

    pub async fn shutdown(mut self) {
        self.startup.abort();
        let _ = (&mut self.startup).await;
        self.feed.disconnect().await;
        // in-flight reloads may still hold store handles; stop the actor regardless
        self.store_task.abort();
        info!("session closed");
    }
}
