//! History loader: seeds the store from the directory listing and backfills
//! each series from the history endpoint.
//!
//! A fetch either lands completely (one `SetHistory` action) or not at all;
//! failures are reported to the notifier and returned to the caller.

use std::sync::{Arc, Mutex};

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::api::MetricsApi;
use crate::error::Result;
use crate::notify::{Notice, SharedNotifier};
use crate::store::{Action, StoreHandle};
use crate::types::{MetricRow, Sample, SeriesKey};

pub const DEFAULT_HISTORY_LIMIT: usize = 100;

#[derive(Clone)]
pub struct HistoryLoader {
    api: Arc<dyn MetricsApi>,
    store: StoreHandle,
    notifier: SharedNotifier,
    limit: usize,
    in_flight: Arc<Mutex<usize>>,
}

impl HistoryLoader {
    pub fn new(
        api: Arc<dyn MetricsApi>,
        store: StoreHandle,
        notifier: SharedNotifier,
        limit: usize,
    ) -> Self {
        Self {
            api,
            store,
            notifier,
            limit,
            in_flight: Arc::new(Mutex::new(0)),
        }
    }

    /// Create an empty series for every pair in the directory listing.
    pub async fn seed(&self) -> Result<Vec<SeriesKey>> {
        let _busy = self.busy();
        let keys = match self.api.list_series().await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "directory listing failed");
                self.notifier
                    .notify(Notice::error(format!("Failed to load server list: {e}")));
                return Err(e);
            }
        };
        // wait for each ack so a following snapshot read sees the seeded series
        for key in &keys {
            self.store.apply(Action::SeedSeries(key.clone())).await?;
        }
        info!(series = keys.len(), "seeded series from directory");
        Ok(keys)
    }

    /// Fetch the newest `limit` rows for `key` and install them as its history.
    /// Returns the number of samples installed.
    pub async fn load(&self, key: &SeriesKey, limit: usize) -> Result<usize> {
        let _busy = self.busy();
        let samples = match self.fetch(key, limit).await {
            Ok(samples) => samples,
            Err(e) => {
                warn!(series = %key, error = %e, "history fetch failed");
                self.notifier.notify(Notice::error(format!(
                    "Failed to load historical metrics for {key}: {e}"
                )));
                return Err(e);
            }
        };
        let n = samples.len();
        self.store.set_history(key.clone(), samples)?;
        debug!(series = %key, rows = n, "history installed");
        Ok(n)
    }

    async fn fetch(&self, key: &SeriesKey, limit: usize) -> Result<Vec<Sample>> {
        let rows = self.api.fetch_history(key, limit).await?;
        let mut samples = rows
            .into_iter()
            .map(MetricRow::into_sample)
            .collect::<Result<Vec<_>>>()?;
        samples.retain(|s| {
            let same = s.server_id == key.server_id && s.tag == key.tag;
            if !same {
                debug!(series = %key, row = %s.key(), "dropping row for another series");
            }
            same
        });
        // backend returns newest first; charts want oldest first
        samples.sort_by_key(|s| s.timestamp);
        Ok(samples)
    }

    /// Backfill every series currently in the store, concurrently.
    /// Returns how many loads succeeded.
    pub async fn backfill_all(&self) -> usize {
        let keys = self.store.snapshot().keys();
        self.backfill(&keys).await
    }

    /// Backfill the given series concurrently. Returns how many loads succeeded.
    pub async fn backfill(&self, keys: &[SeriesKey]) -> usize {
        let results = join_all(keys.iter().map(|k| self.load(k, self.limit))).await;
        results.iter().filter(|r| r.is_ok()).count()
    }

    /// Seed from the directory, then backfill exactly what was seeded.
    pub async fn seed_and_backfill(&self) -> Result<usize> {
        let keys = self.seed().await?;
        Ok(self.backfill(&keys).await)
    }

    fn busy(&self) -> BusyGuard {
        BusyGuard::enter(self.in_flight.clone(), self.store.clone())
    }
}

/// Holds the store's loading flag up while at least one request is in flight.
struct BusyGuard {
    in_flight: Arc<Mutex<usize>>,
    store: StoreHandle,
}

impl BusyGuard {
    fn enter(in_flight: Arc<Mutex<usize>>, store: StoreHandle) -> Self {
        {
            // dispatch under the lock so loading on/off reach the store in order
            let mut n = in_flight.lock().unwrap_or_else(|e| e.into_inner());
            *n += 1;
            if *n == 1 {
                let _ = store.set_loading(true);
            }
        }
        Self { in_flight, store }
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        let mut n = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        *n = n.saturating_sub(1);
        if *n == 0 {
            let _ = self.store.set_loading(false);
        }
    }
}
