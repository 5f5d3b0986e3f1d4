//! Series store: immutable snapshots, a pure reducer, and the actor that owns
//! the single state cell.
//!
//! Every mutation is an [`Action`] applied by [`reduce`]. The [`Store`] task is
//! the only place actions are applied, so each transition is atomic with respect
//! to readers. Readers get `Arc<Snapshot>` values through a `watch` channel and
//! never see a half-applied action.
//!
//! Snapshots share structure: servers and series sit behind `Arc` and are
//! copied on write, so publishing a new snapshot after a sample only copies the
//! one series that changed.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::history::{merge_by_timestamp, push_capped, window_from};
use crate::types::{MetricKind, Sample, SeriesKey};

pub const DEFAULT_WINDOW: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    Grid,
    List,
}

impl ViewMode {
    pub fn toggled(self) -> Self {
        match self {
            ViewMode::Grid => ViewMode::List,
            ViewMode::List => ViewMode::Grid,
        }
    }
}

/// How a history backfill lands on a series that may already hold live samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackfillPolicy {
    /// The fetched rows become the history, whatever was there before.
    #[default]
    Replace,
    /// Union with the existing window by timestamp, then re-truncate.
    Merge,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filters {
    pub show_cpu: bool,
    pub show_memory: bool,
    pub show_disk: bool,
    pub show_network: bool,
    pub view_mode: ViewMode,
}

impl Default for Filters {
    fn default() -> Self {
        Self {
            show_cpu: true,
            show_memory: true,
            show_disk: true,
            show_network: true,
            view_mode: ViewMode::Grid,
        }
    }
}

impl Filters {
    pub fn shows(&self, kind: MetricKind) -> bool {
        match kind {
            MetricKind::Cpu => self.show_cpu,
            MetricKind::Memory => self.show_memory,
            MetricKind::Disk => self.show_disk,
            MetricKind::Network => self.show_network,
        }
    }

    fn toggle(&mut self, kind: MetricKind) {
        let flag = match kind {
            MetricKind::Cpu => &mut self.show_cpu,
            MetricKind::Memory => &mut self.show_memory,
            MetricKind::Disk => &mut self.show_disk,
            MetricKind::Network => &mut self.show_network,
        };
        *flag = !*flag;
    }

    pub fn visible_kinds(&self) -> impl Iterator<Item = MetricKind> + '_ {
        MetricKind::ALL.into_iter().filter(move |k| self.shows(*k))
    }
}

/// Latest value plus bounded rolling history for one (server, tag).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Series {
    pub current: Option<Sample>,
    pub history: VecDeque<Sample>,
}

impl Series {
    /// `current` if a live sample arrived, else the newest backfilled row.
    pub fn latest(&self) -> Option<&Sample> {
        self.current.as_ref().or_else(|| self.history.back())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerEntry {
    pub server_id: String,
    pub tags: BTreeMap<String, Arc<Series>>,
    pub is_hidden: bool,
}

impl ServerEntry {
    fn new(server_id: &str) -> Self {
        Self {
            server_id: server_id.to_string(),
            tags: BTreeMap::new(),
            is_hidden: false,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Action {
    ApplySample(Sample),
    /// Create an empty series for a key from the directory listing.
    SeedSeries(SeriesKey),
    SetHistory {
        key: SeriesKey,
        samples: Vec<Sample>,
    },
    SetVisibility {
        server_id: String,
        hidden: bool,
    },
    ToggleMetricFilter(MetricKind),
    SetViewMode(ViewMode),
    SetLoading(bool),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub servers: BTreeMap<String, Arc<ServerEntry>>,
    pub filters: Filters,
    pub is_loading: bool,
    window: usize,
    backfill: BackfillPolicy,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW, BackfillPolicy::Replace)
    }
}

impl Snapshot {
    pub fn new(window: usize, backfill: BackfillPolicy) -> Self {
        Self {
            servers: BTreeMap::new(),
            filters: Filters::default(),
            is_loading: false,
            window: window.max(1),
            backfill,
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn backfill_policy(&self) -> BackfillPolicy {
        self.backfill
    }

    pub fn series(&self, key: &SeriesKey) -> Option<&Series> {
        self.servers
            .get(&key.server_id)
            .and_then(|s| s.tags.get(&key.tag))
            .map(|s| s.as_ref())
    }

    pub fn keys(&self) -> Vec<SeriesKey> {
        self.servers
            .values()
            .flat_map(|s| s.tags.keys().map(|t| SeriesKey::new(&s.server_id, t)))
            .collect()
    }

    pub fn visible_servers(&self) -> impl Iterator<Item = &ServerEntry> {
        self.servers
            .values()
            .map(|s| s.as_ref())
            .filter(|s| !s.is_hidden)
    }

    /// Apply one action in place. Returns false when the action was a no-op.
    pub fn apply(&mut self, action: Action) -> bool {
        match action {
            Action::ApplySample(sample) => {
                self.apply_sample(sample);
                true
            }
            Action::SeedSeries(key) => self.seed_series(&key),
            Action::SetHistory { key, samples } => self.set_history(&key, samples),
            Action::SetVisibility { server_id, hidden } => {
                match self.servers.get_mut(&server_id) {
                    Some(entry) if entry.is_hidden != hidden => {
                        Arc::make_mut(entry).is_hidden = hidden;
                        true
                    }
                    _ => false,
                }
            }
            Action::ToggleMetricFilter(kind) => {
                self.filters.toggle(kind);
                true
            }
            Action::SetViewMode(mode) => {
                let changed = self.filters.view_mode != mode;
                self.filters.view_mode = mode;
                changed
            }
            Action::SetLoading(on) => {
                let changed = self.is_loading != on;
                self.is_loading = on;
                changed
            }
        }
    }

    fn apply_sample(&mut self, sample: Sample) {
        let window = self.window;
        let entry = self
            .servers
            .entry(sample.server_id.clone())
            .or_insert_with(|| Arc::new(ServerEntry::new(&sample.server_id)));
        let series = Arc::make_mut(entry)
            .tags
            .entry(sample.tag.clone())
            .or_default();
        let series = Arc::make_mut(series);

        // Live stamps only go forward in practice; a sample older than the tail
        // (clock skew against backfilled rows) is slotted in so history stays sorted.
        // One older than a full window would be evicted at once, so it only
        // becomes `current` and history is left alone.
        let pos = series
            .history
            .partition_point(|s| s.timestamp <= sample.timestamp);
        if pos == series.history.len() {
            push_capped(&mut series.history, sample.clone(), window);
        } else if pos == 0 && series.history.len() >= window {
            debug!(series = %sample.key(), ts = sample.timestamp, "sample older than the full window");
        } else {
            series.history.insert(pos, sample.clone());
            while series.history.len() > window {
                series.history.pop_front();
            }
        }
        series.current = Some(sample);
    }

    fn seed_series(&mut self, key: &SeriesKey) -> bool {
        if self.series(key).is_some() {
            return false;
        }
        let entry = self
            .servers
            .entry(key.server_id.clone())
            .or_insert_with(|| Arc::new(ServerEntry::new(&key.server_id)));
        Arc::make_mut(entry)
            .tags
            .insert(key.tag.clone(), Arc::new(Series::default()));
        true
    }

    fn set_history(&mut self, key: &SeriesKey, samples: Vec<Sample>) -> bool {
        let window = self.window;
        let policy = self.backfill;
        let Some(entry) = self.servers.get_mut(&key.server_id) else {
            debug!(series = %key, "history for unknown server ignored");
            return false;
        };
        if !entry.tags.contains_key(&key.tag) {
            debug!(series = %key, "history for unknown series ignored");
            return false;
        }
        let entry = Arc::make_mut(entry);
        let Some(series) = entry.tags.get_mut(&key.tag) else {
            return false;
        };
        let series = Arc::make_mut(series);
        series.history = match policy {
            BackfillPolicy::Replace => window_from(samples, window),
            BackfillPolicy::Merge => merge_by_timestamp(&series.history, samples, window),
        };
        true
    }
}

/// Pure transition: `(state, action) -> state`.
pub fn reduce(mut state: Snapshot, action: Action) -> Snapshot {
    state.apply(action);
    state
}

struct Command {
    action: Action,
    ack: Option<oneshot::Sender<Arc<Snapshot>>>,
}

/// Owner of the state cell. Runs until every [`StoreHandle`] is dropped.
pub struct Store {
    rx: mpsc::UnboundedReceiver<Command>,
    state_tx: watch::Sender<Arc<Snapshot>>,
}

impl Store {
    pub fn spawn(initial: Snapshot) -> (StoreHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(Arc::new(initial));
        let store = Store { rx, state_tx };
        let task = tokio::spawn(store.run());
        (
            StoreHandle {
                tx,
                state: state_rx,
            },
            task,
        )
    }

    async fn run(mut self) {
        while let Some(Command { action, ack }) = self.rx.recv().await {
            trace!(?action, "store action");
            self.state_tx.send_if_modified(|state| {
                let mut next = Snapshot::clone(state);
                if next.apply(action) {
                    *state = Arc::new(next);
                    true
                } else {
                    false
                }
            });
            if let Some(ack) = ack {
                let _ = ack.send(self.state_tx.borrow().clone());
            }
        }
        debug!("store closed");
    }
}

/// Cloneable access to the store: dispatch actions, read or watch snapshots.
#[derive(Clone)]
pub struct StoreHandle {
    tx: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<Arc<Snapshot>>,
}

impl StoreHandle {
    /// Queue an action. Actions apply in the order they are dispatched.
    pub fn dispatch(&self, action: Action) -> Result<()> {
        self.tx
            .send(Command { action, ack: None })
            .map_err(|_| Error::StoreClosed)
    }

    /// Queue an action and wait for the snapshot it produced.
    pub async fn apply(&self, action: Action) -> Result<Arc<Snapshot>> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(Command {
                action,
                ack: Some(ack),
            })
            .map_err(|_| Error::StoreClosed)?;
        done.await.map_err(|_| Error::StoreClosed)
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.state.clone()
    }

    pub fn apply_sample(&self, sample: Sample) -> Result<()> {
        self.dispatch(Action::ApplySample(sample))
    }

    pub fn seed_series(&self, key: SeriesKey) -> Result<()> {
        self.dispatch(Action::SeedSeries(key))
    }

    pub fn set_history(&self, key: SeriesKey, samples: Vec<Sample>) -> Result<()> {
        self.dispatch(Action::SetHistory { key, samples })
    }

    pub fn set_visibility(&self, server_id: impl Into<String>, hidden: bool) -> Result<()> {
        self.dispatch(Action::SetVisibility {
            server_id: server_id.into(),
            hidden,
        })
    }

    pub fn toggle_metric_filter(&self, kind: MetricKind) -> Result<()> {
        self.dispatch(Action::ToggleMetricFilter(kind))
    }

    pub fn set_view_mode(&self, mode: ViewMode) -> Result<()> {
        self.dispatch(Action::SetViewMode(mode))
    }

    pub fn set_loading(&self, on: bool) -> Result<()> {
        self.dispatch(Action::SetLoading(on))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(server: &str, tag: &str, ts: i64, cpu: f64) -> Sample {
        Sample {
            server_id: server.into(),
            tag: tag.into(),
            cpu_usage: cpu,
            memory_usage: 40.0,
            disk_usage: 70.0,
            network_usage: 1024.0,
            timestamp: ts,
        }
    }

    fn key() -> SeriesKey {
        SeriesKey::new("s1", "prod")
    }

    #[test]
    fn history_stays_bounded_sorted_and_fifo() {
        let mut st = Snapshot::new(5, BackfillPolicy::Replace);
        for i in 0..23 {
            st = reduce(st, Action::ApplySample(sample("s1", "prod", i * 10, i as f64)));
            let s = st.series(&key()).unwrap();
            assert!(s.history.len() <= 5);
            assert!(s
                .history
                .iter()
                .zip(s.history.iter().skip(1))
                .all(|(a, b)| a.timestamp <= b.timestamp));
        }
        let ts: Vec<i64> = st.series(&key()).unwrap().history.iter().map(|s| s.timestamp).collect();
        assert_eq!(ts, vec![180, 190, 200, 210, 220]);
    }

    #[test]
    fn current_is_last_applied_sample() {
        let mut st = Snapshot::default();
        st = reduce(st, Action::ApplySample(sample("s1", "prod", 100, 1.0)));
        let late = sample("s1", "prod", 50, 2.0);
        st = reduce(st, Action::ApplySample(late.clone()));
        let s = st.series(&key()).unwrap();
        assert_eq!(s.current.as_ref(), Some(&late));
        // out-of-order stamp still lands sorted
        assert_eq!(s.history[0].timestamp, 50);
    }

    #[test]
    fn apply_sample_creates_server_and_series() {
        let st = reduce(
            Snapshot::default(),
            Action::ApplySample(sample("new", "edge", 1, 3.0)),
        );
        let entry = st.servers.get("new").unwrap();
        assert!(!entry.is_hidden);
        assert!(entry.tags.contains_key("edge"));
    }

    #[test]
    fn set_history_on_unknown_key_is_noop() {
        let before = reduce(
            Snapshot::default(),
            Action::ApplySample(sample("s1", "other", 1, 1.0)),
        );
        let mut after = before.clone();
        assert!(!after.apply(Action::SetHistory {
            key: key(),
            samples: vec![sample("s1", "prod", 5, 5.0)],
        }));
        assert!(!after.apply(Action::SetHistory {
            key: SeriesKey::new("ghost", "prod"),
            samples: vec![sample("ghost", "prod", 5, 5.0)],
        }));
        assert_eq!(before, after);
    }

    #[test]
    fn set_history_replaces_and_reorders() {
        let mut st = reduce(Snapshot::default(), Action::SeedSeries(key()));
        st = reduce(
            st,
            Action::SetHistory {
                key: key(),
                samples: vec![sample("s1", "prod", 1, 1.0), sample("s1", "prod", 2, 2.0)],
            },
        );
        st = reduce(
            st,
            Action::SetHistory {
                key: key(),
                samples: vec![sample("s1", "prod", 9, 9.0), sample("s1", "prod", 7, 7.0)],
            },
        );
        let s = st.series(&key()).unwrap();
        let ts: Vec<i64> = s.history.iter().map(|s| s.timestamp).collect();
        assert_eq!(ts, vec![7, 9]);
        assert!(s.current.is_none());
    }

    #[test]
    fn set_history_leaves_current_untouched() {
        let live = sample("s1", "prod", 1_000, 55.0);
        let mut st = reduce(Snapshot::default(), Action::ApplySample(live.clone()));
        st = reduce(
            st,
            Action::SetHistory {
                key: key(),
                samples: vec![sample("s1", "prod", 10, 10.0)],
            },
        );
        let s = st.series(&key()).unwrap();
        assert_eq!(s.current.as_ref(), Some(&live));
        assert_eq!(s.history.len(), 1);
    }

    #[test]
    fn merge_policy_keeps_newer_live_samples() {
        let mut st = Snapshot::new(3, BackfillPolicy::Merge);
        st = reduce(st, Action::ApplySample(sample("s1", "prod", 1_000, 55.0)));
        st = reduce(
            st,
            Action::SetHistory {
                key: key(),
                samples: vec![
                    sample("s1", "prod", 10, 1.0),
                    sample("s1", "prod", 20, 2.0),
                    sample("s1", "prod", 30, 3.0),
                ],
            },
        );
        let ts: Vec<i64> = st.series(&key()).unwrap().history.iter().map(|s| s.timestamp).collect();
        assert_eq!(ts, vec![20, 30, 1_000]);
    }

    #[test]
    fn set_history_truncates_to_window() {
        let mut st = reduce(
            Snapshot::new(2, BackfillPolicy::Replace),
            Action::SeedSeries(key()),
        );
        st = reduce(
            st,
            Action::SetHistory {
                key: key(),
                samples: (0..10).map(|i| sample("s1", "prod", i, i as f64)).collect(),
            },
        );
        let ts: Vec<i64> = st.series(&key()).unwrap().history.iter().map(|s| s.timestamp).collect();
        assert_eq!(ts, vec![8, 9]);
    }

    #[test]
    fn seeding_twice_does_not_clear_data() {
        let mut st = reduce(Snapshot::default(), Action::ApplySample(sample("s1", "prod", 1, 1.0)));
        assert!(!st.apply(Action::SeedSeries(key())));
        assert_eq!(st.series(&key()).unwrap().history.len(), 1);
    }

    #[test]
    fn filter_toggles_are_independent_and_involutive() {
        for kind in MetricKind::ALL {
            let start = Snapshot::default();
            let once = reduce(start.clone(), Action::ToggleMetricFilter(kind));
            for other in MetricKind::ALL {
                assert_eq!(once.filters.shows(other), other != kind);
            }
            assert_eq!(once.filters.view_mode, ViewMode::Grid);
            let twice = reduce(once, Action::ToggleMetricFilter(kind));
            assert_eq!(twice, start);
        }
    }

    #[test]
    fn stale_sample_against_full_window_keeps_history() {
        let mut st = Snapshot::new(3, BackfillPolicy::Replace);
        for ts in [10, 20, 30] {
            st = reduce(st, Action::ApplySample(sample("s1", "prod", ts, ts as f64)));
        }
        let before = st.series(&key()).unwrap().history.clone();
        st = reduce(st, Action::ApplySample(sample("s1", "prod", 5, 99.0)));
        let series = st.series(&key()).unwrap();
        assert_eq!(series.history, before);
        assert_eq!(series.current.as_ref().unwrap().cpu_usage, 99.0);

        // with room left it is slotted in at the front
        let mut st = Snapshot::new(4, BackfillPolicy::Replace);
        for ts in [10, 20, 30] {
            st = reduce(st, Action::ApplySample(sample("s1", "prod", ts, ts as f64)));
        }
        st = reduce(st, Action::ApplySample(sample("s1", "prod", 5, 99.0)));
        let ts: Vec<i64> = st.series(&key()).unwrap().history.iter().map(|s| s.timestamp).collect();
        assert_eq!(ts, vec![5, 10, 20, 30]);
    }

    #[test]
    fn visibility_on_unknown_server_is_noop() {
        let mut st = Snapshot::default();
        assert!(!st.apply(Action::SetVisibility {
            server_id: "nope".into(),
            hidden: true
        }));
        st = reduce(st, Action::ApplySample(sample("s1", "prod", 1, 1.0)));
        st = reduce(
            st,
            Action::SetVisibility {
                server_id: "s1".into(),
                hidden: true,
            },
        );
        assert!(st.servers["s1"].is_hidden);
        assert_eq!(st.visible_servers().count(), 0);
        // hidden servers still ingest
        st = reduce(st, Action::ApplySample(sample("s1", "prod", 2, 2.0)));
        assert_eq!(st.series(&key()).unwrap().history.len(), 2);
    }

    #[test]
    fn snapshots_share_untouched_series() {
        let st = reduce(Snapshot::default(), Action::ApplySample(sample("a", "x", 1, 1.0)));
        let st = reduce(st, Action::ApplySample(sample("b", "x", 1, 1.0)));
        let next = reduce(st.clone(), Action::ApplySample(sample("b", "x", 2, 2.0)));
        assert!(Arc::ptr_eq(&st.servers["a"], &next.servers["a"]));
        assert!(!Arc::ptr_eq(&st.servers["b"], &next.servers["b"]));
    }

    #[tokio::test]
    async fn actor_serializes_actions_in_dispatch_order() {
        let (store, task) = Store::spawn(Snapshot::new(10, BackfillPolicy::Replace));
        let mut rx = store.subscribe();
        for i in 0..5 {
            store.apply_sample(sample("s1", "prod", i, i as f64)).unwrap();
        }
        store.set_loading(true).unwrap();
        let snap = store.apply(Action::SetViewMode(ViewMode::List)).await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().filters.view_mode, ViewMode::List);
        assert!(snap.is_loading);
        let s = snap.series(&key()).unwrap();
        assert_eq!(s.history.len(), 5);
        assert_eq!(s.current.as_ref().map(|c| c.timestamp), Some(4));
        drop(rx);
        drop(store);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn noop_action_does_not_wake_subscribers() {
        let (store, _task) = Store::spawn(Snapshot::default());
        let mut rx = store.subscribe();
        rx.borrow_and_update();
        store
            .apply(Action::SetHistory {
                key: key(),
                samples: vec![sample("s1", "prod", 1, 1.0)],
            })
            .await
            .unwrap();
        assert!(!rx.has_changed().unwrap());
    }
}
