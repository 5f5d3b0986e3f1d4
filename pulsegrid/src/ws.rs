//! Live feed over WebSocket: decode pushed samples into the store and keep the
//! connection alive.
//!
//! The feed is a small state machine driven by one task:
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> (close|error) -> ReconnectPending -> Connecting ...
//! ```
//!
//! The task owns the socket and the reconnect timer. [`LiveFeed::disconnect`]
//! stops both and waits for the task, so nothing touches the store afterwards.

use std::future::Future;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::notify::{Notice, SharedNotifier};
use crate::store::StoreHandle;
use crate::types::{LiveMessage, Sample};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);
const CLOSE_GRACE: Duration = Duration::from_millis(500);

// Connect to the backend and return the WS stream
pub async fn connect(url: &str) -> Result<WsStream> {
    let (ws, _) = connect_async(url).await?;
    Ok(ws)
}

/// Decode one pushed message. The receive time becomes the sample's timestamp.
pub fn decode_message(text: &str, received_at_ms: i64) -> Result<Sample> {
    let msg: LiveMessage = serde_json::from_str(text)?;
    msg.into_sample(received_at_ms)
}

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    Disconnected,
    Connecting,
    Connected,
    ReconnectPending,
}

impl FeedState {
    pub fn is_connected(self) -> bool {
        self == FeedState::Connected
    }
}

/// Reconnect delay: starts at `base`, doubles per failed attempt, capped at `max`.
/// `base == max` gives a fixed delay.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    next: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        let max = max.max(base);
        Self {
            base,
            max,
            next: base,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let d = self.next;
        self.next = self.next.saturating_mul(2).min(self.max);
        d
    }

    pub fn reset(&mut self) {
        self.next = self.base;
    }
}

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub url: String,
    pub reconnect_delay: Duration,
    pub reconnect_max_delay: Duration,
}

impl FeedConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            reconnect_max_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

/// Handle to the running feed task.
pub struct LiveFeed {
    state: watch::Receiver<FeedState>,
    stop: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl LiveFeed {
    /// Start connecting in the background. Returns immediately.
    pub fn connect(cfg: FeedConfig, store: StoreHandle, notifier: SharedNotifier) -> Self {
        Self::connect_after(cfg, store, notifier, std::future::ready(()))
    }

    /// Like [`connect`](Self::connect), but the first attempt waits for `gate`.
    /// The feed stays `Disconnected` until then and can still be torn down.
    pub fn connect_after<G>(
        cfg: FeedConfig,
        store: StoreHandle,
        notifier: SharedNotifier,
        gate: G,
    ) -> Self
    where
        G: Future<Output = ()> + Send + 'static,
    {
        let (state_tx, state) = watch::channel(FeedState::Disconnected);
        let (stop, stop_rx) = watch::channel(false);
        let task = tokio::spawn(run_feed(cfg, store, notifier, state_tx, stop_rx, gate));
        Self {
            state,
            stop,
            task: Some(task),
        }
    }

    pub fn state(&self) -> FeedState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    pub fn subscribe(&self) -> watch::Receiver<FeedState> {
        self.state.clone()
    }

    /// Close the socket if open and cancel any pending reconnect. Idempotent.
    pub async fn disconnect(&mut self) {
        let _ = self.stop.send(true);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "live feed task ended abnormally");
            }
        }
    }
}

// Dropping a LiveFeed without disconnect() drops `stop`, which the task also
// treats as a stop request.

async fn stopped(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|s| *s).await;
}

enum PumpEnd {
    Stop,
    Closed,
    Failed(Error),
    StoreClosed,
}

async fn run_feed<G: Future<Output = ()>>(
    cfg: FeedConfig,
    store: StoreHandle,
    notifier: SharedNotifier,
    state: watch::Sender<FeedState>,
    mut stop: watch::Receiver<bool>,
    gate: G,
) {
    tokio::select! {
        _ = stopped(&mut stop) => {
            debug!("live feed stopped before first attempt");
            return;
        }
        _ = gate => {}
    }

    let mut backoff = Backoff::new(cfg.reconnect_delay, cfg.reconnect_max_delay);
    // only the first failed attempt of a streak is surfaced as a notice
    let mut failing = false;

    loop {
        state.send_replace(FeedState::Connecting);
        debug!(url = %cfg.url, "connecting live feed");
        let attempt = tokio::select! {
            _ = stopped(&mut stop) => break,
            res = connect(&cfg.url) => res,
        };

        match attempt {
            Ok(mut ws) => {
                backoff.reset();
                failing = false;
                state.send_replace(FeedState::Connected);
                info!(url = %cfg.url, "live feed connected");
                notifier.notify(Notice::info("Connected to metrics server"));

                match pump(&mut ws, &store, &mut stop).await {
                    PumpEnd::Stop => {
                        let _ = timeout(CLOSE_GRACE, ws.close(None)).await;
                        break;
                    }
                    PumpEnd::StoreClosed => {
                        debug!("store closed, stopping live feed");
                        break;
                    }
                    PumpEnd::Closed => {
                        info!("live feed closed by peer");
                        notifier.notify(Notice::warn(
                            "Disconnected from metrics server. Attempting to reconnect...",
                        ));
                    }
                    PumpEnd::Failed(e) => {
                        warn!(error = %e, "live feed error");
                        notifier.notify(Notice::error(format!("WebSocket connection error: {e}")));
                    }
                }
            }
            Err(e) => {
                warn!(url = %cfg.url, error = %e, "live feed connect failed");
                if !failing {
                    notifier.notify(Notice::error(format!("WebSocket connection error: {e}")));
                }
                failing = true;
            }
        }

        state.send_replace(FeedState::ReconnectPending);
        let delay = backoff.next_delay();
        debug!(?delay, "live feed reconnect scheduled");
        tokio::select! {
            _ = stopped(&mut stop) => break,
            _ = sleep(delay) => {}
        }
    }

    state.send_replace(FeedState::Disconnected);
    debug!("live feed stopped");
}

async fn pump(ws: &mut WsStream, store: &StoreHandle, stop: &mut watch::Receiver<bool>) -> PumpEnd {
    loop {
        let next = tokio::select! {
            _ = stopped(stop) => return PumpEnd::Stop,
            m = ws.next() => m,
        };
        let text = match next {
            None => return PumpEnd::Closed,
            Some(Err(e)) => return PumpEnd::Failed(e.into()),
            Some(Ok(Message::Close(_))) => return PumpEnd::Closed,
            Some(Ok(Message::Text(t))) => t,
            Some(Ok(Message::Binary(b))) => match String::from_utf8(b) {
                Ok(t) => t,
                Err(_) => {
                    debug!("dropping non-UTF-8 binary frame");
                    continue;
                }
            },
            Some(Ok(_)) => continue,
        };
        if let Err(Error::StoreClosed) = ingest(&text, store) {
            return PumpEnd::StoreClosed;
        }
    }
}

/// Decode and forward one message. Undecodable messages are logged and dropped;
/// only a closed store is reported back.
fn ingest(text: &str, store: &StoreHandle) -> Result<()> {
    match decode_message(text, now_ms()) {
        Ok(sample) => store.apply_sample(sample),
        Err(e) => {
            debug!(error = %e, "dropping malformed live message");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Snapshot, Store};

    #[test]
    fn decode_stamps_receive_time_and_ignores_extras() {
        let s = decode_message(
            r#"{"message":"New metrics received","server_id":"s1","tag":"prod",
                "cpu_usage":55,"memory_usage":20,"disk_usage":30,"network_usage":1200,
                "timestamp":1}"#,
            1_700_000_000_000,
        )
        .unwrap();
        assert_eq!(s.server_id, "s1");
        assert_eq!(s.cpu_usage, 55.0);
        assert_eq!(s.timestamp, 1_700_000_000_000);
    }

    #[test]
    fn decode_rejects_missing_or_malformed_identity() {
        assert!(decode_message(r#"{"server_id":"s1","cpu_usage":1}"#, 0).is_err());
        assert!(decode_message(r#"{"server_id":7,"tag":"prod"}"#, 0).is_err());
        assert!(decode_message(r#"{"server_id":"s1","tag":""}"#, 0).is_err());
        assert!(decode_message("not json", 0).is_err());
    }

    #[test]
    fn backoff_doubles_up_to_cap_and_resets() {
        let mut b = Backoff::new(Duration::from_millis(100), Duration::from_millis(350));
        let seq: Vec<u64> = (0..4).map(|_| b.next_delay().as_millis() as u64).collect();
        assert_eq!(seq, vec![100, 200, 350, 350]);
        b.reset();
        assert_eq!(b.next_delay(), Duration::from_millis(100));

        let mut fixed = Backoff::new(DEFAULT_RECONNECT_DELAY, DEFAULT_RECONNECT_DELAY);
        assert_eq!(fixed.next_delay(), fixed.next_delay());
    }

    #[tokio::test]
    async fn malformed_message_leaves_store_unchanged() {
        let (store, _task) = Store::spawn(Snapshot::default());
        let before = store.snapshot();
        ingest(r#"{"server_id":"s1","cpu_usage":10}"#, &store).unwrap();
        ingest("{", &store).unwrap();
        // barrier: wait for everything queued so far
        let after = store
            .apply(crate::store::Action::SetLoading(false))
            .await
            .unwrap();
        assert_eq!(*before, *after);
    }
}
