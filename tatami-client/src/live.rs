//! Live-update channels.
//!
//! The server pushes settings, global metadata, download progress and
//! library-update progress over WebSocket upgrades of the same base URL.
//! Each channel owns one socket per subscription lifetime and funnels
//! parsed frames into a process-wide [`Snapshot`], so every observer sees
//! the same value instead of holding a divergent copy. A socket error or
//! close surfaces as an error state; reconnection is the caller's job by
//! resubscribing.

use std::sync::Arc;

use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use crate::routes;
use crate::transport::Transport;
use tatami_model::{
    DownloadStatus, GlobalMeta, LibraryUpdateStatus, ServerSettings,
};

/// Last observed value of one channel plus its connection state.
#[derive(Debug, Clone)]
pub struct ChannelState<T> {
    pub data: Option<T>,
    pub loading: bool,
    pub error: Option<String>,
}

impl<T> Default for ChannelState<T> {
    fn default() -> Self {
        Self {
            data: None,
            loading: false,
            error: None,
        }
    }
}

/// Process-wide observable snapshot. Cloning shares the underlying value;
/// observers subscribe and await changes.
#[derive(Debug)]
pub struct Snapshot<T> {
    tx: Arc<watch::Sender<ChannelState<T>>>,
}

impl<T> Clone for Snapshot<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T: Clone> Default for Snapshot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Snapshot<T> {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ChannelState::default());
        Self { tx: Arc::new(tx) }
    }

    pub fn subscribe(&self) -> watch::Receiver<ChannelState<T>> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> ChannelState<T> {
        self.tx.borrow().clone()
    }

    /// Drop the value and connection state, e.g. on logout.
    pub fn reset(&self) {
        self.tx.send_replace(ChannelState::default());
    }

    fn begin(&self) {
        self.tx.send_modify(|state| {
            state.loading = true;
            state.error = None;
        });
    }

    fn publish(&self, data: T) {
        self.tx.send_replace(ChannelState {
            data: Some(data),
            loading: false,
            error: None,
        });
    }

    /// Record a failure, keeping the last good value visible.
    fn fail(&self, error: impl Into<String>) {
        self.tx.send_modify(|state| {
            state.loading = false;
            state.error = Some(error.into());
        });
    }
}

/// The snapshots every channel writes into. One per engine; share behind
/// an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct LiveState {
    pub settings: Snapshot<ServerSettings>,
    pub meta: Snapshot<GlobalMeta>,
    pub downloads: Snapshot<Vec<DownloadStatus>>,
    pub updates: Snapshot<LibraryUpdateStatus>,
}

impl LiveState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&self) {
        self.settings.reset();
        self.meta.reset();
        self.downloads.reset();
        self.updates.reset();
    }
}

/// One live subscription. Dropping it closes the socket and stops the
/// read loop; the snapshot keeps its last value.
#[derive(Debug)]
pub struct ChannelHandle {
    task: JoinHandle<()>,
}

impl Drop for ChannelHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Opens the server's WebSocket endpoints and keeps [`LiveState`] current.
#[derive(Debug, Clone)]
pub struct LiveChannels {
    transport: Arc<Transport>,
    pub state: Arc<LiveState>,
}

impl LiveChannels {
    pub fn new(transport: Arc<Transport>) -> Self {
        Self {
            transport,
            state: Arc::new(LiveState::new()),
        }
    }

    pub fn watch_settings(&self) -> ChannelHandle {
        self.open(routes::ws::SETTINGS, self.state.settings.clone())
    }

    pub fn watch_meta(&self) -> ChannelHandle {
        self.open(routes::ws::META, self.state.meta.clone())
    }

    pub fn watch_downloads(&self) -> ChannelHandle {
        self.open(routes::ws::DOWNLOADS, self.state.downloads.clone())
    }

    pub fn watch_updates(&self) -> ChannelHandle {
        self.open(routes::ws::UPDATES, self.state.updates.clone())
    }

    fn open<T>(&self, path: &str, snapshot: Snapshot<T>) -> ChannelHandle
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let url = self.transport.ws_url(path);
        ChannelHandle {
            task: tokio::spawn(run_channel(url, snapshot)),
        }
    }
}

async fn run_channel<T>(url: String, snapshot: Snapshot<T>)
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    snapshot.begin();
    debug!(%url, "opening live channel");

    let (stream, _) = match connect_async(&url).await {
        Ok(ok) => ok,
        Err(err) => {
            warn!(%url, error = %err, "live channel failed to connect");
            snapshot.fail(err.to_string());
            return;
        }
    };
    let (_write, mut read) = stream.split();

    while let Some(frame) = read.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                match serde_json::from_str::<T>(&text) {
                    Ok(payload) => snapshot.publish(payload),
                    Err(err) => {
                        // A malformed frame is dropped, not fatal.
                        warn!(%url, error = %err, "unparseable live frame");
                    }
                }
            }
            Ok(Message::Binary(bytes)) => {
                match serde_json::from_slice::<T>(&bytes) {
                    Ok(payload) => snapshot.publish(payload),
                    Err(err) => {
                        warn!(%url, error = %err, "unparseable live frame");
                    }
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(err) => {
                warn!(%url, error = %err, "live channel read error");
                snapshot.fail(err.to_string());
                return;
            }
        }
    }

    debug!(%url, "live channel closed");
    snapshot.fail("channel closed");
}
