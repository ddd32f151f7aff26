//! Live channel lifecycle: connect, keepalive, disconnect.
//!
//! The manager owns at most one channel. While it is open, three owned tasks
//! run against it: a reader forwarding parsed events to the session driver,
//! a writer draining the outbound queue into the transport, and a keepalive
//! that queues `{"type":"ping"}` on a fixed interval. `disconnect()` and
//! `Drop` release all three. Unexpected closure moves the session to
//! `Closed` and is reported once; reconnecting is up to the caller.

mod address;
pub mod memory;
mod transport;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use agent_protocol::{parse_inbound_frame, EventKind, OutboundFrame};
use futures_util::{SinkExt, StreamExt};
use time::OffsetDateTime;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use url::Url;

pub use address::channel_url;
pub use transport::{Connector, FrameChannel, FrameSink, FrameStream, TungsteniteConnector};

use crate::config::{DEFAULT_CHANNEL_URL, DEFAULT_CONNECT_TIMEOUT, DEFAULT_KEEPALIVE_INTERVAL};
use crate::error::{ConnectionError, SendStatus};
use crate::session::SessionInput;

/// How long `disconnect()` waits for the writer to flush and close.
const WRITER_CLOSE_GRACE: Duration = Duration::from_millis(250);
/// Shortest keepalive interval a channel accepts.
pub const MIN_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Idle,
    Connecting,
    Open,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: Option<String>,
    pub channel_state: ChannelState,
    pub last_activity_at: OffsetDateTime,
}

impl Session {
    fn idle() -> Self {
        Self {
            id: None,
            channel_state: ChannelState::Idle,
            last_activity_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.channel_state == ChannelState::Open
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Base URL the `/ws/{session_id}` path is appended to.
    pub base_url: String,
    pub keepalive_interval: Duration,
    pub connect_timeout: Option<Duration>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_CHANNEL_URL.to_string(),
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
        }
    }
}

impl ChannelConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Intervals below [`MIN_KEEPALIVE_INTERVAL`] are raised to it.
    pub fn with_keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval.max(MIN_KEEPALIVE_INTERVAL);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

/// State shared with the channel tasks.
struct Shared {
    state: watch::Sender<Session>,
    /// Bumped on every connect and disconnect; tasks of an older channel
    /// never touch the session.
    generation: AtomicU64,
    events: mpsc::UnboundedSender<SessionInput>,
}

impl Shared {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::Acquire) == generation
    }

    fn touch(&self, generation: u64) {
        if !self.is_current(generation) {
            return;
        }
        self.state.send_if_modified(|session| {
            session.last_activity_at = OffsetDateTime::now_utc();
            false
        });
    }

    /// Moves an open channel of `generation` to `Closed` and tells the
    /// session driver, at most once per channel.
    fn mark_lost(&self, generation: u64, reason: String) {
        if !self.is_current(generation) {
            return;
        }
        let transitioned = self.state.send_if_modified(|session| {
            if session.channel_state != ChannelState::Open {
                return false;
            }
            session.channel_state = ChannelState::Closed;
            true
        });
        if transitioned {
            tracing::error!(%reason, "live channel closed unexpectedly");
            let _ = self.events.send(SessionInput::ConnectionLost { reason });
        }
    }
}

struct LiveChannel {
    outbound: mpsc::UnboundedSender<String>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
    keepalive: JoinHandle<()>,
}

impl LiveChannel {
    fn abort(&self) {
        self.reader.abort();
        self.writer.abort();
        self.keepalive.abort();
    }
}

pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    config: ChannelConfig,
    shared: Arc<Shared>,
    live: Mutex<Option<LiveChannel>>,
    lifecycle: tokio::sync::Mutex<()>,
    /// Bumped by `disconnect()` before it waits on `lifecycle`, so a pending
    /// open gives up instead of holding the lock.
    disconnects: watch::Sender<u64>,
}

impl ConnectionManager {
    /// Inbound events and connection-loss notices go to `events`, normally
    /// the sender of a [`SessionHandle`](crate::SessionHandle).
    pub fn new(
        connector: Arc<dyn Connector>,
        config: ChannelConfig,
        events: mpsc::UnboundedSender<SessionInput>,
    ) -> Self {
        let (state, _) = watch::channel(Session::idle());
        Self {
            connector,
            config,
            shared: Arc::new(Shared {
                state,
                generation: AtomicU64::new(0),
                events,
            }),
            live: Mutex::new(None),
            lifecycle: tokio::sync::Mutex::new(()),
            disconnects: watch::channel(0).0,
        }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn session(&self) -> Session {
        self.shared.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.shared.state.subscribe()
    }

    pub fn is_open(&self) -> bool {
        self.shared.state.borrow().is_open()
    }

    pub fn channel_address(&self, session_id: &str) -> Result<Url, ConnectionError> {
        channel_url(&self.config.base_url, session_id)
    }

    /// Opens the channel for `session_id`, releasing any current channel
    /// first. Resolves once the channel is open, or fails with
    /// [`ConnectionError::Closed`] if `disconnect()` is called meanwhile.
    pub async fn connect(&self, session_id: &str) -> Result<(), ConnectionError> {
        let _lifecycle = self.lifecycle.lock().await;
        let mut disconnects = self.disconnects.subscribe();
        self.release().await;

        let generation = self.shared.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.shared.state.send_replace(Session {
            id: Some(session_id.to_string()),
            channel_state: ChannelState::Connecting,
            last_activity_at: OffsetDateTime::now_utc(),
        });

        let opened = tokio::select! {
            opened = self.open_channel(session_id) => opened,
            _ = disconnects.changed() => {
                Err(ConnectionError::closed("disconnected while connecting"))
            }
        };
        let channel = match opened {
            Ok(channel) => channel,
            Err(error) => {
                tracing::warn!(session_id, %error, "live channel failed to open");
                self.shared.state.send_modify(|session| {
                    session.channel_state = ChannelState::Closed;
                });
                return Err(error);
            }
        };

        let live = self.spawn_channel_tasks(channel, generation);
        *lock_unpoisoned(&self.live) = Some(live);
        self.shared.state.send_modify(|session| {
            session.channel_state = ChannelState::Open;
            session.last_activity_at = OffsetDateTime::now_utc();
        });
        tracing::info!(session_id, "live channel open");
        Ok(())
    }

    /// Closes the channel. Safe to call repeatedly; always ends `Closed`.
    pub async fn disconnect(&self) {
        self.disconnects.send_modify(|count| *count = count.wrapping_add(1));
        let _lifecycle = self.lifecycle.lock().await;
        let had_channel = self.release().await;
        self.shared.state.send_modify(|session| {
            session.id = None;
            session.channel_state = ChannelState::Closed;
        });
        if had_channel {
            tracing::info!("live channel disconnected");
        }
    }

    /// Queues a raw text frame. Dropped with `NotConnected` unless open.
    pub fn send_raw(&self, raw: impl Into<String>) -> SendStatus {
        if !self.is_open() {
            return SendStatus::NotConnected;
        }
        let live = lock_unpoisoned(&self.live);
        let Some(channel) = live.as_ref() else {
            return SendStatus::NotConnected;
        };
        if channel.outbound.send(raw.into()).is_err() {
            return SendStatus::NotConnected;
        }
        self.shared
            .touch(self.shared.generation.load(Ordering::Acquire));
        SendStatus::Sent
    }

    pub fn send(&self, frame: &OutboundFrame) -> SendStatus {
        if !self.is_open() {
            tracing::debug!(frame = frame.name(), "dropping frame; channel not open");
            return SendStatus::NotConnected;
        }
        match frame.to_json() {
            Ok(raw) => {
                tracing::debug!(frame = frame.name(), "sending frame");
                self.send_raw(raw)
            }
            Err(error) => {
                tracing::error!(frame = frame.name(), %error, "failed to encode frame");
                SendStatus::Rejected
            }
        }
    }

    async fn open_channel(&self, session_id: &str) -> Result<FrameChannel, ConnectionError> {
        let address = self.channel_address(session_id)?;
        tracing::debug!(%address, "opening live channel");
        match self.config.connect_timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.connector.open(&address))
                .await
                .map_err(|_| ConnectionError::Timeout {
                    address: address.to_string(),
                    timeout,
                })?,
            None => self.connector.open(&address).await,
        }
    }

    fn spawn_channel_tasks(&self, channel: FrameChannel, generation: u64) -> LiveChannel {
        let FrameChannel { sink, stream } = channel;
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let reader = tokio::spawn(read_frames(stream, Arc::clone(&self.shared), generation));
        let writer = tokio::spawn(write_frames(
            sink,
            outbound_rx,
            Arc::clone(&self.shared),
            generation,
        ));
        let keepalive = tokio::spawn(keepalive(
            outbound_tx.clone(),
            self.config.keepalive_interval,
        ));

        LiveChannel {
            outbound: outbound_tx,
            reader,
            writer,
            keepalive,
        }
    }

    /// Tears down the current channel, if any. Returns whether one existed.
    async fn release(&self) -> bool {
        self.shared.generation.fetch_add(1, Ordering::AcqRel);
        let live = lock_unpoisoned(&self.live).take();
        let Some(live) = live else {
            return false;
        };

        live.reader.abort();
        live.keepalive.abort();
        // Dropping the last outbound sender lets the writer flush and close.
        let LiveChannel { outbound, writer, .. } = live;
        drop(outbound);
        let abort = writer.abort_handle();
        if tokio::time::timeout(WRITER_CLOSE_GRACE, writer).await.is_err() {
            abort.abort();
        }
        true
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(live) = lock_unpoisoned(&self.live).take() {
            live.abort();
        }
    }
}

async fn read_frames(mut stream: FrameStream, shared: Arc<Shared>, generation: u64) {
    while let Some(frame) = stream.next().await {
        let raw = match frame {
            Ok(raw) => raw,
            Err(error) => {
                shared.mark_lost(generation, error.to_string());
                return;
            }
        };
        shared.touch(generation);

        let event = match parse_inbound_frame(&raw) {
            Ok(event) => event,
            Err(error) => {
                tracing::warn!(%error, "dropping malformed frame");
                continue;
            }
        };
        if event.kind == EventKind::Pong {
            tracing::trace!("pong received");
            continue;
        }
        tracing::debug!(kind = event.kind.as_str(), "frame received");
        if shared.events.send(SessionInput::Inbound(event)).is_err() {
            tracing::debug!("session consumer gone; stopping reader");
            return;
        }
    }
    shared.mark_lost(generation, "remote side closed the channel".to_string());
}

async fn write_frames(
    mut sink: FrameSink,
    mut outbound: mpsc::UnboundedReceiver<String>,
    shared: Arc<Shared>,
    generation: u64,
) {
    while let Some(raw) = outbound.recv().await {
        if let Err(error) = sink.send(raw).await {
            shared.mark_lost(generation, error.to_string());
            return;
        }
    }
    if let Err(error) = sink.close().await {
        tracing::debug!(%error, "channel close did not complete cleanly");
    }
}

async fn keepalive(outbound: mpsc::UnboundedSender<String>, interval: Duration) {
    let ping = match OutboundFrame::Ping.to_json() {
        Ok(ping) => ping,
        Err(error) => {
            tracing::error!(%error, "failed to encode keepalive ping");
            return;
        }
    };
    let interval = interval.max(MIN_KEEPALIVE_INTERVAL);
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    loop {
        ticker.tick().await;
        if outbound.send(ping.clone()).is_err() {
            return;
        }
        tracing::trace!("keepalive ping queued");
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
