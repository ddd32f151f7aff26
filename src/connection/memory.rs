//! In-process connector for tests and offline runs.
//!
//! Every accepted channel is handed to the owner of the [`MemoryConnector`]
//! as a [`MemoryPeer`], which plays the remote agent.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use futures_util::{sink, stream};
use tokio::sync::mpsc;
use url::Url;

use super::transport::{Connector, FrameChannel};
use crate::error::ConnectionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryBehavior {
    Accept,
    Refuse,
    /// Never completes the open; exercises connect timeouts.
    Hang,
}

pub struct MemoryConnector {
    behavior: Mutex<MemoryBehavior>,
    peers: mpsc::UnboundedSender<MemoryPeer>,
}

impl MemoryConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MemoryPeer>) {
        let (peers_tx, peers_rx) = mpsc::unbounded_channel();
        let connector = Self {
            behavior: Mutex::new(MemoryBehavior::Accept),
            peers: peers_tx,
        };
        (connector, peers_rx)
    }

    pub fn set_behavior(&self, behavior: MemoryBehavior) {
        *lock_unpoisoned(&self.behavior) = behavior;
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn open(&self, address: &Url) -> Result<FrameChannel, ConnectionError> {
        let behavior = *lock_unpoisoned(&self.behavior);
        match behavior {
            MemoryBehavior::Accept => {}
            MemoryBehavior::Refuse => {
                return Err(ConnectionError::open(address.as_str(), "connection refused"))
            }
            MemoryBehavior::Hang => std::future::pending::<()>().await,
        }

        let (to_client_tx, to_client_rx) = mpsc::unbounded_channel();
        let (to_peer_tx, to_peer_rx) = mpsc::unbounded_channel();
        let peer = MemoryPeer {
            address: address.to_string(),
            to_client: to_client_tx,
            from_client: to_peer_rx,
        };
        self.peers
            .send(peer)
            .map_err(|_| ConnectionError::open(address.as_str(), "memory listener dropped"))?;

        let sink = sink::unfold(to_peer_tx, |tx, text: String| async move {
            tx.send(text)
                .map_err(|_| ConnectionError::closed("memory peer dropped"))?;
            Ok::<_, ConnectionError>(tx)
        });
        let stream = stream::unfold(to_client_rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });

        Ok(FrameChannel {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }
}

/// Remote end of an in-memory channel.
pub struct MemoryPeer {
    pub address: String,
    to_client: mpsc::UnboundedSender<Result<String, ConnectionError>>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl MemoryPeer {
    /// Delivers a text frame to the client. Returns false once the client
    /// side is gone.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.to_client.send(Ok(text.into())).is_ok()
    }

    /// Fails the client's read side with a transport error.
    pub fn fail(&self, reason: impl Into<String>) -> bool {
        self.to_client
            .send(Err(ConnectionError::closed(reason)))
            .is_ok()
    }

    /// Next frame written by the client; `None` once the client closed.
    pub async fn recv(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    pub fn try_recv(&mut self) -> Option<String> {
        self.from_client.try_recv().ok()
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
