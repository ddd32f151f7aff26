#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use agent_link::connection::memory::{MemoryConnector, MemoryPeer};
use agent_link::{
    session_channel, ChannelConfig, CommandDispatcher, ConnectionManager, EventFold,
    SessionHandle, TranscriptSnapshot,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const WAIT: Duration = Duration::from_secs(5);

/// Connection manager, session driver and dispatcher wired to an in-memory
/// transport.
pub struct Harness {
    pub connection: Arc<ConnectionManager>,
    pub connector: Arc<MemoryConnector>,
    pub peers: mpsc::UnboundedReceiver<MemoryPeer>,
    pub session: SessionHandle,
    pub dispatcher: CommandDispatcher,
    pub driver: JoinHandle<EventFold>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(ChannelConfig::default())
    }

    pub fn with_config(config: ChannelConfig) -> Self {
        let (connector, peers) = MemoryConnector::new();
        let connector = Arc::new(connector);
        let (session, driver) = session_channel();
        let connection = Arc::new(ConnectionManager::new(
            Arc::clone(&connector) as Arc<dyn agent_link::Connector>,
            config,
            session.sender(),
        ));
        let dispatcher = CommandDispatcher::new(Arc::clone(&connection), session.sender());

        Self {
            connection,
            connector,
            peers,
            session,
            dispatcher,
            driver: driver.spawn(),
        }
    }

    /// Connects to `session_id` and returns the remote end of the channel.
    pub async fn connect(&mut self, session_id: &str) -> MemoryPeer {
        self.connection
            .connect(session_id)
            .await
            .expect("in-memory channel opens");
        self.peers.recv().await.expect("peer for accepted channel")
    }

    /// Waits until the transcript satisfies `predicate`.
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&TranscriptSnapshot) -> bool,
    ) -> TranscriptSnapshot {
        let mut snapshots = self.session.subscribe();
        let snapshot = tokio::time::timeout(WAIT, snapshots.wait_for(predicate))
            .await
            .expect("transcript condition reached in time")
            .expect("session driver alive")
            .clone();
        snapshot
    }

    /// Waits until the driver has processed `revision` inputs.
    pub async fn wait_for_revision(&self, revision: u64) -> TranscriptSnapshot {
        self.wait_for(|snapshot| snapshot.revision >= revision).await
    }
}

/// Next frame the client wrote, as JSON.
pub async fn next_frame(peer: &mut MemoryPeer) -> serde_json::Value {
    let raw = tokio::time::timeout(WAIT, peer.recv())
        .await
        .expect("frame arrives in time")
        .expect("client still connected");
    serde_json::from_str(&raw).expect("client frames are JSON")
}
