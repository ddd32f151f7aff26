//! Single-consumer task that owns the transcript.
//!
//! The connection reader and the command dispatcher never touch turns
//! directly. They send [`SessionInput`]s into one unbounded channel; the
//! driver folds them in arrival order and publishes snapshots through a
//! `watch` channel.

use agent_protocol::InboundEvent;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::fold::{EventFold, FoldEffect, Turn, TurnId};

#[derive(Debug, Clone, PartialEq)]
pub enum SessionInput {
    Inbound(InboundEvent),
    /// Optimistic echo of a message the user is sending.
    LocalUserMessage(String),
    /// The live channel closed without a `disconnect()` call.
    ConnectionLost { reason: String },
}

/// Read-only view of the transcript after the latest input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranscriptSnapshot {
    pub turns: Vec<Turn>,
    pub open_turn: Option<TurnId>,
    /// Set when the channel was lost; cleared by the next inbound event.
    pub connection_lost: Option<String>,
    /// Number of inputs processed so far.
    pub revision: u64,
}

impl TranscriptSnapshot {
    pub fn turn(&self, id: TurnId) -> Option<&Turn> {
        self.turns.iter().find(|turn| turn.id == id)
    }

    pub fn last_turn(&self) -> Option<&Turn> {
        self.turns.last()
    }
}

/// Sending side of a session, cloned into the connection and dispatcher.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    inputs: mpsc::UnboundedSender<SessionInput>,
    snapshots: watch::Receiver<TranscriptSnapshot>,
}

impl SessionHandle {
    pub fn sender(&self) -> mpsc::UnboundedSender<SessionInput> {
        self.inputs.clone()
    }

    /// Queues an input for the driver. Returns false once the driver is gone.
    pub fn submit(&self, input: SessionInput) -> bool {
        self.inputs.send(input).is_ok()
    }

    pub fn snapshot(&self) -> TranscriptSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<TranscriptSnapshot> {
        self.snapshots.clone()
    }
}

pub struct SessionDriver {
    fold: EventFold,
    inputs: mpsc::UnboundedReceiver<SessionInput>,
    snapshots: watch::Sender<TranscriptSnapshot>,
    revision: u64,
    connection_lost: Option<String>,
}

/// Creates a connected handle/driver pair.
pub fn session_channel() -> (SessionHandle, SessionDriver) {
    let (inputs_tx, inputs_rx) = mpsc::unbounded_channel();
    let (snapshots_tx, snapshots_rx) = watch::channel(TranscriptSnapshot::default());
    let handle = SessionHandle {
        inputs: inputs_tx,
        snapshots: snapshots_rx,
    };
    let driver = SessionDriver {
        fold: EventFold::new(),
        inputs: inputs_rx,
        snapshots: snapshots_tx,
        revision: 0,
        connection_lost: None,
    };
    (handle, driver)
}

impl SessionDriver {
    pub fn spawn(self) -> JoinHandle<EventFold> {
        tokio::spawn(self.run())
    }

    /// Folds inputs until every sender is dropped, then returns the fold.
    pub async fn run(mut self) -> EventFold {
        while let Some(input) = self.inputs.recv().await {
            self.apply(input);
            self.publish();
        }
        tracing::debug!(revision = self.revision, "session driver finished");
        self.fold
    }

    fn apply(&mut self, input: SessionInput) {
        self.revision += 1;
        match input {
            SessionInput::Inbound(event) => {
                self.connection_lost = None;
                let kind = event.kind;
                match self.fold.fold(event) {
                    FoldEffect::Closed(Some(turn)) => tracing::debug!(turn, "turn closed"),
                    FoldEffect::Closed(None) => {
                        tracing::debug!("done received without an open turn")
                    }
                    FoldEffect::Ignored => {}
                    FoldEffect::AppendedText(turn) | FoldEffect::AppendedSideEvent(turn) => {
                        tracing::trace!(turn, kind = kind.as_str(), "event folded")
                    }
                }
            }
            SessionInput::LocalUserMessage(text) => {
                let turn = self.fold.push_user_turn(text);
                tracing::debug!(turn, "user turn appended");
            }
            SessionInput::ConnectionLost { reason } => {
                tracing::warn!(%reason, "live channel lost; open turn kept");
                self.connection_lost = Some(reason);
            }
        }
    }

    fn publish(&self) {
        let snapshot = TranscriptSnapshot {
            turns: self.fold.turns().to_vec(),
            open_turn: self.fold.open_turn().map(|turn| turn.id),
            connection_lost: self.connection_lost.clone(),
            revision: self.revision,
        };
        self.snapshots.send_replace(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use agent_protocol::InboundEvent;

    use super::{session_channel, SessionInput};

    #[tokio::test]
    async fn driver_folds_inputs_in_order_and_returns_fold() {
        let (handle, driver) = session_channel();
        let task = driver.spawn();

        assert!(handle.submit(SessionInput::LocalUserMessage("hi".to_string())));
        assert!(handle.submit(SessionInput::Inbound(InboundEvent::text("hel"))));
        assert!(handle.submit(SessionInput::Inbound(InboundEvent::text_delta("lo"))));

        let mut snapshots = handle.subscribe();
        let snapshot = snapshots
            .wait_for(|snapshot| snapshot.revision == 3)
            .await
            .expect("driver alive")
            .clone();
        assert_eq!(snapshot.turns.len(), 2);
        assert_eq!(snapshot.turns[1].text, "hello");
        assert_eq!(snapshot.open_turn, Some(snapshot.turns[1].id));

        drop(snapshots);
        drop(handle);
        let fold = task.await.expect("driver task");
        assert_eq!(fold.turns().len(), 2);
    }

    #[tokio::test]
    async fn connection_loss_keeps_open_turn() {
        let (handle, driver) = session_channel();
        let task = driver.spawn();

        handle.submit(SessionInput::Inbound(InboundEvent::text("partial")));
        handle.submit(SessionInput::ConnectionLost {
            reason: "reset".to_string(),
        });

        let mut snapshots = handle.subscribe();
        let snapshot = snapshots
            .wait_for(|snapshot| snapshot.revision == 2)
            .await
            .expect("driver alive")
            .clone();
        assert_eq!(snapshot.connection_lost.as_deref(), Some("reset"));
        assert!(snapshot.open_turn.is_some());
        assert!(snapshot.turns[0].is_open);

        drop(snapshots);
        drop(handle);
        task.await.expect("driver task");
    }
}
