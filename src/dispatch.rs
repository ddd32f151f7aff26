//! Fire-and-forget outbound intents.

use std::sync::Arc;

use agent_protocol::OutboundFrame;
use tokio::sync::mpsc;

use crate::connection::ConnectionManager;
use crate::error::SendStatus;
use crate::session::SessionInput;

/// Sends user intents over the live channel. Nothing is awaited or queued:
/// while the channel is not open every send returns
/// [`SendStatus::NotConnected`] and the intent is gone.
#[derive(Clone)]
pub struct CommandDispatcher {
    connection: Arc<ConnectionManager>,
    session: mpsc::UnboundedSender<SessionInput>,
}

impl CommandDispatcher {
    pub fn new(
        connection: Arc<ConnectionManager>,
        session: mpsc::UnboundedSender<SessionInput>,
    ) -> Self {
        Self {
            connection,
            session,
        }
    }

    /// Sends the message and, once it is queued on the channel, echoes it
    /// into the transcript as a user turn.
    pub fn send_message(&self, text: impl Into<String>) -> SendStatus {
        let content = text.into();
        let status = self.connection.send(&OutboundFrame::Message {
            content: content.clone(),
        });
        if !status.is_sent() {
            return status;
        }
        if self
            .session
            .send(SessionInput::LocalUserMessage(content))
            .is_err()
        {
            tracing::warn!("session consumer gone; message sent without local echo");
        }
        status
    }

    pub fn send_code(&self, code: impl Into<String>) -> SendStatus {
        self.connection
            .send(&OutboundFrame::RunCode { code: code.into() })
    }

    pub fn send_resize(&self, rows: u16, cols: u16) -> SendStatus {
        self.connection.send(&OutboundFrame::Resize { rows, cols })
    }
}
