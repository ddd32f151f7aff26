use std::pin::Pin;

use agent_protocol::ProtocolError;
use async_trait::async_trait;
use futures_util::{future, Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use url::Url;

use crate::error::ConnectionError;

pub type FrameSink = Pin<Box<dyn Sink<String, Error = ConnectionError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, ConnectionError>> + Send>>;

/// An open text-frame channel. The stream ends when the peer closes.
pub struct FrameChannel {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

/// Opens live channels. Injected into the connection manager.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, address: &Url) -> Result<FrameChannel, ConnectionError>;
}

/// WebSocket connector backed by `tokio-tungstenite`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TungsteniteConnector;

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn open(&self, address: &Url) -> Result<FrameChannel, ConnectionError> {
        let (socket, response) = connect_async(address.as_str())
            .await
            .map_err(|error| ConnectionError::open(address.as_str(), error))?;
        tracing::debug!(%address, status = %response.status(), "websocket handshake complete");

        let (sink, stream) = socket.split();
        let sink = sink
            .with(|text: String| future::ready(Ok::<_, WsError>(Message::Text(text))))
            .sink_map_err(|error| ConnectionError::closed(error.to_string()));
        let stream = stream.filter_map(|message| {
            future::ready(match message {
                Ok(Message::Text(text)) => Some(Ok(text)),
                Ok(Message::Binary(bytes)) => {
                    tracing::warn!(len = bytes.len(), error = %ProtocolError::BinaryFrame, "dropping frame");
                    None
                }
                Ok(Message::Close(frame)) => {
                    tracing::debug!(?frame, "peer sent close frame");
                    None
                }
                Ok(_) => None,
                Err(error) => Some(Err(ConnectionError::closed(error.to_string()))),
            })
        });

        Ok(FrameChannel {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }
}
