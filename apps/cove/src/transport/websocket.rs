use super::{ChannelError, ChannelEvent, ChannelState, ChatMessage, CloseReason};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{RwLock, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};
use url::Url;

/// The realtime chat channel. One per activation; the connection's lifetime
/// is the channel's lifetime, and a closed channel is never reopened.
#[derive(Debug)]
pub struct ChatChannel {
    outbound: mpsc::UnboundedSender<String>,
    events: mpsc::UnboundedReceiver<ChannelEvent>,
    state: Arc<RwLock<ChannelState>>,
    pump: Option<tokio::task::JoinHandle<()>>,
}

/// Cloneable send handle, detached from the event stream so callers can
/// send while awaiting inbound events.
#[derive(Clone)]
pub struct ChannelSender {
    outbound: mpsc::UnboundedSender<String>,
}

impl ChannelSender {
    /// Fire-and-forget: the payload is the raw text, no envelope, and no
    /// acknowledgment is awaited.
    pub fn send(&self, text: &str) -> Result<(), ChannelError> {
        self.outbound
            .send(text.to_string())
            .map_err(|_| ChannelError::Closed)
    }
}

impl ChatChannel {
    /// Performs the websocket handshake against the chat endpoint. The
    /// access token, when present, rides along as a bearer `Authorization`
    /// header, which is what the server's auth middleware expects.
    pub async fn connect(url: &Url, access_token: Option<&str>) -> Result<Self, ChannelError> {
        debug!(target: "cove::channel", url = %url, state = ?ChannelState::Connecting, "opening chat channel");
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|err| ChannelError::Handshake(err.to_string()))?;
        if let Some(token) = access_token {
            let value = format!("Bearer {token}")
                .parse()
                .map_err(|_| ChannelError::Handshake("access token is not a valid header".into()))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (stream, _) = connect_async(request)
            .await
            .map_err(|err| ChannelError::Handshake(err.to_string()))?;
        debug!(target: "cove::channel", state = ?ChannelState::Open, "chat channel open");

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<String>();
        let (event_tx, event_rx) = mpsc::unbounded_channel::<ChannelEvent>();
        let state = Arc::new(RwLock::new(ChannelState::Open));

        let pump_state = state.clone();
        let pump = tokio::spawn(async move {
            pump_channel(stream, outbound_rx, event_tx, pump_state).await;
        });

        Ok(Self {
            outbound: outbound_tx,
            events: event_rx,
            state,
            pump: Some(pump),
        })
    }

    pub fn sender(&self) -> ChannelSender {
        ChannelSender {
            outbound: self.outbound.clone(),
        }
    }

    pub fn send(&self, text: &str) -> Result<(), ChannelError> {
        self.sender().send(text)
    }

    /// The next channel event, in transport receipt order. `None` only after
    /// a `Closed` event has been delivered.
    pub async fn next_event(&mut self) -> Option<ChannelEvent> {
        self.events.recv().await
    }

    pub fn state(&self) -> ChannelState {
        self.state
            .try_read()
            .map(|guard| *guard)
            .unwrap_or(ChannelState::Connecting)
    }
}

impl Drop for ChatChannel {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

async fn pump_channel(
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
    event_tx: mpsc::UnboundedSender<ChannelEvent>,
    state: Arc<RwLock<ChannelState>>,
) {
    let (mut sink, mut source) = stream.split();

    let send_task = tokio::spawn(async move {
        while let Some(text) = outbound_rx.recv().await {
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let reason = loop {
        match source.next().await {
            Some(Ok(Message::Text(payload))) => match ChatMessage::decode(&payload) {
                Ok(message) => {
                    if event_tx.send(ChannelEvent::Message(message)).is_err() {
                        break CloseReason::Remote;
                    }
                }
                Err(err) => {
                    // Bad frames are dropped, never rendered and never fatal.
                    warn!(target: "cove::channel", error = %err, "dropping malformed inbound frame");
                }
            },
            Some(Ok(Message::Binary(_))) => {
                warn!(target: "cove::channel", "dropping unexpected binary frame");
            }
            Some(Ok(Message::Close(_))) | None => break CloseReason::Remote,
            Some(Ok(_)) => {}
            Some(Err(err)) => break CloseReason::Error(err.to_string()),
        }
    };

    *state.write().await = ChannelState::Closed;
    debug!(target: "cove::channel", state = ?ChannelState::Closed, reason = ?reason, "chat channel closed");
    let _ = event_tx.send(ChannelEvent::Closed(reason));

    send_task.abort();
    let _ = send_task.await;
}
