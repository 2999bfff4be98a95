use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

use crate::client::stats::Stats;
use crate::types;

pub(crate) mod config;
mod consts;
pub(crate) mod stats;
mod utils;

pub type ClientTx = tokio::sync::mpsc::Sender<types::ClientEvent>;
type ServerTx = tokio::sync::broadcast::Sender<types::ServerEvent>;
pub type ServerRx = tokio::sync::broadcast::Receiver<types::ServerEvent>;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("already connected")]
    AlreadyConnected,

    #[error("not connected yet")]
    NotConnected,

    #[error("connection failed: {0}")]
    Connect(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("connection handshake timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("connection closed, outbound event was not queued")]
    Send,
}

/// A connected Realtime API client. One WebSocket, two directions: outbound
/// events flow through an mpsc queue drained by the send task, inbound
/// messages are deserialized by the recv task and fanned out on a broadcast
/// channel. `send`-side methods are safe to call while a receiver is being
/// iterated.
pub struct Client {
    capacity: usize,
    config: config::Config,
    c_tx: Option<ClientTx>,
    s_tx: Option<ServerTx>,
    stats: Arc<Mutex<Stats>>,
}

impl Client {
    fn new(capacity: usize, config: config::Config) -> Self {
        Self {
            capacity,
            config,
            c_tx: None,
            s_tx: None,
            stats: Arc::new(Mutex::new(Stats::new())),
        }
    }

    async fn connect(&mut self) -> Result<(), ClientError> {
        if self.c_tx.is_some() {
            return Err(ClientError::AlreadyConnected);
        }

        let request = utils::build_request(&self.config)?;
        let connect = tokio_tungstenite::connect_async(request);
        let (ws_stream, _) = tokio::time::timeout(consts::CONNECT_TIMEOUT, connect)
            .await
            .map_err(|_| ClientError::ConnectTimeout(consts::CONNECT_TIMEOUT))??;

        let (mut write, mut read) = ws_stream.split();

        let (c_tx, mut c_rx) = tokio::sync::mpsc::channel(self.capacity);
        let (s_tx, _) = tokio::sync::broadcast::channel(self.capacity);

        self.c_tx = Some(c_tx.clone());
        self.s_tx = Some(s_tx.clone());

        tokio::spawn(async move {
            while let Some(event) = c_rx.recv().await {
                match serde_json::to_string(&event) {
                    Ok(text) => {
                        if let Err(e) = write.send(Message::Text(text)).await {
                            tracing::error!("failed to send message: {}", e);
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!("failed to serialize event: {}", e);
                    }
                }
            }
            // The outbound queue is gone, either because the client was
            // closed or because the socket rejected a write. Say goodbye.
            if let Err(e) = write.send(Message::Close(None)).await {
                tracing::debug!("failed to send close frame: {}", e);
            }
        });

        let stats = self.stats.clone();
        tokio::spawn(async move {
            while let Some(message) = read.next().await {
                let message = match message {
                    Err(e) => {
                        tracing::error!("failed to read message: {}", e);
                        let close_event = types::ServerEvent::Close {
                            reason: Some(e.to_string()),
                        };
                        if s_tx.send(close_event).is_err() {
                            tracing::debug!("no subscribers for close event");
                        }
                        break;
                    }
                    Ok(message) => message,
                };
                match message {
                    Message::Text(text) => {
                        if let Ok(json) = serde_json::from_str::<serde_json::Value>(&text) {
                            let event_type = json.get("type").and_then(|v| v.as_str());
                            let event_id = json.get("event_id").and_then(|v| v.as_str());
                            tracing::debug!(
                                "received message: {}, id={}",
                                event_type.unwrap_or("unknown"),
                                event_id.unwrap_or("unknown")
                            );
                        }

                        match serde_json::from_str::<types::ServerEvent>(&text) {
                            Ok(event) => {
                                if let types::ServerEvent::ResponseDone(ref response) = event {
                                    if let Some(usage) = response.response().usage() {
                                        if let Ok(mut stats_guard) = stats.lock() {
                                            stats_guard.update_usage(
                                                usage.total_tokens(),
                                                usage.input_tokens(),
                                                usage.output_tokens(),
                                            );
                                        } else {
                                            tracing::error!("failed to update stats");
                                        }
                                    }
                                }

                                if let Err(e) = s_tx.send(event) {
                                    tracing::error!("failed to broadcast event: {}", e);
                                }
                            }
                            Err(e) => {
                                // Event kinds we don't model land here. They
                                // are dropped, never fatal.
                                tracing::debug!(
                                    "ignoring unhandled or malformed event: {}, text=> {:?}",
                                    e,
                                    text
                                );
                            }
                        }
                    }
                    Message::Binary(bin) => {
                        tracing::warn!("unexpected binary message: {} bytes", bin.len());
                    }
                    Message::Close(reason) => {
                        tracing::info!("connection closed: {:?}", reason);
                        let close_event = types::ServerEvent::Close {
                            reason: reason.map(|v| format!("{:?}", v)),
                        };
                        if s_tx.send(close_event).is_err() {
                            tracing::debug!("no subscribers for close event");
                        }
                        break;
                    }
                    _ => {}
                }
            }
        });
        Ok(())
    }

    /// Subscribe to the inbound event stream. Each subscriber gets every
    /// event from the point of subscription onward; the stream ends when the
    /// transport emits `ServerEvent::Close`.
    pub fn server_events(&mut self) -> Result<ServerRx, ClientError> {
        match self.s_tx {
            Some(ref tx) => Ok(tx.subscribe()),
            None => Err(ClientError::NotConnected),
        }
    }

    /// Accumulated token usage for this session.
    pub fn stats(&self) -> Stats {
        self.stats
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_else(|_| {
                tracing::error!("stats lock poisoned");
                Stats::new()
            })
    }

    /// Drop the outbound queue. The send task flushes a close frame and the
    /// service responds by closing the socket, which ends the recv task.
    pub fn close(&mut self) {
        self.c_tx = None;
    }

    async fn send_client_event(&mut self, event: types::ClientEvent) -> Result<(), ClientError> {
        match self.c_tx {
            Some(ref tx) => tx.send(event).await.map_err(|_| ClientError::Send),
            None => Err(ClientError::NotConnected),
        }
    }

    pub async fn update_session(&mut self, config: types::Session) -> Result<(), ClientError> {
        let event = types::ClientEvent::SessionUpdate(types::events::client::SessionUpdateEvent::new(
            config,
        ));
        self.send_client_event(event).await
    }

    pub async fn append_input_audio_buffer(
        &mut self,
        audio: types::audio::Base64EncodedAudioBytes,
    ) -> Result<(), ClientError> {
        let event = types::ClientEvent::InputAudioBufferAppend(
            types::events::client::InputAudioBufferAppendEvent::new(audio),
        );
        self.send_client_event(event).await
    }

    pub async fn create_conversation_item(&mut self, item: types::Item) -> Result<(), ClientError> {
        let event = types::ClientEvent::ConversationItemCreate(
            types::events::client::ConversationItemCreateEvent::new(item),
        );
        self.send_client_event(event).await
    }

    pub async fn create_response(&mut self) -> Result<(), ClientError> {
        let event =
            types::ClientEvent::ResponseCreate(types::events::client::ResponseCreateEvent::new());
        self.send_client_event(event).await
    }
}

pub async fn connect_with_config(capacity: usize, config: config::Config) -> Result<Client, ClientError> {
    let mut client = Client::new(capacity, config);
    client.connect().await?;
    Ok(client)
}

pub async fn connect(config: config::Config) -> Result<Client, ClientError> {
    connect_with_config(1024, config).await
}
