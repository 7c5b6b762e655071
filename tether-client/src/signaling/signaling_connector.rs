use crate::error::SignalingError;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tether_core::{ClientSignal, ServerSignal};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

/// One live link to the rendezvous service.
///
/// Dropping `outgoing` closes the link; `incoming` ends when the service goes away.
pub struct SignalingLink {
    pub outgoing: mpsc::UnboundedSender<ClientSignal>,
    pub incoming: mpsc::UnboundedReceiver<ServerSignal>,
}

#[async_trait]
pub trait SignalingConnector: Send + Sync {
    async fn connect(&self) -> Result<SignalingLink, SignalingError>;
}

/// WebSocket connector; frames are JSON text messages.
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl SignalingConnector for WsConnector {
    async fn connect(&self) -> Result<SignalingLink, SignalingError> {
        let (socket, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| SignalingError::Connect(e.to_string()))?;
        info!("Connected to rendezvous at {}", self.url);

        let (mut sink, mut stream) = socket.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ClientSignal>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<ServerSignal>();

        tokio::spawn(async move {
            while let Some(signal) = out_rx.recv().await {
                let json = match serde_json::to_string(&signal) {
                    Ok(json) => json,
                    Err(e) => {
                        error!("Failed to serialize signal: {}", e);
                        continue;
                    }
                };
                if sink.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
            let _ = sink.send(Message::Close(None)).await;
            debug!("Rendezvous writer finished");
        });

        tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ServerSignal>(&text) {
                        Ok(signal) => {
                            if in_tx.send(signal).is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("Invalid frame from rendezvous: {:?}", e),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!("Rendezvous socket error: {}", e);
                        break;
                    }
                }
            }
            debug!("Rendezvous reader finished");
        });

        Ok(SignalingLink {
            outgoing: out_tx,
            incoming: in_rx,
        })
    }
}
