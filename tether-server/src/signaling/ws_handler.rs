use crate::RendezvousService;
use anyhow::Context;
use axum::Router;
use axum::extract::State;
use axum::extract::WebSocketUpgrade;
use axum::extract::ws::{Message, WebSocket};
use axum::response::IntoResponse;
use axum::routing::get;
use futures::{SinkExt, StreamExt};
use std::future::Future;
use tether_core::{ClientSignal, ServerSignal, SignalErrorCode};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(service): State<RendezvousService>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, service))
}

async fn handle_socket(socket: WebSocket, service: RendezvousService) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerSignal>();

    let peer_id = service.attach(tx);
    info!("New WebSocket connection: {}", peer_id);

    let mut send_task = tokio::spawn(async move {
        while let Some(signal) = rx.recv().await {
            let json = match serde_json::to_string(&signal) {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize signal message: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
        let _ = sender.send(Message::Close(None)).await;
    });

    let mut recv_task = tokio::spawn({
        let service = service.clone();

        async move {
            while let Some(Ok(msg)) = receiver.next().await {
                match msg {
                    Message::Text(text) => match serde_json::from_str::<ClientSignal>(&text) {
                        Ok(signal) => service.handle(peer_id, signal),
                        Err(e) => {
                            warn!("Invalid ClientSignal from {}: {}", peer_id, e);
                            service.send_signal(
                                peer_id,
                                ServerSignal::Error {
                                    code: SignalErrorCode::BadRequest,
                                    message: "malformed frame".to_owned(),
                                },
                            );
                        }
                    },
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };

    service.detach(peer_id);
    info!("WebSocket disconnected: {}", peer_id);
}

/// `GET /ws` upgraded to the rendezvous protocol.
pub fn router(service: RendezvousService) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .with_state(service)
}

/// Runs the rendezvous on `listener` until `shutdown` resolves.
pub async fn serve<F>(
    listener: TcpListener,
    service: RendezvousService,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr().context("listener has no local address")?;
    info!("Rendezvous listening on ws://{}/ws", addr);

    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown)
        .await
        .context("rendezvous server failed")
}
