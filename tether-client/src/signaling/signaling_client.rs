use crate::error::SignalingError;
use crate::signaling::{SignalingConnector, SignalingEvent, SignalingOutput};
use crate::util::lock;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tether_core::{
    ClientSignal, IceCandidate, KeyboardEvent, MouseEvent, PeerId, ServerSignal, SessionCode,
    SignalErrorCode,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

type Pending<T> = Mutex<Option<oneshot::Sender<Result<T, SignalingError>>>>;

struct ClientInner {
    connector: Arc<dyn SignalingConnector>,
    connect_lock: tokio::sync::Mutex<()>,
    outgoing: Mutex<Option<mpsc::UnboundedSender<ClientSignal>>>,
    link_generation: AtomicU64,
    pending_create: Pending<SessionCode>,
    pending_join: Pending<(SessionCode, PeerId)>,
    events: mpsc::UnboundedSender<SignalingEvent>,
    request_timeout: Duration,
}

/// Client side of the rendezvous protocol.
///
/// Holds at most one link at a time. `create_session` and `join_session` are
/// request/response and reject the caller on failure; everything else the
/// service says is delivered on the event receiver returned by [`SignalingClient::new`].
#[derive(Clone)]
pub struct SignalingClient {
    inner: Arc<ClientInner>,
}

impl SignalingClient {
    pub fn new(
        connector: Arc<dyn SignalingConnector>,
        request_timeout: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<SignalingEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let client = Self {
            inner: Arc::new(ClientInner {
                connector,
                connect_lock: tokio::sync::Mutex::new(()),
                outgoing: Mutex::new(None),
                link_generation: AtomicU64::new(0),
                pending_create: Mutex::new(None),
                pending_join: Mutex::new(None),
                events,
                request_timeout,
            }),
        };
        (client, events_rx)
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.inner.outgoing)
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Opens the rendezvous link unless one is already up.
    pub async fn connect(&self) -> Result<(), SignalingError> {
        let _guard = self.inner.connect_lock.lock().await;
        if self.is_connected() {
            return Ok(());
        }

        let link = self.inner.connector.connect().await?;
        let generation = self.inner.link_generation.fetch_add(1, Ordering::SeqCst) + 1;
        *lock(&self.inner.outgoing) = Some(link.outgoing);

        tokio::spawn(read_loop(self.inner.clone(), link.incoming, generation));
        Ok(())
    }

    /// Drops the link without reporting it as lost.
    pub fn disconnect(&self) {
        self.inner.link_generation.fetch_add(1, Ordering::SeqCst);
        if lock(&self.inner.outgoing).take().is_some() {
            info!("Disconnected from rendezvous");
        }
        fail_pending(&self.inner, SignalingError::NotConnected);
    }

    pub async fn create_session(&self, platform: &str) -> Result<SessionCode, SignalingError> {
        self.connect().await?;
        let signal = ClientSignal::CreateSession {
            platform: platform.to_owned(),
        };
        self.request(&self.inner.pending_create, "create", signal)
            .await
    }

    /// Joins by code; resolves to the session id and the host's peer id.
    pub async fn join_session(
        &self,
        code: &SessionCode,
    ) -> Result<(SessionCode, PeerId), SignalingError> {
        self.connect().await?;
        let signal = ClientSignal::JoinSession {
            code: code.as_str().to_owned(),
        };
        self.request(&self.inner.pending_join, "join", signal).await
    }

    pub fn end_session(&self, session_id: &SessionCode) -> Result<(), SignalingError> {
        self.send(ClientSignal::EndSession {
            session_id: session_id.clone(),
        })
    }

    pub fn send_mouse_event(
        &self,
        session_id: &SessionCode,
        event: MouseEvent,
    ) -> Result<(), SignalingError> {
        self.send(ClientSignal::MouseEvent {
            session_id: session_id.clone(),
            event,
        })
    }

    pub fn send_keyboard_event(
        &self,
        session_id: &SessionCode,
        event: KeyboardEvent,
    ) -> Result<(), SignalingError> {
        self.send(ClientSignal::KeyboardEvent {
            session_id: session_id.clone(),
            event,
        })
    }

    pub fn set_remote_control(
        &self,
        session_id: &SessionCode,
        enabled: bool,
    ) -> Result<(), SignalingError> {
        let session_id = session_id.clone();
        self.send(if enabled {
            ClientSignal::EnableRemoteControl { session_id }
        } else {
            ClientSignal::DisableRemoteControl { session_id }
        })
    }

    fn send(&self, signal: ClientSignal) -> Result<(), SignalingError> {
        let outgoing = lock(&self.inner.outgoing);
        let Some(tx) = outgoing.as_ref() else {
            return Err(SignalingError::NotConnected);
        };
        tx.send(signal).map_err(|_| SignalingError::ConnectionLost)
    }

    async fn request<T>(
        &self,
        slot: &Pending<T>,
        what: &'static str,
        signal: ClientSignal,
    ) -> Result<T, SignalingError> {
        let rx = {
            let mut pending = lock(slot);
            if pending.as_ref().is_some_and(|tx| !tx.is_closed()) {
                return Err(SignalingError::RequestInFlight(what));
            }
            let (tx, rx) = oneshot::channel();
            *pending = Some(tx);
            rx
        };

        if let Err(e) = self.send(signal) {
            lock(slot).take();
            return Err(e);
        }

        match tokio::time::timeout(self.inner.request_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SignalingError::ConnectionLost),
            Err(_) => {
                lock(slot).take();
                warn!("Rendezvous did not answer the {} request in time", what);
                Err(SignalingError::Timeout)
            }
        }
    }
}

fn resolve<T>(slot: &Pending<T>, value: Result<T, SignalingError>) -> bool {
    match lock(slot).take() {
        Some(tx) => tx.send(value).is_ok(),
        None => false,
    }
}

fn fail_pending(inner: &ClientInner, error: SignalingError) {
    resolve(&inner.pending_create, Err(error.clone()));
    resolve(&inner.pending_join, Err(error));
}

async fn read_loop(
    inner: Arc<ClientInner>,
    mut incoming: mpsc::UnboundedReceiver<ServerSignal>,
    generation: u64,
) {
    while let Some(signal) = incoming.recv().await {
        debug!("Rendezvous -> {:?}", signal);

        match &signal {
            ServerSignal::SessionCreated { session_id } => {
                resolve(&inner.pending_create, Ok(session_id.clone()));
            }
            ServerSignal::SessionJoined {
                session_id,
                host_id,
            } => {
                resolve(&inner.pending_join, Ok((session_id.clone(), *host_id)));
            }
            ServerSignal::Error { code, message } => {
                let error = SignalingError::Rejected {
                    code: *code,
                    message: message.clone(),
                };
                let consumed = match code {
                    SignalErrorCode::JoinFailed => resolve(&inner.pending_join, Err(error)),
                    SignalErrorCode::BadRequest => resolve(&inner.pending_create, Err(error)),
                    SignalErrorCode::NotInSession => false,
                };
                if consumed {
                    continue;
                }
            }
            _ => {}
        }

        if inner.events.send(signal.into()).is_err() {
            debug!("Signaling event receiver dropped");
        }
    }

    if inner.link_generation.load(Ordering::SeqCst) != generation {
        return;
    }

    warn!("Rendezvous link lost");
    lock(&inner.outgoing).take();
    fail_pending(&inner, SignalingError::ConnectionLost);
    let _ = inner
        .events
        .send(SignalingEvent::Error(SignalingError::ConnectionLost));
}

#[async_trait]
impl SignalingOutput for SignalingClient {
    async fn send_offer(&self, session_id: &SessionCode, sdp: String) -> Result<(), SignalingError> {
        self.send(ClientSignal::Offer {
            session_id: session_id.clone(),
            sdp,
        })
    }

    async fn send_answer(
        &self,
        session_id: &SessionCode,
        sdp: String,
    ) -> Result<(), SignalingError> {
        self.send(ClientSignal::Answer {
            session_id: session_id.clone(),
            sdp,
        })
    }

    async fn send_ice(
        &self,
        session_id: &SessionCode,
        candidate: IceCandidate,
    ) -> Result<(), SignalingError> {
        self.send(ClientSignal::IceCandidate {
            session_id: session_id.clone(),
            candidate,
        })
    }
}
