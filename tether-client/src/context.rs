use crate::config::EngineConfig;
use crate::error::{SessionError, SignalingError};
use crate::input::{InputDispatcher, InputSender, RemoteInputCapability};
use crate::observer::{Observers, Subscription};
use crate::session::{HistoryStore, MemoryHistoryStore, SessionState, SessionStateMachine};
use crate::signaling::{SignalingClient, SignalingConnector, SignalingEvent, WsConnector};
use crate::transfer::{DirectorySink, FileSink, TransferManager};
use crate::transport::{
    CaptureProvider, ConnectionNegotiator, ConnectionState, ConnectionStats, PipeMessage,
    StateOutcome, TransportEvent,
};
use crate::util::lock;
use std::sync::{Arc, Mutex};
use tether_core::{ChannelLabel, InputEvent, Role, SessionCode};
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use webrtc::track::track_remote::TrackRemote;

/// Notifications for the application layer.
#[derive(Clone)]
pub enum ContextEvent {
    /// A semantic input event from the peer, via either path.
    InputReceived(InputEvent),
    ChannelOpened(ChannelLabel),
    /// The peer connection failed again after its restart.
    ConnectionFailed,
    RemoteTrack(Arc<TrackRemote>),
    SignalingError(SignalingError),
}

struct ContextInner {
    config: EngineConfig,
    signaling: SignalingClient,
    negotiator: ConnectionNegotiator,
    state: SessionStateMachine,
    input: Arc<InputSender>,
    transfers: TransferManager,
    dispatcher: Option<InputDispatcher>,
    capture: Option<Arc<dyn CaptureProvider>>,
    events: Observers<ContextEvent>,
    shutdown: Notify,
}

/// Everything that makes up one participant, owned in one place.
///
/// Build it once at the composition root and hand clones to whatever needs it.
/// Signaling and transport callbacks are folded in by a single event loop
/// task, so components never see two events at the same time.
#[derive(Clone)]
pub struct SessionContext {
    inner: Arc<ContextInner>,
    event_loop: Arc<Mutex<Option<JoinHandle<()>>>>,
}

pub struct SessionContextBuilder {
    config: EngineConfig,
    connector: Option<Arc<dyn SignalingConnector>>,
    history: Option<Arc<dyn HistoryStore>>,
    sink: Option<Arc<dyn FileSink>>,
    capture: Option<Arc<dyn CaptureProvider>>,
    remote_input: Option<Arc<dyn RemoteInputCapability>>,
}

impl SessionContextBuilder {
    pub fn connector(mut self, connector: Arc<dyn SignalingConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn history(mut self, history: Arc<dyn HistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn file_sink(mut self, sink: Arc<dyn FileSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn capture(mut self, capture: Arc<dyn CaptureProvider>) -> Self {
        self.capture = Some(capture);
        self
    }

    pub fn remote_input(mut self, capability: Arc<dyn RemoteInputCapability>) -> Self {
        self.remote_input = Some(capability);
        self
    }

    /// Wires the components together and starts the event loop. Needs a Tokio runtime.
    pub fn build(self) -> SessionContext {
        let config = self.config;
        let connector = self
            .connector
            .unwrap_or_else(|| Arc::new(WsConnector::new(config.signaling_url.clone())));
        let history = self
            .history
            .unwrap_or_else(|| Arc::new(MemoryHistoryStore::new()));
        let sink = self.sink.unwrap_or_else(|| {
            Arc::new(DirectorySink::new(
                std::env::temp_dir().join("tether-downloads"),
            ))
        });

        let (signaling, signaling_rx) = SignalingClient::new(connector, config.join_timeout);
        let (transport_tx, transport_rx) = mpsc::channel(256);

        let negotiator = ConnectionNegotiator::new(
            &config.transport,
            Arc::new(signaling.clone()),
            transport_tx,
        );
        let state = SessionStateMachine::new(
            signaling.clone(),
            history,
            config.platform.clone(),
            config.create_timeout,
            config.join_timeout,
        );

        let input = Arc::new(InputSender::new(Arc::new(signaling.clone())));
        let relay_input = input.clone();
        state
            .subscribe(move |change| relay_input.set_session(change.next.session_id.clone()))
            .detach();

        let inner = Arc::new(ContextInner {
            transfers: TransferManager::new(config.transfer.clone(), sink),
            dispatcher: self.remote_input.map(InputDispatcher::new),
            capture: self.capture,
            config,
            signaling,
            negotiator,
            state,
            input,
            events: Observers::new(),
            shutdown: Notify::new(),
        });

        let handle = tokio::spawn(run(inner.clone(), signaling_rx, transport_rx));
        SessionContext {
            inner,
            event_loop: Arc::new(Mutex::new(Some(handle))),
        }
    }
}

impl SessionContext {
    pub fn builder(config: EngineConfig) -> SessionContextBuilder {
        SessionContextBuilder {
            config,
            connector: None,
            history: None,
            sink: None,
            capture: None,
            remote_input: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn session(&self) -> &SessionStateMachine {
        &self.inner.state
    }

    pub fn state(&self) -> SessionState {
        self.inner.state.get_state()
    }

    pub fn input(&self) -> &InputSender {
        &self.inner.input
    }

    pub fn transfers(&self) -> &TransferManager {
        &self.inner.transfers
    }

    pub fn negotiator(&self) -> &ConnectionNegotiator {
        &self.inner.negotiator
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ContextEvent) + Send + Sync + 'static,
    {
        self.inner.events.subscribe(listener)
    }

    pub async fn create_session(&self) -> Result<SessionCode, SessionError> {
        self.inner.state.create_session().await
    }

    pub async fn join_session(&self, code: &str) -> Result<SessionCode, SessionError> {
        self.inner.state.join_session(code).await
    }

    /// Ends the session and tears the peer link down. Idempotent.
    pub async fn end_session(&self) {
        if !self.inner.state.is_active() {
            return;
        }
        self.inner.state.end_session();
        self.inner.drop_peer("session ended").await;
    }

    /// Guest side: ask the host to accept (or stop accepting) our input.
    pub fn set_remote_control(&self, enabled: bool) -> Result<(), SessionError> {
        let session_id = self
            .inner
            .state
            .get_state()
            .session_id
            .ok_or(SessionError::NotActive)?;
        self.inner
            .signaling
            .set_remote_control(&session_id, enabled)?;
        Ok(())
    }

    fn capture(&self) -> Result<&Arc<dyn CaptureProvider>, SessionError> {
        self.inner.capture.as_ref().ok_or_else(|| {
            SessionError::Capability(crate::error::CapabilityError::Unavailable(
                "no capture provider configured".into(),
            ))
        })
    }

    pub async fn start_screen_share(&self) -> Result<(), SessionError> {
        let stream = self.capture()?.screen_stream().await?;
        self.inner.negotiator.add_media_stream(stream).await?;
        self.inner.state.set_screen_sharing(true);
        Ok(())
    }

    pub async fn stop_screen_share(&self) -> Result<(), SessionError> {
        self.inner.negotiator.remove_media_stream().await?;
        self.inner.state.set_screen_sharing(false);
        Ok(())
    }

    pub async fn start_audio(&self) -> Result<(), SessionError> {
        let track = self.capture()?.microphone_track().await?;
        self.inner.negotiator.add_audio_track(track).await?;
        Ok(())
    }

    pub async fn stop_audio(&self) -> Result<(), SessionError> {
        self.inner.negotiator.stop_audio_stream().await?;
        Ok(())
    }

    pub async fn connection_stats(&self) -> Result<ConnectionStats, SessionError> {
        Ok(self.inner.negotiator.get_connection_stats().await?)
    }

    /// Ends any session, closes both links and stops the event loop.
    pub async fn shutdown(&self) {
        self.end_session().await;
        self.inner.negotiator.close().await;
        self.inner.signaling.disconnect();
        self.inner.shutdown.notify_one();

        let handle = lock(&self.event_loop).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Session event loop ended abnormally: {}", e);
            }
        }
    }
}

async fn run(
    inner: Arc<ContextInner>,
    mut signaling_rx: mpsc::UnboundedReceiver<SignalingEvent>,
    mut transport_rx: mpsc::Receiver<TransportEvent>,
) {
    info!("Session event loop started");

    loop {
        tokio::select! {
            _ = inner.shutdown.notified() => break,

            evt = signaling_rx.recv() => {
                match evt {
                    Some(e) => inner.handle_signaling(e).await,
                    None => {
                        info!("Signaling event channel closed");
                        break;
                    }
                }
            }

            evt = transport_rx.recv() => {
                match evt {
                    Some(e) => inner.handle_transport(e).await,
                    None => {
                        warn!("Transport channel closed unexpectedly");
                        break;
                    }
                }
            }
        }
    }

    info!("Session event loop finished");
}

impl ContextInner {
    async fn handle_signaling(&self, event: SignalingEvent) {
        let previous_peer = self.state.get_state().peer_id;
        self.state.apply(&event);

        match event {
            SignalingEvent::Welcome(peer_id) => debug!("Rendezvous assigned peer id {}", peer_id),
            SignalingEvent::IceConfig(servers) => self.negotiator.set_ice_servers(servers),
            SignalingEvent::SessionCreated(session_id) => {
                if self.state.is_current(Role::Host, &session_id) {
                    self.initialize(Role::Host, &session_id).await;
                }
            }
            SignalingEvent::SessionJoined { session_id, .. } => {
                if self.state.is_current(Role::Guest, &session_id) {
                    self.initialize(Role::Guest, &session_id).await;
                }
            }
            SignalingEvent::GuestJoined(guest_id) => {
                let Some(session_id) = self.state.get_state().session_id else {
                    return;
                };
                if previous_peer.is_some_and(|peer| peer != guest_id) {
                    info!("Guest {} replaces a guest that never left", guest_id);
                    self.drop_peer("replaced by a new guest").await;
                }
                info!("Guest {} joined; starting negotiation", guest_id);
                self.initialize(Role::Host, &session_id).await;
                if let Err(e) = self.negotiator.create_offer().await {
                    error!("Failed to create offer: {}", e);
                }
            }
            SignalingEvent::GuestLeft(guest_id) => {
                info!("Guest {} left", guest_id);
                self.drop_peer("guest left").await;
            }
            SignalingEvent::OfferReceived(sdp) => {
                if let Err(e) = self.negotiator.handle_remote_offer(sdp).await {
                    error!("Failed to handle remote offer: {}", e);
                }
            }
            SignalingEvent::AnswerReceived(sdp) => {
                if let Err(e) = self.negotiator.handle_remote_answer(sdp).await {
                    error!("Failed to handle remote answer: {}", e);
                }
            }
            SignalingEvent::CandidateReceived(candidate) => {
                if let Err(e) = self.negotiator.add_remote_candidate(candidate).await {
                    warn!("Failed to add remote candidate: {}", e);
                }
            }
            SignalingEvent::HostDisconnected => self.drop_peer("host disconnected").await,
            SignalingEvent::SessionEnded => self.drop_peer("session ended by peer").await,
            SignalingEvent::MouseEvent(event) => self.deliver_input(event.into()),
            SignalingEvent::KeyboardEvent(event) => self.deliver_input(event.into()),
            SignalingEvent::RemoteControl(enabled) => match &self.dispatcher {
                Some(dispatcher) => dispatcher.set_remote_control(enabled),
                None => debug!(enabled, "Remote control request without an input capability"),
            },
            SignalingEvent::Error(err) => {
                warn!("Signaling error: {}", err);
                self.events.notify(&ContextEvent::SignalingError(err));
            }
        }
    }

    async fn handle_transport(&self, event: TransportEvent) {
        match event {
            TransportEvent::StateChanged(state) => {
                self.state
                    .set_webrtc_connected(state == ConnectionState::Connected);
                if self.negotiator.on_connection_state(state).await == StateOutcome::Terminal {
                    self.transfers.channel_closed("peer connection failed");
                    self.events.notify(&ContextEvent::ConnectionFailed);
                }
            }
            TransportEvent::CandidateGenerated(candidate) => {
                if let Err(e) = self.negotiator.send_local_candidate(candidate).await {
                    warn!("Failed to send local candidate: {}", e);
                }
            }
            TransportEvent::ChannelOpen(label, pipe) => {
                match label {
                    ChannelLabel::Input => self.input.attach(pipe),
                    ChannelLabel::FileTransfer => self.transfers.attach(pipe),
                }
                self.events.notify(&ContextEvent::ChannelOpened(label));
            }
            TransportEvent::ChannelClosed(label) => match label {
                ChannelLabel::Input => self.input.detach(),
                ChannelLabel::FileTransfer => {
                    self.transfers
                        .channel_closed("file-transfer channel closed")
                }
            },
            TransportEvent::Message(ChannelLabel::Input, PipeMessage::Binary(bytes)) => {
                match InputEvent::decode(&bytes) {
                    Ok(event) => self.deliver_input(event),
                    Err(e) => warn!("Undecodable input event: {}", e),
                }
            }
            TransportEvent::Message(ChannelLabel::Input, PipeMessage::Text(_)) => {
                warn!("Ignoring text message on the input channel");
            }
            TransportEvent::Message(ChannelLabel::FileTransfer, message) => {
                self.transfers.handle_message(message).await;
            }
            TransportEvent::RemoteTrack(track) => {
                info!("Remote {} track {}", track.kind(), track.id());
                self.events.notify(&ContextEvent::RemoteTrack(track));
            }
        }
    }

    async fn initialize(&self, role: Role, session_id: &SessionCode) {
        if let Err(e) = self.negotiator.initialize(role, session_id).await {
            error!(session = %session_id, "Failed to initialize peer connection: {}", e);
            return;
        }
        // The session may have ended while the connection was being built.
        if !self.state.is_current(role, session_id) {
            debug!(session = %session_id, "Session ended during initialization");
            self.negotiator.close().await;
        }
    }

    fn deliver_input(&self, event: InputEvent) {
        if let Some(dispatcher) = &self.dispatcher {
            if let Err(e) = dispatcher.dispatch(&event) {
                warn!("Input injection failed: {}", e);
            }
        }
        self.events.notify(&ContextEvent::InputReceived(event));
    }

    /// The peer is gone: tear down the link and fail whatever was in flight.
    async fn drop_peer(&self, reason: &str) {
        self.negotiator.close().await;
        self.input.detach();
        self.transfers.channel_closed(reason);
    }
}
