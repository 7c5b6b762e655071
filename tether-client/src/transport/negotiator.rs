use crate::config::TransportConfig;
use crate::error::NegotiationError;
use crate::signaling::SignalingOutput;
use crate::transport::{
    BitrateSampler, CandidateBuffer, ConnectionState, ConnectionStats, EncoderParameters,
    MediaStream, PipeMessage, RtcPipe, TransportEvent,
};
use crate::util::lock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as SyncMutex};
use std::time::Instant;
use tether_core::{ChannelLabel, IceCandidate, IceServerConfig, Role, SessionCode};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info, warn};
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::data_channel::RTCDataChannel;
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::offer_answer_options::RTCOfferOptions;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

/// What the caller should do after a connection state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateOutcome {
    Continue,
    /// First failure: an ICE restart is under way.
    Restarting,
    /// Second failure. The negotiator gives up; the caller decides what to tell the user.
    Terminal,
}

fn to_rtc_candidate(c: IceCandidate) -> RTCIceCandidateInit {
    RTCIceCandidateInit {
        candidate: c.candidate,
        sdp_mid: c.sdp_mid,
        sdp_mline_index: c.sdp_m_line_index,
        username_fragment: c.username_fragment,
    }
}

fn to_wire_candidate(c: RTCIceCandidateInit) -> IceCandidate {
    IceCandidate {
        candidate: c.candidate,
        sdp_mid: c.sdp_mid,
        sdp_m_line_index: c.sdp_mline_index,
        username_fragment: c.username_fragment,
    }
}

fn rtc_ice_servers(servers: &[IceServerConfig]) -> Vec<RTCIceServer> {
    servers
        .iter()
        .map(|s| RTCIceServer {
            urls: s.urls.clone(),
            username: s.username.clone().unwrap_or_default(),
            credential: s.credential.clone().unwrap_or_default(),
            ..Default::default()
        })
        .collect()
}

/// Forwards callbacks of one peer connection; silent once that connection is replaced.
#[derive(Clone)]
struct EventSink {
    tx: mpsc::Sender<TransportEvent>,
    generation: Arc<AtomicU64>,
    mine: u64,
}

impl EventSink {
    fn is_current(&self) -> bool {
        self.generation.load(Ordering::SeqCst) == self.mine
    }

    async fn emit(&self, event: TransportEvent) {
        if !self.is_current() {
            return;
        }
        if self.tx.send(event).await.is_err() {
            debug!("Transport event receiver dropped");
        }
    }
}

struct ActiveNegotiation {
    session_id: SessionCode,
    role: Role,
    pc: Arc<RTCPeerConnection>,
    candidates: CandidateBuffer<IceCandidate>,
    handshake_complete: bool,
    restart_attempted: bool,
    media_senders: Vec<Arc<RTCRtpSender>>,
    audio_sender: Option<Arc<RTCRtpSender>>,
}

/// Owns the one peer connection of the current session.
pub struct ConnectionNegotiator {
    ice_servers: SyncMutex<Vec<IceServerConfig>>,
    signaling: Arc<dyn SignalingOutput>,
    event_tx: mpsc::Sender<TransportEvent>,
    generation: Arc<AtomicU64>,
    active: Mutex<Option<ActiveNegotiation>>,
    sampler: SyncMutex<BitrateSampler>,
}

impl ConnectionNegotiator {
    pub fn new(
        config: &TransportConfig,
        signaling: Arc<dyn SignalingOutput>,
        event_tx: mpsc::Sender<TransportEvent>,
    ) -> Self {
        Self {
            ice_servers: SyncMutex::new(config.ice_servers.clone()),
            signaling,
            event_tx,
            generation: Arc::new(AtomicU64::new(0)),
            active: Mutex::new(None),
            sampler: SyncMutex::new(BitrateSampler::default()),
        }
    }

    /// Takes effect for the next connection.
    pub fn set_ice_servers(&self, servers: Vec<IceServerConfig>) {
        debug!("Using {} ICE server entries", servers.len());
        *lock(&self.ice_servers) = servers;
    }

    /// Prepares the peer connection for `session_id`.
    ///
    /// A repeated call for the current session does nothing. A call for another
    /// session closes the current connection before building the new one.
    pub async fn initialize(
        &self,
        role: Role,
        session_id: &SessionCode,
    ) -> Result<(), NegotiationError> {
        let mut active = self.active.lock().await;

        if let Some(current) = active.as_ref() {
            if &current.session_id == session_id {
                debug!(session = %session_id, "Negotiator already initialized");
                return Ok(());
            }
        }
        if let Some(previous) = active.take() {
            self.teardown(previous).await;
        }

        let mine = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let sink = EventSink {
            tx: self.event_tx.clone(),
            generation: self.generation.clone(),
            mine,
        };
        let pc = self.build_peer_connection(sink.clone()).await?;

        if role.is_initiator() {
            for label in ChannelLabel::ALL {
                let init = RTCDataChannelInit {
                    ordered: Some(true),
                    ..Default::default()
                };
                let channel = pc.create_data_channel(label.as_str(), Some(init)).await?;
                bind_channel(label, channel, sink.clone());
            }
        }

        *lock(&self.sampler) = BitrateSampler::default();
        *active = Some(ActiveNegotiation {
            session_id: session_id.clone(),
            role,
            pc,
            candidates: CandidateBuffer::new(),
            handshake_complete: false,
            restart_attempted: false,
            media_senders: Vec::new(),
            audio_sender: None,
        });

        info!(session = %session_id, ?role, "Peer connection initialized");
        Ok(())
    }

    async fn build_peer_connection(
        &self,
        sink: EventSink,
    ) -> Result<Arc<RTCPeerConnection>, NegotiationError> {
        let mut media = MediaEngine::default();
        media.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut media)?;

        let api = APIBuilder::new()
            .with_media_engine(media)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: rtc_ice_servers(&lock(&self.ice_servers)),
            ..Default::default()
        };
        let pc = Arc::new(api.new_peer_connection(rtc_config).await?);

        let state_sink = sink.clone();
        pc.on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
            let sink = state_sink.clone();
            Box::pin(async move {
                info!("Peer connection state changed: {:?}", s);
                sink.emit(TransportEvent::StateChanged(s.into())).await;
            })
        }));

        let ice_sink = sink.clone();
        pc.on_ice_candidate(Box::new(move |c: Option<RTCIceCandidate>| {
            let sink = ice_sink.clone();
            Box::pin(async move {
                let Some(candidate) = c else { return };
                let Ok(init) = candidate.to_json() else {
                    return;
                };
                sink.emit(TransportEvent::CandidateGenerated(to_wire_candidate(init)))
                    .await;
            })
        }));

        let dc_sink = sink.clone();
        pc.on_data_channel(Box::new(move |channel: Arc<RTCDataChannel>| {
            let sink = dc_sink.clone();
            Box::pin(async move {
                let Some(label) = ChannelLabel::from_label(channel.label()) else {
                    warn!("Ignoring unknown data channel '{}'", channel.label());
                    return;
                };
                debug!("Inbound data channel '{}'", label);
                bind_channel(label, channel, sink);
            })
        }));

        let track_sink = sink;
        pc.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let sink = track_sink.clone();
                Box::pin(async move {
                    sink.emit(TransportEvent::RemoteTrack(track)).await;
                })
            },
        ));

        Ok(pc)
    }

    /// Builds a local description and sends it to the other participant.
    pub async fn create_offer(&self) -> Result<(), NegotiationError> {
        let mut guard = self.active.lock().await;
        let active = guard.as_mut().ok_or(NegotiationError::NotInitialized)?;
        self.send_offer(active, false).await
    }

    async fn send_offer(
        &self,
        active: &mut ActiveNegotiation,
        ice_restart: bool,
    ) -> Result<(), NegotiationError> {
        let options = ice_restart.then(|| RTCOfferOptions {
            ice_restart: true,
            ..Default::default()
        });
        let offer = active.pc.create_offer(options).await?;
        active.pc.set_local_description(offer.clone()).await?;
        debug!(session = %active.session_id, ice_restart, "Sending offer");
        self.signaling
            .send_offer(&active.session_id, offer.sdp)
            .await?;
        Ok(())
    }

    pub async fn handle_remote_offer(&self, sdp: String) -> Result<(), NegotiationError> {
        let mut guard = self.active.lock().await;
        let active = guard.as_mut().ok_or(NegotiationError::NotInitialized)?;

        let offer = RTCSessionDescription::offer(sdp)?;
        active.pc.set_remote_description(offer).await?;
        flush_candidates(active).await;

        let answer = active.pc.create_answer(None).await?;
        active.pc.set_local_description(answer.clone()).await?;
        self.signaling
            .send_answer(&active.session_id, answer.sdp)
            .await?;

        active.handshake_complete = true;
        Ok(())
    }

    pub async fn handle_remote_answer(&self, sdp: String) -> Result<(), NegotiationError> {
        let mut guard = self.active.lock().await;
        let active = guard.as_mut().ok_or(NegotiationError::NotInitialized)?;

        let answer = RTCSessionDescription::answer(sdp)?;
        active.pc.set_remote_description(answer).await?;
        flush_candidates(active).await;

        active.handshake_complete = true;
        Ok(())
    }

    /// Applies a remote candidate, or queues it until the remote description lands.
    pub async fn add_remote_candidate(
        &self,
        candidate: IceCandidate,
    ) -> Result<(), NegotiationError> {
        let mut guard = self.active.lock().await;
        let active = guard.as_mut().ok_or(NegotiationError::NotInitialized)?;

        match active.candidates.offer(candidate) {
            Some(candidate) => active.pc.add_ice_candidate(to_rtc_candidate(candidate)).await?,
            None => debug!(
                queued = active.candidates.len(),
                "Buffered remote candidate"
            ),
        }
        Ok(())
    }

    /// Hands a locally gathered candidate to signaling.
    pub async fn send_local_candidate(
        &self,
        candidate: IceCandidate,
    ) -> Result<(), NegotiationError> {
        let session_id = {
            let guard = self.active.lock().await;
            let active = guard.as_ref().ok_or(NegotiationError::NotInitialized)?;
            active.session_id.clone()
        };
        self.signaling.send_ice(&session_id, candidate).await?;
        Ok(())
    }

    /// Attaches outbound tracks and switches the encoder to low-latency settings.
    pub async fn add_media_stream(&self, stream: MediaStream) -> Result<(), NegotiationError> {
        let mut guard = self.active.lock().await;
        let active = guard.as_mut().ok_or(NegotiationError::NotInitialized)?;

        for track in stream.tracks {
            let sender = active.pc.add_track(track).await?;
            active.media_senders.push(sender);
        }
        if let Some(encoder) = &stream.encoder {
            encoder.apply(&EncoderParameters::low_latency())?;
        }
        info!(stream = %stream.id, "Media stream attached");

        self.renegotiate(active).await
    }

    pub async fn remove_media_stream(&self) -> Result<(), NegotiationError> {
        let mut guard = self.active.lock().await;
        let active = guard.as_mut().ok_or(NegotiationError::NotInitialized)?;
        if active.media_senders.is_empty() {
            return Ok(());
        }

        for sender in active.media_senders.drain(..) {
            active.pc.remove_track(&sender).await?;
        }
        self.renegotiate(active).await
    }

    /// Adds outbound audio. Receive directions negotiated so far are kept.
    pub async fn add_audio_track(
        &self,
        track: Arc<dyn TrackLocal + Send + Sync>,
    ) -> Result<(), NegotiationError> {
        let mut guard = self.active.lock().await;
        let active = guard.as_mut().ok_or(NegotiationError::NotInitialized)?;
        if active.audio_sender.is_some() {
            return Ok(());
        }

        let receiving = receiving_transceivers(&active.pc).await;
        active.audio_sender = Some(active.pc.add_track(track).await?);
        for transceiver in receiving {
            let direction = transceiver.direction();
            if !direction.has_recv() {
                warn!("Restoring receive direction of {:?} transceiver", transceiver.kind());
                transceiver
                    .set_direction(RTCRtpTransceiverDirection::from_send_recv(
                        direction.has_send(),
                        true,
                    ))
                    .await;
            }
        }

        self.renegotiate(active).await
    }

    pub async fn stop_audio_stream(&self) -> Result<(), NegotiationError> {
        let mut guard = self.active.lock().await;
        let active = guard.as_mut().ok_or(NegotiationError::NotInitialized)?;
        let Some(sender) = active.audio_sender.take() else {
            return Ok(());
        };

        active.pc.remove_track(&sender).await?;
        self.renegotiate(active).await
    }

    async fn renegotiate(&self, active: &mut ActiveNegotiation) -> Result<(), NegotiationError> {
        if !active.handshake_complete {
            return Ok(());
        }
        self.send_offer(active, false).await
    }

    /// Media kinds currently received from the peer.
    pub async fn receiving_kinds(&self) -> Vec<RTPCodecType> {
        let pc = {
            let guard = self.active.lock().await;
            match guard.as_ref() {
                Some(active) => active.pc.clone(),
                None => return Vec::new(),
            }
        };
        receiving_kinds(&pc).await
    }

    pub async fn get_connection_stats(&self) -> Result<ConnectionStats, NegotiationError> {
        let pc = self.peer_connection().await.ok_or(NegotiationError::NotInitialized)?;
        let report = pc.get_stats().await;
        let mut sampler = lock(&self.sampler);
        Ok(ConnectionStats::from_report(
            &report,
            &mut sampler,
            Instant::now(),
        ))
    }

    /// Applies the restart policy to a connection state change.
    ///
    /// The first `Failed` of a connection spends its single restart: the
    /// initiating side sends an ICE-restart offer, the responder waits for it.
    pub async fn on_connection_state(&self, state: ConnectionState) -> StateOutcome {
        if state != ConnectionState::Failed {
            return StateOutcome::Continue;
        }

        let mut guard = self.active.lock().await;
        let Some(active) = guard.as_mut() else {
            return StateOutcome::Continue;
        };

        if active.restart_attempted {
            error!(session = %active.session_id, "Peer connection failed after restart");
            return StateOutcome::Terminal;
        }
        active.restart_attempted = true;

        if !active.role.is_initiator() {
            info!("Peer connection failed; waiting for the host to restart ICE");
            return StateOutcome::Restarting;
        }

        warn!(session = %active.session_id, "Peer connection failed; restarting ICE");
        match self.send_offer(active, true).await {
            Ok(()) => StateOutcome::Restarting,
            Err(e) => {
                error!("ICE restart failed: {}", e);
                StateOutcome::Terminal
            }
        }
    }

    pub async fn close(&self) {
        let previous = self.active.lock().await.take();
        if let Some(previous) = previous {
            self.teardown(previous).await;
        }
    }

    async fn teardown(&self, previous: ActiveNegotiation) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        info!(session = %previous.session_id, "Closing peer connection");
        if let Err(e) = previous.pc.close().await {
            warn!("Failed to close peer connection: {}", e);
        }
    }

    pub async fn connection_state(&self) -> Option<ConnectionState> {
        let guard = self.active.lock().await;
        guard.as_ref().map(|a| a.pc.connection_state().into())
    }

    pub async fn is_handshake_complete(&self) -> bool {
        let guard = self.active.lock().await;
        guard.as_ref().is_some_and(|a| a.handshake_complete)
    }

    pub async fn session_id(&self) -> Option<SessionCode> {
        let guard = self.active.lock().await;
        guard.as_ref().map(|a| a.session_id.clone())
    }

    pub async fn peer_connection(&self) -> Option<Arc<RTCPeerConnection>> {
        let guard = self.active.lock().await;
        guard.as_ref().map(|a| a.pc.clone())
    }
}

async fn flush_candidates(active: &mut ActiveNegotiation) {
    let backlog = active.candidates.mark_applied();
    if backlog.is_empty() {
        return;
    }
    debug!(count = backlog.len(), "Applying buffered remote candidates");
    for candidate in backlog {
        if let Err(e) = active.pc.add_ice_candidate(to_rtc_candidate(candidate)).await {
            warn!("Failed to apply buffered candidate: {}", e);
        }
    }
}

async fn receiving_transceivers(pc: &RTCPeerConnection) -> Vec<Arc<RTCRtpTransceiver>> {
    pc.get_transceivers()
        .await
        .into_iter()
        .filter(|t| t.direction().has_recv())
        .collect()
}

async fn receiving_kinds(pc: &RTCPeerConnection) -> Vec<RTPCodecType> {
    receiving_transceivers(pc)
        .await
        .iter()
        .map(|t| t.kind())
        .collect()
}

fn bind_channel(label: ChannelLabel, channel: Arc<RTCDataChannel>, sink: EventSink) {
    let open_sink = sink.clone();
    let open_channel = channel.clone();
    channel.on_open(Box::new(move || {
        Box::pin(async move {
            info!("Data channel '{}' open", label);
            let pipe = RtcPipe::new(label, open_channel).await;
            open_sink
                .emit(TransportEvent::ChannelOpen(label, Arc::new(pipe)))
                .await;
        })
    }));

    let close_sink = sink.clone();
    channel.on_close(Box::new(move || {
        let sink = close_sink.clone();
        Box::pin(async move {
            info!("Data channel '{}' closed", label);
            sink.emit(TransportEvent::ChannelClosed(label)).await;
        })
    }));

    channel.on_message(Box::new(move |msg: DataChannelMessage| {
        let sink = sink.clone();
        Box::pin(async move {
            let message = if msg.is_string {
                PipeMessage::Text(String::from_utf8_lossy(&msg.data).into_owned())
            } else {
                PipeMessage::Binary(msg.data)
            };
            sink.emit(TransportEvent::Message(label, message)).await;
        })
    }));
}
