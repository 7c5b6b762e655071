use std::sync::Arc;
use std::time::Duration;
use tether_client::TransportConfig;
use tether_client::transport::{ConnectionNegotiator, ConnectionState, StateOutcome};
use tether_core::{Role, SessionCode};
use tokio::sync::mpsc;
use webrtc::api::media_engine::MIME_TYPE_OPUS;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

use crate::integration::init_tracing;
use crate::utils::{MockSignalingOutput, SignalMessage};

fn negotiator() -> (ConnectionNegotiator, MockSignalingOutput) {
    let (tx, _rx) = mpsc::channel(256);
    let signaling = MockSignalingOutput::new();
    let negotiator =
        ConnectionNegotiator::new(&TransportConfig::local_only(), Arc::new(signaling.clone()), tx);
    (negotiator, signaling)
}

fn code() -> SessionCode {
    SessionCode::parse("AB12CD34").unwrap()
}

fn ice_ufrag(sdp: &str) -> Option<&str> {
    sdp.lines()
        .find_map(|line| line.trim().strip_prefix("a=ice-ufrag:"))
}

/// A restart is refused while candidates are still being gathered.
async fn gathered(pc: &RTCPeerConnection) {
    let mut done = pc.gathering_complete_promise().await;
    let _ = tokio::time::timeout(Duration::from_secs(5), done.recv()).await;
}

/// Runs offer and answer between the two mocks without exchanging candidates.
async fn handshake(
    host: &ConnectionNegotiator,
    host_signals: &MockSignalingOutput,
    guest: &ConnectionNegotiator,
    guest_signals: &MockSignalingOutput,
) {
    host.create_offer().await.unwrap();
    let offer = host_signals.offers().await.pop().unwrap();

    guest.initialize(Role::Guest, &code()).await.unwrap();
    guest.handle_remote_offer(offer).await.unwrap();
    let answer = guest_signals
        .signals()
        .await
        .into_iter()
        .find_map(|s| match s {
            SignalMessage::Answer { sdp, .. } => Some(sdp),
            _ => None,
        })
        .unwrap();

    host.handle_remote_answer(answer).await.unwrap();
    assert!(host.is_handshake_complete().await);
}

#[tokio::test]
async fn test_host_restarts_ice_once_then_gives_up() {
    init_tracing();
    let (negotiator, signaling) = negotiator();
    negotiator.initialize(Role::Host, &code()).await.unwrap();
    negotiator.create_offer().await.unwrap();
    gathered(&negotiator.peer_connection().await.unwrap()).await;

    assert_eq!(
        negotiator.on_connection_state(ConnectionState::Connected).await,
        StateOutcome::Continue
    );
    assert_eq!(
        negotiator.on_connection_state(ConnectionState::Failed).await,
        StateOutcome::Restarting
    );

    let offers = signaling.offers().await;
    assert_eq!(offers.len(), 2);
    let (first, restart) = (ice_ufrag(&offers[0]), ice_ufrag(&offers[1]));
    assert!(first.is_some() && restart.is_some());
    assert_ne!(first, restart, "restart offer must carry fresh ICE credentials");

    assert_eq!(
        negotiator.on_connection_state(ConnectionState::Failed).await,
        StateOutcome::Terminal
    );
    assert_eq!(signaling.offers().await.len(), 2);
}

#[tokio::test]
async fn test_guest_waits_for_the_host_to_restart() {
    init_tracing();
    let (negotiator, signaling) = negotiator();
    negotiator.initialize(Role::Guest, &code()).await.unwrap();

    assert_eq!(
        negotiator.on_connection_state(ConnectionState::Failed).await,
        StateOutcome::Restarting
    );
    assert_eq!(
        negotiator.on_connection_state(ConnectionState::Failed).await,
        StateOutcome::Terminal
    );
    assert!(signaling.offers().await.is_empty());
}

#[tokio::test]
async fn test_failure_without_a_connection_is_ignored() {
    init_tracing();
    let (negotiator, _) = negotiator();
    assert_eq!(
        negotiator.on_connection_state(ConnectionState::Failed).await,
        StateOutcome::Continue
    );
}

#[tokio::test]
async fn test_adding_audio_keeps_receiving_video() {
    init_tracing();
    let (host, host_signals) = negotiator();
    let (guest, guest_signals) = negotiator();
    host.initialize(Role::Host, &code()).await.unwrap();

    let pc = host.peer_connection().await.unwrap();
    pc.add_transceiver_from_kind(
        RTPCodecType::Video,
        Some(RTCRtpTransceiverInit {
            direction: RTCRtpTransceiverDirection::Recvonly,
            send_encodings: vec![],
        }),
    )
    .await
    .unwrap();

    handshake(&host, &host_signals, &guest, &guest_signals).await;
    assert!(host.receiving_kinds().await.contains(&RTPCodecType::Video));

    let microphone = Arc::new(TrackLocalStaticSample::new(
        RTCRtpCodecCapability {
            mime_type: MIME_TYPE_OPUS.to_owned(),
            ..Default::default()
        },
        "microphone".to_owned(),
        "tether".to_owned(),
    ));
    host.add_audio_track(microphone).await.unwrap();

    let receiving = host.receiving_kinds().await;
    assert!(receiving.contains(&RTPCodecType::Video));
    assert!(receiving.contains(&RTPCodecType::Audio));

    // Renegotiated with both sections.
    let offers = host_signals.offers().await;
    assert_eq!(offers.len(), 2);
    assert!(offers[1].contains("m=video"));
    assert!(offers[1].contains("m=audio"));
}
