use crate::transport::{DataPipe, PipeMessage};
use std::sync::Arc;
use tether_core::{ChannelLabel, IceCandidate};
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::track::track_remote::TrackRemote;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl From<RTCPeerConnectionState> for ConnectionState {
    fn from(state: RTCPeerConnectionState) -> Self {
        match state {
            RTCPeerConnectionState::Unspecified | RTCPeerConnectionState::New => Self::New,
            RTCPeerConnectionState::Connecting => Self::Connecting,
            RTCPeerConnectionState::Connected => Self::Connected,
            RTCPeerConnectionState::Disconnected => Self::Disconnected,
            RTCPeerConnectionState::Failed => Self::Failed,
            RTCPeerConnectionState::Closed => Self::Closed,
        }
    }
}

/// Callbacks of the active peer connection, forwarded into the session event loop.
pub enum TransportEvent {
    StateChanged(ConnectionState),
    CandidateGenerated(IceCandidate),
    ChannelOpen(ChannelLabel, Arc<dyn DataPipe>),
    ChannelClosed(ChannelLabel),
    Message(ChannelLabel, PipeMessage),
    RemoteTrack(Arc<TrackRemote>),
}
