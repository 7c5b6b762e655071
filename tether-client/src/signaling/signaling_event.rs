use crate::error::SignalingError;
use tether_core::{
    IceCandidate, IceServerConfig, KeyboardEvent, MouseEvent, PeerId, ServerSignal, SessionCode,
};

/// Everything the rendezvous link reports, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalingEvent {
    Welcome(PeerId),
    IceConfig(Vec<IceServerConfig>),
    SessionCreated(SessionCode),
    SessionJoined {
        session_id: SessionCode,
        host_id: PeerId,
    },
    GuestJoined(PeerId),
    GuestLeft(PeerId),
    OfferReceived(String),
    AnswerReceived(String),
    CandidateReceived(IceCandidate),
    HostDisconnected,
    SessionEnded,
    MouseEvent(MouseEvent),
    KeyboardEvent(KeyboardEvent),
    RemoteControl(bool),
    Error(SignalingError),
}

impl From<ServerSignal> for SignalingEvent {
    fn from(signal: ServerSignal) -> Self {
        match signal {
            ServerSignal::Welcome { peer_id } => Self::Welcome(peer_id),
            ServerSignal::IceConfig { ice_servers } => Self::IceConfig(ice_servers),
            ServerSignal::SessionCreated { session_id } => Self::SessionCreated(session_id),
            ServerSignal::SessionJoined {
                session_id,
                host_id,
            } => Self::SessionJoined {
                session_id,
                host_id,
            },
            ServerSignal::GuestJoined { guest_id } => Self::GuestJoined(guest_id),
            ServerSignal::GuestLeft { guest_id } => Self::GuestLeft(guest_id),
            ServerSignal::Offer { sdp } => Self::OfferReceived(sdp),
            ServerSignal::Answer { sdp } => Self::AnswerReceived(sdp),
            ServerSignal::IceCandidate { candidate } => Self::CandidateReceived(candidate),
            ServerSignal::HostDisconnected => Self::HostDisconnected,
            ServerSignal::SessionEnded => Self::SessionEnded,
            ServerSignal::MouseEvent { event } => Self::MouseEvent(event),
            ServerSignal::KeyboardEvent { event } => Self::KeyboardEvent(event),
            ServerSignal::RemoteControl { enabled } => Self::RemoteControl(enabled),
            ServerSignal::Error { code, message } => {
                Self::Error(SignalingError::Rejected { code, message })
            }
        }
    }
}
