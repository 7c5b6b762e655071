use crate::model::input::{KeyboardEvent, MouseEvent};
use crate::model::peer::PeerId;
use crate::model::session::SessionCode;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

impl IceServerConfig {
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }
}

/// A trickled ICE candidate, field-compatible with the browser `RTCIceCandidateInit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex")]
    pub sdp_m_line_index: Option<u16>,
    #[serde(default)]
    pub username_fragment: Option<String>,
}

/// Frames a participant sends to the rendezvous service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "op",
    content = "d",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ClientSignal {
    CreateSession {
        platform: String,
    },
    JoinSession {
        code: String,
    },
    Offer {
        session_id: SessionCode,
        sdp: String,
    },
    Answer {
        session_id: SessionCode,
        sdp: String,
    },
    IceCandidate {
        session_id: SessionCode,
        candidate: IceCandidate,
    },
    EndSession {
        session_id: SessionCode,
    },
    MouseEvent {
        session_id: SessionCode,
        event: MouseEvent,
    },
    KeyboardEvent {
        session_id: SessionCode,
        event: KeyboardEvent,
    },
    EnableRemoteControl {
        session_id: SessionCode,
    },
    DisableRemoteControl {
        session_id: SessionCode,
    },
}

impl ClientSignal {
    /// Session the frame is addressed to, for frames relayed to the other participant.
    pub fn session_id(&self) -> Option<&SessionCode> {
        match self {
            Self::CreateSession { .. } | Self::JoinSession { .. } => None,
            Self::Offer { session_id, .. }
            | Self::Answer { session_id, .. }
            | Self::IceCandidate { session_id, .. }
            | Self::EndSession { session_id }
            | Self::MouseEvent { session_id, .. }
            | Self::KeyboardEvent { session_id, .. }
            | Self::EnableRemoteControl { session_id }
            | Self::DisableRemoteControl { session_id } => Some(session_id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SignalErrorCode {
    JoinFailed,
    NotInSession,
    BadRequest,
}

/// Frames the rendezvous service sends to a participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "op",
    content = "d",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ServerSignal {
    Welcome {
        peer_id: PeerId,
    },
    IceConfig {
        ice_servers: Vec<IceServerConfig>,
    },
    SessionCreated {
        session_id: SessionCode,
    },
    SessionJoined {
        session_id: SessionCode,
        host_id: PeerId,
    },
    GuestJoined {
        guest_id: PeerId,
    },
    GuestLeft {
        guest_id: PeerId,
    },
    Offer {
        sdp: String,
    },
    Answer {
        sdp: String,
    },
    IceCandidate {
        candidate: IceCandidate,
    },
    HostDisconnected,
    SessionEnded,
    MouseEvent {
        event: MouseEvent,
    },
    KeyboardEvent {
        event: KeyboardEvent,
    },
    RemoteControl {
        enabled: bool,
    },
    Error {
        code: SignalErrorCode,
        message: String,
    },
}
