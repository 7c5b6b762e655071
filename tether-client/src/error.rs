use tether_core::{CodeError, SignalErrorCode};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SignalingError {
    #[error("not connected to the rendezvous service")]
    NotConnected,
    #[error("failed to connect to the rendezvous service: {0}")]
    Connect(String),
    #[error("rendezvous connection lost")]
    ConnectionLost,
    #[error("request timed out")]
    Timeout,
    #[error("invalid session code: {0}")]
    InvalidCode(#[from] CodeError),
    #[error("rendezvous refused the request ({code:?}): {message}")]
    Rejected {
        code: SignalErrorCode,
        message: String,
    },
    #[error("another {0} request is already in flight")]
    RequestInFlight(&'static str),
    #[error("no active session")]
    NoSession,
}

#[derive(Debug, Error)]
pub enum NegotiationError {
    #[error("peer connection is not initialized")]
    NotInitialized,
    #[error("webrtc: {0}")]
    WebRtc(#[from] webrtc::Error),
    #[error("signaling: {0}")]
    Signaling(#[from] SignalingError),
    #[error("capability: {0}")]
    Capability(#[from] CapabilityError),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("signaling: {0}")]
    Signaling(#[from] SignalingError),
    #[error("session was not established within {0:?}")]
    Timeout(std::time::Duration),
    #[error("a session is already active")]
    AlreadyActive,
    #[error("no active session")]
    NotActive,
    #[error("negotiation: {0}")]
    Negotiation(#[from] NegotiationError),
    #[error("capability: {0}")]
    Capability(#[from] CapabilityError),
}

impl SessionError {
    /// Whether the caller may simply try the same operation again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_)
                | Self::Signaling(
                    SignalingError::Timeout
                        | SignalingError::ConnectionLost
                        | SignalingError::Connect(_)
                )
        )
    }
}

#[derive(Debug, Clone, Error)]
pub enum ChannelError {
    #[error("data channel is not open")]
    Closed,
    #[error("data channel send failed: {0}")]
    Send(String),
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("file-transfer channel is not open")]
    NoChannel,
    #[error("an outgoing transfer is already active")]
    Busy,
    #[error("unknown transfer")]
    NotFound,
    #[error("transfer already finished")]
    Finished,
    #[error("channel: {0}")]
    Channel(#[from] ChannelError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("protocol: {0}")]
    Protocol(String),
}

#[derive(Debug, Error)]
pub enum InputError {
    #[error("neither the input channel nor the relay is available")]
    NoPath,
    #[error("codec: {0}")]
    Codec(#[from] tether_core::InputCodecError),
    #[error("relay: {0}")]
    Relay(#[from] SignalingError),
}

#[derive(Debug, Clone, Error)]
pub enum CapabilityError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("capability unavailable: {0}")]
    Unavailable(String),
    #[error("capability failed: {0}")]
    Failed(String),
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}
