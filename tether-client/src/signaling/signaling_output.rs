use crate::error::SignalingError;
use async_trait::async_trait;
use tether_core::{IceCandidate, SessionCode};

/// What the connection negotiator needs from signaling: a way to hand
/// descriptions and trickled candidates to the other participant.
#[async_trait]
pub trait SignalingOutput: Send + Sync {
    async fn send_offer(&self, session_id: &SessionCode, sdp: String)
    -> Result<(), SignalingError>;

    async fn send_answer(
        &self,
        session_id: &SessionCode,
        sdp: String,
    ) -> Result<(), SignalingError>;

    async fn send_ice(
        &self,
        session_id: &SessionCode,
        candidate: IceCandidate,
    ) -> Result<(), SignalingError>;
}
