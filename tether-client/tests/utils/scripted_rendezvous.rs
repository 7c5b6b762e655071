use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;
use tether_client::SignalingError;
use tether_client::signaling::{SignalingConnector, SignalingLink};
use tether_core::{ClientSignal, ServerSignal};
use tokio::sync::mpsc;

/// Timeout for a single expected frame.
pub const FRAME_TIMEOUT: Duration = Duration::from_secs(5);

/// Hands out the one link a [`ScriptedRendezvous`] speaks on.
pub struct ScriptedConnector {
    link: Mutex<Option<SignalingLink>>,
}

#[async_trait]
impl SignalingConnector for ScriptedConnector {
    async fn connect(&self) -> Result<SignalingLink, SignalingError> {
        self.link
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| SignalingError::Connect("scripted link already used".into()))
    }
}

/// The rendezvous side of a link, driven frame by frame from the test.
pub struct ScriptedRendezvous {
    sent: mpsc::UnboundedReceiver<ClientSignal>,
    replies: mpsc::UnboundedSender<ServerSignal>,
}

pub fn scripted_rendezvous() -> (ScriptedConnector, ScriptedRendezvous) {
    let (outgoing, sent) = mpsc::unbounded_channel();
    let (replies, incoming) = mpsc::unbounded_channel();
    let connector = ScriptedConnector {
        link: Mutex::new(Some(SignalingLink { outgoing, incoming })),
    };
    (connector, ScriptedRendezvous { sent, replies })
}

impl ScriptedRendezvous {
    pub fn push(&self, signal: ServerSignal) -> Result<()> {
        self.replies
            .send(signal)
            .context("Client dropped its rendezvous link")
    }

    /// Skips frames until `pick` accepts one.
    pub async fn next_matching<T>(
        &mut self,
        mut pick: impl FnMut(ClientSignal) -> Option<T>,
    ) -> Result<T> {
        loop {
            let signal = tokio::time::timeout(FRAME_TIMEOUT, self.sent.recv())
                .await
                .context("Timeout waiting for a client frame")?
                .context("Client closed its rendezvous link")?;
            if let Some(found) = pick(signal) {
                return Ok(found);
            }
        }
    }

    pub async fn expect_offer(&mut self) -> Result<String> {
        self.next_matching(|signal| match signal {
            ClientSignal::Offer { sdp, .. } => Some(sdp),
            _ => None,
        })
        .await
    }
}
