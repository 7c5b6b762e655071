use std::time::Duration;
use tether_core::{ClientSignal, PeerId, ServerSignal, SessionCode};
use tether_server::{LocalLink, RendezvousService};
use tokio::time::timeout;

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// In-process participant that speaks raw signaling frames.
pub struct TestPeer {
    pub peer_id: PeerId,
    link: Option<LocalLink>,
}

impl TestPeer {
    /// Connects and consumes the `welcome` + `iceConfig` greeting.
    pub async fn connect(service: &RendezvousService) -> Self {
        let link = service.connect_local();
        let mut peer = Self {
            peer_id: link.peer_id,
            link: Some(link),
        };

        match peer.recv().await {
            ServerSignal::Welcome { peer_id } => assert_eq!(peer_id, peer.peer_id),
            other => panic!("expected welcome, got {:?}", other),
        }
        assert!(matches!(peer.recv().await, ServerSignal::IceConfig { .. }));
        peer
    }

    fn link(&mut self) -> &mut LocalLink {
        self.link.as_mut().expect("peer already disconnected")
    }

    pub fn send(&mut self, signal: ClientSignal) {
        self.link().outgoing.send(signal).expect("rendezvous gone");
    }

    pub async fn recv(&mut self) -> ServerSignal {
        timeout(RECV_TIMEOUT, self.link().incoming.recv())
            .await
            .expect("timed out waiting for a signal")
            .expect("link closed")
    }

    /// Asserts nothing arrives within a short window.
    pub async fn assert_silent(&mut self) {
        let res = timeout(Duration::from_millis(100), self.link().incoming.recv()).await;
        assert!(res.is_err(), "unexpected signal: {:?}", res);
    }

    pub async fn create(&mut self) -> SessionCode {
        self.send(ClientSignal::CreateSession {
            platform: "test".into(),
        });
        match self.recv().await {
            ServerSignal::SessionCreated { session_id } => session_id,
            other => panic!("expected sessionCreated, got {:?}", other),
        }
    }

    /// Dropping the link is what a closed socket looks like to the service.
    pub fn disconnect(&mut self) {
        self.link = None;
    }
}
