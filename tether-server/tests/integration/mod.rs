pub mod session_tests;

use tether_core::{ClientSignal, ServerSignal, SessionCode};
use tether_server::RendezvousService;
use tracing::Level;

use crate::utils::TestPeer;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Host with a created session and a guest that joined it, greetings consumed.
pub async fn create_joined_pair(service: &RendezvousService) -> (TestPeer, TestPeer, SessionCode) {
    let mut host = TestPeer::connect(service).await;
    let mut guest = TestPeer::connect(service).await;
    let code = host.create().await;

    guest.send(ClientSignal::JoinSession {
        code: code.to_string(),
    });
    assert!(matches!(
        guest.recv().await,
        ServerSignal::SessionJoined { .. }
    ));
    assert!(matches!(
        host.recv().await,
        ServerSignal::GuestJoined { .. }
    ));

    (host, guest, code)
}
