use tether_core::{ClientSignal, ServerSignal};
use tether_server::RendezvousService;

use crate::integration::{create_joined_pair, init_tracing};
use crate::utils::TestPeer;

#[tokio::test]
async fn test_host_disconnect_closes_session() {
    init_tracing();
    let service = RendezvousService::new(vec![]);
    let (mut host, mut guest, _code) = create_joined_pair(&service).await;

    host.disconnect();

    assert_eq!(guest.recv().await, ServerSignal::HostDisconnected);
    assert_eq!(service.session_count(), 0);
    assert_eq!(service.session_of(guest.peer_id), None);
}

#[tokio::test]
async fn test_guest_disconnect_keeps_session_open() {
    init_tracing();
    let service = RendezvousService::new(vec![]);
    let (mut host, mut guest, code) = create_joined_pair(&service).await;
    let guest_id = guest.peer_id;

    guest.disconnect();

    assert_eq!(host.recv().await, ServerSignal::GuestLeft { guest_id });
    assert_eq!(service.session_count(), 1);

    // The slot is free again.
    let mut next = TestPeer::connect(&service).await;
    next.send(ClientSignal::JoinSession {
        code: code.as_str().into(),
    });
    assert!(matches!(
        next.recv().await,
        ServerSignal::SessionJoined { .. }
    ));
}
