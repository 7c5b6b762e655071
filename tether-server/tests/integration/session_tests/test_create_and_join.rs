use tether_core::{ClientSignal, ServerSignal};
use tether_server::RendezvousService;

use crate::integration::init_tracing;
use crate::utils::TestPeer;

#[tokio::test]
async fn test_guest_joins_by_display_code() {
    init_tracing();
    let service = RendezvousService::new(vec![]);
    let mut host = TestPeer::connect(&service).await;
    let mut guest = TestPeer::connect(&service).await;

    let code = host.create().await;
    assert_eq!(service.session_count(), 1);

    // Lower-case with the dash, as a person would type it.
    guest.send(ClientSignal::JoinSession {
        code: code.to_string().to_lowercase(),
    });

    match guest.recv().await {
        ServerSignal::SessionJoined {
            session_id,
            host_id,
        } => {
            assert_eq!(session_id, code);
            assert_eq!(host_id, host.peer_id);
        }
        other => panic!("expected sessionJoined, got {:?}", other),
    }
    match host.recv().await {
        ServerSignal::GuestJoined { guest_id } => assert_eq!(guest_id, guest.peer_id),
        other => panic!("expected guestJoined, got {:?}", other),
    }

    assert_eq!(service.session_of(guest.peer_id), Some(code));
}

#[tokio::test]
async fn test_codes_are_distinct_across_sessions() {
    init_tracing();
    let service = RendezvousService::new(vec![]);
    let mut codes = Vec::new();
    let mut hosts = Vec::new();

    for _ in 0..10 {
        let mut host = TestPeer::connect(&service).await;
        codes.push(host.create().await);
        hosts.push(host);
    }

    codes.sort();
    codes.dedup();
    assert_eq!(codes.len(), 10);
    assert_eq!(service.session_count(), 10);
}

#[tokio::test]
async fn test_end_session_notifies_other_member() {
    init_tracing();
    let service = RendezvousService::new(vec![]);
    let (mut host, mut guest, code) = crate::integration::create_joined_pair(&service).await;

    guest.send(ClientSignal::EndSession { session_id: code });

    assert_eq!(host.recv().await, ServerSignal::SessionEnded);
    guest.assert_silent().await;
    assert_eq!(service.session_count(), 0);
    assert_eq!(service.session_of(host.peer_id), None);
}
