use std::time::Duration;
use tether_client::{SessionError, SignalingError};
use tether_core::{Role, SignalErrorCode};
use tether_server::RendezvousService;

use crate::integration::init_tracing;
use crate::integration::session_tests::Participant;
use crate::utils::wait_until;

#[tokio::test(flavor = "multi_thread")]
async fn test_unknown_code_rejects_the_join() {
    init_tracing();
    let service = RendezvousService::new(vec![]);
    let guest = Participant::new(&service);

    let err = guest.context.join_session("ZZZZ-9999").await.unwrap_err();

    assert!(matches!(
        err,
        SessionError::Signaling(SignalingError::Rejected {
            code: SignalErrorCode::JoinFailed,
            ..
        })
    ));
    assert!(!guest.context.state().is_active);
    guest.context.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_guest_leaving_keeps_the_host_session() {
    init_tracing();
    let service = RendezvousService::new(vec![]);
    let host = Participant::new(&service);
    let guest = Participant::new(&service);

    let code = host.context.create_session().await.unwrap();
    guest.context.join_session(code.as_str()).await.unwrap();
    wait_until(Duration::from_secs(5), || host.context.state().peer_id.is_some()).await;

    // The guest's link drops without an endSession.
    let guest_id = host.context.state().peer_id.unwrap();
    service.detach(guest_id);

    wait_until(Duration::from_secs(5), || host.context.state().peer_id.is_none()).await;
    let state = host.context.state();
    assert!(state.is_active);
    assert_eq!(state.session_id, Some(code));
    assert!(!state.is_connected);

    guest.context.shutdown().await;
    host.context.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_ending_a_session_writes_history_on_both_sides() {
    init_tracing();
    let service = RendezvousService::new(vec![]);
    let host = Participant::new(&service);
    let guest = Participant::new(&service);

    let code = host.context.create_session().await.unwrap();
    guest.context.join_session(code.as_str()).await.unwrap();

    guest.context.end_session().await;
    assert!(!guest.context.state().is_active);

    wait_until(Duration::from_secs(5), || !host.context.state().is_active).await;
    wait_until(Duration::from_secs(5), || {
        host.history.records().len() == 1 && guest.history.records().len() == 1
    })
    .await;

    let host_record = &host.history.records()[0];
    assert_eq!(host_record.session_id, code);
    assert_eq!(host_record.role, Role::Host);
    assert_eq!(guest.history.records()[0].role, Role::Guest);

    // Ending again is a no-op.
    guest.context.end_session().await;
    assert_eq!(guest.history.records().len(), 1);

    guest.context.shutdown().await;
    host.context.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_session_ended_right_after_join_stays_ended() {
    init_tracing();
    let service = RendezvousService::new(vec![]);
    let host = Participant::new(&service);
    let guest = Participant::new(&service);

    let code = host.context.create_session().await.unwrap();
    guest.context.join_session(code.as_str()).await.unwrap();
    guest.context.end_session().await;

    // Anything still queued from the join must not bring it back.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let state = guest.context.state();
    assert!(!state.is_active);
    assert_eq!(state.role, None);
    assert_eq!(state.session_id, None);
    assert!(guest.context.negotiator().session_id().await.is_none());
    assert_eq!(guest.history.records().len(), 1);

    guest.context.end_session().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(guest.history.records().len(), 1);

    guest.context.shutdown().await;
    host.context.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_second_create_while_active_is_refused() {
    init_tracing();
    let service = RendezvousService::new(vec![]);
    let host = Participant::new(&service);

    host.context.create_session().await.unwrap();
    let err = host.context.create_session().await.unwrap_err();

    assert!(matches!(err, SessionError::AlreadyActive));
    assert_eq!(service.session_count(), 1);
    host.context.shutdown().await;
}
