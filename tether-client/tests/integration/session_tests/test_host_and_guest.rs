use std::time::Duration;
use tether_client::input::InputPath;
use tether_core::{InputEvent, MouseEventKind, Role, TransferStatus};
use tether_server::RendezvousService;

use crate::integration::session_tests::Participant;
use crate::integration::{init_tracing, payload};
use crate::utils::wait_until;

const CONNECT: Duration = Duration::from_secs(15);

async fn connected_pair(service: &RendezvousService) -> (Participant, Participant) {
    let host = Participant::new(service);
    let guest = Participant::new(service);

    let code = host.context.create_session().await.unwrap();
    let joined = guest.context.join_session(&code.to_string()).await.unwrap();
    assert_eq!(joined, code);

    wait_until(CONNECT, || host.has_channels() && guest.has_channels()).await;
    wait_until(CONNECT, || {
        host.context.state().is_connected && guest.context.state().is_connected
    })
    .await;
    (host, guest)
}

#[tokio::test(flavor = "multi_thread")]
async fn test_pointer_moves_arrive_in_order_over_the_direct_channel() {
    init_tracing();
    let service = RendezvousService::new(vec![]);
    let (host, guest) = connected_pair(&service).await;

    let host_state = host.context.state();
    assert_eq!(host_state.role, Some(Role::Host));
    assert!(host_state.peer_id.is_some());

    for x in [0.1, 0.2, 0.3] {
        let path = guest.context.input().pointer_move(x, 0.5).await.unwrap();
        assert_eq!(path, InputPath::Direct);
    }

    wait_until(Duration::from_secs(5), || host.inputs().len() == 3).await;
    let xs: Vec<f64> = host
        .inputs()
        .into_iter()
        .map(|event| match event {
            InputEvent::Mouse(m) if m.kind == MouseEventKind::Move => m.x,
            other => panic!("unexpected {:?}", other),
        })
        .collect();
    assert_eq!(xs, vec![0.1, 0.2, 0.3]);

    guest.context.shutdown().await;
    host.context.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_relay_carries_input_when_the_channel_is_gone() {
    init_tracing();
    let service = RendezvousService::new(vec![]);
    let (host, guest) = connected_pair(&service).await;

    guest.context.input().detach();
    let path = guest.context.input().click(0.4, 0.6).await.unwrap();
    assert_eq!(path, InputPath::Relay);

    wait_until(Duration::from_secs(5), || host.inputs().len() == 1).await;
    assert!(matches!(
        &host.inputs()[0],
        InputEvent::Mouse(m) if m.kind == MouseEventKind::Click
    ));

    guest.context.shutdown().await;
    host.context.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_host_file_reaches_the_guest_intact() {
    init_tracing();
    let service = RendezvousService::new(vec![]);
    let (host, guest) = connected_pair(&service).await;

    let data = payload(40 * 1024);
    let record = host
        .context
        .transfers()
        .send_bytes("report.pdf", "application/pdf", data.clone())
        .await
        .unwrap();
    assert_eq!(record.status, TransferStatus::Completed);
    assert_eq!(record.transferred, 40 * 1024);

    wait_until(Duration::from_secs(5), || guest.sink.files().len() == 1).await;
    let file = &guest.sink.files()[0];
    assert_eq!(file.name, "report.pdf");
    assert_eq!(file.data.len(), 40 * 1024);
    assert_eq!(file.data, data);

    wait_until(Duration::from_secs(5), || {
        let received = guest.context.transfers().records();
        received.len() == 1 && received[0].status == TransferStatus::Completed
    })
    .await;

    guest.context.shutdown().await;
    host.context.shutdown().await;
}
