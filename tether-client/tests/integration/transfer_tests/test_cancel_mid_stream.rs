use std::sync::{Arc, Mutex};
use std::time::Duration;
use tether_client::transfer::TransferUpdate;
use tether_client::{TransferConfig, TransferError};
use tether_client::transfer::TransferManager;
use tether_core::{CHUNK_SIZE, TransferDirection, TransferRecord, TransferStatus};

use crate::integration::{init_tracing, payload, transfer_manager};
use crate::utils::{link_transfer_managers, link_transfer_managers_both_ways, wait_until};

fn patient() -> TransferConfig {
    TransferConfig {
        drain_timeout: Duration::from_secs(30),
        ..TransferConfig::default()
    }
}

#[tokio::test]
async fn test_sender_cancel_after_k_chunks() {
    init_tracing();
    const K: usize = 2;
    let (sender, _) = transfer_manager(patient());
    let (receiver, sink) = transfer_manager(patient());
    let (a_to_b, _) = link_transfer_managers(&sender, &receiver, Some(K));

    let discarded = Arc::new(Mutex::new(Vec::new()));
    let log = discarded.clone();
    let _sub = receiver.subscribe(move |update| {
        if let TransferUpdate::Discarded(id) = update {
            log.lock().unwrap().push(*id);
        }
    });

    let task = {
        let sender = sender.clone();
        tokio::spawn(async move {
            sender
                .send_bytes("big.bin", "application/octet-stream", payload(10 * CHUNK_SIZE))
                .await
        })
    };

    // The pipe stops draining after K chunks, so the stream parks there.
    wait_until(Duration::from_secs(2), || {
        receiver
            .records()
            .first()
            .is_some_and(|r| r.transferred == (K * CHUNK_SIZE) as u64)
    })
    .await;
    let id = sender.records()[0].id;

    sender.cancel(id).await.unwrap();
    let record = task.await.unwrap().unwrap();

    assert_eq!(record.status, TransferStatus::Cancelled);
    assert_eq!(record.transferred, (K * CHUNK_SIZE) as u64);
    assert_eq!(a_to_b.binary_sent(), K);

    wait_until(Duration::from_secs(2), || receiver.records().is_empty()).await;
    assert_eq!(discarded.lock().unwrap().len(), 1);
    assert!(sink.files().is_empty());

    assert!(matches!(sender.cancel(id).await, Err(TransferError::Finished)));
}

#[tokio::test]
async fn test_receiver_cancel_stops_sender() {
    init_tracing();
    let (sender, _) = transfer_manager(patient());
    let (receiver, sink) = transfer_manager(patient());
    link_transfer_managers(&sender, &receiver, Some(1));

    let task = {
        let sender = sender.clone();
        tokio::spawn(async move {
            sender
                .send_bytes("big.bin", "application/octet-stream", payload(4 * CHUNK_SIZE))
                .await
        })
    };

    wait_until(Duration::from_secs(2), || {
        receiver
            .records()
            .first()
            .is_some_and(|r| r.transferred == CHUNK_SIZE as u64)
    })
    .await;
    let incoming = receiver.records()[0].id;

    receiver.cancel(incoming).await.unwrap();

    let record = task.await.unwrap().unwrap();
    assert_eq!(record.status, TransferStatus::Cancelled);
    assert_eq!(
        receiver.record(incoming).map(|r| r.status),
        Some(TransferStatus::Cancelled)
    );
    assert!(sink.files().is_empty());
}

fn record_in(manager: &TransferManager, direction: TransferDirection) -> Option<TransferRecord> {
    manager
        .records()
        .into_iter()
        .find(|r| r.direction == direction)
}

#[tokio::test]
async fn test_cancelling_one_direction_spares_the_other() {
    init_tracing();
    let (a, _) = transfer_manager(patient());
    let (b, _) = transfer_manager(patient());
    link_transfer_managers_both_ways(&a, &b, Some(2), Some(2));

    let spawn_send = |manager: &TransferManager, name: &'static str| {
        let manager = manager.clone();
        tokio::spawn(async move {
            manager
                .send_bytes(name, "application/octet-stream", payload(10 * CHUNK_SIZE))
                .await
        })
    };
    let a_sending = spawn_send(&a, "from-a.bin");
    let b_sending = spawn_send(&b, "from-b.bin");

    // Both streams park after two chunks.
    let parked = (2 * CHUNK_SIZE) as u64;
    wait_until(Duration::from_secs(2), || {
        [&a, &b].iter().all(|m| {
            record_in(m, TransferDirection::Receive).is_some_and(|r| r.transferred == parked)
        })
    })
    .await;

    // A gives up on the file coming from B.
    let a_incoming = record_in(&a, TransferDirection::Receive).unwrap().id;
    a.cancel(a_incoming).await.unwrap();

    let b_record = b_sending.await.unwrap().unwrap();
    assert_eq!(b_record.status, TransferStatus::Cancelled);

    // The A to B stream is untouched on both ends.
    let a_outgoing = record_in(&a, TransferDirection::Send).unwrap();
    assert_eq!(a_outgoing.status, TransferStatus::Transferring);
    let b_incoming = record_in(&b, TransferDirection::Receive).unwrap();
    assert_eq!(b_incoming.status, TransferStatus::Transferring);
    assert_eq!(b_incoming.transferred, parked);

    a.cancel(a_outgoing.id).await.unwrap();
    let a_record = a_sending.await.unwrap().unwrap();
    assert_eq!(a_record.status, TransferStatus::Cancelled);
    wait_until(Duration::from_secs(2), || {
        record_in(&b, TransferDirection::Receive).is_none()
    })
    .await;
}

#[tokio::test]
async fn test_cancel_unknown_transfer() {
    init_tracing();
    let (manager, _) = transfer_manager(TransferConfig::default());

    let err = manager
        .cancel(tether_core::TransferId::new())
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::NotFound));
}
