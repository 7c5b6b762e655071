use tether_client::TransferConfig;
use tether_client::transport::PipeMessage;
use tether_core::{ChannelLabel, ControlFrame, TransferStatus};

use crate::integration::{init_tracing, payload, transfer_manager};
use crate::utils::MemoryPipe;

fn offer(name: &str, size: u64) -> PipeMessage {
    PipeMessage::Text(
        ControlFrame::Offer {
            name: name.into(),
            size,
            mime_type: "application/octet-stream".into(),
        }
        .to_json()
        .unwrap(),
    )
}

async fn next_frame(rx: &mut tokio::sync::mpsc::UnboundedReceiver<PipeMessage>) -> ControlFrame {
    match rx.recv().await.expect("pipe closed") {
        PipeMessage::Text(text) => ControlFrame::from_json(&text).unwrap(),
        other => panic!("expected a control frame, got {:?}", other),
    }
}

#[tokio::test]
async fn test_second_offer_is_rejected_busy() {
    init_tracing();
    let (receiver, _) = transfer_manager(TransferConfig::default());
    let (pipe, mut sent) = MemoryPipe::new(ChannelLabel::FileTransfer);
    receiver.attach(pipe);

    receiver.handle_message(offer("first.bin", 100)).await;
    assert_eq!(next_frame(&mut sent).await, ControlFrame::Accept);

    receiver.handle_message(offer("second.bin", 100)).await;
    assert_eq!(
        next_frame(&mut sent).await,
        ControlFrame::Reject {
            reason: Some("busy".into())
        }
    );

    let records = receiver.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].name, "first.bin");
    assert_eq!(records[0].status, TransferStatus::Transferring);
}

#[tokio::test]
async fn test_rejected_offer_fails_the_send() {
    init_tracing();
    let (sender, _) = transfer_manager(TransferConfig::default());
    let (pipe, mut sent) = MemoryPipe::new(ChannelLabel::FileTransfer);
    sender.attach(pipe);

    let task = {
        let sender = sender.clone();
        tokio::spawn(async move { sender.send_bytes("a.bin", "application/octet-stream", payload(10)).await })
    };

    assert!(matches!(next_frame(&mut sent).await, ControlFrame::Offer { size: 10, .. }));
    sender
        .handle_message(PipeMessage::Text(
            ControlFrame::Reject {
                reason: Some("busy".into()),
            }
            .to_json()
            .unwrap(),
        ))
        .await;

    let record = task.await.unwrap().unwrap();
    assert_eq!(record.status, TransferStatus::Failed);
    assert!(record.error.unwrap().contains("busy"));
}

#[tokio::test]
async fn test_second_send_while_one_is_pending_is_busy() {
    init_tracing();
    let (sender, _) = transfer_manager(TransferConfig::default());
    let (pipe, mut sent) = MemoryPipe::new(ChannelLabel::FileTransfer);
    sender.attach(pipe);

    let first = {
        let sender = sender.clone();
        tokio::spawn(async move { sender.send_bytes("a.bin", "application/octet-stream", payload(10)).await })
    };
    next_frame(&mut sent).await;

    let err = sender
        .send_bytes("b.bin", "application/octet-stream", payload(10))
        .await
        .unwrap_err();
    assert!(matches!(err, tether_client::TransferError::Busy));

    first.abort();
}

#[tokio::test]
async fn test_oversized_stream_fails() {
    init_tracing();
    let (receiver, sink) = transfer_manager(TransferConfig::default());
    let (pipe, mut sent) = MemoryPipe::new(ChannelLabel::FileTransfer);
    receiver.attach(pipe);

    receiver.handle_message(offer("small.bin", 10)).await;
    next_frame(&mut sent).await;
    receiver
        .handle_message(PipeMessage::Binary(payload(20)))
        .await;

    let record = &receiver.records()[0];
    assert_eq!(record.status, TransferStatus::Failed);
    assert!(sink.files().is_empty());
}

#[tokio::test]
async fn test_short_stream_fails_at_eof() {
    init_tracing();
    let (receiver, sink) = transfer_manager(TransferConfig::default());
    let (pipe, mut sent) = MemoryPipe::new(ChannelLabel::FileTransfer);
    receiver.attach(pipe);

    receiver.handle_message(offer("short.bin", 10)).await;
    next_frame(&mut sent).await;
    receiver.handle_message(PipeMessage::Binary(payload(5))).await;
    receiver
        .handle_message(PipeMessage::Text(
            ControlFrame::Eof { total_bytes: 5 }.to_json().unwrap(),
        ))
        .await;

    let record = &receiver.records()[0];
    assert_eq!(record.status, TransferStatus::Failed);
    assert_eq!(record.transferred, 5);
    assert!(sink.files().is_empty());
}
