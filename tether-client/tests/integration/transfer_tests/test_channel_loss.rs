use tether_client::TransferConfig;
use tether_client::transport::PipeMessage;
use tether_core::{ChannelLabel, ControlFrame, TransferStatus};

use crate::integration::{init_tracing, payload, transfer_manager};
use crate::utils::MemoryPipe;

#[tokio::test]
async fn test_channel_close_fails_both_directions() {
    init_tracing();
    let (manager, _) = transfer_manager(TransferConfig::default());
    let (pipe, mut sent) = MemoryPipe::new(ChannelLabel::FileTransfer);
    manager.attach(pipe.clone());

    // Outgoing, parked waiting for the answer.
    let task = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.send_bytes("out.bin", "application/octet-stream", payload(10)).await })
    };
    assert!(matches!(sent.recv().await, Some(PipeMessage::Text(_))));

    // Incoming, half received.
    manager
        .handle_message(PipeMessage::Text(
            ControlFrame::Offer {
                name: "in.bin".into(),
                size: 10,
                mime_type: "application/octet-stream".into(),
            }
            .to_json()
            .unwrap(),
        ))
        .await;
    manager.handle_message(PipeMessage::Binary(payload(4))).await;

    pipe.close();
    manager.channel_closed("file-transfer channel closed");
    task.await.unwrap().unwrap();

    let records = manager.records();
    assert_eq!(records.len(), 2);
    for record in records {
        assert_eq!(record.status, TransferStatus::Failed, "{}", record.name);
        assert_eq!(record.error.as_deref(), Some("file-transfer channel closed"));
    }
    assert!(!manager.is_ready());
}
