use crate::error::ChannelError;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tether_core::ChannelLabel;
use tokio::sync::Notify;
use webrtc::data_channel::RTCDataChannel;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipeMessage {
    Text(String),
    Binary(Bytes),
}

/// An open, ordered, reliable message channel to the peer.
#[async_trait]
pub trait DataPipe: Send + Sync {
    fn label(&self) -> ChannelLabel;

    fn is_open(&self) -> bool;

    async fn send_text(&self, text: &str) -> Result<(), ChannelError>;

    async fn send_bytes(&self, data: &Bytes) -> Result<(), ChannelError>;

    /// Bytes queued but not yet handed to the network, when the transport tells.
    async fn buffered_amount(&self) -> Option<usize> {
        None
    }

    /// Resolves once the queued amount has dropped to `threshold` or below.
    async fn buffered_low(&self, _threshold: usize) {}
}

/// [`DataPipe`] over a webrtc-rs data channel.
pub struct RtcPipe {
    label: ChannelLabel,
    channel: Arc<RTCDataChannel>,
    low: Arc<Notify>,
}

impl RtcPipe {
    pub async fn new(label: ChannelLabel, channel: Arc<RTCDataChannel>) -> Self {
        let low = Arc::new(Notify::new());
        let notify = low.clone();
        channel
            .on_buffered_amount_low(Box::new(move || {
                let notify = notify.clone();
                Box::pin(async move {
                    notify.notify_one();
                })
            }))
            .await;

        Self {
            label,
            channel,
            low,
        }
    }
}

#[async_trait]
impl DataPipe for RtcPipe {
    fn label(&self) -> ChannelLabel {
        self.label
    }

    fn is_open(&self) -> bool {
        self.channel.ready_state() == RTCDataChannelState::Open
    }

    async fn send_text(&self, text: &str) -> Result<(), ChannelError> {
        if !self.is_open() {
            return Err(ChannelError::Closed);
        }
        self.channel
            .send_text(text.to_owned())
            .await
            .map(|_| ())
            .map_err(|e| ChannelError::Send(e.to_string()))
    }

    async fn send_bytes(&self, data: &Bytes) -> Result<(), ChannelError> {
        if !self.is_open() {
            return Err(ChannelError::Closed);
        }
        self.channel
            .send(data)
            .await
            .map(|_| ())
            .map_err(|e| ChannelError::Send(e.to_string()))
    }

    async fn buffered_amount(&self) -> Option<usize> {
        Some(self.channel.buffered_amount().await)
    }

    async fn buffered_low(&self, threshold: usize) {
        self.channel
            .set_buffered_amount_low_threshold(threshold)
            .await;
        if self.channel.buffered_amount().await <= threshold {
            return;
        }
        self.low.notified().await;
    }
}
