use crate::error::CapabilityError;
use async_trait::async_trait;
use std::sync::Arc;
use webrtc::track::track_local::TrackLocal;

/// Encoder settings pushed to the capture pipeline when a stream is attached.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncoderParameters {
    pub max_bitrate_bps: u32,
    pub max_framerate: u32,
    pub keyframe_interval_frames: u32,
    /// Drop resolution rather than frame rate when bandwidth runs short.
    pub maintain_framerate: bool,
}

impl EncoderParameters {
    pub fn low_latency() -> Self {
        Self {
            max_bitrate_bps: 2_500_000,
            max_framerate: 30,
            keyframe_interval_frames: 60,
            maintain_framerate: true,
        }
    }
}

/// The external encoder behind a captured stream.
pub trait EncoderControl: Send + Sync {
    fn apply(&self, params: &EncoderParameters) -> Result<(), CapabilityError>;
}

/// Outbound media handed over by a [`CaptureProvider`].
#[derive(Clone)]
pub struct MediaStream {
    pub id: String,
    pub tracks: Vec<Arc<dyn TrackLocal + Send + Sync>>,
    pub encoder: Option<Arc<dyn EncoderControl>>,
}

/// Platform screen and microphone capture.
#[async_trait]
pub trait CaptureProvider: Send + Sync {
    async fn screen_stream(&self) -> Result<MediaStream, CapabilityError>;

    async fn microphone_track(&self) -> Result<Arc<dyn TrackLocal + Send + Sync>, CapabilityError>;
}
