mod candidate_buffer;
mod connection_stats;
mod data_pipe;
mod media;
mod negotiator;
mod transport_event;

pub use candidate_buffer::CandidateBuffer;
pub use connection_stats::{BitrateSampler, ConnectionStats};
pub use data_pipe::{DataPipe, PipeMessage, RtcPipe};
pub use media::{CaptureProvider, EncoderControl, EncoderParameters, MediaStream};
pub use negotiator::{ConnectionNegotiator, StateOutcome};
pub use transport_event::{ConnectionState, TransportEvent};
