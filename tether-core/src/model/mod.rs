mod channel;
mod input;
mod peer;
mod session;
mod signaling;
mod transfer;

pub use channel::ChannelLabel;
pub use input::{
    InputCodecError, InputEvent, KeyboardEvent, KeyboardEventKind, MouseButton, MouseEvent,
    MouseEventKind, SpecialKey,
};
pub use peer::PeerId;
pub use session::{CodeError, Role, SessionCode};
pub use signaling::{ClientSignal, IceCandidate, IceServerConfig, ServerSignal, SignalErrorCode};
pub use transfer::{
    CHUNK_SIZE, ControlFrame, StreamSide, TransferDirection, TransferId, TransferRecord,
    TransferStatus, progress_of,
};
