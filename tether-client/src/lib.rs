mod config;
mod context;
mod error;
mod observer;
mod util;

pub mod input;
pub mod session;
pub mod signaling;
pub mod transfer;
pub mod transport;

pub use config::{EngineConfig, TransferConfig, TransportConfig};
pub use context::{ContextEvent, SessionContext, SessionContextBuilder};
pub use error::{
    CapabilityError, ChannelError, HistoryError, InputError, NegotiationError, SessionError,
    SignalingError, TransferError,
};
pub use observer::{Observers, Subscription};
