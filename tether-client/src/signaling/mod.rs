mod signaling_client;
mod signaling_connector;
mod signaling_event;
mod signaling_output;

pub use signaling_client::SignalingClient;
pub use signaling_connector::{SignalingConnector, SignalingLink, WsConnector};
pub use signaling_event::SignalingEvent;
pub use signaling_output::SignalingOutput;
