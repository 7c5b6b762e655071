mod config;
mod rendezvous;
mod signaling;

pub use config::RendezvousConfig;
pub use rendezvous::{LocalLink, RendezvousService, generate_code};
pub use signaling::{router, serve, ws_handler};
