mod rendezvous_service;
mod session_code;

pub use rendezvous_service::{LocalLink, RendezvousService};
pub use session_code::generate_code;
