pub use tether_core::model::{PeerId, SessionCode};

pub mod model {
    pub use tether_core::model::*;
}

#[cfg(feature = "client")]
pub mod client {
    pub use tether_client::*;
}

#[cfg(feature = "server")]
pub mod server {
    pub use tether_server::*;
}
