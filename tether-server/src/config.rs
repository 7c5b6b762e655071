use serde::Deserialize;
use std::net::SocketAddr;
use tether_core::IceServerConfig;
use tether_core::utils::{DEFAULT_STUN_ADDR, DEFAULT_STUN_ADDR_2};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RendezvousConfig {
    pub bind: SocketAddr,
    /// Sent to every participant in `iceConfig` right after `welcome`.
    pub ice_servers: Vec<IceServerConfig>,
}

impl Default for RendezvousConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
            ice_servers: vec![IceServerConfig {
                urls: vec![DEFAULT_STUN_ADDR.to_owned(), DEFAULT_STUN_ADDR_2.to_owned()],
                username: None,
                credential: None,
            }],
        }
    }
}
