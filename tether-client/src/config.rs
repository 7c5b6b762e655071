use serde::Deserialize;
use std::time::Duration;
use tether_core::IceServerConfig;
use tether_core::utils::{DEFAULT_STUN_ADDR, DEFAULT_STUN_ADDR_2, platform_tag};

/// WebRTC configuration. The rendezvous may replace the ICE servers at runtime.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub ice_servers: Vec<IceServerConfig>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![IceServerConfig {
                urls: vec![DEFAULT_STUN_ADDR.to_owned(), DEFAULT_STUN_ADDR_2.to_owned()],
                username: None,
                credential: None,
            }],
        }
    }
}

impl TransportConfig {
    /// No ICE servers: host candidates only. Used for same-machine peers.
    pub fn local_only() -> Self {
        Self {
            ice_servers: Vec::new(),
        }
    }
}

/// Flow-control knobs of the chunked transfer protocol.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    pub chunk_size: usize,
    /// Fallback throttle: pause after this many chunks when the channel does not
    /// report its buffered amount.
    pub throttle_every: usize,
    pub throttle_pause: Duration,
    /// Stop producing chunks while more than this many bytes are queued.
    pub buffered_high: usize,
    /// Low-watermark that resumes production.
    pub buffered_low: usize,
    pub drain_timeout: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: tether_core::CHUNK_SIZE,
            throttle_every: 20,
            throttle_pause: Duration::from_millis(5),
            buffered_high: 1024 * 1024,
            buffered_low: 256 * 1024,
            drain_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub signaling_url: String,
    pub platform: String,
    pub create_timeout: Duration,
    pub join_timeout: Duration,
    pub transport: TransportConfig,
    pub transfer: TransferConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            signaling_url: "ws://127.0.0.1:8080/ws".to_owned(),
            platform: platform_tag().to_owned(),
            create_timeout: Duration::from_secs(15),
            join_timeout: Duration::from_secs(15),
            transport: TransportConfig::default(),
            transfer: TransferConfig::default(),
        }
    }
}
