pub mod input_tests;
pub mod negotiation_tests;

use std::sync::Arc;
use tether_client::TransferConfig;
use tether_client::transfer::TransferManager;
use tracing::Level;

use crate::utils::MemorySink;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn transfer_manager(config: TransferConfig) -> (TransferManager, MemorySink) {
    let sink = MemorySink::new();
    (TransferManager::new(config, Arc::new(sink.clone())), sink)
}

pub fn payload(len: usize) -> bytes::Bytes {
    (0..len).map(|i| (i % 251) as u8).collect::<Vec<u8>>().into()
}
