mod file_sink;
mod transfer_manager;

pub use file_sink::{DirectorySink, FileSink, ReceivedFile};
pub use transfer_manager::{TransferManager, TransferUpdate, mime_for};
