use crate::config::TransferConfig;
use crate::error::TransferError;
use crate::observer::{Observers, Subscription};
use crate::transfer::{FileSink, ReceivedFile};
use crate::transport::{DataPipe, PipeMessage};
use crate::util::lock;
use bytes::{Bytes, BytesMut};
use dashmap::DashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tether_core::{
    ControlFrame, StreamSide, TransferDirection, TransferId, TransferRecord, TransferStatus,
};
use tokio::sync::{Notify, oneshot};
use tracing::{debug, info, warn};

/// Buffers are never pre-allocated beyond this, whatever the offer claims.
const MAX_PREALLOC: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub enum TransferUpdate {
    Changed(TransferRecord),
    /// The record was dropped from the table without reaching a terminal state.
    Discarded(TransferId),
}

enum Answer {
    Accepted,
    Rejected(Option<String>),
}

/// Ends an outgoing stream between chunks.
#[derive(Default)]
struct StopSignal {
    stopped: AtomicBool,
    notify: Notify,
}

impl StopSignal {
    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    async fn wait(&self) {
        while !self.is_stopped() {
            self.notify.notified().await;
        }
    }
}

struct OutgoingSlot {
    id: TransferId,
    answer: Option<oneshot::Sender<Answer>>,
    stop: Arc<StopSignal>,
}

struct IncomingSlot {
    id: TransferId,
    name: String,
    mime_type: String,
    size: u64,
    buffer: BytesMut,
}

struct ManagerInner {
    config: TransferConfig,
    pipe: Mutex<Option<Arc<dyn DataPipe>>>,
    records: DashMap<TransferId, TransferRecord>,
    outgoing: Mutex<Option<OutgoingSlot>>,
    incoming: Mutex<Option<IncomingSlot>>,
    /// Serializes every write to the channel so a `cancel` frame is never
    /// overtaken by a chunk.
    send_lock: tokio::sync::Mutex<()>,
    sink: Arc<dyn FileSink>,
    observers: Observers<TransferUpdate>,
}

/// The chunked transfer protocol on the "file-transfer" channel.
///
/// One stream per direction at a time. Control frames are JSON text, chunks are
/// binary messages of the active stream in order. Incoming offers are accepted
/// automatically; an offer that arrives while one is being received is rejected
/// as busy.
#[derive(Clone)]
pub struct TransferManager {
    inner: Arc<ManagerInner>,
}

impl TransferManager {
    pub fn new(config: TransferConfig, sink: Arc<dyn FileSink>) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                config,
                pipe: Mutex::new(None),
                records: DashMap::new(),
                outgoing: Mutex::new(None),
                incoming: Mutex::new(None),
                send_lock: tokio::sync::Mutex::new(()),
                sink,
                observers: Observers::new(),
            }),
        }
    }

    pub fn attach(&self, pipe: Arc<dyn DataPipe>) {
        debug!("File-transfer channel attached");
        *lock(&self.inner.pipe) = Some(pipe);
    }

    pub fn is_ready(&self) -> bool {
        self.open_pipe().is_some()
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&TransferUpdate) + Send + Sync + 'static,
    {
        self.inner.observers.subscribe(listener)
    }

    pub fn record(&self, id: TransferId) -> Option<TransferRecord> {
        self.inner.records.get(&id).map(|r| r.clone())
    }

    pub fn records(&self) -> Vec<TransferRecord> {
        self.inner.records.iter().map(|r| r.clone()).collect()
    }

    fn open_pipe(&self) -> Option<Arc<dyn DataPipe>> {
        lock(&self.inner.pipe).clone().filter(|p| p.is_open())
    }

    /// Reads `path` into memory and sends it.
    pub async fn send_file(&self, path: impl AsRef<Path>) -> Result<TransferRecord, TransferError> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_owned());
        self.send_bytes(&name, mime_for(&name), Bytes::from(data))
            .await
    }

    /// Offers `data` to the peer and streams it once accepted.
    ///
    /// Resolves with the final record, which may be completed, cancelled or failed.
    /// Errors are returned only when the transfer could not start.
    pub async fn send_bytes(
        &self,
        name: &str,
        mime_type: &str,
        data: Bytes,
    ) -> Result<TransferRecord, TransferError> {
        let pipe = self.open_pipe().ok_or(TransferError::NoChannel)?;

        let record = TransferRecord::new(
            name,
            mime_type,
            data.len() as u64,
            TransferDirection::Send,
            TransferStatus::WaitingForAccept,
        );
        let id = record.id;
        let (answer_tx, answer_rx) = oneshot::channel();
        let stop = Arc::new(StopSignal::default());

        {
            let mut outgoing = lock(&self.inner.outgoing);
            if outgoing.is_some() {
                return Err(TransferError::Busy);
            }
            *outgoing = Some(OutgoingSlot {
                id,
                answer: Some(answer_tx),
                stop: stop.clone(),
            });
        }
        self.insert(record);
        info!(transfer = %id, name, size = data.len(), "Offering file");

        let outcome = self
            .stream_outgoing(id, name, mime_type, &pipe, data, answer_rx, &stop)
            .await;

        {
            let mut outgoing = lock(&self.inner.outgoing);
            if outgoing.as_ref().is_some_and(|slot| slot.id == id) {
                outgoing.take();
            }
        }
        if let Err(reason) = outcome {
            warn!(transfer = %id, "Outgoing transfer failed: {}", reason);
            self.update(id, |r| r.fail(reason));
        }

        self.record(id).ok_or(TransferError::NotFound)
    }

    #[allow(clippy::too_many_arguments)]
    async fn stream_outgoing(
        &self,
        id: TransferId,
        name: &str,
        mime_type: &str,
        pipe: &Arc<dyn DataPipe>,
        data: Bytes,
        answer_rx: oneshot::Receiver<Answer>,
        stop: &StopSignal,
    ) -> Result<(), String> {
        let size = data.len() as u64;
        self.send_control(
            pipe,
            &ControlFrame::Offer {
                name: name.to_owned(),
                size,
                mime_type: mime_type.to_owned(),
            },
        )
        .await
        .map_err(|e| e.to_string())?;

        let answer = tokio::select! {
            answer = answer_rx => answer,
            _ = stop.wait() => return Ok(()),
        };
        match answer {
            Ok(Answer::Accepted) => {}
            Ok(Answer::Rejected(reason)) => {
                return Err(match reason {
                    Some(reason) => format!("rejected by peer: {reason}"),
                    None => "rejected by peer".to_owned(),
                });
            }
            Err(_) => return Err("channel closed before the offer was answered".to_owned()),
        }

        if stop.is_stopped() {
            return Ok(());
        }
        self.update(id, |r| r.set_status(TransferStatus::Transferring));
        debug!(transfer = %id, "Offer accepted");

        let chunk_size = self.inner.config.chunk_size.max(1);
        let mut offset = 0;
        let mut index = 0;
        while offset < data.len() {
            self.wait_for_capacity(pipe, index, stop).await;

            let end = (offset + chunk_size).min(data.len());
            {
                let _write = self.inner.send_lock.lock().await;
                if stop.is_stopped() {
                    return Ok(());
                }
                pipe.send_bytes(&data.slice(offset..end))
                    .await
                    .map_err(|e| e.to_string())?;
            }

            self.update(id, |r| r.advance((end - offset) as u64));
            offset = end;
            index += 1;
        }

        {
            let _write = self.inner.send_lock.lock().await;
            if stop.is_stopped() {
                return Ok(());
            }
            let eof = ControlFrame::Eof { total_bytes: size }
                .to_json()
                .map_err(|e| e.to_string())?;
            pipe.send_text(&eof).await.map_err(|e| e.to_string())?;
        }

        self.update(id, |r| r.complete());
        info!(transfer = %id, chunks = index, "Transfer sent");
        Ok(())
    }

    /// Holds back the next chunk while the channel has too much queued.
    async fn wait_for_capacity(&self, pipe: &Arc<dyn DataPipe>, index: usize, stop: &StopSignal) {
        let config = &self.inner.config;
        match pipe.buffered_amount().await {
            Some(queued) if queued > config.buffered_high => {
                debug!(queued, "Waiting for the channel to drain");
                tokio::select! {
                    drained = tokio::time::timeout(config.drain_timeout, pipe.buffered_low(config.buffered_low)) => {
                        if drained.is_err() {
                            warn!("Channel did not drain within {:?}", config.drain_timeout);
                        }
                    }
                    _ = stop.wait() => {}
                }
            }
            Some(_) => {}
            None => {
                if index > 0 && config.throttle_every > 0 && index % config.throttle_every == 0 {
                    tokio::select! {
                        _ = tokio::time::sleep(config.throttle_pause) => {}
                        _ = stop.wait() => {}
                    }
                }
            }
        }
    }

    /// Cancels a live transfer in either direction and tells the peer.
    pub async fn cancel(&self, id: TransferId) -> Result<(), TransferError> {
        let outgoing_stop = {
            let mut outgoing = lock(&self.inner.outgoing);
            if outgoing.as_ref().is_some_and(|slot| slot.id == id) {
                outgoing.take().map(|slot| slot.stop)
            } else {
                None
            }
        };
        let incoming_hit = {
            let mut incoming = lock(&self.inner.incoming);
            incoming.as_ref().is_some_and(|slot| slot.id == id) && incoming.take().is_some()
        };

        let side = match (&outgoing_stop, incoming_hit) {
            (Some(_), _) => StreamSide::Sending,
            (None, true) => StreamSide::Receiving,
            (None, false) => {
                return match self.record(id) {
                    Some(record) if record.is_terminal() => Err(TransferError::Finished),
                    Some(_) => Ok(()),
                    None => Err(TransferError::NotFound),
                };
            }
        };

        if let Some(stop) = outgoing_stop {
            stop.stop();
        }
        self.update(id, |r| r.cancel());
        info!(transfer = %id, "Transfer cancelled locally");

        if let Some(pipe) = self.open_pipe() {
            self.send_control(&pipe, &ControlFrame::Cancel { side: Some(side) })
                .await?;
        }
        Ok(())
    }

    /// Entry point for everything received on the "file-transfer" channel.
    pub async fn handle_message(&self, message: PipeMessage) {
        match message {
            PipeMessage::Text(text) => match ControlFrame::from_json(&text) {
                Ok(frame) => self.handle_control(frame).await,
                Err(e) => warn!("Invalid transfer control frame: {}", e),
            },
            PipeMessage::Binary(chunk) => self.handle_chunk(chunk),
        }
    }

    async fn handle_control(&self, frame: ControlFrame) {
        match frame {
            ControlFrame::Offer {
                name,
                size,
                mime_type,
            } => self.accept_offer(name, size, mime_type).await,
            ControlFrame::Accept => self.answer(Answer::Accepted),
            ControlFrame::Reject { reason } => self.answer(Answer::Rejected(reason)),
            ControlFrame::Eof { total_bytes } => self.finish_incoming(total_bytes).await,
            ControlFrame::Cancel { side } => self.peer_cancelled(side),
        }
    }

    async fn accept_offer(&self, name: String, size: u64, mime_type: String) {
        let Some(pipe) = self.open_pipe() else {
            warn!("Offer received without an open channel");
            return;
        };

        let accepted = {
            let mut incoming = lock(&self.inner.incoming);
            if incoming.is_some() {
                None
            } else {
                let record = TransferRecord::new(
                    name.clone(),
                    mime_type.clone(),
                    size,
                    TransferDirection::Receive,
                    TransferStatus::Transferring,
                );
                let capacity = usize::try_from(size).unwrap_or(MAX_PREALLOC).min(MAX_PREALLOC);
                *incoming = Some(IncomingSlot {
                    id: record.id,
                    name,
                    mime_type,
                    size,
                    buffer: BytesMut::with_capacity(capacity),
                });
                Some(record)
            }
        };

        let reply = match accepted {
            Some(record) => {
                info!(transfer = %record.id, name = %record.name, size, "Receiving file");
                self.insert(record);
                ControlFrame::Accept
            }
            None => {
                warn!("Offer received while another file is being received; rejecting");
                ControlFrame::Reject {
                    reason: Some("busy".to_owned()),
                }
            }
        };
        if let Err(e) = self.send_control(&pipe, &reply).await {
            warn!("Failed to answer offer: {}", e);
        }
    }

    fn answer(&self, answer: Answer) {
        let tx = lock(&self.inner.outgoing)
            .as_mut()
            .and_then(|slot| slot.answer.take());
        match tx {
            Some(tx) => {
                let _ = tx.send(answer);
            }
            None => debug!("Offer answer without a pending offer"),
        }
    }

    fn handle_chunk(&self, chunk: Bytes) {
        let mut incoming = lock(&self.inner.incoming);
        let Some(slot) = incoming.as_mut() else {
            debug!(len = chunk.len(), "Dropping chunk outside of a transfer");
            return;
        };

        let id = slot.id;
        if slot.buffer.len() as u64 + chunk.len() as u64 > slot.size {
            incoming.take();
            drop(incoming);
            self.update(id, |r| r.fail("received more data than offered"));
            return;
        }

        slot.buffer.extend_from_slice(&chunk);
        drop(incoming);
        self.update(id, |r| r.advance(chunk.len() as u64));
    }

    async fn finish_incoming(&self, total_bytes: u64) {
        let Some(slot) = lock(&self.inner.incoming).take() else {
            debug!("End of stream without a transfer");
            return;
        };

        let received = slot.buffer.len() as u64;
        if received != total_bytes || received != slot.size {
            warn!(transfer = %slot.id, received, total_bytes, "Size mismatch");
            self.update(slot.id, |r| {
                r.fail(format!(
                    "size mismatch: received {received} of {} bytes",
                    slot.size
                ))
            });
            return;
        }

        let file = ReceivedFile {
            id: slot.id,
            name: slot.name,
            mime_type: slot.mime_type,
            data: slot.buffer.freeze(),
        };
        match self.inner.sink.store(file).await {
            Ok(()) => {
                self.update(slot.id, |r| r.complete());
                info!(transfer = %slot.id, "Transfer received");
            }
            Err(e) => {
                warn!(transfer = %slot.id, "Failed to store received file: {}", e);
                self.update(slot.id, |r| r.fail(format!("write failed: {e}")));
            }
        }
    }

    /// The peer sent `cancel`. The peer's sending side maps to our incoming
    /// stream, which is discarded outright; its receiving side maps to our
    /// outgoing stream, which stops between chunks and is marked cancelled.
    fn peer_cancelled(&self, side: Option<StreamSide>) {
        let handled = match side {
            Some(StreamSide::Sending) => self.discard_incoming(),
            Some(StreamSide::Receiving) => self.stop_outgoing(),
            None => self.discard_incoming() || self.stop_outgoing(),
        };
        if !handled {
            debug!(?side, "Cancel for a stream that is no longer live");
        }
    }

    fn discard_incoming(&self) -> bool {
        let Some(slot) = lock(&self.inner.incoming).take() else {
            return false;
        };
        info!(transfer = %slot.id, "Sender cancelled; discarding buffered data");
        self.inner.records.remove(&slot.id);
        self.inner
            .observers
            .notify(&TransferUpdate::Discarded(slot.id));
        true
    }

    fn stop_outgoing(&self) -> bool {
        let Some(slot) = lock(&self.inner.outgoing).take() else {
            return false;
        };
        info!(transfer = %slot.id, "Receiver cancelled");
        slot.stop.stop();
        self.update(slot.id, |r| r.cancel());
        true
    }

    /// The channel went away: fail every live transfer with `reason`.
    pub fn channel_closed(&self, reason: &str) {
        lock(&self.inner.pipe).take();

        if let Some(slot) = lock(&self.inner.outgoing).take() {
            slot.stop.stop();
        }
        lock(&self.inner.incoming).take();

        let live: Vec<TransferId> = self
            .inner
            .records
            .iter()
            .filter(|r| !r.is_terminal())
            .map(|r| r.id)
            .collect();
        if !live.is_empty() {
            warn!(count = live.len(), "Failing transfers: {}", reason);
        }
        for id in live {
            self.update(id, |r| r.fail(reason));
        }
    }

    async fn send_control(
        &self,
        pipe: &Arc<dyn DataPipe>,
        frame: &ControlFrame,
    ) -> Result<(), TransferError> {
        let text = frame
            .to_json()
            .map_err(|e| TransferError::Protocol(e.to_string()))?;
        let _write = self.inner.send_lock.lock().await;
        pipe.send_text(&text).await?;
        Ok(())
    }

    fn insert(&self, record: TransferRecord) {
        self.inner.records.insert(record.id, record.clone());
        self.inner
            .observers
            .notify(&TransferUpdate::Changed(record));
    }

    fn update(&self, id: TransferId, mutate: impl FnOnce(&mut TransferRecord) -> bool) {
        let snapshot = {
            let Some(mut record) = self.inner.records.get_mut(&id) else {
                return;
            };
            if !mutate(&mut record) {
                return;
            }
            record.clone()
        };
        self.inner
            .observers
            .notify(&TransferUpdate::Changed(snapshot));
    }
}

/// MIME type from a file name's extension.
pub fn mime_for(name: &str) -> &'static str {
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "txt" | "log" | "md" => "text/plain",
        "html" | "htm" => "text/html",
        "csv" => "text/csv",
        "json" => "application/json",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp3" => "audio/mpeg",
        "mp4" => "video/mp4",
        "apk" => "application/vnd.android.package-archive",
        _ => "application/octet-stream",
    }
}
