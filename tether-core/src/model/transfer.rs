use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Size of every binary chunk on the "file-transfer" channel; the last chunk may be shorter.
pub const CHUNK_SIZE: usize = 16 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferId(pub Uuid);

impl TransferId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TransferId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Control frames of the chunked transfer protocol. Sent as text messages;
/// binary messages on the same channel are always chunks of the active stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ControlFrame {
    Offer {
        name: String,
        size: u64,
        mime_type: String,
    },
    Accept,
    Reject {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    Eof {
        total_bytes: u64,
    },
    /// Ends one of the author's streams. A frame without `side` comes from a
    /// peer that only ever runs one stream and is matched to whichever is live.
    Cancel {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        side: Option<StreamSide>,
    },
}

/// The author's part in the stream a `cancel` ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StreamSide {
    Sending,
    Receiving,
}

impl ControlFrame {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransferStatus {
    Pending,
    WaitingForAccept,
    Transferring,
    Completed,
    Failed,
    Cancelled,
}

impl TransferStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransferDirection {
    Send,
    Receive,
}

/// Progress in percent for `transferred` of `size` bytes.
///
/// 100 is reserved for completed transfers, so an unfinished transfer that has
/// moved every byte reports 99.
pub fn progress_of(transferred: u64, size: u64, status: TransferStatus) -> u8 {
    if status == TransferStatus::Completed {
        return 100;
    }
    if size == 0 {
        return 0;
    }
    let pct = (u128::from(transferred.min(size)) * 100 / u128::from(size)) as u8;
    pct.min(99)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRecord {
    pub id: TransferId,
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    pub transferred: u64,
    pub progress: u8,
    pub status: TransferStatus,
    pub direction: TransferDirection,
    pub error: Option<String>,
}

impl TransferRecord {
    pub fn new(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        size: u64,
        direction: TransferDirection,
        status: TransferStatus,
    ) -> Self {
        Self {
            id: TransferId::new(),
            name: name.into(),
            mime_type: mime_type.into(),
            size,
            transferred: 0,
            progress: 0,
            status,
            direction,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Moves a live record to `status`. Terminal records never change again.
    pub fn set_status(&mut self, status: TransferStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = status;
        self.progress = progress_of(self.transferred, self.size, status);
        true
    }

    /// Accounts `bytes` more bytes, saturating at `size`.
    pub fn advance(&mut self, bytes: u64) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.transferred = self.transferred.saturating_add(bytes).min(self.size);
        self.progress = progress_of(self.transferred, self.size, self.status);
        true
    }

    pub fn complete(&mut self) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.transferred = self.size;
        self.set_status(TransferStatus::Completed)
    }

    pub fn fail(&mut self, reason: impl Into<String>) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.error = Some(reason.into());
        self.set_status(TransferStatus::Failed)
    }

    pub fn cancel(&mut self) -> bool {
        self.set_status(TransferStatus::Cancelled)
    }
}
