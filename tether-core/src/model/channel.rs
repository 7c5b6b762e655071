use serde::{Deserialize, Serialize};
use std::fmt;

/// The two logical data channels of a session. Peers bind their channel
/// objects to each other by label only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelLabel {
    Input,
    FileTransfer,
}

impl ChannelLabel {
    pub const ALL: [ChannelLabel; 2] = [ChannelLabel::Input, ChannelLabel::FileTransfer];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::FileTransfer => "file-transfer",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "input" => Some(Self::Input),
            "file-transfer" => Some(Self::FileTransfer),
            _ => None,
        }
    }
}

impl fmt::Display for ChannelLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
