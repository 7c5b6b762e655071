use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const CODE_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodeError {
    #[error("session code must have {CODE_LEN} characters, got {0}")]
    Length(usize),
    #[error("session code contains invalid character {0:?}")]
    InvalidChar(char),
}

/// Session code issued by the rendezvous service: 8 characters of `[A-Z0-9]`.
///
/// Parsing is case-insensitive and accepts the display form `XXXX-XXXX`.
/// The wire form is the bare 8 characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionCode(String);

impl SessionCode {
    pub fn parse(input: &str) -> Result<Self, CodeError> {
        let trimmed = input.trim();
        let dashed = trimmed.chars().count() == CODE_LEN + 1;
        let mut code = String::with_capacity(CODE_LEN);
        for (idx, ch) in trimmed.chars().enumerate() {
            if dashed && ch == '-' && idx == CODE_LEN / 2 {
                continue;
            }
            if !ch.is_ascii_alphanumeric() {
                return Err(CodeError::InvalidChar(ch));
            }
            code.push(ch.to_ascii_uppercase());
        }
        if code.len() != CODE_LEN {
            return Err(CodeError::Length(code.len()));
        }
        Ok(Self(code))
    }

    /// Raw 8-character form, as carried on the wire.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for SessionCode {
    type Err = CodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for SessionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (head, tail) = self.0.split_at(CODE_LEN / 2);
        write!(f, "{head}-{tail}")
    }
}

impl Serialize for SessionCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for SessionCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    Host,
    Guest,
}

impl Role {
    /// The host creates the data channels and sends the first offer.
    pub fn is_initiator(&self) -> bool {
        matches!(self, Role::Host)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Host => f.write_str("host"),
            Role::Guest => f.write_str("guest"),
        }
    }
}
