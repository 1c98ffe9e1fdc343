use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

pub const MAX_MEMO_BYTES: usize = 512;
pub const MEMO_WARNING_BYTES: usize = 400;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoError {
    #[error("memo is {length} bytes, maximum is {max}")]
    TooLong { length: usize, max: usize },
    #[error("memo contains control characters")]
    ControlCharacters,
}

/// Raw memo bytes. Length is always measured in bytes, never characters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Memo(Vec<u8>);

impl Memo {
    pub fn from_text(text: &str) -> Self {
        Self(text.as_bytes().to_vec())
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn byte_len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn remaining_bytes(&self) -> usize {
        MAX_MEMO_BYTES.saturating_sub(self.0.len())
    }

    pub fn is_near_limit(&self, threshold: usize) -> bool {
        self.0.len() >= threshold
    }

    /// The memo as text, if it is valid UTF-8.
    pub fn as_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }
}

impl Serialize for Memo {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for Memo {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map(Memo)
            .map_err(serde::de::Error::custom)
    }
}

/// Byte-length check first, then a control-character check for text memos.
/// Binary memos are only length-checked.
pub fn validate_memo(memo: &Memo) -> Result<(), MemoError> {
    if memo.byte_len() > MAX_MEMO_BYTES {
        return Err(MemoError::TooLong {
            length: memo.byte_len(),
            max: MAX_MEMO_BYTES,
        });
    }
    if let Some(text) = memo.as_text() {
        if text
            .chars()
            .any(|c| c.is_control() && !matches!(c, '\n' | '\t' | '\r'))
        {
            return Err(MemoError::ControlCharacters);
        }
    }
    Ok(())
}
