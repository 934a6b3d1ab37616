//! File payloads.

use serde::{Deserialize, Serialize};

/// Stored content of a file record.
///
/// Text and binary writes are kept apart so a text write reads back as the
/// exact string that went in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Content {
    Text(String),
    Binary(Vec<u8>),
}

impl Content {
    /// Size of the payload in bytes.
    pub fn size(&self) -> u64 {
        match self {
            Content::Text(s) => s.len() as u64,
            Content::Binary(b) => b.len() as u64,
        }
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, Content::Binary(_))
    }

    /// Borrow the payload as raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Content::Text(s) => s.as_bytes(),
            Content::Binary(b) => b,
        }
    }

    /// Consume into raw bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Content::Text(s) => s.into_bytes(),
            Content::Binary(b) => b,
        }
    }

    /// Consume into text. Binary payloads must be valid UTF-8.
    pub fn into_text(self) -> Result<String, std::string::FromUtf8Error> {
        match self {
            Content::Text(s) => Ok(s),
            Content::Binary(b) => String::from_utf8(b),
        }
    }
}

impl From<String> for Content {
    fn from(s: String) -> Self {
        Content::Text(s)
    }
}

impl From<&str> for Content {
    fn from(s: &str) -> Self {
        Content::Text(s.to_string())
    }
}

impl From<Vec<u8>> for Content {
    fn from(b: Vec<u8>) -> Self {
        Content::Binary(b)
    }
}
