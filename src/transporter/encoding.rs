//! Byte/text conversion for flat files.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use crate::error::TransportError;

/// Character encoding of a flat file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// Raw bytes, passed through unchanged. Text columns round-trip their UTF-8
    /// bytes; byte sequences that are not UTF-8 map one byte to one code point.
    #[default]
    Binary,
    /// ISO-8859-1: every byte is the code point of the same value.
    Latin1,
    Utf8,
}

impl Encoding {
    /// Decode raw record bytes. Returns `None` when the bytes are not valid.
    pub fn decode<'a>(&self, bytes: &'a [u8]) -> Option<Cow<'a, str>> {
        match self {
            Self::Utf8 => std::str::from_utf8(bytes).ok().map(Cow::Borrowed),
            Self::Binary => match std::str::from_utf8(bytes) {
                Ok(text) => Some(Cow::Borrowed(text)),
                Err(_) => Some(latin1_decode(bytes)),
            },
            Self::Latin1 if bytes.is_ascii() => std::str::from_utf8(bytes).ok().map(Cow::Borrowed),
            Self::Latin1 => Some(latin1_decode(bytes)),
        }
    }

    /// Encode text for writing. Returns `None` if a character has no representation.
    pub fn encode<'a>(&self, text: &'a str) -> Option<Cow<'a, [u8]>> {
        match self {
            Self::Utf8 | Self::Binary => Some(Cow::Borrowed(text.as_bytes())),
            Self::Latin1 if text.is_ascii() => Some(Cow::Borrowed(text.as_bytes())),
            Self::Latin1 => text
                .chars()
                .map(|c| u8::try_from(u32::from(c)).ok())
                .collect::<Option<Vec<u8>>>()
                .map(Cow::Owned),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Binary => "binary",
            Self::Latin1 => "latin1",
            Self::Utf8 => "utf-8",
        }
    }
}

fn latin1_decode(bytes: &[u8]) -> Cow<'_, str> {
    Cow::Owned(bytes.iter().map(|&b| char::from(b)).collect())
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Encoding {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "binary" | "ascii-8bit" | "raw" => Ok(Self::Binary),
            "latin1" | "iso-8859-1" => Ok(Self::Latin1),
            "utf-8" | "utf8" => Ok(Self::Utf8),
            other => Err(TransportError::invalid_config(format!(
                "unsupported encoding '{}' (expected binary, latin1 or utf-8)",
                other
            ))),
        }
    }
}
