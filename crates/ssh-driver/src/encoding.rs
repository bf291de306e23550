//! Decoding of remote output lines.
//!
//! Remote commands produce bytes; the line demultiplexer hands each framed
//! line to an [`Encoding`] to turn it into text.

use std::fmt;
use std::str::FromStr;

use crate::error::DriverError;

/// Result of decoding a byte sequence to text.
#[derive(Debug, Clone)]
pub struct EncodedText {
    /// The decoded text.
    pub text: String,
    /// Number of replacement characters or escapes inserted.
    pub replacements: usize,
}

impl EncodedText {
    /// Whether any invalid input was replaced.
    #[must_use]
    pub const fn had_errors(&self) -> bool {
        self.replacements > 0
    }
}

/// Decode bytes as UTF-8, replacing invalid sequences with U+FFFD.
#[must_use]
pub fn decode_utf8_lossy(bytes: &[u8]) -> EncodedText {
    let text = String::from_utf8_lossy(bytes);
    let replacements = text.matches('\u{FFFD}').count();

    EncodedText {
        text: text.into_owned(),
        replacements,
    }
}

/// Decode bytes as UTF-8, escaping invalid bytes as `\xHH`.
#[must_use]
pub fn decode_utf8_escape(bytes: &[u8]) -> EncodedText {
    let mut text = String::with_capacity(bytes.len());
    let mut replacements = 0;

    for chunk in bytes.utf8_chunks() {
        text.push_str(chunk.valid());
        for byte in chunk.invalid() {
            text.push_str(&format!("\\x{byte:02x}"));
            replacements += 1;
        }
    }

    EncodedText { text, replacements }
}

/// Decode bytes as ISO-8859-1. Every byte maps to one code point.
#[must_use]
pub fn decode_latin1(bytes: &[u8]) -> EncodedText {
    EncodedText {
        text: bytes.iter().map(|&b| char::from(b)).collect(),
        replacements: 0,
    }
}

/// Text encoding of remote output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// UTF-8, invalid sequences replaced with U+FFFD.
    #[default]
    Utf8,
    /// UTF-8, invalid bytes escaped as `\xHH`.
    Utf8Escaped,
    /// ISO-8859-1.
    Latin1,
}

impl Encoding {
    /// Decode a line.
    #[must_use]
    pub fn decode(self, bytes: &[u8]) -> String {
        match self {
            Self::Utf8 => decode_utf8_lossy(bytes).text,
            Self::Utf8Escaped => decode_utf8_escape(bytes).text,
            Self::Latin1 => decode_latin1(bytes).text,
        }
    }

    /// Canonical label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Utf8 => "utf-8",
            Self::Utf8Escaped => "utf-8-escaped",
            Self::Latin1 => "latin-1",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Encoding {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "utf-8" | "utf8" => Ok(Self::Utf8),
            "utf-8-escaped" | "utf8-escaped" => Ok(Self::Utf8Escaped),
            "latin-1" | "latin1" | "iso-8859-1" | "iso8859-1" => Ok(Self::Latin1),
            other => Err(DriverError::invalid_argument(format!(
                "unsupported encoding: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_valid_utf8() {
        let result = decode_utf8_lossy("héllo".as_bytes());
        assert_eq!(result.text, "héllo");
        assert!(!result.had_errors());
    }

    #[test]
    fn decode_invalid_utf8_lossy() {
        let result = decode_utf8_lossy(b"hello\xff\xfeworld");
        assert!(result.text.contains('\u{FFFD}'));
        assert!(result.had_errors());
    }

    #[test]
    fn decode_invalid_utf8_escape() {
        let result = decode_utf8_escape(b"hello\xffworld");
        assert_eq!(result.text, "hello\\xffworld");
        assert_eq!(result.replacements, 1);
    }

    #[test]
    fn latin1_maps_every_byte() {
        assert_eq!(Encoding::Latin1.decode(b"caf\xe9"), "café");
    }

    #[test]
    fn parse_labels() {
        assert_eq!("UTF-8".parse::<Encoding>().unwrap(), Encoding::Utf8);
        assert_eq!("iso_8859_1".parse::<Encoding>().unwrap(), Encoding::Latin1);
        assert!("ebcdic".parse::<Encoding>().is_err());
    }
}
