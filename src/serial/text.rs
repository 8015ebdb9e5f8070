//! Decoding of raw serial bytes
//!
//! The controller prints shade and half-block glyphs while the display
//! driver initializes; lines made only of those are noise.

use std::borrow::Cow;

/// Decorative glyphs emitted during boot
pub const FILLER_GLYPHS: [char; 3] = ['▒', '░', '▐'];

/// Text decoded from one chunk of serial bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub text: String,
    /// Whether any invalid UTF-8 was replaced with U+FFFD
    pub lossy: bool,
}

/// Decode bytes as UTF-8, replacing invalid sequences instead of failing
pub fn decode(bytes: &[u8]) -> Decoded {
    match String::from_utf8_lossy(bytes) {
        Cow::Borrowed(text) => Decoded {
            text: text.to_string(),
            lossy: false,
        },
        Cow::Owned(text) => Decoded { text, lossy: true },
    }
}

/// True when every character is a filler glyph (vacuously true for "")
pub fn is_filler_only(text: &str) -> bool {
    text.chars().all(|c| FILLER_GLYPHS.contains(&c))
}

/// The trimmed line if it is worth printing
pub fn printable_line(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    if trimmed.is_empty() || is_filler_only(trimmed) {
        None
    } else {
        Some(trimmed)
    }
}
