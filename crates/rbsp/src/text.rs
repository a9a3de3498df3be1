//! Lump text is 8-bit: every byte is one character (ISO 8859-1), so any byte
//! string decodes to text and encodes back to the same bytes.

use std::borrow::Cow;

/// Decodes lump bytes, borrowing them when they are plain ASCII.
pub fn decode(bytes: &[u8]) -> Cow<'_, str> {
    if bytes.is_ascii() {
        if let Ok(text) = std::str::from_utf8(bytes) {
            return Cow::Borrowed(text);
        }
    }
    Cow::Owned(bytes.iter().map(|&b| char::from(b)).collect())
}

/// Encodes text back to lump bytes. Fails with the first character above
/// U+00FF, which has no single-byte form.
pub fn encode(text: &str) -> Result<Vec<u8>, char> {
    text.chars().map(|c| u8::try_from(c).map_err(|_| c)).collect()
}
