use std::borrow::Cow;

/// Encoded length of the character starting with `lead`, or 0 when `lead`
/// cannot start a character.
pub fn utf8_char_len(lead: u8) -> usize {
    if lead & 0x80 == 0 {
        1
    } else if lead & 0xE0 == 0xC0 {
        2
    } else if lead & 0xF0 == 0xE0 {
        3
    } else if lead & 0xF8 == 0xF0 {
        4
    } else {
        0
    }
}

/// A run of complete characters as judged by their lead bytes.
///
/// Only lead bytes are checked, so a unit may hold malformed sequences
/// such as a two-byte lead followed by ASCII. [`TextUnit::as_bytes`] is
/// always the raw output; [`TextUnit::text`] may differ from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextUnit {
    bytes: Vec<u8>,
}

impl TextUnit {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Decoded text. Malformed sequences become U+FFFD, so the result can
    /// differ from the raw bytes; this is what reaches progress sinks and
    /// the conversation ledger.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Turns an arbitrarily chunked byte stream into units that never end in
/// the middle of a character.
#[derive(Debug, Default)]
pub struct Utf8Reassembler {
    pending: Vec<u8>,
}

impl Utf8Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `bytes` and returns everything that is now complete.
    ///
    /// Scanning stops at the first character whose bytes have not all
    /// arrived, or at a byte that cannot lead a character; that byte and
    /// everything after it stay pending.
    pub fn feed(&mut self, bytes: &[u8]) -> Option<TextUnit> {
        self.pending.extend_from_slice(bytes);

        let mut complete = 0;
        while complete < self.pending.len() {
            let len = utf8_char_len(self.pending[complete]);
            if len == 0 || complete + len > self.pending.len() {
                break;
            }
            complete += len;
        }

        if complete == 0 {
            return None;
        }
        let rest = self.pending.split_off(complete);
        let bytes = std::mem::replace(&mut self.pending, rest);
        Some(TextUnit { bytes })
    }

    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    pub fn take_pending(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.pending)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lead_byte_lengths() {
        assert_eq!(utf8_char_len(b'a'), 1);
        assert_eq!(utf8_char_len(0xC3), 2);
        assert_eq!(utf8_char_len(0xE2), 3);
        assert_eq!(utf8_char_len(0xF0), 4);
        assert_eq!(utf8_char_len(0x80), 0);
        assert_eq!(utf8_char_len(0xFF), 0);
    }

    #[test]
    fn ascii_passes_through_as_one_unit() {
        let mut reassembler = Utf8Reassembler::new();
        let unit = reassembler.feed(b"Hello").expect("unit");
        assert_eq!(unit.text(), "Hello");
        assert!(reassembler.is_empty());
    }

    #[test]
    fn split_character_is_held_until_complete() {
        let euro = "€".as_bytes();
        let mut reassembler = Utf8Reassembler::new();

        assert_eq!(reassembler.feed(&euro[..1]), None);
        assert_eq!(reassembler.feed(&euro[1..2]), None);
        let unit = reassembler.feed(&euro[2..]).expect("completed character");
        assert_eq!(unit.text(), "€");
        assert!(reassembler.is_empty());
    }

    #[test]
    fn complete_prefix_is_emitted_and_partial_suffix_kept() {
        let bytes = "a😀".as_bytes();
        let mut reassembler = Utf8Reassembler::new();

        let unit = reassembler.feed(&bytes[..3]).expect("ascii prefix");
        assert_eq!(unit.as_bytes(), b"a");
        assert_eq!(reassembler.pending(), &bytes[1..3]);

        let unit = reassembler.feed(&bytes[3..]).expect("emoji");
        assert_eq!(unit.text(), "😀");
    }

    #[test]
    fn invalid_lead_byte_is_retained() {
        let mut reassembler = Utf8Reassembler::new();
        let unit = reassembler.feed(&[b'o', b'k', 0x80, b'x']).expect("prefix");
        assert_eq!(unit.as_bytes(), b"ok");
        assert_eq!(reassembler.pending(), &[0x80, b'x']);
        assert_eq!(reassembler.feed(b"more"), None);
        assert_eq!(reassembler.take_pending(), vec![0x80, b'x', b'm', b'o', b'r', b'e']);
    }

    #[test]
    fn malformed_sequence_is_replaced_in_text_but_kept_in_bytes() {
        let mut reassembler = Utf8Reassembler::new();
        let unit = reassembler.feed(&[0xC3, b'A']).expect("lead-sized unit");
        assert_eq!(unit.as_bytes(), &[0xC3, b'A']);
        assert_eq!(unit.text(), "\u{FFFD}A");
        assert!(reassembler.is_empty());
    }

    #[test]
    fn every_chunking_preserves_the_byte_stream() {
        let source = "héllo wörld, 你好 😀!".as_bytes();
        for chunk_size in 1..=source.len() {
            let mut reassembler = Utf8Reassembler::new();
            let mut rebuilt = Vec::new();
            for chunk in source.chunks(chunk_size) {
                if let Some(unit) = reassembler.feed(chunk) {
                    assert!(std::str::from_utf8(unit.as_bytes()).is_ok());
                    rebuilt.extend(unit.into_bytes());
                }
            }
            rebuilt.extend(reassembler.take_pending());
            assert_eq!(rebuilt, source, "chunk size {chunk_size}");
        }
    }

    #[test]
    fn uneven_chunks_with_pending_tail_are_lossless() {
        let source = "ab€".as_bytes();
        let mut reassembler = Utf8Reassembler::new();
        let mut rebuilt = Vec::new();
        let fed = &source[..4];
        for chunk in [&fed[..3], &fed[3..]] {
            if let Some(unit) = reassembler.feed(chunk) {
                rebuilt.extend(unit.into_bytes());
            }
        }
        assert_eq!(rebuilt, b"ab");
        assert_eq!(reassembler.pending(), &source[2..4]);
        rebuilt.extend(reassembler.take_pending());
        assert_eq!(rebuilt, fed);
    }
}
