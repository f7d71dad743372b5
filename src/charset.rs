//! Legacy double-byte charset used to decode and re-encode script text.
//!
//! A [`Charset`] is always passed explicitly to the SCF codec; nothing in
//! the crate falls back to a built-in default.  This keeps titles that use
//! a different code page (EUC-JP, GBK, Big5, ...) supported without code
//! changes.

use std::borrow::Cow;
use std::ops::RangeInclusive;

use encoding_rs::Encoding;
use thiserror::Error;

/// Hiragana + Katakana.
pub const KANA: RangeInclusive<char> = '\u{3040}'..='\u{30FF}';
/// CJK Unified Ideographs.
pub const CJK_IDEOGRAPHS: RangeInclusive<char> = '\u{4E00}'..='\u{9FFF}';

#[derive(Error, Debug)]
#[error("Unknown charset label: {0}")]
pub struct UnknownCharset(pub String);

#[derive(Debug, Clone)]
pub struct Charset {
    encoding:     &'static Encoding,
    /// A decoded run is script text if any char falls in one of these.
    script_ranges: Vec<RangeInclusive<char>>,
}

impl Charset {
    pub fn new(encoding: &'static Encoding, script_ranges: Vec<RangeInclusive<char>>) -> Self {
        Self { encoding, script_ranges }
    }

    /// Shift_JIS with Japanese kana/kanji classification.
    pub fn shift_jis() -> Self {
        Self::new(encoding_rs::SHIFT_JIS, vec![KANA, CJK_IDEOGRAPHS])
    }

    /// Resolve a WHATWG label (`"shift_jis"`, `"euc-jp"`, `"gbk"`, ...).
    /// Script ranges default to kana + CJK ideographs.
    pub fn from_label(label: &str) -> Result<Self, UnknownCharset> {
        Encoding::for_label(label.trim().as_bytes())
            .map(|enc| Self::new(enc, vec![KANA, CJK_IDEOGRAPHS]))
            .ok_or_else(|| UnknownCharset(label.to_owned()))
    }

    pub fn with_script_ranges(mut self, ranges: Vec<RangeInclusive<char>>) -> Self {
        self.script_ranges = ranges;
        self
    }

    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    /// Canonical label, recorded in parsed containers.
    pub fn label(&self) -> &'static str {
        self.encoding.name()
    }

    /// Decode, silently dropping byte sequences the charset cannot map.
    pub fn decode_lossy(&self, bytes: &[u8]) -> String {
        let (text, _) = self.encoding.decode_without_bom_handling(bytes);
        match text {
            Cow::Borrowed(s) => s.to_owned(),
            Cow::Owned(s) => s.chars().filter(|&c| c != char::REPLACEMENT_CHARACTER).collect(),
        }
    }

    /// Encode strictly.  `None` if any char is not representable.
    pub fn encode(&self, text: &str) -> Option<Vec<u8>> {
        let (bytes, _, had_errors) = self.encoding.encode(text);
        if had_errors { None } else { Some(bytes.into_owned()) }
    }

    pub fn is_script_text(&self, text: &str) -> bool {
        text.chars().any(|c| self.script_ranges.iter().any(|r| r.contains(&c)))
    }

    /// Length in bytes of each encoded char, so callers can cut on a char
    /// boundary.  `None` if `text` is not representable.
    pub fn char_widths(&self, text: &str) -> Option<Vec<usize>> {
        let mut buf = [0u8; 4];
        text.chars()
            .map(|c| self.encode(c.encode_utf8(&mut buf)).map(|b| b.len()))
            .collect()
    }
}
