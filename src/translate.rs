//! Text-to-text translation tables applied through the segment model.
//!
//! A table maps known source strings to replacements.  Each text segment of
//! a parsed unit is scanned once, left to right; at every position the
//! longest source string found there is replaced and the scan resumes after
//! it, so replacement text is never matched again.  Segments with no match
//! keep their original bytes.  In [`Fit::Fixed`] mode each replacement
//! is padded or clamped to the encoded width of the string it replaces, and
//! the rebuilt unit must come out the same size as the original.

use std::collections::HashMap;

use tracing::debug;

use crate::charset::Charset;
use crate::scf::{rebuild, RebuildOutput, ScfContainer, ScfError};

/// How a replacement is sized against the text it replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fit {
    /// Segments may grow or shrink.
    Free,
    /// Replacement takes exactly the encoded width of the source string.
    /// `pad` must encode to a single byte (usually `' '`).
    Fixed { pad: char },
}

#[derive(Debug, Clone, Default)]
pub struct TranslationTable {
    map: HashMap<String, String>,
}

impl TranslationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self { map: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
    }

    pub fn insert(&mut self, original: impl Into<String>, replacement: impl Into<String>) {
        self.map.insert(original.into(), replacement.into());
    }

    pub fn len(&self) -> usize { self.map.len() }
    pub fn is_empty(&self) -> bool { self.map.is_empty() }

    pub fn get(&self, original: &str) -> Option<&str> {
        self.map.get(original).map(String::as_str)
    }

    /// Longest source strings first, so a key that contains another key wins.
    /// Empty keys never match.
    fn ordered(&self) -> Vec<(&str, &str)> {
        let mut pairs: Vec<(&str, &str)> = self.map.iter()
            .filter(|(k, _)| !k.is_empty())
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        pairs.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then(a.0.cmp(b.0)));
        pairs
    }
}

/// Result of [`apply`].
#[derive(Debug)]
pub struct Applied {
    pub output:      RebuildOutput,
    /// Segments in which at least one source string was found.
    pub matched:     usize,
    pub size_before: usize,
    pub size_after:  usize,
}

/// Pad or clamp `replacement` so it encodes to exactly `width` bytes.
///
/// Clamping never splits a multi-byte character; the gap is filled with
/// `pad`.  Returns `None` if either string is not representable.
pub fn fit_to_width(replacement: &str, width: usize, pad: char, charset: &Charset) -> Option<String> {
    let widths = charset.char_widths(replacement)?;
    let mut used = 0;
    let mut out = String::with_capacity(replacement.len());
    for (c, w) in replacement.chars().zip(widths) {
        if used + w > width {
            break;
        }
        used += w;
        out.push(c);
    }
    let mut buf = [0u8; 4];
    if charset.encode(pad.encode_utf8(&mut buf))?.len() != 1 {
        return None;
    }
    out.extend(std::iter::repeat(pad).take(width - used));
    Some(out)
}

/// Apply `table` to every text segment of `container`.
pub fn apply(
    container: &ScfContainer,
    table:     &TranslationTable,
    charset:   &Charset,
    fit:       Fit,
) -> Result<Applied, ScfError> {
    let pairs = table.ordered();
    let mut fitted: HashMap<&str, String> = HashMap::new();
    if let Fit::Fixed { pad } = fit {
        for &(src, dst) in &pairs {
            let Some(width) = charset.encode(src).map(|b| b.len()) else { continue };
            if let Some(s) = fit_to_width(dst, width, pad, charset) {
                fitted.insert(src, s);
            }
        }
    }

    let mut matched = Vec::new();
    let mut replacements = Vec::new();
    for seg in &container.segments {
        let mut text = String::with_capacity(seg.text.len());
        let mut hit = false;
        let mut rest = seg.text.as_str();
        while let Some(c) = rest.chars().next() {
            let Some(&(src, dst)) = pairs.iter().find(|&&(src, _)| rest.starts_with(src)) else {
                text.push(c);
                rest = &rest[c.len_utf8()..];
                continue;
            };
            let dst = match fit {
                Fit::Free => dst,
                Fit::Fixed { .. } => match fitted.get(src) {
                    Some(s) => s.as_str(),
                    // Not representable: leave it for rebuild to report.
                    None => dst,
                },
            };
            text.push_str(dst);
            rest = &rest[src.len()..];
            hit = true;
        }
        if hit {
            debug!(offset = seg.offset, from = %seg.text, to = %text, "translated segment");
            matched.push(seg.clone());
            replacements.push(text);
        }
    }

    let subset = ScfContainer { segments: matched, ..container.clone() };
    let output = rebuild(&subset, Some(replacements.as_slice()), charset);
    let size_before = container.size;
    let size_after = output.bytes.len();
    if matches!(fit, Fit::Fixed { .. }) && size_before != size_after {
        return Err(ScfError::SizeChanged { before: size_before, after: size_after });
    }
    Ok(Applied { output, matched: replacements.len(), size_before, size_after })
}
