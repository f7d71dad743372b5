//! `.SCF` script units: NUL-terminated runs, some of which are script text.
//!
//! # Model
//! A unit is kept as an immutable byte snapshot plus the list of runs that
//! decode to script text under the injected [`Charset`].  Everything that is
//! not a text segment (opcodes, operands, ASCII resource names) is carried
//! implicitly by the snapshot.
//!
//! # Rebuild
//! Replacements are spliced from the last segment to the first so that the
//! recorded offsets of earlier segments stay valid while later segments
//! change length.  With no replacements the snapshot is returned verbatim.

pub mod document;
pub mod lines;

use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::charset::{Charset, UnknownCharset};

pub use document::{rebuild_from_files, save_for_translation};

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum ScfError {
    #[error("Segment at offset {offset:#x}: text not representable in the unit charset: {text:?}")]
    Encoding { offset: usize, text: String },
    #[error("Invalid SCF document: {0}")]
    Document(String),
    #[error("Unit size changed from {before} to {after} bytes")]
    SizeChanged { before: usize, after: usize },
    #[error(transparent)]
    Charset(#[from] UnknownCharset),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Non-fatal conditions met while rebuilding.
#[derive(Error, Debug)]
pub enum RebuildWarning {
    #[error("Text count mismatch: {segments} segments, {replacements} replacements")]
    CountMismatch { segments: usize, replacements: usize },
    #[error("Kept original bytes: {0}")]
    Unencodable(ScfError),
}

// ── Model ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSegment {
    pub offset: usize,
    /// Payload plus its terminator, if the run had one.
    pub length: usize,
    #[serde(rename = "original")]
    pub raw:    Vec<u8>,
    pub text:   String,
}

impl TextSegment {
    #[inline]
    pub fn end(&self) -> usize {
        self.offset + self.length
    }

    /// Runs cut off by end-of-file carry no terminator.
    pub fn is_terminated(&self) -> bool {
        self.raw.last() == Some(&0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScfContainer {
    #[serde(rename = "original_data")]
    pub original: Vec<u8>,
    pub size:     usize,
    /// Charset label the unit was decoded with.
    pub encoding: String,
    #[serde(rename = "text_segments")]
    pub segments: Vec<TextSegment>,
}

impl ScfContainer {
    /// Resolve the charset recorded at parse time.
    pub fn charset(&self) -> Result<Charset, UnknownCharset> {
        Charset::from_label(&self.encoding)
    }

    pub fn texts(&self) -> Vec<String> {
        extract_texts(self)
    }
}

/// Result of [`rebuild`].
#[derive(Debug)]
pub struct RebuildOutput {
    pub bytes:    Vec<u8>,
    /// Segments actually replaced.
    pub replaced: usize,
    pub warnings: Vec<RebuildWarning>,
}

// ── Codec ─────────────────────────────────────────────────────────────────────

pub fn parse(bytes: &[u8], charset: &Charset) -> ScfContainer {
    let mut segments = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        let start = pos;
        let run_end = bytes[start..]
            .iter()
            .position(|&b| b == 0)
            .map_or(bytes.len(), |p| start + p);
        pos = if run_end < bytes.len() { run_end + 1 } else { run_end };

        // A lone terminator (or a single unterminated byte) is never text.
        if pos - start <= 1 {
            continue;
        }
        let text = charset.decode_lossy(&bytes[start..run_end]);
        if charset.is_script_text(&text) {
            segments.push(TextSegment {
                offset: start,
                length: pos - start,
                raw:    bytes[start..pos].to_vec(),
                text,
            });
        }
    }

    ScfContainer {
        original: bytes.to_vec(),
        size:     bytes.len(),
        encoding: charset.label().to_owned(),
        segments,
    }
}

pub fn extract_texts(container: &ScfContainer) -> Vec<String> {
    container.segments.iter().map(|s| s.text.clone()).collect()
}

/// Rebuild the unit, replacing segment `i` with `replacements[i]`.
///
/// Best-effort: a count mismatch replaces the common prefix, and a text the
/// charset cannot encode leaves that segment's bytes untouched.  Both are
/// logged and returned as warnings.
pub fn rebuild(
    container:    &ScfContainer,
    replacements: Option<&[String]>,
    charset:      &Charset,
) -> RebuildOutput {
    let mut data = container.original.clone();
    let mut warnings = Vec::new();
    let replacements = match replacements {
        Some(r) if !r.is_empty() => r,
        _ => return RebuildOutput { bytes: data, replaced: 0, warnings },
    };

    let segments = &container.segments;
    if replacements.len() != segments.len() {
        let w = RebuildWarning::CountMismatch {
            segments:     segments.len(),
            replacements: replacements.len(),
        };
        warn!("{w}");
        warnings.push(w);
    }

    let n = segments.len().min(replacements.len());
    let mut replaced = 0;
    for (seg, text) in segments[..n].iter().zip(&replacements[..n]).rev() {
        let Some(mut encoded) = charset.encode(text) else {
            let w = RebuildWarning::Unencodable(ScfError::Encoding { offset: seg.offset, text: text.clone() });
            warn!("{w}");
            warnings.push(w);
            continue;
        };
        if seg.is_terminated() {
            encoded.push(0);
        }
        data.splice(seg.offset..seg.end(), encoded);
        replaced += 1;
    }

    RebuildOutput { bytes: data, replaced, warnings }
}

/// Check the structural invariants a deserialised container must satisfy.
pub fn validate(container: &ScfContainer) -> Result<(), ScfError> {
    if container.size != container.original.len() {
        return Err(ScfError::Document(format!(
            "declared size {} but {} bytes of original data",
            container.size,
            container.original.len(),
        )));
    }
    let mut prev_end = 0;
    for (i, seg) in container.segments.iter().enumerate() {
        if seg.length == 0 || seg.length != seg.raw.len() {
            return Err(ScfError::Document(format!(
                "segment {i}: length {} does not match {} original bytes",
                seg.length,
                seg.raw.len(),
            )));
        }
        let end = match seg.offset.checked_add(seg.length) {
            Some(end) if seg.offset >= prev_end && end <= container.size => end,
            _ => {
                return Err(ScfError::Document(format!(
                    "segment {i} at {:#x} (+{}) overlaps its predecessor or leaves the unit",
                    seg.offset,
                    seg.length,
                )));
            }
        };
        if container.original[seg.offset..end] != seg.raw[..] {
            return Err(ScfError::Document(format!(
                "segment {i} at {:#x}: original bytes differ from the unit snapshot",
                seg.offset,
            )));
        }
        prev_end = end;
    }
    Ok(())
}
