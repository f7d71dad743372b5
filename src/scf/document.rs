//! Durable JSON form of an [`ScfContainer`], used to carry a parsed unit
//! from an extraction session to a later rebuild session.
//!
//! ```text
//! {
//!   "original_data": [ ...every byte of the unit... ],
//!   "size": 604,
//!   "encoding": "Shift_JIS",
//!   "text_segments": [ { "offset": 3, "length": 15, "original": [...], "text": "..." } ]
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::lines::{read_lines, write_lines};
use super::{extract_texts, parse, rebuild, validate, RebuildOutput, ScfContainer, ScfError};
use crate::charset::Charset;

impl ScfContainer {
    pub fn to_json(&self) -> Result<Vec<u8>, ScfError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Deserialise and check offsets, lengths and the size field against the
    /// embedded snapshot.
    pub fn from_json(bytes: &[u8]) -> Result<Self, ScfError> {
        let container: Self = serde_json::from_slice(bytes)?;
        validate(&container)?;
        Ok(container)
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<(), ScfError> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self, ScfError> {
        Self::from_json(&fs::read(path)?)
    }
}

/// Parse `unit_path` and write `<stem>.json` (structure) and `<stem>.txt`
/// (one text per line, see [`write_lines`]) into `out_dir`.
///
/// Returns the two paths and the number of segments found.
pub fn save_for_translation<P: AsRef<Path>, Q: AsRef<Path>>(
    unit_path: P,
    out_dir:   Q,
    charset:   &Charset,
) -> Result<(PathBuf, PathBuf, usize), ScfError> {
    let unit_path = unit_path.as_ref();
    let out_dir = out_dir.as_ref();
    fs::create_dir_all(out_dir)?;

    let container = parse(&fs::read(unit_path)?, charset);
    let stem = unit_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let json_path = out_dir.join(format!("{stem}.json"));
    let txt_path = out_dir.join(format!("{stem}.txt"));
    container.save_json(&json_path)?;
    let texts = extract_texts(&container);
    write_lines(&txt_path, &texts)?;

    debug!(unit = %unit_path.display(), segments = texts.len(), "saved for translation");
    Ok((json_path, txt_path, texts.len()))
}

/// Rebuild a unit from its JSON document and, if `txt_path` names an
/// existing file, its replacement lines.  The charset is the one recorded in
/// the document.
pub fn rebuild_from_files<P: AsRef<Path>>(
    json_path: P,
    txt_path:  Option<&Path>,
) -> Result<RebuildOutput, ScfError> {
    let container = ScfContainer::load_json(json_path)?;
    let charset = container.charset()?;
    let texts = match txt_path {
        Some(p) if p.exists() => Some(read_lines(p)?),
        _ => None,
    };
    Ok(rebuild(&container, texts.as_deref(), &charset))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit() -> Vec<u8> {
        let cs = Charset::shift_jis();
        let mut u = b"\x10\x00".to_vec();
        u.extend(cs.encode("シーン回想").unwrap());
        u.extend(b"\0\x20\x00");
        u
    }

    #[test]
    fn json_preserves_container() {
        let c = parse(&unit(), &Charset::shift_jis());
        let json = c.to_json().unwrap();
        let text = String::from_utf8(json.clone()).unwrap();
        assert!(text.contains("\"original_data\""));
        assert!(text.contains("\"text_segments\""));
        assert!(text.contains("シーン回想"));
        assert_eq!(ScfContainer::from_json(&json).unwrap(), c);
    }

    #[test]
    fn from_json_validates() {
        let mut c = parse(&unit(), &Charset::shift_jis());
        c.segments[0].offset = 1;
        let json = serde_json::to_vec(&c).unwrap();
        assert!(matches!(ScfContainer::from_json(&json), Err(ScfError::Document(_))));
    }

    #[test]
    fn from_json_rejects_huge_offset() {
        let mut c = parse(&unit(), &Charset::shift_jis());
        c.segments[0].offset = usize::MAX;
        c.segments[0].length = 1;
        c.segments[0].raw = vec![0];
        let json = serde_json::to_vec(&c).unwrap();
        assert!(matches!(ScfContainer::from_json(&json), Err(ScfError::Document(_))));
    }

    #[test]
    fn multi_line_segment_survives_text_file() {
        let cs = Charset::shift_jis();
        let mut u = b"\x10\x00".to_vec();
        u.extend(cs.encode("こんにちは\nさようなら").unwrap());
        u.push(0);

        let dir = tempfile::tempdir().unwrap();
        let unit_path = dir.path().join("SCN004.SCF");
        fs::write(&unit_path, &u).unwrap();
        let (json, txt, n) = save_for_translation(&unit_path, dir.path(), &cs).unwrap();
        assert_eq!(n, 1);
        assert_eq!(fs::read_to_string(&txt).unwrap(), "こんにちは\\nさようなら\n");
        assert_eq!(rebuild_from_files(&json, Some(txt.as_path())).unwrap().bytes, u);

        fs::write(&txt, "Halo\\nSampai jumpa\n").unwrap();
        let out = rebuild_from_files(&json, Some(txt.as_path())).unwrap();
        assert_eq!(out.bytes, b"\x10\x00Halo\nSampai jumpa\0");
    }

    #[test]
    fn translation_files_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let unit_path = dir.path().join("SCN002.SCF");
        fs::write(&unit_path, unit()).unwrap();

        let (json, txt, n) = save_for_translation(&unit_path, dir.path().join("parsed"), &Charset::shift_jis()).unwrap();
        assert_eq!(n, 1);
        assert_eq!(fs::read_to_string(&txt).unwrap(), "シーン回想\n");

        // Untouched text file: identity.
        assert_eq!(rebuild_from_files(&json, Some(txt.as_path())).unwrap().bytes, unit());
        // No text file at all: identity.
        assert_eq!(rebuild_from_files(&json, Some(dir.path().join("absent.txt").as_path())).unwrap().bytes, unit());

        fs::write(&txt, "Ingat Adegan\n").unwrap();
        let out = rebuild_from_files(&json, Some(txt.as_path())).unwrap();
        assert_eq!(out.bytes, b"\x10\x00Ingat Adegan\0\x20\x00");
    }
}
