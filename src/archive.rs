//! `.DSK` block archive: unpack to unit files and repack them in place.
//!
//! ```no_run
//! use sdkpack::archive::{Archive, RepackOptions, repack};
//!
//! // Unpack
//! let ar = Archive::open("scene.DSK", "scene.PFT")?;
//! let report = ar.extract_all("extracted")?;
//! assert_eq!(report.failed(), 0);
//!
//! // ... edit extracted/*.SCF ...
//!
//! // Repack into a new archive + index pair
//! let out = repack(ar.index(), "extracted", &RepackOptions::default())?;
//! std::fs::write("scene_new.DSK", &out.archive)?;
//! std::fs::write("scene_new.PFT", &out.index)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Block numbers are never reassigned.  Only sizes change on repack, so a
//! unit may grow only as far as the next occupied block.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use crate::block::{blocks_for, BlockLayout, BLOCK_SIZE};
use crate::index::{IndexEntry, IndexError, IndexTable};

/// Extension given to unit files on disk.
pub const DEFAULT_UNIT_EXTENSION: &str = "SCF";

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("{name}: offset {offset:#010x} + size {size} exceeds archive length {archive_len}")]
    Range { name: String, offset: u64, size: u32, archive_len: usize },
    #[error("{name}: replacement unit file not found")]
    MissingUnit { name: String },
    #[error("{name:?}: unit name is not a plain file name")]
    UnsafeName { name: String },
    #[error("{name}: {size} bytes do not fit in the {capacity} bytes before the next occupied block")]
    Overflow { name: String, size: usize, capacity: u64 },
    #[error("Index table has no entries")]
    EmptyIndex,
    #[error("Index error: {0}")]
    Index(#[from] IndexError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── Options ───────────────────────────────────────────────────────────────────

/// Configuration for [`unpack`].
#[derive(Debug, Clone)]
pub struct UnpackOptions {
    pub unit_extension: String,
}

impl Default for UnpackOptions {
    fn default() -> Self {
        Self { unit_extension: DEFAULT_UNIT_EXTENSION.to_owned() }
    }
}

/// Configuration for [`repack`] and [`repack_units`].
#[derive(Debug, Clone)]
pub struct RepackOptions {
    pub unit_extension:    String,
    /// Let the unit in the highest occupied block grow past the end of the
    /// original archive.  The buffer is extended to a whole block.
    pub allow_tail_growth: bool,
}

impl Default for RepackOptions {
    fn default() -> Self {
        Self {
            unit_extension:    DEFAULT_UNIT_EXTENSION.to_owned(),
            allow_tail_growth: true,
        }
    }
}

/// `<dir>/<name>.<ext>`, or `<dir>/<name>` when `ext` is empty.
///
/// Index names come from the `.PFT` file, so anything that is not a single
/// plain path component is refused with [`ArchiveError::UnsafeName`].
pub fn unit_path(dir: &Path, name: &str, ext: &str) -> Result<PathBuf, ArchiveError> {
    let file = if ext.is_empty() { name.to_owned() } else { format!("{name}.{ext}") };
    let mut components = Path::new(&file).components();
    let plain = !name.is_empty()
        && matches!(components.next(), Some(Component::Normal(_)))
        && components.next().is_none()
        && !name.contains(['/', '\\', ':'])
        && name != "..";
    if !plain {
        return Err(ArchiveError::UnsafeName { name: name.to_owned() });
    }
    Ok(dir.join(file))
}

// ── Unpack ────────────────────────────────────────────────────────────────────

/// Outcome of a best-effort unpack.
#[derive(Debug, Default)]
pub struct UnpackReport {
    pub extracted: usize,
    /// One entry per skipped unit: [`ArchiveError::Range`] or
    /// [`ArchiveError::UnsafeName`].
    pub failures:  Vec<ArchiveError>,
}

impl UnpackReport {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// Borrow the payload of `entry` from `archive`.
pub fn slice_unit<'a>(archive: &'a [u8], entry: &IndexEntry) -> Result<&'a [u8], ArchiveError> {
    let offset = entry.byte_offset();
    let end = entry.byte_end();
    if end > archive.len() as u64 {
        return Err(ArchiveError::Range {
            name:        entry.name.clone(),
            offset,
            size:        entry.byte_size,
            archive_len: archive.len(),
        });
    }
    Ok(&archive[offset as usize..end as usize])
}

/// Slice every entry out of `archive` in index order.  Out-of-range entries
/// are reported and skipped.
pub fn unpack_units<'a>(
    archive: &'a [u8],
    entries: &'a [IndexEntry],
) -> (Vec<(&'a IndexEntry, &'a [u8])>, Vec<ArchiveError>) {
    let mut units = Vec::with_capacity(entries.len());
    let mut failures = Vec::new();
    for entry in entries {
        match slice_unit(archive, entry) {
            Ok(data) => units.push((entry, data)),
            Err(e) => {
                warn!(error = %e, "skipping unit");
                failures.push(e);
            }
        }
    }
    (units, failures)
}

/// Write every in-range unit of `archive` into `output_dir`.
///
/// Range and name failures are isolated per entry; only I/O errors on the
/// output directory abort the call.
pub fn unpack<P: AsRef<Path>>(
    archive:    &[u8],
    entries:    &[IndexEntry],
    output_dir: P,
    opts:       &UnpackOptions,
) -> Result<UnpackReport, ArchiveError> {
    let output_dir = output_dir.as_ref();
    fs::create_dir_all(output_dir)?;

    let (units, failures) = unpack_units(archive, entries);
    let mut report = UnpackReport { extracted: 0, failures };
    for (entry, data) in units {
        let path = match unit_path(output_dir, &entry.name, &opts.unit_extension) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "skipping unit");
                report.failures.push(e);
                continue;
            }
        };
        fs::write(path, data)?;
        debug!(
            name = %entry.name,
            block = entry.block_index,
            offset = entry.byte_offset(),
            size = entry.byte_size,
            "extracted unit"
        );
        report.extracted += 1;
    }
    debug!(extracted = report.extracted, failed = report.failed(), total = entries.len(), "unpack finished");
    Ok(report)
}

// ── Repack ────────────────────────────────────────────────────────────────────

/// A freshly laid-out archive and its regenerated index.
#[derive(Debug)]
pub struct RepackOutput {
    pub archive:  Vec<u8>,
    /// Serialised `.PFT` bytes (original header, patched count).
    pub index:    Vec<u8>,
    /// Entries that made it into the new index, in original order.
    pub entries:  Vec<IndexEntry>,
    /// Units that were dropped: [`ArchiveError::MissingUnit`] or
    /// [`ArchiveError::UnsafeName`].
    pub failures: Vec<ArchiveError>,
}

impl RepackOutput {
    pub fn packed(&self) -> usize {
        self.entries.len()
    }
}

/// Lay out replacement units at their original block numbers.
///
/// `lookup` returns the replacement bytes for an entry, or `None` when the
/// unit is absent; absent units, and units whose lookup fails with
/// [`ArchiveError::UnsafeName`], are dropped from the new index with a
/// warning.  Any other lookup error aborts.  A unit larger than the space
/// before the next occupied block is rejected with [`ArchiveError::Overflow`]
/// rather than overwriting its neighbour.
pub fn repack_units<F>(
    index:      &IndexTable,
    mut lookup: F,
    opts:       &RepackOptions,
) -> Result<RepackOutput, ArchiveError>
where
    F: FnMut(&IndexEntry) -> Result<Option<Vec<u8>>, ArchiveError>,
{
    if index.entries.is_empty() {
        return Err(ArchiveError::EmptyIndex);
    }
    let layout = BlockLayout::new(&index.entries);
    let mut archive = vec![0u8; layout.archive_len()];
    let mut entries = Vec::with_capacity(index.entries.len());
    let mut failures = Vec::new();

    for entry in &index.entries {
        let data = match lookup(entry) {
            Ok(Some(d)) => d,
            Ok(None) => {
                warn!(name = %entry.name, "unit missing, dropping from index");
                failures.push(ArchiveError::MissingUnit { name: entry.name.clone() });
                continue;
            }
            Err(e @ ArchiveError::UnsafeName { .. }) => {
                warn!(error = %e, "dropping unit from index");
                failures.push(e);
                continue;
            }
            Err(e) => return Err(e),
        };
        let size = packed_size(&entry.name, data.len())?;

        let offset = entry.byte_offset() as usize;
        let end = offset + data.len();
        match layout.capacity(entry.block_index) {
            Some(capacity) if data.len() as u64 > capacity => {
                return Err(ArchiveError::Overflow { name: entry.name.clone(), size: data.len(), capacity });
            }
            None if end > archive.len() => {
                if !opts.allow_tail_growth {
                    return Err(ArchiveError::Overflow {
                        name:     entry.name.clone(),
                        size:     data.len(),
                        capacity: (archive.len() - offset) as u64,
                    });
                }
                archive.resize(blocks_for(end) * BLOCK_SIZE, 0);
            }
            _ => {}
        }
        archive[offset..end].copy_from_slice(&data);

        if data.len() != entry.byte_size as usize {
            debug!(
                name = %entry.name,
                block = entry.block_index,
                size = data.len(),
                diff = data.len() as i64 - entry.byte_size as i64,
                "packed resized unit"
            );
        } else {
            debug!(name = %entry.name, block = entry.block_index, size = data.len(), "packed unit");
        }
        entries.push(IndexEntry::new(entry.name.clone(), entry.block_index, size));
    }

    let index_bytes = IndexTable::write(&entries, &index.header);
    debug!(packed = entries.len(), total = index.entries.len(), blocks = archive.len() / BLOCK_SIZE, "repack finished");
    Ok(RepackOutput { archive, index: index_bytes, entries, failures })
}

/// Index records hold sizes as `u32`.
fn packed_size(name: &str, len: usize) -> Result<u32, ArchiveError> {
    u32::try_from(len).map_err(|_| ArchiveError::Overflow {
        name:     name.to_owned(),
        size:     len,
        capacity: u64::from(u32::MAX),
    })
}

/// Repack from unit files in `unit_dir`.
pub fn repack<P: AsRef<Path>>(
    index:    &IndexTable,
    unit_dir: P,
    opts:     &RepackOptions,
) -> Result<RepackOutput, ArchiveError> {
    let unit_dir = unit_dir.as_ref();
    repack_units(
        index,
        |entry| match fs::read(unit_path(unit_dir, &entry.name, &opts.unit_extension)?) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        },
        opts,
    )
}

// ── Archive ───────────────────────────────────────────────────────────────────

/// An archive file loaded together with its index.
pub struct Archive {
    path:  PathBuf,
    index: IndexTable,
    data:  Vec<u8>,
}

impl Archive {
    pub fn open<P: AsRef<Path>, Q: AsRef<Path>>(archive_path: P, index_path: Q) -> Result<Self, ArchiveError> {
        let path = archive_path.as_ref().to_owned();
        let index = IndexTable::open(index_path)?;
        let data = fs::read(&path)?;
        Ok(Self { path, index, data })
    }

    /// Open `archive_path` with the index found by [`default_index_path`].
    pub fn open_with_default_index<P: AsRef<Path>>(archive_path: P) -> Result<Self, ArchiveError> {
        let index_path = default_index_path(archive_path.as_ref());
        Self::open(archive_path, index_path)
    }

    pub fn from_parts(path: PathBuf, index: IndexTable, data: Vec<u8>) -> Self {
        Self { path, index, data }
    }

    pub fn path(&self) -> &Path { &self.path }
    pub fn index(&self) -> &IndexTable { &self.index }
    pub fn bytes(&self) -> &[u8] { &self.data }

    pub fn list(&self) -> &[IndexEntry] {
        &self.index.entries
    }

    pub fn read_unit(&self, name: &str) -> Result<&[u8], ArchiveError> {
        let entry = self.index.find(name)
            .ok_or_else(|| ArchiveError::MissingUnit { name: name.to_owned() })?;
        slice_unit(&self.data, entry)
    }

    /// Extract all units into `dest` using the default unit extension.
    pub fn extract_all<P: AsRef<Path>>(&self, dest: P) -> Result<UnpackReport, ArchiveError> {
        unpack(&self.data, &self.index.entries, dest, &UnpackOptions::default())
    }
}

/// `scene.DSK` / `scene.SDK` → `scene.PFT`.
pub fn default_index_path(archive_path: &Path) -> PathBuf {
    archive_path.with_extension("PFT")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::HEADER_SIZE;

    fn table(entries: Vec<IndexEntry>) -> IndexTable {
        IndexTable { header: [0u8; HEADER_SIZE], entries }
    }

    fn from_map<'a>(
        units: &'a [(&'a str, Vec<u8>)],
    ) -> impl FnMut(&IndexEntry) -> Result<Option<Vec<u8>>, ArchiveError> + 'a {
        move |e| Ok(units.iter().find(|(n, _)| *n == e.name).map(|(_, d)| d.clone()))
    }

    #[test]
    fn out_of_range_entry_is_isolated() {
        let archive = vec![7u8; 4096];
        let entries = vec![IndexEntry::new("OK", 0, 10), IndexEntry::new("BAD", 1, 4000)];
        let (units, failures) = unpack_units(&archive, &entries);
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].0.name, "OK");
        assert!(matches!(&failures[..], [ArchiveError::Range { name, .. }] if name == "BAD"));
    }

    #[test]
    fn missing_unit_is_dropped_from_index() {
        let index = table(vec![IndexEntry::new("A", 0, 4), IndexEntry::new("B", 1, 4)]);
        let units = [("B", vec![1, 2, 3])];
        let out = repack_units(&index, from_map(&units), &RepackOptions::default()).unwrap();
        assert_eq!(out.entries, vec![IndexEntry::new("B", 1, 3)]);
        assert!(matches!(&out.failures[..], [ArchiveError::MissingUnit { name }] if name == "A"));
        assert_eq!(out.archive.len(), 2 * BLOCK_SIZE);
        assert_eq!(IndexTable::read(&out.index).unwrap().entries, out.entries);
    }

    #[test]
    fn growth_within_gap_is_allowed() {
        let index = table(vec![IndexEntry::new("A", 0, 100), IndexEntry::new("B", 2, 10)]);
        let units = [("A", vec![0xAA; 2 * BLOCK_SIZE]), ("B", vec![0xBB; 10])];
        let out = repack_units(&index, from_map(&units), &RepackOptions::default()).unwrap();
        assert_eq!(out.entries[0].byte_size as usize, 2 * BLOCK_SIZE);
        assert_eq!(out.archive[2 * BLOCK_SIZE], 0xBB);
    }

    #[test]
    fn overflow_into_next_block_is_rejected() {
        let index = table(vec![IndexEntry::new("A", 0, 100), IndexEntry::new("B", 2, 10)]);
        let units = [("A", vec![0xAA; 2 * BLOCK_SIZE + 1]), ("B", vec![0xBB; 10])];
        let err = repack_units(&index, from_map(&units), &RepackOptions::default()).unwrap_err();
        assert!(matches!(err, ArchiveError::Overflow { capacity: 4096, size: 4097, .. }));
    }

    #[test]
    fn tail_growth_extends_to_whole_block() {
        let index = table(vec![IndexEntry::new("A", 1, 100)]);
        let units = [("A", vec![1u8; BLOCK_SIZE + 5])];
        let out = repack_units(&index, from_map(&units), &RepackOptions::default()).unwrap();
        assert_eq!(out.archive.len(), 3 * BLOCK_SIZE);
        assert!(out.archive[..BLOCK_SIZE].iter().all(|&b| b == 0));
        assert!(out.archive[2 * BLOCK_SIZE + 5..].iter().all(|&b| b == 0));

        let strict = RepackOptions { allow_tail_growth: false, ..Default::default() };
        let err = repack_units(&index, from_map(&units), &strict).unwrap_err();
        assert!(matches!(err, ArchiveError::Overflow { capacity: 2048, .. }));
    }

    #[test]
    fn empty_index_is_rejected() {
        let err = repack_units(&table(vec![]), |_| Ok(None), &RepackOptions::default()).unwrap_err();
        assert!(matches!(err, ArchiveError::EmptyIndex));
    }

    #[test]
    fn unit_path_refuses_escaping_names() {
        let dir = Path::new("out");
        assert_eq!(unit_path(dir, "SCN002", "SCF").unwrap(), PathBuf::from("out/SCN002.SCF"));
        assert_eq!(unit_path(dir, "a..b", "").unwrap(), PathBuf::from("out/a..b"));
        for name in ["../evil", "..", "/etc", "a/b", "a\\b", "C:x", ""] {
            assert!(
                matches!(unit_path(dir, name, "SCF"), Err(ArchiveError::UnsafeName { .. })),
                "{name:?} accepted"
            );
        }
        assert!(unit_path(dir, "..", "").is_err());
        assert!(unit_path(dir, ".", "").is_err());
    }

    #[test]
    fn unpack_isolates_unsafe_names() {
        let ws = tempfile::tempdir().unwrap();
        let out = ws.path().join("out");
        let archive = vec![0x41u8; BLOCK_SIZE];
        let entries = vec![
            IndexEntry::new("../evil", 0, 4),
            IndexEntry::new("/abs", 0, 4),
            IndexEntry::new("GOOD", 0, 4),
        ];
        let report = unpack(&archive, &entries, &out, &UnpackOptions::default()).unwrap();
        assert_eq!(report.extracted, 1);
        assert_eq!(report.failed(), 2);
        assert!(report.failures.iter().all(|e| matches!(e, ArchiveError::UnsafeName { .. })));
        assert!(!ws.path().join("evil.SCF").exists());
        assert_eq!(fs::read(out.join("GOOD.SCF")).unwrap(), b"AAAA");
    }

    #[test]
    fn repack_drops_unsafe_names() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("B.SCF"), b"bb").unwrap();
        let index = table(vec![IndexEntry::new("../A", 0, 4), IndexEntry::new("B", 1, 4)]);
        let out = repack(&index, dir.path(), &RepackOptions::default()).unwrap();
        assert_eq!(out.entries, vec![IndexEntry::new("B", 1, 2)]);
        assert!(matches!(&out.failures[..], [ArchiveError::UnsafeName { name }] if name == "../A"));
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn size_past_u32_is_overflow() {
        assert_eq!(packed_size("A", u32::MAX as usize).unwrap(), u32::MAX);
        let err = packed_size("A", u32::MAX as usize + 1).unwrap_err();
        assert!(matches!(err, ArchiveError::Overflow { size, .. } if size == 1 << 32));
    }

    #[test]
    fn default_index_path_swaps_extension() {
        assert_eq!(default_index_path(Path::new("data/scene.DSK")), PathBuf::from("data/scene.PFT"));
    }
}
