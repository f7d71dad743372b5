//! Archive/index consistency check.
//!
//! [`verify`] never fails on bad data.  Every problem is recorded in the
//! [`VerifyReport`]; callers decide what is fatal.  The BLAKE3 digest lets
//! callers confirm bit-identity of a repacked archive against the original,
//! and [`compare`] locates the first byte and the index entries that differ
//! when it is not.

use std::ops::Range;

use crc32fast::Hasher;

use crate::block::{BlockLayout, BLOCK_SIZE};
use crate::index::{IndexEntry, IndexTable};

/// Health of one index entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryStatus {
    /// Span lies inside the archive; `crc32` is over the unit bytes.
    Ok { crc32: u32 },
    /// `offset + size` runs past the end of the archive.
    OutOfRange { available: u64 },
}

#[derive(Debug, Clone)]
pub struct EntryCheck {
    pub entry:  IndexEntry,
    pub offset: u64,
    pub status: EntryStatus,
}

/// Two entries whose byte spans intersect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Overlap {
    pub first:  String,
    pub second: String,
    pub bytes:  u64,
}

#[derive(Debug)]
pub struct VerifyReport {
    pub entries:       Vec<EntryCheck>,
    pub overlaps:      Vec<Overlap>,
    /// Non-zero byte ranges found outside every entry's span.
    pub dirty_gaps:    Vec<Range<usize>>,
    /// `(max(block_index) + 1) * BLOCK_SIZE`.
    pub expected_size: usize,
    pub actual_size:   usize,
    /// Header count field disagrees with the parsed entry count.
    pub count_mismatch: Option<(u32, usize)>,
    pub digest_hex:    String,
}

impl VerifyReport {
    pub fn out_of_range(&self) -> usize {
        self.entries.iter().filter(|e| matches!(e.status, EntryStatus::OutOfRange { .. })).count()
    }

    pub fn size_matches(&self) -> bool {
        self.expected_size == self.actual_size
    }

    pub fn is_clean(&self) -> bool {
        self.out_of_range() == 0
            && self.overlaps.is_empty()
            && self.dirty_gaps.is_empty()
            && self.size_matches()
            && self.count_mismatch.is_none()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} entries, {} out of range, {} overlap(s), {} dirty gap(s), size {} / expected {} ({:+}), blake3 {}",
            self.entries.len(),
            self.out_of_range(),
            self.overlaps.len(),
            self.dirty_gaps.len(),
            self.actual_size,
            self.expected_size,
            self.actual_size as i64 - self.expected_size as i64,
            &self.digest_hex[..16],
        )
    }
}

/// BLAKE3 of `bytes` as lowercase hex.
pub fn digest_hex(bytes: &[u8]) -> String {
    hex::encode(blake3::hash(bytes).as_bytes())
}

pub fn verify(index: &IndexTable, archive: &[u8]) -> VerifyReport {
    let entries: Vec<EntryCheck> = index.entries.iter().map(|e| check_entry(e, archive)).collect();

    // Spans clipped to the archive, sorted by start for the sweep below.
    let mut spans: Vec<(usize, usize, &str)> = index.entries.iter()
        .filter(|e| e.byte_size > 0)
        .map(|e| {
            let start = (e.byte_offset() as usize).min(archive.len());
            let end = (e.byte_end() as usize).min(archive.len());
            (start, end, e.name.as_str())
        })
        .collect();
    spans.sort_by_key(|&(start, end, _)| (start, end));

    let mut overlaps = Vec::new();
    for (i, a) in spans.iter().enumerate() {
        for b in spans[i + 1..].iter().take_while(|b| b.0 < a.1) {
            overlaps.push(Overlap {
                first:  a.2.to_owned(),
                second: b.2.to_owned(),
                bytes:  (a.1.min(b.1) - b.0) as u64,
            });
        }
    }

    let declared = index.declared_count();
    let count_mismatch = (declared as usize != index.entries.len())
        .then_some((declared, index.entries.len()));

    VerifyReport {
        entries,
        overlaps,
        dirty_gaps: dirty_gaps(archive, &spans),
        expected_size: BlockLayout::new(&index.entries).total_blocks() * BLOCK_SIZE,
        actual_size: archive.len(),
        count_mismatch,
        digest_hex: digest_hex(archive),
    }
}

// ── Comparison ────────────────────────────────────────────────────────────────

/// Bytes shown on each side of the first difference.
pub const CONTEXT_BYTES: usize = 16;

/// First offset at which two archives disagree.  A side is `None` when that
/// archive ends before `offset`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteDifference {
    pub offset:   usize,
    pub original: Option<u8>,
    pub new:      Option<u8>,
    /// Hex of up to [`CONTEXT_BYTES`] either side of `offset`.
    pub original_context: String,
    pub new_context:      String,
}

/// Index records at the same position that disagree; a side is `None` when
/// that table is shorter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryDiff {
    pub position: usize,
    pub original: Option<IndexEntry>,
    pub new:      Option<IndexEntry>,
}

#[derive(Debug)]
pub struct CompareReport {
    pub original_size:    usize,
    pub new_size:         usize,
    pub size_delta:       i64,
    pub original_digest:  String,
    pub new_digest:       String,
    pub first_difference: Option<ByteDifference>,
    /// Empty unless both index tables were supplied.
    pub entry_diffs:      Vec<EntryDiff>,
}

impl CompareReport {
    pub fn identical(&self) -> bool {
        self.original_digest == self.new_digest
    }

    pub fn summary(&self) -> String {
        let first = match &self.first_difference {
            Some(d) => format!("first difference at {:#010x}", d.offset),
            None => "no byte difference".to_owned(),
        };
        format!(
            "{} -> {} bytes ({:+}), {}, {} index entry difference(s)",
            self.original_size,
            self.new_size,
            self.size_delta,
            first,
            self.entry_diffs.len(),
        )
    }
}

/// Compare two archives and, when both are given, their index tables.
pub fn compare(
    original:       &[u8],
    new:            &[u8],
    original_index: Option<&IndexTable>,
    new_index:      Option<&IndexTable>,
) -> CompareReport {
    let first_difference = original.iter().zip(new)
        .position(|(a, b)| a != b)
        .or_else(|| (original.len() != new.len()).then(|| original.len().min(new.len())))
        .map(|offset| {
            let context = |data: &[u8]| {
                let start = offset.saturating_sub(CONTEXT_BYTES).min(data.len());
                let end = (offset + CONTEXT_BYTES).min(data.len());
                hex::encode(&data[start..end])
            };
            ByteDifference {
                offset,
                original: original.get(offset).copied(),
                new:      new.get(offset).copied(),
                original_context: context(original),
                new_context:      context(new),
            }
        });

    let entry_diffs = match (original_index, new_index) {
        (Some(a), Some(b)) => {
            let len = a.entries.len().max(b.entries.len());
            (0..len)
                .filter_map(|i| {
                    let (x, y) = (a.entries.get(i), b.entries.get(i));
                    (x != y).then(|| EntryDiff { position: i, original: x.cloned(), new: y.cloned() })
                })
                .collect()
        }
        _ => Vec::new(),
    };

    CompareReport {
        original_size: original.len(),
        new_size: new.len(),
        size_delta: new.len() as i64 - original.len() as i64,
        original_digest: digest_hex(original),
        new_digest: digest_hex(new),
        first_difference,
        entry_diffs,
    }
}

fn check_entry(entry: &IndexEntry, archive: &[u8]) -> EntryCheck {
    let offset = entry.byte_offset();
    let status = if entry.byte_end() > archive.len() as u64 {
        EntryStatus::OutOfRange { available: (archive.len() as u64).saturating_sub(offset) }
    } else {
        let mut hasher = Hasher::new();
        hasher.update(&archive[offset as usize..entry.byte_end() as usize]);
        EntryStatus::Ok { crc32: hasher.finalize() }
    };
    EntryCheck { entry: entry.clone(), offset, status }
}

/// Maximal runs of non-zero bytes not covered by any span.
fn dirty_gaps(archive: &[u8], sorted_spans: &[(usize, usize, &str)]) -> Vec<Range<usize>> {
    let mut gaps = Vec::new();
    let mut cursor = 0;
    let scan = |from: usize, to: usize, gaps: &mut Vec<Range<usize>>| {
        let mut i = from;
        while i < to {
            if archive[i] == 0 {
                i += 1;
                continue;
            }
            let start = i;
            while i < to && archive[i] != 0 {
                i += 1;
            }
            gaps.push(start..i);
        }
    };
    for &(start, end, _) in sorted_spans {
        if start > cursor {
            scan(cursor, start, &mut gaps);
        }
        cursor = cursor.max(end);
    }
    scan(cursor, archive.len(), &mut gaps);
    gaps
}
