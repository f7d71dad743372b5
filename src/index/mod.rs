//! `.PFT` index table codec.
//!
//! # Layout
//!
//! ```text
//! [ header (16 B) ][ record (16 B) ] * N [ empty-name record | EOF ]
//!
//! record = name[8] (ASCII, NUL-padded) | block_index u32 LE | byte_size u32 LE
//! ```
//!
//! The header is opaque.  Only the entry count at `HEADER_COUNT_OFFSET` is
//! ever rewritten; every other header byte is carried through verbatim.

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Cursor, Write};
use std::path::Path;
use thiserror::Error;

use crate::block::block_offset;

pub const HEADER_SIZE: usize = 16;
pub const RECORD_SIZE: usize = 16;
pub const NAME_LEN:    usize = 8;
/// Byte offset of the little-endian `u32` entry count inside the header.
pub const HEADER_COUNT_OFFSET: usize = 4;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Index table truncated: {len} bytes, header needs {HEADER_SIZE}")]
    Truncated { len: usize },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// One unit of the archive: where it starts (in blocks) and how long it is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub name:        String,
    /// Block number, not a byte offset.
    pub block_index: u32,
    pub byte_size:   u32,
}

impl IndexEntry {
    pub fn new(name: impl Into<String>, block_index: u32, byte_size: u32) -> Self {
        Self { name: name.into(), block_index, byte_size }
    }

    /// Absolute byte position of this unit inside the archive.
    #[inline]
    pub fn byte_offset(&self) -> u64 {
        block_offset(self.block_index)
    }

    /// Exclusive end of this unit's byte span.
    #[inline]
    pub fn byte_end(&self) -> u64 {
        self.byte_offset() + self.byte_size as u64
    }

    fn read_record(record: &[u8]) -> io::Result<Self> {
        let name = decode_name(&record[..NAME_LEN]);
        let mut rdr = Cursor::new(&record[NAME_LEN..]);
        let block_index = rdr.read_u32::<LittleEndian>()?;
        let byte_size   = rdr.read_u32::<LittleEndian>()?;
        Ok(Self { name, block_index, byte_size })
    }

    fn write_record<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(&encode_name(&self.name))?;
        writer.write_u32::<LittleEndian>(self.block_index)?;
        writer.write_u32::<LittleEndian>(self.byte_size)?;
        Ok(())
    }
}

/// Parsed index table.  Entry order is the archive's canonical order and is
/// never re-sorted by anything in this crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexTable {
    pub header:  [u8; HEADER_SIZE],
    pub entries: Vec<IndexEntry>,
}

impl IndexTable {
    pub fn read(bytes: &[u8]) -> Result<Self, IndexError> {
        if bytes.len() < HEADER_SIZE {
            return Err(IndexError::Truncated { len: bytes.len() });
        }
        let mut header = [0u8; HEADER_SIZE];
        header.copy_from_slice(&bytes[..HEADER_SIZE]);

        let mut entries = Vec::new();
        for record in bytes[HEADER_SIZE..].chunks_exact(RECORD_SIZE) {
            let entry = IndexEntry::read_record(record)?;
            if entry.name.is_empty() {
                break;
            }
            entries.push(entry);
        }
        Ok(Self { header, entries })
    }

    /// Serialise `entries` behind `original_header`, patching only the count.
    pub fn write(entries: &[IndexEntry], original_header: &[u8; HEADER_SIZE]) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE + entries.len() * RECORD_SIZE);
        let mut header = *original_header;
        LittleEndian::write_u32(
            &mut header[HEADER_COUNT_OFFSET..HEADER_COUNT_OFFSET + 4],
            entries.len() as u32,
        );
        out.extend_from_slice(&header);
        for entry in entries {
            // Writing into a Vec cannot fail.
            let _ = entry.write_record(&mut out);
        }
        out
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        Self::write(&self.entries, &self.header)
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, IndexError> {
        Self::read(&std::fs::read(path)?)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), IndexError> {
        std::fs::write(path, self.to_bytes())?;
        Ok(())
    }

    /// Entry count as declared by the header (may disagree with `entries`).
    pub fn declared_count(&self) -> u32 {
        LittleEndian::read_u32(&self.header[HEADER_COUNT_OFFSET..HEADER_COUNT_OFFSET + 4])
    }

    pub fn find(&self, name: &str) -> Option<&IndexEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn max_block_index(&self) -> Option<u32> {
        self.entries.iter().map(|e| e.block_index).max()
    }
}

/// ASCII decode with non-ASCII bytes dropped and trailing NULs stripped.
fn decode_name(raw: &[u8]) -> String {
    let s: String = raw.iter().filter(|b| b.is_ascii()).map(|&b| b as char).collect();
    s.trim_end_matches('\0').to_owned()
}

/// NUL-pad to `NAME_LEN`, truncating longer names.
fn encode_name(name: &str) -> [u8; NAME_LEN] {
    let mut out = [0u8; NAME_LEN];
    let bytes = name.as_bytes();
    let n = bytes.len().min(NAME_LEN);
    out[..n].copy_from_slice(&bytes[..n]);
    out
}
