pub mod block;
pub mod index;
pub mod archive;
pub mod charset;
pub mod scf;
pub mod translate;
pub mod verify;

pub use block::{BLOCK_SIZE, BlockLayout, block_offset};
pub use index::{IndexEntry, IndexError, IndexTable};
pub use archive::{Archive, ArchiveError, RepackOptions, UnpackOptions, repack, unpack};
pub use charset::Charset;
pub use scf::{ScfContainer, ScfError, TextSegment, extract_texts, parse, rebuild};
pub use translate::{Fit, TranslationTable};
pub use verify::{compare, CompareReport, VerifyReport, verify};
