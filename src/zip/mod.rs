//! ZIP archive writing and reading.
//!
//! ## Architecture
//!
//! - [`structures`]: records shared by both directions (EOCD, ZIP64 records,
//!   header signatures, DOS timestamps)
//! - [`writer`]: incremental writer emitting a ZIP stream as entry bytes arrive
//! - [`parser`]: low-level decoding of the end records and central directory
//! - [`extractor`]: entry listing and CRC-checked extraction
//!
//! ## Stream layout
//!
//! The writer emits, for each entry in order:
//! 1. a Local File Header with zeroed CRC and sizes (bit 3 set)
//! 2. the raw deflate stream
//! 3. a Data Descriptor with the real CRC and sizes
//!
//! followed by the Central Directory and the End of Central Directory record.
//! ZIP64 end records are added only when a count, size or offset overflows.
//!
//! ## Limitations
//!
//! - Entries are always deflated at the default level
//! - No encryption, comments or multi-disk archives

mod extractor;
mod parser;
mod structures;
mod writer;

pub use extractor::ZipExtractor;
pub use parser::ZipParser;
pub use structures::*;
pub use writer::ZipStreamWriter;
