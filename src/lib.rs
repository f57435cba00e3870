//! # zipstream
//!
//! Emit a ZIP archive as a byte stream while its entries are produced lazily
//! and asynchronously, without holding the archive, or any single entry, in
//! memory, and while honouring the consumer's backpressure.
//!
//! Entries come from an [`EntrySource`]. A [`ZipGenerator`] compresses them
//! on tokio's blocking pool into a bounded [`bridge`] buffer and flushes that
//! buffer to a [`Subscription`] in chunks. The consumer steers the run through
//! the returned [`Controller`] (`pause`, `resume`, `cancel`), or lets
//! [`ArchiveStream`] do it while exposing the chunks as a `Stream`.
//!
//! ## Features
//!
//! - Bounded memory: the bridge capacity caps buffered output
//! - Standard deflate ZIP stream with data descriptors, ZIP64 when needed
//! - Push-based subscription with pause/resume/cancel, or a pull-based stream
//! - Demo HTTP endpoint serving generated archives with chunked encoding
//! - Reader side for listing and verifying archives
//!
//! ## Example
//!
//! ```no_run
//! use futures_util::StreamExt;
//! use zipstream::{ArchiveStream, GeneratorConfig, IterSource, MemoryEntry, ZipGenerator};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let source = IterSource::new(vec![
//!         MemoryEntry::new("hello.txt", "hello"),
//!         MemoryEntry::new("world.txt", "world"),
//!     ]);
//!     let generator = ZipGenerator::new(source, GeneratorConfig::default());
//!
//!     let mut chunks = ArchiveStream::subscribe(&generator, 4)?;
//!     let mut archive = Vec::new();
//!     while let Some(chunk) = chunks.next().await {
//!         archive.extend_from_slice(&chunk?);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod bridge;
pub mod cli;
pub mod demo;
pub mod error;
pub mod generator;
pub mod io;
pub mod server;
pub mod source;
pub mod stream;
pub mod zip;

pub use cli::Cli;
pub use error::{GenerateError, ProtocolError};
pub use generator::{Controller, GeneratorConfig, GeneratorState, Subscription, ZipGenerator};
pub use io::{LocalFileReader, MemoryReader, ReadAt};
pub use source::{ArchiveEntry, EntryReader, EntrySource, IterSource, LocalFileEntry, MemoryEntry};
pub use stream::ArchiveStream;
pub use zip::{DosDateTime, ZipExtractor, ZipFileEntry, ZipStreamWriter};
