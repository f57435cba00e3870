//! Lazily produced archive entries.
//!
//! An [`EntrySource`] hands out entries one at a time, in archive order. The
//! generator only asks for the next entry after the previous one has been
//! read to the end, so at most one entry's content is open at any moment.
//! Opening is asynchronous; the returned content is a blocking [`Read`] that
//! the generator drains on the blocking pool.

use async_trait::async_trait;
use bytes::Bytes;
use std::io::{self, Cursor, Read};
use std::iter::Peekable;
use std::path::PathBuf;

/// Content of an opened entry. Dropping it closes the underlying stream.
pub type EntryReader = Box<dyn Read + Send>;

/// One file inside the generated archive
#[async_trait]
pub trait ArchiveEntry: Send + 'static {
    /// Archive-relative path, expected to be unique within one archive
    fn path(&self) -> &str;

    /// Produce the entry's content
    async fn open(self) -> io::Result<EntryReader>;
}

/// Ordered, finite producer of archive entries
pub trait EntrySource: Send + 'static {
    type Entry: ArchiveEntry;

    fn has_next(&mut self) -> bool;

    /// Next entry in order; `None` once the source is exhausted
    fn next_entry(&mut self) -> Option<Self::Entry>;
}

/// Adapts any iterator of entries into an [`EntrySource`]
pub struct IterSource<I: Iterator> {
    iter: Peekable<I>,
}

impl<I: Iterator> IterSource<I> {
    pub fn new(entries: impl IntoIterator<IntoIter = I>) -> Self {
        Self {
            iter: entries.into_iter().peekable(),
        }
    }
}

impl<I> EntrySource for IterSource<I>
where
    I: Iterator + Send + 'static,
    I::Item: ArchiveEntry,
{
    type Entry = I::Item;

    fn has_next(&mut self) -> bool {
        self.iter.peek().is_some()
    }

    fn next_entry(&mut self) -> Option<Self::Entry> {
        self.iter.next()
    }
}

/// Entry whose content is already in memory
#[derive(Debug, Clone)]
pub struct MemoryEntry {
    path: String,
    contents: Bytes,
}

impl MemoryEntry {
    pub fn new(path: impl Into<String>, contents: impl Into<Bytes>) -> Self {
        Self {
            path: path.into(),
            contents: contents.into(),
        }
    }
}

#[async_trait]
impl ArchiveEntry for MemoryEntry {
    fn path(&self) -> &str {
        &self.path
    }

    async fn open(self) -> io::Result<EntryReader> {
        Ok(Box::new(Cursor::new(self.contents)))
    }
}

/// Entry backed by a file on the local filesystem
#[derive(Debug, Clone)]
pub struct LocalFileEntry {
    path: String,
    source: PathBuf,
}

impl LocalFileEntry {
    pub fn new(path: impl Into<String>, source: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            source: source.into(),
        }
    }

    /// Entry named after the file's own name, without directories
    pub fn from_path(source: impl Into<PathBuf>) -> Self {
        let source = source.into();
        let path = source
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| source.to_string_lossy().into_owned());
        Self { path, source }
    }
}

#[async_trait]
impl ArchiveEntry for LocalFileEntry {
    fn path(&self) -> &str {
        &self.path
    }

    async fn open(self) -> io::Result<EntryReader> {
        let file = tokio::fs::File::open(&self.source).await?;
        Ok(Box::new(file.into_std().await))
    }
}
