//! Helpers shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use std::io::{self, Read};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use zipstream::{
    ArchiveEntry, DosDateTime, EntryReader, GenerateError, GeneratorConfig, MemoryEntry,
    MemoryReader, Subscription, ZipExtractor,
};

/// Fixed timestamp so two runs over the same entries emit identical bytes
pub fn config(chunk_size: usize) -> GeneratorConfig {
    GeneratorConfig {
        chunk_size,
        modified: DosDateTime::EPOCH,
    }
}

/// Deterministic, moderately compressible content
pub fn content(seed: usize, len: usize) -> Vec<u8> {
    (0..len)
        .map(|j| (((j * 31 + seed * 7) % 251) as u8) ^ ((j / 97) as u8))
        .collect()
}

pub enum TestEntry {
    Data(MemoryEntry),
    FailOpen(String),
    FailRead { path: String, good: Vec<u8> },
}

impl TestEntry {
    pub fn data(path: &str, contents: Vec<u8>) -> Self {
        TestEntry::Data(MemoryEntry::new(path, contents))
    }
}

#[async_trait]
impl ArchiveEntry for TestEntry {
    fn path(&self) -> &str {
        match self {
            TestEntry::Data(entry) => entry.path(),
            TestEntry::FailOpen(path) => path.as_str(),
            TestEntry::FailRead { path, .. } => path.as_str(),
        }
    }

    async fn open(self) -> io::Result<EntryReader> {
        match self {
            TestEntry::Data(entry) => entry.open().await,
            TestEntry::FailOpen(_) => Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "render failed",
            )),
            TestEntry::FailRead { good, .. } => Ok(Box::new(FailingReader { good, pos: 0 })),
        }
    }
}

/// Yields `good`, then fails
struct FailingReader {
    good: Vec<u8>,
    pos: usize,
}

impl Read for FailingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.good.len() {
            return Err(io::Error::other("disk on fire"));
        }
        let n = buf.len().min(self.good.len() - self.pos);
        buf[..n].copy_from_slice(&self.good[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

#[derive(Debug)]
pub enum Event {
    Chunk(Bytes),
    Error(GenerateError),
    Complete,
}

/// Subscription forwarding every callback into a channel
pub fn recording() -> (Subscription, mpsc::UnboundedReceiver<Event>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let chunk_tx = tx.clone();
    let error_tx = tx.clone();
    let subscription = Subscription::new(
        move |chunk| {
            let _ = chunk_tx.send(Event::Chunk(chunk));
        },
        move |err| {
            let _ = error_tx.send(Event::Error(err));
        },
        move || {
            let _ = tx.send(Event::Complete);
        },
    );
    (subscription, rx)
}

#[derive(Debug, Default)]
pub struct Run {
    pub chunks: Vec<Bytes>,
    pub errors: Vec<GenerateError>,
    pub completions: usize,
}

impl Run {
    pub fn bytes(&self) -> Vec<u8> {
        self.chunks.iter().flat_map(|c| c.iter().copied()).collect()
    }
}

/// Collect events until the generator drops its subscription.
///
/// The channel only closes once the driver is gone, so anything recorded
/// after a terminal event would show up here too.
pub async fn collect(mut rx: mpsc::UnboundedReceiver<Event>) -> Run {
    let mut run = Run::default();
    tokio::time::timeout(Duration::from_secs(30), async {
        while let Some(event) = rx.recv().await {
            assert!(
                run.errors.is_empty() && run.completions == 0,
                "event after terminal callback: {event:?}"
            );
            match event {
                Event::Chunk(chunk) => run.chunks.push(chunk),
                Event::Error(err) => run.errors.push(err),
                Event::Complete => run.completions += 1,
            }
        }
    })
    .await
    .expect("generation did not finish in time");
    run
}

/// Decode an archive into (path, contents) pairs in archive order
pub async fn unzip(archive: Vec<u8>) -> Vec<(String, Vec<u8>)> {
    let extractor = ZipExtractor::new(Arc::new(MemoryReader::new(archive)));
    let mut out = Vec::new();
    for entry in extractor.list_files().await.unwrap() {
        let data = extractor.extract_to_memory(&entry).await.unwrap();
        out.push((entry.file_name, data));
    }
    out
}
