//! Pull-based consumption through `ArchiveStream`.

mod common;

use futures_util::StreamExt;
use std::time::Duration;

use common::{TestEntry, config, content, unzip};
use zipstream::{
    ArchiveStream, GenerateError, GeneratorState, IterSource, MemoryEntry, ProtocolError,
    ZipGenerator,
};

fn entries(count: usize, len: usize) -> Vec<MemoryEntry> {
    (0..count)
        .map(|i| MemoryEntry::new(format!("file_{i:03}.txt"), content(i, len)))
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_slow_consumer_receives_whole_archive() {
    let generator = ZipGenerator::new(IterSource::new(entries(8, 20_000)), config(512));
    let mut chunks = ArchiveStream::subscribe(&generator, 1).unwrap();

    let mut archive = Vec::new();
    let mut paused_seen = false;
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.unwrap();
        assert!(chunk.len() <= 512);
        archive.extend_from_slice(&chunk);
        tokio::time::sleep(Duration::from_millis(1)).await;
        paused_seen |= chunks.controller().state() == GeneratorState::Paused;
    }
    assert!(paused_seen, "generator never waited for the consumer");
    assert_eq!(chunks.controller().state(), GeneratorState::Closed);

    let files = unzip(archive).await;
    assert_eq!(files.len(), 8);
    for (i, (path, data)) in files.iter().enumerate() {
        assert_eq!(path, &format!("file_{i:03}.txt"));
        assert_eq!(data, &content(i, 20_000));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_idle_consumer_bounds_queued_chunks() {
    let generator = ZipGenerator::new(IterSource::new(entries(40, 50_000)), config(256));
    let mut chunks = ArchiveStream::subscribe(&generator, 4).unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(chunks.controller().state(), GeneratorState::Paused);

    let mut total = 0;
    while let Some(chunk) = chunks.next().await {
        total += chunk.unwrap().len();
    }
    assert!(total > 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_drop_cancels_generation() {
    let generator = ZipGenerator::new(IterSource::new(entries(40, 50_000)), config(256));
    let mut chunks = ArchiveStream::subscribe(&generator, 2).unwrap();
    let controller = chunks.controller().clone();

    assert!(chunks.next().await.unwrap().is_ok());
    drop(chunks);

    assert_eq!(controller.state(), GeneratorState::Closed);
    assert_eq!(generator.state(), GeneratorState::Closed);
    assert_eq!(controller.resume(), Err(ProtocolError::ResumeAfterClose));
}

#[tokio::test]
async fn test_error_is_last_item() {
    let source = IterSource::new(vec![
        TestEntry::data("good.txt", content(0, 100)),
        TestEntry::FailOpen("bad.txt".to_string()),
    ]);
    let generator = ZipGenerator::new(source, config(8092));
    let mut chunks = ArchiveStream::subscribe(&generator, 4).unwrap();

    let mut error = None;
    while let Some(item) = chunks.next().await {
        if let Err(err) = item {
            error = Some(err);
            break;
        }
    }
    match error {
        Some(GenerateError::EntryOpen { path, .. }) => assert_eq!(path, "bad.txt"),
        other => panic!("expected open failure, got {other:?}"),
    }
    assert!(chunks.next().await.is_none());
}

#[tokio::test]
async fn test_subscribe_twice_is_rejected() {
    let generator = ZipGenerator::new(IterSource::new(entries(1, 10)), config(8092));
    let _first = ArchiveStream::subscribe(&generator, 4).unwrap();
    assert!(matches!(
        ArchiveStream::subscribe(&generator, 4),
        Err(ProtocolError::AlreadySubscribed)
    ));
}
