//! Behaviour of a generation run as seen by a subscriber.

mod common;

use std::time::Duration;
use tokio::sync::mpsc::error::TryRecvError;

use common::{Event, TestEntry, collect, config, content, recording, unzip};
use zipstream::{
    GenerateError, GeneratorState, IterSource, MemoryEntry, ProtocolError, ZipGenerator,
};

fn numbered(count: usize, len: usize) -> Vec<(String, Vec<u8>)> {
    (0..count)
        .map(|i| (format!("file_{i:03}.txt"), content(i, len + i)))
        .collect()
}

fn source_of(files: &[(String, Vec<u8>)]) -> IterSource<std::vec::IntoIter<MemoryEntry>> {
    IterSource::new(
        files
            .iter()
            .map(|(path, data)| MemoryEntry::new(path.clone(), data.clone()))
            .collect::<Vec<_>>(),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_three_entries_round_trip_in_order() {
    let files = vec![
        ("file_000.txt".to_string(), b"alpha contents".to_vec()),
        ("file_001.txt".to_string(), b"bravo bravo bravo".to_vec()),
        ("file_002.txt".to_string(), content(2, 20_000)),
    ];
    let generator = ZipGenerator::new(source_of(&files), config(8092));
    let (subscription, rx) = recording();
    let controller = generator.subscribe(subscription).unwrap();

    let run = collect(rx).await;
    assert_eq!(run.completions, 1);
    assert!(run.errors.is_empty());
    assert_eq!(controller.state(), GeneratorState::Closed);
    assert_eq!(unzip(run.bytes()).await, files);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_entry_counts_round_trip() {
    for count in [1, 7, 64] {
        let files = numbered(count, 300);
        let generator = ZipGenerator::new(source_of(&files), config(1024));
        let (subscription, rx) = recording();
        generator.subscribe(subscription).unwrap();

        let run = collect(rx).await;
        assert_eq!(run.completions, 1, "count {count}");
        assert_eq!(unzip(run.bytes()).await, files, "count {count}");
    }
}

#[tokio::test]
async fn test_empty_source_yields_only_trailer() {
    let generator = ZipGenerator::new(source_of(&[]), config(8092));
    let (subscription, rx) = recording();
    generator.subscribe(subscription).unwrap();

    let run = collect(rx).await;
    assert_eq!(run.completions, 1);
    assert!(run.chunks.iter().all(|c| !c.is_empty()));

    let bytes = run.bytes();
    assert_eq!(bytes.len(), 22);
    assert_eq!(&bytes[0..4], b"PK\x05\x06");
    assert!(unzip(bytes).await.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_chunks_never_exceed_bridge_capacity() {
    let files = numbered(3, 256 * 1024);
    let generator = ZipGenerator::new(source_of(&files), config(512));
    let (subscription, rx) = recording();
    generator.subscribe(subscription).unwrap();

    let run = collect(rx).await;
    assert_eq!(run.completions, 1);
    assert!(run.chunks.iter().all(|c| !c.is_empty() && c.len() <= 512));
    assert_eq!(unzip(run.bytes()).await, files);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tiny_bridge_still_makes_progress() {
    let files = numbered(300, 40);
    let generator = ZipGenerator::new(source_of(&files), config(1));
    let (subscription, rx) = recording();
    generator.subscribe(subscription).unwrap();

    let run = collect(rx).await;
    assert_eq!(run.completions, 1);
    assert_eq!(unzip(run.bytes()).await, files);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pause_resume_preserves_bytes() {
    let files = numbered(40, 20_000);

    let generator = ZipGenerator::new(source_of(&files), config(128));
    let (subscription, rx) = recording();
    generator.subscribe(subscription).unwrap();
    let baseline = collect(rx).await.bytes();

    let generator = ZipGenerator::new(source_of(&files), config(128));
    let (subscription, mut rx) = recording();
    let controller = generator.subscribe(subscription).unwrap();

    let Some(Event::Chunk(first)) = rx.recv().await else {
        panic!("expected a chunk first");
    };
    controller.pause();
    controller.pause();
    assert_eq!(controller.state(), GeneratorState::Paused);

    // Everything delivered before pause() returned is already queued
    let mut before = first.to_vec();
    loop {
        match rx.try_recv() {
            Ok(Event::Chunk(chunk)) => before.extend_from_slice(&chunk),
            Ok(other) => panic!("unexpected event while pausing: {other:?}"),
            Err(_) => break,
        }
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

    controller.resume().unwrap();
    controller.resume().unwrap();
    assert_ne!(controller.state(), GeneratorState::Paused);

    let rest = collect(rx).await;
    assert_eq!(rest.completions, 1);
    before.extend_from_slice(&rest.bytes());
    assert_eq!(before, baseline);
}

#[tokio::test]
async fn test_resume_after_close_is_protocol_error() {
    let generator = ZipGenerator::new(source_of(&numbered(2, 10)), config(8092));
    let (subscription, rx) = recording();
    let controller = generator.subscribe(subscription).unwrap();
    collect(rx).await;

    assert_eq!(controller.state(), GeneratorState::Closed);
    assert_eq!(controller.resume(), Err(ProtocolError::ResumeAfterClose));
    controller.pause();
    controller.cancel();
    assert_eq!(controller.state(), GeneratorState::Closed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_second_subscribe_fails_without_disturbing_first() {
    let files = numbered(5, 1000);
    let generator = ZipGenerator::new(source_of(&files), config(1024));
    let (first, rx) = recording();
    generator.subscribe(first).unwrap();

    let (second, second_rx) = recording();
    assert_eq!(
        generator.subscribe(second).err(),
        Some(ProtocolError::AlreadySubscribed)
    );

    let run = collect(rx).await;
    assert_eq!(run.completions, 1);
    assert_eq!(unzip(run.bytes()).await, files);

    // The rejected subscription was dropped without ever being called
    assert!(collect(second_rx).await.chunks.is_empty());

    let (third, _rx) = recording();
    assert_eq!(
        generator.subscribe(third).err(),
        Some(ProtocolError::SubscribeAfterClose)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_open_failure_closes_with_single_error() {
    let entries = vec![
        TestEntry::data("file_000.txt", content(0, 5000)),
        TestEntry::data("file_001.txt", content(1, 5000)),
        TestEntry::FailOpen("file_002.txt".to_string()),
        TestEntry::data("file_003.txt", content(3, 5000)),
    ];
    let generator = ZipGenerator::new(IterSource::new(entries), config(1024));
    let (subscription, rx) = recording();
    let controller = generator.subscribe(subscription).unwrap();

    let run = collect(rx).await;
    assert_eq!(run.completions, 0);
    assert_eq!(run.errors.len(), 1);
    match &run.errors[0] {
        GenerateError::EntryOpen { path, source } => {
            assert_eq!(path, "file_002.txt");
            assert_eq!(source.kind(), std::io::ErrorKind::PermissionDenied);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(controller.state(), GeneratorState::Closed);
    assert_eq!(controller.resume(), Err(ProtocolError::ResumeAfterClose));
}

#[tokio::test]
async fn test_first_entry_open_failure_emits_nothing() {
    let generator = ZipGenerator::new(
        IterSource::new(vec![TestEntry::FailOpen("broken.txt".to_string())]),
        config(8092),
    );
    let (subscription, rx) = recording();
    generator.subscribe(subscription).unwrap();

    let run = collect(rx).await;
    assert!(run.chunks.is_empty());
    assert!(matches!(run.errors[..], [GenerateError::EntryOpen { .. }]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_read_failure_mid_entry() {
    let entries = vec![
        TestEntry::data("ok.txt", content(0, 100)),
        TestEntry::FailRead {
            path: "flaky.txt".to_string(),
            good: content(1, 3000),
        },
    ];
    let generator = ZipGenerator::new(IterSource::new(entries), config(1024));
    let (subscription, rx) = recording();
    generator.subscribe(subscription).unwrap();

    let run = collect(rx).await;
    assert_eq!(run.completions, 0);
    match &run.errors[..] {
        [GenerateError::EntryRead { path, .. }] => assert_eq!(path, "flaky.txt"),
        other => panic!("unexpected errors: {other:?}"),
    }
}

#[tokio::test]
async fn test_duplicate_path_is_compression_error() {
    let entries = vec![
        MemoryEntry::new("same.txt", "one"),
        MemoryEntry::new("same.txt", "two"),
    ];
    let generator = ZipGenerator::new(IterSource::new(entries), config(8092));
    let (subscription, rx) = recording();
    generator.subscribe(subscription).unwrap();

    let run = collect(rx).await;
    assert!(matches!(run.errors[..], [GenerateError::Compression(_)]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_stops_all_callbacks() {
    let files = numbered(50, 50_000);
    let generator = ZipGenerator::new(source_of(&files), config(128));
    let (subscription, mut rx) = recording();
    let controller = generator.subscribe(subscription).unwrap();

    assert!(matches!(rx.recv().await, Some(Event::Chunk(_))));
    controller.cancel();
    assert_eq!(controller.state(), GeneratorState::Closed);

    // Drain what was delivered before cancel() returned
    while let Ok(event) = rx.try_recv() {
        assert!(matches!(event, Event::Chunk(_)));
    }

    let run = collect(rx).await;
    assert!(run.chunks.is_empty());
    assert!(run.errors.is_empty());
    assert_eq!(run.completions, 0);
    assert_eq!(controller.resume(), Err(ProtocolError::ResumeAfterClose));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_while_paused() {
    let files = numbered(10, 10_000);
    let generator = ZipGenerator::new(source_of(&files), config(64));
    let (subscription, rx) = recording();
    let controller = generator.subscribe(subscription).unwrap();

    controller.pause();
    controller.cancel();
    controller.pause();
    assert_eq!(controller.state(), GeneratorState::Closed);

    let run = collect(rx).await;
    assert_eq!(run.completions, 0);
    assert!(run.errors.is_empty());
}
