//! Archives built from files on disk and read back from disk.

mod common;

use futures_util::StreamExt;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

use common::{config, content};
use zipstream::{
    ArchiveStream, GenerateError, IterSource, LocalFileEntry, LocalFileReader, ZipExtractor,
    ZipGenerator,
};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pack_local_files_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let mut inputs = Vec::new();
    for (i, len) in [0usize, 1, 70_000].into_iter().enumerate() {
        let path = dir.path().join(format!("input_{i}.bin"));
        std::fs::write(&path, content(i, len)).unwrap();
        inputs.push((path, content(i, len)));
    }

    let source = IterSource::new(
        inputs
            .iter()
            .map(|(path, _)| LocalFileEntry::from_path(path))
            .collect::<Vec<_>>(),
    );
    let generator = ZipGenerator::new(source, config(4096));

    let out = dir.path().join("out.zip");
    let mut file = tokio::fs::File::create(&out).await.unwrap();
    let mut chunks = ArchiveStream::subscribe(&generator, 2).unwrap();
    while let Some(chunk) = chunks.next().await {
        file.write_all(&chunk.unwrap()).await.unwrap();
    }
    file.flush().await.unwrap();
    drop(file);

    let extractor = ZipExtractor::new(Arc::new(LocalFileReader::new(&out).unwrap()));
    let entries = extractor.list_files().await.unwrap();
    assert_eq!(entries.len(), 3);
    for (entry, (path, data)) in entries.iter().zip(&inputs) {
        let expected_name = path.file_name().unwrap().to_string_lossy();
        assert_eq!(entry.file_name, expected_name);
        assert_eq!(entry.uncompressed_size, data.len() as u64);
        assert_eq!(&extractor.extract_to_memory(entry).await.unwrap(), data);
    }
}

#[tokio::test]
async fn test_missing_file_fails_open() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.txt");

    let source = IterSource::new(vec![LocalFileEntry::new("missing.txt", missing)]);
    let generator = ZipGenerator::new(source, config(4096));
    let mut chunks = ArchiveStream::subscribe(&generator, 2).unwrap();

    match chunks.next().await {
        Some(Err(GenerateError::EntryOpen { path, source })) => {
            assert_eq!(path, "missing.txt");
            assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
        }
        other => panic!("expected open failure, got {other:?}"),
    }
    assert!(chunks.next().await.is_none());
}
