//! Main entry point for the zipstream CLI application.
//!
//! Serves generated archives over HTTP, packs local files through the
//! streaming generator, and lists the entries of existing archives.

use anyhow::{Context, Result};
use clap::Parser;
use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

use zipstream::cli::Command;
use zipstream::{
    ArchiveStream, Cli, GeneratorConfig, IterSource, LocalFileEntry, LocalFileReader,
    ZipExtractor, ZipGenerator,
};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve(args) => zipstream::server::run(args.into()).await,
        Command::Pack {
            output,
            files,
            chunk_size,
        } => pack(&output, files, chunk_size).await,
        Command::List { file, verbose } => list(&file, verbose).await,
    }
}

/// Stream `files` through the generator into `output`.
///
/// The archive is written chunk by chunk as the generator produces it; at
/// no point is a whole entry or the whole archive held in memory.
async fn pack(output: &Path, files: Vec<PathBuf>, chunk_size: usize) -> Result<()> {
    let source = IterSource::new(files.into_iter().map(LocalFileEntry::from_path));
    let generator = ZipGenerator::new(
        source,
        GeneratorConfig {
            chunk_size,
            ..GeneratorConfig::default()
        },
    );

    let mut file = tokio::fs::File::create(output)
        .await
        .with_context(|| format!("cannot create {}", output.display()))?;
    let mut chunks = ArchiveStream::subscribe(&generator, 4)?;

    let mut total = 0u64;
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk?;
        total += chunk.len() as u64;
        file.write_all(&chunk).await?;
    }
    file.flush().await?;

    println!("  created: {} ({})", output.display(), format_size(total));
    Ok(())
}

/// List entries of the archive at `path`.
///
/// - Simple format: just file names, one per line
/// - Verbose format (`-v`): size, compression ratio and timestamp table
async fn list(path: &Path, verbose: bool) -> Result<()> {
    let extractor = ZipExtractor::new(Arc::new(LocalFileReader::new(path)?));
    let entries = extractor.list_files().await?;

    if verbose {
        println!(
            "{:>10}  {:>10}  {:>5}  {:>10}  {:>5}  Name",
            "Length", "Size", "Cmpr", "Date", "Time"
        );
        println!("{}", "-".repeat(70));
    }

    let mut total_uncompressed = 0u64;
    let mut total_compressed = 0u64;
    let mut file_count = 0usize;

    for entry in &entries {
        if !verbose {
            println!("{}", entry.file_name);
            continue;
        }

        let (year, month, day) = entry.mod_date();
        let (hour, minute, _second) = entry.mod_time();
        println!(
            "{:>10}  {:>10}  {}  {:04}-{:02}-{:02}  {:02}:{:02}  {}",
            entry.uncompressed_size,
            entry.compressed_size,
            ratio(entry.compressed_size, entry.uncompressed_size),
            year,
            month,
            day,
            hour,
            minute,
            entry.file_name
        );

        if !entry.is_directory {
            total_uncompressed += entry.uncompressed_size;
            total_compressed += entry.compressed_size;
            file_count += 1;
        }
    }

    if verbose {
        println!("{}", "-".repeat(70));
        println!(
            "{:>10}  {:>10}  {}  {:>21}  {} files",
            total_uncompressed,
            total_compressed,
            ratio(total_compressed, total_uncompressed),
            "",
            file_count
        );
    }

    Ok(())
}

/// Space saved by compression, as a right-aligned percentage.
///
/// Deflate can expand tiny inputs, so the saving may be negative.
fn ratio(compressed: u64, uncompressed: u64) -> String {
    if uncompressed == 0 {
        return "  0%".to_string();
    }
    let saved = 100 - (compressed as i128 * 100 / uncompressed as i128);
    format!("{:>4}%", saved)
}

/// Format a byte size into a human-readable string.
///
/// ```ignore
/// assert_eq!(format_size(500), "500 bytes");
/// assert_eq!(format_size(1536), "1.50 KB");
/// ```
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}
