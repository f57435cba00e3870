//! Incremental ZIP writer.
//!
//! Entries are deflated as their bytes arrive and pushed straight to the
//! underlying writer; nothing but the central directory bookkeeping is kept
//! in memory. Sizes and CRC are unknown when the local header goes out, so
//! every entry sets general purpose bit 3 and is followed by a data
//! descriptor, the layout produced by classic streaming ZIP writers.

use byteorder::{LittleEndian, WriteBytesExt};
use flate2::{Compress, Compression, Crc, FlushCompress, Status};
use std::collections::HashSet;
use std::io::{self, Write};

use super::structures::*;

const SCRATCH_SIZE: usize = 32 * 1024;

/// Streaming ZIP writer over any [`Write`] sink.
///
/// ```ignore
/// let mut zip = ZipStreamWriter::new(Vec::new(), DosDateTime::now());
/// zip.start_entry("hello.txt")?;
/// zip.write_all(b"hello")?;
/// let bytes = zip.finish()?;
/// ```
pub struct ZipStreamWriter<W: Write> {
    out: CountingWriter<W>,
    compress: Compress,
    scratch: Vec<u8>,
    modified: DosDateTime,
    names: HashSet<String>,
    records: Vec<CentralRecord>,
    current: Option<OpenEntry>,
}

struct OpenEntry {
    name: String,
    offset: u64,
    crc: Crc,
    size: u64,
}

struct CentralRecord {
    name: String,
    offset: u64,
    crc32: u32,
    compressed_size: u64,
    uncompressed_size: u64,
}

impl CentralRecord {
    fn needs_zip64(&self) -> bool {
        self.uncompressed_size >= ZIP64_MARKER_32 as u64
            || self.compressed_size >= ZIP64_MARKER_32 as u64
            || self.offset >= ZIP64_MARKER_32 as u64
    }
}

impl<W: Write> ZipStreamWriter<W> {
    /// Create a writer stamping every entry with `modified`
    pub fn new(inner: W, modified: DosDateTime) -> Self {
        Self {
            out: CountingWriter::new(inner),
            compress: Compress::new(Compression::default(), false),
            scratch: vec![0u8; SCRATCH_SIZE],
            modified,
            names: HashSet::new(),
            records: Vec::new(),
            current: None,
        }
    }

    /// Bytes emitted so far
    pub fn bytes_written(&self) -> u64 {
        self.out.count
    }

    /// Begin a new entry, finishing the previous one if still open.
    ///
    /// Fails with `InvalidInput` for a duplicate or over-long name.
    pub fn start_entry(&mut self, name: &str) -> io::Result<()> {
        self.finish_entry()?;

        let name_len = u16::try_from(name.len()).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, format!("entry name too long: {name}"))
        })?;
        if !self.names.insert(name.to_string()) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("duplicate entry: {name}"),
            ));
        }

        let offset = self.out.count;
        let mut header = Vec::with_capacity(LFH_SIZE + name.len());
        header.write_all(LFH_SIGNATURE)?;
        header.write_u16::<LittleEndian>(VERSION_DEFLATE)?;
        header.write_u16::<LittleEndian>(FLAG_DATA_DESCRIPTOR | FLAG_UTF8)?;
        header.write_u16::<LittleEndian>(CompressionMethod::Deflate.as_u16())?;
        header.write_u16::<LittleEndian>(self.modified.time)?;
        header.write_u16::<LittleEndian>(self.modified.date)?;
        // CRC and sizes are carried by the data descriptor
        header.write_u32::<LittleEndian>(0)?;
        header.write_u32::<LittleEndian>(0)?;
        header.write_u32::<LittleEndian>(0)?;
        header.write_u16::<LittleEndian>(name_len)?;
        header.write_u16::<LittleEndian>(0)?;
        header.write_all(name.as_bytes())?;
        self.out.write_all(&header)?;

        self.compress.reset();
        self.current = Some(OpenEntry {
            name: name.to_string(),
            offset,
            crc: Crc::new(),
            size: 0,
        });
        Ok(())
    }

    /// Flush the open entry's deflate stream and write its data descriptor.
    /// No-op when no entry is open.
    pub fn finish_entry(&mut self) -> io::Result<()> {
        let Some(entry) = self.current.take() else {
            return Ok(());
        };

        self.deflate(&[], FlushCompress::Finish)?;

        let record = CentralRecord {
            name: entry.name,
            offset: entry.offset,
            crc32: entry.crc.sum(),
            compressed_size: self.compress.total_out(),
            uncompressed_size: entry.size,
        };

        let mut descriptor = Vec::with_capacity(24);
        descriptor.write_all(DATA_DESCRIPTOR_SIGNATURE)?;
        descriptor.write_u32::<LittleEndian>(record.crc32)?;
        if record.compressed_size >= ZIP64_MARKER_32 as u64
            || record.uncompressed_size >= ZIP64_MARKER_32 as u64
        {
            descriptor.write_u64::<LittleEndian>(record.compressed_size)?;
            descriptor.write_u64::<LittleEndian>(record.uncompressed_size)?;
        } else {
            descriptor.write_u32::<LittleEndian>(record.compressed_size as u32)?;
            descriptor.write_u32::<LittleEndian>(record.uncompressed_size as u32)?;
        }
        self.out.write_all(&descriptor)?;

        self.records.push(record);
        Ok(())
    }

    /// Write the central directory and end records, returning the sink
    pub fn finish(mut self) -> io::Result<W> {
        self.finish_entry()?;

        let cd_offset = self.out.count;
        for record in &self.records {
            let header = central_header(record, self.modified)?;
            self.out.write_all(&header)?;
        }
        let cd_size = self.out.count - cd_offset;
        let entries = self.records.len() as u64;

        let mut tail = Vec::with_capacity(Zip64EOCD::MIN_SIZE + Zip64EOCDLocator::SIZE + EndOfCentralDirectory::SIZE);
        let eocd = EndOfCentralDirectory::new(entries, cd_size, cd_offset);
        if eocd.is_zip64() {
            let eocd64_offset = self.out.count;
            Zip64EOCD::new(entries, cd_size, cd_offset).write_to(&mut tail)?;
            Zip64EOCDLocator {
                disk_with_eocd64: 0,
                eocd64_offset,
                total_disks: 1,
            }
            .write_to(&mut tail)?;
        }
        eocd.write_to(&mut tail)?;
        self.out.write_all(&tail)?;
        self.out.flush()?;

        Ok(self.out.inner)
    }

    fn deflate(&mut self, mut input: &[u8], flush: FlushCompress) -> io::Result<()> {
        loop {
            let before_in = self.compress.total_in();
            let before_out = self.compress.total_out();
            let status = self
                .compress
                .compress(input, &mut self.scratch, flush)
                .map_err(io::Error::other)?;
            let consumed = (self.compress.total_in() - before_in) as usize;
            let produced = (self.compress.total_out() - before_out) as usize;

            input = &input[consumed..];
            if produced > 0 {
                self.out.write_all(&self.scratch[..produced])?;
            }

            let done = match flush {
                FlushCompress::Finish => status == Status::StreamEnd,
                _ => input.is_empty(),
            };
            if done {
                return Ok(());
            }
            if consumed == 0 && produced == 0 && status == Status::BufError {
                return Err(io::Error::other("deflate made no progress"));
            }
        }
    }
}

impl<W: Write> Write for ZipStreamWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let Some(entry) = self.current.as_mut() else {
            return Err(io::Error::other("no entry started"));
        };
        entry.crc.update(buf);
        entry.size += buf.len() as u64;
        self.deflate(buf, FlushCompress::None)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

fn central_header(record: &CentralRecord, modified: DosDateTime) -> io::Result<Vec<u8>> {
    let zip64 = record.needs_zip64();

    let mut extra = Vec::new();
    if zip64 {
        let mut fields = Vec::with_capacity(24);
        if record.uncompressed_size >= ZIP64_MARKER_32 as u64 {
            fields.write_u64::<LittleEndian>(record.uncompressed_size)?;
        }
        if record.compressed_size >= ZIP64_MARKER_32 as u64 {
            fields.write_u64::<LittleEndian>(record.compressed_size)?;
        }
        if record.offset >= ZIP64_MARKER_32 as u64 {
            fields.write_u64::<LittleEndian>(record.offset)?;
        }
        extra.write_u16::<LittleEndian>(ZIP64_EXTRA_ID)?;
        extra.write_u16::<LittleEndian>(fields.len() as u16)?;
        extra.extend_from_slice(&fields);
    }
    let version = if zip64 { VERSION_ZIP64 } else { VERSION_DEFLATE };

    let mut header = Vec::with_capacity(CDFH_MIN_SIZE + record.name.len() + extra.len());
    header.write_all(CDFH_SIGNATURE)?;
    header.write_u16::<LittleEndian>(version)?;
    header.write_u16::<LittleEndian>(version)?;
    header.write_u16::<LittleEndian>(FLAG_DATA_DESCRIPTOR | FLAG_UTF8)?;
    header.write_u16::<LittleEndian>(CompressionMethod::Deflate.as_u16())?;
    header.write_u16::<LittleEndian>(modified.time)?;
    header.write_u16::<LittleEndian>(modified.date)?;
    header.write_u32::<LittleEndian>(record.crc32)?;
    header.write_u32::<LittleEndian>(narrow(record.compressed_size))?;
    header.write_u32::<LittleEndian>(narrow(record.uncompressed_size))?;
    header.write_u16::<LittleEndian>(record.name.len() as u16)?;
    header.write_u16::<LittleEndian>(extra.len() as u16)?;
    header.write_u16::<LittleEndian>(0)?; // comment
    header.write_u16::<LittleEndian>(0)?; // disk number start
    header.write_u16::<LittleEndian>(0)?; // internal attributes
    header.write_u32::<LittleEndian>(0)?; // external attributes
    header.write_u32::<LittleEndian>(narrow(record.offset))?;
    header.write_all(record.name.as_bytes())?;
    header.write_all(&extra)?;
    Ok(header)
}

struct CountingWriter<W> {
    inner: W,
    count: u64,
}

impl<W: Write> CountingWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, count: 0 }
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
