//! Streaming ZIP64 archive writer.
//!
//! Entries are written one at a time without knowing their length up front.
//! Each entry gets a local header with placeholder sizes and general purpose
//! bit 3 set; the real CRC-32 and 64-bit sizes follow the data in a data
//! descriptor. The central directory is kept in memory and written by
//! [`Zip64Writer::flush_index`], always in ZIP64 form.

use super::codec::RecordWriter;
use super::records::{
    CentralDirectoryRecord, DataDescriptor, DosDateTime, EXTERNAL_ATTR_ARCHIVE,
    EndOfCentralDirectory, FLAG_DATA_DESCRIPTOR, FLAG_UTF8, LocalFileHeader, METHOD_STORED,
    ZIP64_VERSION, Zip64EndOfCentralDirectory, Zip64Locator,
};
use super::stream::EntrySink;
use oxibak_core::crc::Crc32;
use oxibak_core::error::{OxiBakError, Result};
use std::io::{self, Write};

/// The entry currently being streamed.
#[derive(Debug)]
struct WriterEntryState {
    name: String,
    header_offset: u64,
    flags: u16,
    modified: DosDateTime,
    crc: Crc32,
    length: u64,
    /// Set when writing the entry's data failed; the entry is never recorded.
    failed: bool,
}

/// A finished entry waiting for the central directory.
#[derive(Debug, Clone)]
struct DirectoryRow {
    name: String,
    flags: u16,
    modified: DosDateTime,
    crc32: u32,
    size: u64,
    header_offset: u64,
}

impl DirectoryRow {
    fn to_record(&self) -> CentralDirectoryRecord {
        CentralDirectoryRecord {
            version_made_by: ZIP64_VERSION,
            version_needed: ZIP64_VERSION,
            flags: self.flags,
            method: METHOD_STORED,
            modified: self.modified,
            crc32: self.crc32,
            compressed_size: self.size,
            uncompressed_size: self.size,
            header_offset: self.header_offset,
            disk_start: 0,
            internal_attr: 0,
            external_attr: EXTERNAL_ATTR_ARCHIVE,
            name: self.name.as_bytes().to_vec(),
            extra: Vec::new(),
            comment: Vec::new(),
        }
    }
}

/// Streaming ZIP64 writer.
///
/// # Example
///
/// ```rust
/// use oxibak_archive::zip::Zip64Writer;
/// use std::io::Write;
///
/// let mut writer = Zip64Writer::new(Vec::new());
/// let mut sink = writer.begin_entry("hello.txt").unwrap();
/// sink.write_all(b"Hello, World!").unwrap();
/// sink.finish().unwrap();
/// let archive = writer.finish().unwrap();
/// assert_eq!(&archive[..4], b"PK\x03\x04");
/// ```
#[derive(Debug)]
pub struct Zip64Writer<W: Write> {
    writer: W,
    /// Bytes written so far; the offset of the next record.
    offset: u64,
    rows: Vec<DirectoryRow>,
    current: Option<WriterEntryState>,
    timestamp: Option<DosDateTime>,
    entries_written: usize,
}

impl<W: Write> Zip64Writer<W> {
    /// Create a writer positioned at the start of `writer`.
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            offset: 0,
            rows: Vec::new(),
            current: None,
            timestamp: None,
            entries_written: 0,
        }
    }

    /// Record `timestamp` for every entry instead of the current time.
    pub fn with_timestamp(mut self, timestamp: DosDateTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Whether an entry is open.
    pub fn is_streaming(&self) -> bool {
        self.current.is_some()
    }

    /// Bytes written to the open entry, if any.
    pub fn current_entry_len(&self) -> Option<u64> {
        self.current.as_ref().map(|state| state.length)
    }

    /// Number of entries ended so far.
    pub fn entry_count(&self) -> usize {
        self.entries_written
    }

    /// Total bytes written to the underlying sink.
    pub fn bytes_written(&self) -> u64 {
        self.offset
    }

    /// Write all of `bytes`, counting every byte the sink accepted even when
    /// a later write call fails.
    fn emit(&mut self, mut bytes: &[u8]) -> Result<()> {
        while !bytes.is_empty() {
            match self.writer.write(bytes) {
                Ok(0) => {
                    return Err(OxiBakError::write(io::Error::from(io::ErrorKind::WriteZero)));
                }
                Ok(n) => {
                    self.offset += n as u64;
                    bytes = &bytes[n..];
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(OxiBakError::write(e)),
            }
        }
        Ok(())
    }

    /// Open an entry and return a sink for its data.
    pub fn begin_entry(&mut self, name: &str) -> Result<EntrySink<'_, W>> {
        self.start_entry(name)?;
        Ok(EntrySink::new(self))
    }

    /// Open an entry: write its local header and start tracking CRC and length.
    ///
    /// Leading path separators are stripped from `name`.
    pub fn start_entry(&mut self, name: &str) -> Result<()> {
        if let Some(open) = &self.current {
            return Err(OxiBakError::concurrent_stream(open.name.clone(), name));
        }
        let name = name.trim_start_matches(['/', '\\']);
        if name.len() > u16::MAX as usize {
            return Err(OxiBakError::write(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("entry name of {} bytes exceeds 65535", name.len()),
            )));
        }

        let flags = if name.is_ascii() {
            FLAG_DATA_DESCRIPTOR
        } else {
            FLAG_DATA_DESCRIPTOR | FLAG_UTF8
        };
        let modified = self.timestamp.unwrap_or_else(DosDateTime::now);
        let header = LocalFileHeader::streaming(name, flags, modified);
        let mut out = RecordWriter::with_capacity(header.total_len() as usize);
        header.write_streaming_to(name, &mut out);

        let header_offset = self.offset;
        self.emit(out.as_bytes())?;
        log::trace!("begin entry {} at offset {}", name, header_offset);

        self.current = Some(WriterEntryState {
            name: name.to_string(),
            header_offset,
            flags,
            modified,
            crc: Crc32::new(),
            length: 0,
            failed: false,
        });
        Ok(())
    }

    /// Append data to the open entry.
    ///
    /// CRC and length only account for data the sink accepted. After a failed
    /// write the entry is poisoned: further writes fail and it will not be
    /// recorded in the central directory.
    pub fn write_data(&mut self, data: &[u8]) -> Result<usize> {
        let state = self.current.as_ref().ok_or(OxiBakError::NotStreaming)?;
        if state.failed {
            return Err(failed_entry(&state.name));
        }
        if let Err(e) = self.emit(data) {
            if let Some(state) = self.current.as_mut() {
                state.failed = true;
            }
            return Err(e);
        }
        if let Some(state) = self.current.as_mut() {
            state.crc.update(data);
            state.length += data.len() as u64;
        }
        Ok(data.len())
    }

    /// Close the open entry: write its data descriptor and queue its directory row.
    ///
    /// An entry whose data failed to write is discarded and reported as a
    /// write error.
    pub fn end_entry(&mut self) -> Result<()> {
        let state = self.current.take().ok_or(OxiBakError::NotStreaming)?;
        if state.failed {
            log::debug!("dropping entry {} after a failed write", state.name);
            return Err(failed_entry(&state.name));
        }
        let crc32 = self.write_descriptor(&state)?;
        log::trace!(
            "end entry {}: {} bytes, crc 0x{:08X}",
            state.name,
            state.length,
            crc32
        );

        self.rows.push(DirectoryRow {
            name: state.name,
            flags: state.flags,
            modified: state.modified,
            crc32,
            size: state.length,
            header_offset: state.header_offset,
        });
        self.entries_written += 1;
        Ok(())
    }

    /// Close the open entry without recording it in the central directory.
    ///
    /// Used when the entry's source fails midway. Its data descriptor is still
    /// written so the bytes on disk remain a well-formed local entry, but no
    /// reader will find it through the index.
    pub fn abort_entry(&mut self) -> Result<()> {
        let state = self.current.take().ok_or(OxiBakError::NotStreaming)?;
        if !state.failed {
            self.write_descriptor(&state)?;
        }
        log::debug!("aborted entry {} after {} bytes", state.name, state.length);
        Ok(())
    }

    fn write_descriptor(&mut self, state: &WriterEntryState) -> Result<u32> {
        let descriptor = DataDescriptor {
            crc32: state.crc.value(),
            compressed_size: state.length,
            uncompressed_size: state.length,
        };
        let mut out = RecordWriter::with_capacity(DataDescriptor::SIZE);
        descriptor.write_to(&mut out);
        self.emit(out.as_bytes())?;
        Ok(descriptor.crc32)
    }

    /// Write the central directory and the end of archive records.
    ///
    /// Every queued row is written with a ZIP64 extra block, followed by the
    /// ZIP64 end of central directory record, its locator, and a classic end
    /// record whose counts, size and offset are all sentinels. The queue is
    /// emptied, so a later flush describes only entries ended after this one.
    pub fn flush_index(&mut self) -> Result<()> {
        if let Some(open) = &self.current {
            return Err(OxiBakError::concurrent_stream(
                open.name.clone(),
                "<central directory>",
            ));
        }

        let cd_offset = self.offset;
        let mut out = RecordWriter::new();
        for row in &self.rows {
            row.to_record().write_zip64_to(&mut out);
        }
        let cd_size = out.len() as u64;
        let eocd64_offset = cd_offset + cd_size;

        Zip64EndOfCentralDirectory::new(self.rows.len() as u64, cd_size, cd_offset).write_to(&mut out);
        Zip64Locator::new(eocd64_offset).write_to(&mut out);
        EndOfCentralDirectory::zip64_sentinel().write_to(&mut out);
        self.emit(out.as_bytes())?;
        log::debug!(
            "central directory: {} entries, {} bytes at {}",
            self.rows.len(),
            cd_size,
            cd_offset
        );

        self.rows.clear();
        self.flush()
    }

    /// Flush the underlying sink.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush().map_err(OxiBakError::write)
    }

    /// Flush the index and return the underlying sink.
    pub fn finish(mut self) -> Result<W> {
        self.flush_index()?;
        Ok(self.writer)
    }

    /// Return the underlying sink without writing the index.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

fn failed_entry(name: &str) -> OxiBakError {
    OxiBakError::write(io::Error::other(format!(
        "entry {} is not recorded after a failed write",
        name
    )))
}
