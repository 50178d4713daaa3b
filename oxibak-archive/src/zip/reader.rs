//! Random-access ZIP64 archive reader.
//!
//! The index is built by walking backwards from the end of the file:
//! end of central directory record, then (when any of its fields carries an
//! overflow sentinel) the ZIP64 locator and ZIP64 end of central directory
//! record, then the central directory itself. Entry bodies are served through
//! [`EntryStream`]s that read via the shared block cache, so several streams
//! over the same archive can be open at once.

use super::cache::BlockCache;
use super::codec::{RecordReader, decode_cp437};
use super::index::{ArchiveEntryLocation, ArchiveIndex, IndexEntry};
use super::records::{
    CentralDirectoryRecord, EndOfCentralDirectory, FLAG_ENCRYPTED_DIRECTORY, FLAG_UTF8,
    LocalFileHeader, END_OF_CENTRAL_DIR_SIG, Zip64EndOfCentralDirectory, Zip64Locator,
};
use super::stream::EntryStream;
use oxibak_core::crc::Crc32;
use oxibak_core::error::{OxiBakError, Result};
use std::io::{Read, Seek};
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

/// How far before the end of the file the end of central directory record is
/// searched for. Covers the largest possible archive comment.
pub const EOCD_SEARCH_WINDOW: u64 = 65536;

/// Reader over a complete ZIP64 archive.
///
/// All methods take `&self`; the block cache sits behind a mutex and the
/// index is built at most once.
#[derive(Debug)]
pub struct Zip64Reader<R> {
    cache: Mutex<BlockCache<R>>,
    index: OnceLock<ArchiveIndex>,
}

/// Central directory bounds resolved from the trailer records.
struct DirectoryBounds {
    offset: u64,
    size: u64,
    /// Where the central directory has to end.
    end: u64,
    entries: u64,
}

impl<R: Read + Seek> Zip64Reader<R> {
    /// Wrap an archive source. Nothing is parsed until the index is needed.
    pub fn new(source: R) -> Result<Self> {
        Ok(Self {
            cache: Mutex::new(BlockCache::new(source)?),
            index: OnceLock::new(),
        })
    }

    fn cache(&self) -> MutexGuard<'_, BlockCache<R>> {
        // Cached blocks are immutable, so a panic elsewhere cannot leave them inconsistent.
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Length of the archive in bytes.
    pub fn archive_len(&self) -> u64 {
        self.cache().len()
    }

    /// Whether the index has been built.
    pub fn is_indexed(&self) -> bool {
        self.index.get().is_some()
    }

    /// Build the index if it is not built yet, and return it.
    pub fn read_index(&self) -> Result<&ArchiveIndex> {
        if let Some(index) = self.index.get() {
            return Ok(index);
        }
        let built = self.build_index()?;
        Ok(self.index.get_or_init(|| built))
    }

    fn build_index(&self) -> Result<ArchiveIndex> {
        let (eocd, eocd_pos) = self.find_end_of_central_directory()?;
        let bounds = if eocd.needs_zip64() {
            self.read_zip64_bounds(eocd_pos)?
        } else {
            if eocd.disk != 0 || eocd.cd_start_disk != 0 {
                return Err(OxiBakError::corrupt(eocd_pos, "multi-disk archives are not supported"));
            }
            DirectoryBounds {
                offset: u64::from(eocd.cd_offset),
                size: u64::from(eocd.cd_size),
                end: eocd_pos,
                entries: u64::from(eocd.entries_total),
            }
        };

        let cd_end = bounds.offset.checked_add(bounds.size);
        if cd_end != Some(bounds.end) {
            return Err(OxiBakError::corrupt(
                bounds.end,
                format!(
                    "central directory at {} with size {} does not end at {}",
                    bounds.offset, bounds.size, bounds.end
                ),
            ));
        }
        log::debug!(
            "central directory: {} bytes at {}, {} entries expected",
            bounds.size,
            bounds.offset,
            bounds.entries
        );

        let directory = self.cache().read_range(bounds.offset, bounds.size)?;
        let index = parse_central_directory(&directory, bounds.offset)?;
        if index.len() as u64 != bounds.entries {
            log::warn!(
                "central directory holds {} unique entries, trailer records {}",
                index.len(),
                bounds.entries
            );
        }
        Ok(index)
    }

    fn find_end_of_central_directory(&self) -> Result<(EndOfCentralDirectory, u64)> {
        let mut cache = self.cache();
        let file_len = cache.len();
        let start = file_len.saturating_sub(EOCD_SEARCH_WINDOW + EndOfCentralDirectory::SIZE as u64);
        let tail = cache.read_range(start, file_len - start)?;
        drop(cache);

        let sig = END_OF_CENTRAL_DIR_SIG.to_le_bytes();
        let found = tail
            .windows(4)
            .rposition(|w| w == sig)
            .ok_or_else(|| OxiBakError::corrupt(file_len, "end of central directory signature not found"))?;
        let eocd_pos = start + found as u64;

        let eocd = EndOfCentralDirectory::parse(&mut RecordReader::at(&tail, found), eocd_pos)?;
        if eocd.encoded_len() != tail.len() - found {
            return Err(OxiBakError::corrupt(
                eocd_pos,
                format!(
                    "{} bytes follow the end of central directory record, comment declares {}",
                    tail.len() - found - EndOfCentralDirectory::SIZE,
                    eocd.comment.len()
                ),
            ));
        }
        log::debug!("end of central directory record at {}", eocd_pos);
        Ok((eocd, eocd_pos))
    }

    fn read_zip64_bounds(&self, eocd_pos: u64) -> Result<DirectoryBounds> {
        let locator_pos = eocd_pos
            .checked_sub(Zip64Locator::SIZE as u64)
            .ok_or_else(|| OxiBakError::corrupt(eocd_pos, "no room for a ZIP64 locator"))?;
        let bytes = self.cache().read_range(locator_pos, Zip64Locator::SIZE as u64)?;
        let locator = Zip64Locator::parse(&mut RecordReader::new(&bytes), locator_pos)?;
        if locator.eocd_disk != 0 || locator.total_disks != 1 {
            return Err(OxiBakError::corrupt(
                locator_pos,
                format!(
                    "archive spans {} disks (ZIP64 record on disk {})",
                    locator.total_disks, locator.eocd_disk
                ),
            ));
        }

        let eocd64_pos = locator.eocd_offset;
        let fits = eocd64_pos
            .checked_add(Zip64EndOfCentralDirectory::SIZE as u64)
            .is_some_and(|end| end <= locator_pos);
        if !fits {
            return Err(OxiBakError::corrupt(
                locator_pos,
                format!("ZIP64 locator points past itself to {}", eocd64_pos),
            ));
        }
        let bytes = self
            .cache()
            .read_range(eocd64_pos, Zip64EndOfCentralDirectory::SIZE as u64)?;
        let eocd64 = Zip64EndOfCentralDirectory::parse(&mut RecordReader::new(&bytes), eocd64_pos)?;
        if eocd64.disk != 0 || eocd64.cd_start_disk != 0 {
            return Err(OxiBakError::corrupt(eocd64_pos, "multi-disk archives are not supported"));
        }
        log::debug!(
            "ZIP64 locator at {}, ZIP64 end of central directory at {}",
            locator_pos,
            eocd64_pos
        );

        Ok(DirectoryBounds {
            offset: eocd64.cd_offset,
            size: eocd64.cd_size,
            end: eocd64_pos,
            entries: eocd64.entries_total,
        })
    }

    /// Entry names in index order.
    pub fn get_entry_names(&self) -> Result<Vec<&str>> {
        Ok(self.read_index()?.names().collect())
    }

    /// Central directory rows in index order.
    pub fn entries(&self) -> Result<&[IndexEntry]> {
        Ok(self.read_index()?.entries())
    }

    /// Row for `name`.
    pub fn entry(&self, name: &str) -> Result<&IndexEntry> {
        self.read_index()?
            .get(name)
            .ok_or_else(|| OxiBakError::entry_not_found(name))
    }

    /// Resolve where the data of `name` starts by reading its local header.
    pub fn get_file_location(&self, name: &str) -> Result<ArchiveEntryLocation> {
        let entry = self.entry(name)?;
        self.locate(entry)
    }

    fn locate(&self, entry: &IndexEntry) -> Result<ArchiveEntryLocation> {
        let mut cache = self.cache();
        let bytes = cache.read_range(entry.header_offset, LocalFileHeader::SIZE as u64)?;
        let header = LocalFileHeader::parse(&mut RecordReader::new(&bytes), entry.header_offset)?;

        let location = entry
            .header_offset
            .checked_add(header.total_len())
            .and_then(|data_offset| {
                let end = data_offset.checked_add(entry.compressed_size)?;
                (end <= cache.len()).then_some(ArchiveEntryLocation {
                    data_offset,
                    compressed_size: entry.compressed_size,
                })
            })
            .ok_or_else(|| {
                OxiBakError::corrupt(
                    entry.header_offset,
                    format!("data of entry {} extends past end of file", entry.name),
                )
            })?;
        Ok(location)
    }

    /// Seekable stream over the data of `name`.
    pub fn get_file_stream(&self, name: &str) -> Result<EntryStream<'_, R>> {
        let entry = self.entry(name)?;
        if !entry.is_stored() {
            return Err(OxiBakError::UnsupportedMethod {
                name: entry.name.clone(),
                method: entry.method,
            });
        }
        let location = self.locate(entry)?;
        Ok(EntryStream::new(self, location))
    }

    /// Read the whole entry and check its CRC-32 against the central directory.
    ///
    /// Returns the number of bytes checked.
    pub fn verify_entry(&self, name: &str) -> Result<u64> {
        let entry = self.entry(name)?;
        let mut stream = self.get_file_stream(name)?;
        let mut crc = Crc32::new();
        let mut buf = vec![0u8; 64 * 1024];
        let mut total = 0u64;
        loop {
            let n = stream.read(&mut buf).map_err(OxiBakError::from_io)?;
            if n == 0 {
                break;
            }
            crc.update(&buf[..n]);
            total += n as u64;
        }
        let actual = crc.finalize();
        if actual != entry.crc32 {
            return Err(OxiBakError::corrupt(
                stream.location().data_offset,
                format!(
                    "CRC mismatch for {}: recorded 0x{:08X}, computed 0x{:08X}",
                    name, entry.crc32, actual
                ),
            ));
        }
        if total != entry.uncompressed_size {
            return Err(OxiBakError::corrupt(
                stream.location().data_offset,
                format!(
                    "size mismatch for {}: recorded {}, read {}",
                    name, entry.uncompressed_size, total
                ),
            ));
        }
        Ok(total)
    }

    /// Copy archive bytes at `offset` into `buf`; used by entry streams.
    pub(crate) fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        self.cache().read_at(offset, buf)
    }

    /// Close the reader and give back the source.
    pub fn into_inner(self) -> R {
        self.cache
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .into_inner()
    }
}

/// Walk a central directory that starts at archive offset `base`.
fn parse_central_directory(directory: &[u8], base: u64) -> Result<ArchiveIndex> {
    let mut index = ArchiveIndex::new();
    let mut reader = RecordReader::new(directory);
    while reader.remaining() > 0 {
        let at = base + reader.position() as u64;
        let record = CentralDirectoryRecord::parse(&mut reader, at).map_err(|e| match e {
            OxiBakError::TruncatedRecord { needed, available, .. } => OxiBakError::corrupt(
                at,
                format!(
                    "central directory record needs {} bytes, {} left",
                    needed, available
                ),
            ),
            other => other,
        })?;
        if record.flags & FLAG_ENCRYPTED_DIRECTORY != 0 {
            return Err(OxiBakError::corrupt(
                at,
                "central directory encryption is not supported",
            ));
        }
        let name = if record.flags & FLAG_UTF8 != 0 {
            String::from_utf8(record.name.clone())
                .map_err(|_| OxiBakError::corrupt(at, "entry name flagged UTF-8 is not valid UTF-8"))?
        } else {
            decode_cp437(&record.name)
        };
        if index.insert(IndexEntry::from_record(name, &record)) {
            log::debug!("duplicate entry name at {}; later record wins", at);
        }
    }
    Ok(index)
}
