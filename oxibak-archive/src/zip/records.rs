//! ZIP64 record layouts.
//!
//! Each record knows its fixed size, how to parse itself from a
//! [`RecordReader`] and how to append itself to a [`RecordWriter`]. Parsing
//! takes the absolute archive offset of the record so corruption errors can
//! point at the right place in the file.

use super::codec::{RecordReader, RecordWriter};
use oxibak_core::error::{OxiBakError, Result};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// ZIP local file header signature.
pub const LOCAL_FILE_HEADER_SIG: u32 = 0x04034B50;

/// ZIP central directory header signature.
pub const CENTRAL_DIR_HEADER_SIG: u32 = 0x02014B50;

/// Data descriptor signature (PK\x07\x08).
pub const DATA_DESCRIPTOR_SIG: u32 = 0x08074B50;

/// ZIP end of central directory signature.
pub const END_OF_CENTRAL_DIR_SIG: u32 = 0x06054B50;

/// ZIP64 end of central directory signature.
pub const ZIP64_END_OF_CENTRAL_DIR_SIG: u32 = 0x06064B50;

/// ZIP64 end of central directory locator signature.
pub const ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIG: u32 = 0x07064B50;

/// ZIP64 extra field header ID.
pub const ZIP64_EXTRA_FIELD_ID: u16 = 0x0001;

/// Marker value for Zip64 (0xFFFFFFFF for 32-bit fields).
pub const ZIP64_MARKER_32: u32 = 0xFFFF_FFFF;

/// Marker value for Zip64 (0xFFFF for 16-bit fields).
pub const ZIP64_MARKER_16: u16 = 0xFFFF;

/// Version 4.5: ZIP64 format extensions.
pub const ZIP64_VERSION: u16 = 45;

/// Flag bit for data descriptor presence.
pub const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;

/// Flag bit for UTF-8 encoded names.
pub const FLAG_UTF8: u16 = 0x0800;

/// Flag bit for an encrypted central directory.
pub const FLAG_ENCRYPTED_DIRECTORY: u16 = 0x2000;

/// Compression method "stored".
pub const METHOD_STORED: u16 = 0;

/// External attributes written for every entry (MS-DOS archive bit).
pub const EXTERNAL_ATTR_ARCHIVE: u32 = 0x20;

fn expect_signature(reader: &mut RecordReader<'_>, expected: u32, at: u64, what: &str) -> Result<()> {
    let found = reader.u32()?;
    if found != expected {
        return Err(OxiBakError::corrupt(
            at,
            format!("bad {what} signature 0x{found:08X}, expected 0x{expected:08X}"),
        ));
    }
    Ok(())
}

/// MS-DOS date and time as stored in ZIP headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DosDateTime {
    /// Packed time: hour << 11 | minute << 5 | second / 2.
    pub time: u16,
    /// Packed date: (year - 1980) << 9 | month << 5 | day.
    pub date: u16,
}

impl DosDateTime {
    /// 1980-01-01 00:00:00, the earliest representable instant.
    pub const EPOCH: Self = Self {
        time: 0,
        date: (1 << 5) | 1,
    };

    /// Pack calendar fields. Years outside 1980..=2107 are clamped.
    pub fn from_parts(year: u32, month: u32, day: u32, hour: u32, minute: u32, second: u32) -> Self {
        if year < 1980 {
            return Self::EPOCH;
        }
        if year > 2107 {
            return Self::from_parts(2107, 12, 31, 23, 59, 58);
        }
        Self {
            time: ((hour << 11) | (minute << 5) | (second / 2)) as u16,
            date: (((year - 1980) << 9) | (month << 5) | day) as u16,
        }
    }

    /// Convert a system time, interpreted as UTC.
    pub fn from_system_time(time: SystemTime) -> Self {
        let secs = match time.duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_secs(),
            Err(_) => return Self::EPOCH,
        };
        let (year, month, day) = civil_from_days((secs / 86_400) as i64);
        let rem = (secs % 86_400) as u32;
        let year = u32::try_from(year).unwrap_or(u32::MAX);
        Self::from_parts(year, month, day, rem / 3600, (rem % 3600) / 60, rem % 60)
    }

    /// The current time.
    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }

    /// Calendar year.
    pub fn year(&self) -> u32 {
        (self.date >> 9) as u32 + 1980
    }

    /// Month, 1-12.
    pub fn month(&self) -> u32 {
        ((self.date >> 5) & 0x0F) as u32
    }

    /// Day of month, 1-31.
    pub fn day(&self) -> u32 {
        (self.date & 0x1F) as u32
    }

    /// Hour, 0-23.
    pub fn hour(&self) -> u32 {
        (self.time >> 11) as u32
    }

    /// Minute, 0-59.
    pub fn minute(&self) -> u32 {
        ((self.time >> 5) & 0x3F) as u32
    }

    /// Second, always even.
    pub fn second(&self) -> u32 {
        (self.time & 0x1F) as u32 * 2
    }
}

impl fmt::Display for DosDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year(),
            self.month(),
            self.day(),
            self.hour(),
            self.minute(),
            self.second()
        )
    }
}

// Days since 1970-01-01 to (year, month, day) in the proleptic Gregorian calendar.
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

/// Classic end of central directory record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndOfCentralDirectory {
    /// Number of this disk.
    pub disk: u16,
    /// Disk where the central directory starts.
    pub cd_start_disk: u16,
    /// Central directory records on this disk.
    pub entries_on_disk: u16,
    /// Total central directory records.
    pub entries_total: u16,
    /// Size of the central directory.
    pub cd_size: u32,
    /// Offset of the central directory.
    pub cd_offset: u32,
    /// Archive comment.
    pub comment: Vec<u8>,
}

impl EndOfCentralDirectory {
    /// Fixed part of the record, without the comment.
    pub const SIZE: usize = 22;

    /// Record that defers every count, size and offset to the ZIP64 structures.
    pub fn zip64_sentinel() -> Self {
        Self {
            disk: 0,
            cd_start_disk: 0,
            entries_on_disk: ZIP64_MARKER_16,
            entries_total: ZIP64_MARKER_16,
            cd_size: ZIP64_MARKER_32,
            cd_offset: ZIP64_MARKER_32,
            comment: Vec::new(),
        }
    }

    /// Parse the record located at archive offset `at`.
    pub fn parse(reader: &mut RecordReader<'_>, at: u64) -> Result<Self> {
        reader.require(Self::SIZE)?;
        expect_signature(reader, END_OF_CENTRAL_DIR_SIG, at, "end of central directory")?;
        let disk = reader.u16()?;
        let cd_start_disk = reader.u16()?;
        let entries_on_disk = reader.u16()?;
        let entries_total = reader.u16()?;
        let cd_size = reader.u32()?;
        let cd_offset = reader.u32()?;
        let comment_len = reader.u16()? as usize;
        let comment = reader.bytes(comment_len)?.to_vec();
        Ok(Self {
            disk,
            cd_start_disk,
            entries_on_disk,
            entries_total,
            cd_size,
            cd_offset,
            comment,
        })
    }

    /// Whether any field carries an overflow sentinel.
    pub fn needs_zip64(&self) -> bool {
        self.entries_on_disk == ZIP64_MARKER_16
            || self.entries_total == ZIP64_MARKER_16
            || self.cd_size == ZIP64_MARKER_32
            || self.cd_offset == ZIP64_MARKER_32
    }

    /// Encoded length including the comment.
    pub fn encoded_len(&self) -> usize {
        Self::SIZE + self.comment.len()
    }

    /// Append the record.
    pub fn write_to(&self, out: &mut RecordWriter) {
        out.u32(END_OF_CENTRAL_DIR_SIG)
            .u16(self.disk)
            .u16(self.cd_start_disk)
            .u16(self.entries_on_disk)
            .u16(self.entries_total)
            .u32(self.cd_size)
            .u32(self.cd_offset)
            .u16(self.comment.len() as u16)
            .bytes(&self.comment);
    }
}

/// ZIP64 end of central directory record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zip64EndOfCentralDirectory {
    /// Size of the remaining record (total size - 12).
    pub record_size: u64,
    /// Version made by.
    pub version_made_by: u16,
    /// Version needed to extract.
    pub version_needed: u16,
    /// Number of this disk.
    pub disk: u32,
    /// Disk where the central directory starts.
    pub cd_start_disk: u32,
    /// Central directory records on this disk.
    pub entries_on_disk: u64,
    /// Total central directory records.
    pub entries_total: u64,
    /// Size of the central directory.
    pub cd_size: u64,
    /// Offset of the central directory.
    pub cd_offset: u64,
}

impl Zip64EndOfCentralDirectory {
    /// Fixed size of the record.
    pub const SIZE: usize = 56;

    /// Record for a single-disk archive.
    pub fn new(entries: u64, cd_size: u64, cd_offset: u64) -> Self {
        Self {
            record_size: (Self::SIZE - 12) as u64,
            version_made_by: ZIP64_VERSION,
            version_needed: ZIP64_VERSION,
            disk: 0,
            cd_start_disk: 0,
            entries_on_disk: entries,
            entries_total: entries,
            cd_size,
            cd_offset,
        }
    }

    /// Parse the record located at archive offset `at`.
    pub fn parse(reader: &mut RecordReader<'_>, at: u64) -> Result<Self> {
        reader.require(Self::SIZE)?;
        expect_signature(reader, ZIP64_END_OF_CENTRAL_DIR_SIG, at, "ZIP64 end of central directory")?;
        Ok(Self {
            record_size: reader.u64()?,
            version_made_by: reader.u16()?,
            version_needed: reader.u16()?,
            disk: reader.u32()?,
            cd_start_disk: reader.u32()?,
            entries_on_disk: reader.u64()?,
            entries_total: reader.u64()?,
            cd_size: reader.u64()?,
            cd_offset: reader.u64()?,
        })
    }

    /// Append the record.
    pub fn write_to(&self, out: &mut RecordWriter) {
        out.u32(ZIP64_END_OF_CENTRAL_DIR_SIG)
            .u64(self.record_size)
            .u16(self.version_made_by)
            .u16(self.version_needed)
            .u32(self.disk)
            .u32(self.cd_start_disk)
            .u64(self.entries_on_disk)
            .u64(self.entries_total)
            .u64(self.cd_size)
            .u64(self.cd_offset);
    }
}

/// ZIP64 end of central directory locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zip64Locator {
    /// Disk holding the ZIP64 end of central directory record.
    pub eocd_disk: u32,
    /// Absolute offset of the ZIP64 end of central directory record.
    pub eocd_offset: u64,
    /// Total number of disks.
    pub total_disks: u32,
}

impl Zip64Locator {
    /// Fixed size of the record.
    pub const SIZE: usize = 20;

    /// Locator for a single-disk archive.
    pub fn new(eocd_offset: u64) -> Self {
        Self {
            eocd_disk: 0,
            eocd_offset,
            total_disks: 1,
        }
    }

    /// Parse the record located at archive offset `at`.
    pub fn parse(reader: &mut RecordReader<'_>, at: u64) -> Result<Self> {
        reader.require(Self::SIZE)?;
        expect_signature(reader, ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIG, at, "ZIP64 locator")?;
        Ok(Self {
            eocd_disk: reader.u32()?,
            eocd_offset: reader.u64()?,
            total_disks: reader.u32()?,
        })
    }

    /// Append the record.
    pub fn write_to(&self, out: &mut RecordWriter) {
        out.u32(ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIG)
            .u32(self.eocd_disk)
            .u64(self.eocd_offset)
            .u32(self.total_disks);
    }
}

/// Fixed part of a local file header.
///
/// The name and extra field follow; only their lengths are kept here since
/// the reader uses the header to find where entry data starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFileHeader {
    /// Minimum version needed to extract.
    pub version_needed: u16,
    /// General purpose bit flag.
    pub flags: u16,
    /// Compression method.
    pub method: u16,
    /// Last modification time and date.
    pub modified: DosDateTime,
    /// CRC-32, zero when a data descriptor follows.
    pub crc32: u32,
    /// Compressed size or sentinel.
    pub compressed_size: u32,
    /// Uncompressed size or sentinel.
    pub uncompressed_size: u32,
    /// Length of the file name.
    pub name_len: u16,
    /// Length of the extra field.
    pub extra_len: u16,
}

impl LocalFileHeader {
    /// Fixed size of the header.
    pub const SIZE: usize = 30;

    /// Length of the ZIP64 placeholder extra block written by streaming headers.
    ///
    /// APPNOTE 4.5.3 allows only the two size slots in a local header ZIP64
    /// block (offset and disk number belong to the central directory), so the
    /// placeholder is tag, length 16 and two zeroed 8-byte slots. Readers take
    /// the data start from `extra_len`, never from the block contents.
    pub const STREAMING_EXTRA_LEN: u16 = 4 + 16;

    /// Header for an entry whose sizes and CRC are deferred to a data descriptor.
    pub fn streaming(name: &str, flags: u16, modified: DosDateTime) -> Self {
        Self {
            version_needed: ZIP64_VERSION,
            flags,
            method: METHOD_STORED,
            modified,
            crc32: 0,
            compressed_size: ZIP64_MARKER_32,
            uncompressed_size: ZIP64_MARKER_32,
            name_len: name.len() as u16,
            extra_len: Self::STREAMING_EXTRA_LEN,
        }
    }

    /// Parse the fixed part of a header located at archive offset `at`.
    pub fn parse(reader: &mut RecordReader<'_>, at: u64) -> Result<Self> {
        reader.require(Self::SIZE)?;
        expect_signature(reader, LOCAL_FILE_HEADER_SIG, at, "local file header")?;
        Ok(Self {
            version_needed: reader.u16()?,
            flags: reader.u16()?,
            method: reader.u16()?,
            modified: DosDateTime {
                time: reader.u16()?,
                date: reader.u16()?,
            },
            crc32: reader.u32()?,
            compressed_size: reader.u32()?,
            uncompressed_size: reader.u32()?,
            name_len: reader.u16()?,
            extra_len: reader.u16()?,
        })
    }

    /// Total header length including name and extra field.
    pub fn total_len(&self) -> u64 {
        Self::SIZE as u64 + u64::from(self.name_len) + u64::from(self.extra_len)
    }

    /// Append a streaming header followed by `name` and a zeroed ZIP64 extra block.
    ///
    /// The placeholder reserves the uncompressed and compressed size slots;
    /// the real values go to the data descriptor and the central directory.
    pub fn write_streaming_to(&self, name: &str, out: &mut RecordWriter) {
        out.u32(LOCAL_FILE_HEADER_SIG)
            .u16(self.version_needed)
            .u16(self.flags)
            .u16(self.method)
            .u16(self.modified.time)
            .u16(self.modified.date)
            .u32(self.crc32)
            .u32(self.compressed_size)
            .u32(self.uncompressed_size)
            .u16(self.name_len)
            .u16(self.extra_len)
            .bytes(name.as_bytes())
            .u16(ZIP64_EXTRA_FIELD_ID)
            .u16(16)
            .u64(0)
            .u64(0);
    }
}

/// ZIP64 data descriptor: CRC and 64-bit sizes written after entry data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataDescriptor {
    /// CRC-32 of the entry data.
    pub crc32: u32,
    /// Compressed size.
    pub compressed_size: u64,
    /// Uncompressed size.
    pub uncompressed_size: u64,
}

impl DataDescriptor {
    /// Size of a ZIP64 descriptor including its signature.
    pub const SIZE: usize = 24;

    /// Parse a descriptor located at archive offset `at`.
    pub fn parse(reader: &mut RecordReader<'_>, at: u64) -> Result<Self> {
        reader.require(Self::SIZE)?;
        expect_signature(reader, DATA_DESCRIPTOR_SIG, at, "data descriptor")?;
        Ok(Self {
            crc32: reader.u32()?,
            compressed_size: reader.u64()?,
            uncompressed_size: reader.u64()?,
        })
    }

    /// Append the descriptor. Sizes are split into low/high halves here.
    pub fn write_to(&self, out: &mut RecordWriter) {
        out.u32(DATA_DESCRIPTOR_SIG)
            .u32(self.crc32)
            .u64(self.compressed_size)
            .u64(self.uncompressed_size);
    }
}

/// Central directory file header with ZIP64 overrides already applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CentralDirectoryRecord {
    /// Version made by.
    pub version_made_by: u16,
    /// Minimum version needed to extract.
    pub version_needed: u16,
    /// General purpose bit flag.
    pub flags: u16,
    /// Compression method.
    pub method: u16,
    /// Last modification time and date.
    pub modified: DosDateTime,
    /// CRC-32 of the entry data.
    pub crc32: u32,
    /// Compressed size.
    pub compressed_size: u64,
    /// Uncompressed size.
    pub uncompressed_size: u64,
    /// Offset of the local file header.
    pub header_offset: u64,
    /// Disk where the entry starts.
    pub disk_start: u16,
    /// Internal file attributes.
    pub internal_attr: u16,
    /// External file attributes.
    pub external_attr: u32,
    /// Raw file name bytes.
    pub name: Vec<u8>,
    /// Raw extra field.
    pub extra: Vec<u8>,
    /// Raw file comment.
    pub comment: Vec<u8>,
}

impl CentralDirectoryRecord {
    /// Fixed part of the record.
    pub const SIZE: usize = 46;

    /// Length of the ZIP64 extra block written for every entry.
    pub const ZIP64_EXTRA_LEN: u16 = 4 + 24;

    /// Parse a record located at archive offset `at`, resolving ZIP64 overrides.
    pub fn parse(reader: &mut RecordReader<'_>, at: u64) -> Result<Self> {
        reader.require(Self::SIZE)?;
        expect_signature(reader, CENTRAL_DIR_HEADER_SIG, at, "central directory")?;
        let version_made_by = reader.u16()?;
        let version_needed = reader.u16()?;
        let flags = reader.u16()?;
        let method = reader.u16()?;
        let modified = DosDateTime {
            time: reader.u16()?,
            date: reader.u16()?,
        };
        let crc32 = reader.u32()?;
        let compressed_size = reader.u32()?;
        let uncompressed_size = reader.u32()?;
        let name_len = reader.u16()? as usize;
        let extra_len = reader.u16()? as usize;
        let comment_len = reader.u16()? as usize;
        let disk_start = reader.u16()?;
        let internal_attr = reader.u16()?;
        let external_attr = reader.u32()?;
        let header_offset = reader.u32()?;
        let name = reader.bytes(name_len)?.to_vec();
        let extra = reader.bytes(extra_len)?.to_vec();
        let comment = reader.bytes(comment_len)?.to_vec();

        let mut record = Self {
            version_made_by,
            version_needed,
            flags,
            method,
            modified,
            crc32,
            compressed_size: u64::from(compressed_size),
            uncompressed_size: u64::from(uncompressed_size),
            header_offset: u64::from(header_offset),
            disk_start,
            internal_attr,
            external_attr,
            name,
            extra,
            comment,
        };

        let overrides = [
            uncompressed_size == ZIP64_MARKER_32,
            compressed_size == ZIP64_MARKER_32,
            header_offset == ZIP64_MARKER_32,
        ];
        if overrides.iter().any(|&b| b) {
            record.apply_zip64_extra(overrides, at)?;
        }
        Ok(record)
    }

    // Values in the ZIP64 block appear in fixed order, but only for the
    // fields whose 32-bit slot holds the sentinel.
    fn apply_zip64_extra(&mut self, overrides: [bool; 3], at: u64) -> Result<()> {
        let block = find_extra_block(&self.extra, ZIP64_EXTRA_FIELD_ID)
            .ok_or_else(|| OxiBakError::corrupt(at, "size or offset sentinel without ZIP64 extra field"))?;
        let mut values = RecordReader::new(block);
        let missing = |_| OxiBakError::corrupt(at, "ZIP64 extra field too short");
        if overrides[0] {
            self.uncompressed_size = values.u64().map_err(missing)?;
        }
        if overrides[1] {
            self.compressed_size = values.u64().map_err(missing)?;
        }
        if overrides[2] {
            self.header_offset = values.u64().map_err(missing)?;
        }
        Ok(())
    }

    /// Whether the entry's data is followed by a data descriptor.
    pub fn has_data_descriptor(&self) -> bool {
        self.flags & FLAG_DATA_DESCRIPTOR != 0
    }

    /// Append the record with every size and the offset in a ZIP64 extra block.
    ///
    /// The 32-bit slots always hold the sentinel, whatever the values. Any
    /// other extra data in `self.extra` is not written.
    pub fn write_zip64_to(&self, out: &mut RecordWriter) {
        out.u32(CENTRAL_DIR_HEADER_SIG)
            .u16(self.version_made_by)
            .u16(self.version_needed)
            .u16(self.flags)
            .u16(self.method)
            .u16(self.modified.time)
            .u16(self.modified.date)
            .u32(self.crc32)
            .u32(ZIP64_MARKER_32)
            .u32(ZIP64_MARKER_32)
            .u16(self.name.len() as u16)
            .u16(Self::ZIP64_EXTRA_LEN)
            .u16(self.comment.len() as u16)
            .u16(self.disk_start)
            .u16(self.internal_attr)
            .u32(self.external_attr)
            .u32(ZIP64_MARKER_32)
            .bytes(&self.name)
            .u16(ZIP64_EXTRA_FIELD_ID)
            .u16(24)
            .u64(self.uncompressed_size)
            .u64(self.compressed_size)
            .u64(self.header_offset)
            .bytes(&self.comment);
    }
}

/// Find the payload of the extra block with `id`.
///
/// A malformed trailing block ends the search.
pub fn find_extra_block(extra: &[u8], id: u16) -> Option<&[u8]> {
    let mut reader = RecordReader::new(extra);
    while reader.remaining() >= 4 {
        let header_id = reader.u16().ok()?;
        let size = reader.u16().ok()? as usize;
        let data = reader.bytes(size).ok()?;
        if header_id == id {
            return Some(data);
        }
    }
    None
}
