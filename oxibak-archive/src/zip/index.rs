//! The parsed central directory.

use super::records::{CentralDirectoryRecord, DosDateTime, FLAG_UTF8, METHOD_STORED};
use std::collections::HashMap;

/// Where an entry's data lives in the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveEntryLocation {
    /// Absolute offset of the first data byte.
    pub data_offset: u64,
    /// Number of data bytes.
    pub compressed_size: u64,
}

impl ArchiveEntryLocation {
    /// Offset one past the last data byte.
    pub fn end(&self) -> u64 {
        self.data_offset + self.compressed_size
    }
}

/// One central directory row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Decoded entry name.
    pub name: String,
    /// Offset of the local file header.
    pub header_offset: u64,
    /// Stored size.
    pub compressed_size: u64,
    /// Original size.
    pub uncompressed_size: u64,
    /// CRC-32 of the original data.
    pub crc32: u32,
    /// General purpose bit flag.
    pub flags: u16,
    /// Compression method.
    pub method: u16,
    /// Last modification time.
    pub modified: DosDateTime,
}

impl IndexEntry {
    /// Build a row from a parsed record and its decoded name.
    pub fn from_record(name: String, record: &CentralDirectoryRecord) -> Self {
        Self {
            name,
            header_offset: record.header_offset,
            compressed_size: record.compressed_size,
            uncompressed_size: record.uncompressed_size,
            crc32: record.crc32,
            flags: record.flags,
            method: record.method,
            modified: record.modified,
        }
    }

    /// Whether the entry is stored without compression.
    pub fn is_stored(&self) -> bool {
        self.method == METHOD_STORED
    }

    /// Whether the name was flagged as UTF-8.
    pub fn is_utf8(&self) -> bool {
        self.flags & FLAG_UTF8 != 0
    }

    /// Whether the entry names a directory.
    pub fn is_dir(&self) -> bool {
        self.name.ends_with('/')
    }
}

/// Ordered map from entry name to central directory row.
///
/// Names are unique. Inserting a name that is already present replaces its
/// row but keeps the position of the first occurrence.
#[derive(Debug, Clone, Default)]
pub struct ArchiveIndex {
    entries: Vec<IndexEntry>,
    positions: HashMap<String, usize>,
}

impl ArchiveIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a row; a duplicate name overwrites the earlier row.
    ///
    /// Returns `true` if the name was already present.
    pub fn insert(&mut self, entry: IndexEntry) -> bool {
        if let Some(&pos) = self.positions.get(&entry.name) {
            self.entries[pos] = entry;
            return true;
        }
        self.positions.insert(entry.name.clone(), self.entries.len());
        self.entries.push(entry);
        false
    }

    /// Row for `name`.
    pub fn get(&self, name: &str) -> Option<&IndexEntry> {
        self.positions.get(name).map(|&pos| &self.entries[pos])
    }

    /// Whether `name` is present.
    pub fn contains(&self, name: &str) -> bool {
        self.positions.contains_key(name)
    }

    /// Rows in index order.
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Names in index order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, header_offset: u64) -> IndexEntry {
        IndexEntry {
            name: name.to_string(),
            header_offset,
            compressed_size: 1,
            uncompressed_size: 1,
            crc32: 0,
            flags: 0,
            method: METHOD_STORED,
            modified: DosDateTime::EPOCH,
        }
    }

    #[test]
    fn test_insertion_order() {
        let mut index = ArchiveIndex::new();
        assert!(index.is_empty());
        index.insert(entry("b", 0));
        index.insert(entry("a", 10));
        index.insert(entry("c/d", 20));
        assert_eq!(index.names().collect::<Vec<_>>(), vec!["b", "a", "c/d"]);
        assert_eq!(index.get("a").map(|e| e.header_offset), Some(10));
        assert!(index.get("missing").is_none());
    }

    #[test]
    fn test_duplicate_last_wins() {
        let mut index = ArchiveIndex::new();
        assert!(!index.insert(entry("x", 0)));
        index.insert(entry("y", 5));
        assert!(index.insert(entry("x", 99)));
        assert_eq!(index.len(), 2);
        assert_eq!(index.get("x").map(|e| e.header_offset), Some(99));
        assert_eq!(index.names().collect::<Vec<_>>(), vec!["x", "y"]);
    }

    #[test]
    fn test_location_end() {
        let loc = ArchiveEntryLocation {
            data_offset: 100,
            compressed_size: 23,
        };
        assert_eq!(loc.end(), 123);
    }

    #[test]
    fn test_entry_flags() {
        let mut e = entry("dir/", 0);
        assert!(e.is_dir());
        assert!(e.is_stored());
        assert!(!e.is_utf8());
        e.flags = FLAG_UTF8;
        e.method = 8;
        assert!(e.is_utf8());
        assert!(!e.is_stored());
    }
}
