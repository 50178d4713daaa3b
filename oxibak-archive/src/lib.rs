//! # OxiBak Archive
//!
//! Streaming ZIP64 archive codec and object backends for OxiBak.
//!
//! - [`zip`]: random-access reader and forward-only streaming writer for
//!   stored ZIP64 archives
//! - [`backend`]: [`ObjectReader`](oxibak_core::ObjectReader) and
//!   [`ObjectWriter`](oxibak_core::ObjectWriter) implementations over an
//!   archive file and over a local directory
//!
//! ## Example
//!
//! ```rust
//! use oxibak_archive::zip::{Zip64Reader, Zip64Writer};
//! use std::io::{Cursor, Read, Seek, SeekFrom, Write};
//!
//! let mut writer = Zip64Writer::new(Vec::new());
//! let mut sink = writer.begin_entry("notes/today.txt").unwrap();
//! sink.write_all(b"streamed without knowing the length").unwrap();
//! sink.finish().unwrap();
//! let archive = writer.finish().unwrap();
//!
//! let reader = Zip64Reader::new(Cursor::new(archive)).unwrap();
//! let mut entry = reader.get_file_stream("notes/today.txt").unwrap();
//! entry.seek(SeekFrom::Start(9)).unwrap();
//! let mut rest = String::new();
//! entry.read_to_string(&mut rest).unwrap();
//! assert_eq!(rest, "without knowing the length");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod zip;

// Re-exports
pub use backend::{
    ArchiveObjectReader, ArchiveObjectWriter, DirectoryObjectReader, DirectoryObjectWriter,
};
pub use zip::{
    ArchiveEntryLocation, ArchiveIndex, DosDateTime, EntrySink, EntryStream, IndexEntry,
    Zip64Reader, Zip64Writer,
};
