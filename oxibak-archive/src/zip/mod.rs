//! Streaming ZIP64 archive support.
//!
//! This module provides random-access reading and forward-only streaming
//! writing of ZIP64 archives following the PKWARE APPNOTE. Entries are
//! always stored (method 0); sizes are deferred to data descriptors on write
//! and every central directory record carries a ZIP64 extra block.

mod cache;
pub mod codec;
mod index;
mod reader;
pub mod records;
mod stream;
mod writer;

pub use cache::{BlockCache, SEGMENT_SIZE};
pub use index::{ArchiveEntryLocation, ArchiveIndex, IndexEntry};
pub use reader::{EOCD_SEARCH_WINDOW, Zip64Reader};
pub use records::DosDateTime;
pub use stream::{EntrySink, EntryStream};
pub use writer::Zip64Writer;

use oxibak_core::error::Result;
use std::io::{Read, Seek, Write};

/// Open a ZIP64 archive for reading.
pub fn read_zip<R: Read + Seek>(reader: R) -> Result<Zip64Reader<R>> {
    Zip64Reader::new(reader)
}

/// Create a new streaming ZIP64 archive writer.
pub fn write_zip<W: Write>(writer: W) -> Zip64Writer<W> {
    Zip64Writer::new(writer)
}
