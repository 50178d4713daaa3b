//! Object backends.
//!
//! - [`ArchiveObjectReader`] / [`ArchiveObjectWriter`]: objects stored in a
//!   ZIP64 archive as `_DATA/<key>` bodies with `_META/<key>.ser` metadata.
//! - [`DirectoryObjectReader`] / [`DirectoryObjectWriter`]: objects stored as
//!   plain files below a local directory, standing in for a remote bucket.

mod archive;
mod directory;

pub use archive::{ArchiveObjectReader, ArchiveObjectWriter};
pub use directory::{DirectoryObjectReader, DirectoryObjectWriter, validate_key};

/// Chunk size used when streaming object bodies.
pub const COPY_CHUNK_SIZE: usize = 1024 * 1024;
