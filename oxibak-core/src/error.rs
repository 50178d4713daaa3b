//! Error types for OxiBak operations.
//!
//! A single error enum covers the ZIP64 codec (corrupt archives, block reads,
//! writer protocol violations) and the object backends built on top of it.

use std::io;
use thiserror::Error;

/// The main error type for OxiBak operations.
#[derive(Debug, Error)]
pub enum OxiBakError {
    /// I/O error outside of block servicing (opening, creating, flushing files).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Structural violation in an archive. Never retried.
    #[error("Corrupt archive at offset {offset}: {message}")]
    ArchiveCorrupt {
        /// Byte offset where the violation was detected.
        offset: u64,
        /// Description of the violation.
        message: String,
    },

    /// A fixed-layout record would extend past the available bytes.
    #[error("Truncated record at offset {offset}: need {needed} bytes, have {available}")]
    TruncatedRecord {
        /// Offset of the record within the buffer being decoded.
        offset: usize,
        /// Number of bytes the record needs.
        needed: usize,
        /// Number of bytes available from `offset`.
        available: usize,
    },

    /// Seeking or reading the underlying source failed while servicing a block.
    #[error("Failed to read block at offset {offset}: {source}")]
    BlockRead {
        /// Absolute offset of the block.
        offset: u64,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Writing to the underlying archive sink failed.
    #[error("Failed to write archive data: {source}")]
    Write {
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Requested entry is not in the archive index.
    #[error("Entry not found: {name}")]
    EntryNotFound {
        /// Name of the missing entry.
        name: String,
    },

    /// An entry was begun while another one is still open.
    #[error("Cannot begin entry {requested:?}: entry {open:?} is still being written")]
    ConcurrentStream {
        /// Entry that is currently open.
        open: String,
        /// Entry that was requested.
        requested: String,
    },

    /// Entry data was written or an entry was ended with no entry open.
    #[error("No archive entry is currently being written")]
    NotStreaming,

    /// Entry uses a compression method other than stored.
    #[error("Unsupported compression method {method} for entry {name}")]
    UnsupportedMethod {
        /// Entry name.
        name: String,
        /// ZIP compression method id.
        method: u16,
    },

    /// A backend was used before `init` was called.
    #[error("Backend used before init()")]
    NotInitialized,

    /// Object index outside of `0..count`.
    #[error("Object index {index} out of range (count {count})")]
    IndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Number of objects available.
        count: usize,
    },

    /// An object's body or metadata could not be read from a backend.
    #[error("Failed to read object {key}: {message}")]
    ObjectRead {
        /// Object key.
        key: String,
        /// What went wrong.
        message: String,
    },

    /// An object could not be written to a backend.
    #[error("Failed to write object {key}: {source}")]
    ObjectWrite {
        /// Object key.
        key: String,
        /// The failure that aborted the write.
        #[source]
        source: Box<OxiBakError>,
    },

    /// Object key would escape the backend root (e.g. "../" component).
    #[error("Path traversal detected in key: {key}")]
    PathTraversal {
        /// The offending key.
        key: String,
    },

    /// The metadata side-channel could not be encoded or decoded.
    #[error("Metadata error: {0}")]
    Metadata(#[from] serde_json::Error),
}

/// Result type alias for OxiBak operations.
pub type Result<T> = std::result::Result<T, OxiBakError>;

impl OxiBakError {
    /// Create an archive corruption error.
    pub fn corrupt(offset: u64, message: impl Into<String>) -> Self {
        Self::ArchiveCorrupt {
            offset,
            message: message.into(),
        }
    }

    /// Create a truncated record error.
    pub fn truncated(offset: usize, needed: usize, available: usize) -> Self {
        Self::TruncatedRecord {
            offset,
            needed,
            available,
        }
    }

    /// Create a block read error.
    pub fn block_read(offset: u64, source: io::Error) -> Self {
        Self::BlockRead { offset, source }
    }

    /// Create a write error.
    pub fn write(source: io::Error) -> Self {
        Self::Write { source }
    }

    /// Create an entry not found error.
    pub fn entry_not_found(name: impl Into<String>) -> Self {
        Self::EntryNotFound { name: name.into() }
    }

    /// Create a concurrent stream error.
    pub fn concurrent_stream(open: impl Into<String>, requested: impl Into<String>) -> Self {
        Self::ConcurrentStream {
            open: open.into(),
            requested: requested.into(),
        }
    }

    /// Create an object read error.
    pub fn object_read(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ObjectRead {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Wrap a failure as an object write error.
    pub fn object_write(key: impl Into<String>, source: OxiBakError) -> Self {
        Self::ObjectWrite {
            key: key.into(),
            source: Box::new(source),
        }
    }

    /// Create a path traversal error.
    pub fn path_traversal(key: impl Into<String>) -> Self {
        Self::PathTraversal { key: key.into() }
    }

    /// Whether this error marks the archive itself as permanently broken.
    pub fn is_corrupt(&self) -> bool {
        matches!(
            self,
            Self::ArchiveCorrupt { .. } | Self::TruncatedRecord { .. }
        )
    }

    /// Recover an `OxiBakError` that was carried through an `io::Error`.
    ///
    /// Stream adapters implement the std I/O traits, so codec failures reach
    /// callers wrapped in `io::Error`. This unwraps them again; any other I/O
    /// error becomes [`OxiBakError::Io`].
    pub fn from_io(err: io::Error) -> Self {
        if !err.get_ref().is_some_and(|inner| inner.is::<OxiBakError>()) {
            return Self::Io(err);
        }
        match err.into_inner().map(|inner| inner.downcast::<OxiBakError>()) {
            Some(Ok(own)) => *own,
            _ => Self::Io(io::Error::other("wrapped error could not be recovered")),
        }
    }
}

impl From<OxiBakError> for io::Error {
    fn from(err: OxiBakError) -> Self {
        match err {
            OxiBakError::Io(inner) => inner,
            other => io::Error::other(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = OxiBakError::corrupt(1024, "missing EOCDR signature");
        assert!(err.to_string().contains("offset 1024"));
        assert!(err.to_string().contains("missing EOCDR"));

        let err = OxiBakError::concurrent_stream("a.txt", "b.txt");
        assert!(err.to_string().contains("\"a.txt\""));

        let err = OxiBakError::truncated(10, 22, 4);
        assert!(err.to_string().contains("need 22"));
    }

    #[test]
    fn test_is_corrupt() {
        assert!(OxiBakError::corrupt(0, "x").is_corrupt());
        assert!(OxiBakError::truncated(0, 4, 0).is_corrupt());
        assert!(!OxiBakError::NotStreaming.is_corrupt());
        assert!(!OxiBakError::entry_not_found("x").is_corrupt());
    }

    #[test]
    fn test_io_round_trip() {
        let io_err: io::Error = OxiBakError::entry_not_found("missing.bin").into();
        let back = OxiBakError::from_io(io_err);
        assert!(matches!(back, OxiBakError::EntryNotFound { ref name } if name == "missing.bin"));

        let plain = io::Error::new(io::ErrorKind::NotFound, "file not found");
        assert!(matches!(OxiBakError::from_io(plain), OxiBakError::Io(_)));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: OxiBakError = io_err.into();
        assert!(matches!(err, OxiBakError::Io(_)));
    }
}
