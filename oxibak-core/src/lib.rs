//! # OxiBak Core
//!
//! Core components for the OxiBak bucket backup tool.
//!
//! - [`crc`]: incremental CRC-32 for streamed ZIP entries
//! - [`error`]: the error taxonomy shared by the codec and the backends
//! - [`object`]: bucket objects, their metadata and the side-channel format
//! - [`traits`]: object reader/writer backends and the copy driver
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ CLI: list / cat / pack / unpack / verify                │
//! ├─────────────────────────────────────────────────────────┤
//! │ Backends: ObjectReader / ObjectWriter (this crate)      │
//! │     archive file, local directory                       │
//! ├─────────────────────────────────────────────────────────┤
//! │ Codec: streaming ZIP64 reader and writer                │
//! │     block cache, central directory, data descriptors    │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use oxibak_core::crc::Crc32;
//! use oxibak_core::object::{ObjectMetadata, meta_entry_name};
//!
//! let crc = Crc32::compute(b"Hello, World!");
//! assert_eq!(crc, 0xEC4AC3D0);
//!
//! let meta = ObjectMetadata::new("photos/cat.jpg");
//! assert_eq!(meta_entry_name(&meta.key), "_META/photos/cat.jpg.ser");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod crc;
pub mod error;
pub mod object;
pub mod traits;

// Re-exports for convenience
pub use crc::Crc32;
pub use error::{OxiBakError, Result};
pub use object::{Grant, Grantee, ObjectMetadata, Owner, StoredObject};
pub use traits::{ObjectReader, ObjectWriter, copy_objects};
