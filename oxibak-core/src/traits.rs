//! Backend traits for reading and writing bucket objects.
//!
//! An archive file and a bucket (or a local directory standing in for one)
//! are interchangeable as sources and targets: each implements
//! [`ObjectReader`] and/or [`ObjectWriter`], and [`copy_objects`] moves
//! objects between any pair of them.

use crate::error::Result;
use crate::object::StoredObject;

/// A source of objects, addressed by index.
pub trait ObjectReader {
    /// Prepare the reader. Must be called before any other method.
    fn init(&mut self) -> Result<()>;

    /// Number of objects available.
    fn count(&self) -> Result<usize>;

    /// Key of the object at `index`.
    fn key_at(&self, index: usize) -> Result<&str>;

    /// Read the object at `index`. The body streams from the source.
    fn read(&mut self, index: usize) -> Result<StoredObject<'_>>;

    /// Release the source.
    fn close(&mut self) -> Result<()>;
}

/// A target for objects.
pub trait ObjectWriter {
    /// Prepare the writer. Must be called before any other method.
    fn init(&mut self) -> Result<()>;

    /// Write one object, consuming its body.
    fn write(&mut self, object: StoredObject<'_>) -> Result<()>;

    /// Finish and release the target.
    fn close(&mut self) -> Result<()>;
}

/// Copy every object of an initialized `reader` into an initialized `writer`.
///
/// `on_object` is called with each key after it was written. Returns the
/// number of objects copied. Neither side is closed.
pub fn copy_objects<R, W, F>(reader: &mut R, writer: &mut W, mut on_object: F) -> Result<usize>
where
    R: ObjectReader + ?Sized,
    W: ObjectWriter + ?Sized,
    F: FnMut(&str),
{
    let count = reader.count()?;
    for index in 0..count {
        let object = reader.read(index)?;
        let key = object.key().to_string();
        writer.write(object)?;
        log::debug!("copied object {}/{}: {}", index + 1, count, key);
        on_object(&key);
    }
    Ok(count)
}
