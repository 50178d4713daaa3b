//! Objects stored in a ZIP64 archive file.

use super::COPY_CHUNK_SIZE;
use crate::zip::{Zip64Reader, Zip64Writer};
use oxibak_core::error::{OxiBakError, Result};
use oxibak_core::object::{
    ObjectMetadata, StoredObject, data_entry_name, key_from_data_entry, meta_entry_name,
};
use oxibak_core::traits::{ObjectReader, ObjectWriter};
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// Reads objects back out of an archive written by [`ArchiveObjectWriter`].
#[derive(Debug)]
pub struct ArchiveObjectReader {
    path: PathBuf,
    open: Option<OpenArchive>,
}

#[derive(Debug)]
struct OpenArchive {
    reader: Zip64Reader<File>,
    keys: Vec<String>,
}

impl ArchiveObjectReader {
    /// Reader for the archive at `path`; nothing is opened before `init`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            open: None,
        }
    }

    /// Path of the archive.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The underlying archive reader, once initialized.
    pub fn archive(&self) -> Result<&Zip64Reader<File>> {
        Ok(&self.opened()?.reader)
    }

    fn opened(&self) -> Result<&OpenArchive> {
        self.open.as_ref().ok_or(OxiBakError::NotInitialized)
    }
}

impl ObjectReader for ArchiveObjectReader {
    fn init(&mut self) -> Result<()> {
        let file = File::open(&self.path)?;
        let reader = Zip64Reader::new(file)?;
        let keys: Vec<String> = reader
            .get_entry_names()?
            .into_iter()
            .filter_map(key_from_data_entry)
            .map(str::to_string)
            .collect();
        log::info!("{}: {} objects", self.path.display(), keys.len());
        self.open = Some(OpenArchive { reader, keys });
        Ok(())
    }

    fn count(&self) -> Result<usize> {
        Ok(self.opened()?.keys.len())
    }

    fn key_at(&self, index: usize) -> Result<&str> {
        let keys = &self.opened()?.keys;
        keys.get(index)
            .map(String::as_str)
            .ok_or(OxiBakError::IndexOutOfRange {
                index,
                count: keys.len(),
            })
    }

    fn read(&mut self, index: usize) -> Result<StoredObject<'_>> {
        let key = self.key_at(index)?.to_string();
        let open = self.opened()?;

        let meta_name = meta_entry_name(&key);
        let mut meta_bytes = Vec::new();
        open.reader
            .get_file_stream(&meta_name)
            .map_err(|e| missing_entry(&key, &meta_name, e))?
            .read_to_end(&mut meta_bytes)
            .map_err(OxiBakError::from_io)?;
        let mut metadata = ObjectMetadata::from_side_channel(&meta_bytes)
            .map_err(|e| OxiBakError::object_read(&key, format!("bad metadata: {}", e)))?;
        // the entry name is authoritative, not the key stored inside the record
        metadata.key = key.clone();

        let data_name = data_entry_name(&key);
        let body = open
            .reader
            .get_file_stream(&data_name)
            .map_err(|e| missing_entry(&key, &data_name, e))?;
        Ok(StoredObject::new(metadata, body))
    }

    fn close(&mut self) -> Result<()> {
        self.open = None;
        Ok(())
    }
}

fn missing_entry(key: &str, entry: &str, err: OxiBakError) -> OxiBakError {
    match err {
        OxiBakError::EntryNotFound { .. } => {
            OxiBakError::object_read(key, format!("archive has no entry {}", entry))
        }
        other => other,
    }
}

/// Writes objects into a new archive.
#[derive(Debug)]
pub struct ArchiveObjectWriter {
    path: PathBuf,
    writer: Option<Zip64Writer<BufWriter<File>>>,
}

impl ArchiveObjectWriter {
    /// Writer for a new archive at `path`; nothing is created before `init`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            writer: None,
        }
    }

    /// Path of the archive.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn write_object<W: Write>(writer: &mut Zip64Writer<W>, mut object: StoredObject<'_>) -> Result<()> {
    let key = object.metadata.key.clone();
    let meta = object.metadata.to_side_channel()?;

    // A body that fails midway must not leave a finished _DATA entry behind.
    let mut sink = writer.begin_entry(&data_entry_name(&key))?;
    let mut buf = vec![0u8; COPY_CHUNK_SIZE];
    loop {
        let n = match object.body.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                sink.abort()?;
                return Err(OxiBakError::from_io(e));
            }
        };
        sink.write_all(&buf[..n]).map_err(OxiBakError::from_io)?;
    }
    sink.finish()?;

    let mut sink = writer.begin_entry(&meta_entry_name(&key))?;
    sink.write_all(&meta).map_err(OxiBakError::from_io)?;
    sink.finish()
}

impl ObjectWriter for ArchiveObjectWriter {
    fn init(&mut self) -> Result<()> {
        let file = File::create(&self.path)?;
        self.writer = Some(Zip64Writer::new(BufWriter::new(file)));
        Ok(())
    }

    fn write(&mut self, object: StoredObject<'_>) -> Result<()> {
        let writer = self.writer.as_mut().ok_or(OxiBakError::NotInitialized)?;
        let key = object.metadata.key.clone();
        write_object(writer, object).map_err(|e| OxiBakError::object_write(key, e))
    }

    fn close(&mut self) -> Result<()> {
        let Some(writer) = self.writer.take() else {
            return Ok(());
        };
        let entries = writer.entry_count();
        let file = writer
            .finish()?
            .into_inner()
            .map_err(|e| OxiBakError::Io(e.into_error()))?;
        file.sync_all()?;
        log::info!("{}: wrote {} entries", self.path.display(), entries);
        Ok(())
    }
}
