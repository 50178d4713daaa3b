//! Objects stored as plain files below a local directory.
//!
//! The directory mirrors a bucket: object `a/b.txt` lives at `<root>/a/b.txt`
//! and its metadata, when there is any, at `<root>/_META/a/b.txt.ser`.

use oxibak_core::error::{OxiBakError, Result};
use oxibak_core::object::{META_DIR, ObjectMetadata, StoredObject, meta_entry_name};
use oxibak_core::traits::{ObjectReader, ObjectWriter};
use std::fs::{self, File};
use std::io::{self, BufReader, Write};
use std::path::{Component, Path, PathBuf};

/// Reject keys that would resolve outside the backend root.
///
/// Absolute keys, `..` components and NUL bytes are refused.
pub fn validate_key(key: &str) -> Result<()> {
    let path = Path::new(key);
    if key.is_empty() || path.is_absolute() || key.starts_with('/') {
        return Err(OxiBakError::path_traversal(key));
    }
    for component in path.components() {
        match component {
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(OxiBakError::path_traversal(key));
            }
            Component::Normal(s) => {
                if s.to_string_lossy().contains('\0') {
                    return Err(OxiBakError::path_traversal(key));
                }
            }
            Component::CurDir => {}
        }
    }
    Ok(())
}

fn collect_keys(root: &Path, dir: &Path, keys: &mut Vec<String>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            if dir == root && entry.file_name() == META_DIR {
                continue;
            }
            collect_keys(root, &path, keys)?;
        } else {
            let key = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .to_string_lossy()
                .replace('\\', "/");
            keys.push(key);
        }
    }
    Ok(())
}

/// Reads every file below a directory as an object.
#[derive(Debug)]
pub struct DirectoryObjectReader {
    root: PathBuf,
    keys: Option<Vec<String>>,
}

impl DirectoryObjectReader {
    /// Reader rooted at `root`; nothing is scanned before `init`.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            keys: None,
        }
    }

    fn keys(&self) -> Result<&[String]> {
        self.keys.as_deref().ok_or(OxiBakError::NotInitialized)
    }
}

impl ObjectReader for DirectoryObjectReader {
    fn init(&mut self) -> Result<()> {
        let mut keys = Vec::new();
        collect_keys(&self.root, &self.root, &mut keys)?;
        keys.sort();
        log::info!("{}: {} objects", self.root.display(), keys.len());
        self.keys = Some(keys);
        Ok(())
    }

    fn count(&self) -> Result<usize> {
        Ok(self.keys()?.len())
    }

    fn key_at(&self, index: usize) -> Result<&str> {
        let keys = self.keys()?;
        keys.get(index)
            .map(String::as_str)
            .ok_or(OxiBakError::IndexOutOfRange {
                index,
                count: keys.len(),
            })
    }

    fn read(&mut self, index: usize) -> Result<StoredObject<'_>> {
        let key = self.key_at(index)?.to_string();

        let meta_path = self.root.join(meta_entry_name(&key));
        let metadata = match File::open(&meta_path) {
            Ok(file) => {
                let mut metadata = ObjectMetadata::read_side_channel(BufReader::new(file))
                    .map_err(|e| OxiBakError::object_read(&key, format!("bad metadata: {}", e)))?;
                metadata.key = key.clone();
                metadata
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => ObjectMetadata::new(key.clone()),
            Err(e) => return Err(OxiBakError::object_read(&key, e.to_string())),
        };

        let body = File::open(self.root.join(&key))
            .map_err(|e| OxiBakError::object_read(&key, e.to_string()))?;
        Ok(StoredObject::new(metadata, body))
    }

    fn close(&mut self) -> Result<()> {
        self.keys = None;
        Ok(())
    }
}

/// Writes objects as files below a directory.
#[derive(Debug)]
pub struct DirectoryObjectWriter {
    root: PathBuf,
    initialized: bool,
}

impl DirectoryObjectWriter {
    /// Writer rooted at `root`; the directory is created by `init`.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            initialized: false,
        }
    }

    fn write_object(&self, mut object: StoredObject<'_>) -> Result<()> {
        let key = object.metadata.key.clone();
        let path = self.root.join(&key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = File::create(&path)?;
        io::copy(&mut object.body, &mut file).map_err(OxiBakError::from_io)?;
        file.flush()?;

        let meta_path = self.root.join(meta_entry_name(&key));
        if let Some(parent) = meta_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&meta_path, object.metadata.to_side_channel()?)?;
        log::debug!("wrote {}", path.display());
        Ok(())
    }
}

impl ObjectWriter for DirectoryObjectWriter {
    fn init(&mut self) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        self.initialized = true;
        Ok(())
    }

    fn write(&mut self, object: StoredObject<'_>) -> Result<()> {
        if !self.initialized {
            return Err(OxiBakError::NotInitialized);
        }
        let key = object.metadata.key.clone();
        validate_key(&key)?;
        self.write_object(object)
            .map_err(|e| OxiBakError::object_write(key, e))
    }

    fn close(&mut self) -> Result<()> {
        self.initialized = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = env::temp_dir().join(format!("oxibak_dir_{}_{}", std::process::id(), name));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("a/b/c.txt").is_ok());
        assert!(validate_key("./a").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("/etc/passwd").is_err());
        assert!(validate_key("../escape").is_err());
        assert!(validate_key("a/../../escape").is_err());
        assert!(validate_key("nul\0byte").is_err());
    }

    #[test]
    fn test_write_then_read() {
        let root = temp_dir("write_then_read");
        let mut writer = DirectoryObjectWriter::new(&root);
        writer.init().unwrap();

        let mut meta = ObjectMetadata::new("b/nested.txt");
        meta.cache_control = Some("no-cache".to_string());
        writer
            .write(StoredObject::from_bytes(meta.clone(), b"nested".to_vec()))
            .unwrap();
        writer
            .write(StoredObject::from_bytes(ObjectMetadata::new("a.txt"), b"top".to_vec()))
            .unwrap();
        writer.close().unwrap();

        assert_eq!(fs::read(root.join("b/nested.txt")).unwrap(), b"nested");
        assert!(root.join("_META/b/nested.txt.ser").exists());

        let mut reader = DirectoryObjectReader::new(&root);
        reader.init().unwrap();
        assert_eq!(reader.count().unwrap(), 2);
        assert_eq!(reader.key_at(0).unwrap(), "a.txt");
        assert_eq!(reader.key_at(1).unwrap(), "b/nested.txt");

        let mut object = reader.read(1).unwrap();
        assert_eq!(object.metadata, meta);
        assert_eq!(object.read_body().unwrap(), b"nested");

        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn test_plain_files_get_default_metadata() {
        let root = temp_dir("plain_files");
        fs::create_dir_all(root.join("sub")).unwrap();
        fs::write(root.join("sub/file.bin"), [1u8, 2, 3]).unwrap();

        let mut reader = DirectoryObjectReader::new(&root);
        reader.init().unwrap();
        let mut object = reader.read(0).unwrap();
        assert_eq!(object.metadata, ObjectMetadata::new("sub/file.bin"));
        assert_eq!(object.read_body().unwrap(), vec![1, 2, 3]);

        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn test_traversal_rejected() {
        let root = temp_dir("traversal");
        let mut writer = DirectoryObjectWriter::new(&root);
        writer.init().unwrap();
        let err = writer
            .write(StoredObject::from_bytes(ObjectMetadata::new("../evil"), b"x".to_vec()))
            .unwrap_err();
        assert!(matches!(err, OxiBakError::PathTraversal { .. }));

        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn test_uninitialized() {
        let reader = DirectoryObjectReader::new(temp_dir("uninit"));
        assert!(matches!(reader.count(), Err(OxiBakError::NotInitialized)));
        let mut writer = DirectoryObjectWriter::new(temp_dir("uninit"));
        let err = writer
            .write(StoredObject::from_bytes(ObjectMetadata::new("k"), Vec::new()))
            .unwrap_err();
        assert!(matches!(err, OxiBakError::NotInitialized));
    }
}
