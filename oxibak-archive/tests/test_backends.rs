use oxibak_archive::backend::{
    ArchiveObjectReader, ArchiveObjectWriter, DirectoryObjectReader, DirectoryObjectWriter,
};
use oxibak_core::object::{Grant, Grantee, ObjectMetadata, Owner, StoredObject};
use oxibak_core::traits::{ObjectReader, ObjectWriter, copy_objects};
use std::fs;
use std::path::PathBuf;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn scratch(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("oxibak_it_{}_{}", std::process::id(), name));
    let _ = fs::remove_dir_all(&path);
    let _ = fs::remove_file(&path);
    path
}

#[test]
fn test_directory_archive_directory() -> TestResult {
    let source = scratch("src_dir");
    let archive = scratch("bucket.zip");
    let restored = scratch("restored_dir");

    fs::create_dir_all(source.join("photos/2024"))?;
    fs::write(source.join("readme.md"), b"# backup")?;
    fs::write(source.join("photos/2024/cat.jpg"), vec![0xFFu8; 3000])?;
    fs::write(source.join("photos/empty.txt"), b"")?;

    // metadata sidecar for one object
    let mut meta = ObjectMetadata::new("readme.md");
    meta.content_type = Some("text/markdown".to_string());
    meta.metadata.insert("origin".to_string(), "test".to_string());
    meta.owner = Some(Owner {
        id: "abc123".to_string(),
        display_name: None,
    });
    meta.grants.push(Grant {
        grantee: Grantee::Email {
            address: "ops@example.com".to_string(),
        },
        permission: "READ".to_string(),
    });
    fs::create_dir_all(source.join("_META"))?;
    fs::write(source.join("_META/readme.md.ser"), meta.to_side_channel()?)?;

    // pack
    let mut reader = DirectoryObjectReader::new(&source);
    let mut writer = ArchiveObjectWriter::new(&archive);
    reader.init()?;
    writer.init()?;
    let mut packed = Vec::new();
    let count = copy_objects(&mut reader, &mut writer, |key| packed.push(key.to_string()))?;
    writer.close()?;
    reader.close()?;
    assert_eq!(count, 3);
    assert_eq!(packed, vec!["photos/2024/cat.jpg", "photos/empty.txt", "readme.md"]);

    // unpack
    let mut reader = ArchiveObjectReader::new(&archive);
    let mut writer = DirectoryObjectWriter::new(&restored);
    reader.init()?;
    writer.init()?;
    assert_eq!(copy_objects(&mut reader, &mut writer, |_| {})?, 3);
    writer.close()?;
    reader.close()?;

    assert_eq!(fs::read(restored.join("readme.md"))?, b"# backup");
    assert_eq!(fs::read(restored.join("photos/2024/cat.jpg"))?, vec![0xFFu8; 3000]);
    assert!(fs::read(restored.join("photos/empty.txt"))?.is_empty());
    let restored_meta = ObjectMetadata::from_side_channel(&fs::read(restored.join("_META/readme.md.ser"))?)?;
    assert_eq!(restored_meta, meta);

    fs::remove_dir_all(&source)?;
    fs::remove_dir_all(&restored)?;
    fs::remove_file(&archive)?;
    Ok(())
}

#[test]
fn test_streamed_body_not_buffered() -> TestResult {
    // a body larger than one copy chunk, produced lazily
    struct Counter {
        remaining: usize,
    }
    impl std::io::Read for Counter {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = buf.len().min(self.remaining);
            for (i, b) in buf[..n].iter_mut().enumerate() {
                *b = (i % 256) as u8;
            }
            self.remaining -= n;
            Ok(n)
        }
    }

    let archive = scratch("streamed.zip");
    let size = 3 * 1024 * 1024 + 17;
    let mut writer = ArchiveObjectWriter::new(&archive);
    writer.init()?;
    writer.write(StoredObject::new(
        ObjectMetadata::new("big.bin"),
        Counter { remaining: size },
    ))?;
    writer.close()?;

    let mut reader = ArchiveObjectReader::new(&archive);
    reader.init()?;
    let index = reader.archive()?.read_index()?;
    let entry = index.get("_DATA/big.bin").ok_or("missing entry")?;
    assert_eq!(entry.uncompressed_size, size as u64);
    assert_eq!(reader.archive()?.verify_entry("_DATA/big.bin")?, size as u64);
    reader.close()?;

    fs::remove_file(&archive)?;
    Ok(())
}
