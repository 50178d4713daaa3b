//! Diff command implementation.

use oxibak_archive::backend::{ArchiveObjectReader, DirectoryObjectReader};
use oxibak_core::traits::ObjectReader;
use std::collections::HashSet;
use std::path::Path;

/// A directory is read as a bucket, anything else as an archive.
fn open_reader(path: &Path) -> Box<dyn ObjectReader> {
    if path.is_dir() {
        Box::new(DirectoryObjectReader::new(path))
    } else {
        Box::new(ArchiveObjectReader::new(path))
    }
}

pub fn cmd_diff(source: &Path, target: &Path, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let mut source_reader = open_reader(source);
    let mut target_reader = open_reader(target);
    source_reader.init()?;
    target_reader.init()?;

    let missing = missing_keys(source_reader.as_ref(), target_reader.as_ref())?;
    source_reader.close()?;
    target_reader.close()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&missing)?);
    } else {
        for key in &missing {
            println!("{}", key);
        }
    }
    log::info!("{} objects missing from {}", missing.len(), target.display());
    Ok(())
}

/// Keys of `source` that `target` does not have, in source order.
fn missing_keys(
    source: &dyn ObjectReader,
    target: &dyn ObjectReader,
) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    let mut present = HashSet::new();
    for index in 0..target.count()? {
        present.insert(target.key_at(index)?);
    }

    let mut missing = Vec::new();
    for index in 0..source.count()? {
        let key = source.key_at(index)?;
        if !present.contains(key) {
            missing.push(key.to_string());
        }
    }
    Ok(missing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::cmd_pack;
    use std::fs;

    #[test]
    fn test_missing_keys_directory_vs_archive() {
        let base = std::env::temp_dir().join(format!("oxibak_cli_diff_{}", std::process::id()));
        let _ = fs::remove_dir_all(&base);
        let packed = base.join("packed");
        let bucket = base.join("bucket");
        let archive = base.join("packed.zip");

        fs::create_dir_all(packed.join("docs")).unwrap();
        fs::write(packed.join("docs/a.txt"), b"a").unwrap();
        fs::write(packed.join("b.txt"), b"b").unwrap();
        cmd_pack(&packed, &archive, false).unwrap();

        fs::create_dir_all(bucket.join("docs")).unwrap();
        fs::write(bucket.join("docs/a.txt"), b"a").unwrap();
        fs::write(bucket.join("docs/new.txt"), b"n").unwrap();
        fs::write(bucket.join("c.txt"), b"c").unwrap();

        let mut source = open_reader(&bucket);
        let mut target = open_reader(&archive);
        source.init().unwrap();
        target.init().unwrap();
        assert_eq!(
            missing_keys(source.as_ref(), target.as_ref()).unwrap(),
            vec!["c.txt", "docs/new.txt"]
        );
        assert_eq!(
            missing_keys(target.as_ref(), source.as_ref()).unwrap(),
            vec!["b.txt"]
        );
        assert!(missing_keys(source.as_ref(), source.as_ref()).unwrap().is_empty());

        fs::remove_dir_all(&base).unwrap();
    }

    #[test]
    fn test_diff_missing_archive() {
        let dir = std::env::temp_dir();
        let absent = dir.join("oxibak_cli_diff_absent.zip");
        assert!(cmd_diff(&dir.join("oxibak_cli_diff_absent_too.zip"), &absent, false).is_err());
    }
}
