//! Pack and unpack commands.
//!
//! Both move objects between a directory and an archive through the
//! backend traits; they differ only in which side reads.

use crate::utils::create_progress_bar;
use oxibak_archive::backend::{
    ArchiveObjectReader, ArchiveObjectWriter, DirectoryObjectReader, DirectoryObjectWriter,
};
use oxibak_core::traits::{ObjectReader, ObjectWriter, copy_objects};
use std::path::Path;

pub fn cmd_pack(source: &Path, archive: &Path, progress: bool) -> Result<(), Box<dyn std::error::Error>> {
    if !source.is_dir() {
        return Err(format!("{} is not a directory", source.display()).into());
    }
    let mut reader = DirectoryObjectReader::new(source);
    let mut writer = ArchiveObjectWriter::new(archive);
    let count = transfer(&mut reader, &mut writer, progress)?;
    println!("Packed {} objects into {}", count, archive.display());
    Ok(())
}

pub fn cmd_unpack(archive: &Path, target: &Path, progress: bool) -> Result<(), Box<dyn std::error::Error>> {
    let mut reader = ArchiveObjectReader::new(archive);
    let mut writer = DirectoryObjectWriter::new(target);
    let count = transfer(&mut reader, &mut writer, progress)?;
    println!("Unpacked {} objects into {}", count, target.display());
    Ok(())
}

fn transfer(
    reader: &mut dyn ObjectReader,
    writer: &mut dyn ObjectWriter,
    progress: bool,
) -> Result<usize, Box<dyn std::error::Error>> {
    reader.init()?;
    writer.init()?;

    let pb = create_progress_bar(reader.count()? as u64, progress);
    let count = copy_objects(reader, writer, |key| {
        pb.set_message(key.to_string());
        pb.inc(1);
    })?;
    pb.finish_with_message("done");

    writer.close()?;
    reader.close()?;
    Ok(count)
}
