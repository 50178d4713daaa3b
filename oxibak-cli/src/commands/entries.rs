//! Entries command implementation.

use crate::utils::format_size;
use oxibak_archive::zip::Zip64Reader;
use serde::Serialize;
use std::fs::File;
use std::path::Path;

/// JSON output structure for one raw entry.
#[derive(Serialize)]
struct EntryInfo {
    name: String,
    header_offset: u64,
    data_offset: u64,
    size: u64,
    compressed_size: u64,
    crc32: String,
    modified: String,
    utf8: bool,
}

pub fn cmd_entries(archive: &Path, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let reader = Zip64Reader::new(File::open(archive)?)?;
    let entries = reader.entries()?;

    let mut infos = Vec::with_capacity(entries.len());
    for e in entries {
        infos.push(EntryInfo {
            name: e.name.clone(),
            header_offset: e.header_offset,
            data_offset: reader.get_file_location(&e.name)?.data_offset,
            size: e.uncompressed_size,
            compressed_size: e.compressed_size,
            crc32: format!("{:08x}", e.crc32),
            modified: e.modified.to_string(),
            utf8: e.is_utf8(),
        });
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&infos)?);
        return Ok(());
    }

    println!("Archive: {} ({})", archive.display(), format_size(reader.archive_len()));
    println!(
        "{:>12}  {:>12}  {:<8}  {:<19}  Name",
        "Data at", "Size", "CRC-32", "Modified"
    );
    println!("{}", "-".repeat(72));
    for info in &infos {
        println!(
            "{:>12}  {:>12}  {}  {}  {}",
            info.data_offset, info.size, info.crc32, info.modified, info.name
        );
    }
    println!("{}", "-".repeat(72));
    println!("{} entries", infos.len());

    Ok(())
}
