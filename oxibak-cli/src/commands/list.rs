//! List command implementation.

use crate::utils::{format_size, matches_filters};
use oxibak_archive::backend::ArchiveObjectReader;
use oxibak_core::object::data_entry_name;
use oxibak_core::traits::ObjectReader;
use serde::Serialize;
use std::path::Path;

/// Flags of the list command.
pub struct ListOptions<'a> {
    pub long: bool,
    pub json: bool,
    pub include: &'a [String],
    pub exclude: &'a [String],
}

/// JSON output structure for one listed object.
#[derive(Serialize)]
struct ObjectListing {
    key: String,
    size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    content_type: Option<String>,
}

pub fn cmd_list(archive: &Path, options: &ListOptions<'_>) -> Result<(), Box<dyn std::error::Error>> {
    let mut reader = ArchiveObjectReader::new(archive);
    reader.init()?;

    let listings = collect_listings(&mut reader, options)?;
    reader.close()?;

    if options.json {
        println!("{}", serde_json::to_string_pretty(&listings)?);
        return Ok(());
    }

    if options.long {
        let total: u64 = listings.iter().map(|l| l.size).sum();
        println!("{:>12}  {:<24}  Key", "Size", "Content-Type");
        println!("{}", "-".repeat(60));
        for listing in &listings {
            println!(
                "{:>12}  {:<24}  {}",
                format_size(listing.size),
                listing.content_type.as_deref().unwrap_or("-"),
                listing.key
            );
        }
        println!("{}", "-".repeat(60));
        println!("{:>12}  {} objects", format_size(total), listings.len());
    } else {
        for listing in &listings {
            println!("{}", listing.key);
        }
    }

    Ok(())
}

fn collect_listings(
    reader: &mut ArchiveObjectReader,
    options: &ListOptions<'_>,
) -> Result<Vec<ObjectListing>, Box<dyn std::error::Error>> {
    let mut listings = Vec::new();
    for index in 0..reader.count()? {
        let key = reader.key_at(index)?.to_string();
        if !matches_filters(&key, options.include, options.exclude) {
            continue;
        }

        let size = reader.archive()?.entry(&data_entry_name(&key))?.uncompressed_size;
        // content type lives in the metadata entry, only read it when asked
        let content_type = if options.long || options.json {
            reader.read(index)?.metadata.content_type
        } else {
            None
        };
        listings.push(ObjectListing {
            key,
            size,
            content_type,
        });
    }
    Ok(listings)
}
