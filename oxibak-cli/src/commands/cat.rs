//! Cat command implementation.

use oxibak_archive::zip::Zip64Reader;
use oxibak_core::object::data_entry_name;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

pub fn cmd_cat(archive: &Path, key: &str) -> Result<(), Box<dyn std::error::Error>> {
    let reader = Zip64Reader::new(File::open(archive)?)?;
    let mut stream = reader.get_file_stream(&data_entry_name(key))?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let copied = io::copy(&mut stream, &mut out)?;
    out.flush()?;
    log::debug!("{}: {} bytes", key, copied);
    Ok(())
}
