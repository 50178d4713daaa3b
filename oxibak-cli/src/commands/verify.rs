//! Verify command implementation.

use oxibak_archive::zip::Zip64Reader;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

pub fn cmd_verify(archive: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let reader = Zip64Reader::new(File::open(archive)?)?;
    println!("Verifying {}", archive.display());

    let report = verify_all(&reader)?;
    for (name, error) in &report.errors {
        println!("  FAILED: {} - {}", name, error);
    }

    println!();
    println!("Entries:  {}", report.total);
    println!("OK:       {}", report.ok);
    println!("Failed:   {}", report.errors.len());
    println!("Bytes:    {}", report.bytes);

    if report.errors.is_empty() {
        println!("\nAll entries verified successfully.");
        Ok(())
    } else {
        Err(format!("{} of {} entries failed verification", report.errors.len(), report.total).into())
    }
}

#[derive(Debug, Default)]
struct VerifyReport {
    total: usize,
    ok: usize,
    bytes: u64,
    errors: Vec<(String, String)>,
}

fn verify_all<R: Read + Seek>(reader: &Zip64Reader<R>) -> Result<VerifyReport, Box<dyn std::error::Error>> {
    let mut report = VerifyReport::default();
    for entry in reader.entries()? {
        if entry.is_dir() {
            continue;
        }
        report.total += 1;
        match reader.verify_entry(&entry.name) {
            Ok(bytes) => {
                report.ok += 1;
                report.bytes += bytes;
                log::info!("OK: {}", entry.name);
            }
            Err(e) => report.errors.push((entry.name.clone(), e.to_string())),
        }
    }
    Ok(report)
}
