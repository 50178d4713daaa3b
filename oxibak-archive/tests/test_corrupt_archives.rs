use oxibak_archive::zip::{DosDateTime, Zip64Reader, Zip64Writer};
use oxibak_core::error::OxiBakError;
use std::io::{Cursor, Write};

fn three_entry_archive() -> Vec<u8> {
    let mut writer =
        Zip64Writer::new(Vec::new()).with_timestamp(DosDateTime::from_parts(2024, 1, 2, 3, 4, 6));
    for (name, data) in [("a.txt", "1"), ("b/two.txt", "22"), ("c three.txt", "333")] {
        let mut sink = writer.begin_entry(name).unwrap();
        sink.write_all(data.as_bytes()).unwrap();
        sink.finish().unwrap();
    }
    writer.finish().unwrap()
}

fn read_index_error(bytes: Vec<u8>) -> OxiBakError {
    let reader = Zip64Reader::new(Cursor::new(bytes)).unwrap();
    match reader.read_index() {
        Ok(index) => panic!("corrupt archive produced an index of {} entries", index.len()),
        Err(e) => e,
    }
}

fn position_of(haystack: &[u8], needle: &[u8]) -> usize {
    haystack
        .windows(needle.len())
        .position(|w| w == needle)
        .unwrap()
}

#[test]
fn test_valid_archive_reads() {
    let reader = Zip64Reader::new(Cursor::new(three_entry_archive())).unwrap();
    assert_eq!(
        reader.get_entry_names().unwrap(),
        vec!["a.txt", "b/two.txt", "c three.txt"]
    );
}

#[test]
fn test_truncated_at_half() {
    let mut bytes = three_entry_archive();
    bytes.truncate(bytes.len() / 2);
    let err = read_index_error(bytes);
    assert!(
        matches!(err, OxiBakError::ArchiveCorrupt { .. }),
        "unexpected error: {}",
        err
    );
}

#[test]
fn test_truncated_anywhere_before_eocd() {
    let full = three_entry_archive();
    let eocd = full.len() - 22;
    for cut in (0..=eocd).step_by(7) {
        let err = read_index_error(full[..cut].to_vec());
        assert!(
            matches!(err, OxiBakError::ArchiveCorrupt { .. }),
            "cut at {}: unexpected error: {}",
            cut,
            err
        );
    }
}

#[test]
fn test_encrypted_directory_rejected() {
    let mut bytes = three_entry_archive();
    let cd = position_of(&bytes, b"PK\x01\x02");
    // general purpose flags, bit 13
    bytes[cd + 9] |= 0x20;
    let err = read_index_error(bytes);
    assert!(matches!(err, OxiBakError::ArchiveCorrupt { .. }));
    assert!(err.to_string().contains("encryption"));
}

#[test]
fn test_trailing_garbage_rejected() {
    let mut bytes = three_entry_archive();
    bytes.extend_from_slice(&[0u8; 5]);
    assert!(read_index_error(bytes).is_corrupt());
}

#[test]
fn test_prefixed_archive_rejected() {
    // bytes in front shift every absolute offset
    let mut bytes = vec![0u8; 64];
    bytes.extend(three_entry_archive());
    assert!(read_index_error(bytes).is_corrupt());
}

#[test]
fn test_bad_locator_signature() {
    let mut bytes = three_entry_archive();
    let locator = bytes.len() - 22 - 20;
    bytes[locator] = b'X';
    let err = read_index_error(bytes);
    assert!(matches!(err, OxiBakError::ArchiveCorrupt { .. }));
}

#[test]
fn test_multi_disk_locator() {
    let mut bytes = three_entry_archive();
    let locator = bytes.len() - 22 - 20;
    // total number of disks
    bytes[locator + 16] = 2;
    let err = read_index_error(bytes);
    assert!(matches!(err, OxiBakError::ArchiveCorrupt { .. }));
}

#[test]
fn test_bad_directory_signature() {
    let mut bytes = three_entry_archive();
    let cd = position_of(&bytes, b"PK\x01\x02");
    bytes[cd + 3] = 0x09;
    assert!(read_index_error(bytes).is_corrupt());
}

#[test]
fn test_corrupted_data_fails_verification() {
    let mut bytes = three_entry_archive();
    let data = position_of(&bytes, b"333");
    bytes[data] = b'4';
    let reader = Zip64Reader::new(Cursor::new(bytes)).unwrap();
    assert_eq!(reader.verify_entry("b/two.txt").unwrap(), 2);
    let err = reader.verify_entry("c three.txt").unwrap_err();
    assert!(err.to_string().contains("CRC mismatch"));
}
