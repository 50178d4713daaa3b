//! Byte-stream views over single archive entries.
//!
//! [`EntryStream`] is the read side: a `Read + Seek` cursor confined to one
//! entry's data region. [`EntrySink`] is the write side: a `Write` that feeds
//! the archive writer and ends the entry when finished.

use super::index::ArchiveEntryLocation;
use super::reader::Zip64Reader;
use super::writer::Zip64Writer;
use oxibak_core::error::Result;
use std::io::{self, Read, Seek, SeekFrom, Write};

/// Seekable reader over the data of one entry.
///
/// Positions are relative to the first data byte. Seeks that would leave
/// `0..len` fail with [`io::ErrorKind::InvalidInput`] instead of clamping; the
/// only position allowed outside that range is 0 for an empty entry.
#[derive(Debug)]
pub struct EntryStream<'a, R> {
    reader: &'a Zip64Reader<R>,
    location: ArchiveEntryLocation,
    pos: u64,
}

impl<'a, R: Read + Seek> EntryStream<'a, R> {
    pub(crate) fn new(reader: &'a Zip64Reader<R>, location: ArchiveEntryLocation) -> Self {
        Self {
            reader,
            location,
            pos: 0,
        }
    }

    /// Location of the entry's data in the archive.
    pub fn location(&self) -> ArchiveEntryLocation {
        self.location
    }

    /// Entry size in bytes.
    pub fn len(&self) -> u64 {
        self.location.compressed_size
    }

    /// Whether the entry has no data.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current position within the entry.
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Bytes left before the end of the entry.
    pub fn remaining(&self) -> u64 {
        self.len().saturating_sub(self.pos)
    }
}

impl<R: Read + Seek> Read for EntryStream<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let want = (buf.len() as u64).min(self.remaining()) as usize;
        if want == 0 {
            return Ok(0);
        }
        let n = self
            .reader
            .read_at(self.location.data_offset + self.pos, &mut buf[..want])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "archive ended inside entry data",
            ));
        }
        self.pos += n as u64;
        Ok(n)
    }
}

impl<R: Read + Seek> Seek for EntryStream<'_, R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let len = self.len();
        let target = match pos {
            SeekFrom::Start(offset) => i128::from(offset),
            SeekFrom::Current(delta) => i128::from(self.pos) + i128::from(delta),
            SeekFrom::End(delta) => i128::from(len) + i128::from(delta),
        };
        if target == 0 || (0..i128::from(len)).contains(&target) {
            self.pos = target as u64;
            return Ok(self.pos);
        }
        Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("seek to {} is outside entry of {} bytes", target, len),
        ))
    }

    fn stream_position(&mut self) -> io::Result<u64> {
        Ok(self.pos)
    }
}

/// Writer for the entry currently open in a [`Zip64Writer`].
///
/// Call [`finish`](Self::finish) to end the entry and see any error. Dropping
/// an unfinished sink ends the entry too, logging a failure instead of
/// reporting it.
#[derive(Debug)]
pub struct EntrySink<'a, W: Write> {
    writer: &'a mut Zip64Writer<W>,
    finished: bool,
}

impl<'a, W: Write> EntrySink<'a, W> {
    pub(crate) fn new(writer: &'a mut Zip64Writer<W>) -> Self {
        Self {
            writer,
            finished: false,
        }
    }

    /// Bytes written to this entry so far.
    pub fn len(&self) -> u64 {
        self.writer.current_entry_len().unwrap_or(0)
    }

    /// Whether nothing has been written to this entry yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// End the entry, writing its data descriptor.
    pub fn finish(mut self) -> Result<()> {
        self.finished = true;
        self.writer.end_entry()
    }

    /// Give up on the entry: it is closed but never listed in the central directory.
    pub fn abort(mut self) -> Result<()> {
        self.finished = true;
        self.writer.abort_entry()
    }
}

impl<W: Write> Write for EntrySink<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(self.writer.write_data(buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(self.writer.flush()?)
    }
}

impl<W: Write> Drop for EntrySink<'_, W> {
    fn drop(&mut self) {
        if self.finished || !self.writer.is_streaming() {
            return;
        }
        if let Err(e) = self.writer.end_entry() {
            log::warn!("failed to end archive entry on drop: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = Zip64Writer::new(Vec::new());
        for (name, data) in entries {
            let mut sink = writer.begin_entry(name).unwrap();
            sink.write_all(data).unwrap();
            sink.finish().unwrap();
        }
        writer.finish().unwrap()
    }

    #[test]
    fn test_read_bounded() {
        let bytes = archive(&[("a", b"first"), ("b", b"second")]);
        let reader = Zip64Reader::new(Cursor::new(bytes)).unwrap();
        let mut stream = reader.get_file_stream("a").unwrap();
        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"first");
        assert_eq!(stream.remaining(), 0);
        assert_eq!(stream.read(&mut [0u8; 4]).unwrap(), 0);
    }

    #[test]
    fn test_seek_boundaries() {
        let bytes = archive(&[("e", b"0123456789")]);
        let reader = Zip64Reader::new(Cursor::new(bytes)).unwrap();
        let mut stream = reader.get_file_stream("e").unwrap();

        assert!(stream.seek(SeekFrom::Start(10)).is_err());
        assert!(stream.seek(SeekFrom::Current(-1)).is_err());
        assert!(stream.seek(SeekFrom::End(0)).is_err());
        assert_eq!(stream.position(), 0);

        assert_eq!(stream.seek(SeekFrom::End(-1)).unwrap(), 9);
        let mut byte = [0u8; 1];
        stream.read_exact(&mut byte).unwrap();
        assert_eq!(&byte, b"9");

        assert_eq!(stream.seek(SeekFrom::Start(3)).unwrap(), 3);
        assert_eq!(stream.seek(SeekFrom::Current(2)).unwrap(), 5);
        assert_eq!(stream.stream_position().unwrap(), 5);
        let err = stream.seek(SeekFrom::Current(5)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert_eq!(stream.position(), 5);
    }

    #[test]
    fn test_empty_entry_seek() {
        let bytes = archive(&[("empty", b"")]);
        let reader = Zip64Reader::new(Cursor::new(bytes)).unwrap();
        let mut stream = reader.get_file_stream("empty").unwrap();
        assert!(stream.is_empty());
        assert_eq!(stream.seek(SeekFrom::Start(0)).unwrap(), 0);
        assert!(stream.seek(SeekFrom::Start(1)).is_err());
        assert_eq!(stream.read(&mut [0u8; 8]).unwrap(), 0);
    }

    #[test]
    fn test_streams_coexist() {
        let bytes = archive(&[("a", b"aaaa"), ("b", b"bbbb")]);
        let reader = Zip64Reader::new(Cursor::new(bytes)).unwrap();
        let mut a = reader.get_file_stream("a").unwrap();
        let mut b = reader.get_file_stream("b").unwrap();
        let mut buf = [0u8; 2];
        a.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"aa");
        b.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"bb");
        a.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"aa");
    }

    #[test]
    fn test_sink_abort() {
        let mut writer = Zip64Writer::new(Vec::new());
        let mut sink = writer.begin_entry("half").unwrap();
        sink.write_all(b"half an obj").unwrap();
        sink.abort().unwrap();
        assert!(!writer.is_streaming());
        let bytes = writer.finish().unwrap();
        let reader = Zip64Reader::new(Cursor::new(bytes)).unwrap();
        assert!(reader.get_entry_names().unwrap().is_empty());
    }

    #[test]
    fn test_sink_len_and_drop() {
        let mut writer = Zip64Writer::new(Vec::new());
        {
            let mut sink = writer.begin_entry("dropped").unwrap();
            assert!(sink.is_empty());
            sink.write_all(b"abc").unwrap();
            assert_eq!(sink.len(), 3);
        }
        assert!(!writer.is_streaming());
        assert_eq!(writer.entry_count(), 1);

        let bytes = writer.finish().unwrap();
        let reader = Zip64Reader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.verify_entry("dropped").unwrap(), 3);
    }
}
