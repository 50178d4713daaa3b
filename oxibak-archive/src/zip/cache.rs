//! Segmented block cache over a seekable byte source.
//!
//! The archive is divided into fixed [`SEGMENT_SIZE`] blocks. A block is read
//! from the source the first time any byte in it is needed and kept for the
//! lifetime of the cache; there is no eviction. The source is only seeked when
//! the block to read does not start where the previous read left off, so
//! sequential reads through an entry never re-seek.

use oxibak_core::error::{OxiBakError, Result};
use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom};
use std::sync::Arc;

/// Size of one cached block.
pub const SEGMENT_SIZE: usize = 16384;

/// Block cache owning the underlying source.
#[derive(Debug)]
pub struct BlockCache<R> {
    source: R,
    len: u64,
    /// Where the source is positioned, if known.
    cursor: Option<u64>,
    blocks: HashMap<u64, Arc<[u8]>>,
}

impl<R: Read + Seek> BlockCache<R> {
    /// Wrap `source`, measuring its length.
    pub fn new(mut source: R) -> Result<Self> {
        let len = source
            .seek(SeekFrom::End(0))
            .map_err(|e| OxiBakError::block_read(0, e))?;
        Ok(Self {
            source,
            len,
            cursor: Some(len),
            blocks: HashMap::new(),
        })
    }

    /// Length of the source in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether the source is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of blocks currently held.
    pub fn cached_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Block `index`: `SEGMENT_SIZE` bytes, fewer for the last block, none past the end.
    ///
    /// Failed reads are not cached; a later call retries them.
    pub fn get_block(&mut self, index: u64) -> Result<Arc<[u8]>> {
        if let Some(block) = self.blocks.get(&index) {
            return Ok(Arc::clone(block));
        }

        let start = match index.checked_mul(SEGMENT_SIZE as u64) {
            Some(start) if start < self.len => start,
            _ => return Ok(Arc::from(Vec::new())),
        };
        let want = (self.len - start).min(SEGMENT_SIZE as u64) as usize;

        let block: Arc<[u8]> = Arc::from(self.read_source(start, want)?);
        log::trace!("block cache miss: block {} ({} bytes at {})", index, want, start);
        self.blocks.insert(index, Arc::clone(&block));
        Ok(block)
    }

    fn read_source(&mut self, start: u64, len: usize) -> Result<Vec<u8>> {
        // Forget the position until the read completes; a failure leaves it unknown.
        let cursor = self.cursor.take();
        if cursor != Some(start) {
            self.source
                .seek(SeekFrom::Start(start))
                .map_err(|e| OxiBakError::block_read(start, e))?;
        }
        let mut buf = vec![0u8; len];
        self.source
            .read_exact(&mut buf)
            .map_err(|e| OxiBakError::block_read(start, e))?;
        self.cursor = Some(start + len as u64);
        Ok(buf)
    }

    /// Copy bytes starting at `offset` into `buf`, stopping at the end of the source.
    ///
    /// Returns the number of bytes copied.
    pub fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            let pos = offset + filled as u64;
            let block = self.get_block(pos / SEGMENT_SIZE as u64)?;
            let within = (pos % SEGMENT_SIZE as u64) as usize;
            if within >= block.len() {
                break;
            }
            let n = (block.len() - within).min(buf.len() - filled);
            buf[filled..filled + n].copy_from_slice(&block[within..within + n]);
            filled += n;
        }
        Ok(filled)
    }

    /// Exactly `len` bytes at `offset`.
    ///
    /// A range reaching past the end of the source means the archive points
    /// outside itself and is reported as corruption.
    pub fn read_range(&mut self, offset: u64, len: u64) -> Result<Vec<u8>> {
        let end = offset
            .checked_add(len)
            .filter(|&end| end <= self.len)
            .ok_or_else(|| {
                OxiBakError::corrupt(
                    offset,
                    format!("range of {} bytes extends past end of file ({})", len, self.len),
                )
            })?;
        let len = usize::try_from(end - offset)
            .map_err(|_| OxiBakError::corrupt(offset, format!("range of {} bytes is too large", len)))?;
        let mut buf = vec![0u8; len];
        let read = self.read_at(offset, &mut buf)?;
        if read != len {
            return Err(OxiBakError::corrupt(offset + read as u64, "unexpected end of file"));
        }
        Ok(buf)
    }

    /// Give the source back, dropping every cached block.
    pub fn into_inner(self) -> R {
        self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Cursor};

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    /// Counts seeks and can be told to fail.
    struct Probe {
        inner: Cursor<Vec<u8>>,
        seeks: usize,
        fail_reads: bool,
    }

    impl Read for Probe {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.fail_reads {
                return Err(io::Error::other("injected"));
            }
            self.inner.read(buf)
        }
    }

    impl Seek for Probe {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            self.seeks += 1;
            self.inner.seek(pos)
        }
    }

    #[test]
    fn test_block_sizes() {
        let data = pattern(SEGMENT_SIZE * 2 + 100);
        let mut cache = BlockCache::new(Cursor::new(data.clone())).unwrap();
        assert_eq!(cache.len(), data.len() as u64);

        assert_eq!(&cache.get_block(0).unwrap()[..], &data[..SEGMENT_SIZE]);
        assert_eq!(cache.get_block(1).unwrap().len(), SEGMENT_SIZE);
        assert_eq!(&cache.get_block(2).unwrap()[..], &data[SEGMENT_SIZE * 2..]);
        assert!(cache.get_block(3).unwrap().is_empty());
        assert!(cache.get_block(u64::MAX).unwrap().is_empty());
        assert_eq!(cache.cached_blocks(), 3);
    }

    #[test]
    fn test_read_at_spans_blocks() {
        let data = pattern(SEGMENT_SIZE * 3);
        let mut cache = BlockCache::new(Cursor::new(data.clone())).unwrap();

        let mut buf = vec![0u8; SEGMENT_SIZE + 10];
        let offset = SEGMENT_SIZE as u64 - 5;
        assert_eq!(cache.read_at(offset, &mut buf).unwrap(), buf.len());
        assert_eq!(&buf[..], &data[offset as usize..offset as usize + buf.len()]);

        // short at end of source
        let mut buf = vec![0u8; 10];
        let n = cache.read_at(data.len() as u64 - 4, &mut buf).unwrap();
        assert_eq!(n, 4);
        assert_eq!(cache.read_at(data.len() as u64 + 7, &mut buf).unwrap(), 0);
    }

    #[test]
    fn test_sequential_reads_do_not_reseek() {
        let probe = Probe {
            inner: Cursor::new(pattern(SEGMENT_SIZE * 4)),
            seeks: 0,
            fail_reads: false,
        };
        let mut cache = BlockCache::new(probe).unwrap();
        for index in 0..4 {
            cache.get_block(index).unwrap();
        }
        // one seek to measure, one back to the start
        assert_eq!(cache.source.seeks, 2);

        // cached blocks never touch the source
        cache.get_block(1).unwrap();
        assert_eq!(cache.source.seeks, 2);
    }

    #[test]
    fn test_read_errors_not_cached() {
        let probe = Probe {
            inner: Cursor::new(pattern(100)),
            seeks: 0,
            fail_reads: true,
        };
        let mut cache = BlockCache::new(probe).unwrap();
        let err = cache.get_block(0).unwrap_err();
        assert!(matches!(err, OxiBakError::BlockRead { offset: 0, .. }));
        assert_eq!(cache.cached_blocks(), 0);

        cache.source.fail_reads = false;
        assert_eq!(cache.get_block(0).unwrap().len(), 100);
    }

    #[test]
    fn test_read_range_bounds() {
        let data = pattern(1000);
        let mut cache = BlockCache::new(Cursor::new(data.clone())).unwrap();
        assert_eq!(cache.read_range(990, 10).unwrap(), &data[990..]);
        assert!(cache.read_range(1000, 0).unwrap().is_empty());
        assert!(cache.read_range(995, 10).unwrap_err().is_corrupt());
        assert!(cache.read_range(u64::MAX, 2).unwrap_err().is_corrupt());
    }
}
