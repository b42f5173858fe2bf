//! Offset-addressed read primitives.
//!
//! `RangeStream`, `MappingStream`, and `AlignedStream` are a minimal
//! in-repo utility layer, grounded in the offset-based `io::Read` trait
//! at `examples/oxidecomputer-bldb/src/io.rs` but built on `std::io` so it
//! can wrap arbitrary hosted byte sources instead of a raw slice.

use crate::error::Result;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::{Arc, Mutex};

/// An offset-addressed read, independent of any shared cursor position.
///
/// Implementors must treat `offset` as absolute from the start of the
/// stream; `read_at` does not advance any stateful position visible to
/// other callers (though the underlying handle's cursor, if any, will have
/// moved when the call returns — see the concurrency note on
/// [`SharedStream`]).
pub trait ReadAt: Send + Sync {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;

    /// Total addressable size, if known.
    fn size(&self) -> Option<u64> {
        None
    }
}

/// A `Read + Seek` handle shared across `VirtualDisk`s that reference the
/// same backing disk. The mutex serializes access so a single `PhysicalDisk`
/// can safely be shared across threads without relying on caller discipline.
pub type SharedStream = Arc<Mutex<dyn ReadWriteSeek>>;

/// Bound alias for the trait object stored in a [`SharedStream`].
pub trait ReadWriteSeek: Read + Seek + Send {}
impl<T: Read + Seek + Send> ReadWriteSeek for T {}

impl ReadAt for SharedStream {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let mut guard = self.lock().unwrap_or_else(|e| e.into_inner());
        guard.seek(SeekFrom::Start(offset))?;
        read_fill(&mut *guard, buf)
    }

    fn size(&self) -> Option<u64> {
        let mut guard = self.lock().unwrap_or_else(|e| e.into_inner());
        guard.seek(SeekFrom::End(0)).ok()
    }
}

/// `std::io::Read::read` may perform a short read even when more data is
/// available; loop until the buffer is full or the source is exhausted.
fn read_fill<R: Read + ?Sized>(r: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match r.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

/// A stream clamped to `[base, base + len)` of an inner [`ReadAt`]. Used for
/// `PhysicalDisk::open()` and for partition sub-streams.
pub struct RangeStream {
    inner: Arc<dyn ReadAt>,
    base: u64,
    len: u64,
}

impl RangeStream {
    pub fn new(inner: Arc<dyn ReadAt>, base: u64, len: u64) -> Self {
        RangeStream { inner, base, len }
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl ReadAt for RangeStream {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        if offset >= self.len {
            return Ok(0);
        }
        let avail = self.len - offset;
        let want = (buf.len() as u64).min(avail) as usize;
        self.inner.read_at(self.base + offset, &mut buf[..want])
    }

    fn size(&self) -> Option<u64> {
        Some(self.len)
    }
}

/// A sparse map from a logical offset range to a substream plus an offset
/// within that substream. Used to compose LVM2 logical volumes from
/// segments and RAID0/LINEAR arrays from member disks.
pub struct MappingStream {
    // Kept sorted by `logical_start` so reads can binary-search the
    // covering range.
    entries: Vec<MapEntry>,
    total_len: u64,
}

struct MapEntry {
    logical_start: u64,
    logical_len: u64,
    sub: Arc<dyn ReadAt>,
    sub_offset: u64,
}

impl Default for MappingStream {
    fn default() -> Self {
        MappingStream { entries: Vec::new(), total_len: 0 }
    }
}

impl MappingStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `[offset, offset+len)` of the logical address space onto
    /// `sub` starting at `sub_offset`.
    pub fn add(&mut self, offset: u64, len: u64, sub: Arc<dyn ReadAt>, sub_offset: u64) {
        self.entries.push(MapEntry { logical_start: offset, logical_len: len, sub, sub_offset });
        self.entries.sort_by_key(|e| e.logical_start);
        self.total_len = self.total_len.max(offset + len);
    }

    pub fn len(&self) -> u64 {
        self.total_len
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn find(&self, offset: u64) -> Option<&MapEntry> {
        // Binary search for the last entry whose logical_start <= offset.
        let idx = self.entries.partition_point(|e| e.logical_start <= offset);
        if idx == 0 {
            return None;
        }
        let e = &self.entries[idx - 1];
        if offset < e.logical_start + e.logical_len { Some(e) } else { None }
    }
}

impl ReadAt for MappingStream {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let Some(e) = self.find(offset) else {
            return Ok(0);
        };
        let within = offset - e.logical_start;
        let avail = e.logical_len - within;
        let want = (buf.len() as u64).min(avail) as usize;
        e.sub.read_at(e.sub_offset + within, &mut buf[..want])
    }

    fn size(&self) -> Option<u64> {
        Some(self.total_len)
    }
}

/// Rounds reads out to `block_size` and caches the single most recently
/// read block. A direct-mapped one-entry cache is sufficient here: callers
/// (DM thin, VSS) read blocks in increasing order almost always, and a miss
/// merely costs one extra inner read.
pub struct AlignedStream {
    inner: Arc<dyn ReadAt>,
    block_size: u64,
    size_hint: Option<u64>,
    cache: Mutex<Option<(u64, Vec<u8>)>>,
}

impl AlignedStream {
    pub fn new(inner: Arc<dyn ReadAt>, block_size: u64, size_hint: Option<u64>) -> Self {
        assert!(block_size.is_power_of_two(), "block_size must be a power of two");
        AlignedStream { inner, block_size, size_hint, cache: Mutex::new(None) }
    }

    fn read_block(&self, block: u64, dst: &mut [u8]) -> io::Result<()> {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((cached_block, data)) = cache.as_ref() {
            if *cached_block == block {
                dst.copy_from_slice(data);
                return Ok(());
            }
        }
        let mut buf = vec![0u8; self.block_size as usize];
        let n = self.inner.read_at(block * self.block_size, &mut buf)?;
        buf[n..].fill(0);
        dst.copy_from_slice(&buf);
        *cache = Some((block, buf));
        Ok(())
    }
}

impl ReadAt for AlignedStream {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(hint) = self.size_hint {
            if offset >= hint {
                return Ok(0);
            }
        }
        let mut produced = 0;
        let mut block_buf = vec![0u8; self.block_size as usize];
        while produced < buf.len() {
            let cur = offset + produced as u64;
            if let Some(hint) = self.size_hint {
                if cur >= hint {
                    break;
                }
            }
            let block = cur / self.block_size;
            let within = (cur % self.block_size) as usize;
            self.read_block(block, &mut block_buf)?;
            let avail = self.block_size as usize - within;
            let want = avail.min(buf.len() - produced);
            buf[produced..produced + want].copy_from_slice(&block_buf[within..within + want]);
            produced += want;
        }
        Ok(produced)
    }

    fn size(&self) -> Option<u64> {
        self.size_hint.or_else(|| self.inner.size())
    }
}

/// Wraps an already-opened `Read + Seek` stream — typically a nested
/// `VirtualDisk::open()` — back into a [`ReadAt`], so it can stand in for a
/// backing disk in an outer aggregation (Vinum's mirrored plexes, each a
/// `VirtualDisk` in its own right, composing into a RAID1 of plexes).
pub struct OpenedStream(Mutex<Box<dyn ReadSeek>>);

impl OpenedStream {
    pub fn new(inner: Box<dyn ReadSeek>) -> OpenedStream {
        OpenedStream(Mutex::new(inner))
    }
}

impl ReadAt for OpenedStream {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let mut guard = self.0.lock().unwrap_or_else(|e| e.into_inner());
        guard.seek(SeekFrom::Start(offset))?;
        read_fill(&mut **guard, buf)
    }
}

/// A `Read + Seek` adaptor over a [`ReadAt`], for the public `open()` return
/// type (`Box<dyn ReadSeek>`).
pub struct Cursor {
    inner: Arc<dyn ReadAt>,
    pos: u64,
    len: u64,
}

impl Cursor {
    pub fn new(inner: Arc<dyn ReadAt>, len: u64) -> Self {
        Cursor { inner, pos: 0, len }
    }
}

impl Read for Cursor {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read_at(self.pos, buf)?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for Cursor {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let new_pos = match pos {
            SeekFrom::Start(p) => p as i64,
            SeekFrom::End(d) => self.len as i64 + d,
            SeekFrom::Current(d) => self.pos as i64 + d,
        };
        if new_pos < 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "negative seek"));
        }
        self.pos = new_pos as u64;
        Ok(self.pos)
    }
}

/// The public handle returned by every `VirtualDisk::open()` /
/// `LogicalVolume::open()` call. `Send` so a nested volume (Vinum's mirror
/// plexes, LVM2's thin devices opened as a plain member disk) can be wrapped
/// back into a [`ReadAt`] source for a further layer of aggregation.
pub trait ReadSeek: Read + Seek + Send {}
impl<T: Read + Seek + Send> ReadSeek for T {}

pub fn open_range(inner: Arc<dyn ReadAt>, base: u64, len: u64) -> Result<Box<dyn ReadSeek>> {
    let range = Arc::new(RangeStream::new(inner, base, len));
    Ok(Box::new(Cursor::new(range, len)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor as IoCursor;

    fn shared(bytes: Vec<u8>) -> SharedStream {
        Arc::new(Mutex::new(IoCursor::new(bytes)))
    }

    #[test]
    fn shared_stream_read_at_is_offset_addressed() {
        let s = shared((0u8..32).collect());
        let mut buf = [0u8; 4];
        assert_eq!(s.read_at(10, &mut buf).unwrap(), 4);
        assert_eq!(buf, [10, 11, 12, 13]);
        // A later read_at at a different offset is unaffected by the prior
        // call's cursor motion.
        assert_eq!(s.read_at(0, &mut buf).unwrap(), 4);
        assert_eq!(buf, [0, 1, 2, 3]);
    }

    #[test]
    fn range_stream_clamps() {
        let s: Arc<dyn ReadAt> = shared((0u8..32).collect());
        let r = RangeStream::new(s, 8, 8);
        let mut buf = [0u8; 16];
        let n = r.read_at(0, &mut buf).unwrap();
        assert_eq!(n, 8);
        assert_eq!(&buf[..8], &(8u8..16).collect::<Vec<_>>()[..]);
        assert_eq!(r.read_at(8, &mut buf).unwrap(), 0);
    }

    #[test]
    fn mapping_stream_dispatches_to_covering_range() {
        let a: Arc<dyn ReadAt> = shared(vec![1u8; 16]);
        let b: Arc<dyn ReadAt> = shared(vec![2u8; 16]);
        let mut m = MappingStream::new();
        m.add(0, 16, a, 0);
        m.add(16, 16, b, 0);
        let mut buf = [0u8; 4];
        m.read_at(0, &mut buf).unwrap();
        assert_eq!(buf, [1, 1, 1, 1]);
        m.read_at(16, &mut buf).unwrap();
        assert_eq!(buf, [2, 2, 2, 2]);
        m.read_at(30, &mut buf).unwrap();
        assert_eq!(&buf[..2], &[2, 2]);
    }

    #[test]
    fn aligned_stream_rounds_and_caches() {
        let data: Vec<u8> = (0u8..=255).collect();
        let s: Arc<dyn ReadAt> = shared(data.clone());
        let a = AlignedStream::new(s, 16, None);
        let mut buf = [0u8; 5];
        a.read_at(14, &mut buf).unwrap();
        assert_eq!(buf, &data[14..19]);
    }

    #[test]
    fn aligned_stream_zero_fills_past_short_read_within_hint() {
        let s: Arc<dyn ReadAt> = shared(vec![0xAAu8; 8]);
        let a = AlignedStream::new(s, 16, Some(16));
        let mut buf = [0u8; 16];
        let n = a.read_at(0, &mut buf).unwrap();
        assert_eq!(n, 16);
        assert_eq!(&buf[..8], &[0xAA; 8]);
        assert_eq!(&buf[8..], &[0; 8]);
    }
}
