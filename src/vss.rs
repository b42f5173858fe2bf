//! Volume Shadow Copy Service snapshot reconstruction (best-effort).
//!
//! Ground truth: `original_source/dissect/volume/vss.py`, which the
//! upstream project itself marks `# This file is still a WIP`. This
//! family is partial and is not one of the other top-level entry points;
//! callers reach it directly through [`Vss::parse`].

use crate::error::{Error, Result, SchemeKind};
use crate::stream::{AlignedStream, Cursor, ReadAt, ReadSeek};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use uuid::Uuid;
use zerocopy::byteorder::little_endian::{U32 as LE_U32, U64 as LE_U64};
use zerocopy::{FromBytes, Immutable, KnownLayout, Unaligned};

const VSS_IDENTIFIER: [u8; 16] =
    [0x6b, 0x87, 0x08, 0x38, 0x76, 0xc1, 0x48, 0x4e, 0xb7, 0xae, 0x04, 0x04, 0x6e, 0x6c, 0xc7, 0x52];
const VOLUME_HEADER_OFFSET: u64 = 0x1E00;
const BLOCK_SIZE: u64 = 0x4000;
const CATALOG_ENTRY_SIZE: usize = 128;
const STORE_BLOCKLIST_ENTRY_SIZE: usize = 32;

const RECORD_TYPE_STORE_INDEX: u32 = 0x3;
const RECORD_TYPE_STORE_BITMAP: u32 = 0x6;

const BLOCK_FLAG_IS_FORWARDER: u32 = 0x1;
const BLOCK_FLAG_IS_OVERLAY: u32 = 0x2;
const BLOCK_FLAG_NOT_USED: u32 = 0x4;

#[derive(FromBytes, KnownLayout, Immutable, Unaligned, Clone)]
#[repr(C)]
struct VolumeHeaderRaw {
    identifier: [u8; 16],
    version: LE_U32,
    record_type: LE_U32,
    current_offset: LE_U64,
    unk0: LE_U64,
    unk1: LE_U64,
    catalog_offset: LE_U64,
    maximum_size: LE_U64,
    volume_identifier: [u8; 16],
    store_volume_identifier: [u8; 16],
    unk2: LE_U32,
    unk3: [u8; 412],
}

static_assertions::const_assert_eq!(std::mem::size_of::<VolumeHeaderRaw>(), 512);

/// The common prefix shared by `catalog_header` and `store_header`: both
/// lead with an identifier, version, record type, and the chaining offsets
/// that let a record's data span more than one `BLOCK_SIZE` block.
#[derive(FromBytes, KnownLayout, Immutable, Unaligned, Clone)]
#[repr(C)]
struct RecordHeaderRaw {
    identifier: [u8; 16],
    version: LE_U32,
    record_type: LE_U32,
    relative_offset: LE_U64,
    offset: LE_U64,
    next_offset: LE_U64,
}

static_assertions::const_assert_eq!(std::mem::size_of::<RecordHeaderRaw>(), 48);

#[derive(FromBytes, KnownLayout, Immutable, Unaligned, Clone)]
#[repr(C)]
struct BlockDescriptorRaw {
    original_offset: LE_U64,
    relative_offset: LE_U64,
    store_offset: LE_U64,
    flags: LE_U32,
    allocation_bitmap: LE_U32,
}

static_assertions::const_assert_eq!(std::mem::size_of::<BlockDescriptorRaw>(), 32);

fn read_record_block(volume: &Arc<dyn ReadAt>, offset: u64) -> Result<(RecordHeaderRaw, Vec<u8>)> {
    let mut block = vec![0u8; BLOCK_SIZE as usize];
    volume.read_at(offset, &mut block)?;
    if block[..16] != VSS_IDENTIFIER {
        return Err(Error::BadSignature {
            scheme: SchemeKind::Vss,
            detail: format!("invalid VSS identifier at offset 0x{offset:x}"),
        });
    }
    let header = RecordHeaderRaw::read_from_bytes(&block[..std::mem::size_of::<RecordHeaderRaw>()])
        .map_err(|_| Error::BadStructure { scheme: SchemeKind::Vss, detail: "truncated record header".into() })?;
    Ok((header, block[CATALOG_ENTRY_SIZE..].to_vec()))
}

/// Follows `next_offset` across as many `BLOCK_SIZE` blocks as the record
/// spans, concatenating each block's data region. Mirrors `read_block` in
/// the source (`volume_header` itself is read directly and never chains).
fn read_chained(volume: &Arc<dyn ReadAt>, offset: u64) -> Result<(RecordHeaderRaw, Vec<u8>)> {
    let (first, mut data) = read_record_block(volume, offset)?;
    let mut next = first.next_offset.get();
    while next != 0 {
        let (header, chunk) = read_record_block(volume, next)?;
        next = header.next_offset.get();
        data.extend_from_slice(&chunk);
    }
    Ok((first, data))
}

/// One `(original_offset, relative_offset, store_offset)` entry from a
/// store's block list, plus the overlay chained onto it by
/// [`BlockMap::add`] (shared, since the source mutates the same Python
/// object in both the forward and reverse maps).
#[derive(Clone)]
struct BlockDescriptor {
    original_offset: u64,
    relative_offset: u64,
    store_offset: u64,
    bitmap: u32,
    is_used: bool,
    is_overlay: bool,
    is_forwarder: bool,
    overlay: Option<Rc<RefCell<BlockDescriptor>>>,
}

impl BlockDescriptor {
    fn parse(raw: &[u8]) -> Result<BlockDescriptor> {
        let d = BlockDescriptorRaw::read_from_bytes(&raw[..std::mem::size_of::<BlockDescriptorRaw>()])
            .map_err(|_| Error::BadStructure { scheme: SchemeKind::Vss, detail: "truncated block descriptor".into() })?;
        let flags = d.flags.get();
        Ok(BlockDescriptor {
            original_offset: d.original_offset.get(),
            relative_offset: d.relative_offset.get(),
            store_offset: d.store_offset.get(),
            bitmap: d.allocation_bitmap.get(),
            is_used: flags & BLOCK_FLAG_NOT_USED == 0,
            is_overlay: flags & BLOCK_FLAG_IS_OVERLAY != 0,
            is_forwarder: flags & BLOCK_FLAG_IS_FORWARDER != 0,
            overlay: None,
        })
    }
}

/// Forward map (logical block -> descriptor) plus the reverse map (target
/// block of a forwarder -> the forwarder that points at it) used to resolve
/// `BlockMap.add`'s "does something already forward here" check.
#[derive(Default)]
struct BlockMap {
    map: HashMap<u64, Rc<RefCell<BlockDescriptor>>>,
    reverse: HashMap<u64, Rc<RefCell<BlockDescriptor>>>,
}

impl BlockMap {
    fn add(&mut self, mut descriptor: BlockDescriptor) {
        if !descriptor.is_used {
            return;
        }

        let key = descriptor.original_offset / BLOCK_SIZE;

        if !descriptor.is_overlay {
            let revkey = descriptor.relative_offset / BLOCK_SIZE;
            if let Some(revexist) = self.reverse.remove(&revkey) {
                descriptor.original_offset = revexist.borrow().relative_offset;
            }
        }

        if descriptor.is_forwarder && descriptor.original_offset == descriptor.relative_offset {
            return;
        }

        let descriptor = Rc::new(RefCell::new(descriptor));

        if let Some(existing) = self.map.get(&key).cloned() {
            if descriptor.borrow().is_overlay {
                let overlay_target =
                    if existing.borrow().is_overlay { Some(existing.clone()) } else { existing.borrow().overlay.clone() };
                match overlay_target {
                    Some(overlay) => overlay.borrow_mut().bitmap |= descriptor.borrow().bitmap,
                    None => existing.borrow_mut().overlay = Some(descriptor),
                }
                return;
            }

            let existing_overlay =
                if existing.borrow().is_overlay { Some(existing.clone()) } else { existing.borrow().overlay.clone() };
            descriptor.borrow_mut().overlay = existing_overlay;
        }

        if descriptor.borrow().is_forwarder {
            let revkey = descriptor.borrow().relative_offset / BLOCK_SIZE;
            self.reverse.insert(revkey, descriptor.clone());
        }

        self.map.insert(key, descriptor);
    }
}

/// A store's allocation bitmap: one bit per `BLOCK_SIZE` block, set when the
/// live volume (not this store) owns the block's data.
struct StoreBitmap {
    data: Vec<u8>,
}

impl StoreBitmap {
    fn parse(volume: &Arc<dyn ReadAt>, offset: u64) -> Result<StoreBitmap> {
        let (header, data) = read_chained(volume, offset)?;
        if header.record_type.get() != RECORD_TYPE_STORE_BITMAP {
            return Err(Error::BadStructure {
                scheme: SchemeKind::Vss,
                detail: format!("expected STORE_BITMAP record, got 0x{:x}", header.record_type.get()),
            });
        }
        Ok(StoreBitmap { data })
    }

    fn is_set(&self, block: u64) -> bool {
        let byte = (block / 8) as usize;
        byte < self.data.len() && (self.data[byte] & (1 << (block % 8))) != 0
    }

    fn in_use(&self, block: u64) -> bool {
        !self.is_set(block)
    }
}

/// One shadow-copy generation: its own block map plus bitmaps, chained to
/// the store created immediately after it.
pub struct Store {
    pub copy_identifier: Uuid,
    pub copy_set_identifier: Uuid,
    pub creation_time: u64,
    pub volume_size: u64,
    block_map: BlockMap,
    bitmap: StoreBitmap,
    previous_bitmap: Option<StoreBitmap>,
}

struct CatalogEntry2 {
    store_identifier: Uuid,
    volume_size: u64,
    creation_time: u64,
}

struct CatalogEntry3 {
    store_identifier: Uuid,
    store_block_list_offset: u64,
    store_header_offset: u64,
    store_bitmap_offset: u64,
    store_previous_bitmap_offset: u64,
}

fn parse_entry2(buf: &[u8]) -> CatalogEntry2 {
    CatalogEntry2 {
        volume_size: u64::from_le_bytes(buf[8..16].try_into().unwrap()),
        store_identifier: Uuid::from_bytes_le(buf[16..32].try_into().unwrap()),
        creation_time: u64::from_le_bytes(buf[48..56].try_into().unwrap()),
    }
}

fn parse_entry3(buf: &[u8]) -> CatalogEntry3 {
    CatalogEntry3 {
        store_block_list_offset: u64::from_le_bytes(buf[8..16].try_into().unwrap()),
        store_identifier: Uuid::from_bytes_le(buf[16..32].try_into().unwrap()),
        store_header_offset: u64::from_le_bytes(buf[32..40].try_into().unwrap()),
        store_bitmap_offset: u64::from_le_bytes(buf[48..56].try_into().unwrap()),
        store_previous_bitmap_offset: u64::from_le_bytes(buf[72..80].try_into().unwrap()),
    }
}

impl Store {
    fn parse(volume: &Arc<dyn ReadAt>, e2: &CatalogEntry2, e3: &CatalogEntry3) -> Result<Store> {
        // store_header (40-byte common prefix + its own tail, 128 bytes
        // total) is followed immediately, with no seek in between, by
        // store_information; read both in one shot.
        let mut head = vec![0u8; CATALOG_ENTRY_SIZE + 64];
        volume.read_at(e3.store_header_offset, &mut head)?;
        if head[..16] != VSS_IDENTIFIER {
            return Err(Error::BadSignature {
                scheme: SchemeKind::Vss,
                detail: "invalid VSS identifier in store header".into(),
            });
        }
        let info = &head[CATALOG_ENTRY_SIZE..];
        let copy_identifier = Uuid::from_bytes_le(info[16..32].try_into().unwrap());
        let copy_set_identifier = Uuid::from_bytes_le(info[32..48].try_into().unwrap());

        let (block_list_header, block_list_data) = read_chained(volume, e3.store_block_list_offset)?;
        if block_list_header.record_type.get() != RECORD_TYPE_STORE_INDEX {
            return Err(Error::BadStructure {
                scheme: SchemeKind::Vss,
                detail: format!("expected STORE_INDEX record, got 0x{:x}", block_list_header.record_type.get()),
            });
        }
        let mut block_map = BlockMap::default();
        for chunk in block_list_data.chunks(STORE_BLOCKLIST_ENTRY_SIZE) {
            if chunk.len() < STORE_BLOCKLIST_ENTRY_SIZE || chunk.iter().all(|b| *b == 0) {
                break;
            }
            block_map.add(BlockDescriptor::parse(chunk)?);
        }

        let bitmap = StoreBitmap::parse(volume, e3.store_bitmap_offset)?;
        let previous_bitmap = if e3.store_previous_bitmap_offset != 0 {
            Some(StoreBitmap::parse(volume, e3.store_previous_bitmap_offset)?)
        } else {
            None
        };

        Ok(Store {
            copy_identifier,
            copy_set_identifier,
            creation_time: e2.creation_time,
            volume_size: e2.volume_size,
            block_map,
            bitmap,
            previous_bitmap,
        })
    }
}

/// A parsed VSS container: the live volume's embedded catalog plus every
/// shadow-copy store it names, oldest first.
pub struct Vss {
    volume: Arc<dyn ReadAt>,
    pub volume_identifier: Uuid,
    pub store_volume_identifier: Uuid,
    pub stores: Vec<Store>,
}

impl Vss {
    pub fn parse(volume: Arc<dyn ReadAt>) -> Result<Arc<Vss>> {
        let mut header_buf = vec![0u8; std::mem::size_of::<VolumeHeaderRaw>()];
        volume.read_at(VOLUME_HEADER_OFFSET, &mut header_buf)?;
        let header = VolumeHeaderRaw::read_from_bytes(&header_buf[..])
            .map_err(|_| Error::BadStructure { scheme: SchemeKind::Vss, detail: "truncated volume header".into() })?;
        if header.identifier != VSS_IDENTIFIER {
            return Err(Error::BadSignature {
                scheme: SchemeKind::Vss,
                detail: format!("invalid VSS identifier (got {:02x?})", header.identifier),
            });
        }
        let catalog_offset = header.catalog_offset.get();
        if catalog_offset == 0 {
            return Err(Error::BadStructure { scheme: SchemeKind::Vss, detail: "catalog offset is 0".into() });
        }

        let (_catalog_header, catalog_data) = read_chained(&volume, catalog_offset)?;

        let mut by_store: HashMap<Uuid, (Option<CatalogEntry2>, Option<CatalogEntry3>)> = HashMap::new();
        for chunk in catalog_data.chunks(CATALOG_ENTRY_SIZE) {
            if chunk.len() < 8 {
                break;
            }
            match u64::from_le_bytes(chunk[..8].try_into().unwrap()) {
                0 => break,
                1 => {}
                2 => {
                    let e = parse_entry2(chunk);
                    by_store.entry(e.store_identifier).or_default().0 = Some(e);
                }
                3 => {
                    let e = parse_entry3(chunk);
                    by_store.entry(e.store_identifier).or_default().1 = Some(e);
                }
                other => {
                    return Err(Error::BadStructure {
                        scheme: SchemeKind::Vss,
                        detail: format!("invalid catalog entry type {other}"),
                    });
                }
            }
        }

        let mut stores = Vec::with_capacity(by_store.len());
        for (_id, (e2, e3)) in by_store {
            let (Some(e2), Some(e3)) = (e2, e3) else {
                return Err(Error::NotImplemented("VSS store with only one catalog descriptor".into()));
            };
            stores.push(Store::parse(&volume, &e2, &e3)?);
        }
        stores.sort_by_key(|s| s.creation_time);

        Ok(Arc::new(Vss {
            volume,
            volume_identifier: Uuid::from_bytes_le(header.volume_identifier),
            store_volume_identifier: Uuid::from_bytes_le(header.store_volume_identifier),
            stores,
        }))
    }

    fn next_store(&self, store_idx: usize) -> Option<usize> {
        (store_idx + 1 < self.stores.len()).then_some(store_idx + 1)
    }

    fn read_volume_block(&self, offset: u64) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; BLOCK_SIZE as usize];
        self.volume.read_at(offset, &mut buf)?;
        Ok(buf)
    }

    /// Resolves a store's block without the top-level overlay step (see
    /// `read_block`): forwarders recurse into the next store, a missing or
    /// overlay descriptor falls through to the next store or, at the end of
    /// the chain, to the bitmap/reverse-map decision the source makes
    /// between "sparse" (return zeros) and "read from the live volume".
    fn resolve(&self, store_idx: usize, block: u64) -> Result<Vec<u8>> {
        let store = &self.stores[store_idx];
        if let Some(d) = store.block_map.map.get(&block) {
            let (is_forwarder, is_overlay, relative_offset, store_offset) = {
                let dd = d.borrow();
                (dd.is_forwarder, dd.is_overlay, dd.relative_offset, dd.store_offset)
            };
            if is_forwarder {
                return match self.next_store(store_idx) {
                    Some(next) => self.resolve(next, relative_offset / BLOCK_SIZE),
                    None => self.read_volume_block(relative_offset),
                };
            }
            if !is_overlay {
                return self.read_volume_block(store_offset);
            }
            // overlay-only descriptor: fall through, same as "no descriptor".
        }

        match self.next_store(store_idx) {
            Some(next) => self.resolve(next, block),
            None => {
                if store.block_map.reverse.contains_key(&block) {
                    self.read_volume_block(block * BLOCK_SIZE)
                } else if store.bitmap.in_use(block) && store.previous_bitmap.as_ref().map_or(true, |pb| pb.in_use(block)) {
                    Ok(vec![0u8; BLOCK_SIZE as usize])
                } else {
                    self.read_volume_block(block * BLOCK_SIZE)
                }
            }
        }
    }

    /// The overlay step only ever applies at the outermost call: each
    /// recursive hop inside `resolve` rebinds "the active store" to its
    /// immediate caller, so the overlay comparison only ever holds true for
    /// the store the read was originally issued against.
    fn read_block(&self, store_idx: usize, block: u64) -> Result<Vec<u8>> {
        let mut buf = self.resolve(store_idx, block)?;

        if let Some(d) = self.stores[store_idx].block_map.map.get(&block) {
            let overlay = {
                let dd = d.borrow();
                if dd.is_overlay { Some(d.clone()) } else { dd.overlay.clone() }
            };
            if let Some(overlay) = overlay {
                let (bitmap, store_offset) = {
                    let ov = overlay.borrow();
                    (ov.bitmap, ov.store_offset)
                };
                for i in 0..32u64 {
                    if (bitmap >> i) & 1 == 1 {
                        let start = (i * 512) as usize;
                        self.volume.read_at(store_offset + i * 512, &mut buf[start..start + 512])?;
                    }
                }
            }
        }

        Ok(buf)
    }

    /// Opens one store (snapshot generation) as a seekable stream over its
    /// reconstructed volume contents.
    pub fn open(self: &Arc<Self>, store_idx: usize) -> Result<Box<dyn ReadSeek>> {
        let store = self.stores.get(store_idx).ok_or(Error::UnknownDevice(store_idx as u64))?;
        let size = store.volume_size;
        let source: Arc<dyn ReadAt> = Arc::new(StoreBlockSource { vss: self.clone(), store_idx });
        let aligned: Arc<dyn ReadAt> = Arc::new(AlignedStream::new(source, BLOCK_SIZE, Some(size)));
        Ok(Box::new(Cursor::new(aligned, size)))
    }
}

struct StoreBlockSource {
    vss: Arc<Vss>,
    store_idx: usize,
}

impl ReadAt for StoreBlockSource {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> std::io::Result<usize> {
        let block = offset / BLOCK_SIZE;
        let data = self.vss.read_block(self.store_idx, block).map_err(std::io::Error::other)?;
        let n = data.len().min(buf.len());
        buf[..n].copy_from_slice(&data[..n]);
        Ok(n)
    }

    fn size(&self) -> Option<u64> {
        Some(self.vss.stores[self.store_idx].volume_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor as IoCursor, Read};
    use std::sync::Mutex;

    fn shared(bytes: Vec<u8>) -> Arc<dyn ReadAt> {
        Arc::new(Mutex::new(IoCursor::new(bytes))) as crate::stream::SharedStream
    }

    fn record_header(record_type: u32, next_offset: u64) -> Vec<u8> {
        let mut buf = vec![0u8; CATALOG_ENTRY_SIZE];
        buf[..16].copy_from_slice(&VSS_IDENTIFIER);
        buf[20..24].copy_from_slice(&record_type.to_le_bytes());
        buf[32..40].copy_from_slice(&next_offset.to_le_bytes());
        buf
    }

    /// Builds a minimal single-store VSS image: one store whose block list
    /// is empty (so every read falls through to "read from the live
    /// volume"), which is enough to exercise the sparse/zero-fill and
    /// live-volume-fallback branches of `resolve` without a forwarder chain.
    fn synth_single_store_image(volume_size: u64) -> Vec<u8> {
        const BLOCK: usize = BLOCK_SIZE as usize;
        let mut image = vec![0u8; BLOCK * 8];

        // Volume header at 0x1E00, embedded in block 0.
        let mut vh = vec![0u8; std::mem::size_of::<VolumeHeaderRaw>()];
        vh[..16].copy_from_slice(&VSS_IDENTIFIER);
        vh[48..56].copy_from_slice(&(BLOCK as u64).to_le_bytes()); // catalog_offset -> block 1
        image[VOLUME_HEADER_OFFSET as usize..VOLUME_HEADER_OFFSET as usize + vh.len()].copy_from_slice(&vh);

        // Catalog at block 1: one catalog_entry_2 + one catalog_entry_3.
        let mut catalog = record_header(2, 0);
        let store_id = Uuid::from_bytes_le([7u8; 16]);
        let mut entry2 = vec![0u8; CATALOG_ENTRY_SIZE];
        entry2[..8].copy_from_slice(&2u64.to_le_bytes());
        entry2[8..16].copy_from_slice(&volume_size.to_le_bytes());
        entry2[16..32].copy_from_slice(&store_id.to_bytes_le());
        entry2[48..56].copy_from_slice(&100u64.to_le_bytes()); // creation_time

        let mut entry3 = vec![0u8; CATALOG_ENTRY_SIZE];
        entry3[..8].copy_from_slice(&3u64.to_le_bytes());
        entry3[8..16].copy_from_slice(&(3u64 * BLOCK as u64).to_le_bytes()); // block_list -> block 3
        entry3[16..32].copy_from_slice(&store_id.to_bytes_le());
        entry3[32..40].copy_from_slice(&(2u64 * BLOCK as u64).to_le_bytes()); // store_header -> block 2
        entry3[48..56].copy_from_slice(&(4u64 * BLOCK as u64).to_le_bytes()); // bitmap -> block 4
        // store_previous_bitmap_offset left 0 (no previous bitmap).

        catalog.extend_from_slice(&entry2);
        catalog.extend_from_slice(&entry3);
        image[BLOCK..BLOCK + catalog.len()].copy_from_slice(&catalog);

        // Store header + store_information at block 2.
        let mut store_hdr = record_header(4, 0);
        store_hdr.resize(CATALOG_ENTRY_SIZE + 64, 0);
        image[2 * BLOCK..2 * BLOCK + store_hdr.len()].copy_from_slice(&store_hdr);

        // Empty block list at block 3 (all-zero first entry -> stop).
        let block_list = record_header(RECORD_TYPE_STORE_INDEX, 0);
        image[3 * BLOCK..3 * BLOCK + block_list.len()].copy_from_slice(&block_list);

        // Bitmap at block 4: all bits zero => is_set false => in_use true
        // everywhere, so every block reads as sparse (zeros).
        let bitmap = record_header(RECORD_TYPE_STORE_BITMAP, 0);
        image[4 * BLOCK..4 * BLOCK + bitmap.len()].copy_from_slice(&bitmap);

        // Live volume data at block 5, distinguishable from zero.
        image[5 * BLOCK..6 * BLOCK].fill(0xCD);

        image
    }

    #[test]
    fn parses_header_and_single_store() {
        let image = synth_single_store_image(BLOCK_SIZE * 8);
        let vss = Vss::parse(shared(image)).unwrap();
        assert_eq!(vss.stores.len(), 1);
        assert_eq!(vss.stores[0].creation_time, 100);
    }

    #[test]
    fn block_with_no_descriptor_and_set_bitmap_reads_as_zero() {
        let image = synth_single_store_image(BLOCK_SIZE * 8);
        let vss = Vss::parse(shared(image)).unwrap();
        let mut out = vec![0u8; BLOCK_SIZE as usize];
        let n = vss.open(0).unwrap().read(&mut out).unwrap();
        assert_eq!(n, BLOCK_SIZE as usize);
        assert!(out.iter().all(|b| *b == 0));
    }

    #[test]
    fn unknown_store_index_errors() {
        let image = synth_single_store_image(BLOCK_SIZE * 8);
        let vss = Vss::parse(shared(image)).unwrap();
        assert!(matches!(vss.open(5), Err(Error::UnknownDevice(5))));
    }

    #[test]
    fn bad_identifier_is_rejected() {
        let image = vec![0u8; BLOCK_SIZE as usize * 2];
        assert!(matches!(Vss::parse(shared(image)), Err(Error::BadSignature { scheme: SchemeKind::Vss, .. })));
    }
}
