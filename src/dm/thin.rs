//! Device-mapper thin-provisioning pool and per-device address translation.
//!
//! Ground truth: `original_source/dissect/volume/dm/thin.py` and
//! `dm/c_dm.py`.

use crate::error::{Error, Result, SchemeKind};
use crate::stream::{AlignedStream, ReadAt};
use std::sync::Arc;
use zerocopy::byteorder::little_endian::{U32 as LE_U32, U64 as LE_U64};
use zerocopy::{FromBytes, Immutable, KnownLayout, Unaligned};

use super::{BTree, SECTOR_SIZE};

const THIN_SUPERBLOCK_MAGIC: u64 = 27022010;
const SPACE_MAP_ROOT_SIZE: usize = 128;

/// Little-endian on-disk superblock of a thin-provisioning metadata device.
#[derive(FromBytes, KnownLayout, Immutable, Unaligned, Debug)]
#[repr(C)]
struct ThinDiskSuperblockRaw {
    csum: LE_U32,
    flags: LE_U32,
    blocknr: LE_U64,
    uuid: [u8; 16],
    magic: LE_U64,
    version: LE_U32,
    time: LE_U32,
    trans_id: LE_U64,
    held_root: LE_U64,
    data_space_map_root: [u8; SPACE_MAP_ROOT_SIZE],
    metadata_space_map_root: [u8; SPACE_MAP_ROOT_SIZE],
    data_mapping_root: LE_U64,
    device_details_root: LE_U64,
    data_block_size: LE_U32,
    metadata_block_size: LE_U32,
    metadata_nr_blocks: LE_U64,
    compat_flags: LE_U32,
    compat_ro_flags: LE_U32,
    incompat_flags: LE_U32,
}

static_assertions::const_assert_eq!(std::mem::size_of::<ThinDiskSuperblockRaw>(), 364);

/// One `device_details` B-tree leaf value: `dev_id -> disk_device_details`.
#[derive(FromBytes, KnownLayout, Immutable, Unaligned, Debug)]
#[repr(C)]
struct DiskDeviceDetailsRaw {
    mapped_blocks: LE_U64,
    transaction_id: LE_U64,
    creation_time: LE_U32,
    snapshotted_time: LE_U32,
}

static_assertions::const_assert_eq!(std::mem::size_of::<DiskDeviceDetailsRaw>(), 24);

/// The parsed thin-pool metadata superblock plus its two B-trees.
pub struct Metadata {
    pub data_block_size: u32,
    pub metadata_block_size: u32,
    data_mapping: BTree,
    device_details: BTree,
}

impl Metadata {
    pub fn parse(source: Arc<dyn ReadAt>) -> Result<Metadata> {
        let mut buf = vec![0u8; std::mem::size_of::<ThinDiskSuperblockRaw>()];
        source.read_at(0, &mut buf)?;
        let sb = ThinDiskSuperblockRaw::read_from_bytes(&buf[..])
            .map_err(|_| Error::BadStructure { scheme: SchemeKind::Dm, detail: "truncated thin-pool superblock".into() })?;

        if sb.magic.get() != THIN_SUPERBLOCK_MAGIC {
            return Err(Error::BadSignature {
                scheme: SchemeKind::Dm,
                detail: format!("invalid magic 0x{:x} for thin-pool metadata superblock", sb.magic.get()),
            });
        }

        let metadata_block_size = sb.metadata_block_size.get();
        let data_mapping = BTree::new(source.clone(), sb.data_mapping_root.get(), metadata_block_size);
        let device_details = BTree::new(source, sb.device_details_root.get(), metadata_block_size);

        Ok(Metadata {
            data_block_size: sb.data_block_size.get(),
            metadata_block_size,
            data_mapping,
            device_details,
        })
    }
}

/// A metadata device plus the data device it maps into.
pub struct ThinPool {
    metadata: Metadata,
    data: Arc<dyn ReadAt>,
}

impl ThinPool {
    pub fn new(metadata_source: Arc<dyn ReadAt>, data: Arc<dyn ReadAt>) -> Result<ThinPool> {
        Ok(ThinPool { metadata: Metadata::parse(metadata_source)?, data })
    }

    /// Opens one thin logical device by its `dev_id` in the pool's
    /// `device_details` tree.
    pub fn open(self: &Arc<Self>, device_id: u64, size_hint: Option<u64>) -> Result<ThinDevice> {
        let details_buf = self
            .metadata
            .device_details
            .lookup(&[device_id], false)?
            .ok_or(Error::UnknownDevice(device_id))?;
        let details = DiskDeviceDetailsRaw::read_from_bytes(&details_buf[..std::mem::size_of::<DiskDeviceDetailsRaw>()])
            .map_err(|_| Error::BadStructure { scheme: SchemeKind::Dm, detail: "truncated disk_device_details".into() })?;

        let block_size = self.metadata.data_block_size as u64 * SECTOR_SIZE;
        let pool = self.clone();
        let inner: Arc<dyn ReadAt> = Arc::new(ThinBlockMap { pool, device_id, block_size });

        Ok(ThinDevice {
            mapped_blocks: details.mapped_blocks.get(),
            stream: AlignedStream::new(inner, block_size, size_hint),
        })
    }
}

/// Resolves `(device_id, logical block)` to a byte range of the pool's data
/// device through the 2-level `data_mapping` B-tree, one block at a time.
/// Wrapped in an [`AlignedStream`] so short/missing mappings read as zeros
/// within `size_hint`, matching `ThinDevice._read`'s break-on-unmapped loop.
struct ThinBlockMap {
    pool: Arc<ThinPool>,
    device_id: u64,
    block_size: u64,
}

impl ReadAt for ThinBlockMap {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> std::io::Result<usize> {
        let block = offset / self.block_size;
        let within = (offset % self.block_size) as usize;

        let Some(block_info) = self
            .pool
            .metadata
            .data_mapping
            .lookup(&[self.device_id, block], false)
            .map_err(std::io::Error::other)?
        else {
            return Ok(0);
        };

        let mut le = [0u8; 8];
        le[..block_info.len().min(8)].copy_from_slice(&block_info[..block_info.len().min(8)]);
        let block_time = u64::from_le_bytes(le);
        let (data_block, _time) = unpack_block_time(block_time);

        let data_offset = data_block * self.block_size + within as u64;
        let want = buf.len().min(self.block_size as usize - within);
        self.pool.data.read_at(data_offset, &mut buf[..want])
    }
}

fn unpack_block_time(block_time: u64) -> (u64, u32) {
    (block_time >> 24, (block_time & ((1 << 24) - 1)) as u32)
}

/// One thin logical device's readable address space.
pub struct ThinDevice {
    pub mapped_blocks: u64,
    stream: AlignedStream,
}

impl ReadAt for ThinDevice {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> std::io::Result<usize> {
        self.stream.read_at(offset, buf)
    }

    fn size(&self) -> Option<u64> {
        self.stream.size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor as IoCursor;
    use std::sync::Mutex;

    fn shared(bytes: Vec<u8>) -> Arc<dyn ReadAt> {
        Arc::new(Mutex::new(IoCursor::new(bytes))) as crate::stream::SharedStream
    }

    fn leaf_node(entries: &[(u64, Vec<u8>)], value_size: u32, block_size: usize) -> Vec<u8> {
        let mut buf = vec![0u8; block_size];
        buf[4..8].copy_from_slice(&2u32.to_le_bytes()); // LEAF_NODE
        buf[16..20].copy_from_slice(&(entries.len() as u32).to_le_bytes());
        let max_entries = ((block_size - 32) as u64 / (8 + value_size as u64)) as u32;
        buf[20..24].copy_from_slice(&max_entries.to_le_bytes());
        buf[24..28].copy_from_slice(&value_size.to_le_bytes());

        let key_area = 32;
        let value_area = key_area + max_entries as usize * 8;
        for (i, (key, value)) in entries.iter().enumerate() {
            buf[key_area + i * 8..key_area + i * 8 + 8].copy_from_slice(&key.to_le_bytes());
            buf[value_area + i * value_size as usize..value_area + i * value_size as usize + value.len()]
                .copy_from_slice(value);
        }
        buf
    }

    fn synth_pool(data_block_id: u64, dev_id: u64, logical_block: u64, mapped_blocks: u64) -> (Arc<dyn ReadAt>, Arc<dyn ReadAt>) {
        const BLOCK: usize = 4096;
        // The data_mapping tree is two levels: a top leaf keyed by dev_id
        // whose value is the *block number* of that device's own leaf,
        // keyed by logical block, whose value is the block_time.
        let leaf_block_time = (data_block_id << 24) | 0u64;
        let per_device_leaf = leaf_node(&[(logical_block, leaf_block_time.to_le_bytes().to_vec())], 8, BLOCK);
        let top_leaf = leaf_node(&[(dev_id, 3u64.to_le_bytes().to_vec())], 8, BLOCK);

        let details = DiskDeviceDetailsRaw::new_zeroed_for_test(mapped_blocks);
        let details_leaf = leaf_node(&[(dev_id, details)], 24, BLOCK);

        let mut metadata_image = vec![0u8; BLOCK * 4];
        let sb_len = std::mem::size_of::<ThinDiskSuperblockRaw>();
        let mut sb = vec![0u8; sb_len];
        sb[32..40].copy_from_slice(&THIN_SUPERBLOCK_MAGIC.to_le_bytes());
        // data_mapping_root points at block 1 (top_leaf), device_details_root at block 2
        sb[320..328].copy_from_slice(&1u64.to_le_bytes());
        sb[328..336].copy_from_slice(&2u64.to_le_bytes());
        sb[336..340].copy_from_slice(&8u32.to_le_bytes()); // data_block_size (sectors)
        sb[340..344].copy_from_slice(&8u32.to_le_bytes()); // metadata_block_size (sectors)
        metadata_image[..sb_len].copy_from_slice(&sb);
        metadata_image[BLOCK..BLOCK * 2].copy_from_slice(&top_leaf);
        metadata_image[BLOCK * 2..BLOCK * 3].copy_from_slice(&details_leaf);
        metadata_image[BLOCK * 3..BLOCK * 4].copy_from_slice(&per_device_leaf);

        let data_image = vec![0xABu8; BLOCK * 16];

        (shared(metadata_image), shared(data_image))
    }

    impl DiskDeviceDetailsRaw {
        fn new_zeroed_for_test(mapped_blocks: u64) -> Vec<u8> {
            let mut buf = vec![0u8; 24];
            buf[0..8].copy_from_slice(&mapped_blocks.to_le_bytes());
            buf
        }
    }

    #[test]
    fn unpack_block_time_splits_high_and_low_bits() {
        let (block, time) = unpack_block_time((5u64 << 24) | 42);
        assert_eq!(block, 5);
        assert_eq!(time, 42);
    }

    #[test]
    fn opens_known_device_and_reads_mapped_block() {
        let (metadata, data) = synth_pool(3, 7, 0, 1);
        let pool = Arc::new(ThinPool::new(metadata, data).unwrap());
        let device = pool.open(7, Some(4096)).unwrap();

        let mut buf = [0u8; 4096];
        let n = device.read_at(0, &mut buf).unwrap();
        assert_eq!(n, 4096);
        assert_eq!(buf, [0xABu8; 4096]);
    }

    #[test]
    fn unknown_device_id_errors() {
        let (metadata, data) = synth_pool(3, 7, 0, 1);
        let pool = Arc::new(ThinPool::new(metadata, data).unwrap());
        assert!(matches!(pool.open(99, None), Err(Error::UnknownDevice(99))));
    }
}
