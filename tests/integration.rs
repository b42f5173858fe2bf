//! End-to-end scenarios driving the crate purely through its public API:
//! a device-mapper thin pool with two logical devices, and a disk whose
//! GPT only resolves once the caller passes the right sector size.

use std::io::Cursor as IoCursor;
use std::sync::{Arc, Mutex};
use volread::dm::ThinPool;
use volread::stream::{ReadAt, SharedStream};
use volread::{identify_disk, Config, Error, PartitionType};

fn shared(bytes: Vec<u8>) -> Arc<dyn ReadAt> {
    Arc::new(Mutex::new(IoCursor::new(bytes))) as SharedStream
}

/// `block_time` value packing a thin-pool data block id with a zero time,
/// the on-disk encoding `data_mapping` leaf values use.
fn block_time(data_block: u64) -> [u8; 8] {
    (data_block << 24).to_le_bytes()
}

/// One `dm/btree.rs` leaf node: a header plus `entries`, each `(key,
/// value_bytes)`, padded to `value_size` per slot.
fn leaf_node(entries: &[(u64, Vec<u8>)], value_size: u32, block_size: usize) -> Vec<u8> {
    let mut buf = vec![0u8; block_size];
    buf[4..8].copy_from_slice(&2u32.to_le_bytes()); // LEAF_NODE flag
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

/// Builds a two-device thin pool: device 0 maps logical blocks `0..count`
/// onto data blocks `0..count`, device 1 onto `count..2*count`. Each data
/// block `k` holds the standard test payload (`uint16_le(k)` repeated to
/// fill the block).
fn synth_thin_pool(count: u64) -> (Arc<dyn ReadAt>, Arc<dyn ReadAt>) {
    const BLOCK: usize = 4096;

    let dev0_entries: Vec<_> = (0..count).map(|i| (i, block_time(i).to_vec())).collect();
    let dev1_entries: Vec<_> = (0..count).map(|i| (i, block_time(count + i).to_vec())).collect();
    let dev0_leaf = leaf_node(&dev0_entries, 8, BLOCK);
    let dev1_leaf = leaf_node(&dev1_entries, 8, BLOCK);
    let top_leaf = leaf_node(&[(0u64, 3u64.to_le_bytes().to_vec()), (1u64, 4u64.to_le_bytes().to_vec())], 8, BLOCK);

    let mut details0 = vec![0u8; 24];
    details0[0..8].copy_from_slice(&count.to_le_bytes());
    let mut details1 = vec![0u8; 24];
    details1[0..8].copy_from_slice(&count.to_le_bytes());
    let details_leaf = leaf_node(&[(0u64, details0), (1u64, details1)], 24, BLOCK);

    let mut metadata = vec![0u8; BLOCK * 5];
    let mut sb = vec![0u8; 364];
    sb[32..40].copy_from_slice(&27022010u64.to_le_bytes()); // THIN_SUPERBLOCK_MAGIC
    sb[320..328].copy_from_slice(&1u64.to_le_bytes()); // data_mapping_root -> block 1 (top_leaf)
    sb[328..336].copy_from_slice(&2u64.to_le_bytes()); // device_details_root -> block 2
    sb[336..340].copy_from_slice(&8u32.to_le_bytes()); // data_block_size (sectors, 512B each -> 4096B blocks)
    sb[340..344].copy_from_slice(&8u32.to_le_bytes()); // metadata_block_size (sectors)
    metadata[..sb.len()].copy_from_slice(&sb);
    metadata[BLOCK..BLOCK * 2].copy_from_slice(&top_leaf);
    metadata[BLOCK * 2..BLOCK * 3].copy_from_slice(&details_leaf);
    metadata[BLOCK * 3..BLOCK * 4].copy_from_slice(&dev0_leaf);
    metadata[BLOCK * 4..BLOCK * 5].copy_from_slice(&dev1_leaf);

    let mut data = vec![0u8; BLOCK * (2 * count as usize)];
    for k in 0..2 * count {
        let payload: Vec<u8> = (k as u16).to_le_bytes().repeat(BLOCK / 2);
        data[k as usize * BLOCK..(k as usize + 1) * BLOCK].copy_from_slice(&payload);
    }

    (shared(metadata), shared(data))
}

#[test]
fn thin_pool_two_devices_read_their_mapped_blocks_and_reject_unknown_ids() {
    let (metadata, data) = synth_thin_pool(4);
    let pool = Arc::new(ThinPool::new(metadata, data).unwrap());

    for dev_id in [0u64, 1u64] {
        let device = pool.open(dev_id, Some(4 * 4096)).unwrap();
        for logical_block in 0..4u64 {
            let mut buf = [0u8; 4096];
            let n = device.read_at(logical_block * 4096, &mut buf).unwrap();
            assert_eq!(n, 4096);
            let expected_data_block = dev_id * 4 + logical_block;
            let expected: Vec<u8> = (expected_data_block as u16).to_le_bytes().repeat(2048);
            assert_eq!(&buf[..], &expected[..]);
        }
    }

    assert!(matches!(pool.open(2, None), Err(Error::UnknownDevice(2))));
}

/// Places a protective MBR at sector 0 and a GPT header/partition array at
/// byte offsets consistent with 4096-byte sectors. Identifying with the
/// wrong (512) sector size must fail with a sector-size hint; identifying
/// with the right size must enumerate all three partitions.
fn synth_gpt_image_4k() -> Vec<u8> {
    let mut buf = vec![0u8; 64 * 1024];

    // Protective MBR.
    buf[510] = 0x55;
    buf[511] = 0xAA;
    let entry = 0x1be;
    buf[entry + 4] = 0xEE; // type: GPT protective
    buf[entry + 8..entry + 12].copy_from_slice(&1u32.to_le_bytes()); // sector_ofs
    buf[entry + 12..entry + 16].copy_from_slice(&0xFFFF_FFFFu32.to_le_bytes()); // sector_size (unused by GPT path)

    // GPT header at byte 4096 (sector 1 at 4096-byte sectors).
    let hdr = 4096usize;
    buf[hdr..hdr + 8].copy_from_slice(b"EFI PART");
    buf[hdr + 72..hdr + 80].copy_from_slice(&2u64.to_le_bytes()); // lba_partition_array (sector units)
    buf[hdr + 80..hdr + 84].copy_from_slice(&4u32.to_le_bytes()); // partition_table_count
    buf[hdr + 84..hdr + 88].copy_from_slice(&128u32.to_le_bytes()); // partition_entry_size

    // Partition array at byte 8192 (sector 2), three live entries + one
    // all-zero terminator.
    let array = 8192usize;
    let entries = [(3u64, 4u64, "P1"), (5, 6, "P2"), (7, 8, "P3")];
    for (i, (first, last, name)) in entries.iter().enumerate() {
        let base = array + i * 128;
        buf[base] = 0x11; // non-zero type_guid byte, just needs to be present
        buf[base + 32..base + 40].copy_from_slice(&first.to_le_bytes());
        buf[base + 40..base + 48].copy_from_slice(&last.to_le_bytes());
        let name_utf16: Vec<u8> = name.encode_utf16().flat_map(u16::to_le_bytes).collect();
        buf[base + 56..base + 56 + name_utf16.len()].copy_from_slice(&name_utf16);
    }

    buf
}

#[test]
fn gpt_identification_requires_the_matching_sector_size() {
    let image = synth_gpt_image_4k();

    let wrong = identify_disk(shared(image.clone()), &Config::with_sector_size(512));
    assert!(matches!(wrong, Err(Error::PossibleSectorSizeMismatch(_))));

    let disk = identify_disk(shared(image), &Config::with_sector_size(4096)).unwrap();
    assert_eq!(disk.partitions.len(), 3);
    for (partition, expected_first) in disk.partitions.iter().zip([3u64, 5, 7]) {
        assert!(matches!(partition.vtype, PartitionType::Gpt(_)));
        assert_eq!(partition.offset, expected_first * 4096);
    }
}
