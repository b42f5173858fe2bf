//! Linux MD superblock decoders (0.90 and 1.x).
//!
//! Ground truth: `original_source/dissect/volume/md/c_md.py` (cstruct
//! layout) and `original_source/dissect/volume/md/md.py` (aggregation).

use crate::error::{Error, Result, SchemeKind};
use crate::raid::{Configuration, DiskMap, Level, PhysicalDisk, Raid, VirtualDisk};
use crate::stream::ReadAt;
use std::sync::Arc;
use uuid::Uuid;
use zerocopy::byteorder::little_endian::{I32 as LE_I32, U16 as LE_U16, U32 as LE_U32, U64 as LE_U64};
use zerocopy::{FromBytes, Immutable, KnownLayout, Unaligned};

const SECTOR_SIZE: u64 = 512;
const MD_SB_MAGIC: u32 = 0xa92b4efc;
const MD_RESERVED_SECTORS: u64 = (64 * 1024) / SECTOR_SIZE;
const MD_DISK_ROLE_JOURNAL: u16 = 0xfffd;
const MD_DISK_ROLE_MAX: u16 = 0xff00;

/// Fixed 256-byte header of `mdp_superblock_1`; `dev_roles[max_dev]`
/// follows immediately as a `u16` LE array.
#[derive(FromBytes, KnownLayout, Immutable, Unaligned, Debug)]
#[repr(C)]
struct Superblock1Header {
    magic: LE_U32,
    major_version: LE_U32,
    feature_map: LE_U32,
    pad0: LE_U32,
    set_uuid: [u8; 16],
    set_name: [u8; 32],
    ctime: LE_U64,
    level: LE_I32,
    layout: LE_U32,
    size: LE_U64,
    chunksize: LE_U32,
    raid_disks: LE_U32,
    bitmap_offset_or_ppl: LE_U32,
    new_level: LE_U32,
    reshape_position: LE_U64,
    delta_disks: LE_U32,
    new_layout: LE_U32,
    new_chunk: LE_U32,
    new_offset: LE_U32,
    data_offset: LE_U64,
    data_size: LE_U64,
    super_offset: LE_U64,
    recovery_offset_or_journal_tail: LE_U64,
    dev_number: LE_U32,
    cnt_corrected_read: LE_U32,
    device_uuid: [u8; 16],
    devflags: u8,
    bblog_shift: u8,
    bblog_size: LE_U16,
    bblog_offset: LE_I32,
    utime: LE_U64,
    events: LE_U64,
    resync_offset: LE_U64,
    sb_csum: LE_U32,
    max_dev: LE_U32,
    pad3: [u8; 32],
}

static_assertions::const_assert_eq!(std::mem::size_of::<Superblock1Header>(), 256);

/// `mdp_disk_t`: one 32-word (128-byte) device descriptor entry, repeated
/// 27 times plus once more for `this_disk` in `mdp_super_t`.
#[derive(FromBytes, KnownLayout, Immutable, Unaligned, Clone, Copy, Debug)]
#[repr(C)]
struct DiskDescriptor90 {
    number: LE_U32,
    major: LE_U32,
    minor: LE_U32,
    raid_disk: LE_U32,
    state: LE_U32,
    reserved: [LE_U32; 27],
}

static_assertions::const_assert_eq!(std::mem::size_of::<DiskDescriptor90>(), 128);

/// The full 4096-byte `mdp_super_t` (MD 0.90) layout.
#[derive(FromBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
struct Superblock90 {
    md_magic: LE_U32,
    major_version: LE_U32,
    minor_version: LE_U32,
    patch_version: LE_U32,
    gvalid_words: LE_U32,
    set_uuid0: [u8; 4],
    ctime: LE_U32,
    level: LE_U32,
    size: LE_U32,
    nr_disks: LE_U32,
    raid_disks: LE_U32,
    md_minor: LE_U32,
    not_persistent: LE_U32,
    set_uuid1: [u8; 4],
    set_uuid2: [u8; 4],
    set_uuid3: [u8; 4],
    gstate_creserved: [LE_U32; 16],

    utime: LE_U32,
    state: LE_U32,
    active_disks: LE_U32,
    working_disks: LE_U32,
    failed_disks: LE_U32,
    spare_disks: LE_U32,
    sb_csum: LE_U32,
    events_lo: LE_U32,
    events_hi: LE_U32,
    cp_events_lo: LE_U32,
    cp_events_hi: LE_U32,
    recovery_cp: LE_U32,
    reshape_position: LE_U64,
    new_level: LE_U32,
    delta_disks: LE_U32,
    new_layout: LE_U32,
    new_chunk: LE_U32,
    gstate_sreserved: [LE_U32; 14],

    layout: LE_U32,
    chunk_size: LE_U32,
    root_pv: LE_U32,
    root_block: LE_U32,
    pstate_reserved: [LE_U32; 60],

    disks: [DiskDescriptor90; 27],

    this_disk: DiskDescriptor90,
}

static_assertions::const_assert_eq!(std::mem::size_of::<Superblock90>(), 4096);

enum RawSuperblock {
    V1 { header: Superblock1Header, dev_roles: Vec<u16> },
    V90(Superblock90),
}

/// One physical disk's parsed MD superblock plus the owning `PhysicalDisk`
/// handle.
pub struct MdPhysicalDisk {
    pub set_uuid: Uuid,
    pub set_name: Option<String>,
    pub events: u64,
    pub level: Level,
    pub layout: u32,
    pub chunk_size: u64,
    pub raid_disks: u32,
    pub data_offset: u64,
    pub data_size: u64,
    /// Component-device size in bytes, from the superblock's own `size`
    /// field (distinct from `data_size`, the usable-for-data region).
    /// `VirtualDisk.size` for RAID1/4/5/6/10 is derived from this, not
    /// from `data_size`.
    pub component_size: u64,
    pub dev_number: u32,
    pub raid_disk: Option<u32>,
    pub disk: Arc<PhysicalDisk>,
}

fn level_from_raw(v: i32) -> Result<Level> {
    Level::from_i32(v)
        .ok_or_else(|| Error::BadStructure { scheme: SchemeKind::Md, detail: format!("unknown level {v}") })
}

fn find_superblock(source: &Arc<dyn ReadAt>) -> Result<(u64, u32)> {
    let size_sectors = source
        .size()
        .ok_or_else(|| Error::BadStructure { scheme: SchemeKind::Md, detail: "stream has no known size".into() })?
        / SECTOR_SIZE;

    let candidates = [
        (size_sectors & !(MD_RESERVED_SECTORS - 1)).wrapping_sub(MD_RESERVED_SECTORS),
        size_sectors.saturating_sub(8 * 2),
        0,
        8,
    ];

    for offset in candidates {
        let mut peek = [0u8; 12];
        if source.read_at(offset * SECTOR_SIZE, &mut peek).unwrap_or(0) != 12 {
            continue;
        }
        let magic = u32::from_le_bytes(peek[0..4].try_into().unwrap());
        let major = u32::from_le_bytes(peek[4..8].try_into().unwrap());
        if magic == MD_SB_MAGIC {
            return Ok((offset, major));
        }
    }

    Err(Error::BadSignature { scheme: SchemeKind::Md, detail: "no MD_SB_MAGIC found at any candidate offset".into() })
}

impl MdPhysicalDisk {
    pub fn parse(source: Arc<dyn ReadAt>) -> Result<MdPhysicalDisk> {
        let (sb_offset, major) = find_superblock(&source)?;
        let byte_offset = sb_offset * SECTOR_SIZE;

        let raw = match major {
            1 => {
                let mut header_bytes = vec![0u8; std::mem::size_of::<Superblock1Header>()];
                source.read_at(byte_offset, &mut header_bytes)?;
                let header = Superblock1Header::read_from_bytes(&header_bytes[..])
                    .map_err(|_| Error::BadStructure { scheme: SchemeKind::Md, detail: "short v1 header".into() })?;
                let max_dev = header.max_dev.get() as usize;
                let mut roles_bytes = vec![0u8; max_dev * 2];
                source.read_at(byte_offset + header_bytes.len() as u64, &mut roles_bytes)?;
                let dev_roles = roles_bytes.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect();
                RawSuperblock::V1 { header, dev_roles }
            }
            0 => {
                let mut bytes = vec![0u8; std::mem::size_of::<Superblock90>()];
                source.read_at(byte_offset, &mut bytes)?;
                let sb = Superblock90::read_from_bytes(&bytes[..])
                    .map_err(|_| Error::BadStructure { scheme: SchemeKind::Md, detail: "short 0.90 superblock".into() })?;
                RawSuperblock::V90(sb)
            }
            other => {
                return Err(Error::BadStructure {
                    scheme: SchemeKind::Md,
                    detail: format!("unsupported MD major version {other}"),
                });
            }
        };

        let (set_uuid, set_name, events, level, layout, chunk_size, raid_disks, data_offset, data_size, component_size, dev_number, raid_disk) =
            match &raw {
                RawSuperblock::V1 { header, dev_roles } => {
                    let mut uuid_bytes = [0u8; 16];
                    uuid_bytes.copy_from_slice(&header.set_uuid);
                    let set_uuid = Uuid::from_bytes_le(uuid_bytes);

                    let name_end = header.set_name.iter().position(|&b| b == 0).unwrap_or(header.set_name.len());
                    let set_name = String::from_utf8_lossy(&header.set_name[..name_end]).into_owned();

                    let dev_number = header.dev_number.get();
                    let role = dev_roles.get(dev_number as usize).copied();
                    let raid_disk = match role {
                        Some(MD_DISK_ROLE_JOURNAL) => Some(0),
                        Some(r) if r <= MD_DISK_ROLE_MAX => Some(r as u32),
                        _ => None,
                    };

                    (
                        set_uuid,
                        Some(set_name),
                        header.events.get(),
                        level_from_raw(header.level.get())?,
                        header.layout.get(),
                        header.chunksize.get() as u64 * SECTOR_SIZE,
                        header.raid_disks.get(),
                        header.data_offset.get(),
                        header.data_size.get(),
                        header.size.get(),
                        dev_number,
                        raid_disk,
                    )
                }
                RawSuperblock::V90(sb) => {
                    let mut bytes = Vec::with_capacity(16);
                    bytes.extend_from_slice(&sb.set_uuid0);
                    bytes.extend_from_slice(&sb.set_uuid1);
                    bytes.extend_from_slice(&sb.set_uuid2);
                    bytes.extend_from_slice(&sb.set_uuid3);
                    let mut uuid_bytes = [0u8; 16];
                    uuid_bytes.copy_from_slice(&bytes);
                    let set_uuid = Uuid::from_bytes_le(uuid_bytes);

                    let events = ((sb.events_hi.get() as u64) << 32) | sb.events_lo.get() as u64;
                    let chunk_size = sb.chunk_size.get() as u64;
                    let dev_number = sb.this_disk.number.get();
                    let raid_disk = sb.disks.get(dev_number as usize).map(|d| d.raid_disk.get());

                    (
                        set_uuid,
                        None,
                        events,
                        level_from_raw(sb.level.get() as i32)?,
                        sb.layout.get(),
                        chunk_size,
                        sb.raid_disks.get(),
                        0,
                        sb_offset,
                        sb.size.get() as u64,
                        dev_number,
                        raid_disk,
                    )
                }
            };

        let (data_offset_bytes, data_size_bytes) = (data_offset * SECTOR_SIZE, data_size * SECTOR_SIZE);
        let component_size_bytes = component_size * SECTOR_SIZE;
        let disk = Arc::new(PhysicalDisk::new(source, data_offset_bytes, data_size_bytes));

        Ok(MdPhysicalDisk {
            set_uuid,
            set_name,
            events,
            level,
            layout,
            chunk_size,
            raid_disks,
            data_offset: data_offset_bytes,
            data_size: data_size_bytes,
            component_size: component_size_bytes,
            dev_number,
            raid_disk,
            disk,
        })
    }
}

/// Aggregates MD disks into `Configuration`s, grouped by `set_uuid`,
/// selecting the highest-`events` disk as the reference.
pub fn open_md(sources: Vec<Arc<dyn ReadAt>>) -> Result<Raid> {
    let mut by_set: std::collections::BTreeMap<Uuid, Vec<MdPhysicalDisk>> = std::collections::BTreeMap::new();
    let mut errors = Vec::new();

    for source in sources {
        match MdPhysicalDisk::parse(source) {
            Ok(disk) => by_set.entry(disk.set_uuid).or_default().push(disk),
            Err(e) => {
                log::debug!("MD superblock parse failed: {e}");
                errors.push((SchemeKind::Md, e));
            }
        }
    }

    if by_set.is_empty() {
        return Err(Error::NoSchemeMatched(errors));
    }

    let mut configurations = Vec::new();
    for (set_uuid, disks) in by_set {
        log::debug!("MD set {set_uuid} has {} member disk(s)", disks.len());
        configurations.push(build_configuration(set_uuid, disks)?);
    }

    Ok(Raid { configurations })
}

fn build_configuration(set_uuid: Uuid, disks: Vec<MdPhysicalDisk>) -> Result<Configuration> {
    let reference = disks.iter().max_by_key(|d| d.events).expect("non-empty set");
    log::debug!(
        "MD set {set_uuid}: reference disk dev_number={} with events={} ({:?}, layout={})",
        reference.dev_number,
        reference.events,
        reference.level,
        reference.layout
    );

    let mut disk_map: DiskMap = DiskMap::new();
    let mut physical_disks = Vec::new();
    for disk in &disks {
        physical_disks.push(disk.disk.clone());
        if let Some(role) = disk.raid_disk {
            disk_map.insert(role, (0, disk.disk.clone()));
        }
    }

    let size = match reference.level {
        Level::Linear => disk_map.values().map(|(_, d)| d.size()).sum(),
        Level::Raid0 => disk_map
            .values()
            .map(|(_, d)| d.size() & !(reference.chunk_size.max(1) - 1))
            .sum(),
        Level::Raid1 | Level::Raid4 | Level::Raid5 | Level::Raid6 | Level::Raid10 => reference.component_size,
        other => {
            return Err(Error::InvalidLayout(format!("no valid RAID level found for MD reference disk: {other:?}")));
        }
    };

    let virtual_disk = VirtualDisk {
        name: reference.set_name.clone().unwrap_or_default(),
        uuid: set_uuid,
        size,
        level: reference.level,
        layout: reference.layout,
        stripe_size: reference.chunk_size,
        num_disks: reference.raid_disks,
        disk_map,
    };

    Ok(Configuration { set_uuid, physical_disks, virtual_disks: vec![virtual_disk] })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor as IoCursor;
    use std::sync::Mutex;

    /// Builds a 256-byte `mdp_superblock_1` header (plus a one-entry
    /// `dev_roles` tail) with `size` and `data_size` as distinct fields, so
    /// tests can catch code that conflates the two.
    #[allow(clippy::too_many_arguments)]
    fn synth_v1_superblock(
        set_uuid: [u8; 16],
        events: u64,
        raid_disk: u16,
        raid_disks: u32,
        level: i32,
        layout: u32,
        chunk_sectors: u32,
        size_sectors: u64,
        data_size_sectors: u64,
    ) -> Vec<u8> {
        let mut buf = vec![0u8; 256];
        buf[0..4].copy_from_slice(&MD_SB_MAGIC.to_le_bytes());
        buf[4..8].copy_from_slice(&1u32.to_le_bytes());
        buf[16..32].copy_from_slice(&set_uuid);
        buf[72..76].copy_from_slice(&level.to_le_bytes());
        buf[76..80].copy_from_slice(&layout.to_le_bytes());
        buf[80..88].copy_from_slice(&size_sectors.to_le_bytes());
        buf[88..92].copy_from_slice(&chunk_sectors.to_le_bytes());
        buf[92..96].copy_from_slice(&raid_disks.to_le_bytes());
        buf[128..136].copy_from_slice(&0u64.to_le_bytes()); // data_offset
        buf[136..144].copy_from_slice(&data_size_sectors.to_le_bytes());
        buf[160..164].copy_from_slice(&0u32.to_le_bytes()); // dev_number = 0
        buf[200..208].copy_from_slice(&events.to_le_bytes());
        buf[220..224].copy_from_slice(&1u32.to_le_bytes()); // max_dev = 1
        buf.extend_from_slice(&raid_disk.to_le_bytes());
        buf
    }

    #[test]
    fn freshness_selects_the_disk_with_the_largest_events() {
        let set_uuid = [0xAB; 16];
        let sb_a = synth_v1_superblock(set_uuid, 5, 0, 2, Level::Raid1.as_i32(), 0, 8, 2048, 2048);
        let sb_b = synth_v1_superblock(set_uuid, 9, 0, 2, Level::Raid1.as_i32(), 0, 8, 2048, 2048);

        // Pad each image so find_superblock's "sector 0" candidate hits.
        let a = Arc::new(Mutex::new(IoCursor::new(sb_a))) as crate::stream::SharedStream;
        let b = Arc::new(Mutex::new(IoCursor::new(sb_b))) as crate::stream::SharedStream;

        let disk_a = MdPhysicalDisk::parse(a).unwrap();
        let disk_b = MdPhysicalDisk::parse(b).unwrap();
        assert_eq!(disk_a.set_uuid, disk_b.set_uuid);

        let reference = [&disk_a, &disk_b].into_iter().max_by_key(|d| d.events).unwrap();
        assert_eq!(reference.events, 9);
    }

    /// The virtual-disk size for a parity level must come from the
    /// superblock's `size` field, not `data_size` — the two are given
    /// deliberately different values here so a regression that reads the
    /// wrong one fails loudly instead of passing by luck.
    #[test]
    fn raid_virtual_disk_size_uses_component_size_not_data_size() {
        let set_uuid = [0xCD; 16];
        let size_sectors = 2048u64;
        let data_size_sectors = 9999u64;
        let sb = synth_v1_superblock(
            set_uuid,
            1,
            0,
            3,
            Level::Raid5.as_i32(),
            2,
            8,
            size_sectors,
            data_size_sectors,
        );
        let source = Arc::new(Mutex::new(IoCursor::new(sb))) as crate::stream::SharedStream;
        let disk = MdPhysicalDisk::parse(source).unwrap();
        assert_eq!(disk.component_size, size_sectors * SECTOR_SIZE);
        assert_eq!(disk.data_size, data_size_sectors * SECTOR_SIZE);

        let configuration = build_configuration(set_uuid, vec![disk]).unwrap();
        assert_eq!(configuration.virtual_disks[0].size, size_sectors * SECTOR_SIZE);
    }
}
