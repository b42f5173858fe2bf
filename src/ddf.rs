//! SNIA DDF v2.0 decoder.
//!
//! Ground truth: `original_source/dissect/volume/ddf/c_ddf.py` (cstruct
//! layout, big-endian) and `original_source/dissect/volume/ddf/ddf.py`
//! (aggregation and RAID-layout conversion).

use crate::config::Config;
use crate::error::{Error, Result, SchemeKind};
use crate::raid::{Configuration, DiskMap, Level, PhysicalDisk, Raid, VirtualDisk, layout};
use crate::stream::ReadAt;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;
use zerocopy::byteorder::big_endian::{U16 as BE_U16, U32 as BE_U32, U64 as BE_U64};
use zerocopy::{FromBytes, Immutable, KnownLayout, Unaligned};

pub const DEFAULT_SECTOR_SIZE: u64 = 512;
const DDF_HEADER_SIGNATURE: u32 = 0xDE11DE11;
const DDF_CONTROLLER_DATA_SIGNATURE: u32 = 0xAD111111;
const DDF_PDR_SIGNATURE: u32 = 0x22222222;
const DDF_VD_RECORD_SIGNATURE: u32 = 0xDDDDDDDD;
const DDF_VDCR_SIGNATURE: u32 = 0xEEEEEEEE;
const DDF_PDD_SIGNATURE: u32 = 0x33333333;

const DDF_VDCR_CONCAT: u8 = 0x1F;
const DDF_VDCR_RAID0: u8 = 0x00;
const DDF_VDCR_RAID1: u8 = 0x01;
const DDF_VDCR_RAID1E: u8 = 0x11;
const DDF_VDCR_RAID4: u8 = 0x04;
const DDF_VDCR_RAID5: u8 = 0x05;
const DDF_VDCR_RAID6: u8 = 0x06;

const DDF_VDCR_RAID0_SIMPLE: u8 = 0x00;
const DDF_VDCR_RAID1_SIMPLE: u8 = 0x00;
const DDF_VDCR_RAID1_MULTI: u8 = 0x01;
const DDF_VDCR_RAID4_N: u8 = 0x01;
const DDF_VDCR_RAID5_0_RESTART: u8 = 0x00;
const DDF_VDCR_RAID6_0_RESTART: u8 = 0x01;
const DDF_VDCR_RAID5_N_RESTART: u8 = 0x02;
const DDF_VDCR_RAID5_N_CONTINUE: u8 = 0x03;
const DDF_VDCR_RAID1E_ADJACENT: u8 = 0x00;
const DDF_VDCR_RAID1E_OFFSET: u8 = 0x01;
const DDF_VDCR_2STRIPED: u8 = 0x00;
const DDF_VDCR_2SPANNED: u8 = 0x03;

const NO_PHYSICAL_DISK: u32 = 0xFFFF_FFFF;

#[derive(FromBytes, KnownLayout, Immutable, Unaligned, Clone)]
#[repr(C)]
struct DdfHeaderRaw {
    signature: BE_U32,
    crc: BE_U32,
    header_guid: [u8; 24],
    ddf_rev: [u8; 8],
    sequence_number: BE_U32,
    timestamp: BE_U32,
    open_flag: u8,
    foreign_flag: u8,
    disk_grouping: u8,
    reserved1: [u8; 13],
    header_ext: [u8; 32],
    primary_header_lba: BE_U64,
    secondary_header_lba: BE_U64,
    header_type: u8,
    reserved2: [u8; 3],
    workspace_length: BE_U32,
    workspace_lba: BE_U64,
    max_pd_entries: BE_U16,
    max_vd_entries: BE_U16,
    max_partitions: BE_U16,
    configuration_record_length: BE_U16,
    max_primary_element_entries: BE_U16,
    max_mapped_block_entries: BE_U32,
    reserved3: [u8; 50],
    controller_data_section: BE_U32,
    controller_data_section_length: BE_U32,
    physical_disk_records_section: BE_U32,
    physical_disk_records_section_length: BE_U32,
    virtual_disk_records_section: BE_U32,
    virtual_disk_records_section_length: BE_U32,
    configuration_records_section: BE_U32,
    configuration_records_section_length: BE_U32,
    physical_disk_data_section: BE_U32,
    physical_disk_data_section_length: BE_U32,
    bbm_log_section: BE_U32,
    bbm_log_section_length: BE_U32,
    diagnostic_space_section: BE_U32,
    diagnostic_space_section_length: BE_U32,
    vendor_specific_logs_section: BE_U32,
    vendor_specific_logs_section_length: BE_U32,
    reserved4: [u8; 256],
}

static_assertions::const_assert_eq!(std::mem::size_of::<DdfHeaderRaw>(), 512);

#[derive(FromBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
struct ControllerDataRaw {
    signature: BE_U32,
    crc: BE_U32,
    controller_guid: [u8; 24],
    controller_type: [u8; 8],
    product_id: [u8; 16],
    reserved: [u8; 8],
    vendor_unique: [u8; 448],
}

#[derive(FromBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
struct PhysicalDiskRecordsHeaderRaw {
    signature: BE_U32,
    crc: BE_U32,
    populated_pdes: BE_U16,
    max_pde_supported: BE_U16,
    reserved: [u8; 52],
}

#[derive(FromBytes, KnownLayout, Immutable, Unaligned, Clone)]
#[repr(C)]
struct PhysicalDiskEntryRaw {
    pd_guid: [u8; 24],
    pd_reference: BE_U32,
    pd_type: BE_U16,
    pd_state: BE_U16,
    configured_size: BE_U64,
    path_information: [u8; 18],
    block_size: BE_U16,
    reserved: [u8; 4],
}

static_assertions::const_assert_eq!(std::mem::size_of::<PhysicalDiskEntryRaw>(), 64);

#[derive(FromBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
struct VirtualDiskRecordsHeaderRaw {
    signature: BE_U32,
    crc: BE_U32,
    populated_vdes: BE_U16,
    max_vde_supported: BE_U16,
    reserved: [u8; 52],
}

#[derive(FromBytes, KnownLayout, Immutable, Unaligned, Clone)]
#[repr(C)]
struct VirtualDiskEntryRaw {
    vd_guid: [u8; 24],
    vd_number: BE_U16,
    reserved1: [u8; 2],
    vd_type: BE_U32,
    vd_state: u8,
    init_state: u8,
    partially_optimal_drive_failures_remaining: u8,
    reserved2: [u8; 13],
    vd_name: [u8; 16],
}

#[derive(FromBytes, KnownLayout, Immutable, Unaligned, Clone)]
#[repr(C)]
struct VdConfigurationRecordRaw {
    signature: BE_U32,
    crc: BE_U32,
    vd_guid: [u8; 24],
    timestamp: BE_U32,
    sequence_number: BE_U32,
    reserved1: [u8; 24],
    primary_element_count: BE_U16,
    strip_size: u8,
    primary_raid_level: u8,
    raid_level_qualifier: u8,
    secondary_element_count: u8,
    secondary_element_seq: u8,
    secondary_raid_level: u8,
    block_count: BE_U64,
    vd_size: BE_U64,
    block_size: BE_U16,
    rotate_parity_count: u8,
    reserved2: [u8; 5],
    associated_spares: [u8; 32],
    cache_policies_and_parameters: BE_U64,
    bg_rate: u8,
    reserved3: [u8; 3],
    mdf_parity_disks: u8,
    mdf_parity_generator_polynomial: BE_U16,
    reserved4: [u8; 1],
    mdf_constant_generation_method: u8,
    reserved5: [u8; 47],
    reserved6: [u8; 192],
    v0: [u8; 32],
    v1: [u8; 32],
    v2: [u8; 16],
    v3: [u8; 16],
    vendor_specific_scratch_space: [u8; 32],
}

#[derive(FromBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
struct PhysicalDiskDataRaw {
    signature: BE_U32,
    crc: BE_U32,
    pd_guid: [u8; 24],
    pd_reference: BE_U32,
    forced_ref_flag: u8,
    forced_pd_guid_flag: u8,
    vendor_specific_scratch_space: [u8; 32],
    reserved: [u8; 442],
}

fn read_struct<T: FromBytes + KnownLayout + Immutable>(source: &Arc<dyn ReadAt>, offset: u64) -> Result<T> {
    let mut bytes = vec![0u8; std::mem::size_of::<T>()];
    let n = source.read_at(offset, &mut bytes)?;
    if n != bytes.len() {
        return Err(Error::BadStructure { scheme: SchemeKind::Ddf, detail: format!("short read at {offset:#x}") });
    }
    T::read_from_bytes(&bytes[..]).map_err(|_| Error::BadStructure {
        scheme: SchemeKind::Ddf,
        detail: format!("misaligned record at {offset:#x}"),
    })
}

/// Physical-disk record.
#[derive(Clone)]
struct PhysicalDiskRecord {
    reference: u32,
    size_blocks: u64,
    block_size: u16,
}

struct VirtualDiskRecord {
    guid: [u8; 24],
    name: String,
}

/// One parsed `VD_Configuration_Record` plus its variable-length
/// physical-disk-sequence / starting-block tails.
struct VdConfigurationRecord {
    raw: VdConfigurationRecordRaw,
    physical_disk_sequence: Vec<u32>,
    starting_block: Vec<u64>,
}

impl VdConfigurationRecord {
    fn guid(&self) -> [u8; 24] {
        self.raw.vd_guid
    }
}

/// One physical disk's full DDF metadata.
pub struct DdfPhysicalDisk {
    pub header_guid: [u8; 24],
    pub reference: u32,
    physical_disk_records: Vec<PhysicalDiskRecord>,
    virtual_disk_records: Vec<VirtualDiskRecord>,
    virtual_disk_configuration_records: Vec<VdConfigurationRecord>,
    disk: Arc<PhysicalDisk>,
}

impl DdfPhysicalDisk {
    pub fn parse(source: Arc<dyn ReadAt>, sector_size: u64) -> Result<DdfPhysicalDisk> {
        let total = source
            .size()
            .ok_or_else(|| Error::BadStructure { scheme: SchemeKind::Ddf, detail: "unknown stream size".into() })?;
        let anchor_offset = total.saturating_sub(sector_size);
        let anchor: DdfHeaderRaw = read_struct(&source, anchor_offset)?;
        if anchor.signature.get() != DDF_HEADER_SIGNATURE {
            return Err(Error::BadSignature {
                scheme: SchemeKind::Ddf,
                detail: format!("anchor signature {:#010x}", anchor.signature.get()),
            });
        }

        let primary_header_offset = anchor.primary_header_lba.get() * sector_size;
        let primary: DdfHeaderRaw = read_struct(&source, primary_header_offset)?;
        if primary.signature.get() != DDF_HEADER_SIGNATURE {
            return Err(Error::BadStructure {
                scheme: SchemeKind::Ddf,
                detail: "primary header signature mismatch".into(),
            });
        }

        let header_offset = primary_header_offset;

        let controller_data_offset = header_offset + anchor.controller_data_section.get() as u64 * sector_size;
        let controller: ControllerDataRaw = read_struct(&source, controller_data_offset)?;
        if controller.signature.get() != DDF_CONTROLLER_DATA_SIGNATURE {
            return Err(Error::BadStructure { scheme: SchemeKind::Ddf, detail: "controller data signature".into() });
        }

        let pdr_offset = header_offset + anchor.physical_disk_records_section.get() as u64 * sector_size;
        let physical_disk_records = read_physical_disk_records(&source, pdr_offset)?;

        let vdr_offset = header_offset + anchor.virtual_disk_records_section.get() as u64 * sector_size;
        let virtual_disk_records = read_virtual_disk_records(&source, vdr_offset)?;

        let vdcr_offset = header_offset + anchor.configuration_records_section.get() as u64 * sector_size;
        let count = if anchor.configuration_record_length.get() != 0 {
            anchor.configuration_records_section_length.get() as u64 / anchor.configuration_record_length.get() as u64
        } else {
            0
        };
        let record_size = anchor.configuration_record_length.get() as u64 * sector_size;
        let virtual_disk_configuration_records = read_vd_configuration_records(
            &source,
            vdcr_offset,
            count,
            record_size,
            anchor.max_primary_element_entries.get() as usize,
        )?;

        let pdd_offset = header_offset + anchor.physical_disk_data_section.get() as u64 * sector_size;
        let pdd: PhysicalDiskDataRaw = read_struct(&source, pdd_offset)?;
        if pdd.signature.get() != DDF_PDD_SIGNATURE {
            return Err(Error::BadStructure { scheme: SchemeKind::Ddf, detail: "physical disk data signature".into() });
        }

        let reference = pdd.pd_reference.get();
        let my_pdr = physical_disk_records
            .iter()
            .find(|pdr| pdr.reference == reference)
            .ok_or_else(|| Error::BadStructure {
                scheme: SchemeKind::Ddf,
                detail: format!("no physical disk record for reference {reference:#010x}"),
            })?;

        let block_size = if my_pdr.block_size == 0xFFFF { sector_size } else { my_pdr.block_size as u64 };
        let disk = Arc::new(PhysicalDisk::new(source, 0, my_pdr.size_blocks * block_size));

        Ok(DdfPhysicalDisk {
            header_guid: anchor.header_guid,
            reference,
            physical_disk_records,
            virtual_disk_records,
            virtual_disk_configuration_records,
            disk,
        })
    }

    fn block_size(&self) -> u64 {
        self.physical_disk_records
            .iter()
            .find(|pdr| pdr.reference == self.reference)
            .map(|pdr| if pdr.block_size == 0xFFFF { DEFAULT_SECTOR_SIZE } else { pdr.block_size as u64 })
            .unwrap_or(DEFAULT_SECTOR_SIZE)
    }
}

fn read_physical_disk_records(source: &Arc<dyn ReadAt>, offset: u64) -> Result<Vec<PhysicalDiskRecord>> {
    let header: PhysicalDiskRecordsHeaderRaw = read_struct(source, offset)?;
    if header.signature.get() != DDF_PDR_SIGNATURE {
        return Err(Error::BadStructure { scheme: SchemeKind::Ddf, detail: "physical disk records signature".into() });
    }
    let mut result = Vec::new();
    let mut cursor = offset + std::mem::size_of::<PhysicalDiskRecordsHeaderRaw>() as u64;
    for _ in 0..header.populated_pdes.get() {
        let entry: PhysicalDiskEntryRaw = read_struct(source, cursor)?;
        result.push(PhysicalDiskRecord {
            reference: entry.pd_reference.get(),
            size_blocks: entry.configured_size.get(),
            block_size: entry.block_size.get(),
        });
        cursor += std::mem::size_of::<PhysicalDiskEntryRaw>() as u64;
    }
    Ok(result)
}

fn read_virtual_disk_records(source: &Arc<dyn ReadAt>, offset: u64) -> Result<Vec<VirtualDiskRecord>> {
    let header: VirtualDiskRecordsHeaderRaw = read_struct(source, offset)?;
    if header.signature.get() != DDF_VD_RECORD_SIGNATURE {
        return Err(Error::BadStructure { scheme: SchemeKind::Ddf, detail: "virtual disk records signature".into() });
    }
    let mut result = Vec::new();
    let mut cursor = offset + std::mem::size_of::<VirtualDiskRecordsHeaderRaw>() as u64;
    for _ in 0..header.populated_vdes.get() {
        let entry: VirtualDiskEntryRaw = read_struct(source, cursor)?;
        let name_end = entry.vd_name.iter().position(|&b| b == 0).unwrap_or(entry.vd_name.len());
        let name = String::from_utf8_lossy(&entry.vd_name[..name_end]).into_owned();
        result.push(VirtualDiskRecord { guid: entry.vd_guid, name });
        cursor += std::mem::size_of::<VirtualDiskEntryRaw>() as u64;
    }
    Ok(result)
}

fn read_vd_configuration_records(
    source: &Arc<dyn ReadAt>,
    mut offset: u64,
    count: u64,
    record_size: u64,
    num_entries: usize,
) -> Result<Vec<VdConfigurationRecord>> {
    let mut result = Vec::new();
    let header_size = std::mem::size_of::<VdConfigurationRecordRaw>() as u64;
    for _ in 0..count {
        let raw: VdConfigurationRecordRaw = read_struct(source, offset)?;
        if raw.signature.get() != DDF_VDCR_SIGNATURE {
            offset += record_size;
            continue;
        }

        let mut seq_bytes = vec![0u8; num_entries * 4];
        source.read_at(offset + header_size, &mut seq_bytes)?;
        let physical_disk_sequence: Vec<u32> = seq_bytes
            .chunks_exact(4)
            .map(|c| u32::from_be_bytes(c.try_into().unwrap()))
            .take(raw.primary_element_count.get() as usize)
            .collect();

        let mut block_bytes = vec![0u8; num_entries * 8];
        source.read_at(offset + header_size + num_entries as u64 * 4, &mut block_bytes)?;
        let starting_block: Vec<u64> = block_bytes
            .chunks_exact(8)
            .map(|c| u64::from_be_bytes(c.try_into().unwrap()))
            .take(raw.primary_element_count.get() as usize)
            .collect();

        result.push(VdConfigurationRecord { raw, physical_disk_sequence, starting_block });
        offset += record_size;
    }
    Ok(result)
}

/// Per-`(VD_GUID, secondary_element_seq)` selection picks the record with
/// the highest `sequence_number`, then the physical-disk sequence within
/// that record defines role ordering.
pub fn open_ddf(sources: Vec<Arc<dyn ReadAt>>, config: &Config) -> Result<Raid> {
    let sector_size = config.sector_size as u64;
    let mut disks = Vec::new();
    let mut errors = Vec::new();
    for source in sources {
        match DdfPhysicalDisk::parse(source, sector_size) {
            Ok(d) => disks.push(d),
            Err(e) => {
                log::debug!("DDF anchor/record parse failed: {e}");
                errors.push((SchemeKind::Ddf, e));
            }
        }
    }
    if disks.is_empty() {
        return Err(Error::NoSchemeMatched(errors));
    }

    let mut by_header_guid: BTreeMap<[u8; 24], Vec<DdfPhysicalDisk>> = BTreeMap::new();
    for d in disks {
        by_header_guid.entry(d.header_guid).or_default().push(d);
    }

    let mut configurations = Vec::new();
    for (_, disks) in by_header_guid {
        configurations.push(build_configuration(disks, config.strict)?);
    }
    Ok(Raid { configurations })
}

fn build_configuration(disks: Vec<DdfPhysicalDisk>, strict: bool) -> Result<Configuration> {
    let set_uuid = guid_to_uuid(&disks[0].header_guid);

    let mut pd_by_reference: BTreeMap<u32, &DdfPhysicalDisk> = BTreeMap::new();
    let mut vdr_by_guid: BTreeMap<[u8; 24], &VirtualDiskRecord> = BTreeMap::new();
    // Keep only the highest sequence_number per (guid, secondary_element_seq).
    let mut vdcr_unique: BTreeMap<([u8; 24], u8), &VdConfigurationRecord> = BTreeMap::new();

    for d in &disks {
        pd_by_reference.insert(d.reference, d);
        for vdr in &d.virtual_disk_records {
            vdr_by_guid.insert(vdr.guid, vdr);
        }
        for vdcr in &d.virtual_disk_configuration_records {
            let key = (vdcr.guid(), vdcr.raw.secondary_element_seq);
            let replace = match vdcr_unique.get(&key) {
                Some(existing) => vdcr.raw.sequence_number.get() > existing.raw.sequence_number.get(),
                None => true,
            };
            if replace {
                log::trace!(
                    "VDCR for secondary_element_seq={} picked at sequence_number={}",
                    key.1,
                    vdcr.raw.sequence_number.get()
                );
                vdcr_unique.insert(key, vdcr);
            }
        }
    }

    let mut vd_disk_maps: BTreeMap<[u8; 24], DiskMap> = BTreeMap::new();
    let mut vdcr_by_guid: BTreeMap<[u8; 24], &VdConfigurationRecord> = BTreeMap::new();

    for vdcr in vdcr_unique.values() {
        vdcr_by_guid.insert(vdcr.guid(), vdcr);
        let disk_map = vd_disk_maps.entry(vdcr.guid()).or_default();

        let count = vdcr.raw.primary_element_count.get() as u32;
        let sec = if vdcr.raw.secondary_element_count == 1 { 0 } else { vdcr.raw.secondary_element_seq as u32 };

        let mut i = 0u32;
        for (starting_block, pd_ref) in vdcr.starting_block.iter().zip(vdcr.physical_disk_sequence.iter()) {
            match pd_by_reference.get(pd_ref) {
                Some(matched) => {
                    disk_map.insert(sec * count + i, (*starting_block * matched.block_size(), matched.disk.clone()));
                }
                None if strict && *pd_ref != NO_PHYSICAL_DISK => {
                    return Err(Error::BadStructure {
                        scheme: SchemeKind::Ddf,
                        detail: format!(
                            "VDCR for VD {} references physical disk {pd_ref:#x}, which has no matching PDR",
                            guid_to_uuid(&vdcr.guid())
                        ),
                    });
                }
                None => {}
            }
            if *pd_ref != NO_PHYSICAL_DISK {
                i += 1;
            }
        }
    }

    let mut virtual_disks = Vec::new();
    for (guid, disk_map) in vd_disk_maps {
        let Some(vdcr) = vdcr_by_guid.get(&guid) else { continue };
        let Some(vdr) = vdr_by_guid.get(&guid) else { continue };
        virtual_disks.push(build_virtual_disk(vdcr, vdr, disk_map)?);
    }

    let physical_disks = disks.into_iter().map(|d| d.disk).collect();
    Ok(Configuration { set_uuid, physical_disks, virtual_disks })
}

fn build_virtual_disk(
    vdcr: &VdConfigurationRecord,
    vdr: &VirtualDiskRecord,
    disk_map: DiskMap,
) -> Result<VirtualDisk> {
    let block_size = if vdcr.raw.block_size.get() == 0xFFFF {
        DEFAULT_SECTOR_SIZE
    } else {
        vdcr.raw.block_size.get() as u64
    };

    let (level, ddf_layout, num_disks) = convert_raid_layout(
        vdcr.raw.primary_raid_level,
        vdcr.raw.raid_level_qualifier,
        vdcr.raw.secondary_raid_level,
        vdcr.raw.primary_element_count.get(),
        vdcr.raw.secondary_element_count,
    )?;

    Ok(VirtualDisk {
        name: vdr.name.clone(),
        uuid: guid_to_uuid(&vdr.guid),
        size: vdcr.raw.vd_size.get() * block_size,
        level,
        layout: ddf_layout,
        stripe_size: (1u64 << vdcr.raw.strip_size) * block_size,
        num_disks,
        disk_map,
    })
}

fn convert_raid_layout(prl: u8, rlq: u8, srl: u8, pec: u16, sec: u8) -> Result<(Level, u32, u32)> {
    let mut num_disks = pec as u32;

    if sec > 1 {
        if prl != DDF_VDCR_RAID1 || !(srl == DDF_VDCR_2STRIPED || srl == DDF_VDCR_2SPANNED) {
            return Err(Error::InvalidLayout(format!("unsupported DDF secondary RAID level {srl}")));
        }
        let raid_layout = if num_disks == 2 && rlq == DDF_VDCR_RAID1_SIMPLE {
            0x102
        } else if num_disks == 3 && rlq == DDF_VDCR_RAID1_MULTI {
            0x103
        } else {
            0
        };
        num_disks *= sec as u32;
        return Ok((Level::Raid10, raid_layout, num_disks));
    }

    let (level, raid_layout) = match prl {
        DDF_VDCR_CONCAT => (Level::Linear, 0),
        DDF_VDCR_RAID0 if rlq == DDF_VDCR_RAID0_SIMPLE => (Level::Raid0, 0),
        DDF_VDCR_RAID1
            if (rlq == DDF_VDCR_RAID1_SIMPLE && num_disks == 2)
                || (rlq == DDF_VDCR_RAID1_MULTI && num_disks == 3) =>
        {
            (Level::Raid1, 0)
        }
        DDF_VDCR_RAID1E if rlq == DDF_VDCR_RAID1E_ADJACENT => (Level::Raid10, 0x102),
        DDF_VDCR_RAID1E if rlq == DDF_VDCR_RAID1E_OFFSET => (Level::Raid10, 0x201),
        DDF_VDCR_RAID4 if rlq == DDF_VDCR_RAID4_N => (Level::Raid4, 0),
        DDF_VDCR_RAID5 if rlq == DDF_VDCR_RAID5_N_RESTART => (Level::Raid5, layout::LEFT_ASYMMETRIC),
        DDF_VDCR_RAID5 if rlq == DDF_VDCR_RAID5_0_RESTART => (Level::Raid5, layout::RIGHT_ASYMMETRIC),
        DDF_VDCR_RAID5 if rlq == DDF_VDCR_RAID5_N_CONTINUE => (Level::Raid5, layout::LEFT_SYMMETRIC),
        DDF_VDCR_RAID6 if rlq == DDF_VDCR_RAID5_N_RESTART => (Level::Raid6, layout::ROTATING_N_RESTART),
        DDF_VDCR_RAID6 if rlq == DDF_VDCR_RAID6_0_RESTART => (Level::Raid6, layout::ROTATING_ZERO_RESTART),
        DDF_VDCR_RAID6 if rlq == DDF_VDCR_RAID5_N_CONTINUE => (Level::Raid6, layout::ROTATING_N_CONTINUE),
        _ => return Err(Error::InvalidLayout(format!("unsupported DDF RAID layout: ({prl}, {rlq})"))),
    };

    Ok((level, raid_layout, num_disks))
}

fn guid_to_uuid(guid: &[u8; 24]) -> Uuid {
    // DDF GUIDs are 24 bytes (vendor-id + serial + timestamp + signature);
    // fold to a 16-byte UUID via the first 16 bytes, which carry the
    // vendor-assigned unique portion per the DDF spec's GUID layout.
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&guid[..16]);
    Uuid::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor as IoCursor;
    use std::sync::Mutex;

    fn shared(bytes: Vec<u8>) -> Arc<dyn ReadAt> {
        Arc::new(Mutex::new(IoCursor::new(bytes))) as crate::stream::SharedStream
    }

    /// Builds a `VdConfigurationRecordRaw` with just the fields
    /// `build_configuration` reads set, the rest zeroed.
    fn synth_vdcr_raw(vd_guid: [u8; 24], primary_element_count: u16, primary_raid_level: u8, raid_level_qualifier: u8) -> VdConfigurationRecordRaw {
        let mut buf = vec![0u8; std::mem::size_of::<VdConfigurationRecordRaw>()];
        buf[0..4].copy_from_slice(&DDF_VDCR_SIGNATURE.to_be_bytes());
        buf[8..32].copy_from_slice(&vd_guid);
        buf[36..40].copy_from_slice(&1u32.to_be_bytes()); // sequence_number
        buf[64..66].copy_from_slice(&primary_element_count.to_be_bytes());
        buf[67] = primary_raid_level;
        buf[68] = raid_level_qualifier;
        buf[69] = 1; // secondary_element_count
        buf[88..90].copy_from_slice(&512u16.to_be_bytes()); // block_size
        VdConfigurationRecordRaw::read_from_bytes(&buf[..]).expect("buffer sized to the struct")
    }

    /// A single DDF physical disk whose one VDCR references physical-disk
    /// role 2, which no disk in the set supplies.
    fn disk_with_unresolved_vdcr_reference(vd_guid: [u8; 24]) -> DdfPhysicalDisk {
        let raw = synth_vdcr_raw(vd_guid, 2, DDF_VDCR_RAID0, DDF_VDCR_RAID0_SIMPLE);
        let vdcr = VdConfigurationRecord { raw, physical_disk_sequence: vec![1, 2], starting_block: vec![0, 0] };
        let vdr = VirtualDiskRecord { guid: vd_guid, name: "vd0".into() };
        let disk = Arc::new(PhysicalDisk::new(shared(vec![0u8; 512]), 0, 512));
        DdfPhysicalDisk {
            header_guid: [0x42; 24],
            reference: 1,
            physical_disk_records: vec![],
            virtual_disk_records: vec![vdr],
            virtual_disk_configuration_records: vec![vdcr],
            disk,
        }
    }

    #[test]
    fn strict_mode_rejects_a_vdcr_whose_physical_disk_reference_does_not_resolve() {
        let vd_guid = [0x99; 24];
        let err = build_configuration(vec![disk_with_unresolved_vdcr_reference(vd_guid)], true).unwrap_err();
        assert!(matches!(err, Error::BadStructure { scheme: SchemeKind::Ddf, .. }));
    }

    #[test]
    fn non_strict_mode_silently_drops_the_unresolved_role_instead_of_failing() {
        let vd_guid = [0x99; 24];
        let configuration = build_configuration(vec![disk_with_unresolved_vdcr_reference(vd_guid)], false).unwrap();
        assert_eq!(configuration.virtual_disks.len(), 1);
        // Role 0 (pd_ref=1) resolved; role 1 (pd_ref=2) has no matching PDR
        // and so is simply absent from the disk map.
        assert_eq!(configuration.virtual_disks[0].disk_map.len(), 1);
        assert!(configuration.virtual_disks[0].disk_map.contains_key(&0));
    }

    /// Every DDF RAID6 (PRL, RLQ) combination this decoder recognizes maps
    /// to one of the rotating layouts, because `original_source`'s own
    /// `ddf.py` has no non-rotating RAID6 case to port. `raid::stream`
    /// unconditionally rejects those layouts (see
    /// `raid456_rejects_every_ddf_raid6_layout` in `raid::stream::tests`),
    /// so a DDF RAID6 virtual disk built through this decoder can never
    /// actually serve a read — tracked as unreachable in DESIGN.md rather
    /// than guessed at.
    #[test]
    fn ddf_raid6_always_converts_to_a_rotating_layout() {
        let rotating = [layout::ROTATING_N_RESTART, layout::ROTATING_ZERO_RESTART, layout::ROTATING_N_CONTINUE];
        for rlq in [DDF_VDCR_RAID5_N_RESTART, DDF_VDCR_RAID6_0_RESTART, DDF_VDCR_RAID5_N_CONTINUE] {
            let (level, raid_layout, _num_disks) =
                convert_raid_layout(DDF_VDCR_RAID6, rlq, 0, 4, 1).expect("recognized RAID6 combination");
            assert_eq!(level, Level::Raid6);
            assert!(rotating.contains(&raid_layout), "layout {raid_layout} should be a rotating layout");
        }
    }
}
