//! Partition scheme identification (MBR, GPT, APM, BSD disklabel).
//!
//! Ground truth: `original_source/dissect/volume/disk/disk.py` and
//! `original_source/dissect/volume/disk/schemes/*.py`.

use crate::config::Config;
use crate::error::{Error, Result, SchemeKind};
use crate::stream::{Cursor, RangeStream, ReadAt, ReadSeek};
use std::sync::Arc;
use uuid::Uuid;
use zerocopy::byteorder::big_endian::{U16 as BE_U16, U32 as BE_U32};
use zerocopy::byteorder::little_endian::{U16 as LE_U16, U32 as LE_U32, U64 as LE_U64};
use zerocopy::{FromBytes, Immutable, KnownLayout, Unaligned};

/// MBR partition types that signal a nested BSD disklabel.
const BSD_MBR_TYPES: [u8; 4] = [0xA5, 0xA6, 0xA9, 0x6C];

/// GPT partition type GUIDs (already in on-disk mixed-endian byte order)
/// that signal a nested BSD disklabel.
const BSD_GPT_TYPE_GUIDS: [[u8; 16]; 3] = [
    // DragonFlyBSD disklabel32
    [0x04, 0x74, 0x08, 0x9D, 0xA5, 0x1C, 0xDC, 0x11, 0x88, 0x17, 0x01, 0x30, 0x1B, 0xB8, 0xA9, 0xF5],
    // DragonFlyBSD disklabel64
    [0x54, 0xCE, 0x48, 0x3D, 0x16, 0x1D, 0xDC, 0x11, 0x86, 0x96, 0x01, 0x30, 0x1B, 0xB8, 0xA9, 0xF5],
    // FreeBSD disklabel
    [0xB4, 0x7C, 0x6E, 0x51, 0xCF, 0x6E, 0xD6, 0x11, 0x8F, 0xF8, 0x00, 0x02, 0x2D, 0x09, 0x71, 0x2B],
];

#[derive(Clone, Debug)]
pub enum PartitionType {
    Mbr(u8),
    Gpt([u8; 16]),
    Apm(String),
    Bsd(u8),
}

impl PartitionType {
    fn is_bsd_container(&self) -> bool {
        match self {
            PartitionType::Mbr(t) => BSD_MBR_TYPES.contains(t),
            PartitionType::Gpt(guid) => BSD_GPT_TYPE_GUIDS.contains(guid),
            _ => false,
        }
    }
}

/// One enumerated partition, scoped to a byte range of the owning stream.
pub struct Partition {
    pub number: u32,
    pub offset: u64,
    pub size: u64,
    pub vtype: PartitionType,
    pub name: Option<String>,
    pub guid: Option<Uuid>,
    pub flags: u64,
    source: Arc<dyn ReadAt>,
}

impl Partition {
    pub fn open(&self) -> Box<dyn ReadSeek> {
        let range: Arc<dyn ReadAt> = Arc::new(RangeStream::new(self.source.clone(), self.offset, self.size));
        Box::new(Cursor::new(range, self.size))
    }
}

/// A whole disk: which scheme identified it, plus the flattened partition
/// list (BSD disklabels nested inside an MBR/GPT partition are expanded
/// in place, per `disk.py`'s `Disk.__init__`).
pub struct Disk {
    pub scheme: SchemeKind,
    pub partitions: Vec<Partition>,
}

/// Tries GPT, then MBR, then APM, then BSD (standalone), in that order —
/// the first success wins. BSD disklabels nested inside another scheme's
/// partitions are detected and expanded afterwards.
pub fn identify_disk(source: Arc<dyn ReadAt>, config: &Config) -> Result<Disk> {
    let sector_size = config.sector_size;
    let mut errors = Vec::new();

    let attempt: Option<(SchemeKind, Vec<Partition>)> = gpt::parse(source.clone(), sector_size as u64)
        .map(|p| (SchemeKind::Gpt, p))
        .map_err(|e| {
            log::trace!("GPT identification failed: {e}");
            errors.push((SchemeKind::Gpt, e));
        })
        .ok()
        .or_else(|| {
            mbr::parse(source.clone(), sector_size as u64)
                .map(|p| (SchemeKind::Mbr, p))
                .map_err(|e| {
                    log::trace!("MBR identification failed: {e}");
                    errors.push((SchemeKind::Mbr, e));
                })
                .ok()
        })
        .or_else(|| {
            apm::parse(source.clone(), sector_size as u64)
                .map(|p| (SchemeKind::Apm, p))
                .map_err(|e| {
                    log::trace!("APM identification failed: {e}");
                    errors.push((SchemeKind::Apm, e));
                })
                .ok()
        })
        .or_else(|| {
            bsd::parse(source.clone(), sector_size as u64)
                .map(|p| (SchemeKind::Bsd, p))
                .map_err(|e| {
                    log::trace!("BSD identification failed: {e}");
                    errors.push((SchemeKind::Bsd, e));
                })
                .ok()
        });

    let Some((scheme, main_partitions)) = attempt else {
        log::warn!("no partition scheme matched ({} candidates tried)", errors.len());
        return Err(Error::NoSchemeMatched(errors));
    };
    log::debug!("identified {scheme} with {} partitions", main_partitions.len());

    if scheme == SchemeKind::Mbr && sector_size == 512 && main_partitions.iter().any(|p| matches!(p.vtype, PartitionType::Mbr(0xEE))) {
        return Err(Error::PossibleSectorSizeMismatch(
            "found GPT type partition (0xEE) under an MBR scheme".into(),
        ));
    }

    let mut partitions = Vec::new();
    for partition in main_partitions {
        if partition.vtype.is_bsd_container() {
            let nested_source: Arc<dyn ReadAt> =
                Arc::new(RangeStream::new(partition.source.clone(), partition.offset, partition.size));
            if let Ok(nested) = bsd::parse(nested_source, sector_size as u64) {
                partitions.extend(nested);
                continue;
            }
        }
        partitions.push(partition);
    }

    Ok(Disk { scheme, partitions })
}

fn read_struct<T: FromBytes + KnownLayout + Immutable>(source: &Arc<dyn ReadAt>, offset: u64) -> Result<T> {
    let mut bytes = vec![0u8; std::mem::size_of::<T>()];
    let n = source.read_at(offset, &mut bytes)?;
    if n != bytes.len() {
        return Err(Error::BadStructure { scheme: SchemeKind::Mbr, detail: format!("short read at {offset:#x}") });
    }
    T::read_from_bytes(&bytes[..])
        .map_err(|_| Error::BadStructure { scheme: SchemeKind::Mbr, detail: format!("misaligned record at {offset:#x}") })
}

mod mbr {
    use super::*;

    #[derive(FromBytes, KnownLayout, Immutable, Unaligned, Clone, Copy)]
    #[repr(C)]
    struct MbrPartitionEntryRaw {
        bootable: u8,
        start_head: u8,
        start_cyl_sec: LE_U16,
        type_: u8,
        end_head: u8,
        end_cyl_sec: LE_U16,
        sector_ofs: LE_U32,
        sector_size: LE_U32,
    }

    static_assertions::const_assert_eq!(std::mem::size_of::<MbrPartitionEntryRaw>(), 16);

    #[derive(FromBytes, KnownLayout, Immutable, Unaligned)]
    #[repr(C)]
    struct MbrRaw {
        bootcode: [u8; 0x1b8],
        vol_no: LE_U32,
        pad1: LE_U16,
        part: [MbrPartitionEntryRaw; 4],
        bootsig: LE_U16,
    }

    static_assertions::const_assert_eq!(std::mem::size_of::<MbrRaw>(), 512);

    const EXTENDED_TYPES: [u8; 3] = [0x05, 0x0F, 0x85];
    const VBR_SIGNATURES: [&[u8]; 7] =
        [b"MSDOS", b"MSWIN", b"NTFS", b"FAT", b"EXFAT", b"-FVE-FS-", b"SYSLINUX"];

    pub fn parse(source: Arc<dyn ReadAt>, sector_size: u64) -> Result<Vec<Partition>> {
        let mut out = Vec::new();
        read_partitions(&source, 0, sector_size, 0, None, &mut out)?;
        Ok(out)
    }

    fn read_partitions(
        source: &Arc<dyn ReadAt>,
        offset: u64,
        sector_size: u64,
        num_start: u32,
        ebr_offset: Option<u64>,
        out: &mut Vec<Partition>,
    ) -> Result<()> {
        let mbr: MbrRaw = read_struct(source, offset)?;
        if mbr.bootsig.get() != 0xAA55 {
            return Err(Error::BadSignature {
                scheme: SchemeKind::Mbr,
                detail: format!("expected boot signature 0xaa55, got {:#06x}", mbr.bootsig.get()),
            });
        }

        let sig = &mbr.bootcode[3..11];
        if VBR_SIGNATURES.iter().any(|s| sig.windows(s.len()).any(|w| w == *s)) {
            return Err(Error::BadStructure {
                scheme: SchemeKind::Mbr,
                detail: "sector is a filesystem VBR, not an MBR".into(),
            });
        }
        if &mbr.bootcode[18..38] == b"Hit Esc for .altboot" || &mbr.bootcode[168..174] == b"\r\nQNX " {
            return Err(Error::BadStructure {
                scheme: SchemeKind::Mbr,
                detail: "sector is a QNX boot sector, not an MBR".into(),
            });
        }

        for (num, entry) in mbr.part.iter().enumerate() {
            if entry.type_ == 0x00 {
                continue;
            }

            let mut part_offset = offset + entry.sector_ofs.get() as u64 * sector_size;

            if EXTENDED_TYPES.contains(&entry.type_) {
                let first_ebr = match ebr_offset {
                    Some(e) => e,
                    None => part_offset,
                };
                if ebr_offset.is_some() {
                    part_offset = first_ebr + entry.sector_ofs.get() as u64 * sector_size;
                }
                read_partitions(source, part_offset, sector_size, num_start + num as u32, Some(first_ebr), out)?;
                continue;
            }

            out.push(Partition {
                number: num_start + num as u32 + 1,
                offset: part_offset,
                size: entry.sector_size.get() as u64 * sector_size,
                vtype: PartitionType::Mbr(entry.type_),
                name: None,
                guid: None,
                flags: entry.bootable as u64,
                source: source.clone(),
            });
        }

        Ok(())
    }
}

mod gpt {
    use super::*;

    bitflags::bitflags! {
        /// UEFI-spec GPT partition entry attribute bits (`attribute_flags`).
        /// Stored back into [`Partition::flags`] verbatim; decoded here only
        /// so the required-partition bit can be logged during parsing.
        #[derive(Clone, Copy, Debug, PartialEq, Eq)]
        struct GptAttributes: u64 {
            const PLATFORM_REQUIRED = 1 << 0;
            const NO_BLOCK_IO_PROTOCOL = 1 << 1;
            const LEGACY_BIOS_BOOTABLE = 1 << 2;
        }
    }

    #[derive(FromBytes, KnownLayout, Immutable, Unaligned)]
    #[repr(C)]
    struct GptHeaderRaw {
        signature: [u8; 8],
        revision: LE_U32,
        header_size: LE_U32,
        crc32: LE_U32,
        reserved: LE_U32,
        current_lba: LE_U64,
        backup_lba: LE_U64,
        first_usable_lba: LE_U64,
        last_usable_lba: LE_U64,
        guid: [u8; 16],
        lba_partition_array: LE_U64,
        partition_table_count: LE_U32,
        partition_entry_size: LE_U32,
        partition_table_crc: LE_U32,
        reserved2: [u8; 416],
    }

    static_assertions::const_assert_eq!(std::mem::size_of::<GptHeaderRaw>(), 508);

    #[derive(FromBytes, KnownLayout, Immutable, Unaligned)]
    #[repr(C)]
    struct GptPartitionRaw {
        type_guid: [u8; 16],
        partition_guid: [u8; 16],
        first_lba: LE_U64,
        last_lba: LE_U64,
        attribute_flags: LE_U64,
        name: [u8; 72],
    }

    static_assertions::const_assert_eq!(std::mem::size_of::<GptPartitionRaw>(), 128);

    pub fn parse(source: Arc<dyn ReadAt>, sector_size: u64) -> Result<Vec<Partition>> {
        let mbr_partitions = super::mbr::parse(source.clone(), sector_size)?;
        let gpt_part = mbr_partitions
            .iter()
            .find(|p| matches!(p.vtype, PartitionType::Mbr(0xEE)))
            .ok_or_else(|| Error::BadStructure {
                scheme: SchemeKind::Gpt,
                detail: "invalid protective/hybrid MBR, could not find 0xEE GPT partition".into(),
            })?;

        let header: GptHeaderRaw = read_struct(&source, gpt_part.offset)?;
        if &header.signature != b"EFI PART" {
            return Err(Error::BadSignature {
                scheme: SchemeKind::Gpt,
                detail: format!("expected 'EFI PART', got {:?}", header.signature),
            });
        }

        let mut out = Vec::new();
        let mut seen_gpt = false;
        for mbr_part in mbr_partitions {
            if matches!(mbr_part.vtype, PartitionType::Mbr(0xEE)) {
                if seen_gpt {
                    continue;
                }
                let base_offset = header.lba_partition_array.get() * sector_size;
                for part_num in 0..header.partition_table_count.get() {
                    let entry_offset = base_offset + part_num as u64 * header.partition_entry_size.get() as u64;
                    let entry: GptPartitionRaw = read_struct(&source, entry_offset)?;
                    if entry.first_lba.get() == 0 {
                        continue;
                    }

                    let attrs = GptAttributes::from_bits_retain(entry.attribute_flags.get());
                    if attrs.contains(GptAttributes::PLATFORM_REQUIRED) {
                        log::trace!("GPT partition {} is platform-required", part_num + 1);
                    }

                    let name_u16: Vec<u16> =
                        entry.name.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect();
                    let name = String::from_utf16_lossy(&name_u16)
                        .split('\u{0}')
                        .next()
                        .unwrap_or("")
                        .trim_end_matches('\u{ffff}')
                        .to_string();

                    out.push(Partition {
                        number: part_num + 1,
                        offset: entry.first_lba.get() * sector_size,
                        size: (entry.last_lba.get() - entry.first_lba.get()) * sector_size,
                        vtype: PartitionType::Gpt(entry.type_guid),
                        name: Some(name),
                        guid: Some(Uuid::from_bytes_le(entry.partition_guid)),
                        flags: entry.attribute_flags.get(),
                        source: source.clone(),
                    });
                }
                seen_gpt = true;
            } else {
                out.push(mbr_part);
            }
        }

        Ok(out)
    }
}

mod apm {
    use super::*;

    #[derive(FromBytes, KnownLayout, Immutable, Unaligned, Clone)]
    #[repr(C)]
    struct ApmPartitionEntryRaw {
        signature: [u8; 2],
        reserved_1: BE_U16,
        partition_count: BE_U32,
        partition_start: BE_U32,
        partition_size: BE_U32,
        partition_name: [u8; 32],
        partition_type: [u8; 32],
        data_start: BE_U32,
        data_size: BE_U32,
        partition_status: BE_U32,
        boot_code_start: BE_U32,
        boot_code_size: BE_U32,
        boot_loader_address: BE_U32,
        reserved_2: BE_U32,
        boot_code_entry: BE_U32,
        reserved_3: BE_U32,
        boot_code_checksum: BE_U32,
        processor_type: [u8; 16],
        reserved_4: [u8; 376],
    }

    static_assertions::const_assert_eq!(std::mem::size_of::<ApmPartitionEntryRaw>(), 512);

    fn cstr(bytes: &[u8]) -> String {
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        String::from_utf8_lossy(&bytes[..end]).into_owned()
    }

    pub fn parse(source: Arc<dyn ReadAt>, sector_size: u64) -> Result<Vec<Partition>> {
        let mut entry: ApmPartitionEntryRaw = read_struct(&source, 0)?;
        let mut offset = 0u64;

        if &entry.signature == b"ER" {
            offset = entry.reserved_1.get() as u64;
            entry = read_struct(&source, offset)?;
        }

        if &entry.signature != b"PM" {
            return Err(Error::BadSignature {
                scheme: SchemeKind::Apm,
                detail: format!("expected 'PM', got {:?}", entry.signature),
            });
        }

        let partitions_offset = offset + std::mem::size_of::<ApmPartitionEntryRaw>() as u64;
        let mut out = Vec::with_capacity(entry.partition_count.get() as usize);
        for i in 0..entry.partition_count.get() {
            let p = if i == 0 { entry.clone() } else { read_struct(&source, partitions_offset + i as u64 * 512)? };
            out.push(Partition {
                number: i + 1,
                offset: p.partition_start.get() as u64 * sector_size,
                size: p.partition_size.get() as u64 * sector_size,
                vtype: PartitionType::Apm(cstr(&p.partition_type)),
                name: Some(cstr(&p.partition_name)),
                guid: None,
                flags: p.partition_status.get() as u64,
                source: source.clone(),
            });
        }
        Ok(out)
    }
}

mod bsd {
    use super::*;

    const BSD_MAGIC: u32 = 0x82564557;
    const DISKMAGIC64: u32 = 0xC4464C59;
    const BSD_PART_RAW: usize = 2;

    #[derive(FromBytes, KnownLayout, Immutable, Unaligned, Clone, Copy)]
    #[repr(C)]
    struct Disklabel32Raw {
        d_magic: LE_U32,
        d_type: LE_U16,
        d_subtype: LE_U16,
        d_typename: [u8; 16],
        d_packname: [u8; 16],
        d_secsize: LE_U32,
        d_nsectors: LE_U32,
        d_ntracks: LE_U32,
        d_ncylinders: LE_U32,
        d_secpercyl: LE_U32,
        d_secperunit: LE_U32,
        d_sparespertrack: LE_U16,
        d_sparespercyl: LE_U16,
        d_acylinders: LE_U32,
        d_rpm: LE_U16,
        d_interleave: LE_U16,
        d_trackskew: LE_U16,
        d_cylskew: LE_U16,
        d_headswitch: LE_U32,
        d_trkseek: LE_U32,
        d_flags: LE_U32,
        d_drivedata: [LE_U32; 5],
        d_spare: [LE_U32; 5],
        d_magic2: LE_U32,
        d_checksum: LE_U16,
        d_npartitions: LE_U16,
        d_bbsize: LE_U32,
        d_sbsize: LE_U32,
    }

    static_assertions::const_assert_eq!(std::mem::size_of::<Disklabel32Raw>(), 148);

    #[derive(FromBytes, KnownLayout, Immutable, Unaligned, Clone, Copy)]
    #[repr(C)]
    struct Partition32Raw {
        p_size: LE_U32,
        p_offset: LE_U32,
        p_fsize: LE_U32,
        p_fstype: u8,
        p_frag: u8,
        p_cpg: LE_U16,
    }

    static_assertions::const_assert_eq!(std::mem::size_of::<Partition32Raw>(), 16);

    #[derive(FromBytes, KnownLayout, Immutable, Unaligned)]
    #[repr(C)]
    struct Disklabel64Raw {
        d_magic: LE_U32,
        d_crc: LE_U32,
        d_align: LE_U32,
        d_npartitions: LE_U32,
        d_stor_uuid: [u8; 16],
        d_total_size: LE_U64,
        d_bbase: LE_U64,
        d_pbase: LE_U64,
        d_pstop: LE_U64,
        d_abase: LE_U64,
        d_packname: [u8; 64],
        d_reserved: [u8; 64],
    }

    static_assertions::const_assert_eq!(std::mem::size_of::<Disklabel64Raw>(), 200);

    #[derive(FromBytes, KnownLayout, Immutable, Unaligned, Clone, Copy)]
    #[repr(C)]
    struct Partition64Raw {
        p_boffset: LE_U64,
        p_bsize: LE_U64,
        p_fstype: u8,
        p_unused01: u8,
        p_unused02: u8,
        p_unused03: u8,
        p_unused04: LE_U32,
        p_unused05: LE_U32,
        p_unused06: LE_U32,
        p_type_uuid: [u8; 16],
        p_stor_uuid: [u8; 16],
    }

    static_assertions::const_assert_eq!(std::mem::size_of::<Partition64Raw>(), 64);

    /// `source` is scoped to the container (partition or whole disk); the
    /// disklabel always lives one sector into it.
    pub fn parse(source: Arc<dyn ReadAt>, sector_size: u64) -> Result<Vec<Partition>> {
        let label_offset = sector_size;
        let mut magic_bytes = [0u8; 4];
        source.read_at(label_offset, &mut magic_bytes)?;
        let magic = u32::from_le_bytes(magic_bytes);

        if magic == BSD_MAGIC {
            let disklabel: Disklabel32Raw = read_struct(&source, label_offset)?;
            if disklabel.d_magic.get() != BSD_MAGIC || disklabel.d_magic2.get() != BSD_MAGIC {
                return Err(Error::BadStructure {
                    scheme: SchemeKind::Bsd,
                    detail: format!(
                        "invalid BSD disklabel magic, expected {BSD_MAGIC:#x}, got ({:#x}, {:#x})",
                        disklabel.d_magic.get(),
                        disklabel.d_magic2.get()
                    ),
                });
            }

            let partitions_offset = label_offset + std::mem::size_of::<Disklabel32Raw>() as u64;
            let raw_entry: Partition32Raw =
                read_struct(&source, partitions_offset + (BSD_PART_RAW as u64) * std::mem::size_of::<Partition32Raw>() as u64)?;
            let table_offset = raw_entry.p_offset.get() as u64 * sector_size;

            let mut out = Vec::new();
            for i in 0..disklabel.d_npartitions.get() as usize {
                if i == BSD_PART_RAW {
                    continue;
                }
                let entry: Partition32Raw =
                    read_struct(&source, partitions_offset + i as u64 * std::mem::size_of::<Partition32Raw>() as u64)?;
                if entry.p_fstype == 0 {
                    continue;
                }
                out.push(Partition {
                    number: i as u32 + 1,
                    offset: (entry.p_offset.get() as u64 * sector_size).saturating_sub(table_offset),
                    size: entry.p_size.get() as u64 * sector_size,
                    vtype: PartitionType::Bsd(entry.p_fstype),
                    name: None,
                    guid: None,
                    flags: 0,
                    source: source.clone(),
                });
            }
            Ok(out)
        } else if magic == DISKMAGIC64 {
            let disklabel: Disklabel64Raw = read_struct(&source, label_offset)?;
            let partitions_offset = label_offset + std::mem::size_of::<Disklabel64Raw>() as u64;

            let mut out = Vec::new();
            for i in 0..disklabel.d_npartitions.get() as usize {
                if i == BSD_PART_RAW {
                    continue;
                }
                let entry: Partition64Raw =
                    read_struct(&source, partitions_offset + i as u64 * std::mem::size_of::<Partition64Raw>() as u64)?;
                if (entry.p_boffset.get() == 0 && entry.p_bsize.get() != 0) || entry.p_fstype == 0 {
                    continue;
                }
                out.push(Partition {
                    number: i as u32 + 1,
                    offset: entry.p_boffset.get(),
                    size: entry.p_bsize.get(),
                    vtype: PartitionType::Bsd(entry.p_fstype),
                    name: None,
                    guid: Some(Uuid::from_bytes_le(entry.p_stor_uuid)),
                    flags: 0,
                    source: source.clone(),
                });
            }
            Ok(out)
        } else {
            Err(Error::BadSignature {
                scheme: SchemeKind::Bsd,
                detail: format!("expected {BSD_MAGIC:#x} or {DISKMAGIC64:#x}, got {magic:#x}"),
            })
        }
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

    fn synth_mbr(entries: &[(u8, u32, u32)]) -> Vec<u8> {
        let mut buf = vec![0u8; 512];
        buf[510] = 0x55;
        buf[511] = 0xAA;
        for (i, (ptype, sector_ofs, sector_size)) in entries.iter().enumerate() {
            let base = 0x1be + i * 16;
            buf[base + 4] = *ptype;
            buf[base + 8..base + 12].copy_from_slice(&sector_ofs.to_le_bytes());
            buf[base + 12..base + 16].copy_from_slice(&sector_size.to_le_bytes());
        }
        buf
    }

    #[test]
    fn mbr_rejects_bad_boot_signature() {
        let mut buf = vec![0u8; 512];
        buf[510] = 0;
        buf[511] = 0;
        let source = shared(buf);
        assert!(mbr::parse(source, 512).is_err());
    }

    #[test]
    fn mbr_enumerates_primary_partitions() {
        let buf = synth_mbr(&[(0x83, 2048, 1024), (0x00, 0, 0), (0, 0, 0), (0, 0, 0)]);
        let source = shared(buf);
        let partitions = mbr::parse(source, 512).unwrap();
        assert_eq!(partitions.len(), 1);
        assert_eq!(partitions[0].offset, 2048 * 512);
        assert_eq!(partitions[0].size, 1024 * 512);
    }

    #[test]
    fn identify_disk_reports_possible_4k_sector_mismatch() {
        // A protective-MBR-shaped 0xEE entry with no valid "EFI PART" GPT
        // header behind it: GPT parsing fails, MBR parsing succeeds, and
        // the leftover 0xEE type at 512-byte sectors should be flagged.
        let buf = synth_mbr(&[(0xEE, 1, 0xFFFFFFFF), (0, 0, 0), (0, 0, 0), (0, 0, 0)]);
        let source = shared(buf);
        let err = identify_disk(source, &Config::with_sector_size(512)).unwrap_err();
        assert!(matches!(err, Error::PossibleSectorSizeMismatch(_)));
    }
}
