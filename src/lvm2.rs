//! LVM2 physical volume, textual metadata, and logical volume decoding.
//!
//! Ground truth: `original_source/dissect/volume/lvm/{physical,lvm2,metadata,segment,c_lvm2}.py`.

use crate::dm::ThinPool;
use crate::error::{Error, Result, SchemeKind};
use crate::stream::{Cursor as DiskCursor, MappingStream, OpenedStream, ReadAt, ReadSeek};
use std::collections::BTreeMap;
use std::io;
use std::sync::{Arc, Mutex};
use zerocopy::byteorder::little_endian::{U32 as LE_U32, U64 as LE_U64};
use zerocopy::{FromBytes, Immutable, KnownLayout, Unaligned};

const SECTOR_SIZE: u64 = 512;
const LABEL_SIGNATURE: &[u8; 8] = b"LABELONE";
const LABEL_SCAN_SECTORS: u64 = 4;

fn lvm_err(detail: impl Into<String>) -> Error {
    Error::BadStructure { scheme: SchemeKind::Lvm2, detail: detail.into() }
}

// ---------------------------------------------------------------------
// On-disk structures
// ---------------------------------------------------------------------

#[derive(FromBytes, KnownLayout, Immutable, Unaligned, Debug)]
#[repr(C)]
struct LabelHeaderRaw {
    signature: [u8; 8],
    sector_number: LE_U64,
    checksum: LE_U32,
    data_offset: LE_U32,
    type_indicator: [u8; 8],
}

static_assertions::const_assert_eq!(std::mem::size_of::<LabelHeaderRaw>(), 32);

#[derive(FromBytes, KnownLayout, Immutable, Unaligned, Debug)]
#[repr(C)]
struct PvHeaderRaw {
    identifier: [u8; 32],
    volume_size: LE_U64,
}

static_assertions::const_assert_eq!(std::mem::size_of::<PvHeaderRaw>(), 40);

#[derive(FromBytes, KnownLayout, Immutable, Unaligned, Debug)]
#[repr(C)]
struct MdaHeaderRaw {
    checksum: LE_U32,
    signature: [u8; 16],
    version: LE_U32,
    offset: LE_U64,
    size: LE_U64,
}

static_assertions::const_assert_eq!(std::mem::size_of::<MdaHeaderRaw>(), 40);

fn read_exact_at(source: &Arc<dyn ReadAt>, pos: &mut u64, len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    let n = source.read_at(*pos, &mut buf)?;
    if n != len {
        return Err(lvm_err("short read while parsing LVM2 structures"));
    }
    *pos += len as u64;
    Ok(buf)
}

/// Reads `offset`/`size` pairs until an all-zero terminator entry, which is
/// consumed but not returned.
fn read_descriptors(source: &Arc<dyn ReadAt>, pos: &mut u64) -> Result<Vec<(u64, u64)>> {
    let mut out = Vec::new();
    loop {
        let buf = read_exact_at(source, pos, 16)?;
        let offset = u64::from_le_bytes(buf[0..8].try_into().unwrap());
        let size = u64::from_le_bytes(buf[8..16].try_into().unwrap());
        if offset == 0 && size == 0 {
            break;
        }
        out.push((offset, size));
    }
    Ok(out)
}

/// Reads `raw_locn` entries (offset, size, checksum, flags) until an
/// all-zero terminator.
fn read_raw_locns(source: &Arc<dyn ReadAt>, pos: &mut u64) -> Result<Vec<RawLocn>> {
    let mut out = Vec::new();
    loop {
        let buf = read_exact_at(source, pos, 24)?;
        let offset = u64::from_le_bytes(buf[0..8].try_into().unwrap());
        let size = u64::from_le_bytes(buf[8..16].try_into().unwrap());
        let checksum = u32::from_le_bytes(buf[16..20].try_into().unwrap());
        let flags = u32::from_le_bytes(buf[20..24].try_into().unwrap());
        if offset == 0 && size == 0 && checksum == 0 && flags == 0 {
            break;
        }
        out.push(RawLocn { offset, size });
    }
    Ok(out)
}

#[derive(Clone, Copy, Debug)]
struct RawLocn {
    offset: u64,
    size: u64,
}

/// One metadata area: the region of a PV reserved for the circular textual
/// VG metadata buffer.
pub struct MetadataArea {
    header_offset: u64,
    raw_location_descriptors: Vec<RawLocn>,
}

impl MetadataArea {
    fn parse(source: &Arc<dyn ReadAt>, offset: u64) -> Result<MetadataArea> {
        let mut pos = offset;
        let header_bytes = read_exact_at(source, &mut pos, std::mem::size_of::<MdaHeaderRaw>())?;
        let header = MdaHeaderRaw::read_from_bytes(&header_bytes[..])
            .map_err(|_| lvm_err("truncated mda_header"))?;
        let raw_location_descriptors = read_raw_locns(source, &mut pos)?;
        Ok(MetadataArea { header_offset: header.offset.get(), raw_location_descriptors })
    }
}

/// A physical volume: a labeled disk or partition participating in a VG.
pub struct PhysicalVolume {
    pub id: String,
    source: Arc<dyn ReadAt>,
    #[allow(dead_code)]
    volume_size_sectors: u64,
    data_area_descriptors: Vec<(u64, u64)>,
    area_starts: Vec<u64>,
    pub metadata_areas: Vec<MetadataArea>,
}

impl PhysicalVolume {
    pub fn parse(source: Arc<dyn ReadAt>) -> Result<PhysicalVolume> {
        let mut label_offset = None;
        for i in 0..LABEL_SCAN_SECTORS {
            let mut buf = [0u8; std::mem::size_of::<LabelHeaderRaw>()];
            if source.read_at(i * SECTOR_SIZE, &mut buf)? != buf.len() {
                continue;
            }
            if &buf[..8] == LABEL_SIGNATURE {
                label_offset = Some((i * SECTOR_SIZE, u32::from_le_bytes(buf[20..24].try_into().unwrap())));
                break;
            }
        }
        let (label_offset, data_offset) = label_offset
            .ok_or_else(|| Error::BadSignature { scheme: SchemeKind::Lvm2, detail: "no LABELONE signature found in first 4 sectors".into() })?;

        let mut pos = label_offset + data_offset as u64;
        let pv_header_bytes = read_exact_at(&source, &mut pos, std::mem::size_of::<PvHeaderRaw>())?;
        let pv_header = PvHeaderRaw::read_from_bytes(&pv_header_bytes[..]).map_err(|_| lvm_err("truncated pv_header"))?;

        let id_end = pv_header.identifier.iter().position(|&b| b == 0).unwrap_or(pv_header.identifier.len());
        let id = String::from_utf8_lossy(&pv_header.identifier[..id_end]).into_owned();

        let data_area_descriptors = read_descriptors(&source, &mut pos)?;
        let metadata_area_descriptors = read_descriptors(&source, &mut pos)?;

        let mut metadata_areas = Vec::with_capacity(metadata_area_descriptors.len());
        for (desc_offset, _desc_size) in &metadata_area_descriptors {
            metadata_areas.push(MetadataArea::parse(&source, *desc_offset)?);
        }

        let mut area_starts = Vec::with_capacity(data_area_descriptors.len());
        let mut cursor = 0u64;
        for (_offset, size) in &data_area_descriptors {
            area_starts.push(cursor);
            cursor += size;
        }

        Ok(PhysicalVolume {
            id,
            source,
            volume_size_sectors: pv_header.volume_size.get(),
            data_area_descriptors,
            area_starts,
            metadata_areas,
        })
    }

    fn has_metadata(&self) -> bool {
        self.metadata_areas.first().map(|a| !a.raw_location_descriptors.is_empty()).unwrap_or(false)
    }

    /// Reads and decodes the textual VG metadata from this PV's first
    /// metadata area, if it carries one.
    pub fn read_metadata(&self) -> Result<Option<String>> {
        if !self.has_metadata() {
            return Ok(None);
        }
        let area = &self.metadata_areas[0];
        let locn = area.raw_location_descriptors[0];
        let absolute = area.header_offset + locn.offset;
        let len = (locn.size.max(1) - 1) as usize;
        let mut buf = vec![0u8; len];
        self.source.read_at(absolute, &mut buf)?;
        Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
    }
}

impl ReadAt for PhysicalVolume {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        if self.data_area_descriptors.is_empty() {
            return Ok(0);
        }
        let area_idx = self.area_starts.partition_point(|&start| start <= offset).saturating_sub(1);
        let (disk_offset, size) = self.data_area_descriptors[area_idx];
        let area_start = self.area_starts[area_idx];
        let within = offset - area_start;
        let area_size = if size == 0 { u64::MAX - area_start } else { size };
        if within >= area_size {
            return Ok(0);
        }
        let want = buf.len().min((area_size - within) as usize);
        self.source.read_at(disk_offset + within, &mut buf[..want])
    }
}

// ---------------------------------------------------------------------
// Textual VG metadata grammar
// ---------------------------------------------------------------------

/// A parsed value from the textual VG metadata language: LVM2's own
/// stripped-down subset of Python literal syntax (quoted strings, signed
/// integers, and bracketed lists of either), plus nested `name { ... }`
/// sections.
#[derive(Clone, Debug)]
pub enum LvmValue {
    Str(String),
    Num(i64),
    List(Vec<LvmValue>),
    Section(BTreeMap<String, LvmValue>),
}

impl LvmValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            LvmValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_num(&self) -> Option<i64> {
        match self {
            LvmValue::Num(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[LvmValue]> {
        match self {
            LvmValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_section(&self) -> Option<&BTreeMap<String, LvmValue>> {
        match self {
            LvmValue::Section(s) => Some(s),
            _ => None,
        }
    }
}

fn get_str<'a>(attrs: &'a BTreeMap<String, LvmValue>, key: &str) -> Option<&'a str> {
    attrs.get(key).and_then(LvmValue::as_str)
}

fn get_str_required<'a>(attrs: &'a BTreeMap<String, LvmValue>, key: &str) -> Result<&'a str> {
    get_str(attrs, key).ok_or_else(|| lvm_err(format!("missing required string field {key:?}")))
}

fn get_num(attrs: &BTreeMap<String, LvmValue>, key: &str) -> Option<i64> {
    attrs.get(key).and_then(LvmValue::as_num)
}

fn get_num_required(attrs: &BTreeMap<String, LvmValue>, key: &str) -> Result<i64> {
    get_num(attrs, key).ok_or_else(|| lvm_err(format!("missing required numeric field {key:?}")))
}

fn get_str_list(attrs: &BTreeMap<String, LvmValue>, key: &str) -> Vec<String> {
    attrs
        .get(key)
        .and_then(LvmValue::as_list)
        .map(|items| items.iter().filter_map(LvmValue::as_str).map(str::to_string).collect())
        .unwrap_or_default()
}

fn get_section<'a>(attrs: &'a BTreeMap<String, LvmValue>, key: &str) -> Option<&'a BTreeMap<String, LvmValue>> {
    attrs.get(key).and_then(LvmValue::as_section)
}

/// Strips a trailing `# ...` comment, unless a `"` appears anywhere after
/// the `#` on the same line (mirrors the source's `#[^"]+?$` regex).
fn strip_comment(line: &str) -> String {
    let bytes = line.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if b == b'#' && !line[i + 1..].contains('"') {
            return line[..i].to_string();
        }
    }
    line.to_string()
}

fn parse_atom(s: &str) -> Result<LvmValue> {
    let s = s.trim();
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        return Ok(LvmValue::Str(s[1..s.len() - 1].replace("\\\"", "\"")));
    }
    s.parse::<i64>().map(LvmValue::Num).map_err(|_| lvm_err(format!("cannot parse LVM metadata value {s:?}")))
}

fn parse_value(s: &str) -> Result<LvmValue> {
    let s = s.trim();
    if let Some(inner) = s.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
        let mut items = Vec::new();
        for part in inner.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            items.push(parse_atom(part)?);
        }
        return Ok(LvmValue::List(items));
    }
    parse_atom(s)
}

fn parse_keyvalue(first_line: &str, lines: &[String], idx: &mut usize) -> Result<(String, LvmValue)> {
    let (k, v) = first_line.split_once('=').ok_or_else(|| lvm_err(format!("malformed key=value line {first_line:?}")))?;
    let mut v = v.trim().to_string();
    if v.starts_with('[') && !v.trim_end().ends_with(']') {
        while *idx < lines.len() {
            let next = &lines[*idx];
            *idx += 1;
            let ends = next.trim_end().ends_with(']');
            v.push_str(next);
            if ends {
                break;
            }
        }
    }
    Ok((k.trim().to_string(), parse_value(&v)?))
}

/// Parses the textual VG metadata blob into `(vg_name, vg_section,
/// global_params)`.
fn parse_metadata_text(text: &str) -> Result<(String, BTreeMap<String, LvmValue>, BTreeMap<String, LvmValue>)> {
    let lines: Vec<String> = text.lines().map(strip_comment).collect();
    let mut root: BTreeMap<String, LvmValue> = BTreeMap::new();
    let mut global_params: BTreeMap<String, LvmValue> = BTreeMap::new();
    let mut stack: Vec<(String, BTreeMap<String, LvmValue>)> = Vec::new();

    let mut idx = 0;
    while idx < lines.len() {
        let line = lines[idx].trim().to_string();
        idx += 1;
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(name) = line.strip_suffix('{') {
            stack.push((name.trim().to_string(), BTreeMap::new()));
            continue;
        }
        if line.ends_with('}') {
            let (name, map) = stack.pop().ok_or_else(|| lvm_err("unbalanced '}' in VG metadata"))?;
            let parent = stack.last_mut().map(|(_, m)| m).unwrap_or(&mut root);
            parent.insert(name, LvmValue::Section(map));
            continue;
        }
        let (k, v) = parse_keyvalue(&line, &lines, &mut idx)?;
        match stack.last_mut() {
            Some((_, m)) => m.insert(k, v),
            None => global_params.insert(k, v),
        };
    }

    if !stack.is_empty() {
        return Err(lvm_err("unterminated section in VG metadata"));
    }
    if root.len() != 1 {
        return Err(lvm_err(format!("expected exactly one volume group in metadata, found {}", root.len())));
    }
    let (vg_name, vg_value) = root.into_iter().next().unwrap();
    let vg_dict = vg_value.as_section().cloned().ok_or_else(|| lvm_err("volume group entry is not a section"))?;
    Ok((vg_name, vg_dict, global_params))
}

// ---------------------------------------------------------------------
// Typed metadata view
// ---------------------------------------------------------------------

pub struct PhysicalVolumeMeta {
    pub name: String,
    pub attrs: BTreeMap<String, LvmValue>,
}

pub struct StripeMeta {
    pub physical_volume_name: String,
    pub extent_offset: u64,
}

pub struct SegmentMeta {
    pub name: String,
    pub start_extent: u64,
    pub extent_count: u64,
    pub seg_type: String,
    pub flags: Vec<String>,
    pub stripes: Vec<StripeMeta>,
    pub attrs: BTreeMap<String, LvmValue>,
}

impl SegmentMeta {
    fn from_section(name: &str, section: &BTreeMap<String, LvmValue>) -> Result<SegmentMeta> {
        let start_extent = get_num_required(section, "start_extent")? as u64;
        let extent_count = get_num_required(section, "extent_count")? as u64;
        let type_field = get_str_required(section, "type")?;
        let mut parts = type_field.split('+');
        let seg_type = parts.next().unwrap_or_default().to_string();
        let flags = parts.map(str::to_string).collect();

        let stripes = section
            .get("stripes")
            .and_then(LvmValue::as_list)
            .map(|items| {
                items
                    .chunks(2)
                    .filter_map(|pair| {
                        let pv_name = pair.first()?.as_str()?.to_string();
                        let extent_offset = pair.get(1)?.as_num()? as u64;
                        Some(StripeMeta { physical_volume_name: pv_name, extent_offset })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(SegmentMeta { name: name.to_string(), start_extent, extent_count, seg_type, flags, stripes, attrs: section.clone() })
    }
}

pub struct LogicalVolumeMeta {
    pub name: String,
    pub attrs: BTreeMap<String, LvmValue>,
    pub segments: Vec<SegmentMeta>,
}

pub struct VolumeGroupMeta {
    pub name: String,
    pub attrs: BTreeMap<String, LvmValue>,
    pub physical_volumes: Vec<PhysicalVolumeMeta>,
    pub logical_volumes: Vec<LogicalVolumeMeta>,
}

impl VolumeGroupMeta {
    fn from_section(name: String, vg_dict: BTreeMap<String, LvmValue>) -> Result<VolumeGroupMeta> {
        let physical_volumes = get_section(&vg_dict, "physical_volumes")
            .map(|pvs| {
                pvs.iter()
                    .filter_map(|(k, v)| v.as_section().map(|s| PhysicalVolumeMeta { name: k.clone(), attrs: s.clone() }))
                    .collect()
            })
            .unwrap_or_default();

        let logical_volumes = get_section(&vg_dict, "logical_volumes")
            .map(|lvs| -> Result<Vec<LogicalVolumeMeta>> {
                lvs.iter()
                    .filter_map(|(k, v)| v.as_section().map(|s| (k, s)))
                    .map(|(name, section)| {
                        let mut segments = Vec::new();
                        for (seg_name, seg_value) in section {
                            if !seg_name.starts_with("segment") || seg_name == "segment_count" {
                                continue;
                            }
                            let Some(seg_section) = seg_value.as_section() else { continue };
                            if get_str(seg_section, "type") == Some("snapshot") {
                                continue;
                            }
                            segments.push(SegmentMeta::from_section(seg_name, seg_section)?);
                        }
                        segments.sort_by_key(|s| s.start_extent);
                        Ok(LogicalVolumeMeta { name: name.clone(), attrs: section.clone(), segments })
                    })
                    .collect()
            })
            .transpose()?
            .unwrap_or_default();

        let mut attrs = vg_dict;
        attrs.remove("physical_volumes");
        attrs.remove("logical_volumes");

        Ok(VolumeGroupMeta { name, attrs, physical_volumes, logical_volumes })
    }
}

pub struct Metadata {
    pub volume_group: VolumeGroupMeta,
    pub globals: BTreeMap<String, LvmValue>,
}

impl Metadata {
    pub fn parse(text: &str) -> Result<Metadata> {
        let (name, vg_dict, globals) = parse_metadata_text(text)?;
        Ok(Metadata { volume_group: VolumeGroupMeta::from_section(name, vg_dict)?, globals })
    }
}

// ---------------------------------------------------------------------
// Segment types — one struct per LVM2 segment kind
// ---------------------------------------------------------------------

pub struct StripedSegment {
    pub stripe_count: i64,
    pub stripe_size: Option<i64>,
    pub stripes: Vec<StripeMeta>,
}

pub struct MirrorSegment {
    pub mirror_count: i64,
    pub mirrors: Vec<String>,
}

pub struct ThinSegment {
    pub thin_pool: String,
    pub transaction_id: i64,
    pub device_id: Option<i64>,
}

pub struct ThinPoolSegment {
    pub metadata: String,
    pub pool: String,
    pub transaction_id: i64,
    pub chunk_size: i64,
    cached_pool: Mutex<Option<Arc<ThinPool>>>,
}

pub struct WriteCacheSegment {
    pub origin: Option<String>,
    pub writecache: Option<String>,
    pub writecache_block_size: i64,
}

pub struct CacheSegment {
    pub cache_pool: String,
    pub origin: String,
}

pub struct CachePoolSegment {
    pub data: String,
    pub metadata: String,
}

pub struct IntegritySegment {
    pub origin: String,
    pub meta_dev: Option<String>,
}

pub struct VdoSegment {
    pub vdo_pool: String,
}

pub struct VdoPoolSegment {
    pub data: String,
}

pub struct RaidSegment {
    pub device_count: i64,
    pub stripe_count: i64,
}

pub enum SegmentKind {
    Striped(StripedSegment),
    Mirror(MirrorSegment),
    Thin(ThinSegment),
    ThinPool(ThinPoolSegment),
    WriteCache(WriteCacheSegment),
    Cache(CacheSegment),
    CachePool(CachePoolSegment),
    Integrity(IntegritySegment),
    Vdo(VdoSegment),
    VdoPool(VdoPoolSegment),
    Raid(RaidSegment),
    Error,
    Free,
    Zero,
    Unknown(String),
}

pub struct Segment {
    pub name: String,
    pub start_extent: u64,
    pub extent_count: u64,
    pub flags: Vec<String>,
    pub kind: SegmentKind,
}

fn build_segment(meta: &SegmentMeta) -> Result<Segment> {
    let attrs = &meta.attrs;
    let kind = match meta.seg_type.as_str() {
        "linear" | "striped" => SegmentKind::Striped(StripedSegment {
            stripe_count: get_num_required(attrs, "stripe_count")?,
            stripe_size: get_num(attrs, "stripe_size"),
            stripes: meta
                .stripes
                .iter()
                .map(|s| StripeMeta { physical_volume_name: s.physical_volume_name.clone(), extent_offset: s.extent_offset })
                .collect(),
        }),
        "mirror" => SegmentKind::Mirror(MirrorSegment {
            mirror_count: get_num_required(attrs, "mirror_count")?,
            mirrors: get_str_list(attrs, "mirrors"),
        }),
        "thin" => SegmentKind::Thin(ThinSegment {
            thin_pool: get_str_required(attrs, "thin_pool")?.to_string(),
            transaction_id: get_num_required(attrs, "transaction_id")?,
            device_id: get_num(attrs, "device_id"),
        }),
        "thin-pool" => SegmentKind::ThinPool(ThinPoolSegment {
            metadata: get_str_required(attrs, "metadata")?.to_string(),
            pool: get_str_required(attrs, "pool")?.to_string(),
            transaction_id: get_num_required(attrs, "transaction_id")?,
            chunk_size: get_num_required(attrs, "chunk_size")?,
            cached_pool: Mutex::new(None),
        }),
        "writecache" => SegmentKind::WriteCache(WriteCacheSegment {
            origin: get_str(attrs, "origin").map(str::to_string),
            writecache: get_str(attrs, "writecache").map(str::to_string),
            writecache_block_size: get_num_required(attrs, "writecache_block_size")?,
        }),
        "cache" => SegmentKind::Cache(CacheSegment {
            cache_pool: get_str_required(attrs, "cache_pool")?.to_string(),
            origin: get_str_required(attrs, "origin")?.to_string(),
        }),
        "cache-pool" => SegmentKind::CachePool(CachePoolSegment {
            data: get_str_required(attrs, "data")?.to_string(),
            metadata: get_str_required(attrs, "metadata")?.to_string(),
        }),
        "integrity" => SegmentKind::Integrity(IntegritySegment {
            origin: get_str_required(attrs, "origin")?.to_string(),
            meta_dev: get_str(attrs, "meta_dev").map(str::to_string),
        }),
        "vdo" => SegmentKind::Vdo(VdoSegment { vdo_pool: get_str_required(attrs, "vdo_pool")?.to_string() }),
        "vdo-pool" => SegmentKind::VdoPool(VdoPoolSegment { data: get_str_required(attrs, "data")?.to_string() }),
        "raid" | "raid0" | "raid0_meta" | "raid1" | "raid10" | "raid10_near" | "raid4" | "raid5" | "raid5_n" | "raid5_la"
        | "raid5_ls" | "raid5_ra" | "raid5_rs" | "raid6" | "raid6_nc" | "raid6_nr" | "raid6_zr" | "raid6_la_6" | "raid6_ls_6"
        | "raid6_ra_6" | "raid6_rs_6" | "raid6_n_6" => SegmentKind::Raid(RaidSegment {
            device_count: get_num_required(attrs, "device_count")?,
            stripe_count: get_num_required(attrs, "stripe_count")?,
        }),
        "error" => SegmentKind::Error,
        "free" => SegmentKind::Free,
        "zero" => SegmentKind::Zero,
        other => SegmentKind::Unknown(other.to_string()),
    };

    Ok(Segment { name: meta.name.clone(), start_extent: meta.start_extent, extent_count: meta.extent_count, flags: meta.flags.clone(), kind })
}

// ---------------------------------------------------------------------
// Volume group / logical volume aggregation
// ---------------------------------------------------------------------

pub struct LogicalVolume {
    pub name: String,
    pub id: String,
    pub segments: Vec<Segment>,
    pub size: u64,
}

impl LogicalVolume {
    /// Opens this logical volume's full address space by composing each
    /// segment's backing store into a single mapping.
    pub fn open(&self, vg: &VolumeGroup) -> Result<Box<dyn ReadSeek>> {
        let mut stream = MappingStream::new();
        let mut offset = 0u64;
        for segment in &self.segments {
            let size = segment.extent_count * vg.extent_size * SECTOR_SIZE;
            let source = segment.open(vg)?;
            stream.add(offset, size, source, 0);
            offset += size;
        }
        let len = stream.len();
        Ok(Box::new(DiskCursor::new(Arc::new(stream), len)))
    }
}

impl Segment {
    /// Opens this segment's backing store as a flat `[0, extent_count *
    /// extent_size)` byte range.
    pub fn open(&self, vg: &VolumeGroup) -> Result<Arc<dyn ReadAt>> {
        match &self.kind {
            SegmentKind::Striped(s) => s.open(vg, self.extent_count),
            SegmentKind::Mirror(s) => s.open(vg),
            SegmentKind::Thin(s) => s.open(vg, self.extent_count),
            SegmentKind::ThinPool(_) => {
                Err(Error::InvalidLayout("opening a thin-pool segment directly is not possible, use open_pool() on it instead".into()))
            }
            SegmentKind::WriteCache(_) => Err(Error::NotImplemented("writecache segment".into())),
            SegmentKind::Cache(_) => Err(Error::NotImplemented("cache segment".into())),
            SegmentKind::CachePool(_) => Err(Error::NotImplemented("cache-pool segment".into())),
            SegmentKind::Integrity(_) => Err(Error::NotImplemented("integrity segment".into())),
            SegmentKind::Vdo(_) => Err(Error::NotImplemented("vdo segment".into())),
            SegmentKind::VdoPool(_) => Err(Error::NotImplemented("vdo-pool segment".into())),
            SegmentKind::Raid(_) => Err(Error::NotImplemented("raid segment".into())),
            SegmentKind::Error | SegmentKind::Free | SegmentKind::Zero => {
                Err(Error::NotImplemented(format!("{} segment has no readable backing store", self.name)))
            }
            SegmentKind::Unknown(t) => Err(Error::NotImplemented(format!("unknown LVM2 segment type {t:?}"))),
        }
    }
}

impl StripedSegment {
    fn open(&self, vg: &VolumeGroup, extent_count: u64) -> Result<Arc<dyn ReadAt>> {
        let extent_size = vg.extent_size * SECTOR_SIZE;
        let mut stream = MappingStream::new();
        let stripe_size_extents = self.stripe_size.map(|v| v as u64).unwrap_or(extent_count);
        let stripe_size = stripe_size_extents * extent_size;

        let mut offset = 0u64;
        for stripe in &self.stripes {
            let pv = vg
                .pv_by_name
                .get(&stripe.physical_volume_name)
                .ok_or_else(|| Error::MissingDisks(format!("physical volume {} referenced by segment not present", stripe.physical_volume_name)))?;
            stream.add(offset, stripe_size, pv.clone(), stripe.extent_offset * extent_size);
            offset += stripe_size;
        }
        Ok(Arc::new(stream))
    }
}

impl MirrorSegment {
    fn open(&self, vg: &VolumeGroup) -> Result<Arc<dyn ReadAt>> {
        for lv_name in &self.mirrors {
            if let Some(lv) = vg.lv_by_name.get(lv_name) {
                if let Ok(opened) = lv.open(vg) {
                    return Ok(Arc::new(OpenedStream::new(opened)));
                }
            }
        }
        Err(lvm_err("no mirror leg is available to read from"))
    }
}

impl ThinSegment {
    fn open(&self, vg: &VolumeGroup, extent_count: u64) -> Result<Arc<dyn ReadAt>> {
        let thin_pool_lv = vg
            .lv_by_name
            .get(&self.thin_pool)
            .ok_or_else(|| Error::MissingDisks(format!("thin pool logical volume {} not present", self.thin_pool)))?;
        let pool_segment = thin_pool_lv
            .segments
            .first()
            .and_then(|s| match &s.kind {
                SegmentKind::ThinPool(p) => Some(p),
                _ => None,
            })
            .ok_or_else(|| lvm_err(format!("logical volume {} is not a thin-pool", self.thin_pool)))?;

        let pool = pool_segment.open_pool(vg)?;
        let device_id = self.device_id.ok_or_else(|| lvm_err("thin segment has no device_id"))? as u64;
        let size_hint = extent_count * vg.extent_size * SECTOR_SIZE;
        let device = pool.open(device_id, Some(size_hint))?;
        Ok(Arc::new(device))
    }
}

impl ThinPoolSegment {
    /// Opens (and caches) the `ThinPool` backing this segment, composed of
    /// its own `metadata`/`pool` logical volumes opened as plain member
    /// devices.
    pub fn open_pool(&self, vg: &VolumeGroup) -> Result<Arc<ThinPool>> {
        let mut guard = self.cached_pool.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(pool) = guard.as_ref() {
            return Ok(pool.clone());
        }

        let metadata_lv = vg
            .lv_by_name
            .get(&self.metadata)
            .ok_or_else(|| Error::MissingDisks(format!("thin-pool metadata volume {} not present", self.metadata)))?;
        let pool_lv = vg
            .lv_by_name
            .get(&self.pool)
            .ok_or_else(|| Error::MissingDisks(format!("thin-pool data volume {} not present", self.pool)))?;

        let metadata_source: Arc<dyn ReadAt> = Arc::new(OpenedStream::new(metadata_lv.open(vg)?));
        let data_source: Arc<dyn ReadAt> = Arc::new(OpenedStream::new(pool_lv.open(vg)?));

        let pool = Arc::new(ThinPool::new(metadata_source, data_source)?);
        *guard = Some(pool.clone());
        Ok(pool)
    }
}

/// A set of physical volumes sharing a VG, plus the logical volumes built
/// from its textual metadata.
pub struct VolumeGroup {
    pub name: String,
    pub id: String,
    pub extent_size: u64,
    pub physical_volumes: Vec<Arc<PhysicalVolume>>,
    pub logical_volumes: Vec<Arc<LogicalVolume>>,
    pv_by_name: BTreeMap<String, Arc<PhysicalVolume>>,
    lv_by_name: BTreeMap<String, Arc<LogicalVolume>>,
}

/// The aggregate returned by `open_lvm2`.
pub struct Lvm2 {
    pub volume_group: VolumeGroup,
    pub metadata: Metadata,
}

/// Builds an `Lvm2` view from one or more physical volume sources, reading
/// VG metadata from whichever PV carries a copy.
pub fn open_lvm2(sources: Vec<Arc<dyn ReadAt>>) -> Result<Lvm2> {
    if sources.is_empty() {
        return Err(Error::MissingDisks("no physical volumes given to LVM2".into()));
    }

    let pvs: Vec<Arc<PhysicalVolume>> =
        sources.into_iter().map(|s| PhysicalVolume::parse(s).map(Arc::new)).collect::<Result<_>>()?;

    let mut metadata_text = None;
    for (i, pv) in pvs.iter().enumerate() {
        if let Some(text) = pv.read_metadata()? {
            log::debug!("VG metadata read from physical volume index {i} (id {})", pv.id);
            metadata_text = Some(text);
            break;
        }
    }
    let metadata_text = metadata_text.ok_or_else(|| lvm_err("no physical volume carries VG metadata"))?;
    let metadata = Metadata::parse(&metadata_text)?;

    let mut pv_by_name = BTreeMap::new();
    for pvmeta in &metadata.volume_group.physical_volumes {
        let id = get_str_required(&pvmeta.attrs, "id")?.replace('-', "");
        if let Some(pv) = pvs.iter().find(|pv| pv.id == id) {
            pv_by_name.insert(pvmeta.name.clone(), pv.clone());
        }
    }

    let extent_size = get_num_required(&metadata.volume_group.attrs, "extent_size")? as u64;

    let mut lv_by_name: BTreeMap<String, Arc<LogicalVolume>> = BTreeMap::new();
    let mut logical_volumes = Vec::with_capacity(metadata.volume_group.logical_volumes.len());
    for lvmeta in &metadata.volume_group.logical_volumes {
        let segments = lvmeta.segments.iter().map(build_segment).collect::<Result<Vec<_>>>()?;
        let size = segments.iter().map(|s| s.extent_count).sum::<u64>() * extent_size * SECTOR_SIZE;
        let id = get_str(&lvmeta.attrs, "id").unwrap_or_default().to_string();
        let lv = Arc::new(LogicalVolume { name: lvmeta.name.clone(), id, segments, size });
        lv_by_name.insert(lvmeta.name.clone(), lv.clone());
        logical_volumes.push(lv);
    }

    log::debug!(
        "LVM2 VG {} has {} physical volume(s) and {} logical volume(s)",
        metadata.volume_group.name,
        pv_by_name.len(),
        lv_by_name.len()
    );
    let vg = VolumeGroup {
        name: metadata.volume_group.name.clone(),
        id: get_str(&metadata.volume_group.attrs, "id").unwrap_or_default().to_string(),
        extent_size,
        physical_volumes: pvs,
        logical_volumes,
        pv_by_name,
        lv_by_name,
    };

    Ok(Lvm2 { volume_group: vg, metadata })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_comment_keeps_hash_followed_by_quote() {
        assert_eq!(strip_comment("foo = 1 # trailing comment"), "foo = 1 ");
        assert_eq!(strip_comment(r#"foo = "a#b""#), r#"foo = "a#b""#);
    }

    #[test]
    fn parse_value_handles_strings_numbers_and_lists() {
        assert!(matches!(parse_value(r#""hello""#).unwrap(), LvmValue::Str(s) if s == "hello"));
        assert!(matches!(parse_value("42").unwrap(), LvmValue::Num(42)));
        let LvmValue::List(items) = parse_value(r#"["a", "b", 3]"#).unwrap() else { panic!("expected list") };
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].as_str(), Some("a"));
        assert_eq!(items[2].as_num(), Some(3));
    }

    #[test]
    fn parse_metadata_text_builds_nested_sections() {
        let text = r#"
vg0 {
    id = "abc123"
    extent_size = 8192
    physical_volumes {
        pv0 {
            id = "def456"
        }
    }
    logical_volumes {
        lv0 {
            id = "lv-id"
            segment_count = 1
            segment1 {
                start_extent = 0
                extent_count = 10
                type = "striped"
                stripe_count = 1
                stripes = ["pv0", 0]
            }
        }
    }
}
"#;
        let (name, vg, globals) = parse_metadata_text(text).unwrap();
        assert_eq!(name, "vg0");
        assert!(globals.is_empty());
        assert_eq!(get_str(&vg, "id"), Some("abc123"));
        assert_eq!(get_num(&vg, "extent_size"), Some(8192));

        let parsed = VolumeGroupMeta::from_section(name, vg).unwrap();
        assert_eq!(parsed.physical_volumes.len(), 1);
        assert_eq!(parsed.physical_volumes[0].name, "pv0");
        assert_eq!(parsed.logical_volumes.len(), 1);
        let lv = &parsed.logical_volumes[0];
        assert_eq!(lv.segments.len(), 1);
        assert_eq!(lv.segments[0].seg_type, "striped");
        assert_eq!(lv.segments[0].stripes[0].physical_volume_name, "pv0");
    }

    #[test]
    fn multiline_bracketed_list_is_joined_before_parsing() {
        let text = "foo = [\n\"a\",\n\"b\"]";
        let lines: Vec<String> = text.lines().map(strip_comment).collect();
        let mut idx = 1;
        let (k, v) = parse_keyvalue(&lines[0], &lines, &mut idx).unwrap();
        assert_eq!(k, "foo");
        let LvmValue::List(items) = v else { panic!("expected list") };
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn writecache_segment_uses_dict_style_lookup_for_every_field() {
        let mut attrs = BTreeMap::new();
        attrs.insert("origin".to_string(), LvmValue::Str("o".to_string()));
        attrs.insert("writecache".to_string(), LvmValue::Str("w".to_string()));
        attrs.insert("writecache_block_size".to_string(), LvmValue::Num(4096));
        let meta = SegmentMeta {
            name: "segment1".into(),
            start_extent: 0,
            extent_count: 1,
            seg_type: "writecache".into(),
            flags: vec![],
            stripes: vec![],
            attrs,
        };
        let seg = build_segment(&meta).unwrap();
        let SegmentKind::WriteCache(wc) = seg.kind else { panic!("expected writecache") };
        assert_eq!(wc.origin.as_deref(), Some("o"));
        assert_eq!(wc.writecache.as_deref(), Some("w"));
        assert_eq!(wc.writecache_block_size, 4096);
    }
}
