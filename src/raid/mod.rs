//! RAID address translation — the heart of the system.
//!
//! This module holds the family-agnostic data model (`PhysicalDisk`,
//! `VirtualDisk`, `Configuration`, `Raid`) shared by the MD, DDF, and Vinum
//! decoders, plus the `Level`/`Layout` enumerations below.
//! The actual stream backends (`LinearStream`, `RAID0Stream`,
//! `RAID456Stream`, `RAID10Stream`) live in [`stream`].

pub mod stream;

use crate::error::{Error, Result};
use crate::stream::{ReadAt, ReadSeek};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// RAID level, normalized across the MD/DDF/Vinum families.
///
/// Mirrors `original_source/dissect/volume/raid/stream.py`'s `Level`
/// IntEnum exactly, including the negative `Linear` discriminant.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Level {
    Linear,
    Raid0,
    Raid1,
    Raid3,
    Raid4,
    Raid5,
    Raid6,
    Raid10,
}

impl Level {
    pub fn as_i32(self) -> i32 {
        match self {
            Level::Linear => -1,
            Level::Raid0 => 0,
            Level::Raid1 => 1,
            Level::Raid3 => 3,
            Level::Raid4 => 4,
            Level::Raid5 => 5,
            Level::Raid6 => 6,
            Level::Raid10 => 10,
        }
    }

    pub fn from_i32(v: i32) -> Option<Level> {
        match v {
            -1 => Some(Level::Linear),
            0 => Some(Level::Raid0),
            1 => Some(Level::Raid1),
            3 => Some(Level::Raid3),
            4 => Some(Level::Raid4),
            5 => Some(Level::Raid5),
            6 => Some(Level::Raid6),
            10 => Some(Level::Raid10),
            _ => None,
        }
    }

    /// Maximum number of role disks that may be absent and still serve
    /// every stripe, matching the partial-configuration tolerance rules.
    pub fn max_degraded(self) -> usize {
        match self {
            Level::Raid6 => 2,
            Level::Raid4 | Level::Raid5 => 1,
            _ => 0,
        }
    }
}

/// RAID5/6 rotation layouts. Meaning depends on `Level`. RAID10 packs its
/// own bitfields into the same integer (near copies, far copies, far
/// offset, far-set-size policy) rather than using named variants, so it is
/// kept as a raw `u32` accessed through [`Raid10Layout`].
pub mod layout {
    pub const LEFT_ASYMMETRIC: u32 = 0;
    pub const RIGHT_ASYMMETRIC: u32 = 1;
    pub const LEFT_SYMMETRIC: u32 = 2;
    pub const RIGHT_SYMMETRIC: u32 = 3;
    pub const PARITY_0: u32 = 4;
    pub const PARITY_N: u32 = 5;
    pub const ROTATING_ZERO_RESTART: u32 = 8;
    pub const ROTATING_N_RESTART: u32 = 9;
    pub const ROTATING_N_CONTINUE: u32 = 10;
    pub const LEFT_ASYMMETRIC_6: u32 = 16;
    pub const RIGHT_ASYMMETRIC_6: u32 = 17;
    pub const LEFT_SYMMETRIC_6: u32 = 18;
    pub const RIGHT_SYMMETRIC_6: u32 = 19;
    pub const PARITY_0_6: u32 = 20;
}

/// Far-set-size policy selected by a RAID10 layout's bits ≥17.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FarSetSizePolicy {
    /// `raid_disks` — the original kernel behaviour.
    Original,
    /// `raid_disks / far_copies` — labeled "buggy improved" upstream.
    BuggyImproved,
    /// `far_copies * near_copies` — labeled "fixed improved" upstream.
    FixedImproved,
}

/// Decoded RAID10 layout bitfields.
#[derive(Clone, Copy, Debug)]
pub struct Raid10Layout {
    pub near_copies: u32,
    pub far_copies: u32,
    pub far_offset: bool,
    pub far_set_size_policy: FarSetSizePolicy,
}

impl Raid10Layout {
    pub fn decode(layout: u32) -> Raid10Layout {
        let near_copies = layout & 0xFF;
        let far_copies = (layout >> 8) & 0xFF;
        let far_offset = layout & (1 << 16) != 0;
        let policy = match layout >> 17 {
            1 => FarSetSizePolicy::BuggyImproved,
            2 => FarSetSizePolicy::FixedImproved,
            _ => FarSetSizePolicy::Original,
        };
        Raid10Layout { near_copies, far_copies, far_offset, far_set_size_policy: policy }
    }

    pub fn far_set_size(&self, raid_disks: u32) -> u32 {
        match self.far_set_size_policy {
            FarSetSizePolicy::Original => raid_disks,
            FarSetSizePolicy::BuggyImproved => raid_disks / self.far_copies.max(1),
            FarSetSizePolicy::FixedImproved => self.far_copies * self.near_copies,
        }
    }
}

/// An owned handle to one backing byte stream plus the byte range within
/// it that holds usable data.
pub struct PhysicalDisk {
    pub source: Arc<dyn ReadAt>,
    pub data_offset: u64,
    pub data_size: u64,
}

impl PhysicalDisk {
    pub fn new(source: Arc<dyn ReadAt>, data_offset: u64, data_size: u64) -> PhysicalDisk {
        PhysicalDisk { source, data_offset, data_size }
    }

    pub fn size(&self) -> u64 {
        self.data_size
    }

    /// A read-at handle clamped to this disk's data region.
    pub fn range(&self) -> crate::stream::RangeStream {
        crate::stream::RangeStream::new(self.source.clone(), self.data_offset, self.data_size)
    }
}

/// Role index → (intra-disk byte offset of this role's data region,
/// backing disk). Absent roles are simply missing keys.
pub type DiskMap = BTreeMap<u32, (u64, Arc<PhysicalDisk>)>;

/// A reconstructed logical volume.
pub struct VirtualDisk {
    pub name: String,
    pub uuid: Uuid,
    pub size: u64,
    pub level: Level,
    pub layout: u32,
    pub stripe_size: u64,
    pub num_disks: u32,
    pub disk_map: DiskMap,
}

impl VirtualDisk {
    /// Dispatches by level to the matching stream backend.
    pub fn open(&self) -> Result<Box<dyn ReadSeek>> {
        log::debug!(
            "opening virtual disk {} ({:?}, {} role(s), stripe={})",
            self.name,
            self.level,
            self.num_disks,
            self.stripe_size
        );
        match self.level {
            Level::Linear => stream::open_linear(self),
            Level::Raid0 => stream::open_raid0(self),
            Level::Raid1 => stream::open_raid1(self),
            Level::Raid3 | Level::Raid4 | Level::Raid5 | Level::Raid6 => {
                stream::open_raid456(self)
            }
            Level::Raid10 => stream::open_raid10(self),
        }
    }
}

/// A set of `PhysicalDisk`s known to belong together, plus the derived
/// `VirtualDisk`s.
pub struct Configuration {
    pub set_uuid: Uuid,
    pub physical_disks: Vec<Arc<PhysicalDisk>>,
    pub virtual_disks: Vec<VirtualDisk>,
}

impl Configuration {
    pub fn virtual_disks(&self) -> &[VirtualDisk] {
        &self.virtual_disks
    }
}

/// The aggregate returned by `open_md`/`open_ddf`/`open_vinum`.
pub struct Raid {
    pub configurations: Vec<Configuration>,
}

impl Raid {
    pub fn configurations(&self) -> &[Configuration] {
        &self.configurations
    }
}

/// Validates that every role in `0..num_disks` is present, per the RAID0
/// / LINEAR "every role must be present" invariant.
pub fn require_all_roles(disk_map: &DiskMap, num_disks: u32) -> Result<()> {
    for role in 0..num_disks {
        if !disk_map.contains_key(&role) {
            log::warn!("role {role} of {num_disks} is absent from disk map");
            return Err(Error::MissingDisks(format!(
                "role {role} of {num_disks} is absent"
            )));
        }
    }
    Ok(())
}
