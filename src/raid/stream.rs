//! Stream backends that translate a logical `VirtualDisk` offset into
//! `(disk, physical_offset)` pairs.
//!
//! Each backend is a [`ReadAt`] impl that performs the family's address
//! translation per read, then is wrapped in [`crate::stream::Cursor`] to
//! produce the `Box<dyn ReadSeek>` the public `VirtualDisk::open()`
//! contract promises. Ground truth for the per-level math is
//! `original_source/dissect/volume/raid/stream.py`.

use super::{DiskMap, Level, Raid10Layout, VirtualDisk, layout, require_all_roles};
use crate::error::{Error, Result};
use crate::stream::{Cursor, MappingStream, ReadAt, ReadSeek};
use std::io;
use std::sync::Arc;

/// Default stripe size used when a `VirtualDisk`'s recorded `stripe_size`
/// is zero.
const DEFAULT_STRIPE_SIZE: u64 = 64 * 1024;

fn effective_stripe_size(vd: &VirtualDisk) -> u64 {
    if vd.stripe_size == 0 { DEFAULT_STRIPE_SIZE } else { vd.stripe_size }
}

/// LINEAR: concatenates members in role order.
pub fn open_linear(vd: &VirtualDisk) -> Result<Box<dyn ReadSeek>> {
    require_all_roles(&vd.disk_map, vd.num_disks)?;

    let mut mapping = MappingStream::new();
    let mut offset = 0u64;
    for role in 0..vd.num_disks {
        let (disk_offset, disk) = &vd.disk_map[&role];
        let size = disk.size();
        let range: Arc<dyn ReadAt> = Arc::new(disk.range());
        mapping.add(offset, size, range, *disk_offset);
        offset += size;
    }
    Ok(Box::new(Cursor::new(Arc::new(mapping), vd.size)))
}

/// A contiguous strip zone: `zone_end` is the absolute logical offset the
/// zone ends at, `dev_start` is the rounded-down byte offset into each
/// member where the zone's data begins, and `devices` lists the members
/// participating in the zone in role order.
struct Zone {
    zone_end: u64,
    dev_start: u64,
    devices: Vec<(u64, Arc<super::PhysicalDisk>)>,
}

fn rounded_size(size: u64, stripe_size: u64) -> u64 {
    (size / stripe_size) * stripe_size
}

/// Builds the multi-zone layout for RAID0 members of unequal size, per
/// the zone-construction algorithm below.
fn build_zones(vd: &VirtualDisk, stripe_size: u64) -> Vec<Zone> {
    let disks: Vec<(u32, u64, Arc<super::PhysicalDisk>)> =
        vd.disk_map.iter().map(|(role, (off, disk))| (*role, *off, disk.clone())).collect();

    let rounded: Vec<u64> = disks.iter().map(|(_, _, d)| rounded_size(d.size(), stripe_size)).collect();

    let mut num_strip_zones = 0usize;
    for i in 0..disks.len() {
        let mut has_same_size = false;
        for j in 0..i {
            if rounded[i] == disks[j].2.size() {
                has_same_size = true;
                break;
            }
        }
        if !has_same_size {
            num_strip_zones += 1;
        }
    }

    let mut smallest_idx = 0usize;
    for i in 1..disks.len() {
        if rounded[i] < rounded[smallest_idx] {
            smallest_idx = i;
        }
    }

    let mut zones = vec![Zone {
        zone_end: rounded[smallest_idx] * disks.len() as u64,
        dev_start: 0,
        devices: disks.iter().map(|(_, off, d)| (*off, d.clone())).collect(),
    }];

    let mut cur_zone_end = zones[0].zone_end;
    let mut cur_smallest = rounded[smallest_idx];
    for _ in 1..num_strip_zones {
        let dev_start = cur_smallest;
        let mut zone_devices = Vec::new();
        let mut next_smallest = None;
        for (i, (_, off, d)) in disks.iter().enumerate() {
            if rounded[i] <= dev_start {
                continue;
            }
            zone_devices.push((*off, d.clone()));
            next_smallest = Some(match next_smallest {
                None => rounded[i],
                Some(s) => s.min(rounded[i]),
            });
        }
        let smallest = next_smallest.unwrap_or(dev_start);
        let num_dev = zone_devices.len() as u64;
        cur_zone_end += (smallest - dev_start) * num_dev;
        zones.push(Zone { zone_end: cur_zone_end, dev_start, devices: zone_devices });
        cur_smallest = smallest;
    }

    zones
}

struct Raid0Stream {
    zones: Vec<Zone>,
    stripe_size: u64,
}

impl Raid0Stream {
    fn find_zone(&self, offset: u64) -> Option<(usize, u64)> {
        for (i, zone) in self.zones.iter().enumerate() {
            if offset < zone.zone_end {
                let offset_in_zone =
                    if i == 0 { offset } else { offset - self.zones[i - 1].zone_end };
                return Some((i, offset_in_zone));
            }
        }
        None
    }
}

impl ReadAt for Raid0Stream {
    fn read_at(&self, mut offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let mut produced = 0usize;
        while produced < buf.len() {
            let Some((zone_idx, offset_in_zone)) = self.find_zone(offset) else { break };
            let zone = &self.zones[zone_idx];

            let read_offset =
                if self.zones.len() == 1 || self.zones[1].devices.len() == 1 { offset } else { offset_in_zone };

            let (stripe, offset_in_stripe) = (read_offset / self.stripe_size, read_offset % self.stripe_size);
            let num_devices = zone.devices.len() as u64;
            let chunk = offset_in_zone / (self.stripe_size * num_devices);
            let offset_in_device = chunk * self.stripe_size + offset_in_stripe;
            let (device_start, device) = &zone.devices[(stripe % num_devices) as usize];

            let stripe_remaining = self.stripe_size - offset_in_stripe;
            let want = (buf.len() - produced).min(stripe_remaining as usize);

            let offset_on_disk = device_start + offset_in_device;
            let n = device.range().read_at(offset_on_disk, &mut buf[produced..produced + want])?;
            if n == 0 {
                break;
            }
            produced += n;
            offset += n as u64;
            if n < want {
                break;
            }
        }
        Ok(produced)
    }

    fn size(&self) -> Option<u64> {
        self.zones.last().map(|z| z.zone_end)
    }
}

/// RAID0: multi-zone striping across members of unequal size.
pub fn open_raid0(vd: &VirtualDisk) -> Result<Box<dyn ReadSeek>> {
    require_all_roles(&vd.disk_map, vd.num_disks)?;
    let stripe_size = effective_stripe_size(vd);
    let zones = build_zones(vd, stripe_size);
    log::debug!("RAID0 {}: {} zone(s), stripe={stripe_size}", vd.name, zones.len());
    let stream = Arc::new(Raid0Stream { zones, stripe_size });
    Ok(Box::new(Cursor::new(stream, vd.size)))
}

/// RAID1 just opens the first available member's range,
/// since every member holds a full mirror of the data.
pub fn open_raid1(vd: &VirtualDisk) -> Result<Box<dyn ReadSeek>> {
    let (disk_offset, disk) = vd
        .disk_map
        .values()
        .next()
        .ok_or_else(|| Error::MissingDisks(format!("no members available for RAID1 set {}", vd.uuid)))?;
    let range: Arc<dyn ReadAt> = Arc::new(disk.range());
    let clamped = crate::stream::RangeStream::new(range, *disk_offset, vd.size);
    Ok(Box::new(Cursor::new(Arc::new(clamped), vd.size)))
}

/// Stripe, data-disk, P-disk, Q-disk (RAID6 only) for one logical offset,
/// per the parity-rotation algorithm table below.
struct StripeInfo {
    stripe: u64,
    offset_in_stripe: u64,
    dd_idx: u32,
}

fn raid456_stripe_info(level: Level, algo: u32, raid_disks: u32, offset: u64, stripe_size: u64) -> Result<StripeInfo> {
    let max_degraded = level.max_degraded().max(1) as u32;
    let data_disks = raid_disks - max_degraded;

    let (stripe_number, offset_in_stripe) = (offset / stripe_size, offset % stripe_size);
    let (stripe, mut dd_idx) = (
        (stripe_number / data_disks as u64) as u64,
        (stripe_number % data_disks as u64) as u32,
    );

    let mut ddf_layout = false;

    if level == Level::Raid4 {
        // pd_idx == data_disks, always the final disk.
    } else if level == Level::Raid5 {
        match algo {
            layout::LEFT_ASYMMETRIC => {
                let pd_idx = data_disks - (stripe as u32 % raid_disks);
                if dd_idx >= pd_idx {
                    dd_idx += 1;
                }
            }
            layout::RIGHT_ASYMMETRIC => {
                let pd_idx = stripe as u32 % raid_disks;
                if dd_idx >= pd_idx {
                    dd_idx += 1;
                }
            }
            layout::LEFT_SYMMETRIC => {
                let pd_idx = data_disks - (stripe as u32 % raid_disks);
                dd_idx = (pd_idx + 1 + dd_idx) % raid_disks;
            }
            layout::RIGHT_SYMMETRIC => {
                let pd_idx = stripe as u32 % raid_disks;
                dd_idx = (pd_idx + 1 + dd_idx) % raid_disks;
            }
            layout::PARITY_0 => {
                dd_idx += 1;
            }
            layout::PARITY_N => {}
            other => return Err(Error::InvalidLayout(format!("RAID5 algorithm {other}"))),
        }
    } else if level == Level::Raid6 {
        match algo {
            layout::LEFT_ASYMMETRIC => {
                let pd_idx = raid_disks - 1 - (stripe as u32 % raid_disks);
                if pd_idx == raid_disks - 1 {
                    dd_idx += 1;
                } else if dd_idx >= pd_idx {
                    dd_idx += 2;
                }
            }
            layout::RIGHT_ASYMMETRIC => {
                let pd_idx = stripe as u32 % raid_disks;
                if pd_idx == raid_disks - 1 {
                    dd_idx += 1;
                } else if dd_idx >= pd_idx {
                    dd_idx += 2;
                }
            }
            layout::LEFT_SYMMETRIC => {
                let pd_idx = raid_disks - 1 - (stripe as u32 % raid_disks);
                dd_idx = (pd_idx + 2 + dd_idx) % raid_disks;
            }
            layout::RIGHT_SYMMETRIC => {
                let pd_idx = stripe as u32 % raid_disks;
                dd_idx = (pd_idx + 2 + dd_idx) % raid_disks;
            }
            layout::PARITY_0 => {
                dd_idx += 2;
            }
            layout::PARITY_N => {}
            layout::ROTATING_ZERO_RESTART | layout::ROTATING_N_RESTART | layout::ROTATING_N_CONTINUE => {
                ddf_layout = true;
            }
            layout::LEFT_ASYMMETRIC_6 => {
                let pd_idx = data_disks - (stripe as u32 % (raid_disks - 1));
                if dd_idx >= pd_idx {
                    dd_idx += 1;
                }
            }
            layout::RIGHT_ASYMMETRIC_6 => {
                let pd_idx = stripe as u32 % (raid_disks - 1);
                if dd_idx >= pd_idx {
                    dd_idx += 1;
                }
            }
            layout::LEFT_SYMMETRIC_6 => {
                let pd_idx = data_disks - (stripe as u32 % (raid_disks - 1));
                dd_idx = (pd_idx + 1 + dd_idx) % (raid_disks - 1);
            }
            layout::RIGHT_SYMMETRIC_6 => {
                let pd_idx = stripe as u32 % (raid_disks - 1);
                dd_idx = (pd_idx + 1 + dd_idx) % (raid_disks - 1);
            }
            layout::PARITY_0_6 => {
                dd_idx += 1;
            }
            other => return Err(Error::InvalidLayout(format!("RAID6 algorithm {other}"))),
        }
    } else {
        return Err(Error::InvalidLayout(format!("RAID level {level:?} unsupported by RAID456Stream")));
    }

    if ddf_layout {
        log::warn!("RAID6 rotating algorithm {algo} has no data-disk mapping (DDF layout)");
        return Err(Error::NotImplemented("DDF layout".into()));
    }

    Ok(StripeInfo { stripe: stripe as u64, offset_in_stripe, dd_idx })
}

struct Raid456Stream {
    disk_map: DiskMap,
    stripe_size: u64,
    level: Level,
    layout: u32,
    num_disks: u32,
    size: u64,
}

impl ReadAt for Raid456Stream {
    fn read_at(&self, mut offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let mut produced = 0usize;
        while produced < buf.len() {
            let info = match raid456_stripe_info(self.level, self.layout, self.num_disks, offset, self.stripe_size) {
                Ok(i) => i,
                Err(e) => return Err(io::Error::new(io::ErrorKind::Other, e.to_string())),
            };
            let offset_in_device = info.stripe * self.stripe_size + info.offset_in_stripe;
            let Some((dd_start, dd_disk)) = self.disk_map.get(&info.dd_idx) else {
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    format!("data disk role {} absent", info.dd_idx),
                ));
            };

            let stripe_remaining = self.stripe_size - info.offset_in_stripe;
            let want = (buf.len() - produced).min(stripe_remaining as usize);

            let offset_on_disk = dd_start + offset_in_device;
            let n = dd_disk.range().read_at(offset_on_disk, &mut buf[produced..produced + want])?;
            if n == 0 {
                break;
            }
            produced += n;
            offset += n as u64;
            if n < want {
                break;
            }
        }
        Ok(produced)
    }

    fn size(&self) -> Option<u64> {
        Some(self.size)
    }
}

/// RAID4/5/6 parity-rotation address translation.
pub fn open_raid456(vd: &VirtualDisk) -> Result<Box<dyn ReadSeek>> {
    let max_degraded = vd.level.max_degraded().max(1) as u32;
    if (vd.disk_map.len() as u32) < vd.num_disks - max_degraded {
        return Err(Error::MissingDisks(format!(
            "{:?} set {} has {} of {} disks (max {} degraded)",
            vd.level,
            vd.uuid,
            vd.disk_map.len(),
            vd.num_disks,
            max_degraded
        )));
    }
    if (vd.disk_map.len() as u32) < vd.num_disks {
        log::warn!(
            "{:?} set {} opening degraded: {} of {} disks present",
            vd.level,
            vd.uuid,
            vd.disk_map.len(),
            vd.num_disks
        );
    }
    let stripe_size = effective_stripe_size(vd);
    let stream = Arc::new(Raid456Stream {
        disk_map: vd.disk_map.clone(),
        stripe_size,
        level: vd.level,
        layout: vd.layout,
        num_disks: vd.num_disks,
        size: vd.size,
    });
    Ok(Box::new(Cursor::new(stream, vd.size)))
}

struct Raid10Stream {
    disk_map: DiskMap,
    stripe_size: u64,
    raid_disks: u32,
    near_copies: u32,
    far_copies: u32,
    far_offset: bool,
    size: u64,
}

impl ReadAt for Raid10Stream {
    fn read_at(&self, mut offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let mut produced = 0usize;
        while produced < buf.len() {
            // Mirrors the kernel's __raid10_find_phys address split.
            let (stripe_number, offset_in_stripe) = (offset / self.stripe_size, offset % self.stripe_size);
            let chunk = stripe_number * self.near_copies as u64;
            let (mut stripe, dev) = (chunk / self.raid_disks as u64, (chunk % self.raid_disks as u64) as u32);
            if self.far_offset {
                stripe *= self.far_copies as u64;
            }

            let stripe_remaining = self.stripe_size - offset_in_stripe;
            let want = (buf.len() - produced).min(stripe_remaining as usize);

            // Try `dev`, then successive mirror copies, since a missing first copy
            // flags "read only the first copy" as a bug to fix rather than
            // preserve: walk the near-copy ring looking for a present role.
            let mut found = None;
            for k in 0..self.near_copies.max(1) {
                let candidate = (dev + k) % self.raid_disks;
                if let Some(entry) = self.disk_map.get(&candidate) {
                    found = Some(entry);
                    break;
                }
            }
            let Some((device_start, device)) = found else {
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    format!("no copy of role {dev} available in RAID10 set"),
                ));
            };

            let offset_on_disk = device_start + stripe * self.stripe_size + offset_in_stripe;
            let n = device.range().read_at(offset_on_disk, &mut buf[produced..produced + want])?;
            if n == 0 {
                break;
            }
            produced += n;
            offset += n as u64;
            if n < want {
                break;
            }
        }
        Ok(produced)
    }

    fn size(&self) -> Option<u64> {
        Some(self.size)
    }
}

/// RAID10 near/far/offset address translation. Unlike
/// the reference implementation, a missing copy-0 member
/// falls through to the next mirror copy instead of failing the read.
pub fn open_raid10(vd: &VirtualDisk) -> Result<Box<dyn ReadSeek>> {
    if vd.disk_map.is_empty() {
        return Err(Error::MissingDisks(format!("RAID10 set {} has no members", vd.uuid)));
    }
    let stripe_size = effective_stripe_size(vd);
    let Raid10Layout { near_copies, far_copies, far_offset, .. } = Raid10Layout::decode(vd.layout);
    log::debug!(
        "RAID10 {}: near={near_copies} far={far_copies} far_offset={far_offset}",
        vd.uuid
    );
    let stream = Arc::new(Raid10Stream {
        disk_map: vd.disk_map.clone(),
        stripe_size,
        raid_disks: vd.num_disks,
        near_copies: near_copies.max(1),
        far_copies: far_copies.max(1),
        far_offset,
        size: vd.size,
    });
    Ok(Box::new(Cursor::new(stream, vd.size)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raid::PhysicalDisk;
    use std::io::{Cursor as IoCursor, Read};
    use std::sync::Mutex;

    fn disk(bytes: Vec<u8>) -> Arc<PhysicalDisk> {
        let len = bytes.len() as u64;
        let shared: crate::stream::SharedStream = Arc::new(Mutex::new(IoCursor::new(bytes)));
        Arc::new(PhysicalDisk::new(shared, 0, len))
    }

    fn pattern(blocks: usize) -> Vec<u8> {
        let mut v = Vec::with_capacity(blocks * 4096);
        for k in 0..blocks as u16 {
            for _ in 0..2048 {
                v.extend_from_slice(&k.to_le_bytes());
            }
        }
        v
    }

    fn linear_vd(disks: Vec<Arc<PhysicalDisk>>) -> VirtualDisk {
        let mut disk_map = DiskMap::new();
        let mut size = 0u64;
        for (i, d) in disks.into_iter().enumerate() {
            size += d.size();
            disk_map.insert(i as u32, (0, d));
        }
        VirtualDisk {
            name: "linear".into(),
            uuid: uuid::Uuid::nil(),
            size,
            level: Level::Linear,
            layout: 0,
            stripe_size: 0,
            num_disks: disk_map.len() as u32,
            disk_map,
        }
    }

    #[test]
    fn linear_concatenates_members_in_role_order() {
        let vd = linear_vd(vec![disk(pattern(2)), disk(pattern(2))]);
        let mut s = open_linear(&vd).unwrap();
        let mut buf = vec![0u8; 4096];
        s.read_exact(&mut buf).unwrap();
        assert_eq!(&buf[..2], &[0, 0]);

        // Second member starts right after the first.
        let mut second_first_block = vec![0u8; 4096];
        use std::io::{Seek, SeekFrom};
        s.seek(SeekFrom::Start(2 * 4096)).unwrap();
        s.read_exact(&mut second_first_block).unwrap();
        assert_eq!(&second_first_block[..2], &[0, 0]);
    }

    #[test]
    fn raid0_single_zone_stripes_round_robin() {
        let mut disk_map = DiskMap::new();
        disk_map.insert(0, (0, disk(pattern(4))));
        disk_map.insert(1, (0, disk(pattern(4))));
        let vd = VirtualDisk {
            name: "r0".into(),
            uuid: uuid::Uuid::nil(),
            size: 4096 * 4,
            level: Level::Raid0,
            layout: 0,
            stripe_size: 4096,
            num_disks: 2,
            disk_map,
        };
        let mut s = open_raid0(&vd).unwrap();
        let mut buf = vec![0u8; 4096];
        s.read_exact(&mut buf).unwrap();
        assert_eq!(&buf[..2], &0u16.to_le_bytes());
    }

    #[test]
    fn raid456_rejects_every_ddf_raid6_layout() {
        // A DDF RAID6 virtual disk is unreachable through the
        // faithfully-ported DDF conversion: every DDF RAID6 PRL/RLQ maps to
        // one of these rotating layouts (see
        // `ddf::tests::ddf_raid6_always_converts_to_a_rotating_layout`),
        // and every one of them is rejected here as `NotImplemented`
        // because DDF carries no explicit disk-mapping table for them.
        for algo in
            [layout::ROTATING_ZERO_RESTART, layout::ROTATING_N_RESTART, layout::ROTATING_N_CONTINUE]
        {
            let err = raid456_stripe_info(Level::Raid6, algo, 4, 0, 4096).unwrap_err();
            assert!(matches!(err, Error::NotImplemented(_)), "expected NotImplemented for algo {algo}, got {err:?}");
        }
    }

    #[test]
    fn raid456_missing_disks_beyond_tolerance_fails_open() {
        let mut disk_map = DiskMap::new();
        disk_map.insert(0, (0, disk(pattern(1))));
        let vd = VirtualDisk {
            name: "r5".into(),
            uuid: uuid::Uuid::nil(),
            size: 4096 * 2,
            level: Level::Raid5,
            layout: layout::LEFT_SYMMETRIC,
            stripe_size: 4096,
            num_disks: 3,
            disk_map,
        };
        assert!(open_raid456(&vd).is_err());
    }

    #[test]
    fn raid10_falls_back_to_next_mirror_when_first_copy_missing() {
        // near=2, 2 raid_disks: role 0 and role 1 mirror each other.
        let mut disk_map = DiskMap::new();
        disk_map.insert(1, (0, disk(pattern(2))));
        let vd = VirtualDisk {
            name: "r10".into(),
            uuid: uuid::Uuid::nil(),
            size: 4096 * 2,
            level: Level::Raid10,
            layout: 2, // near_copies=2
            stripe_size: 4096,
            num_disks: 2,
            disk_map,
        };
        let mut s = open_raid10(&vd).unwrap();
        let mut buf = vec![0u8; 4096];
        s.read_exact(&mut buf).unwrap();
        assert_eq!(&buf[..2], &0u16.to_le_bytes());
    }

    fn block_pattern(k: u16) -> Vec<u8> {
        let mut v = Vec::with_capacity(4096);
        for _ in 0..2048 {
            v.extend_from_slice(&k.to_le_bytes());
        }
        v
    }

    /// Lays out `num_blocks` worth of the standard test payload across
    /// `raid_disks` members for a near=`near_copies` RAID10 set: for each
    /// virtual block `k`, `chunk = k * near_copies`, `stripe = chunk /
    /// raid_disks`, and each copy `c` lands on disk `(chunk + c) %
    /// raid_disks` at `stripe * stripe_size` — the kernel's near-copies
    /// placement (consecutive disks, same stripe row).
    fn raid10_disk_buffers(num_blocks: u64, raid_disks: u32, near_copies: u32, stripe_size: u64) -> Vec<Vec<u8>> {
        let max_chunk = (num_blocks - 1) * near_copies as u64 + (near_copies as u64 - 1);
        let max_stripe = max_chunk / raid_disks as u64;
        let mut bufs: Vec<Vec<u8>> =
            (0..raid_disks).map(|_| vec![0u8; ((max_stripe + 1) * stripe_size) as usize]).collect();
        for k in 0..num_blocks {
            let payload = block_pattern(k as u16);
            let chunk = k * near_copies as u64;
            let stripe = chunk / raid_disks as u64;
            for c in 0..near_copies {
                let dev = ((chunk + c as u64) % raid_disks as u64) as usize;
                let start = (stripe * stripe_size) as usize;
                bufs[dev][start..start + 4096].copy_from_slice(&payload);
            }
        }
        bufs
    }

    #[test]
    fn raid10_near2_four_disks_survives_any_single_missing_disk() {
        // Spec scenario: MD RAID10, 4 disks, near=2/far=1 — dropping any
        // single disk still yields correct reads for blocks 1..512.
        const RAID_DISKS: u32 = 4;
        const NEAR_COPIES: u32 = 2;
        const STRIPE_SIZE: u64 = 4096;
        const NUM_BLOCKS: u64 = 513;

        let bufs = raid10_disk_buffers(NUM_BLOCKS, RAID_DISKS, NEAR_COPIES, STRIPE_SIZE);

        for dropped in 0..RAID_DISKS {
            let mut disk_map = DiskMap::new();
            for role in 0..RAID_DISKS {
                if role == dropped {
                    continue;
                }
                disk_map.insert(role, (0, disk(bufs[role as usize].clone())));
            }
            let vd = VirtualDisk {
                name: "r10-4disk".into(),
                uuid: uuid::Uuid::nil(),
                size: NUM_BLOCKS * STRIPE_SIZE,
                level: Level::Raid10,
                layout: NEAR_COPIES, // near_copies=2, far_copies=0 -> clamped to 1
                stripe_size: STRIPE_SIZE,
                num_disks: RAID_DISKS,
                disk_map,
            };
            let mut s = open_raid10(&vd).unwrap();
            use std::io::{Seek, SeekFrom};
            for k in 1..512u64 {
                s.seek(SeekFrom::Start(k * STRIPE_SIZE)).unwrap();
                let mut buf = vec![0u8; 4096];
                s.read_exact(&mut buf).unwrap_or_else(|e| {
                    panic!("dropped disk {dropped}, block {k}: {e}")
                });
                assert_eq!(buf, block_pattern(k as u16), "dropped disk {dropped}, block {k}");
            }
        }
    }
}
