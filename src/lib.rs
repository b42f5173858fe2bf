// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Read-only reconstruction of RAID/volume-manager logical disks from raw
//! physical disk images.
//!
//! Callers hand in one or more backing byte sources (each wrapped as a
//! [`stream::SharedStream`]) and get back a navigable tree: [`disk::Disk`]
//! for partition tables, [`raid::Raid`] for MD/DDF/Vinum arrays, and
//! [`lvm2::Lvm2`] for LVM2 volume groups. Every layer is a pure decoder —
//! nothing here ever writes to the sources it is given.

pub mod config;
pub mod disk;
pub mod dm;
pub mod error;
pub mod ldm;
pub mod lvm2;
pub mod md;
pub mod ddf;
pub mod raid;
pub mod stream;
pub mod vinum;
pub mod vss;

pub use config::Config;
pub use disk::{identify_disk, Disk, Partition, PartitionType};
pub use ddf::open_ddf;
pub use error::{Error, Result, SchemeKind};
pub use lvm2::{open_lvm2, Lvm2};
pub use md::open_md;
pub use raid::{Configuration, Level, Raid, VirtualDisk};
pub use vinum::open_vinum;
