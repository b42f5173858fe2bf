//! Device-mapper persistent B-tree and thin-provisioning decoders.
//!
//! Ground truth: `original_source/dissect/volume/dm/{btree.py,thin.py,c_dm.py}`.

pub mod btree;
pub mod thin;

pub use btree::BTree;
pub use thin::{ThinDevice, ThinPool};

pub(crate) const SECTOR_SIZE: u64 = 512;
