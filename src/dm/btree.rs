//! Persistent B-tree used by device-mapper thin-provisioning metadata.
//!
//! Ground truth: `original_source/dissect/volume/dm/btree.py`.

use crate::error::Result;
use crate::stream::ReadAt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use zerocopy::byteorder::little_endian::U32 as LE_U32;
use zerocopy::byteorder::little_endian::U64 as LE_U64;
use zerocopy::{FromBytes, Immutable, KnownLayout, Unaligned};

const INTERNAL_NODE: u32 = 1;
const LEAF_NODE: u32 = 1 << 1;
const NODE_CACHE_CAPACITY: usize = 64;

#[derive(FromBytes, KnownLayout, Immutable, Unaligned, Debug)]
#[repr(C)]
struct NodeHeaderRaw {
    csum: LE_U32,
    flags: LE_U32,
    blocknr: LE_U64,
    nr_entries: LE_U32,
    max_entries: LE_U32,
    value_size: LE_U32,
    padding: LE_U32,
}

static_assertions::const_assert_eq!(std::mem::size_of::<NodeHeaderRaw>(), 32);

struct Node {
    flags: u32,
    num_entries: usize,
    value_size: usize,
    key_area: Vec<u8>,
    value_area: Vec<u8>,
}

impl Node {
    fn parse(buf: &[u8]) -> Result<Node> {
        let header = NodeHeaderRaw::read_from_bytes(&buf[..std::mem::size_of::<NodeHeaderRaw>()])
            .map_err(|_| crate::error::Error::BadStructure {
                scheme: crate::error::SchemeKind::Dm,
                detail: "truncated dm btree node header".into(),
            })?;

        let max_entries = header.max_entries.get() as usize;
        let value_size = header.value_size.get() as usize;
        let key_area_start = std::mem::size_of::<NodeHeaderRaw>();
        let key_area_end = key_area_start + max_entries * 8;
        let value_area_end = key_area_end + max_entries * value_size;

        Ok(Node {
            flags: header.flags.get(),
            num_entries: header.nr_entries.get() as usize,
            value_size,
            key_area: buf[key_area_start..key_area_end.min(buf.len())].to_vec(),
            value_area: buf[key_area_end.min(buf.len())..value_area_end.min(buf.len())].to_vec(),
        })
    }

    fn is_internal(&self) -> bool {
        self.flags & INTERNAL_NODE != 0
    }

    fn is_leaf(&self) -> bool {
        self.flags & LEAF_NODE != 0
    }

    fn key(&self, idx: usize) -> Option<u64> {
        if idx >= self.num_entries {
            return None;
        }
        let area = idx * 8;
        self.key_area.get(area..area + 8).map(|b| u64::from_le_bytes(b.try_into().unwrap()))
    }

    fn value(&self, idx: usize) -> Option<Vec<u8>> {
        if idx >= self.num_entries {
            return None;
        }
        let area = idx * self.value_size;
        self.value_area.get(area..area + self.value_size).map(|b| b.to_vec())
    }
}

/// A device-mapper persistent data B-tree: a multi-level key/value index
/// stored in fixed-size blocks of a metadata device.
pub struct BTree {
    source: Arc<dyn ReadAt>,
    root: u64,
    block_size_bytes: u64,
    cache: Mutex<NodeCache>,
}

#[derive(Default)]
struct NodeCache {
    nodes: HashMap<u64, Arc<Node>>,
    order: Vec<u64>,
}

impl NodeCache {
    fn get_or_insert(&mut self, block: u64, node: Node) -> Arc<Node> {
        if let Some(existing) = self.nodes.get(&block) {
            return existing.clone();
        }
        let node = Arc::new(node);
        self.nodes.insert(block, node.clone());
        self.order.push(block);
        if self.order.len() > NODE_CACHE_CAPACITY {
            let evict = self.order.remove(0);
            self.nodes.remove(&evict);
        }
        node
    }
}

impl BTree {
    pub fn new(source: Arc<dyn ReadAt>, root: u64, block_size_sectors: u32) -> BTree {
        BTree {
            source,
            root,
            block_size_bytes: block_size_sectors as u64 * super::SECTOR_SIZE,
            cache: Mutex::new(NodeCache::default()),
        }
    }

    fn read_node(&self, block: u64) -> Result<Arc<Node>> {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(node) = cache.nodes.get(&block) {
            return Ok(node.clone());
        }
        drop(cache);

        let mut buf = vec![0u8; self.block_size_bytes as usize];
        self.source.read_at(block * self.block_size_bytes, &mut buf)?;
        let node = Node::parse(&buf)?;

        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        Ok(cache.get_or_insert(block, node))
    }

    /// Multi-level key lookup. Returns `None` if any level fails to find
    /// an exact key match.
    pub fn lookup(&self, keys: &[u64], want_high: bool) -> Result<Option<Vec<u8>>> {
        let mut root = self.root;
        let last_level = keys.len() - 1;
        let mut value = None;

        for (i, &key) in keys.iter().enumerate() {
            let found = self.lookup_one(root, key, want_high)?;
            let Some((found_key, found_value)) = found else {
                return Ok(None);
            };
            if found_key != key {
                return Ok(None);
            }
            if i < last_level {
                root = u64::from_le_bytes(found_value[..8].try_into().unwrap());
            }
            value = Some(found_value);
        }

        Ok(value)
    }

    fn lookup_one(&self, root: u64, key: u64, want_high: bool) -> Result<Option<(u64, Vec<u8>)>> {
        let mut block = root;
        loop {
            let node = self.read_node(block)?;

            let mut low: i64 = -1;
            let mut high: i64 = node.num_entries as i64;
            let mut exact = None;
            while high - low > 1 {
                let mid = low + (high - low) / 2;
                let Some(cmp_key) = node.key(mid as usize) else { break };
                if cmp_key == key {
                    exact = Some(mid);
                    break;
                }
                if cmp_key < key {
                    low = mid;
                } else {
                    high = mid;
                }
            }
            let idx = exact.unwrap_or(if want_high { high } else { low });
            if idx < 0 {
                return Ok(None);
            }
            let idx = idx as usize;

            if node.is_internal() {
                let Some(child) = node.value(idx) else { return Ok(None) };
                block = u64::from_le_bytes(child[..8].try_into().unwrap());
            } else if node.is_leaf() {
                let (Some(found_key), Some(found_value)) = (node.key(idx), node.value(idx)) else {
                    return Ok(None);
                };
                return Ok(Some((found_key, found_value)));
            } else {
                return Ok(None);
            }
        }
    }
}
