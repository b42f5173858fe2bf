//! Logical Disk Manager (Windows dynamic disks) — stub.
//!
//! `original_source/dissect/volume/ldm.py` is itself marked
//! `# This file is still a WIP` and dynamic-disk metadata is out of scope
//! here. This type exists only to give that stub a place in the module
//! tree; it is not wired into any entry point.

use crate::error::{Error, Result};
use crate::stream::ReadAt;
use std::sync::Arc;

pub struct Ldm;

impl Ldm {
    pub fn parse(_disk: Arc<dyn ReadAt>) -> Result<Ldm> {
        Err(Error::NotImplemented("LDM dynamic disk metadata".into()))
    }
}
