//! Entry-point configuration, threaded explicitly instead of read from
//! process-global state (the source reads an environment variable to set
//! per-module log verbosity; this crate takes a struct instead).

/// Options that influence how disks are identified and metadata is parsed.
#[derive(Clone, Copy, Debug)]
pub struct Config {
    /// Sector size assumed when a scheme's geometry is sector-relative
    /// (GPT partition entries, BSD disklabel placement). Most images are
    /// 512; 4Kn disks need 4096.
    pub sector_size: u32,
    /// Reject metadata that parses but fails secondary sanity checks
    /// (e.g. a DDF VDCR whose physical-disk references do not all
    /// resolve) instead of silently dropping the offending entries.
    pub strict: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config { sector_size: 512, strict: false }
    }
}

impl Config {
    pub fn with_sector_size(sector_size: u32) -> Self {
        Config { sector_size, ..Config::default() }
    }
}
