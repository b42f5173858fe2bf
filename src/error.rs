//! The error taxonomy shared by every metadata family and stream backend.

use std::fmt;

/// Which partition/metadata scheme an [`Error::NoSchemeMatched`] attempt belongs to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SchemeKind {
    Gpt,
    Mbr,
    Apm,
    Bsd,
    Md,
    Ddf,
    Lvm2,
    Vinum,
    Vss,
    Dm,
}

impl fmt::Display for SchemeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SchemeKind::Gpt => "GPT",
            SchemeKind::Mbr => "MBR",
            SchemeKind::Apm => "APM",
            SchemeKind::Bsd => "BSD",
            SchemeKind::Md => "MD",
            SchemeKind::Ddf => "DDF",
            SchemeKind::Lvm2 => "LVM2",
            SchemeKind::Vinum => "Vinum",
            SchemeKind::Vss => "VSS",
            SchemeKind::Dm => "DM",
        };
        f.write_str(s)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("bad signature for {scheme}: {detail}")]
    BadSignature { scheme: SchemeKind, detail: String },

    #[error("bad structure for {scheme}: {detail}")]
    BadStructure { scheme: SchemeKind, detail: String },

    #[error("missing disks: {0}")]
    MissingDisks(String),

    #[error("invalid layout: {0}")]
    InvalidLayout(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("unknown device id {0}")]
    UnknownDevice(u64),

    #[error("no scheme matched: {0:?}")]
    NoSchemeMatched(Vec<(SchemeKind, Error)>),

    #[error("possibly 4K sector size: {0}")]
    PossibleSectorSizeMismatch(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
