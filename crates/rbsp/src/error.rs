//! Error types for the rbsp crate.

use thiserror::Error;

use crate::entities::{EntityEncodeError, EntityParseError};
use crate::qfiles::LumpIndex;

/// The error type for every fallible operation in this crate.
#[derive(Debug, Error)]
pub enum BspError {
    /// The buffer cannot even hold the fixed header.
    #[error("bsp data is truncated: {len} bytes, header needs {needed}")]
    Truncated { len: usize, needed: usize },

    #[error("not an RBSP file (magic {0:?})")]
    BadMagic([u8; 4]),

    #[error("unexpected bsp version {0}")]
    UnexpectedVersion(i32),

    /// A directory entry points outside the buffer.
    #[error("lump {lump} out of bounds: offset {offset}, size {size}, buffer is {buffer_len} bytes")]
    MalformedDirectory {
        lump: LumpIndex,
        offset: i64,
        size: i64,
        buffer_len: usize,
    },

    /// Two lumps claim the same bytes (only reported when overlap is disallowed).
    #[error("lumps {first} and {second} overlap")]
    OverlappingLumps { first: LumpIndex, second: LumpIndex },

    #[error("lump {lump} has invalid size {size} for stride {stride}")]
    InvalidLumpSize {
        lump: LumpIndex,
        size: usize,
        stride: usize,
    },

    #[error("element offset {offset} past the {count} records of lump {lump}")]
    ElementOffsetOutOfRange {
        lump: LumpIndex,
        offset: usize,
        count: usize,
    },

    #[error("lump index {0} out of range")]
    InvalidLumpIndex(usize),

    #[error(transparent)]
    EntityParse(#[from] EntityParseError),

    #[error(transparent)]
    EntityEncode(#[from] EntityEncodeError),

    /// A shader path does not fit the fixed-size path field.
    #[error("shader {index} path is {len} bytes, limit is {limit}")]
    PathTooLong {
        index: usize,
        len: usize,
        limit: usize,
    },

    /// A shader path holds a NUL or a character with no single-byte form.
    #[error("shader {index} path {path:?} cannot be stored")]
    InvalidShaderPath { index: usize, path: String },

    #[error("invalid visibility data: {0}")]
    InvalidVisibility(String),

    #[error("cluster {cluster} out of range ({clusters} clusters)")]
    ClusterOutOfRange { cluster: usize, clusters: usize },

    /// A provider was asked for a lump it was not built to serve.
    #[error("provider cannot generate lump {0}")]
    UnprovidableLump(LumpIndex),

    #[error("assembler has no provider for: {}", display_lumps(.missing))]
    IncompleteAssemblerConfiguration { missing: Vec<LumpIndex> },

    /// The assembled file would not be addressable with 32-bit offsets.
    #[error("lump {lump} does not fit in the directory ({len} bytes at offset {offset})")]
    LumpTooLarge {
        lump: LumpIndex,
        offset: usize,
        len: usize,
    },
}

fn display_lumps(lumps: &[LumpIndex]) -> String {
    lumps
        .iter()
        .map(|lump| lump.name())
        .collect::<Vec<_>>()
        .join(", ")
}

/// A convenience `Result` alias using [`BspError`].
pub type Result<T> = std::result::Result<T, BspError>;
