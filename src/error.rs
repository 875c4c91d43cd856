//! Error types for disk-image parsing and reading.

use thiserror::Error;

/// Result type alias used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur parsing a disk image or servicing a read.
#[derive(Error, Debug)]
pub enum Error {
    /// The trailer's `koly` magic did not match, or the image was too short to hold one.
    #[error("invalid trailer: {0}")]
    InvalidTrailer(String),

    /// A trailer invariant (header size, offset bounds, sector/segment count, ...) was violated.
    #[error("malformed container: {0}")]
    MalformedContainer(String),

    /// I/O error reading the backing file-like source during construction.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The XML property list failed to parse or was missing a required key.
    #[error("invalid plist: {0}")]
    InvalidPlist(String),

    /// The binary `mish` block map failed to parse or violated an invariant.
    #[error("invalid block map: {0}")]
    InvalidBlockMap(String),

    /// Arithmetic on an offset or size would have overflowed.
    #[error("overflow computing {0}")]
    Overflow(&'static str),

    /// A chunk type or container feature outside this core's supported subset.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// The backing region refused or failed a read.
    #[error("backing region read failed at offset {offset}, length {length}")]
    RegionRead { offset: u64, length: u64 },

    /// Zlib decompression produced a size other than the declared uncompressed size.
    #[error("decompression produced {actual} bytes, expected {expected}")]
    DecompressionSize { expected: u64, actual: u64 },

    /// `read` was called with an LBA at or beyond the image's sector count.
    #[error("lba {lba} out of range (sector count {sector_count})")]
    Precondition { lba: u64, sector_count: u64 },
}
