//! apple-disk-image — a read-only Apple Disk Image (DMG/UDIF) reader.
//!
//! Parses the `koly` trailer and its `resource-fork.blkx` property list into a flat
//! block/chunk table, then services logical-sector reads against that table over a
//! caller-supplied [`BackingRegion`]. Does not write or create images, and does not
//! verify image integrity itself — that is delegated to a [`ChunklistVerifier`]
//! supplied by the caller.
//!
//! # Example
//!
//! ```no_run
//! use apple_disk_image::{OwnedDiskImage, Result};
//!
//! fn main() -> Result<()> {
//!     let file = std::fs::File::open("image.dmg")?;
//!     let image = OwnedDiskImage::from_reader(file)?;
//!
//!     let mut sector = vec![0u8; 512];
//!     image.read(0, &mut sector)?;
//!
//!     Ok(())
//! }
//! ```

pub mod blockmap;
pub mod context;
pub mod error;
pub mod locate;
pub mod read;
pub mod region;
pub mod trailer;
pub mod verify;

pub use blockmap::{BlockDescriptor, Chunk, ChunkType};
pub use context::{DiskImage, OwnedDiskImage};
pub use error::{Error, Result};
pub use region::{BackingRegion, MemoryRegion};
pub use trailer::{ChecksumRecord, Trailer};
pub use verify::ChunklistVerifier;
