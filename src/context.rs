//! The disk-image handle: owns the parsed block map, borrows or owns its backing
//! region, and is the entry point for reads and verification.

use std::io::Read;

use crate::blockmap::{parse_block_map, BlockDescriptor};
use crate::error::{Error, Result};
use crate::read::read_into;
use crate::region::{BackingRegion, MemoryRegion};
use crate::trailer::Trailer;
use crate::verify::ChunklistVerifier;

/// The parsed, validated block map shared by both the borrowing and owning handles.
struct Parsed {
    blocks: Vec<BlockDescriptor>,
    sector_count: u64,
}

fn construct(region: &dyn BackingRegion, byte_len: u64) -> Result<Parsed> {
    let trailer = Trailer::parse(region, byte_len)?;

    let xml = region.read(trailer.xml_offset, trailer.xml_length)?;
    let mut blocks = parse_block_map(&xml, trailer.data_fork_offset, trailer.data_fork_length)?;
    blocks.sort_by_key(|b| b.first_sector);

    let mut expected_next = 0u64;
    for block in &blocks {
        if block.first_sector != expected_next {
            return Err(Error::InvalidBlockMap(format!(
                "block starting at sector {} leaves a gap or overlap after sector {expected_next}",
                block.first_sector
            )));
        }
        expected_next = expected_next
            .checked_add(block.sector_count)
            .ok_or(Error::Overflow("cumulative block sector_count"))?;
    }
    if expected_next != trailer.sector_count {
        return Err(Error::InvalidBlockMap(format!(
            "blocks cover {expected_next} sectors, trailer declares {}",
            trailer.sector_count
        )));
    }

    Ok(Parsed {
        blocks,
        sector_count: trailer.sector_count,
    })
}

impl Parsed {
    fn read(&self, region: &dyn BackingRegion, lba: u64, buf: &mut [u8]) -> Result<()> {
        if lba >= self.sector_count {
            return Err(Error::Precondition {
                lba,
                sector_count: self.sector_count,
            });
        }
        read_into(&self.blocks, region, lba, buf)
    }
}

/// A disk image parsed over a caller-owned backing region.
///
/// Borrows its region rather than owning it: the C original's `OcAppleDiskImageInitializeContext`
/// path, where the RAM-disk extent table outlives the context.
pub struct DiskImage<'r> {
    region: &'r dyn BackingRegion,
    parsed: Parsed,
}

impl<'r> DiskImage<'r> {
    /// Parse a disk image already resident in `region`, which is `byte_len` bytes long.
    pub fn from_region(region: &'r dyn BackingRegion, byte_len: u64) -> Result<Self> {
        let parsed = construct(region, byte_len)?;
        Ok(DiskImage { region, parsed })
    }

    /// Total sector count, as declared by the trailer.
    pub fn sector_count(&self) -> u64 {
        self.parsed.sector_count
    }

    /// The flat, ordered block-descriptor table.
    pub fn blocks(&self) -> &[BlockDescriptor] {
        &self.parsed.blocks
    }

    /// Fill `buf` with the bytes starting at sector `lba`. Fails if `lba >= sector_count()`.
    pub fn read(&self, lba: u64, buf: &mut [u8]) -> Result<()> {
        self.parsed.read(self.region, lba, buf)
    }

    /// Delegate integrity verification to an external chunklist verifier.
    pub fn verify(&self, verifier: &dyn ChunklistVerifier) -> bool {
        verifier.verify(self.region)
    }
}

/// A disk image that owns its backing region — the C original's
/// `OcAppleDiskImageInitializeFromFile` path, where loading the file and freeing the
/// RAM-disk it was loaded into are both the context's responsibility.
pub struct OwnedDiskImage {
    region: MemoryRegion,
    parsed: Parsed,
}

impl OwnedDiskImage {
    /// Read all of `reader` into an owned in-memory region, then parse it.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let region = MemoryRegion::from_reader(reader)?;
        let byte_len = region.len();
        let parsed = construct(&region, byte_len)?;
        Ok(OwnedDiskImage { region, parsed })
    }

    pub fn sector_count(&self) -> u64 {
        self.parsed.sector_count
    }

    pub fn blocks(&self) -> &[BlockDescriptor] {
        &self.parsed.blocks
    }

    pub fn read(&self, lba: u64, buf: &mut [u8]) -> Result<()> {
        self.parsed.read(&self.region, lba, buf)
    }

    pub fn verify(&self, verifier: &dyn ChunklistVerifier) -> bool {
        verifier.verify(&self.region)
    }
}
