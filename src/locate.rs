//! Translating an absolute logical block address into the (block, chunk) pair that
//! covers it.
//!
//! Blocks and, within a block, chunks are stored in ascending start-sector order and
//! are disjoint and gapless by construction (enforced at parse time in
//! [`crate::blockmap`]), so binary search is a pure speedup over the reference linear
//! scan — not a change in semantics.

use crate::blockmap::{BlockDescriptor, Chunk};
use crate::error::{Error, Result};

/// Find the block and chunk covering absolute sector `lba`.
pub fn locate(blocks: &[BlockDescriptor], lba: u64) -> Result<(&BlockDescriptor, &Chunk)> {
    let block_idx = blocks
        .partition_point(|b| b.first_sector <= lba)
        .checked_sub(1);
    let block = block_idx
        .and_then(|idx| blocks.get(idx))
        .filter(|b| lba < b.first_sector + b.sector_count)
        .ok_or_else(|| Error::Unsupported(format!("lba {lba} is not covered by any block")))?;

    let rel_lba = lba - block.first_sector;
    let chunk_idx = block
        .chunks
        .partition_point(|c| c.start_sector <= rel_lba)
        .checked_sub(1);
    let chunk = chunk_idx
        .and_then(|idx| block.chunks.get(idx))
        .filter(|c| rel_lba < c.start_sector + c.sector_count)
        .ok_or_else(|| {
            Error::Unsupported(format!("lba {lba} is not covered by any chunk in its block"))
        })?;

    Ok((block, chunk))
}
