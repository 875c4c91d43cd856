//! The read engine: walks the chunk chain covering a requested byte range and
//! materializes each chunk's contribution into the caller's buffer.

use std::io::Read as _;

use crate::blockmap::{Chunk, ChunkType, SECTOR_SIZE};
use crate::error::{Error, Result};
use crate::locate::locate;
use crate::region::BackingRegion;
use crate::blockmap::BlockDescriptor;

/// Fill `buf` with the bytes of sectors `[lba, lba + buf.len() / 512)`.
///
/// `buf.len()` need not be sector-aligned; partial trailing sectors are serviced like
/// any other byte range. Fails atomically: on any error nothing useful can be assumed
/// about `buf`'s contents.
pub fn read_into(
    blocks: &[BlockDescriptor],
    region: &dyn BackingRegion,
    lba: u64,
    buf: &mut [u8],
) -> Result<()> {
    let mut cur_lba = lba;
    let mut remaining = buf.len() as u64;
    let mut cursor = 0usize;

    while remaining > 0 {
        let (block, chunk) = locate(blocks, cur_lba)?;

        let chunk_abs_start = block.first_sector + chunk.start_sector;
        let lba_offset_in_chunk = cur_lba - chunk_abs_start;
        let sectors_left_in_chunk = chunk
            .sector_count
            .checked_sub(lba_offset_in_chunk)
            .ok_or(Error::Overflow("sector_count - lba_offset_in_chunk"))?;

        let chunk_total_bytes = chunk
            .sector_count
            .checked_mul(SECTOR_SIZE)
            .ok_or(Error::Overflow("chunk sector_count * SECTOR_SIZE"))?;
        let byte_offset_in_chunk = lba_offset_in_chunk
            .checked_mul(SECTOR_SIZE)
            .ok_or(Error::Overflow("lba_offset_in_chunk * SECTOR_SIZE"))?;
        let bytes_left_in_chunk = chunk_total_bytes
            .checked_sub(byte_offset_in_chunk)
            .ok_or(Error::Overflow("chunk_total_bytes - byte_offset_in_chunk"))?;

        let take = remaining.min(bytes_left_in_chunk) as usize;

        materialize(
            region,
            chunk,
            chunk_total_bytes,
            byte_offset_in_chunk,
            take,
            &mut buf[cursor..cursor + take],
        )?;

        remaining -= take as u64;
        cursor += take;
        // Matches the reference implementation: advance by the sectors remaining in
        // the chunk, not by the bytes just written. Only exact when `take` consumed
        // the whole remainder of the chunk; when a request ends mid-chunk, the
        // `remaining == 0` exit fires first, so the mismatch never surfaces.
        cur_lba += sectors_left_in_chunk;
    }

    Ok(())
}

fn materialize(
    region: &dyn BackingRegion,
    chunk: &Chunk,
    chunk_total_bytes: u64,
    offset: u64,
    len: usize,
    dst: &mut [u8],
) -> Result<()> {
    match chunk.chunk_type {
        ChunkType::Zero | ChunkType::Ignore => {
            dst.fill(0);
            Ok(())
        }
        ChunkType::Raw => {
            let src_offset = chunk
                .compressed_offset
                .checked_add(offset)
                .ok_or(Error::Overflow("chunk compressed_offset + offset"))?;
            let bytes = region.read(src_offset, len as u64)?;
            dst.copy_from_slice(&bytes);
            Ok(())
        }
        ChunkType::Zlib => {
            // The reference implementation reads the compressed bytes into the tail
            // of one scratch allocation sized `chunk_total_bytes + compressed_length`
            // and decompresses into its head, because its region read writes directly
            // into caller-supplied memory. `BackingRegion::read` instead hands back an
            // owned `Vec`, so the two scratch halves are just two separate buffers
            // here; their combined size still bounds this chunk's total scratch
            // footprint per read.
            let compressed = region.read(chunk.compressed_offset, chunk.compressed_length)?;
            let mut decompressed = vec![0u8; chunk_total_bytes as usize];
            let mut decoder = flate2::read::ZlibDecoder::new(&compressed[..]);
            let mut produced = 0usize;
            while produced < decompressed.len() {
                match decoder.read(&mut decompressed[produced..])? {
                    0 => break,
                    n => produced += n,
                }
            }
            if produced as u64 != chunk_total_bytes {
                return Err(Error::DecompressionSize {
                    expected: chunk_total_bytes,
                    actual: produced as u64,
                });
            }
            let offset = offset as usize;
            dst.copy_from_slice(&decompressed[offset..offset + len]);
            Ok(())
        }
        ChunkType::Terminator | ChunkType::Other(_) => Err(Error::Unsupported(format!(
            "chunk type {:?} cannot be materialized",
            chunk.chunk_type
        ))),
    }
}
