//! The XML property list and its embedded `mish` block maps.
//!
//! The trailer's XML descriptor is a plist whose `resource-fork.blkx` array holds one
//! entry per block descriptor; each entry's `Data` is a base64-encoded `mish` binary
//! record describing that block's chunk table. This module parses both layers and
//! produces a flat, already-validated `Vec<BlockDescriptor>`.

use byteorder::{BigEndian, ReadBytesExt};
use std::io::Read;

use crate::error::{Error, Result};
use crate::trailer::ChecksumRecord;

/// `mish` magic bytes.
pub const MISH_MAGIC: &[u8; 4] = b"mish";

/// Sector size in bytes, fixed by the format.
pub const SECTOR_SIZE: u64 = 512;

/// On-disk chunk type tag. Only `Zero`, `Ignore`, `Raw` and `Zlib` are ever
/// materialized by the read engine; `Terminator` ends a block's chunk list; anything
/// else is recognized only so it can be reported as unsupported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkType {
    Zero,
    Ignore,
    Raw,
    Zlib,
    Terminator,
    Other(u32),
}

impl From<u32> for ChunkType {
    fn from(value: u32) -> Self {
        match value {
            0x00000000 => ChunkType::Zero,
            0x00000002 => ChunkType::Ignore,
            0x00000001 => ChunkType::Raw,
            0x80000005 => ChunkType::Zlib,
            0xFFFFFFFF => ChunkType::Terminator,
            other => ChunkType::Other(other),
        }
    }
}

/// One contiguous sector range within a block, in one of the encodings above.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub chunk_type: ChunkType,
    pub comment: u32,
    /// Starting sector, relative to the owning block's `first_sector`.
    pub start_sector: u64,
    pub sector_count: u64,
    /// Absolute offset in the backing region (already shifted by the trailer's
    /// data-fork offset — never the raw on-disk value).
    pub compressed_offset: u64,
    pub compressed_length: u64,
}

/// One `mish` entry: a block of the image with its own ordered chunk table.
#[derive(Debug, Clone)]
pub struct BlockDescriptor {
    /// Advisory name from the enclosing plist entry.
    pub name: String,
    /// Advisory partition/block id, parsed from the plist entry's decimal `ID` string.
    pub id: i64,
    pub version: u32,
    /// Starting sector, absolute within the image.
    pub first_sector: u64,
    pub sector_count: u64,
    pub data_offset_bias: u64,
    pub buffers_needed: u32,
    pub block_descriptor_id: u32,
    pub checksum: ChecksumRecord,
    pub chunks: Vec<Chunk>,
}

/// Parse the trailer's XML descriptor into the flat, validated block-descriptor table.
pub fn parse_block_map(
    xml: &[u8],
    data_fork_offset: u64,
    data_fork_length: u64,
) -> Result<Vec<BlockDescriptor>> {
    let value: plist::Value =
        plist::from_bytes(xml).map_err(|e| Error::InvalidPlist(format!("{e}")))?;

    let dict = value
        .as_dictionary()
        .ok_or_else(|| Error::InvalidPlist("top level is not a dictionary".into()))?;

    let resource_fork = dict
        .get("resource-fork")
        .and_then(|v| v.as_dictionary())
        .ok_or_else(|| Error::InvalidPlist("missing resource-fork dictionary".into()))?;

    let blkx = resource_fork
        .get("blkx")
        .and_then(|v| v.as_array())
        .ok_or_else(|| Error::InvalidPlist("missing resource-fork.blkx array".into()))?;

    let mut blocks = Vec::with_capacity(blkx.len());
    for entry in blkx {
        let entry = entry
            .as_dictionary()
            .ok_or_else(|| Error::InvalidPlist("blkx entry is not a dictionary".into()))?;

        let name = entry
            .get("Name")
            .and_then(|v| v.as_string())
            .ok_or_else(|| Error::InvalidPlist("blkx entry missing Name".into()))?
            .to_string();

        let id = entry
            .get("ID")
            .and_then(|v| v.as_string())
            .ok_or_else(|| Error::InvalidPlist("blkx entry missing ID".into()))?
            .parse::<i64>()
            .map_err(|e| Error::InvalidPlist(format!("blkx entry ID not decimal: {e}")))?;

        let data = entry
            .get("Data")
            .and_then(|v| v.as_data())
            .ok_or_else(|| Error::InvalidPlist("blkx entry missing Data".into()))?;

        let block = parse_mish(data, name, id, data_fork_offset, data_fork_length)?;
        blocks.push(block);
    }

    Ok(blocks)
}

/// The chunk-count field sits right after the 128-byte checksum digest: 0x40 (end of
/// the fixed header) + 4 (algorithm) + 4 (bit size) + 128 (digest) = 0xC8 (200).
const CHUNK_COUNT_OFFSET: usize = 0xC8;
const CHUNK_RECORD_SIZE: usize = 40;
const MISH_HEADER_SIZE: usize = CHUNK_COUNT_OFFSET + 4;

fn parse_mish(
    data: &[u8],
    name: String,
    id: i64,
    data_fork_offset: u64,
    data_fork_length: u64,
) -> Result<BlockDescriptor> {
    if data.len() < MISH_HEADER_SIZE {
        return Err(Error::InvalidBlockMap(format!(
            "mish payload of {} bytes shorter than header ({MISH_HEADER_SIZE})",
            data.len()
        )));
    }

    let mut cursor = std::io::Cursor::new(data);
    let mut magic = [0u8; 4];
    cursor.read_exact(&mut magic)?;
    if &magic != MISH_MAGIC {
        return Err(Error::InvalidBlockMap(format!(
            "bad mish magic {magic:02x?}"
        )));
    }

    let version = cursor.read_u32::<BigEndian>()?;
    let first_sector = cursor.read_u64::<BigEndian>()?;
    let sector_count = cursor.read_u64::<BigEndian>()?;
    let data_offset_bias = cursor.read_u64::<BigEndian>()?;
    let buffers_needed = cursor.read_u32::<BigEndian>()?;
    let block_descriptor_id = cursor.read_u32::<BigEndian>()?;

    let mut reserved = [0u8; 24];
    cursor.read_exact(&mut reserved)?;

    let algorithm = cursor.read_u32::<BigEndian>()?;
    let bit_size = cursor.read_u32::<BigEndian>()?;
    let mut digest = [0u8; 128];
    cursor.read_exact(&mut digest)?;
    let checksum = ChecksumRecord {
        algorithm,
        bit_size,
        data: digest,
    };

    let chunk_count = cursor.read_u32::<BigEndian>()? as usize;
    let needed = MISH_HEADER_SIZE
        .checked_add(chunk_count.checked_mul(CHUNK_RECORD_SIZE).ok_or(Error::Overflow(
            "chunk_count * chunk record size",
        ))?)
        .ok_or(Error::Overflow("mish header size + chunk table size"))?;
    if data.len() < needed {
        return Err(Error::InvalidBlockMap(format!(
            "mish declares {chunk_count} chunks but payload is only {} bytes",
            data.len()
        )));
    }

    let data_fork_top = data_fork_offset
        .checked_add(data_fork_length)
        .ok_or(Error::Overflow("data_fork_offset + data_fork_length"))?;

    let mut chunks = Vec::with_capacity(chunk_count);
    let mut covered_sectors = 0u64;
    for i in 0..chunk_count {
        let chunk_type_raw = cursor.read_u32::<BigEndian>()?;
        let chunk_type = ChunkType::from(chunk_type_raw);
        let comment = cursor.read_u32::<BigEndian>()?;
        let start_sector = cursor.read_u64::<BigEndian>()?;
        let raw_sector_count = cursor.read_u64::<BigEndian>()?;
        let raw_compressed_offset = cursor.read_u64::<BigEndian>()?;
        let compressed_length = cursor.read_u64::<BigEndian>()?;

        let is_last = i + 1 == chunk_count;
        match chunk_type {
            ChunkType::Terminator if !is_last => {
                return Err(Error::InvalidBlockMap(
                    "TERMINATOR chunk occurred before the end of the block".into(),
                ));
            }
            ChunkType::Terminator => {}
            _ if is_last => {
                return Err(Error::InvalidBlockMap(
                    "block's last chunk is not TERMINATOR".into(),
                ));
            }
            _ => {}
        }

        raw_sector_count
            .checked_mul(SECTOR_SIZE)
            .ok_or(Error::Overflow("chunk sector_count * SECTOR_SIZE"))?;

        let compressed_offset = data_fork_offset
            .checked_add(raw_compressed_offset)
            .ok_or(Error::Overflow("data_fork_offset + chunk compressed_offset"))?;

        if matches!(chunk_type, ChunkType::Raw | ChunkType::Zlib) {
            let chunk_top = compressed_offset
                .checked_add(compressed_length)
                .ok_or(Error::Overflow("chunk compressed_offset + compressed_length"))?;
            if compressed_offset < data_fork_offset || chunk_top > data_fork_top {
                return Err(Error::InvalidBlockMap(format!(
                    "chunk data [{compressed_offset}, {chunk_top}) escapes data fork [{data_fork_offset}, {data_fork_top})"
                )));
            }
        }

        if !matches!(chunk_type, ChunkType::Terminator) {
            covered_sectors = covered_sectors
                .checked_add(raw_sector_count)
                .ok_or(Error::Overflow("cumulative chunk sector_count"))?;
        }

        chunks.push(Chunk {
            chunk_type,
            comment,
            start_sector,
            sector_count: raw_sector_count,
            compressed_offset,
            compressed_length,
        });
    }

    if covered_sectors != sector_count {
        return Err(Error::InvalidBlockMap(format!(
            "chunk sector counts sum to {covered_sectors}, block declares {sector_count}"
        )));
    }

    Ok(BlockDescriptor {
        name,
        id,
        version,
        first_sector,
        sector_count,
        data_offset_bias,
        buffers_needed,
        block_descriptor_id,
        checksum,
        chunks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;

    fn write_chunk(
        buf: &mut Vec<u8>,
        chunk_type: u32,
        start_sector: u64,
        sector_count: u64,
        compressed_offset: u64,
        compressed_length: u64,
    ) {
        buf.write_u32::<BigEndian>(chunk_type).unwrap();
        buf.write_u32::<BigEndian>(0).unwrap();
        buf.write_u64::<BigEndian>(start_sector).unwrap();
        buf.write_u64::<BigEndian>(sector_count).unwrap();
        buf.write_u64::<BigEndian>(compressed_offset).unwrap();
        buf.write_u64::<BigEndian>(compressed_length).unwrap();
    }

    fn build_mish(sector_count: u64, chunks: &[(u32, u64, u64, u64, u64)]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(MISH_MAGIC);
        buf.write_u32::<BigEndian>(1).unwrap();
        buf.write_u64::<BigEndian>(0).unwrap(); // first_sector
        buf.write_u64::<BigEndian>(sector_count).unwrap();
        buf.write_u64::<BigEndian>(0).unwrap(); // data_offset bias
        buf.write_u32::<BigEndian>(0).unwrap(); // buffers_needed
        buf.write_u32::<BigEndian>(0).unwrap(); // block_descriptor_id
        buf.extend_from_slice(&[0u8; 24]);
        buf.write_u32::<BigEndian>(2).unwrap(); // checksum algorithm
        buf.write_u32::<BigEndian>(32).unwrap(); // checksum bit size
        buf.extend_from_slice(&[0u8; 128]);
        buf.write_u32::<BigEndian>(chunks.len() as u32).unwrap();
        for &(t, start, count, off, len) in chunks {
            write_chunk(&mut buf, t, start, count, off, len);
        }
        buf
    }

    #[test]
    fn parses_raw_then_terminator() {
        let mish = build_mish(8, &[(0x00000001, 0, 8, 0, 4096), (0xFFFFFFFF, 8, 0, 0, 0)]);
        let block = parse_mish(&mish, "disk image".into(), 0, 0, 4096).unwrap();
        assert_eq!(block.chunks.len(), 2);
        assert!(matches!(block.chunks[0].chunk_type, ChunkType::Raw));
        assert!(matches!(block.chunks[1].chunk_type, ChunkType::Terminator));
    }

    #[test]
    fn rejects_missing_terminator() {
        let mish = build_mish(8, &[(0x00000001, 0, 8, 0, 4096)]);
        assert!(parse_mish(&mish, "x".into(), 0, 0, 4096).is_err());
    }

    #[test]
    fn rejects_midlist_terminator() {
        let mish = build_mish(
            8,
            &[
                (0xFFFFFFFF, 0, 8, 0, 0),
                (0x00000000, 0, 8, 0, 0),
            ],
        );
        assert!(parse_mish(&mish, "x".into(), 0, 0, 4096).is_err());
    }

    #[test]
    fn rejects_sector_count_mismatch() {
        let mish = build_mish(10, &[(0x00000001, 0, 8, 0, 4096), (0xFFFFFFFF, 8, 0, 0, 0)]);
        assert!(parse_mish(&mish, "x".into(), 0, 0, 4096).is_err());
    }

    #[test]
    fn rejects_chunk_data_outside_data_fork() {
        let mish = build_mish(8, &[(0x00000001, 0, 8, 4000, 4096), (0xFFFFFFFF, 8, 0, 0, 0)]);
        assert!(parse_mish(&mish, "x".into(), 0, 0, 4096).is_err());
    }

    #[test]
    fn zero_and_ignore_chunks_skip_data_fork_check() {
        let mish = build_mish(
            8,
            &[
                (0x00000000, 0, 4, u64::MAX - 10, 0),
                (0x00000002, 4, 4, u64::MAX - 10, 0),
                (0xFFFFFFFF, 8, 0, 0, 0),
            ],
        );
        assert!(parse_mish(&mish, "x".into(), 0, 0, 4096).is_ok());
    }

    #[test]
    fn rejects_truncated_payload() {
        let mut mish = build_mish(8, &[(0x00000001, 0, 8, 0, 4096), (0xFFFFFFFF, 8, 0, 0, 0)]);
        mish.truncate(mish.len() - 10);
        assert!(parse_mish(&mish, "x".into(), 0, 0, 4096).is_err());
    }
}
