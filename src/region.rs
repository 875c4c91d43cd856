//! The byte-addressable backing store a disk image is parsed over.
//!
//! The core never assumes its input is one contiguous buffer: on the platform this
//! format comes from, the backing store is a RAM-disk built out of separately
//! allocated extents. [`BackingRegion`] is the capability the core actually depends
//! on; [`MemoryRegion`] is the one concrete implementation this crate provides,
//! modeled the same way — a set of extents, not a `Vec<u8>`.

use std::io::Read;

use crate::error::{Error, Result};

/// A read-only, byte-addressable region of storage.
///
/// Implementations are free to back this with a single allocation, a scatter-gather
/// extent table, a memory-mapped file, or anything else that can answer a ranged read.
pub trait BackingRegion {
    /// Total length of the region in bytes.
    fn len(&self) -> u64;

    /// Read `length` bytes starting at `offset`. Fails if the range is out of bounds.
    fn read(&self, offset: u64, length: u64) -> Result<Vec<u8>>;

    /// Returns `true` if the region holds no bytes.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One separately-allocated span of bytes within a [`MemoryRegion`].
struct Extent {
    start: u64,
    data: Box<[u8]>,
}

/// An in-memory backing region, physically stored as a table of extents rather than
/// one contiguous buffer — the same shape as the RAM-disk this format is read from.
pub struct MemoryRegion {
    extents: Vec<Extent>,
    len: u64,
}

impl MemoryRegion {
    /// Build a region from a single buffer, as one extent.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        let len = data.len() as u64;
        MemoryRegion {
            extents: vec![Extent {
                start: 0,
                data: data.into_boxed_slice(),
            }],
            len,
        }
    }

    /// Build a region out of independently-allocated extents, in ascending `start` order.
    /// Extents must be contiguous and non-overlapping; violating that is a programmer error.
    pub fn from_extents(chunks: Vec<Vec<u8>>) -> Self {
        let mut extents = Vec::with_capacity(chunks.len());
        let mut offset = 0u64;
        for chunk in chunks {
            let start = offset;
            offset += chunk.len() as u64;
            extents.push(Extent {
                start,
                data: chunk.into_boxed_slice(),
            });
        }
        MemoryRegion {
            extents,
            len: offset,
        }
    }

    /// Read the full contents of `reader` into a region, splitting it into fixed-size
    /// extents. This is the crate's stand-in for the externally-owned "load a file into
    /// the RAM-disk" helper — callers with their own loader should implement
    /// [`BackingRegion`] directly instead of going through this.
    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self> {
        const EXTENT_SIZE: usize = 1024 * 1024;
        let mut chunks = Vec::new();
        loop {
            let mut buf = vec![0u8; EXTENT_SIZE];
            let mut filled = 0;
            while filled < buf.len() {
                match reader.read(&mut buf[filled..])? {
                    0 => break,
                    n => filled += n,
                }
            }
            if filled == 0 {
                break;
            }
            buf.truncate(filled);
            let done = filled < EXTENT_SIZE;
            chunks.push(buf);
            if done {
                break;
            }
        }
        Ok(MemoryRegion::from_extents(chunks))
    }

    fn extent_containing(&self, offset: u64) -> Option<usize> {
        // Extents are in ascending, contiguous order, so a linear scan from the
        // binary-searched upper bound is enough; partition_point keeps this O(log n).
        let idx = self.extents.partition_point(|e| e.start <= offset);
        if idx == 0 {
            None
        } else {
            Some(idx - 1)
        }
    }
}

impl BackingRegion for MemoryRegion {
    fn len(&self) -> u64 {
        self.len
    }

    fn read(&self, offset: u64, length: u64) -> Result<Vec<u8>> {
        let end = offset
            .checked_add(length)
            .ok_or(Error::Overflow("region read range"))?;
        if end > self.len {
            return Err(Error::RegionRead { offset, length });
        }

        let mut out = Vec::with_capacity(length as usize);
        let mut cur = offset;
        while cur < end {
            let idx = self
                .extent_containing(cur)
                .ok_or(Error::RegionRead { offset, length })?;
            let extent = &self.extents[idx];
            let extent_end = extent.start + extent.data.len() as u64;
            let take_end = end.min(extent_end);
            let local_start = (cur - extent.start) as usize;
            let local_end = (take_end - extent.start) as usize;
            out.extend_from_slice(&extent.data[local_start..local_end]);
            cur = take_end;
        }
        Ok(out)
    }
}
