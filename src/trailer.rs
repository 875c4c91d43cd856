//! The `koly` trailer: a fixed 512-byte, big-endian record anchoring every other
//! offset in the image. Always the last `TRAILER_SIZE` bytes of the file.

use byteorder::{BigEndian, ReadBytesExt};

use crate::error::{Error, Result};
use crate::region::BackingRegion;

/// `koly` magic bytes.
pub const KOLY_MAGIC: &[u8; 4] = b"koly";

/// Trailer size in bytes, fixed by the format.
pub const TRAILER_SIZE: u64 = 512;

/// A checksum record as carried in the trailer: an algorithm tag, a bit-size, and up
/// to 128 bytes of raw digest. The algorithm isn't interpreted by this core — trailer
/// validation only checks that `bit_size` fits in `data`.
#[derive(Debug, Clone)]
pub struct ChecksumRecord {
    pub algorithm: u32,
    pub bit_size: u32,
    pub data: [u8; 128],
}

/// The parsed and validated `koly` trailer.
#[derive(Debug, Clone)]
pub struct Trailer {
    pub version: u32,
    pub header_size: u32,
    pub flags: u32,
    pub running_data_fork_offset: u64,
    pub data_fork_offset: u64,
    pub data_fork_length: u64,
    pub rsrc_fork_offset: u64,
    pub rsrc_fork_length: u64,
    pub segment_number: u32,
    pub segment_count: u32,
    pub segment_id: [u8; 16],
    pub data_checksum: ChecksumRecord,
    pub xml_offset: u64,
    pub xml_length: u64,
    pub master_checksum: ChecksumRecord,
    pub image_variant: u32,
    pub sector_count: u64,
}

impl Trailer {
    /// Locate, decode and validate the trailer at the tail of a region of `byte_len` bytes.
    pub fn parse(region: &dyn BackingRegion, byte_len: u64) -> Result<Self> {
        if byte_len <= TRAILER_SIZE {
            return Err(Error::InvalidTrailer(format!(
                "image of {byte_len} bytes is too short to hold a {TRAILER_SIZE}-byte trailer"
            )));
        }

        let trailer_offset = byte_len - TRAILER_SIZE;
        let raw = region.read(trailer_offset, TRAILER_SIZE)?;
        let mut cursor = std::io::Cursor::new(&raw[..]);

        let mut magic = [0u8; 4];
        std::io::Read::read_exact(&mut cursor, &mut magic)?;
        if &magic != KOLY_MAGIC {
            return Err(Error::InvalidTrailer(format!(
                "bad magic {magic:02x?}, expected {KOLY_MAGIC:02x?}"
            )));
        }

        let version = cursor.read_u32::<BigEndian>()?;
        let header_size = cursor.read_u32::<BigEndian>()?;
        let flags = cursor.read_u32::<BigEndian>()?;
        let running_data_fork_offset = cursor.read_u64::<BigEndian>()?;
        let data_fork_offset = cursor.read_u64::<BigEndian>()?;
        let data_fork_length = cursor.read_u64::<BigEndian>()?;
        let rsrc_fork_offset = cursor.read_u64::<BigEndian>()?;
        let rsrc_fork_length = cursor.read_u64::<BigEndian>()?;
        let segment_number = cursor.read_u32::<BigEndian>()?;
        let segment_count = cursor.read_u32::<BigEndian>()?;

        let mut segment_id = [0u8; 16];
        std::io::Read::read_exact(&mut cursor, &mut segment_id)?;

        let data_checksum = read_checksum_record(&mut cursor)?;

        let xml_offset = cursor.read_u64::<BigEndian>()?;
        let xml_length = cursor.read_u64::<BigEndian>()?;

        // 120 bytes of reserved padding precede the master checksum in the real format.
        let mut reserved = [0u8; 120];
        std::io::Read::read_exact(&mut cursor, &mut reserved)?;

        let master_checksum = read_checksum_record(&mut cursor)?;

        let image_variant = cursor.read_u32::<BigEndian>()?;
        let sector_count = cursor.read_u64::<BigEndian>()?;

        let trailer = Trailer {
            version,
            header_size,
            flags,
            running_data_fork_offset,
            data_fork_offset,
            data_fork_length,
            rsrc_fork_offset,
            rsrc_fork_length,
            segment_number,
            segment_count,
            segment_id,
            data_checksum,
            xml_offset,
            xml_length,
            master_checksum,
            image_variant,
            sector_count,
        };

        trailer.validate(trailer_offset)?;
        Ok(trailer)
    }

    fn validate(&self, trailer_offset: u64) -> Result<()> {
        if self.header_size as u64 != TRAILER_SIZE {
            return Err(Error::MalformedContainer(format!(
                "header_size {} != trailer size {TRAILER_SIZE}",
                self.header_size
            )));
        }
        if self.xml_length == 0 || self.xml_length > u32::MAX as u64 {
            return Err(Error::MalformedContainer(format!(
                "xml_length {} out of range (0, 2^32)",
                self.xml_length
            )));
        }
        if self.data_checksum.bit_size as usize > self.data_checksum.data.len() * 8 {
            return Err(Error::MalformedContainer(format!(
                "data checksum bit_size {} exceeds raw capacity",
                self.data_checksum.bit_size
            )));
        }
        if self.sector_count == 0 {
            return Err(Error::MalformedContainer("sector_count is 0".into()));
        }
        if self.segment_count > 1 {
            return Err(Error::Unsupported(format!(
                "segmented images are unsupported (segment_count = {})",
                self.segment_count
            )));
        }

        let xml_top = self
            .xml_offset
            .checked_add(self.xml_length)
            .ok_or(Error::Overflow("xml_offset + xml_length"))?;
        if xml_top > trailer_offset {
            return Err(Error::MalformedContainer(format!(
                "xml range [{}, {xml_top}) extends past trailer at {trailer_offset}",
                self.xml_offset
            )));
        }

        let data_top = self
            .data_fork_offset
            .checked_add(self.data_fork_length)
            .ok_or(Error::Overflow("data_fork_offset + data_fork_length"))?;
        if data_top > trailer_offset {
            return Err(Error::MalformedContainer(format!(
                "data fork range [{}, {data_top}) extends past trailer at {trailer_offset}",
                self.data_fork_offset
            )));
        }

        Ok(())
    }
}

fn read_checksum_record(cursor: &mut std::io::Cursor<&[u8]>) -> Result<ChecksumRecord> {
    let algorithm = cursor.read_u32::<BigEndian>()?;
    let bit_size = cursor.read_u32::<BigEndian>()?;
    let mut data = [0u8; 128];
    std::io::Read::read_exact(cursor, &mut data)?;
    Ok(ChecksumRecord {
        algorithm,
        bit_size,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::MemoryRegion;
    use byteorder::WriteBytesExt;
    use std::io::Write;

    fn write_checksum(buf: &mut Vec<u8>, algorithm: u32, bit_size: u32) {
        buf.write_u32::<BigEndian>(algorithm).unwrap();
        buf.write_u32::<BigEndian>(bit_size).unwrap();
        buf.write_all(&[0u8; 128]).unwrap();
    }

    /// Build a minimal, valid trailer appended after `prefix_len` bytes of filler data.
    fn build_trailer(
        prefix_len: u64,
        magic: &[u8; 4],
        header_size: u32,
        xml_offset: u64,
        xml_length: u64,
        data_fork_offset: u64,
        data_fork_length: u64,
        segment_count: u32,
        sector_count: u64,
    ) -> Vec<u8> {
        let mut buf = vec![0u8; prefix_len as usize];
        buf.extend_from_slice(magic);
        buf.write_u32::<BigEndian>(4).unwrap(); // version
        buf.write_u32::<BigEndian>(header_size).unwrap();
        buf.write_u32::<BigEndian>(1).unwrap(); // flags
        buf.write_u64::<BigEndian>(0).unwrap(); // running_data_fork_offset
        buf.write_u64::<BigEndian>(data_fork_offset).unwrap();
        buf.write_u64::<BigEndian>(data_fork_length).unwrap();
        buf.write_u64::<BigEndian>(0).unwrap(); // rsrc_fork_offset
        buf.write_u64::<BigEndian>(0).unwrap(); // rsrc_fork_length
        buf.write_u32::<BigEndian>(1).unwrap(); // segment_number
        buf.write_u32::<BigEndian>(segment_count).unwrap();
        buf.extend_from_slice(&[0u8; 16]); // segment_id
        write_checksum(&mut buf, 2, 32);
        buf.write_u64::<BigEndian>(xml_offset).unwrap();
        buf.write_u64::<BigEndian>(xml_length).unwrap();
        buf.extend_from_slice(&[0u8; 120]);
        write_checksum(&mut buf, 2, 32);
        buf.write_u32::<BigEndian>(1).unwrap(); // image_variant
        buf.write_u64::<BigEndian>(sector_count).unwrap();
        buf.extend_from_slice(&[0u8; 12]); // trailing reserved, rounds out to 512
        assert_eq!(buf.len() as u64, prefix_len + TRAILER_SIZE);
        buf
    }

    #[test]
    fn parses_valid_trailer() {
        let bytes = build_trailer(1024, KOLY_MAGIC, 512, 0, 100, 0, 900, 1, 10);
        let region = MemoryRegion::from_bytes(bytes.clone());
        let trailer = Trailer::parse(&region, bytes.len() as u64).unwrap();
        assert_eq!(trailer.sector_count, 10);
        assert_eq!(trailer.xml_length, 100);
    }

    #[test]
    fn rejects_wrong_magic() {
        let bytes = build_trailer(1024, b"lolk", 512, 0, 100, 0, 900, 1, 10);
        let region = MemoryRegion::from_bytes(bytes.clone());
        assert!(Trailer::parse(&region, bytes.len() as u64).is_err());
    }

    #[test]
    fn rejects_zero_xml_length() {
        let bytes = build_trailer(1024, KOLY_MAGIC, 512, 0, 0, 0, 900, 1, 10);
        let region = MemoryRegion::from_bytes(bytes.clone());
        assert!(Trailer::parse(&region, bytes.len() as u64).is_err());
    }

    #[test]
    fn rejects_multi_segment() {
        let bytes = build_trailer(1024, KOLY_MAGIC, 512, 0, 100, 0, 900, 2, 10);
        let region = MemoryRegion::from_bytes(bytes.clone());
        assert!(Trailer::parse(&region, bytes.len() as u64).is_err());
    }

    #[test]
    fn rejects_xml_range_past_trailer() {
        let bytes = build_trailer(1024, KOLY_MAGIC, 512, 900, 1000, 0, 900, 1, 10);
        let region = MemoryRegion::from_bytes(bytes.clone());
        assert!(Trailer::parse(&region, bytes.len() as u64).is_err());
    }

    #[test]
    fn rejects_overflowing_xml_range() {
        let bytes = build_trailer(1024, KOLY_MAGIC, 512, u64::MAX - 10, 100, 0, 900, 1, 10);
        let region = MemoryRegion::from_bytes(bytes.clone());
        assert!(Trailer::parse(&region, bytes.len() as u64).is_err());
    }

    #[test]
    fn rejects_image_too_short() {
        let region = MemoryRegion::from_bytes(vec![0u8; 100]);
        assert!(Trailer::parse(&region, 100).is_err());
    }

    #[test]
    fn rejects_bad_header_size() {
        let bytes = build_trailer(1024, KOLY_MAGIC, 256, 0, 100, 0, 900, 1, 10);
        let region = MemoryRegion::from_bytes(bytes.clone());
        assert!(Trailer::parse(&region, bytes.len() as u64).is_err());
    }

    #[test]
    fn rejects_zero_sector_count() {
        let bytes = build_trailer(1024, KOLY_MAGIC, 512, 0, 100, 0, 900, 1, 0);
        let region = MemoryRegion::from_bytes(bytes.clone());
        assert!(Trailer::parse(&region, bytes.len() as u64).is_err());
    }
}
