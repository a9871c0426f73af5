use std::io::{self, Read, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};
use log::trace;

use crate::error::Result;

/// The only logical sector size this crate understands.
pub const SECTOR_SIZE: usize = 512;

/// Random-access reader of fixed-size sectors within a FAT volume.
///
/// Every read seeks to an absolute position first, so two traversals sharing
/// one reader never depend on where the other left the stream.
pub struct SectorReader<R> {
    reader: R,
    /// Byte offset of the volume within the reader.
    partition_offset: u64,
}

impl<R: Read + Seek> SectorReader<R> {
    pub fn new(reader: R, partition_offset: u64) -> Self {
        Self {
            reader,
            partition_offset,
        }
    }

    /// Read sector `n` (relative to the volume start) into a fresh buffer.
    pub fn read_sector(&mut self, n: u64) -> Result<[u8; SECTOR_SIZE]> {
        let mut buf = [0u8; SECTOR_SIZE];
        self.read_sector_into(n, &mut buf)?;
        Ok(buf)
    }

    /// Read sector `n` into a caller-owned buffer.
    pub fn read_sector_into(&mut self, n: u64, buf: &mut [u8; SECTOR_SIZE]) -> Result<()> {
        trace!("read sector {n}");
        let offset = n
            .checked_mul(SECTOR_SIZE as u64)
            .ok_or_else(|| offset_overflow(n))?;
        self.seek_volume(offset)?;
        self.reader.read_exact(buf)?;
        Ok(())
    }

    /// Read a little-endian 16-bit value at a byte offset within the volume.
    pub fn read_u16_at(&mut self, offset: u64) -> Result<u16> {
        self.seek_volume(offset)?;
        Ok(self.reader.read_u16::<LittleEndian>()?)
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    fn seek_volume(&mut self, offset: u64) -> Result<()> {
        let absolute = self
            .partition_offset
            .checked_add(offset)
            .ok_or_else(|| offset_overflow(offset))?;
        self.reader.seek(SeekFrom::Start(absolute))?;
        Ok(())
    }
}

fn offset_overflow(value: u64) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("offset overflow at {value}"),
    )
}
