use std::io::{Read, Seek};

use byteorder::{ByteOrder, LittleEndian};
use log::trace;

use super::boot_sector::{DiskGeometry, FatType};
use super::sector::SectorReader;
use crate::error::{FatError, Result};

/// Decoded value of one FAT entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterLink {
    /// The chain continues at this cluster.
    Next(u32),
    EndOfChain,
    /// Unallocated cluster.
    Free,
    /// Reserved or bad-cluster marker.
    Reserved,
}

impl ClusterLink {
    /// Classify a raw FAT entry value.
    pub fn from_raw(raw: u32, fat_type: FatType) -> Self {
        let (reserved_min, eoc_min) = match fat_type {
            FatType::Fat12 => (0x0FF0, 0x0FF8),
            FatType::Fat16 => (0xFFF0, 0xFFF8),
        };
        match raw {
            0 => ClusterLink::Free,
            1 => ClusterLink::Reserved,
            v if v >= eoc_min => ClusterLink::EndOfChain,
            v if v >= reserved_min => ClusterLink::Reserved,
            v => ClusterLink::Next(v),
        }
    }
}

/// Byte offset of a cluster's entry within one FAT copy.
fn entry_offset(cluster: u32, fat_type: FatType) -> u64 {
    match fat_type {
        // Two 12-bit entries share three bytes
        FatType::Fat12 => cluster as u64 + cluster as u64 / 2,
        FatType::Fat16 => cluster as u64 * 2,
    }
}

/// Extract a 12-bit entry from the little-endian word at its byte offset.
/// Even clusters use the low 12 bits, odd clusters the high 12 bits.
fn fat12_value(word: u16, cluster: u32) -> u32 {
    if cluster & 1 == 1 {
        (word >> 4) as u32
    } else {
        (word & 0x0FFF) as u32
    }
}

/// Look up the successor of `cluster` in the first FAT.
pub fn next_cluster<R: Read + Seek>(
    sectors: &mut SectorReader<R>,
    geometry: &DiskGeometry,
    cluster: u32,
) -> Result<ClusterLink> {
    let offset = entry_offset(cluster, geometry.fat_type);
    // Both FAT widths read a 16-bit word starting at the entry offset
    if offset + 2 > geometry.fat_size_bytes() {
        return Err(FatError::corrupt_chain(
            cluster,
            format!(
                "entry offset {offset} beyond FAT of {} bytes",
                geometry.fat_size_bytes()
            ),
        ));
    }

    let fat_start = geometry.first_fat_sector as u64 * geometry.bytes_per_sector as u64;
    let word = sectors.read_u16_at(fat_start + offset)?;
    let raw = match geometry.fat_type {
        FatType::Fat12 => fat12_value(word, cluster),
        FatType::Fat16 => word as u32,
    };
    let link = ClusterLink::from_raw(raw, geometry.fat_type);
    trace!("FAT[{cluster}] = {raw:#05X} ({link:?})");
    Ok(link)
}

/// Count allocated data clusters by scanning the whole first FAT.
pub fn count_allocated_clusters<R: Read + Seek>(
    sectors: &mut SectorReader<R>,
    geometry: &DiskGeometry,
) -> Result<u32> {
    let mut fat = Vec::with_capacity(geometry.fat_size_bytes() as usize);
    let first = geometry.first_fat_sector as u64;
    for n in first..first + geometry.sectors_per_fat as u64 {
        fat.extend_from_slice(&sectors.read_sector(n)?);
    }

    let mut used = 0u32;
    for cluster in 2..=geometry.max_cluster() {
        let off = entry_offset(cluster, geometry.fat_type) as usize;
        if off + 1 >= fat.len() {
            break;
        }
        let word = LittleEndian::read_u16(&fat[off..]);
        let raw = match geometry.fat_type {
            FatType::Fat12 => fat12_value(word, cluster),
            FatType::Fat16 => word as u32,
        };
        if raw != 0 {
            used += 1;
        }
    }
    Ok(used)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::boot_sector::parse_boot_sector;
    use crate::fs::boot_sector::tests::make_boot_sector;
    use std::io::Cursor;

    /// Pack 12-bit entries into FAT12 byte layout.
    fn pack_fat12(entries: &[u16]) -> Vec<u8> {
        let mut out = vec![0u8; (entries.len() * 3).div_ceil(2) + 1];
        for (cluster, &value) in entries.iter().enumerate() {
            let off = cluster * 3 / 2;
            if cluster % 2 == 0 {
                out[off] = value as u8;
                out[off + 1] = (out[off + 1] & 0xF0) | ((value >> 8) as u8 & 0x0F);
            } else {
                out[off] = (out[off] & 0x0F) | ((value << 4) as u8);
                out[off + 1] = (value >> 4) as u8;
            }
        }
        out
    }

    fn floppy_with_fat(fat: &[u8]) -> (SectorReader<Cursor<Vec<u8>>>, DiskGeometry) {
        let boot = make_boot_sector(1, 1, 2, 224, 2880, 9);
        let mut image = vec![0u8; 2880 * 512];
        image[..512].copy_from_slice(&boot);
        image[512..512 + fat.len()].copy_from_slice(fat);
        let geom = parse_boot_sector(&boot).unwrap();
        (SectorReader::new(Cursor::new(image), 0), geom)
    }

    #[test]
    fn test_classify_fat12() {
        assert_eq!(ClusterLink::from_raw(0, FatType::Fat12), ClusterLink::Free);
        assert_eq!(ClusterLink::from_raw(1, FatType::Fat12), ClusterLink::Reserved);
        assert_eq!(ClusterLink::from_raw(0x123, FatType::Fat12), ClusterLink::Next(0x123));
        assert_eq!(ClusterLink::from_raw(0xFF7, FatType::Fat12), ClusterLink::Reserved);
        assert_eq!(ClusterLink::from_raw(0xFF8, FatType::Fat12), ClusterLink::EndOfChain);
        assert_eq!(ClusterLink::from_raw(0xFFF, FatType::Fat12), ClusterLink::EndOfChain);
    }

    #[test]
    fn test_classify_fat16() {
        assert_eq!(ClusterLink::from_raw(0xFF8, FatType::Fat16), ClusterLink::Next(0xFF8));
        assert_eq!(ClusterLink::from_raw(0xFFF0, FatType::Fat16), ClusterLink::Reserved);
        assert_eq!(ClusterLink::from_raw(0xFFF7, FatType::Fat16), ClusterLink::Reserved);
        assert_eq!(ClusterLink::from_raw(0xFFF8, FatType::Fat16), ClusterLink::EndOfChain);
    }

    #[test]
    fn test_fat12_even_and_odd() {
        // 0: media, 1: reserved, 2 -> 3, 3 -> 0xABC, 4 -> EOC, 5 -> free
        let fat = pack_fat12(&[0xFF0, 0xFFF, 0x003, 0xABC, 0xFFF, 0x000]);
        assert_eq!(&fat[..3], &[0xF0, 0xFF, 0xFF]);
        let (mut sectors, geom) = floppy_with_fat(&fat);
        assert_eq!(next_cluster(&mut sectors, &geom, 2).unwrap(), ClusterLink::Next(3));
        assert_eq!(next_cluster(&mut sectors, &geom, 3).unwrap(), ClusterLink::Next(0xABC));
        assert_eq!(next_cluster(&mut sectors, &geom, 4).unwrap(), ClusterLink::EndOfChain);
        assert_eq!(next_cluster(&mut sectors, &geom, 5).unwrap(), ClusterLink::Free);
    }

    #[test]
    fn test_fat12_entry_straddling_sector_boundary() {
        // Cluster 341 starts at byte 511 of the first FAT sector
        let mut entries = vec![0u16; 400];
        entries[341] = 0x155;
        let fat = pack_fat12(&entries);
        let (mut sectors, geom) = floppy_with_fat(&fat);
        assert_eq!(entry_offset(341, FatType::Fat12), 511);
        assert_eq!(next_cluster(&mut sectors, &geom, 341).unwrap(), ClusterLink::Next(0x155));
    }

    #[test]
    fn test_offset_beyond_fat_is_corrupt() {
        let (mut sectors, geom) = floppy_with_fat(&pack_fat12(&[0xFF0, 0xFFF]));
        // 9 sectors * 512 bytes = 4608 bytes hold 3072 entries
        assert!(matches!(
            next_cluster(&mut sectors, &geom, 3072),
            Err(FatError::CorruptChain { cluster: 3072, .. })
        ));
    }

    #[test]
    fn test_count_allocated_clusters() {
        let fat = pack_fat12(&[0xFF0, 0xFFF, 0x003, 0xFFF, 0x000, 0xFF7, 0xFFF]);
        let (mut sectors, geom) = floppy_with_fat(&fat);
        assert_eq!(count_allocated_clusters(&mut sectors, &geom).unwrap(), 4);
    }
}
