use std::ops::Range;

use byteorder::{ByteOrder, LittleEndian};
use serde::Serialize;

use super::entry::DIR_ENTRY_SIZE;
use super::sector::SECTOR_SIZE;
use crate::error::{FatError, Result};

/// Volumes with fewer data clusters than this are FAT12.
const FAT12_MAX_CLUSTERS: u32 = 4085;
/// Volumes with fewer data clusters than this are FAT16.
const FAT16_MAX_CLUSTERS: u32 = 65525;

const BOOT_SIGNATURE: u16 = 0xAA55;
const EXTENDED_BOOT_SIGNATURE: u8 = 0x29;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FatType {
    Fat12,
    Fat16,
}

impl FatType {
    pub fn name(&self) -> &'static str {
        match self {
            FatType::Fat12 => "FAT12",
            FatType::Fat16 => "FAT16",
        }
    }
}

/// Volume layout decoded from the boot sector. Computed once per image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiskGeometry {
    pub oem_name: String,
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub fat_count: u8,
    /// Fixed number of root directory slots.
    pub root_entry_count: u16,
    /// Total sectors, taken from the 32-bit field when the 16-bit one is zero.
    pub total_sectors: u32,
    pub media_descriptor: u8,
    pub sectors_per_fat: u16,
    /// Label recorded in the extended BPB, if any.
    pub volume_label: Option<String>,
    pub has_boot_signature: bool,

    pub first_fat_sector: u32,
    pub first_root_sector: u32,
    pub root_sector_count: u32,
    pub first_data_sector: u32,
    /// Number of data clusters; valid cluster numbers are `2..=cluster_count + 1`.
    pub cluster_count: u32,
    pub fat_type: FatType,
}

impl DiskGeometry {
    pub fn bytes_per_cluster(&self) -> u32 {
        self.bytes_per_sector as u32 * self.sectors_per_cluster as u32
    }

    /// Highest cluster number that maps into the data region.
    pub fn max_cluster(&self) -> u32 {
        self.cluster_count + 1
    }

    /// Size of one FAT copy in bytes.
    pub fn fat_size_bytes(&self) -> u64 {
        self.sectors_per_fat as u64 * self.bytes_per_sector as u64
    }

    /// Sectors backing a data cluster. The caller guarantees `cluster >= 2`.
    pub fn cluster_sectors(&self, cluster: u32) -> Range<u64> {
        let first = self.first_data_sector as u64
            + (cluster as u64 - 2) * self.sectors_per_cluster as u64;
        first..first + self.sectors_per_cluster as u64
    }

    pub fn total_size(&self) -> u64 {
        self.total_sectors as u64 * self.bytes_per_sector as u64
    }
}

/// Decode sector 0 of a FAT volume.
pub fn parse_boot_sector(bpb: &[u8]) -> Result<DiskGeometry> {
    if bpb.len() < SECTOR_SIZE {
        return Err(FatError::Validation(format!(
            "boot sector truncated: {} bytes",
            bpb.len()
        )));
    }

    let bytes_per_sector = LittleEndian::read_u16(&bpb[0x0B..]);
    let sectors_per_cluster = bpb[0x0D];
    let reserved_sectors = LittleEndian::read_u16(&bpb[0x0E..]);
    let fat_count = bpb[0x10];
    let root_entry_count = LittleEndian::read_u16(&bpb[0x11..]);
    let total_sectors_16 = LittleEndian::read_u16(&bpb[0x13..]);
    let media_descriptor = bpb[0x15];
    let sectors_per_fat = LittleEndian::read_u16(&bpb[0x16..]);
    let total_sectors_32 = LittleEndian::read_u32(&bpb[0x20..]);

    if fat_count == 0 || sectors_per_cluster == 0 || bytes_per_sector == 0 {
        return Err(FatError::Validation(format!(
            "not a FAT volume: fats={fat_count} sectors/cluster={sectors_per_cluster} \
             bytes/sector={bytes_per_sector}"
        )));
    }
    if bytes_per_sector as usize != SECTOR_SIZE {
        return Err(FatError::UnsupportedGeometry(format!(
            "sector size {bytes_per_sector} not supported"
        )));
    }
    if root_entry_count == 0 {
        return Err(FatError::UnsupportedGeometry(
            "no fixed root directory (FAT32)".into(),
        ));
    }

    let total_sectors = if total_sectors_16 != 0 {
        total_sectors_16 as u32
    } else {
        total_sectors_32
    };

    let first_fat_sector = reserved_sectors as u32;
    let first_root_sector = first_fat_sector + fat_count as u32 * sectors_per_fat as u32;
    let root_sector_count = (root_entry_count as u32 * DIR_ENTRY_SIZE as u32)
        .div_ceil(bytes_per_sector as u32);
    let first_data_sector = first_root_sector + root_sector_count;
    let cluster_count =
        total_sectors.saturating_sub(first_data_sector) / sectors_per_cluster as u32;

    let fat_type = if cluster_count < FAT12_MAX_CLUSTERS {
        FatType::Fat12
    } else if cluster_count < FAT16_MAX_CLUSTERS {
        FatType::Fat16
    } else {
        return Err(FatError::UnsupportedGeometry(format!(
            "{cluster_count} clusters requires FAT32"
        )));
    };

    let volume_label = if bpb[0x26] == EXTENDED_BOOT_SIGNATURE {
        let label = trim_field(&bpb[0x2B..0x36]);
        if label.is_empty() || label == "NO NAME" {
            None
        } else {
            Some(label)
        }
    } else {
        None
    };

    Ok(DiskGeometry {
        oem_name: trim_field(&bpb[0x03..0x0B]),
        bytes_per_sector,
        sectors_per_cluster,
        reserved_sectors,
        fat_count,
        root_entry_count,
        total_sectors,
        media_descriptor,
        sectors_per_fat,
        volume_label,
        has_boot_signature: LittleEndian::read_u16(&bpb[510..]) == BOOT_SIGNATURE,
        first_fat_sector,
        first_root_sector,
        root_sector_count,
        first_data_sector,
        cluster_count,
        fat_type,
    })
}

fn trim_field(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches([' ', '\0'])
        .to_string()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build a boot sector with the given BPB fields and a valid signature.
    pub(crate) fn make_boot_sector(
        sectors_per_cluster: u8,
        reserved_sectors: u16,
        fat_count: u8,
        root_entry_count: u16,
        total_sectors_16: u16,
        sectors_per_fat: u16,
    ) -> [u8; 512] {
        let mut bpb = [0u8; 512];
        bpb[0] = 0xEB;
        bpb[1] = 0x3C;
        bpb[2] = 0x90;
        bpb[3..11].copy_from_slice(b"MSDOS5.0");
        bpb[0x0B..0x0D].copy_from_slice(&512u16.to_le_bytes());
        bpb[0x0D] = sectors_per_cluster;
        bpb[0x0E..0x10].copy_from_slice(&reserved_sectors.to_le_bytes());
        bpb[0x10] = fat_count;
        bpb[0x11..0x13].copy_from_slice(&root_entry_count.to_le_bytes());
        bpb[0x13..0x15].copy_from_slice(&total_sectors_16.to_le_bytes());
        bpb[0x15] = 0xF0;
        bpb[0x16..0x18].copy_from_slice(&sectors_per_fat.to_le_bytes());
        bpb[510] = 0x55;
        bpb[511] = 0xAA;
        bpb
    }

    fn floppy_144() -> [u8; 512] {
        make_boot_sector(1, 1, 2, 224, 2880, 9)
    }

    #[test]
    fn test_floppy_geometry() {
        let geom = parse_boot_sector(&floppy_144()).unwrap();
        assert_eq!(geom.bytes_per_sector, 512);
        assert_eq!(geom.sectors_per_cluster, 1);
        assert_eq!(geom.reserved_sectors, 1);
        assert_eq!(geom.fat_count, 2);
        assert_eq!(geom.root_entry_count, 224);
        assert_eq!(geom.total_sectors, 2880);
        assert_eq!(geom.sectors_per_fat, 9);
        assert_eq!(geom.first_fat_sector, 1);
        assert_eq!(geom.first_root_sector, 19);
        assert_eq!(geom.root_sector_count, 14);
        assert_eq!(geom.first_data_sector, 33);
        assert_eq!(geom.cluster_count, 2847);
        assert_eq!(geom.fat_type, FatType::Fat12);
        assert_eq!(geom.oem_name, "MSDOS5.0");
        assert_eq!(geom.media_descriptor, 0xF0);
        assert!(geom.has_boot_signature);
        assert_eq!(geom.cluster_sectors(2), 33..34);
        assert_eq!(geom.cluster_sectors(10), 41..42);
    }

    #[test]
    fn test_derived_fields_multi_sector_clusters() {
        // 16 MB FAT16: 4 sectors/cluster, 512 root entries
        let mut bpb = make_boot_sector(4, 4, 2, 512, 0, 32);
        bpb[0x20..0x24].copy_from_slice(&32768u32.to_le_bytes());
        let geom = parse_boot_sector(&bpb).unwrap();
        assert_eq!(geom.total_sectors, 32768);
        assert_eq!(geom.first_root_sector, 4 + 2 * 32);
        assert_eq!(geom.root_sector_count, 32);
        assert_eq!(geom.first_data_sector, 100);
        assert_eq!(geom.cluster_count, (32768 - 100) / 4);
        assert_eq!(geom.fat_type, FatType::Fat16);
        assert_eq!(geom.bytes_per_cluster(), 2048);
        assert_eq!(geom.cluster_sectors(3), 104..108);
    }

    #[test]
    fn test_total_sectors_16_wins_over_32() {
        let mut bpb = floppy_144();
        bpb[0x20..0x24].copy_from_slice(&99999u32.to_le_bytes());
        assert_eq!(parse_boot_sector(&bpb).unwrap().total_sectors, 2880);
    }

    #[test]
    fn test_root_sector_count_rounds_up() {
        let geom = parse_boot_sector(&make_boot_sector(1, 1, 2, 17, 2880, 9)).unwrap();
        assert_eq!(geom.root_sector_count, 2);
    }

    #[test]
    fn test_rejects_zero_fats() {
        let bpb = make_boot_sector(1, 1, 0, 224, 2880, 9);
        assert!(matches!(
            parse_boot_sector(&bpb),
            Err(FatError::Validation(_))
        ));
    }

    #[test]
    fn test_rejects_zero_sectors_per_cluster() {
        let bpb = make_boot_sector(0, 1, 2, 224, 2880, 9);
        assert!(matches!(
            parse_boot_sector(&bpb),
            Err(FatError::Validation(_))
        ));
    }

    #[test]
    fn test_rejects_zero_sector_size() {
        let mut bpb = floppy_144();
        bpb[0x0B] = 0;
        bpb[0x0C] = 0;
        assert!(matches!(
            parse_boot_sector(&bpb),
            Err(FatError::Validation(_))
        ));
    }

    #[test]
    fn test_rejects_non_512_sectors() {
        for size in [256u16, 1024, 2048, 4096] {
            let mut bpb = floppy_144();
            bpb[0x0B..0x0D].copy_from_slice(&size.to_le_bytes());
            assert!(
                matches!(
                    parse_boot_sector(&bpb),
                    Err(FatError::UnsupportedGeometry(_))
                ),
                "sector size {size} should be rejected"
            );
        }
    }

    #[test]
    fn test_rejects_fat32_layout() {
        let bpb = make_boot_sector(8, 32, 2, 0, 0, 0);
        assert!(matches!(
            parse_boot_sector(&bpb),
            Err(FatError::UnsupportedGeometry(_))
        ));
    }

    #[test]
    fn test_rejects_truncated_input() {
        let bpb = floppy_144();
        assert!(matches!(
            parse_boot_sector(&bpb[..100]),
            Err(FatError::Validation(_))
        ));
    }

    #[test]
    fn test_extended_bpb_label() {
        let mut bpb = floppy_144();
        bpb[0x26] = 0x29;
        bpb[0x2B..0x36].copy_from_slice(b"BOOTDISK   ");
        let geom = parse_boot_sector(&bpb).unwrap();
        assert_eq!(geom.volume_label.as_deref(), Some("BOOTDISK"));

        bpb[0x2B..0x36].copy_from_slice(b"NO NAME    ");
        assert_eq!(parse_boot_sector(&bpb).unwrap().volume_label, None);
    }

    #[test]
    fn test_missing_signature_still_parses() {
        let mut bpb = floppy_144();
        bpb[510] = 0;
        bpb[511] = 0;
        let geom = parse_boot_sector(&bpb).unwrap();
        assert!(!geom.has_boot_signature);
    }
}
