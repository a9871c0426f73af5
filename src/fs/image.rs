use std::io::{Read, Seek, Write};

use log::{debug, warn};

use super::boot_sector::{parse_boot_sector, DiskGeometry};
use super::chain::{ChainCursor, ClusterChain};
use super::dir::{DirLocation, DirectoryIter};
use super::entry::DirectoryEntry;
use super::fat_table::{self, ClusterLink};
use super::path::{self, ResolvedTarget};
use super::sector::{SectorReader, SECTOR_SIZE};
use crate::config::ImageOptions;
use crate::error::{FatError, Result};

/// An open FAT12/FAT16 image.
///
/// Owns the byte source and the geometry decoded at open time. All queries go
/// through `&mut self`; nothing else holds reader state.
pub struct FatImage<R> {
    sectors: SectorReader<R>,
    geometry: DiskGeometry,
    options: ImageOptions,
}

impl<R: Read + Seek> FatImage<R> {
    pub fn open(reader: R) -> Result<Self> {
        Self::open_with(reader, ImageOptions::default())
    }

    pub fn open_with(reader: R, options: ImageOptions) -> Result<Self> {
        let mut sectors = SectorReader::new(reader, options.partition_offset);
        let boot = sectors.read_sector(0)?;
        let geometry = parse_boot_sector(&boot)?;

        if !geometry.has_boot_signature {
            if options.require_boot_signature {
                return Err(FatError::Validation(
                    "missing 0x55AA boot signature".into(),
                ));
            }
            warn!("boot sector has no 0x55AA signature");
        }

        debug!(
            "opened {} volume: {} sectors, {} clusters of {} bytes, root at sector {} ({} entries), data at sector {}",
            geometry.fat_type.name(),
            geometry.total_sectors,
            geometry.cluster_count,
            geometry.bytes_per_cluster(),
            geometry.first_root_sector,
            geometry.root_entry_count,
            geometry.first_data_sector,
        );

        Ok(Self {
            sectors,
            geometry,
            options,
        })
    }

    pub fn geometry(&self) -> &DiskGeometry {
        &self.geometry
    }

    pub fn options(&self) -> &ImageOptions {
        &self.options
    }

    /// Read one raw sector of the volume.
    pub fn read_sector(&mut self, n: u64) -> Result<[u8; SECTOR_SIZE]> {
        self.sectors.read_sector(n)
    }

    pub fn next_cluster(&mut self, cluster: u32) -> Result<ClusterLink> {
        fat_table::next_cluster(&mut self.sectors, &self.geometry, cluster)
    }

    /// Lazily walk the cluster chain starting at `start_cluster`.
    pub fn cluster_chain(&mut self, start_cluster: u32) -> ClusterChain<'_, R> {
        ClusterChain::new(&mut self.sectors, &self.geometry, start_cluster)
    }

    /// Iterate a directory by location.
    pub fn directory(&mut self, location: DirLocation) -> DirectoryIter<'_, R> {
        DirectoryIter::new(&mut self.sectors, &self.geometry, location)
    }

    pub fn resolve(&mut self, path: &str) -> Result<ResolvedTarget> {
        path::resolve(&mut self.sectors, &self.geometry, path)
    }

    /// Entries of the directory named by `path`, in on-disk order.
    pub fn list_directory(&mut self, path: &str) -> Result<DirectoryIter<'_, R>> {
        let location = self
            .resolve(path)?
            .directory_location()
            .ok_or_else(|| FatError::NotADirectory(path.to_string()))?;
        Ok(self.directory(location))
    }

    /// Contents of the file named by `path`, truncated to its recorded size
    /// and to `ImageOptions::max_file_bytes`.
    pub fn read_file_bytes(&mut self, path: &str) -> Result<Vec<u8>> {
        let entry = self.file_entry(path)?;
        let limit = self.options.max_file_bytes.unwrap_or(u64::MAX);
        let capacity = (entry.size as u64).min(limit).min(self.geometry.total_size());
        let mut data = Vec::with_capacity(capacity as usize);
        self.copy_entry_data(&entry, limit, &mut data)?;
        Ok(data)
    }

    /// Stream the file named by `path` into `writer`. Returns the bytes written.
    pub fn write_file_to(&mut self, path: &str, writer: &mut dyn Write) -> Result<u64> {
        let entry = self.file_entry(path)?;
        self.copy_entry_data(&entry, u64::MAX, writer)
    }

    /// Stream the data of an already-decoded file entry, sector by sector.
    ///
    /// A chain that ends before `min(size, limit)` bytes is `CorruptChain` at
    /// its last cluster; bytes already written to `writer` stay written.
    pub fn copy_entry_data(
        &mut self,
        entry: &DirectoryEntry,
        limit: u64,
        writer: &mut dyn Write,
    ) -> Result<u64> {
        if entry.is_directory() {
            return Err(FatError::IsADirectory(entry.short_name()));
        }

        let total = (entry.size as u64).min(limit);
        if total == 0 {
            return Ok(0);
        }
        if entry.starting_cluster < 2 {
            return Err(FatError::corrupt_chain(
                entry.starting_cluster as u32,
                format!("{} has {} bytes but no clusters", entry.short_name(), entry.size),
            ));
        }

        let mut remaining = total;
        let mut last = entry.starting_cluster as u32;
        let mut buf = [0u8; SECTOR_SIZE];
        let mut cursor = ChainCursor::new(last);
        'chain: while let Some(cluster) = cursor.advance(&mut self.sectors, &self.geometry)? {
            last = cluster;
            for sector in self.geometry.cluster_sectors(cluster) {
                if remaining == 0 {
                    break 'chain;
                }
                self.sectors.read_sector_into(sector, &mut buf)?;
                let n = remaining.min(SECTOR_SIZE as u64) as usize;
                writer.write_all(&buf[..n])?;
                remaining -= n as u64;
            }
            if remaining == 0 {
                break;
            }
        }

        if remaining > 0 {
            return Err(FatError::corrupt_chain(
                last,
                format!(
                    "{} chain ends {} bytes short of recorded size {}",
                    entry.short_name(),
                    remaining,
                    entry.size
                ),
            ));
        }
        Ok(total)
    }

    /// Volume label from the root directory, falling back to the boot sector.
    pub fn volume_label(&mut self) -> Result<Option<String>> {
        for entry in self.directory(DirLocation::Root) {
            let entry = entry?;
            if entry.is_volume_label() {
                let label = entry.label();
                if !label.is_empty() {
                    return Ok(Some(label));
                }
            }
        }
        Ok(self.geometry.volume_label.clone())
    }

    /// Bytes held by allocated clusters.
    pub fn used_bytes(&mut self) -> Result<u64> {
        let clusters = fat_table::count_allocated_clusters(&mut self.sectors, &self.geometry)?;
        Ok(clusters as u64 * self.geometry.bytes_per_cluster() as u64)
    }

    /// Release the image, handing back the underlying source.
    pub fn close(self) -> R {
        self.sectors.into_inner()
    }

    fn file_entry(&mut self, path: &str) -> Result<DirectoryEntry> {
        match self.resolve(path)? {
            ResolvedTarget::Root => Err(FatError::IsADirectory(path.to_string())),
            ResolvedTarget::Entry { entry, .. } if entry.is_directory() => {
                Err(FatError::IsADirectory(path.to_string()))
            }
            ResolvedTarget::Entry { entry, .. } => Ok(entry),
        }
    }
}
