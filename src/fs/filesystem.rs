use std::io::{Read, Seek};

use super::entry::DirectoryEntry;
use super::image::FatImage;
use super::path::ResolvedTarget;
use crate::error::{FatError, Result};

/// Trait for browsing a filesystem image by path.
pub trait Filesystem: Send {
    /// List the entries of a directory.
    fn list(&mut self, path: &str) -> Result<Vec<DirectoryEntry>>;

    /// Read file contents (up to `max_bytes`).
    fn read_file(&mut self, path: &str, max_bytes: usize) -> Result<Vec<u8>>;

    /// Volume label, if available.
    fn volume_label(&mut self) -> Result<Option<String>>;

    /// Filesystem type name (e.g., "FAT12", "FAT16").
    fn fs_type(&self) -> &str;

    /// Total filesystem size in bytes.
    fn total_size(&self) -> u64;

    /// Space held by allocated clusters, in bytes.
    fn used_size(&mut self) -> Result<u64>;
}

impl<R: Read + Seek + Send> Filesystem for FatImage<R> {
    fn list(&mut self, path: &str) -> Result<Vec<DirectoryEntry>> {
        self.list_directory(path)?.collect()
    }

    fn read_file(&mut self, path: &str, max_bytes: usize) -> Result<Vec<u8>> {
        let entry = match self.resolve(path)? {
            ResolvedTarget::Entry { entry, .. } if !entry.is_directory() => entry,
            _ => return Err(FatError::IsADirectory(path.to_string())),
        };
        let mut data = Vec::new();
        self.copy_entry_data(&entry, max_bytes as u64, &mut data)?;
        Ok(data)
    }

    fn volume_label(&mut self) -> Result<Option<String>> {
        FatImage::volume_label(self)
    }

    fn fs_type(&self) -> &str {
        self.geometry().fat_type.name()
    }

    fn total_size(&self) -> u64 {
        self.geometry().total_size()
    }

    fn used_size(&mut self) -> Result<u64> {
        self.used_bytes()
    }
}
