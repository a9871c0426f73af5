pub mod boot_sector;
pub mod chain;
pub mod dir;
pub mod entry;
pub mod fat_table;
pub mod filesystem;
pub mod image;
pub mod path;
pub mod sector;

use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

pub use boot_sector::{parse_boot_sector, DiskGeometry, FatType};
pub use chain::ClusterChain;
pub use dir::{DirLocation, DirectoryIter};
pub use entry::{decode_entry, Attributes, DirectoryEntry, EntryKind, EntryOutcome};
pub use fat_table::ClusterLink;
pub use filesystem::Filesystem;
pub use image::FatImage;
pub use path::ResolvedTarget;

use crate::config::ImageOptions;
use crate::error::Result;

/// Open a FAT12/FAT16 image with default options.
pub fn open_image<R: Read + Seek>(reader: R) -> Result<FatImage<R>> {
    FatImage::open(reader)
}

pub fn open_image_with<R: Read + Seek>(reader: R, options: ImageOptions) -> Result<FatImage<R>> {
    FatImage::open_with(reader, options)
}

/// Open an image file on the host read-only.
pub fn open_image_file(path: impl AsRef<Path>, options: ImageOptions) -> Result<FatImage<File>> {
    let file = File::open(path)?;
    FatImage::open_with(file, options)
}

/// Open an image behind the browsing trait.
pub fn open_filesystem<R: Read + Seek + Send + 'static>(
    reader: R,
    options: ImageOptions,
) -> Result<Box<dyn Filesystem>> {
    Ok(Box::new(FatImage::open_with(reader, options)?))
}

/// Close an image, returning the underlying source.
pub fn close_image<R: Read + Seek>(image: FatImage<R>) -> R {
    image.close()
}
