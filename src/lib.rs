//! Read-only inspection of FAT12/FAT16 disk images.
//!
//! Decodes the boot sector, walks cluster chains through the FAT, enumerates
//! directories and resolves paths to read file contents.

pub mod config;
pub mod error;
pub mod fs;

pub use config::ImageOptions;
pub use error::{FatError, Result};
pub use fs::{close_image, open_image, open_image_file, open_image_with, FatImage};
