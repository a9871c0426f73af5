use serde::{Deserialize, Serialize};

/// Options controlling how an image is opened.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageOptions {
    /// Byte offset of the FAT volume within the image (0 for a bare floppy image).
    pub partition_offset: u64,
    /// Reject boot sectors that lack the 0x55AA signature at offset 510.
    pub require_boot_signature: bool,
    /// Upper bound on the number of bytes returned by `read_file_bytes`.
    pub max_file_bytes: Option<u64>,
}

impl ImageOptions {
    pub fn with_partition_offset(mut self, offset: u64) -> Self {
        self.partition_offset = offset;
        self
    }
}
