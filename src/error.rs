use thiserror::Error;

#[derive(Error, Debug)]
pub enum FatError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid FAT volume: {0}")]
    Validation(String),

    #[error("Unsupported geometry: {0}")]
    UnsupportedGeometry(String),

    #[error("Corrupt cluster chain at cluster {cluster}: {reason}")]
    CorruptChain { cluster: u32, reason: String },

    #[error("Malformed directory record: expected 32 bytes, got {len}")]
    MalformedRecord { len: usize },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Is a directory: {0}")]
    IsADirectory(String),

    /// Reserved for callers layering unsupported operations (formatting,
    /// writing) over this crate. No read path in the crate returns it.
    #[error("Not implemented: {0}")]
    NotImplemented(&'static str),
}

impl FatError {
    pub(crate) fn corrupt_chain(cluster: u32, reason: impl Into<String>) -> Self {
        FatError::CorruptChain {
            cluster,
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = FatError> = std::result::Result<T, E>;
