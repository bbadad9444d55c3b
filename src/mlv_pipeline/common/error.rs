use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MlvError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("File error: {0}")]
    FileError(String),

    #[error("Failed to allocate {0} bytes")]
    MemoryError(usize),

    #[error("Failed to decompress frame: {0}")]
    CompressionError(String),

    #[error("Missing metadata: {0}")]
    MissingMetadata(String),

    #[error("Failed to encode TIFF image: {0}")]
    EncodeError(String),

    #[error("Archive error: {0}")]
    Archive(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Coarse error classification exposed at the service boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    InvalidArgument,
    FileError,
    MemoryError,
    CompressionError,
    MissingMetadata,
}

impl ErrorKind {
    /// Numeric code as reported to out-of-process callers.
    pub fn code(self) -> i32 {
        match self {
            ErrorKind::InvalidArgument => 1,
            ErrorKind::FileError => 3,
            ErrorKind::MemoryError => 4,
            ErrorKind::CompressionError => 5,
            ErrorKind::MissingMetadata => 6,
        }
    }
}

impl MlvError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MlvError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            MlvError::FileError(_)
            | MlvError::IoError(_)
            | MlvError::Archive(_)
            | MlvError::EncodeError(_) => ErrorKind::FileError,
            MlvError::MemoryError(_) => ErrorKind::MemoryError,
            MlvError::CompressionError(_) => ErrorKind::CompressionError,
            MlvError::MissingMetadata(_) => ErrorKind::MissingMetadata,
        }
    }
}

pub type Result<T> = std::result::Result<T, MlvError>;

/// Allocates a zeroed buffer, reporting allocation failure instead of aborting.
pub(crate) fn alloc_buffer(len: usize) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|_| MlvError::MemoryError(len))?;
    buffer.resize(len, 0);
    Ok(buffer)
}
