//! Archived form of an indexed recording
//!
//! The archive stores file locations, the chunk index and decoded headers as JSON so a
//! recording can be reopened without walking its chunks again. Pixel data is never part
//! of it.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::mlv_pipeline::common::error::{MlvError, Result};
use crate::mlv_pipeline::container::parser::ChunkIndex;
use crate::mlv_pipeline::file::aggregate::{FileState, MlvFile};

const ARCHIVE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct FileArchive {
    version: u32,
    path: PathBuf,
    paths: Vec<PathBuf>,
    state: FileState,
    file_size: u64,
    index: ChunkIndex,
}

impl MlvFile {
    pub fn to_archive(&self) -> Result<Vec<u8>> {
        if matches!(self.state(), FileState::Unopened | FileState::Indexing) {
            return Err(MlvError::InvalidArgument(
                "recording has not been indexed".to_string(),
            ));
        }
        let archive = FileArchive {
            version: ARCHIVE_VERSION,
            path: self.path().to_path_buf(),
            paths: self.paths().to_vec(),
            state: self.state(),
            file_size: self.file_size(),
            index: self.index_ref().clone(),
        };
        Ok(serde_json::to_vec(&archive)?)
    }

    /// Restores an archived recording and reopens its files.
    ///
    /// Files that no longer exist leave the aggregate [`FileState::Missing`] so its
    /// attributes stay available; reading frames again needs a fresh [`MlvFile::open`].
    /// Files with a different guid are an error.
    pub fn from_archive(bytes: &[u8]) -> Result<MlvFile> {
        let archive: FileArchive = serde_json::from_slice(bytes)?;
        if archive.version != ARCHIVE_VERSION {
            return Err(MlvError::FileError(format!(
                "unsupported archive version {}",
                archive.version
            )));
        }
        let mut file = MlvFile::from_parts(
            archive.path,
            archive.paths,
            archive.state,
            archive.index,
            archive.file_size,
        );
        file.attach()?;
        debug!("Restored {} from archive", file.path().display());
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mlv_pipeline::common::error::ErrorKind;

    #[test]
    fn unindexed_file_cannot_be_archived() {
        let err = MlvFile::new("x.MLV").to_archive().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn garbage_is_rejected() {
        let err = MlvFile::from_archive(b"{not json").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FileError);
    }
}
