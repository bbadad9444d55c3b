//! Handle-based service boundary over opened recordings

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::mlv_pipeline::common::error::{MlvError, Result};
use crate::mlv_pipeline::conversions::{ConversionConfig, FrameCache, FrameOptions, MlvToDngPipeline};
use crate::mlv_pipeline::dng::StandardDngWriter;
use crate::mlv_pipeline::file::{FileAttributes, MlvFile};
use crate::mlv_pipeline::tiff::StandardTiffWriter;

/// Opaque handle of an opened recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileId(Uuid);

impl FileId {
    fn new() -> Self {
        FileId(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// One converted frame as returned to callers.
#[derive(Debug, Clone)]
pub struct FrameOutput {
    pub dng: Vec<u8>,
    /// Grayscale TIFF when [`FrameOptions::PRODUCE_HIGHLIGHT_MAP`] was set
    pub highlight_map: Option<Vec<u8>>,
    pub attributes: FileAttributes,
}

struct OpenFile {
    file: MlvFile,
    cache: FrameCache,
}

pub struct MlvProcessor {
    pipeline: MlvToDngPipeline<StandardDngWriter, StandardTiffWriter>,
    files: RwLock<HashMap<FileId, Arc<OpenFile>>>,
}

impl MlvProcessor {
    pub fn new(config: ConversionConfig) -> Result<Self> {
        Ok(Self {
            pipeline: MlvToDngPipeline::new(config)?,
            files: RwLock::new(HashMap::new()),
        })
    }

    fn insert(&self, file: MlvFile) -> Result<(FileId, FileAttributes)> {
        let attributes = file.attributes();
        let id = FileId::new();
        let entry = Arc::new(OpenFile {
            file,
            cache: FrameCache::new(),
        });
        self.files
            .write()
            .map_err(|_| MlvError::FileError("handle table lock poisoned".to_string()))?
            .insert(id, entry);
        Ok((id, attributes))
    }

    fn get(&self, id: FileId) -> Result<Arc<OpenFile>> {
        self.files
            .read()
            .map_err(|_| MlvError::FileError("handle table lock poisoned".to_string()))?
            .get(&id)
            .cloned()
            .ok_or_else(|| MlvError::InvalidArgument(format!("unknown file handle {id}")))
    }

    /// Opens and indexes a recording. A damaged recording still opens, with
    /// `attributes.valid` false.
    #[instrument(skip(self, path), fields(path = %path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(&self, path: P) -> Result<(FileId, FileAttributes)> {
        let file = MlvFile::open(path)?;
        let (id, attributes) = self.insert(file)?;
        info!(%id, frames = attributes.video_chunks, "Opened recording");
        Ok((id, attributes))
    }

    pub fn close(&self, id: FileId) -> Result<()> {
        self.files
            .write()
            .map_err(|_| MlvError::FileError("handle table lock poisoned".to_string()))?
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| MlvError::InvalidArgument(format!("unknown file handle {id}")))
    }

    pub fn attributes(&self, id: FileId) -> Result<FileAttributes> {
        Ok(self.get(id)?.file.attributes())
    }

    #[instrument(skip(self))]
    pub fn read_frame(&self, id: FileId, index: usize, options: FrameOptions) -> Result<FrameOutput> {
        let entry = self.get(id)?;
        let frame = self
            .pipeline
            .process_frame(&entry.file, index, options, &entry.cache)?;
        Ok(FrameOutput {
            dng: frame.dng,
            highlight_map: frame.highlight_map,
            attributes: entry.file.attributes(),
        })
    }

    pub fn produce_archive(&self, id: FileId) -> Result<Vec<u8>> {
        self.get(id)?.file.to_archive()
    }

    /// Restores a recording from [`MlvProcessor::produce_archive`] output under a new handle.
    #[instrument(skip_all, fields(bytes = bytes.len()))]
    pub fn open_archive(&self, bytes: &[u8]) -> Result<(FileId, FileAttributes)> {
        let file = MlvFile::from_archive(bytes)?;
        self.insert(file)
    }

    pub fn open_count(&self) -> usize {
        self.files.read().map_or(0, |files| files.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mlv_pipeline::common::error::ErrorKind;
    use crate::mlv_pipeline::container::test_support::MlvBuilder;
    use tempfile::TempDir;

    fn processor_with_file() -> (TempDir, MlvProcessor, FileId) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("A001.MLV");
        MlvBuilder::new(16, 16, 14)
            .video_frame(0, 3000)
            .video_frame(1, 3000)
            .write(&path)
            .unwrap();
        let processor = MlvProcessor::new(ConversionConfig::default()).unwrap();
        let (id, attributes) = processor.open(&path).unwrap();
        assert_eq!(attributes.video_chunks, 2);
        (dir, processor, id)
    }

    #[test]
    fn handles_are_independent() {
        let (_dir, processor, id) = processor_with_file();
        let archive = processor.produce_archive(id).unwrap();
        let (restored, attributes) = processor.open_archive(&archive).unwrap();
        assert_ne!(id, restored);
        assert_eq!(attributes.video_chunks, 2);
        assert_eq!(processor.open_count(), 2);

        processor.close(id).unwrap();
        assert!(processor.read_frame(restored, 0, FrameOptions::NONE).is_ok());
    }

    #[test]
    fn closed_handle_is_unknown() {
        let (_dir, processor, id) = processor_with_file();
        processor.close(id).unwrap();
        for err in [
            processor.close(id).unwrap_err(),
            processor.read_frame(id, 0, FrameOptions::NONE).unwrap_err(),
            processor.produce_archive(id).unwrap_err(),
        ] {
            assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        }
    }
}
