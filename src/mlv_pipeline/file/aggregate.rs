//! One logical recording, possibly spread over several files

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::mlv_pipeline::common::error::{MlvError, Result, alloc_buffer};
use crate::mlv_pipeline::container::chunk::{Chunk, ChunkTag, FILE_HEADER_LEN, FILE_HEADER_SIZE};
use crate::mlv_pipeline::container::headers::{FileHeader, HeaderChunk, Headers};
use crate::mlv_pipeline::container::parser::{ChunkIndex, Indexer};
use crate::mlv_pipeline::container::spanning::file_set;
use crate::mlv_pipeline::file::attributes::{FrameGap, frame_gaps};
use crate::mlv_pipeline::file::metadata::capture_metadata;
use crate::mlv_pipeline::raw::image::RawImage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileState {
    Unopened,
    Indexing,
    /// Every file of the set was indexed to its end.
    Valid,
    /// Indexing stopped early; the chunks before the fault are usable.
    Invalid,
    /// The files could not be found after a relocation.
    Missing,
}

/// Reads and decodes the MLVI chunk at the start of `path`.
pub(crate) fn read_file_header(path: &Path) -> Result<FileHeader> {
    let mut file = File::open(path)
        .map_err(|e| MlvError::FileError(format!("failed to open {}: {e}", path.display())))?;
    let mut bytes = [0u8; FILE_HEADER_SIZE as usize];
    file.read_exact(&mut bytes)
        .map_err(|e| MlvError::FileError(format!("{}: no file header: {e}", path.display())))?;
    if &bytes[..4] != b"MLVI" {
        return Err(MlvError::FileError(format!(
            "{} is not an MLV file",
            path.display()
        )));
    }
    match HeaderChunk::decode(ChunkTag::FileHeader, &bytes[FILE_HEADER_LEN as usize..]) {
        Ok(Some(HeaderChunk::File(header))) => Ok(header),
        _ => Err(MlvError::FileError(format!(
            "{}: malformed file header",
            path.display()
        ))),
    }
}

/// An MLV recording: chunk index, cached metadata and one open handle per file.
///
/// Indexing and relocation take `&mut self`; frame reads take `&self` and only lock the
/// handle of the file that holds the chunk.
#[derive(Debug)]
pub struct MlvFile {
    path: PathBuf,
    paths: Vec<PathBuf>,
    handles: Vec<Mutex<File>>,
    state: FileState,
    index: ChunkIndex,
    file_size: u64,
}

impl MlvFile {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            paths: Vec::new(),
            handles: Vec::new(),
            state: FileState::Unopened,
            index: ChunkIndex::default(),
            file_size: 0,
        }
    }

    /// Opens and indexes a recording. Fails only when the main file cannot be opened; a
    /// damaged recording comes back in the [`FileState::Invalid`] state.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = Self::new(path);
        file.index()?;
        Ok(file)
    }

    pub(crate) fn from_parts(
        path: PathBuf,
        paths: Vec<PathBuf>,
        state: FileState,
        index: ChunkIndex,
        file_size: u64,
    ) -> Self {
        Self {
            path,
            paths,
            handles: Vec::new(),
            state,
            index,
            file_size,
        }
    }

    /// Builds the chunk index of the main file and every continuation file it declares.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn index(&mut self) -> Result<()> {
        self.state = FileState::Indexing;
        let main = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) => {
                self.state = FileState::Invalid;
                return Err(MlvError::FileError(format!(
                    "failed to open {}: {e}",
                    self.path.display()
                )));
            }
        };

        let mut indexer = Indexer::new();
        let outcome = indexer.scan(&main, 0);
        let mut handles = vec![Mutex::new(main)];
        let mut paths = vec![self.path.clone()];

        if let Some(header) = outcome.header().cloned() {
            for (slot, path) in file_set(&self.path, header.file_count)
                .into_iter()
                .enumerate()
                .skip(1)
            {
                match Self::open_sibling(&path, header.guid) {
                    Ok(file) => {
                        indexer.scan(&file, slot as u16);
                        handles.push(Mutex::new(file));
                        paths.push(path);
                    }
                    Err(e) => {
                        indexer.invalidate(&e.to_string());
                        break;
                    }
                }
            }
        }

        self.file_size = handles
            .iter()
            .filter_map(|h| h.lock().ok().and_then(|f| f.metadata().ok()))
            .map(|m| m.len())
            .sum();
        self.index = indexer.finish();
        self.handles = handles;
        self.paths = paths;
        self.state = if self.index.valid {
            FileState::Valid
        } else {
            FileState::Invalid
        };
        info!(
            video = self.index.video.len(),
            audio = self.index.audio.len(),
            files = self.paths.len(),
            state = ?self.state,
            "Indexed recording"
        );
        Ok(())
    }

    fn open_sibling(path: &Path, guid: u64) -> Result<File> {
        let header = read_file_header(path)?;
        if header.guid != guid {
            return Err(MlvError::FileError(format!(
                "{} belongs to another recording (guid {:#x})",
                path.display(),
                header.guid
            )));
        }
        File::open(path)
            .map_err(|e| MlvError::FileError(format!("failed to open {}: {e}", path.display())))
    }

    /// Points the aggregate at a moved copy of the same recording without re-indexing.
    ///
    /// Every file of the new set must carry the cached guid. On failure the aggregate is
    /// [`FileState::Missing`] and keeps no handles. `Missing` is final: a missing recording
    /// has to be opened again with [`MlvFile::open`].
    #[instrument(skip(self, new_path))]
    pub fn rebind<P: AsRef<Path>>(&mut self, new_path: P) -> Result<()> {
        let new_path = new_path.as_ref();
        if self.state == FileState::Missing {
            return Err(MlvError::InvalidArgument(format!(
                "{} is missing; reopen it instead of relocating",
                self.path.display()
            )));
        }
        let Some(main) = self.index.headers.file.clone() else {
            return Err(MlvError::InvalidArgument(
                "cannot relocate a recording that was never indexed".to_string(),
            ));
        };
        let paths = file_set(new_path, main.file_count);
        let mut handles = Vec::with_capacity(paths.len());
        for path in paths.iter().take(self.paths.len().max(1)) {
            match Self::open_sibling(path, main.guid) {
                Ok(file) => handles.push(Mutex::new(file)),
                Err(e) => {
                    warn!("Relocation to {} failed: {}", new_path.display(), e);
                    self.handles.clear();
                    self.state = FileState::Missing;
                    return Err(e);
                }
            }
        }

        debug!("Relocated {} -> {}", self.path.display(), new_path.display());
        self.path = new_path.to_path_buf();
        self.paths = paths.into_iter().take(handles.len()).collect();
        self.handles = handles;
        self.state = if self.index.valid {
            FileState::Valid
        } else {
            FileState::Invalid
        };
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn state(&self) -> FileState {
        self.state
    }

    pub fn is_valid(&self) -> bool {
        self.state == FileState::Valid
    }

    pub fn is_missing(&self) -> bool {
        self.state == FileState::Missing
    }

    pub fn headers(&self) -> &Headers {
        &self.index.headers
    }

    pub fn index_ref(&self) -> &ChunkIndex {
        &self.index
    }

    /// Every chunk in file then offset order.
    pub fn chunks(&self) -> &[Chunk] {
        &self.index.chunks
    }

    pub fn video_chunks(&self) -> &[Chunk] {
        &self.index.video
    }

    pub fn audio_chunks(&self) -> &[Chunk] {
        &self.index.audio
    }

    /// Bytes over every file of the set.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Nominal seconds per frame.
    pub fn frame_time(&self) -> f64 {
        self.index.headers.file.as_ref().map_or(0.0, |f| f.frame_time())
    }

    /// Highest frame number times the nominal frame time.
    pub fn duration(&self) -> f64 {
        self.index
            .video
            .last()
            .and_then(Chunk::frame_number)
            .map_or(0.0, |n| n as f64 * self.frame_time())
    }

    /// Timestamp of the first video frame in seconds.
    pub fn first_time(&self) -> Option<f64> {
        self.index.video.iter().filter_map(Chunk::time).reduce(f64::min)
    }

    pub fn frame_gaps(&self) -> Vec<FrameGap> {
        frame_gaps(self.index.video.iter().filter_map(Chunk::frame_number))
    }

    fn read_payload(&self, chunk: &Chunk) -> Result<Vec<u8>> {
        if self.state == FileState::Missing {
            return Err(MlvError::FileError(format!(
                "{} is missing",
                self.path.display()
            )));
        }
        let handle = self.handles.get(chunk.slot as usize).ok_or_else(|| {
            MlvError::FileError(format!("no open file for slot {}", chunk.slot))
        })?;
        let len = usize::try_from(chunk.data_len())
            .map_err(|_| MlvError::MemoryError(usize::MAX))?;
        let mut data = alloc_buffer(len)?;
        let mut file = handle
            .lock()
            .map_err(|_| MlvError::FileError("file handle lock poisoned".to_string()))?;
        file.seek(SeekFrom::Start(chunk.data_offset()))?;
        file.read_exact(&mut data)?;
        Ok(data)
    }

    /// Materializes a video frame stamped with the recording's geometry and metadata.
    pub fn read_video_frame(&self, chunk: &Chunk) -> Result<RawImage> {
        if chunk.tag != ChunkTag::Video {
            return Err(MlvError::InvalidArgument(format!("{} is not a video chunk", chunk.tag)));
        }
        let rawi = self.index.headers.raw_info.as_ref().ok_or_else(|| {
            MlvError::MissingMetadata("recording has no RAWI chunk".to_string())
        })?;
        let compressed = self
            .index
            .headers
            .file
            .as_ref()
            .is_some_and(FileHeader::is_compressed);
        let data = self.read_payload(chunk)?;
        let image = RawImage::new(rawi.frame_info(), data, compressed)?;
        Ok(image.with_metadata(capture_metadata(&self.index.headers)))
    }

    /// Video frame at position `index` of the frame-ordered index.
    pub fn read_video_frame_at(&self, index: usize) -> Result<RawImage> {
        let chunk = self.index.video.get(index).ok_or_else(|| {
            MlvError::InvalidArgument(format!(
                "frame {index} out of range ({} frames)",
                self.index.video.len()
            ))
        })?;
        self.read_video_frame(chunk)
    }

    /// Raw audio bytes of one AUDF chunk.
    pub fn read_audio_frame(&self, chunk: &Chunk) -> Result<Vec<u8>> {
        if chunk.tag != ChunkTag::Audio {
            return Err(MlvError::InvalidArgument(format!("{} is not an audio chunk", chunk.tag)));
        }
        self.read_payload(chunk)
    }

    /// Reopens the handles of an aggregate restored from an archive.
    pub(crate) fn attach(&mut self) -> Result<()> {
        let Some(main) = self.index.headers.file.clone() else {
            return Err(MlvError::FileError("archive has no file header".to_string()));
        };
        let mut handles = Vec::with_capacity(self.paths.len());
        for path in &self.paths {
            match read_file_header(path) {
                Ok(header) if header.guid != main.guid => {
                    return Err(MlvError::FileError(format!(
                        "{} does not match the archived recording",
                        path.display()
                    )));
                }
                Ok(_) => handles.push(Mutex::new(File::open(path)?)),
                Err(e) => {
                    warn!("Archived recording unreachable: {}", e);
                    self.state = FileState::Missing;
                    return Ok(());
                }
            }
        }
        self.handles = handles;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mlv_pipeline::common::error::ErrorKind;
    use crate::mlv_pipeline::container::test_support::MlvBuilder;
    use tempfile::TempDir;

    #[test]
    fn new_file_is_unopened() {
        let file = MlvFile::new("nowhere.MLV");
        assert_eq!(file.state(), FileState::Unopened);
        assert!(file.video_chunks().is_empty());
    }

    #[test]
    fn missing_main_file_is_a_file_error() {
        let err = MlvFile::open("/definitely/not/here.MLV").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FileError);
    }

    #[test]
    fn frame_space_is_skipped_on_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("space.MLV");
        let mut builder = MlvBuilder::new(16, 2, 14);
        builder.frame_space(24).video_frame(0, 4000);
        builder.write(&path).unwrap();

        let file = MlvFile::open(&path).unwrap();
        assert!(file.is_valid());
        let image = file.read_video_frame_at(0).unwrap();
        assert!(image.samples().unwrap().iter().all(|&v| v == 4000));
        assert_eq!(image.metadata.iso, 800);
    }

    #[test]
    fn out_of_range_frame_is_invalid_argument() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("one.MLV");
        MlvBuilder::new(16, 2, 14).video_frame(0, 2048).write(&path).unwrap();
        let file = MlvFile::open(&path).unwrap();
        let err = file.read_video_frame_at(1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn audio_payload_is_copied() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audio.MLV");
        MlvBuilder::new(16, 2, 14).audio_frame(0, 32).write(&path).unwrap();
        let file = MlvFile::open(&path).unwrap();
        let data = file.read_audio_frame(&file.audio_chunks()[0]).unwrap();
        assert_eq!(data, (0..32u8).collect::<Vec<_>>());
        let err = file.read_video_frame(&file.audio_chunks()[0]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}
