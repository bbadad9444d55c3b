//! Sequential chunk indexer
//!
//! Each file is walked chunk by chunk from offset 0. Payloads are skipped with a seek
//! except for metadata chunks, which are decoded once, and frame chunks, whose frame
//! header is read. A structurally broken chunk ends the walk of that file but keeps the
//! chunks seen before it.

use std::io::{self, Read, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::mlv_pipeline::container::chunk::{Chunk, ChunkTag, FrameInfo};
use crate::mlv_pipeline::container::headers::{FileHeader, HeaderChunk, Headers};

/// Outcome of walking one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Reached the end of the file on a chunk boundary.
    Complete(FileHeader),
    /// Stopped early; chunks before `offset` were kept.
    Truncated {
        header: Option<FileHeader>,
        offset: u64,
        reason: String,
    },
}

impl ScanOutcome {
    pub fn header(&self) -> Option<&FileHeader> {
        match self {
            ScanOutcome::Complete(h) => Some(h),
            ScanOutcome::Truncated { header, .. } => header.as_ref(),
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, ScanOutcome::Complete(_))
    }
}

/// Chunk index of a whole recording.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkIndex {
    /// Every chunk, in file then offset order.
    pub chunks: Vec<Chunk>,
    /// VIDF chunks by frame number, one per frame number.
    pub video: Vec<Chunk>,
    /// AUDF chunks by frame number, one per frame number.
    pub audio: Vec<Chunk>,
    pub headers: Headers,
    /// Frame numbers seen more than once; the first chunk was kept.
    pub duplicate_video_frames: Vec<u32>,
    pub duplicate_audio_frames: Vec<u32>,
    pub valid: bool,
}

/// Builds a [`ChunkIndex`] from one or more files.
#[derive(Debug)]
pub struct Indexer {
    chunks: Vec<Chunk>,
    headers: Headers,
    valid: bool,
}

impl Default for Indexer {
    fn default() -> Self {
        Self::new()
    }
}

impl Indexer {
    pub fn new() -> Self {
        Self {
            chunks: Vec::new(),
            headers: Headers::default(),
            valid: true,
        }
    }

    /// Marks the index invalid without scanning, e.g. for an unreadable sibling file.
    pub fn invalidate(&mut self, reason: &str) {
        warn!("Chunk index invalid: {}", reason);
        self.valid = false;
    }

    /// Walks one file of the set. Metadata from continuation files only fills gaps left by
    /// the main file.
    pub fn scan<R: Read + Seek>(&mut self, mut reader: R, slot: u16) -> ScanOutcome {
        let len = match reader.seek(SeekFrom::End(0)) {
            Ok(len) => len,
            Err(e) => return self.truncated(None, 0, format!("cannot size file: {e}")),
        };
        let mut offset = 0u64;
        let mut header: Option<FileHeader> = None;
        let mut count = 0usize;

        while offset < len {
            let (chunk, decoded) = match read_chunk(&mut reader, slot, offset, len) {
                Ok(read) => read,
                Err(reason) => return self.truncated(header, offset, reason),
            };
            if offset == 0 && chunk.tag != ChunkTag::FileHeader {
                return self.truncated(None, 0, format!("file starts with {} chunk", chunk.tag));
            }
            if let Some(decoded) = decoded {
                if let HeaderChunk::File(file_header) = &decoded {
                    if header.is_none() {
                        header = Some(file_header.clone());
                    }
                    if slot == 0 {
                        self.headers.absorb(decoded);
                    }
                } else {
                    self.headers.absorb(decoded);
                }
            }
            offset += chunk.size as u64;
            self.chunks.push(chunk);
            count += 1;
        }

        debug!("Indexed {} chunks in file slot {}", count, slot);
        match header {
            Some(h) => ScanOutcome::Complete(h),
            None => self.truncated(None, 0, "empty file".to_string()),
        }
    }

    fn truncated(&mut self, header: Option<FileHeader>, offset: u64, reason: String) -> ScanOutcome {
        warn!("Chunk index invalid at offset {}: {}", offset, reason);
        self.valid = false;
        ScanOutcome::Truncated {
            header,
            offset,
            reason,
        }
    }

    /// Orders frame chunks by frame number and drops duplicate frame numbers.
    pub fn finish(self) -> ChunkIndex {
        let (video, duplicate_video_frames) = frame_order(&self.chunks, ChunkTag::Video);
        let (audio, duplicate_audio_frames) = frame_order(&self.chunks, ChunkTag::Audio);
        if !duplicate_video_frames.is_empty() {
            warn!("Duplicate video frame numbers: {:?}", duplicate_video_frames);
        }
        ChunkIndex {
            chunks: self.chunks,
            video,
            audio,
            headers: self.headers,
            duplicate_video_frames,
            duplicate_audio_frames,
            valid: self.valid,
        }
    }
}

fn frame_order(chunks: &[Chunk], tag: ChunkTag) -> (Vec<Chunk>, Vec<u32>) {
    let mut frames: Vec<Chunk> = chunks.iter().filter(|c| c.tag == tag).cloned().collect();
    // stable, so the physically first chunk of a frame number stays first
    frames.sort_by_key(|c| c.frame_number().unwrap_or(0));
    let mut duplicates = Vec::new();
    let mut kept: Vec<Chunk> = Vec::with_capacity(frames.len());
    for chunk in frames {
        match kept.last() {
            Some(last) if last.frame_number() == chunk.frame_number() => {
                duplicates.push(chunk.frame_number().unwrap_or(0));
            }
            _ => kept.push(chunk),
        }
    }
    (kept, duplicates)
}

fn read_chunk<R: Read + Seek>(
    reader: &mut R,
    slot: u16,
    offset: u64,
    len: u64,
) -> Result<(Chunk, Option<HeaderChunk>), String> {
    let remaining = len - offset;
    if remaining < 8 {
        return Err(format!("{remaining} trailing bytes"));
    }
    let io = |e: io::Error| format!("read failed: {e}");
    reader.seek(SeekFrom::Start(offset)).map_err(io)?;
    let mut tag = [0u8; 4];
    reader.read_exact(&mut tag).map_err(io)?;
    let size = reader.read_u32::<LittleEndian>().map_err(io)?;
    let tag = ChunkTag::from(tag);

    if size < tag.min_size() {
        return Err(format!("{tag} chunk declares {size} bytes, needs {}", tag.min_size()));
    }
    if size as u64 > remaining {
        return Err(format!("{tag} chunk of {size} bytes exceeds the {remaining} remaining"));
    }
    let timestamp = if tag.header_len() == 16 {
        Some(reader.read_u64::<LittleEndian>().map_err(io)?)
    } else {
        None
    };

    let frame = match tag {
        ChunkTag::Video => Some(FrameInfo {
            frame_number: reader.read_u32::<LittleEndian>().map_err(io)?,
            crop_x: reader.read_u16::<LittleEndian>().map_err(io)?,
            crop_y: reader.read_u16::<LittleEndian>().map_err(io)?,
            pan_x: reader.read_u16::<LittleEndian>().map_err(io)?,
            pan_y: reader.read_u16::<LittleEndian>().map_err(io)?,
            frame_space: reader.read_u32::<LittleEndian>().map_err(io)?,
        }),
        ChunkTag::Audio => Some(FrameInfo {
            frame_number: reader.read_u32::<LittleEndian>().map_err(io)?,
            frame_space: reader.read_u32::<LittleEndian>().map_err(io)?,
            ..FrameInfo::default()
        }),
        _ => None,
    };
    let chunk = Chunk {
        tag,
        size,
        timestamp,
        slot,
        offset,
        frame,
    };
    if chunk.data_offset() > offset + size as u64 {
        return Err(format!("{tag} frame space exceeds the chunk"));
    }

    let decoded = if tag.is_metadata() {
        let mut payload = vec![0u8; (size - tag.header_len()) as usize];
        reader.read_exact(&mut payload).map_err(io)?;
        match HeaderChunk::decode(tag, &payload) {
            Ok(decoded) => decoded,
            Err(e) => return Err(format!("{tag} payload: {e}")),
        }
    } else {
        None
    };
    Ok((chunk, decoded))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mlv_pipeline::container::test_support::MlvBuilder;
    use std::io::Cursor;

    fn index(bytes: Vec<u8>) -> (ChunkIndex, ScanOutcome) {
        let mut indexer = Indexer::new();
        let outcome = indexer.scan(Cursor::new(bytes), 0);
        (indexer.finish(), outcome)
    }

    #[test]
    fn well_formed_file_indexes_every_frame() {
        let mut builder = MlvBuilder::new(16, 16, 14);
        for n in 0..5 {
            builder.video_frame(n, 2048);
        }
        builder.audio_frame(0, 64).audio_frame(1, 64);
        let (index, outcome) = index(builder.build());

        assert!(outcome.is_complete());
        assert!(index.valid);
        assert_eq!(index.video.len(), 5);
        assert_eq!(index.audio.len(), 2);
        assert!(index.headers.raw_info.is_some());
        assert_eq!(index.headers.file.as_ref().unwrap().file_count, 1);
    }

    #[test]
    fn truncated_tail_keeps_prefix() {
        let mut builder = MlvBuilder::new(16, 16, 14);
        for n in 0..4 {
            builder.video_frame(n, 2048);
        }
        let mut bytes = builder.build();
        bytes.truncate(bytes.len() - 10);
        let (index, outcome) = index(bytes);

        assert!(!outcome.is_complete());
        assert!(!index.valid);
        assert_eq!(index.video.len(), 3);
    }

    #[test]
    fn frames_are_ordered_by_number() {
        let mut builder = MlvBuilder::new(16, 16, 14);
        for n in [2, 0, 3, 1, 1] {
            builder.video_frame(n, 2048 + n as u16);
        }
        let (index, _) = index(builder.build());
        let numbers: Vec<u32> = index.video.iter().filter_map(|c| c.frame_number()).collect();
        assert_eq!(numbers, vec![0, 1, 2, 3]);
        assert_eq!(index.duplicate_video_frames, vec![1]);
        let last = index.chunks.iter().rev().find(|c| c.tag == ChunkTag::Video).unwrap();
        assert_eq!(last.frame_number(), Some(1));
        assert!(index.video[1].offset < last.offset);
    }

    #[test]
    fn unknown_tags_are_retained() {
        let mut builder = MlvBuilder::new(16, 16, 14);
        builder.raw_chunk(*b"XTRA", &[9; 12]).video_frame(0, 2048);
        let (index, outcome) = index(builder.build());
        assert!(outcome.is_complete());
        assert!(index.chunks.iter().any(|c| c.tag == ChunkTag::Unknown(*b"XTRA")));
        assert_eq!(index.video.len(), 1);
    }

    #[test]
    fn file_must_start_with_file_header() {
        let mut builder = MlvBuilder::new(16, 16, 14);
        builder.video_frame(0, 2048);
        let bytes = builder.build();
        // drop the MLVI chunk (52 bytes)
        let (index, outcome) = index(bytes[52..].to_vec());
        assert!(!outcome.is_complete());
        assert!(!index.valid);
        assert!(index.chunks.is_empty());
    }

    #[test]
    fn undersized_chunk_invalidates() {
        let mut builder = MlvBuilder::new(16, 16, 14);
        builder.video_frame(0, 2048);
        let mut bytes = builder.build();
        let vidf = bytes.windows(4).position(|w| w == b"VIDF").unwrap();
        bytes[vidf + 4..vidf + 8].copy_from_slice(&20u32.to_le_bytes());
        let (index, _) = index(bytes);
        assert!(!index.valid);
        assert!(index.video.is_empty());
        assert!(index.headers.raw_info.is_some());
    }
}
