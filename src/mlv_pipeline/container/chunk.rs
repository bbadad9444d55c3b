//! Chunk records of the MLV container

use std::fmt;

use serde::{Deserialize, Serialize};

/// Header length of the file header chunk, which carries no timestamp.
pub const FILE_HEADER_LEN: u32 = 8;
/// Declared size of a file header chunk.
pub const FILE_HEADER_SIZE: u32 = 52;
/// Header length of every other chunk: tag, size and a 64-bit timestamp.
pub const CHUNK_HEADER_LEN: u32 = 16;
/// VIDF header including frame number, crop, pan and frame space.
pub const VIDEO_HEADER_LEN: u32 = 32;
/// AUDF header including frame number and frame space.
pub const AUDIO_HEADER_LEN: u32 = 24;

/// Four-character chunk type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[u8; 4]", into = "[u8; 4]")]
pub enum ChunkTag {
    FileHeader,
    Video,
    Audio,
    Lens,
    Info,
    ElectronicLevel,
    Style,
    WhiteBalance,
    Identification,
    RealTimeClock,
    Marker,
    Exposure,
    RawInfo,
    RawCapture,
    WavInfo,
    Null,
    Backup,
    Unknown([u8; 4]),
}

const REGISTRY: [(ChunkTag, &[u8; 4]); 17] = [
    (ChunkTag::FileHeader, b"MLVI"),
    (ChunkTag::Video, b"VIDF"),
    (ChunkTag::Audio, b"AUDF"),
    (ChunkTag::Lens, b"LENS"),
    (ChunkTag::Info, b"INFO"),
    (ChunkTag::ElectronicLevel, b"ELVL"),
    (ChunkTag::Style, b"STYL"),
    (ChunkTag::WhiteBalance, b"WBAL"),
    (ChunkTag::Identification, b"IDNT"),
    (ChunkTag::RealTimeClock, b"RTCI"),
    (ChunkTag::Marker, b"MARK"),
    (ChunkTag::Exposure, b"EXPO"),
    (ChunkTag::RawInfo, b"RAWI"),
    (ChunkTag::RawCapture, b"RAWC"),
    (ChunkTag::WavInfo, b"WAVI"),
    (ChunkTag::Null, b"NULL"),
    (ChunkTag::Backup, b"BKUP"),
];

impl ChunkTag {
    pub fn bytes(self) -> [u8; 4] {
        match self {
            ChunkTag::Unknown(bytes) => bytes,
            known => REGISTRY
                .iter()
                .find(|(tag, _)| *tag == known)
                .map(|(_, bytes)| **bytes)
                .unwrap_or(*b"????"),
        }
    }

    /// Bytes before the payload.
    pub fn header_len(self) -> u32 {
        match self {
            ChunkTag::FileHeader => FILE_HEADER_LEN,
            _ => CHUNK_HEADER_LEN,
        }
    }

    /// Smallest legal declared size: header plus the fixed part of the payload.
    pub fn min_size(self) -> u32 {
        let payload = match self {
            ChunkTag::FileHeader => FILE_HEADER_SIZE - FILE_HEADER_LEN,
            ChunkTag::Video => VIDEO_HEADER_LEN - CHUNK_HEADER_LEN,
            ChunkTag::Audio => AUDIO_HEADER_LEN - CHUNK_HEADER_LEN,
            ChunkTag::RawInfo => 164,
            ChunkTag::RawCapture => 16,
            ChunkTag::Lens => 80,
            ChunkTag::Exposure => 24,
            ChunkTag::Identification => 68,
            ChunkTag::WhiteBalance => 28,
            ChunkTag::WavInfo => 16,
            ChunkTag::RealTimeClock => 28,
            ChunkTag::Style => 36,
            ChunkTag::ElectronicLevel => 8,
            ChunkTag::Marker => 4,
            ChunkTag::Info | ChunkTag::Null | ChunkTag::Backup | ChunkTag::Unknown(_) => 0,
        };
        self.header_len() + payload
    }

    /// Chunks decoded into [`crate::mlv_pipeline::container::HeaderChunk`].
    pub fn is_metadata(self) -> bool {
        !matches!(
            self,
            ChunkTag::Video
                | ChunkTag::Audio
                | ChunkTag::Null
                | ChunkTag::Backup
                | ChunkTag::Unknown(_)
        )
    }
}

impl From<[u8; 4]> for ChunkTag {
    fn from(bytes: [u8; 4]) -> Self {
        REGISTRY
            .iter()
            .find(|(_, b)| **b == bytes)
            .map(|(tag, _)| *tag)
            .unwrap_or(ChunkTag::Unknown(bytes))
    }
}

impl From<ChunkTag> for [u8; 4] {
    fn from(tag: ChunkTag) -> Self {
        tag.bytes()
    }
}

impl fmt::Display for ChunkTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.bytes();
        for b in bytes {
            let c = if b.is_ascii_graphic() { b as char } else { '.' };
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

/// Frame-chunk fields that follow the common header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FrameInfo {
    pub frame_number: u32,
    pub crop_x: u16,
    pub crop_y: u16,
    pub pan_x: u16,
    pub pan_y: u16,
    /// Padding between the frame header and the payload.
    pub frame_space: u32,
}

/// One indexed chunk. Identity is `(slot, offset)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub tag: ChunkTag,
    /// Declared size including the header.
    pub size: u32,
    /// Microseconds since the start of the recording.
    pub timestamp: Option<u64>,
    /// Index of the file in the spanned set (0 = main file).
    pub slot: u16,
    pub offset: u64,
    pub frame: Option<FrameInfo>,
}

impl Chunk {
    pub fn header_len(&self) -> u32 {
        self.tag.header_len()
    }

    pub fn frame_number(&self) -> Option<u32> {
        self.frame.map(|f| f.frame_number)
    }

    /// Seconds since the start of the recording.
    pub fn time(&self) -> Option<f64> {
        self.timestamp.map(|t| t as f64 / 1_000_000.0)
    }

    fn fixed_len(&self) -> u32 {
        match self.tag {
            ChunkTag::Video => VIDEO_HEADER_LEN,
            ChunkTag::Audio => AUDIO_HEADER_LEN,
            _ => self.header_len(),
        }
    }

    /// File offset of the payload proper, after any frame space.
    pub fn data_offset(&self) -> u64 {
        let space = self.frame.map_or(0, |f| f.frame_space);
        self.offset + self.fixed_len() as u64 + space as u64
    }

    /// Payload length after any frame space.
    pub fn data_len(&self) -> u64 {
        let space = self.frame.map_or(0, |f| f.frame_space) as u64;
        (self.size as u64).saturating_sub(self.fixed_len() as u64 + space)
    }
}
