//! MLV processing pipeline module
//!
//! This module reads Magic Lantern raw video recordings, corrects their frames and encodes
//! them as DNG files, with separate modules for the container, the raw frame corrections,
//! DNG and TIFF writing, and conversion orchestration.

pub mod codec;
pub mod common;
pub mod container;
pub mod conversions;
pub mod dng;
pub mod file;
pub mod pixel_map;
pub mod processor;
pub mod raw;
pub mod tiff;

pub use common::{
    ErrorKind,
    MlvError,
    Result,
};

pub use container::{
    Chunk,
    ChunkIndex,
    ChunkTag,
    Headers,
};

pub use raw::{
    BandingCoefficients,
    FocusPixelsType,
    FrameDecompressor,
    RawImage,
    RawInfo,
};

pub use pixel_map::{Pixel, PixelMap};

pub use file::{
    FileAttributes,
    FileState,
    MlvFile,
};

pub use dng::{
    DngWriter,
    StandardDngWriter,
};

pub use tiff::{
    StandardTiffWriter,
    TiffCompression,
    TiffWriter,
};

pub use conversions::{
    ConversionConfig,
    ConversionConfigBuilder,
    FrameCache,
    FrameOptions,
    MlvToDngPipeline,
    ProcessedFrame,
};

pub use processor::{
    FileId,
    FrameOutput,
    MlvProcessor,
};
