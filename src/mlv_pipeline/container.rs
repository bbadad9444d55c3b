//! MLV container module
//!
//! Chunk records, typed metadata payloads and the indexer that walks a (possibly spanned)
//! recording without touching pixel data.

pub mod chunk;
pub mod headers;
pub mod parser;
pub mod spanning;

#[cfg(test)]
#[path = "../../tests/common/builder.rs"]
pub(crate) mod test_support;

pub use chunk::{Chunk, ChunkTag, FrameInfo};
pub use headers::{
    ExposureHeader, FileFlags, FileHeader, HeaderChunk, Headers, IdentHeader, LensHeader,
    RawInfoHeader, RtcHeader, WavInfoHeader, WhiteBalanceHeader,
};
pub use parser::{ChunkIndex, Indexer, ScanOutcome};
pub use spanning::{file_set, sibling_path};
