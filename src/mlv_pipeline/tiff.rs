//! TIFF sidecar module
//!
//! This module writes per-frame highlight maps as grayscale TIFF files.

mod standard_tiff_writer;
pub mod types;
mod writer;

pub use standard_tiff_writer::StandardTiffWriter;
pub use types::TiffCompression;
pub use writer::TiffWriter;
