//! Raw frame module
//!
//! This module holds the frame type, its geometry descriptor and every correction and
//! transform that runs on a frame.

mod convert;
mod corrections;
mod focus_pixels;
pub mod image;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use convert::{FrameDecompressor, UnsupportedDecompressor};
pub use corrections::{BANDING_PERIOD, BandingCoefficients, DEFECT_FLOOR};
pub use focus_pixels::{FocusPixelTables, FocusPixelsType, parse_fpm};
pub use image::{HIGHLIGHT_MARK, RawImage};
pub use types::{CFA_PATTERN_RGGB, CaptureMetadata, RawInfo};
