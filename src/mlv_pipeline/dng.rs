//! DNG module
//!
//! Encodes a corrected raw frame as a single-image DNG with an optional RGB preview.

pub mod ifd;
pub mod preview;
pub mod tags;
mod writer;

pub use ifd::{Ifd, Value};
pub use preview::{MAX_PREVIEW_WIDTH, Preview, render_preview};
pub use writer::{DngWriter, StandardDngWriter};
