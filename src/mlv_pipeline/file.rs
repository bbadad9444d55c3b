//! Recording module
//!
//! The file aggregate ties the chunk index of a recording to its open files and turns
//! frame chunks into raw images.

pub mod aggregate;
mod archive;
pub mod attributes;
pub mod metadata;

pub use aggregate::{FileState, MlvFile};
pub use attributes::{FileAttributes, FrameGap, ImageSize};
pub use metadata::capture_metadata;
