//! Pipeline conversions module
//!
//! This module contains the per-frame correction pipeline and its configuration.

mod mlv_to_dng;
pub mod types;

pub use mlv_to_dng::{FrameCache, MlvToDngPipeline, ProcessedFrame};
pub use types::{ConversionConfig, ConversionConfigBuilder, FrameOptions};
