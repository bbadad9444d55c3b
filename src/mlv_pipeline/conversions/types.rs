//! Frame conversion configuration types

use std::fmt;
use std::ops::BitOr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::mlv_pipeline::common::error::{MlvError, Result};
use crate::mlv_pipeline::tiff::types::TiffCompression;

/// Per-frame processing steps, applied in a fixed order regardless of bit order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct FrameOptions(u32);

impl FrameOptions {
    pub const NONE: FrameOptions = FrameOptions(0);
    pub const FIX_FOCUS_PIXELS: FrameOptions = FrameOptions(1);
    pub const FIX_DEAD_PIXELS: FrameOptions = FrameOptions(2);
    pub const FIX_VERTICAL_BANDING: FrameOptions = FrameOptions(4);
    pub const CONVERT_TO_14_BIT: FrameOptions = FrameOptions(8);
    pub const PRODUCE_HIGHLIGHT_MAP: FrameOptions = FrameOptions(16);

    const ALL: u32 = 0x1f;

    /// Rejects any bit outside the known set.
    pub fn from_bits(bits: u32) -> Result<Self> {
        if bits & !Self::ALL != 0 {
            return Err(MlvError::InvalidArgument(format!(
                "unknown frame option bits {:#x}",
                bits & !Self::ALL
            )));
        }
        Ok(FrameOptions(bits))
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: FrameOptions) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for FrameOptions {
    type Output = FrameOptions;

    fn bitor(self, rhs: FrameOptions) -> FrameOptions {
        FrameOptions(self.0 | rhs.0)
    }
}

impl TryFrom<u32> for FrameOptions {
    type Error = MlvError;

    fn try_from(bits: u32) -> Result<Self> {
        FrameOptions::from_bits(bits)
    }
}

impl From<FrameOptions> for u32 {
    fn from(options: FrameOptions) -> u32 {
        options.0
    }
}

impl fmt::Display for FrameOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(FrameOptions, &str); 5] = [
            (FrameOptions::FIX_FOCUS_PIXELS, "focus"),
            (FrameOptions::FIX_DEAD_PIXELS, "dead"),
            (FrameOptions::FIX_VERTICAL_BANDING, "banding"),
            (FrameOptions::CONVERT_TO_14_BIT, "14bit"),
            (FrameOptions::PRODUCE_HIGHLIGHT_MAP, "highlights"),
        ];
        let names: Vec<&str> = NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        if names.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", names.join("|"))
        }
    }
}

/// Configuration for MLV frame to DNG conversion
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionConfig {
    /// Correction steps applied to every frame
    pub options: FrameOptions,
    /// Whether to embed an RGB preview in IFD0
    pub preview: bool,
    /// Compression of the highlight-map sidecar
    pub highlight_compression: TiffCompression,
    /// Predictor for the sidecar (2 for horizontal differencing)
    pub predictor: Option<u16>,
    /// Whether to reject empty frames before correction
    pub validate_dimensions: bool,
    /// Replace the declared white level with the clipping point measured on each frame
    pub estimate_white_level: bool,
    /// Directory of `.fpm` focus-pixel tables; required by the focus pixel fix
    pub focus_pixel_dir: Option<PathBuf>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            options: FrameOptions::NONE,
            preview: false,
            highlight_compression: TiffCompression::DeflateBalanced,
            predictor: None,
            validate_dimensions: true,
            estimate_white_level: false,
            focus_pixel_dir: None,
        }
    }
}

impl ConversionConfig {
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder::default()
    }
}

/// Builder for ConversionConfig
#[derive(Default)]
pub struct ConversionConfigBuilder {
    options: Option<FrameOptions>,
    preview: Option<bool>,
    highlight_compression: Option<TiffCompression>,
    predictor: Option<Option<u16>>,
    validate_dimensions: Option<bool>,
    estimate_white_level: Option<bool>,
    focus_pixel_dir: Option<Option<PathBuf>>,
}

impl ConversionConfigBuilder {
    pub fn options(mut self, options: FrameOptions) -> Self {
        self.options = Some(options);
        self
    }

    pub fn preview(mut self, enable: bool) -> Self {
        self.preview = Some(enable);
        self
    }

    pub fn highlight_compression(mut self, compression: TiffCompression) -> Self {
        self.highlight_compression = Some(compression);
        self
    }

    pub fn predictor(mut self, predictor: Option<u16>) -> Self {
        self.predictor = Some(predictor);
        self
    }

    pub fn validate_dimensions(mut self, validate: bool) -> Self {
        self.validate_dimensions = Some(validate);
        self
    }

    pub fn estimate_white_level(mut self, estimate: bool) -> Self {
        self.estimate_white_level = Some(estimate);
        self
    }

    pub fn focus_pixel_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.focus_pixel_dir = Some(dir);
        self
    }

    pub fn build(self) -> ConversionConfig {
        let default = ConversionConfig::default();
        ConversionConfig {
            options: self.options.unwrap_or(default.options),
            preview: self.preview.unwrap_or(default.preview),
            highlight_compression: self
                .highlight_compression
                .unwrap_or(default.highlight_compression),
            predictor: self.predictor.unwrap_or(default.predictor),
            validate_dimensions: self.validate_dimensions.unwrap_or(default.validate_dimensions),
            estimate_white_level: self
                .estimate_white_level
                .unwrap_or(default.estimate_white_level),
            focus_pixel_dir: self.focus_pixel_dir.unwrap_or(default.focus_pixel_dir),
        }
    }
}
