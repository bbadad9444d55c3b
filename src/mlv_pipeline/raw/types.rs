//! RAW image geometry and capture metadata types

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::mlv_pipeline::common::types::{CameraMatrices, Rational, WhiteBalance};

/// Bayer layout of the top-left 2x2 cell, red first (`0x02010100` as stored by the camera).
pub const CFA_PATTERN_RGGB: i32 = 0x0201_0100;

/// Geometry and calibration of one raw buffer.
///
/// Mirrors the camera's `raw_info` record. `pitch` and `frame_size` always follow from
/// `width`, `height` and `bits_per_pixel` once the descriptor has been normalized with
/// [`RawInfo::with_bits_per_pixel`] or [`RawInfo::cropped_to`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawInfo {
    pub api_version: u32,
    pub width: usize,
    pub height: usize,
    /// Bytes per row
    pub pitch: usize,
    pub frame_size: usize,
    pub bits_per_pixel: u32,
    pub black_level: i32,
    pub white_level: i32,
    /// Crop origin and size, `[x, y]` each
    pub crop_origin: [i32; 2],
    pub crop_size: [i32; 2],
    /// DNG active area `[y1, x1, y2, x2]`
    pub active_area: [i32; 4],
    pub exposure_bias: [i32; 2],
    pub cfa_pattern: i32,
    pub calibration_illuminant1: i32,
    pub color_matrix1: [i32; 18],
    /// EV x100
    pub dynamic_range: i32,
}

impl Default for RawInfo {
    fn default() -> Self {
        Self {
            api_version: 1,
            width: 0,
            height: 0,
            pitch: 0,
            frame_size: 0,
            bits_per_pixel: 14,
            black_level: 0,
            white_level: (1 << 14) - 1,
            crop_origin: [0, 0],
            crop_size: [0, 0],
            active_area: [0, 0, 0, 0],
            exposure_bias: [0, 0],
            cfa_pattern: CFA_PATTERN_RGGB,
            calibration_illuminant1: crate::mlv_pipeline::common::types::ILLUMINANT_D65,
            color_matrix1: crate::mlv_pipeline::common::types::identity_matrix(),
            dynamic_range: 0,
        }
    }
}

impl RawInfo {
    /// Bytes per row for a given width and depth.
    pub fn pitch_for(width: usize, bits_per_pixel: u32) -> usize {
        width * bits_per_pixel as usize / 8
    }

    /// Largest representable sample at the current depth.
    pub fn max_sample(&self) -> u32 {
        if self.bits_per_pixel >= 32 {
            u32::MAX
        } else {
            (1u32 << self.bits_per_pixel) - 1
        }
    }

    /// Returns a copy with a new depth and the derived pitch / frame size.
    pub fn with_bits_per_pixel(&self, bits_per_pixel: u32) -> Self {
        let pitch = Self::pitch_for(self.width, bits_per_pixel);
        Self {
            bits_per_pixel,
            pitch,
            frame_size: pitch * self.height,
            ..*self
        }
    }

    /// Returns a copy describing a `width` x `height` frame cut from this buffer, with crop
    /// and active area covering the whole frame.
    pub fn cropped_to(&self, width: usize, height: usize) -> Self {
        let pitch = Self::pitch_for(width, self.bits_per_pixel);
        Self {
            width,
            height,
            pitch,
            frame_size: pitch * height,
            crop_origin: [0, 0],
            crop_size: [width as i32, height as i32],
            active_area: [0, 0, height as i32, width as i32],
            ..*self
        }
    }

    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }
}

/// Per-frame capture metadata carried alongside the pixels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaptureMetadata {
    pub camera_name: Option<String>,
    pub camera_serial: Option<String>,
    pub lens_model: Option<String>,
    pub date: Option<NaiveDateTime>,
    pub iso: u32,
    pub focal_length: Rational,
    pub aperture: Rational,
    pub shutter: Rational,
    pub frame_rate: Rational,
    pub white_balance: WhiteBalance,
    pub camera_matrices: CameraMatrices,
}
