//! One decoded frame: packed buffer, geometry and capture metadata

use tracing::debug;

use crate::mlv_pipeline::codec::{PixelCodec, check_row_width};
use crate::mlv_pipeline::common::error::{MlvError, Result, alloc_buffer};
use crate::mlv_pipeline::raw::types::{CaptureMetadata, RawInfo};

/// Highlight map value for a marked site.
pub const HIGHLIGHT_MARK: u8 = 255;

/// A single raw frame.
///
/// The buffer holds `info.height * info.pitch` packed bytes unless the frame is still
/// compressed, in which case it holds the compressed payload and every pixel operation
/// fails until [`RawImage::decompressed`] is used.
#[derive(Debug, Clone)]
pub struct RawImage {
    info: RawInfo,
    buffer: Vec<u8>,
    compressed: bool,
    highlight_map: Option<Vec<u8>>,
    pub metadata: CaptureMetadata,
}

impl RawImage {
    /// Wraps a packed buffer. The descriptor's pitch and frame size are re-derived from
    /// width and depth; an uncompressed buffer longer than the frame is truncated, a shorter
    /// one is rejected. Packed depths need a width that is a multiple of 8.
    pub fn new(info: RawInfo, mut buffer: Vec<u8>, compressed: bool) -> Result<Self> {
        let info = info.with_bits_per_pixel(info.bits_per_pixel);
        if !compressed {
            check_row_width(info.width, info.bits_per_pixel)?;
            if buffer.len() < info.frame_size {
                return Err(MlvError::InvalidArgument(format!(
                    "buffer of {} bytes for a {}x{} {}-bit frame ({} bytes)",
                    buffer.len(),
                    info.width,
                    info.height,
                    info.bits_per_pixel,
                    info.frame_size
                )));
            }
            if buffer.len() > info.frame_size {
                debug!(
                    "Truncating frame buffer from {} to {} bytes",
                    buffer.len(),
                    info.frame_size
                );
                buffer.truncate(info.frame_size);
            }
        }
        Ok(Self {
            info,
            buffer,
            compressed,
            highlight_map: None,
            metadata: CaptureMetadata::default(),
        })
    }

    /// Packs row-major samples into a new image.
    pub fn from_samples(info: RawInfo, samples: &[u16]) -> Result<Self> {
        let info = info.with_bits_per_pixel(info.bits_per_pixel);
        let codec = PixelCodec::new(&info)?;
        let mut buffer = alloc_buffer(info.frame_size)?;
        codec.pack(samples, &mut buffer)?;
        Self::new(info, buffer, false)
    }

    pub fn with_metadata(mut self, metadata: CaptureMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn info(&self) -> &RawInfo {
        &self.info
    }

    pub fn width(&self) -> usize {
        self.info.width
    }

    pub fn height(&self) -> usize {
        self.info.height
    }

    pub fn bits_per_pixel(&self) -> u32 {
        self.info.bits_per_pixel
    }

    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_buffer(self) -> Vec<u8> {
        self.buffer
    }

    /// Overrides the calibration levels, e.g. with [`RawImage::calculated_white_level`].
    pub fn set_levels(&mut self, black_level: i32, white_level: i32) {
        self.info.black_level = black_level;
        self.info.white_level = white_level;
    }

    pub(crate) fn codec(&self) -> Result<PixelCodec> {
        if self.compressed {
            return Err(MlvError::InvalidArgument(
                "pixel access on a compressed frame".to_string(),
            ));
        }
        PixelCodec::new(&self.info)
    }

    pub fn get_pixel(&self, x: usize, y: usize) -> Result<u16> {
        self.codec()?.get(&self.buffer, x, y)
    }

    pub fn set_pixel(&mut self, x: usize, y: usize, value: u16) -> Result<()> {
        let codec = self.codec()?;
        codec.set(&mut self.buffer, x, y, value)
    }

    /// Unpacked row-major copy of every sample.
    pub fn samples(&self) -> Result<Vec<u16>> {
        self.codec()?.unpack(&self.buffer)
    }

    pub(crate) fn parts(&mut self) -> (&RawInfo, &mut Vec<u8>, Option<&mut Vec<u8>>) {
        (&self.info, &mut self.buffer, self.highlight_map.as_mut())
    }

    /// One byte per pixel, [`HIGHLIGHT_MARK`] where a sample is clipped or was interpolated.
    pub fn highlight_map(&self) -> Option<&[u8]> {
        self.highlight_map.as_deref()
    }

    pub(crate) fn set_highlight_map(&mut self, map: Option<Vec<u8>>) {
        self.highlight_map = map;
    }

    /// Allocates the highlight map and marks every sample at or above the white level.
    /// Later correction passes mark the sites they interpolate.
    pub fn enable_highlight_map(&mut self) -> Result<()> {
        let codec = self.codec()?;
        let width = self.info.width;
        let white = self.info.white_level.max(0) as u32;
        let mut map = alloc_buffer(self.info.pixel_count())?;
        let mut row = vec![0u16; width];
        for y in 0..self.info.height {
            codec.unpack_row(&self.buffer, y, &mut row)?;
            for (x, &v) in row.iter().enumerate() {
                if v as u32 >= white {
                    map[y * width + x] = HIGHLIGHT_MARK;
                }
            }
        }
        self.highlight_map = Some(map);
        Ok(())
    }
}
