//! Value-producing transforms: decompression and bit-depth conversion

use tracing::{debug, instrument};

use crate::mlv_pipeline::codec::{PixelCodec, is_supported_depth};
use crate::mlv_pipeline::common::error::{MlvError, Result, alloc_buffer};
use crate::mlv_pipeline::raw::image::RawImage;
use crate::mlv_pipeline::raw::types::RawInfo;

/// Entropy decoder for compressed frame payloads (LJ92, LZMA).
///
/// Implementations return one sample per pixel, row-major, `info.width * info.height`
/// values at `info.bits_per_pixel`.
pub trait FrameDecompressor: Send + Sync {
    fn decompress(&self, info: &RawInfo, payload: &[u8]) -> Result<Vec<u16>>;
}

/// Decoder used when no codec is linked in; every compressed frame is rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedDecompressor;

impl FrameDecompressor for UnsupportedDecompressor {
    fn decompress(&self, _info: &RawInfo, payload: &[u8]) -> Result<Vec<u16>> {
        Err(MlvError::CompressionError(format!(
            "no decoder available for {} byte compressed frame",
            payload.len()
        )))
    }
}

/// Rescales a black-referenced sample between depths with rounding.
fn rescale(value: u32, black: u32, source_max: u64, target_max: u64) -> u16 {
    let v = value.saturating_sub(black) as u64;
    ((v * target_max + source_max / 2) / source_max) as u16
}

impl RawImage {
    /// Returns an uncompressed copy of this frame.
    #[instrument(skip_all)]
    pub fn decompressed(&self, decoder: &dyn FrameDecompressor) -> Result<RawImage> {
        if !self.is_compressed() {
            return Ok(self.clone());
        }
        let info = *self.info();
        let samples = decoder.decompress(&info, self.buffer())?;
        if samples.len() != info.pixel_count() {
            return Err(MlvError::CompressionError(format!(
                "decoder produced {} samples for a {}x{} frame",
                samples.len(),
                info.width,
                info.height
            )));
        }
        let mut image = RawImage::from_samples(info, &samples)?.with_metadata(self.metadata.clone());
        image.set_highlight_map(self.highlight_map().map(<[u8]>::to_vec));
        debug!("Decompressed {} bytes into {} samples", self.buffer().len(), samples.len());
        Ok(image)
    }

    /// Returns a copy stored at `target_bits`.
    ///
    /// The same depth gives an exact copy. Any other depth rescales every sample as
    /// `round(max(v - black, 0) * (2^target - 1) / (2^source - 1))`, so the result is
    /// black-referenced: black level 0 and the white level rescaled the same way.
    #[instrument(skip(self), fields(source_bits = self.bits_per_pixel()))]
    pub fn with_bits_per_pixel(&self, target_bits: u32) -> Result<RawImage> {
        if !is_supported_depth(target_bits) {
            return Err(MlvError::InvalidArgument(format!(
                "unsupported target depth {target_bits}"
            )));
        }
        let source = self.codec()?;
        if target_bits == self.bits_per_pixel() {
            return Ok(self.clone());
        }

        let info = *self.info();
        let black = info.black_level.max(0) as u32;
        let source_max = source.max_sample() as u64;
        let mut target_info = info.with_bits_per_pixel(target_bits);
        let target_max = target_info.max_sample() as u64;
        target_info.black_level = 0;
        target_info.white_level =
            rescale(info.white_level.max(0) as u32, black, source_max, target_max) as i32;

        let target = PixelCodec::new(&target_info)?;
        let mut buffer = alloc_buffer(target_info.frame_size)?;
        let mut row = vec![0u16; info.width];
        let mut converted = vec![0u16; info.width];
        for y in 0..info.height {
            source.unpack_row(self.buffer(), y, &mut row)?;
            for (out, &v) in converted.iter_mut().zip(&row) {
                *out = rescale(v as u32, black, source_max, target_max);
            }
            for (x, &v) in converted.iter().enumerate() {
                target.set(&mut buffer, x, y, v)?;
            }
        }

        let mut image = RawImage::new(target_info, buffer, false)?.with_metadata(self.metadata.clone());
        image.set_highlight_map(self.highlight_map().map(<[u8]>::to_vec));
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mlv_pipeline::common::error::ErrorKind;
    use crate::mlv_pipeline::raw::test_support::flat_image;

    struct FlatDecoder(u16);

    impl FrameDecompressor for FlatDecoder {
        fn decompress(&self, info: &RawInfo, _payload: &[u8]) -> Result<Vec<u16>> {
            Ok(vec![self.0; info.pixel_count()])
        }
    }

    #[test]
    fn same_depth_is_an_exact_copy() {
        let mut image = flat_image(16, 4, 14, 2048);
        image.set_pixel(3, 1, 16383).unwrap();
        let copy = image.with_bits_per_pixel(14).unwrap();
        assert_eq!(copy.buffer(), image.buffer());
        assert_eq!(copy.info(), image.info());
    }

    #[test]
    fn conversion_leaves_source_untouched() {
        let image = flat_image(16, 4, 14, 9000);
        let before = image.buffer().to_vec();
        let eight = image.with_bits_per_pixel(8).unwrap();
        assert_eq!(image.buffer(), &before[..]);
        assert_eq!(eight.info().pitch, 16);
        assert_eq!(eight.buffer().len(), 64);
        assert_eq!(eight.info().black_level, 0);
    }

    #[test]
    fn black_maps_to_zero() {
        let image = flat_image(16, 16, 14, 2048);
        let eight = image.with_bits_per_pixel(8).unwrap();
        assert!(eight.samples().unwrap().iter().all(|&v| v == 0));
    }

    #[test]
    fn round_trip_through_eight_bits_stays_within_one_step() {
        let mut info = RawInfo::default().cropped_to(8, 1);
        info.black_level = 0;
        let image = RawImage::from_samples(info, &[16383, 0, 8191, 64, 128, 12000, 3, 16000]).unwrap();
        let back = image
            .with_bits_per_pixel(8)
            .unwrap()
            .with_bits_per_pixel(14)
            .unwrap();
        assert_eq!(back.get_pixel(0, 0).unwrap(), 16383);
        let step = 16383.0 / 255.0;
        for (a, b) in image.samples().unwrap().iter().zip(back.samples().unwrap()) {
            assert!((*a as f64 - b as f64).abs() <= step / 2.0 + 1.0);
        }
    }

    #[test]
    fn white_level_is_rescaled() {
        let image = flat_image(8, 2, 14, 3000);
        let twelve = image.with_bits_per_pixel(12).unwrap();
        let expected = ((15000u64 - 2048) * 4095 + 16383 / 2) / 16383;
        assert_eq!(twelve.info().white_level as u64, expected);
    }

    #[test]
    fn unsupported_target_depth_fails() {
        let image = flat_image(8, 2, 14, 3000);
        let err = image.with_bits_per_pixel(11).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn decompression_packs_decoder_output() {
        let info = RawInfo::default().cropped_to(16, 2);
        let image = RawImage::new(info, vec![0xAA; 10], true).unwrap();
        let plain = image.decompressed(&FlatDecoder(4242)).unwrap();
        assert!(!plain.is_compressed());
        assert_eq!(plain.buffer().len(), 56);
        assert!(plain.samples().unwrap().iter().all(|&v| v == 4242));
        assert!(image.is_compressed());
    }

    #[test]
    fn missing_decoder_is_a_compression_error() {
        let info = RawInfo::default().cropped_to(16, 2);
        let image = RawImage::new(info, vec![0xAA; 10], true).unwrap();
        let err = image.decompressed(&UnsupportedDecompressor).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CompressionError);
    }

    #[test]
    fn uncompressed_input_is_copied() {
        let image = flat_image(16, 2, 12, 700);
        let copy = image.decompressed(&UnsupportedDecompressor).unwrap();
        assert_eq!(copy.buffer(), image.buffer());
    }
}
