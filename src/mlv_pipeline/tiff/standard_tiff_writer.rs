use std::io::Write;

use tracing::debug;

use crate::mlv_pipeline::common::error::{MlvError, Result};
use crate::mlv_pipeline::conversions::types::ConversionConfig;
use crate::mlv_pipeline::raw::image::RawImage;
use crate::mlv_pipeline::tiff::writer::TiffWriter;

pub struct StandardTiffWriter;

impl TiffWriter for StandardTiffWriter {
    fn write_highlight_map(
        &self,
        image: &RawImage,
        output: &mut dyn Write,
        config: &ConversionConfig,
    ) -> Result<()> {
        let map = image.highlight_map().ok_or_else(|| {
            MlvError::InvalidArgument("frame has no highlight map".to_string())
        })?;
        debug!("Encoding highlight map: {}x{}", image.width(), image.height());

        let mut buffer = Vec::new();
        let mut encoder = tiff::encoder::TiffEncoder::new(std::io::Cursor::new(&mut buffer))
            .map_err(|e| MlvError::EncodeError(e.to_string()))?
            .with_compression(config.highlight_compression.encoder_compression());

        if let Some(predictor_val) = config.predictor {
            let predictor = match predictor_val {
                2 => tiff::tags::Predictor::Horizontal,
                _ => tiff::tags::Predictor::None,
            };
            encoder = encoder.with_predictor(predictor);
        }

        encoder
            .write_image::<tiff::encoder::colortype::Gray8>(
                image.width() as u32,
                image.height() as u32,
                map,
            )
            .map_err(|e| MlvError::EncodeError(e.to_string()))?;

        output.write_all(&buffer)?;

        debug!("Highlight map encoding complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mlv_pipeline::raw::image::HIGHLIGHT_MARK;
    use crate::mlv_pipeline::raw::test_support::flat_image;
    use crate::mlv_pipeline::tiff::types::TiffCompression;
    use std::io::Cursor;
    use tiff::decoder::{Decoder, DecodingResult};

    fn decode(bytes: Vec<u8>) -> (u32, u32, Vec<u8>) {
        let mut decoder = Decoder::new(Cursor::new(bytes)).unwrap();
        let (w, h) = decoder.dimensions().unwrap();
        match decoder.read_image().unwrap() {
            DecodingResult::U8(data) => (w, h, data),
            _ => panic!("expected 8-bit samples"),
        }
    }

    #[test]
    fn highlight_map_decodes_for_every_compression() {
        let mut image = flat_image(16, 8, 14, 3000);
        image.set_pixel(3, 2, 15800).unwrap();
        image.enable_highlight_map().unwrap();

        for compression in [
            TiffCompression::None,
            TiffCompression::Lzw,
            TiffCompression::DeflateFast,
            TiffCompression::DeflateBest,
        ] {
            let config = ConversionConfig::builder()
                .highlight_compression(compression)
                .predictor(Some(2))
                .build();
            let mut out = Vec::new();
            StandardTiffWriter
                .write_highlight_map(&image, &mut out, &config)
                .unwrap();
            let (w, h, data) = decode(out);
            assert_eq!((w, h), (16, 8));
            assert_eq!(data[2 * 16 + 3], HIGHLIGHT_MARK);
            assert_eq!(data.iter().filter(|&&v| v != 0).count(), 1);
        }
    }

    #[test]
    fn frame_without_map_is_rejected() {
        let image = flat_image(16, 8, 14, 3000);
        let mut out = Vec::new();
        assert!(
            StandardTiffWriter
                .write_highlight_map(&image, &mut out, &ConversionConfig::default())
                .is_err()
        );
        assert!(out.is_empty());
    }
}
