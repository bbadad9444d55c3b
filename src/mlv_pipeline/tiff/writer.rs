use std::io::Write;

use crate::mlv_pipeline::common::error::Result;
use crate::mlv_pipeline::conversions::types::ConversionConfig;
use crate::mlv_pipeline::raw::image::RawImage;

pub trait TiffWriter {
    /// Encodes the frame's highlight map as an 8-bit grayscale TIFF.
    fn write_highlight_map(
        &self,
        image: &RawImage,
        output: &mut dyn Write,
        config: &ConversionConfig,
    ) -> Result<()>;
}
