use crate::mlv_pipeline::raw::image::RawImage;
use crate::mlv_pipeline::raw::types::RawInfo;

/// Frame with black level 2048, white level 15000 and every sample set to `value`.
pub(crate) fn flat_image(width: usize, height: usize, bits: u32, value: u16) -> RawImage {
    let info = RawInfo {
        black_level: 2048,
        white_level: 15000,
        ..RawInfo::default()
    }
    .cropped_to(width, height)
    .with_bits_per_pixel(bits);
    RawImage::from_samples(info, &vec![value; width * height]).unwrap()
}
