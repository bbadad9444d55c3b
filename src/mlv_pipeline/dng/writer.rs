use tiff::tags::Tag;
use tracing::debug;

use crate::mlv_pipeline::codec::is_supported_depth;
use crate::mlv_pipeline::common::error::{MlvError, Result};
use crate::mlv_pipeline::common::types::{Rational, matrix_rationals};
use crate::mlv_pipeline::conversions::types::ConversionConfig;
use crate::mlv_pipeline::dng::ifd::{Ifd, Value};
use crate::mlv_pipeline::dng::preview::{Preview, render_preview};
use crate::mlv_pipeline::dng::tags;
use crate::mlv_pipeline::raw::image::RawImage;

const SOFTWARE: &str = "mlv_dng_rs";
const HEADER_LEN: usize = 8;

pub trait DngWriter {
    /// Encodes one frame as a complete DNG file.
    fn write_dng(&self, image: &RawImage, config: &ConversionConfig) -> Result<Vec<u8>>;
}

pub struct StandardDngWriter;

impl DngWriter for StandardDngWriter {
    fn write_dng(&self, image: &RawImage, config: &ConversionConfig) -> Result<Vec<u8>> {
        let camera = validate(image)?;

        let preview = if config.preview {
            render_preview(image)?
        } else {
            None
        };
        let raw_strip = raw_strip(image);
        let exif = exif_ifd(image);

        let mut ifd0 = Ifd::new();
        camera_tags(&mut ifd0, image, camera);
        let mut raw_ifd = match &preview {
            Some(p) => {
                preview_tags(&mut ifd0, p);
                let mut raw = Ifd::new();
                raw_tags(&mut raw, image);
                Some(raw)
            }
            None => {
                raw_tags(&mut ifd0, image);
                None
            }
        };

        // Pointer values are inline LONGs, so directory sizes do not depend on them.
        if raw_ifd.is_some() {
            ifd0.insert(tags::SUB_IFDS, Value::long(0));
        }
        if exif.is_some() {
            ifd0.insert(tags::EXIF_IFD, Value::long(0));
        }
        ifd0.insert(Tag::StripOffsets.to_u16(), Value::long(0));
        if let Some(raw) = raw_ifd.as_mut() {
            raw.insert(Tag::StripOffsets.to_u16(), Value::long(0));
        }

        let ifd0_offset = HEADER_LEN;
        let raw_ifd_offset = ifd0_offset + ifd0.byte_len();
        let exif_offset = raw_ifd_offset + raw_ifd.as_ref().map_or(0, Ifd::byte_len);
        let preview_offset = exif_offset + exif.as_ref().map_or(0, Ifd::byte_len);
        let raw_offset = preview_offset + preview.as_ref().map_or(0, |p| p.rgb.len());
        let total = raw_offset + raw_strip.len();
        let offset = |o: usize| -> Result<u32> {
            u32::try_from(o).map_err(|_| {
                MlvError::InvalidArgument(format!("DNG of {} bytes exceeds 4 GiB", total))
            })
        };
        offset(total)?;

        if let Some(raw) = raw_ifd.as_mut() {
            ifd0.insert(tags::SUB_IFDS, Value::long(offset(raw_ifd_offset)?));
            ifd0.insert(Tag::StripOffsets.to_u16(), Value::long(offset(preview_offset)?));
            raw.insert(Tag::StripOffsets.to_u16(), Value::long(offset(raw_offset)?));
        } else {
            ifd0.insert(Tag::StripOffsets.to_u16(), Value::long(offset(raw_offset)?));
        }
        if exif.is_some() {
            ifd0.insert(tags::EXIF_IFD, Value::long(offset(exif_offset)?));
        }

        let mut out = Vec::new();
        out.try_reserve_exact(total)
            .map_err(|_| MlvError::MemoryError(total))?;
        out.extend_from_slice(b"II");
        out.extend_from_slice(&42u16.to_le_bytes());
        out.extend_from_slice(&(ifd0_offset as u32).to_le_bytes());
        ifd0.write(&mut out, 0);
        if let Some(raw) = &raw_ifd {
            raw.write(&mut out, 0);
        }
        if let Some(exif) = &exif {
            exif.write(&mut out, 0);
        }
        if let Some(p) = &preview {
            out.extend_from_slice(&p.rgb);
        }
        out.extend_from_slice(&raw_strip);
        debug_assert_eq!(out.len(), total);

        debug!(
            "Encoded {}x{} {}-bit DNG, {} bytes, preview: {}",
            image.width(),
            image.height(),
            image.bits_per_pixel(),
            out.len(),
            preview.is_some()
        );
        Ok(out)
    }
}

/// Returns the camera name once the frame is known to be encodable.
fn validate(image: &RawImage) -> Result<&str> {
    let info = image.info();
    if info.width == 0 || info.height == 0 {
        return Err(MlvError::MissingMetadata(format!(
            "frame dimensions {}x{}",
            info.width, info.height
        )));
    }
    if !is_supported_depth(info.bits_per_pixel) {
        return Err(MlvError::MissingMetadata(format!(
            "unsupported bit depth {}",
            info.bits_per_pixel
        )));
    }
    if image.is_compressed() {
        return Err(MlvError::MissingMetadata(
            "frame is still compressed".to_string(),
        ));
    }
    if image.buffer().len() != info.frame_size {
        return Err(MlvError::MissingMetadata(format!(
            "buffer holds {} bytes, frame needs {}",
            image.buffer().len(),
            info.frame_size
        )));
    }
    image
        .metadata
        .camera_name
        .as_deref()
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| MlvError::MissingMetadata("camera name".to_string()))
}

/// Packed 10/12/14-bit words are stored little-endian; DNG wants the bit stream big-endian.
fn raw_strip(image: &RawImage) -> Vec<u8> {
    let mut strip = image.buffer().to_vec();
    if matches!(image.bits_per_pixel(), 10 | 12 | 14) {
        for word in strip.chunks_exact_mut(2) {
            word.swap(0, 1);
        }
    }
    strip
}

fn clamp_u32(v: i32) -> u32 {
    v.max(0) as u32
}

fn camera_tags(ifd: &mut Ifd, image: &RawImage, camera: &str) {
    let metadata = &image.metadata;
    let info = image.info();
    let make = camera.split_whitespace().next().unwrap_or(camera);

    ifd.insert(Tag::Make.to_u16(), Value::Ascii(make.to_string()));
    ifd.insert(Tag::Model.to_u16(), Value::Ascii(camera.to_string()));
    ifd.insert(tags::UNIQUE_CAMERA_MODEL, Value::Ascii(camera.to_string()));
    ifd.insert(tags::ORIENTATION, Value::short(1));
    ifd.insert(Tag::Software.to_u16(), Value::Ascii(SOFTWARE.to_string()));
    if let Some(date) = metadata.date {
        ifd.insert(
            Tag::DateTime.to_u16(),
            Value::Ascii(date.format("%Y:%m:%d %H:%M:%S").to_string()),
        );
    }
    if let Some(serial) = metadata.camera_serial.as_deref().filter(|s| !s.is_empty()) {
        ifd.insert(tags::CAMERA_SERIAL_NUMBER, Value::Ascii(serial.to_string()));
    }

    ifd.insert(tags::DNG_VERSION, Value::Byte(vec![1, 4, 0, 0]));
    ifd.insert(tags::DNG_BACKWARD_VERSION, Value::Byte(vec![1, 1, 0, 0]));

    let matrices = &metadata.camera_matrices;
    ifd.insert(
        tags::CALIBRATION_ILLUMINANT1,
        Value::short(matrices.calibration_illuminant1.clamp(0, u16::MAX as i32) as u16),
    );
    ifd.insert(
        tags::COLOR_MATRIX1,
        Value::srationals(&matrix_rationals(&matrices.color_matrix1)),
    );
    if matrices.has_second_matrix() {
        ifd.insert(
            tags::CALIBRATION_ILLUMINANT2,
            Value::short(matrices.calibration_illuminant2.clamp(0, u16::MAX as i32) as u16),
        );
        ifd.insert(
            tags::COLOR_MATRIX2,
            Value::srationals(&matrix_rationals(&matrices.color_matrix2)),
        );
    }
    ifd.insert(tags::ANALOG_BALANCE, Value::rationals(&[Rational::ONE; 3]));
    ifd.insert(
        tags::AS_SHOT_NEUTRAL,
        Value::rationals(&metadata.white_balance.as_shot_neutral()),
    );

    let [num, den] = info.exposure_bias;
    let bias = if den == 0 {
        Rational::ZERO
    } else {
        Rational::new(num, den)
    };
    ifd.insert(tags::BASELINE_EXPOSURE, Value::srationals(&[bias]));

    if !metadata.frame_rate.is_zero() {
        ifd.insert(tags::FRAME_RATE, Value::srationals(&[metadata.frame_rate]));
    }
}

fn raw_tags(ifd: &mut Ifd, image: &RawImage) {
    let info = image.info();
    let (width, height) = (info.width as u32, info.height as u32);

    ifd.insert(Tag::NewSubfileType.to_u16(), Value::long(0));
    ifd.insert(Tag::ImageWidth.to_u16(), Value::long(width));
    ifd.insert(Tag::ImageLength.to_u16(), Value::long(height));
    ifd.insert(
        Tag::BitsPerSample.to_u16(),
        Value::short(info.bits_per_pixel as u16),
    );
    ifd.insert(Tag::Compression.to_u16(), Value::short(1));
    ifd.insert(
        Tag::PhotometricInterpretation.to_u16(),
        Value::short(tags::PHOTOMETRIC_CFA),
    );
    ifd.insert(Tag::SamplesPerPixel.to_u16(), Value::short(1));
    ifd.insert(Tag::RowsPerStrip.to_u16(), Value::long(height));
    ifd.insert(
        Tag::StripByteCounts.to_u16(),
        Value::long(image.buffer().len() as u32),
    );
    ifd.insert(Tag::PlanarConfiguration.to_u16(), Value::short(1));

    ifd.insert(tags::CFA_REPEAT_PATTERN_DIM, Value::Short(vec![2, 2]));
    ifd.insert(
        tags::CFA_PATTERN,
        Value::Byte(info.cfa_pattern.to_le_bytes().to_vec()),
    );
    ifd.insert(tags::CFA_PLANE_COLOR, Value::Byte(vec![0, 1, 2]));
    ifd.insert(tags::CFA_LAYOUT, Value::short(1));
    ifd.insert(tags::BLACK_LEVEL, Value::long(clamp_u32(info.black_level)));
    ifd.insert(tags::WHITE_LEVEL, Value::long(clamp_u32(info.white_level)));

    // [top, left, bottom, right]; anything outside the frame falls back to all of it.
    let [top, left, bottom, right] = info.active_area.map(clamp_u32);
    let active = if bottom > top && right > left && bottom <= height && right <= width {
        [top, left, bottom, right]
    } else {
        [0, 0, height, width]
    };
    let (active_w, active_h) = (active[3] - active[1], active[2] - active[0]);
    ifd.insert(tags::ACTIVE_AREA, Value::Long(active.to_vec()));

    let [crop_x, crop_y] = info.crop_origin.map(clamp_u32);
    let [crop_w, crop_h] = info.crop_size.map(clamp_u32);
    let (origin, size) = if crop_w > 0
        && crop_h > 0
        && crop_x + crop_w <= active_w
        && crop_y + crop_h <= active_h
    {
        ([crop_x, crop_y], [crop_w, crop_h])
    } else {
        ([0, 0], [active_w, active_h])
    };
    ifd.insert(tags::DEFAULT_CROP_ORIGIN, Value::Long(origin.to_vec()));
    ifd.insert(tags::DEFAULT_CROP_SIZE, Value::Long(size.to_vec()));
    ifd.insert(tags::DEFAULT_SCALE, Value::rationals(&[Rational::ONE; 2]));
}

fn preview_tags(ifd: &mut Ifd, preview: &Preview) {
    ifd.insert(Tag::NewSubfileType.to_u16(), Value::long(1));
    ifd.insert(Tag::ImageWidth.to_u16(), Value::long(preview.width as u32));
    ifd.insert(Tag::ImageLength.to_u16(), Value::long(preview.height as u32));
    ifd.insert(Tag::BitsPerSample.to_u16(), Value::Short(vec![8, 8, 8]));
    ifd.insert(Tag::Compression.to_u16(), Value::short(1));
    ifd.insert(
        Tag::PhotometricInterpretation.to_u16(),
        Value::short(tags::PHOTOMETRIC_RGB),
    );
    ifd.insert(Tag::SamplesPerPixel.to_u16(), Value::short(3));
    ifd.insert(Tag::RowsPerStrip.to_u16(), Value::long(preview.height as u32));
    ifd.insert(
        Tag::StripByteCounts.to_u16(),
        Value::long(preview.rgb.len() as u32),
    );
    ifd.insert(Tag::PlanarConfiguration.to_u16(), Value::short(1));
}

/// EXIF directory holding whichever exposure fields are known, `None` if none are.
fn exif_ifd(image: &RawImage) -> Option<Ifd> {
    let metadata = &image.metadata;
    let mut ifd = Ifd::new();
    if !metadata.shutter.is_zero() {
        ifd.insert(tags::EXPOSURE_TIME, Value::rational(metadata.shutter));
    }
    if !metadata.aperture.is_zero() {
        ifd.insert(tags::F_NUMBER, Value::rational(metadata.aperture));
    }
    if metadata.iso > 0 {
        ifd.insert(
            tags::ISO_SPEED_RATINGS,
            Value::short(metadata.iso.min(u16::MAX as u32) as u16),
        );
    }
    if let Some(date) = metadata.date {
        ifd.insert(
            tags::DATE_TIME_ORIGINAL,
            Value::Ascii(date.format("%Y:%m:%d %H:%M:%S").to_string()),
        );
    }
    if !metadata.focal_length.is_zero() {
        ifd.insert(tags::FOCAL_LENGTH, Value::rational(metadata.focal_length));
    }
    if let Some(serial) = metadata.camera_serial.as_deref().filter(|s| !s.is_empty()) {
        ifd.insert(tags::BODY_SERIAL_NUMBER, Value::Ascii(serial.to_string()));
    }
    if let Some(lens) = metadata.lens_model.as_deref().filter(|s| !s.is_empty()) {
        ifd.insert(tags::LENS_MODEL, Value::Ascii(lens.to_string()));
    }
    (!ifd.is_empty()).then_some(ifd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use chrono::NaiveDate;

    use crate::mlv_pipeline::common::error::ErrorKind;
    use crate::mlv_pipeline::raw::test_support::flat_image;
    use crate::mlv_pipeline::raw::types::{CaptureMetadata, RawInfo};

    #[derive(Debug, Clone, Copy)]
    struct Entry {
        field_type: u16,
        count: u32,
        value: u32,
    }

    fn u16_at(b: &[u8], o: usize) -> u16 {
        u16::from_le_bytes([b[o], b[o + 1]])
    }

    fn u32_at(b: &[u8], o: usize) -> u32 {
        u32::from_le_bytes(b[o..o + 4].try_into().unwrap())
    }

    fn read_ifd(b: &[u8], offset: usize) -> (BTreeMap<u16, Entry>, u32) {
        let n = u16_at(b, offset) as usize;
        let mut entries = BTreeMap::new();
        let mut last = 0;
        for i in 0..n {
            let e = offset + 2 + 12 * i;
            let tag = u16_at(b, e);
            assert!(tag > last || i == 0, "tags must be sorted");
            last = tag;
            entries.insert(
                tag,
                Entry {
                    field_type: u16_at(b, e + 2),
                    count: u32_at(b, e + 4),
                    value: u32_at(b, e + 8),
                },
            );
        }
        (entries, u32_at(b, offset + 2 + 12 * n))
    }

    fn ascii(b: &[u8], e: Entry) -> String {
        let len = e.count as usize - 1;
        let bytes = if e.count <= 4 {
            e.value.to_le_bytes()[..len].to_vec()
        } else {
            b[e.value as usize..e.value as usize + len].to_vec()
        };
        String::from_utf8(bytes).unwrap()
    }

    fn tagged_image(bits: u32) -> RawImage {
        let value = if bits == 8 { 100 } else { 3000 };
        flat_image(16, 16, bits, value).with_metadata(CaptureMetadata {
            camera_name: Some("Canon EOS 5D Mark III".to_string()),
            camera_serial: Some("123456789".to_string()),
            lens_model: Some("EF24-70mm f/2.8L II USM".to_string()),
            date: NaiveDate::from_ymd_opt(2017, 12, 24).and_then(|d| d.and_hms_opt(9, 15, 30)),
            iso: 800,
            focal_length: Rational::new(35, 1),
            aperture: Rational::new(280, 100),
            shutter: Rational::new(1, 50),
            frame_rate: Rational::new(24000, 1001),
            ..CaptureMetadata::default()
        })
    }

    #[test]
    fn raw_only_dng_layout() {
        let image = tagged_image(14);
        let dng = StandardDngWriter
            .write_dng(&image, &ConversionConfig::default())
            .unwrap();

        assert_eq!(&dng[..4], b"II*\0");
        assert_eq!(u32_at(&dng, 4), 8);
        let (ifd0, next) = read_ifd(&dng, 8);
        assert_eq!(next, 0);

        assert_eq!(ifd0[&254].value, 0);
        assert_eq!(ifd0[&256].value, 16);
        assert_eq!(ifd0[&257].value, 16);
        assert_eq!(ifd0[&258].value, 14);
        assert_eq!(ifd0[&262].value, 32803);
        assert_eq!(ifd0[&33422].value.to_le_bytes(), [0, 1, 1, 2]);
        assert_eq!(ifd0[&50706].value.to_le_bytes(), [1, 4, 0, 0]);
        assert_eq!(ifd0[&50714].value, 2048);
        assert_eq!(ifd0[&50717].value, 15000);
        assert_eq!(ascii(&dng, ifd0[&271]), "Canon");
        assert_eq!(ascii(&dng, ifd0[&272]), "Canon EOS 5D Mark III");
        assert_eq!(ascii(&dng, ifd0[&306]), "2017:12:24 09:15:30");
        assert!(!ifd0.contains_key(&tags::SUB_IFDS));
        assert_eq!(ifd0[&tags::COLOR_MATRIX1].field_type, 10);
        assert_eq!(ifd0[&tags::COLOR_MATRIX1].count, 9);

        // strip is the last thing in the file, each word swapped
        let offset = ifd0[&273].value as usize;
        let count = ifd0[&279].value as usize;
        assert_eq!(count, image.buffer().len());
        assert_eq!(offset + count, dng.len());
        let strip = &dng[offset..];
        for (out, src) in strip.chunks(2).zip(image.buffer().chunks(2)) {
            assert_eq!(out, [src[1], src[0]]);
        }

        // EXIF directory sits between IFD0 and the strip
        let exif_offset = ifd0[&34665].value as usize;
        assert!(exif_offset > 8 && exif_offset < offset);
        let (exif, _) = read_ifd(&dng, exif_offset);
        assert_eq!(exif[&34855].value, 800);
        assert_eq!(ascii(&dng, exif[&42036]), "EF24-70mm f/2.8L II USM");
        assert_eq!(ascii(&dng, exif[&42033]), "123456789");
        let f_number = exif[&33437].value as usize;
        assert_eq!((u32_at(&dng, f_number), u32_at(&dng, f_number + 4)), (14, 5));
    }

    #[test]
    fn eight_bit_strip_is_stored_as_is() {
        let image = tagged_image(8);
        let dng = StandardDngWriter
            .write_dng(&image, &ConversionConfig::default())
            .unwrap();
        let (ifd0, _) = read_ifd(&dng, 8);
        assert_eq!(ifd0[&258].value, 8);
        let offset = ifd0[&273].value as usize;
        assert_eq!(&dng[offset..], image.buffer());
    }

    #[test]
    fn preview_chain_points_to_raw_sub_ifd() {
        let image = tagged_image(14);
        let config = ConversionConfig::builder().preview(true).build();
        let dng = StandardDngWriter.write_dng(&image, &config).unwrap();

        let (ifd0, _) = read_ifd(&dng, 8);
        assert_eq!(ifd0[&254].value, 1);
        assert_eq!(ifd0[&262].value, 2);
        assert_eq!(ifd0[&277].value, 3);
        assert_eq!(ifd0[&258].count, 3);
        assert_eq!(ifd0[&256].value, 16);
        let preview_offset = ifd0[&273].value as usize;
        assert_eq!(ifd0[&279].value, 16 * 16 * 3);

        let raw_offset = ifd0[&tags::SUB_IFDS].value as usize;
        let ifd0_len = 2 + 12 * ifd0.len() + 4;
        assert!(raw_offset >= 8 + ifd0_len);
        let (raw, _) = read_ifd(&dng, raw_offset);
        assert_eq!(raw[&254].value, 0);
        assert_eq!(raw[&262].value, 32803);
        assert_eq!(raw[&258].value, 14);
        assert!(!raw.contains_key(&tags::DNG_VERSION));

        let exif_offset = ifd0[&34665].value as usize;
        assert!(exif_offset > raw_offset && exif_offset < preview_offset);
        let strip_offset = raw[&273].value as usize;
        assert_eq!(strip_offset, preview_offset + 16 * 16 * 3);
        assert_eq!(strip_offset + raw[&279].value as usize, dng.len());
    }

    #[test]
    fn missing_metadata_emits_nothing() {
        let config = ConversionConfig::default();
        let cases = [
            flat_image(16, 16, 14, 3000),
            {
                let info = RawInfo::default().cropped_to(0, 4);
                RawImage::new(info, Vec::new(), false)
                    .unwrap()
                    .with_metadata(tagged_image(14).metadata)
            },
            {
                let info = RawInfo::default().cropped_to(16, 4).with_bits_per_pixel(9);
                RawImage::new(info, vec![0; 72], false)
                    .unwrap()
                    .with_metadata(tagged_image(14).metadata)
            },
            {
                let info = RawInfo::default().cropped_to(16, 4);
                RawImage::new(info, vec![1, 2, 3], true)
                    .unwrap()
                    .with_metadata(tagged_image(14).metadata)
            },
        ];
        for image in cases {
            let err = StandardDngWriter.write_dng(&image, &config).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::MissingMetadata);
        }
    }

    #[test]
    fn absent_exposure_fields_are_skipped() {
        let image = flat_image(16, 16, 12, 3000).with_metadata(CaptureMetadata {
            camera_name: Some("Canon EOS M".to_string()),
            ..CaptureMetadata::default()
        });
        let dng = StandardDngWriter
            .write_dng(&image, &ConversionConfig::default())
            .unwrap();
        let (ifd0, _) = read_ifd(&dng, 8);
        assert!(!ifd0.contains_key(&34665));
        assert!(!ifd0.contains_key(&306));
        assert!(!ifd0.contains_key(&tags::FRAME_RATE));
        assert_eq!(ascii(&dng, ifd0[&271]), "Canon");
    }
}
