//! Capture metadata merged from the header chunks

use crate::mlv_pipeline::common::types::{
    CameraMatrices, ILLUMINANT_STANDARD_LIGHT_A, Rational,
};
use crate::mlv_pipeline::container::Headers;
use crate::mlv_pipeline::raw::types::CaptureMetadata;

/// Standard Light A color matrices (x 10000) for bodies whose `raw_info` only carries the
/// D65 matrix.
const STANDARD_LIGHT_A_MATRICES: [(u32, [i32; 9]); 5] = [
    // 5D Mark III
    (0x8000_0285, [7234, -1413, -600, -3631, 11150, 2850, -382, 1335, 6437]),
    // EOS M, 650D, 700D, 100D share the 18 MP sensor
    (0x8000_0331, [6985, -1611, -397, -3596, 10749, 3295, -992, 1781, 6151]),
    (0x8000_0301, [6985, -1611, -397, -3596, 10749, 3295, -992, 1781, 6151]),
    (0x8000_0326, [6985, -1611, -397, -3596, 10749, 3295, -992, 1781, 6151]),
    (0x8000_0346, [6985, -1611, -397, -3596, 10749, 3295, -992, 1781, 6151]),
];

fn standard_light_a_matrix(camera_model: u32) -> Option<[i32; 18]> {
    let (_, m) = STANDARD_LIGHT_A_MATRICES
        .iter()
        .find(|(model, _)| *model == camera_model)?;
    let mut pairs = [0i32; 18];
    for (i, v) in m.iter().enumerate() {
        pairs[2 * i] = *v;
        pairs[2 * i + 1] = 10000;
    }
    Some(pairs)
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

/// Two-illuminant calibration for a camera: Standard Light A from the model table when
/// known, with the recorded `raw_info` matrix as the second illuminant.
pub fn camera_matrices(headers: &Headers) -> CameraMatrices {
    let mut matrices = CameraMatrices::default();
    if let Some(rawi) = &headers.raw_info {
        matrices.calibration_illuminant1 = rawi.raw_info.calibration_illuminant1;
        matrices.color_matrix1 = rawi.raw_info.color_matrix1;
    }
    let model = headers.ident.as_ref().map(|i| i.camera_model);
    if let Some(matrix_a) = model.and_then(standard_light_a_matrix) {
        matrices.calibration_illuminant2 = matrices.calibration_illuminant1;
        matrices.color_matrix2 = matrices.color_matrix1;
        matrices.calibration_illuminant1 = ILLUMINANT_STANDARD_LIGHT_A;
        matrices.color_matrix1 = matrix_a;
    }
    matrices
}

pub fn capture_metadata(headers: &Headers) -> CaptureMetadata {
    let mut metadata = CaptureMetadata {
        camera_matrices: camera_matrices(headers),
        ..CaptureMetadata::default()
    };
    if let Some(ident) = &headers.ident {
        metadata.camera_name = non_empty(&ident.camera_name);
        metadata.camera_serial = non_empty(&ident.camera_serial);
    }
    if let Some(lens) = &headers.lens {
        metadata.lens_model = non_empty(&lens.name);
        metadata.focal_length = Rational::new(lens.focal_length as i32, 1);
        metadata.aperture = lens.aperture();
    }
    if let Some(expo) = &headers.exposure {
        metadata.iso = expo.iso_value;
        metadata.shutter = expo.shutter();
    }
    if let Some(wbal) = &headers.white_balance {
        metadata.white_balance = wbal.white_balance();
    }
    if let Some(file) = &headers.file {
        metadata.frame_rate = file.frame_rate();
    }
    metadata.date = headers.rtc.as_ref().and_then(|rtc| rtc.to_datetime());
    metadata
}
