//! Read-only description of an opened recording

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::mlv_pipeline::common::types::Rational;
use crate::mlv_pipeline::file::aggregate::{FileState, MlvFile};
use crate::mlv_pipeline::file::metadata::capture_metadata;

/// Run of frame numbers with no chunk in the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameGap {
    pub first: u32,
    pub count: u32,
}

/// Gaps in an ascending list of frame numbers, counting from frame 0.
pub fn frame_gaps<I: IntoIterator<Item = u32>>(frame_numbers: I) -> Vec<FrameGap> {
    let mut gaps = Vec::new();
    let mut expected = 0u32;
    for n in frame_numbers {
        if n > expected {
            gaps.push(FrameGap {
                first: expected,
                count: n - expected,
            });
        }
        expected = expected.max(n.saturating_add(1));
    }
    gaps
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

/// Attributes reported to callers when a recording is opened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileAttributes {
    pub manufacturer: Option<String>,
    pub camera: Option<String>,
    pub lens: Option<String>,
    /// Full raw buffer of the video mode
    pub original_size: Option<ImageSize>,
    /// Recorded frame
    pub scaled_size: Option<ImageSize>,
    pub bits_per_sample: Option<u32>,
    pub exposure_time: Option<Rational>,
    pub aperture: Option<Rational>,
    pub iso: Option<u32>,
    pub focal_length: Option<Rational>,
    pub compression: String,
    pub original_date: Option<NaiveDateTime>,
    pub file_size: u64,
    pub audio_sample_rate: Option<u32>,
    pub audio_bits_per_sample: Option<u16>,
    pub audio_channels: Option<u16>,
    /// Seconds
    pub duration: f64,
    /// Seconds per frame
    pub frame_time: f64,
    pub version: Option<String>,
    pub video_chunks: usize,
    pub audio_chunks: usize,
    pub valid: bool,
    pub state: FileState,
    pub file_flags: u32,
    pub frame_gaps: Vec<FrameGap>,
}

impl MlvFile {
    pub fn attributes(&self) -> FileAttributes {
        let headers = self.headers();
        let metadata = capture_metadata(headers);
        let rawi = headers.raw_info.as_ref();
        let manufacturer = metadata
            .camera_name
            .as_deref()
            .and_then(|name| name.split_whitespace().next())
            .map(str::to_string);

        FileAttributes {
            manufacturer,
            camera: metadata.camera_name.clone(),
            lens: metadata.lens_model.clone(),
            original_size: rawi.map(|r| ImageSize {
                width: r.raw_info.width as u32,
                height: r.raw_info.height as u32,
            }),
            scaled_size: rawi.map(|r| ImageSize {
                width: r.x_res as u32,
                height: r.y_res as u32,
            }),
            bits_per_sample: rawi.map(|r| r.raw_info.bits_per_pixel),
            exposure_time: headers.exposure.as_ref().map(|e| e.shutter()),
            aperture: headers.lens.as_ref().map(|l| l.aperture()),
            iso: headers.exposure.as_ref().map(|e| e.iso_value),
            focal_length: headers
                .lens
                .as_ref()
                .map(|l| Rational::new(l.focal_length as i32, 1)),
            compression: headers
                .file
                .as_ref()
                .map_or("Uncompressed", |f| f.compression_label())
                .to_string(),
            original_date: metadata.date,
            file_size: self.file_size(),
            audio_sample_rate: headers.wav_info.map(|w| w.sample_rate),
            audio_bits_per_sample: headers.wav_info.map(|w| w.bits_per_sample),
            audio_channels: headers.wav_info.map(|w| w.channels),
            duration: self.duration(),
            frame_time: self.frame_time(),
            version: headers.file.as_ref().map(|f| f.version.clone()),
            video_chunks: self.video_chunks().len(),
            audio_chunks: self.audio_chunks().len(),
            valid: self.state() == FileState::Valid,
            state: self.state(),
            file_flags: headers.file.as_ref().map_or(0, |f| f.flags.0),
            frame_gaps: self.frame_gaps(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gaps_between_frame_numbers() {
        assert!(frame_gaps([0, 1, 2]).is_empty());
        assert_eq!(
            frame_gaps([0, 1, 4, 5, 9]),
            vec![FrameGap { first: 2, count: 2 }, FrameGap { first: 6, count: 3 }]
        );
        assert_eq!(frame_gaps([3]), vec![FrameGap { first: 0, count: 3 }]);
        assert!(frame_gaps(std::iter::empty()).is_empty());
    }
}
