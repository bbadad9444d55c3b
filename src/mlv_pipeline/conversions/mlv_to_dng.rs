use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use tracing::{debug, info, instrument, warn};

use crate::mlv_pipeline::common::error::{MlvError, Result};
use crate::mlv_pipeline::conversions::types::{ConversionConfig, FrameOptions};
use crate::mlv_pipeline::dng::{DngWriter, StandardDngWriter};
use crate::mlv_pipeline::file::MlvFile;
use crate::mlv_pipeline::pixel_map::PixelMap;
use crate::mlv_pipeline::raw::{
    BandingCoefficients, FocusPixelTables, FocusPixelsType, FrameDecompressor, RawImage,
    UnsupportedDecompressor,
};
use crate::mlv_pipeline::tiff::{StandardTiffWriter, TiffWriter};

/// Per-recording results reused across frames once the first frame has produced them.
#[derive(Debug, Default)]
pub struct FrameCache {
    dead_pixels: OnceLock<Arc<PixelMap>>,
    banding: OnceLock<Option<BandingCoefficients>>,
}

impl FrameCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dead_pixels(&self) -> Option<Arc<PixelMap>> {
        self.dead_pixels.get().cloned()
    }

    /// `Some(None)` once a frame was examined and gave no usable statistics.
    pub fn banding(&self) -> Option<Option<BandingCoefficients>> {
        self.banding.get().copied()
    }

    fn dead_pixels_or_detect(&self, image: &RawImage) -> Result<Arc<PixelMap>> {
        if let Some(map) = self.dead_pixels.get() {
            return Ok(Arc::clone(map));
        }
        let map = Arc::new(image.detect_dead_pixels()?);
        // another thread may have published first; theirs wins
        let _ = self.dead_pixels.set(map);
        Ok(self.dead_pixels.get().map(Arc::clone).unwrap_or_default())
    }

    fn banding_or_detect(&self, image: &RawImage) -> Result<Option<BandingCoefficients>> {
        if let Some(coefficients) = self.banding.get() {
            return Ok(*coefficients);
        }
        let coefficients = image.find_vertical_banding_coefficients()?;
        let _ = self.banding.set(coefficients);
        Ok(self.banding.get().copied().flatten())
    }
}

/// Result of one frame conversion.
#[derive(Debug, Clone)]
pub struct ProcessedFrame {
    /// Frame number from the container
    pub frame_number: u32,
    pub dng: Vec<u8>,
    /// Grayscale TIFF, present when a highlight map was requested
    pub highlight_map: Option<Vec<u8>>,
}

pub struct MlvToDngPipeline<D: DngWriter, T: TiffWriter> {
    dng_writer: D,
    tiff_writer: T,
    decompressor: Box<dyn FrameDecompressor>,
    focus_tables: Option<FocusPixelTables>,
    config: ConversionConfig,
}

impl MlvToDngPipeline<StandardDngWriter, StandardTiffWriter> {
    /// Pipeline with the standard writers. Fails only when `focus_pixel_dir` is set and
    /// it or one of its tables cannot be read.
    pub fn new(config: ConversionConfig) -> Result<Self> {
        Self::with_custom(
            StandardDngWriter,
            StandardTiffWriter,
            Box::new(UnsupportedDecompressor),
            config,
        )
    }
}

impl<D: DngWriter, T: TiffWriter> MlvToDngPipeline<D, T> {
    pub fn with_custom(
        dng_writer: D,
        tiff_writer: T,
        decompressor: Box<dyn FrameDecompressor>,
        config: ConversionConfig,
    ) -> Result<Self> {
        let focus_tables = config
            .focus_pixel_dir
            .as_ref()
            .map(FocusPixelTables::with_directory)
            .transpose()?;
        Ok(Self {
            dng_writer,
            tiff_writer,
            decompressor,
            focus_tables,
            config,
        })
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    fn validate_dimensions(&self, image: &RawImage) -> Result<()> {
        if !self.config.validate_dimensions {
            return Ok(());
        }
        if image.width() == 0 || image.height() == 0 {
            return Err(MlvError::InvalidArgument(format!(
                "Invalid image dimensions: width={}, height={}",
                image.width(),
                image.height()
            )));
        }
        Ok(())
    }

    fn fix_focus_pixels(&self, file: &MlvFile, index: usize, image: &mut RawImage) -> Result<()> {
        let Some(tables) = self.focus_tables.as_ref() else {
            return Err(MlvError::InvalidArgument(
                "focus pixel fix needs focus_pixel_dir".to_string(),
            ));
        };
        let headers = file.headers();
        let (Some(ident), Some(rawi)) = (headers.ident.as_ref(), headers.raw_info.as_ref())
        else {
            debug!("No camera identity, skipping focus pixels");
            return Ok(());
        };
        let buffer = &rawi.raw_info;
        let Some(ty) =
            FocusPixelsType::for_camera(ident.camera_model, buffer.width as u32, buffer.height as u32)
        else {
            debug!(
                "No focus pixel table for {:#x} at {}x{}",
                ident.camera_model, buffer.width, buffer.height
            );
            return Ok(());
        };
        let (crop_x, crop_y) = file
            .video_chunks()
            .get(index)
            .and_then(|chunk| chunk.frame)
            .map_or((0, 0), |f| (f.crop_x, f.crop_y));
        image.fix_focus_pixels(tables, ty, crop_x, crop_y)
    }

    /// Runs the enabled correction steps on frame `index` and encodes the result.
    ///
    /// Steps run in a fixed order: decompression, focus pixels, dead pixels, vertical
    /// banding, white level estimate (when configured), 14-bit conversion, then the
    /// highlight map and DNG encoding.
    #[instrument(skip(self, file, cache), fields(options = %options))]
    pub fn process_frame(
        &self,
        file: &MlvFile,
        index: usize,
        options: FrameOptions,
        cache: &FrameCache,
    ) -> Result<ProcessedFrame> {
        let frame_number = file
            .video_chunks()
            .get(index)
            .and_then(|chunk| chunk.frame_number())
            .unwrap_or(index as u32);

        let mut image = {
            let _span = tracing::info_span!("read_frame", index).entered();
            file.read_video_frame_at(index)?
        };

        {
            let _span = tracing::info_span!(
                "validate_dimensions",
                width = image.width(),
                height = image.height()
            )
            .entered();
            self.validate_dimensions(&image)?;
        }

        if image.is_compressed() {
            let _span = tracing::info_span!("decompress").entered();
            image = image.decompressed(self.decompressor.as_ref())?;
        }

        if options.contains(FrameOptions::PRODUCE_HIGHLIGHT_MAP) {
            image.enable_highlight_map()?;
        }

        if options.contains(FrameOptions::FIX_FOCUS_PIXELS) {
            let _span = tracing::info_span!("fix_focus_pixels").entered();
            self.fix_focus_pixels(file, index, &mut image)?;
        }

        if options.contains(FrameOptions::FIX_DEAD_PIXELS) {
            let _span = tracing::info_span!("fix_dead_pixels").entered();
            let map = cache.dead_pixels_or_detect(&image)?;
            image.fix_dead_pixels(&map)?;
        }

        if options.contains(FrameOptions::FIX_VERTICAL_BANDING) {
            let _span = tracing::info_span!("fix_vertical_banding").entered();
            if let Some(coefficients) = cache.banding_or_detect(&image)? {
                image.fix_vertical_banding(Some(&coefficients))?;
            }
        }

        if self.config.estimate_white_level {
            let _span = tracing::info_span!("estimate_white_level").entered();
            let white = image.calculated_white_level()?;
            let black = image.info().black_level;
            debug!(declared = image.info().white_level, white, "White level estimated");
            image.set_levels(black, white as i32);
        }

        if options.contains(FrameOptions::CONVERT_TO_14_BIT) {
            let _span = tracing::info_span!("convert_to_14_bit").entered();
            image = image.with_bits_per_pixel(14)?;
        }

        let highlight_map = if options.contains(FrameOptions::PRODUCE_HIGHLIGHT_MAP) {
            let _span = tracing::info_span!("encode_highlight_map").entered();
            let mut out = Vec::new();
            self.tiff_writer
                .write_highlight_map(&image, &mut out, &self.config)?;
            Some(out)
        } else {
            None
        };

        let dng = {
            let _span = tracing::info_span!("encode_dng").entered();
            self.dng_writer.write_dng(&image, &self.config)?
        };

        debug!(frame_number, bytes = dng.len(), "Frame converted");
        Ok(ProcessedFrame {
            frame_number,
            dng,
            highlight_map,
        })
    }

    /// Converts every frame of `input` into `output_dir`.
    pub fn convert_file<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input: P,
        output_dir: Q,
    ) -> Result<Vec<PathBuf>> {
        let file = MlvFile::open(input)?;
        let frames = 0..file.video_chunks().len();
        self.convert_frames(&file, frames, output_dir)
    }

    /// Writes frames `range` of an open recording as `<stem>_<frame:06>.dng`, plus
    /// `<stem>_<frame:06>_highlights.tif` when highlight maps are enabled. A frame that
    /// fails is logged and skipped.
    #[instrument(skip(self, file, output_dir), fields(path = %file.path().display()))]
    pub fn convert_frames<Q: AsRef<Path>>(
        &self,
        file: &MlvFile,
        range: Range<usize>,
        output_dir: Q,
    ) -> Result<Vec<PathBuf>> {
        let output_dir = output_dir.as_ref();
        {
            let _span = tracing::info_span!("create_output_dir").entered();
            std::fs::create_dir_all(output_dir).map_err(|e| {
                MlvError::FileError(format!("{}: {}", output_dir.display(), e))
            })?;
        }

        let stem = file
            .path()
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "frame".to_string());
        let end = range.end.min(file.video_chunks().len());
        let cache = FrameCache::new();
        let mut written = Vec::new();
        let mut failed = 0usize;

        for index in range.start..end {
            let frame = match self.process_frame(file, index, self.config.options, &cache) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(index, "Skipping frame: {}", e);
                    failed += 1;
                    continue;
                }
            };
            let name = format!("{}_{:06}", stem, frame.frame_number);
            let dng_path = output_dir.join(format!("{name}.dng"));
            std::fs::write(&dng_path, &frame.dng).map_err(|e| {
                MlvError::FileError(format!("{}: {}", dng_path.display(), e))
            })?;
            if let Some(map) = &frame.highlight_map {
                let map_path = output_dir.join(format!("{name}_highlights.tif"));
                std::fs::write(&map_path, map).map_err(|e| {
                    MlvError::FileError(format!("{}: {}", map_path.display(), e))
                })?;
            }
            written.push(dng_path);
        }

        info!(written = written.len(), failed, "Conversion complete");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mlv_pipeline::common::error::ErrorKind;
    use crate::mlv_pipeline::container::test_support::MlvBuilder;
    use tempfile::TempDir;

    fn recording(dir: &TempDir, frames: &[(u32, u16)]) -> PathBuf {
        let path = dir.path().join("M24-0915.MLV");
        let mut builder = MlvBuilder::new(16, 16, 14);
        for &(n, value) in frames {
            builder.video_frame(n, value);
        }
        builder.write(&path).unwrap();
        path
    }

    #[test]
    fn frame_converts_with_every_option() {
        let dir = TempDir::new().unwrap();
        let file = MlvFile::open(recording(&dir, &[(0, 3000), (1, 3100)])).unwrap();
        let tables = TempDir::new().unwrap();
        let config = ConversionConfig::builder()
            .preview(true)
            .focus_pixel_dir(Some(tables.path().to_path_buf()))
            .build();
        let pipeline = MlvToDngPipeline::new(config).unwrap();
        let cache = FrameCache::new();
        let options = FrameOptions::from_bits(0x1f).unwrap();

        let frame = pipeline.process_frame(&file, 1, options, &cache).unwrap();
        assert_eq!(frame.frame_number, 1);
        assert_eq!(&frame.dng[..4], b"II*\0");
        assert!(frame.highlight_map.is_some());
        assert!(cache.dead_pixels().is_some());
        assert!(cache.banding().is_some());
    }

    #[test]
    fn cached_dead_pixel_map_is_reused() {
        let dir = TempDir::new().unwrap();
        let file = MlvFile::open(recording(&dir, &[(0, 3000), (1, 3000)])).unwrap();
        let pipeline = MlvToDngPipeline::new(ConversionConfig::default()).unwrap();
        let cache = FrameCache::new();
        pipeline
            .process_frame(&file, 0, FrameOptions::FIX_DEAD_PIXELS, &cache)
            .unwrap();
        let first = cache.dead_pixels().unwrap();
        pipeline
            .process_frame(&file, 1, FrameOptions::FIX_DEAD_PIXELS, &cache)
            .unwrap();
        assert!(Arc::ptr_eq(&first, &cache.dead_pixels().unwrap()));
    }

    #[test]
    fn focus_fix_without_tables_is_rejected() {
        let dir = TempDir::new().unwrap();
        let file = MlvFile::open(recording(&dir, &[(0, 3000)])).unwrap();
        let pipeline = MlvToDngPipeline::new(ConversionConfig::default()).unwrap();
        let err = pipeline
            .process_frame(&file, 0, FrameOptions::FIX_FOCUS_PIXELS, &FrameCache::new())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn out_of_range_frame_fails_locally() {
        let dir = TempDir::new().unwrap();
        let file = MlvFile::open(recording(&dir, &[(0, 3000)])).unwrap();
        let pipeline = MlvToDngPipeline::new(ConversionConfig::default()).unwrap();
        let err = pipeline
            .process_frame(&file, 5, FrameOptions::NONE, &FrameCache::new())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn convert_file_names_frames_by_number() {
        let dir = TempDir::new().unwrap();
        let input = recording(&dir, &[(0, 3000), (1, 3000), (2, 3000)]);
        let out = dir.path().join("out");
        let config = ConversionConfig::builder()
            .options(FrameOptions::PRODUCE_HIGHLIGHT_MAP)
            .build();
        let written = MlvToDngPipeline::new(config)
            .unwrap()
            .convert_file(&input, &out)
            .unwrap();
        assert_eq!(written.len(), 3);
        assert!(out.join("M24-0915_000002.dng").is_file());
        assert!(out.join("M24-0915_000000_highlights.tif").is_file());
    }

    #[test]
    fn unreadable_focus_directory_fails_construction() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("80000331_1808x728.fpm")).unwrap();
        // a directory named like a table is skipped, not read
        let config = ConversionConfig::builder()
            .focus_pixel_dir(Some(dir.path().to_path_buf()))
            .build();
        assert!(MlvToDngPipeline::new(config).is_ok());

        std::fs::write(dir.path().join("80000346_1808x728.fpm"), "not a table\n").unwrap();
        let config = ConversionConfig::builder()
            .focus_pixel_dir(Some(dir.path().to_path_buf()))
            .build();
        assert!(MlvToDngPipeline::new(config).is_err());
    }
}
