//! Small 8-bit RGB thumbnail for the DNG's first IFD

use std::io::Cursor;

use bayer::{BayerDepth, CFA, Demosaic, RasterDepth, RasterMut};
use tracing::debug;

use crate::mlv_pipeline::common::error::{MlvError, Result};
use crate::mlv_pipeline::raw::image::RawImage;

/// Widest preview produced, in pixels.
pub const MAX_PREVIEW_WIDTH: usize = 256;

/// Stops of scene range shown between black and white.
const DISPLAY_STOPS: f64 = 12.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    pub width: usize,
    pub height: usize,
    /// Interleaved RGB, 3 bytes per pixel.
    pub rgb: Vec<u8>,
}

/// Even sampling stride keeping at most `MAX_PREVIEW_WIDTH / 2` 2x2 cells per row.
pub fn preview_stride(width: usize) -> usize {
    let cells = MAX_PREVIEW_WIDTH / 2;
    let stride = width.div_ceil(cells).max(2);
    stride + (stride & 1)
}

/// Maps a linear fraction of the white level onto the log display curve.
fn display_curve(x: f64) -> u8 {
    let floor = (-DISPLAY_STOPS).exp2();
    let y = ((x.max(floor).log2() + DISPLAY_STOPS) / DISPLAY_STOPS).clamp(0.0, 1.0);
    (y * 255.0).round() as u8
}

fn cfa_layout(pattern: [u8; 4]) -> CFA {
    match pattern {
        [2, 1, 1, 0] => CFA::BGGR,
        [1, 0, 2, 1] => CFA::GRBG,
        [1, 2, 0, 1] => CFA::GBRG,
        _ => CFA::RGGB,
    }
}

/// Builds the preview, or `None` when the frame is too small to hold one 2x2 cell.
pub fn render_preview(image: &RawImage) -> Result<Option<Preview>> {
    let info = image.info();
    let stride = preview_stride(info.width);
    let cells_x = info.width / stride;
    let cells_y = info.height / stride;
    if cells_x == 0 || cells_y == 0 {
        return Ok(None);
    }
    let (width, height) = (cells_x * 2, cells_y * 2);
    debug!(
        "Rendering {}x{} preview at stride {} from {}x{}",
        width, height, stride, info.width, info.height
    );

    let black = info.black_level as f64;
    let range = (info.white_level as f64 - black).max(1.0);
    let pattern = info.cfa_pattern.to_le_bytes();
    let wb = image.metadata.white_balance;
    let green = wb.green.to_f64().filter(|g| *g > 0.0).unwrap_or(1.0);
    let gain = |color: u8| -> f64 {
        let g = match color {
            0 => wb.red.to_f64(),
            2 => wb.blue.to_f64(),
            _ => Some(green),
        };
        g.filter(|g| *g > 0.0).map_or(1.0, |g| g / green)
    };
    let gains = pattern.map(gain);

    let mut mosaic = vec![0u8; width * height];
    for y in 0..height {
        let src_y = (y / 2) * stride + (y & 1);
        for x in 0..width {
            let src_x = (x / 2) * stride + (x & 1);
            let v = image.get_pixel(src_x, src_y)? as f64;
            let phase = (y & 1) * 2 + (x & 1);
            mosaic[y * width + x] = display_curve((v - black) / range * gains[phase]);
        }
    }

    let mut rgb = vec![0u8; width * height * 3];
    let mut cursor = Cursor::new(&mosaic[..]);
    let mut raster = RasterMut::new(width, height, RasterDepth::Depth8, &mut rgb);
    bayer::run_demosaic(
        &mut cursor,
        BayerDepth::Depth8,
        cfa_layout(pattern),
        Demosaic::Linear,
        &mut raster,
    )
    .map_err(|e| MlvError::EncodeError(format!("Demosaic failed: {:?}", e)))?;

    Ok(Some(Preview { width, height, rgb }))
}
