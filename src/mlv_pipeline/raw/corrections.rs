//! In-place pixel corrections on the packed buffer
//!
//! Every pass reads and writes samples through [`PixelCodec`] so no unpacked copy of the
//! frame is made. Replacement values come from [`interpolate`]: the mean of the
//! same-color neighbors two pixels away.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::mlv_pipeline::codec::PixelCodec;
use crate::mlv_pipeline::common::error::{MlvError, Result};
use crate::mlv_pipeline::pixel_map::{Pixel, PixelMap};
use crate::mlv_pipeline::raw::image::{HIGHLIGHT_MARK, RawImage};

/// Neighbors this far below black are considered defective themselves.
pub const DEFECT_FLOOR: i32 = 500;

/// Minimum excess over the neighbor mean for a hot pixel, in 14-bit units.
const HOT_EXCESS_14BIT: i32 = 1500;

/// Rows skipped between the rows sampled by the statistics passes.
const SAMPLE_ROW_STEP: usize = 4;

/// Column period of the sensor readout channels.
pub const BANDING_PERIOD: usize = 8;

/// Mean of the up to 8 same-color neighbors of `(cx, cy)`.
///
/// Neighbors outside the image, below `black_level - DEFECT_FLOOR`, or listed in `skip`
/// are ignored; with no usable neighbor the result is 0.
pub(crate) fn interpolate(
    codec: &PixelCodec,
    buf: &[u8],
    black_level: i32,
    cx: usize,
    cy: usize,
    skip: Option<&HashSet<(i64, i64)>>,
) -> Result<u16> {
    let (width, height) = (codec.width() as i64, codec.height() as i64);
    let (cx, cy) = (cx as i64, cy as i64);
    let mut sum: i64 = 0;
    let mut count: i64 = 0;
    for y in [cy - 2, cy, cy + 2] {
        for x in [cx - 2, cx, cx + 2] {
            if x < 0 || y < 0 || x >= width || y >= height || (x == cx && y == cy) {
                continue;
            }
            if skip.is_some_and(|s| s.contains(&(x, y))) {
                continue;
            }
            let v = codec.get(buf, x as usize, y as usize)? as i32;
            if v < black_level - DEFECT_FLOOR {
                continue;
            }
            sum += v as i64;
            count += 1;
        }
    }
    Ok(if count > 0 { (sum / count) as u16 } else { 0 })
}

/// Scales a 14-bit threshold to another depth.
fn scale_from_14bit(value: i32, bits: u32) -> i32 {
    if bits >= 14 {
        value << (bits - 14)
    } else {
        value >> (14 - bits)
    }
}

/// Per-phase additive offsets that cancel vertical banding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandingCoefficients {
    offsets: [i32; BANDING_PERIOD],
}

impl BandingCoefficients {
    pub const BYTE_LEN: usize = BANDING_PERIOD * 4;

    pub fn new(offsets: [i32; BANDING_PERIOD]) -> Self {
        Self { offsets }
    }

    /// Offset added to every sample in columns with `x % 8 == phase`.
    pub fn offsets(&self) -> &[i32; BANDING_PERIOD] {
        &self.offsets
    }

    pub fn is_identity(&self) -> bool {
        self.offsets.iter().all(|&o| o == 0)
    }

    /// Opaque little-endian form for caching alongside a capture.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.offsets.iter().flat_map(|o| o.to_le_bytes()).collect()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::BYTE_LEN {
            return Err(MlvError::InvalidArgument(format!(
                "banding coefficients need {} bytes, got {}",
                Self::BYTE_LEN,
                bytes.len()
            )));
        }
        let mut offsets = [0i32; BANDING_PERIOD];
        for (offset, chunk) in offsets.iter_mut().zip(bytes.chunks_exact(4)) {
            *offset = i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Ok(Self { offsets })
    }
}

fn median(values: &mut [i32]) -> Option<i32> {
    if values.is_empty() {
        return None;
    }
    let mid = values.len() / 2;
    let (_, m, _) = values.select_nth_unstable(mid);
    Some(*m)
}

impl RawImage {
    /// Replaces every mapped site with the interpolated value of its unmapped neighbors.
    ///
    /// Sites outside the frame are ignored. Because mapped sites never feed each other,
    /// running the pass twice with the same map gives the same buffer as running it once.
    #[instrument(skip_all, fields(pixels = map.len()))]
    pub fn fix_dead_pixels(&mut self, map: &PixelMap) -> Result<()> {
        self.fix_sites(map.pixels().iter().map(|p| (p.x as i64, p.y as i64)))
    }

    /// Shared by the dead and focus pixel passes: sites are full-frame coordinates.
    pub(crate) fn fix_sites<I>(&mut self, sites: I) -> Result<()>
    where
        I: IntoIterator<Item = (i64, i64)>,
    {
        let codec = self.codec()?;
        let (width, height) = (codec.width() as i64, codec.height() as i64);
        let skip: HashSet<(i64, i64)> = sites
            .into_iter()
            .filter(|&(x, y)| x >= 0 && y >= 0 && x < width && y < height)
            .collect();
        if skip.is_empty() {
            return Ok(());
        }

        let (info, buffer, mut highlights) = self.parts();
        let black = info.black_level;
        let w = info.width;
        for &(x, y) in &skip {
            let (x, y) = (x as usize, y as usize);
            let value = interpolate(&codec, buffer, black, x, y, Some(&skip))?;
            codec.set(buffer, x, y, value)?;
            if let Some(map) = highlights.as_deref_mut() {
                map[y * w + x] = HIGHLIGHT_MARK;
            }
        }
        debug!("Interpolated {} sites", skip.len());
        Ok(())
    }

    /// Scans the frame for stuck-low and hot sites.
    ///
    /// A site is cold when it reads below `black_level - DEFECT_FLOOR`, hot when it exceeds
    /// its neighbor mean by more than 1500 (14-bit units) and by more than the neighbors'
    /// own signal above black. The result is meant to be cached and reused across frames.
    #[instrument(skip_all)]
    pub fn detect_dead_pixels(&self) -> Result<PixelMap> {
        let codec = self.codec()?;
        let info = self.info();
        let black = info.black_level;
        let hot_excess = scale_from_14bit(HOT_EXCESS_14BIT, info.bits_per_pixel);
        let mut map = PixelMap::new();
        for y in 0..info.height {
            for x in 0..info.width {
                let v = codec.get(self.buffer(), x, y)? as i32;
                if v < black - DEFECT_FLOOR {
                    map.add(Pixel::new(x as i32, y as i32));
                    continue;
                }
                let neighbors = interpolate(&codec, self.buffer(), black, x, y, None)? as i32;
                let signal = (neighbors - black).max(0);
                if v - neighbors > hot_excess && v - black > 2 * signal {
                    map.add(Pixel::new(x as i32, y as i32));
                }
            }
        }
        debug!("Detected {} defective pixels", map.len());
        Ok(map)
    }

    /// Estimates the saturation level from the data.
    ///
    /// Builds a histogram over every fourth row and returns the highest value that forms
    /// a clipping plateau: it occurs at least `max(4, samples / 20000)` times and at least
    /// four times as often as the average of the 32 values below it. Falls back to the
    /// declared white level when no plateau above black exists.
    pub fn calculated_white_level(&self) -> Result<u32> {
        let codec = self.codec()?;
        let info = self.info();
        let mut histogram = vec![0u32; codec.max_sample() as usize + 1];
        let mut row = vec![0u16; info.width];
        let mut samples = 0usize;
        for y in (0..info.height).step_by(SAMPLE_ROW_STEP) {
            codec.unpack_row(self.buffer(), y, &mut row)?;
            for &v in &row {
                histogram[v as usize] += 1;
            }
            samples += row.len();
        }

        let threshold = (samples / 20000).max(4) as u32;
        let black = info.black_level.max(0) as usize;
        let declared = info.white_level.max(0) as u32;
        for v in (black + 1..histogram.len()).rev() {
            let count = histogram[v];
            if count < threshold {
                continue;
            }
            let lower = v.saturating_sub(32).max(black)..v;
            let span = lower.len().max(1) as u64;
            let below: u64 = histogram[lower].iter().map(|&c| c as u64).sum();
            if count as u64 * span >= 4 * below.max(1) {
                return Ok(v as u32);
            }
            break;
        }
        Ok(declared)
    }

    /// Computes one offset per column phase from the sample statistics of this frame.
    ///
    /// In every fourth row each 8-column block with all samples strictly between black and
    /// white contributes, per column, the difference to the mean of the same-color columns
    /// of its block. The median difference per phase, negated, is the offset. `None` when
    /// no block qualified.
    #[instrument(skip_all)]
    pub fn find_vertical_banding_coefficients(&self) -> Result<Option<BandingCoefficients>> {
        let codec = self.codec()?;
        let info = self.info();
        let (black, white) = (info.black_level, info.white_level);
        let blocks = info.width / BANDING_PERIOD;
        let mut deltas: [Vec<i32>; BANDING_PERIOD] = Default::default();
        let mut row = vec![0u16; info.width];

        for y in (0..info.height).step_by(SAMPLE_ROW_STEP) {
            codec.unpack_row(self.buffer(), y, &mut row)?;
            for block in row.chunks_exact(BANDING_PERIOD).take(blocks) {
                if block.iter().any(|&v| (v as i32) <= black || (v as i32) >= white) {
                    continue;
                }
                let parity_sum = |p: usize| -> i32 {
                    (p..BANDING_PERIOD).step_by(2).map(|i| block[i] as i32).sum()
                };
                let sums = [parity_sum(0), parity_sum(1)];
                for (phase, &v) in block.iter().enumerate() {
                    // four same-parity columns per block: compare 4*v with their sum
                    deltas[phase].push(4 * v as i32 - sums[phase % 2]);
                }
            }
        }

        if deltas[0].is_empty() {
            debug!("No usable blocks for banding statistics");
            return Ok(None);
        }
        let mut offsets = [0i32; BANDING_PERIOD];
        for (offset, phase_deltas) in offsets.iter_mut().zip(deltas.iter_mut()) {
            let m = median(phase_deltas).unwrap_or(0);
            *offset = -((m as f64 / 4.0).round() as i32);
        }
        debug!(?offsets, "Vertical banding coefficients");
        Ok(Some(BandingCoefficients::new(offsets)))
    }

    /// Applies banding offsets to every row, clamping to the valid sample range.
    ///
    /// With `None`, coefficients are computed from this frame first. Returns the
    /// coefficients that were applied so callers can reuse them for later frames.
    #[instrument(skip_all)]
    pub fn fix_vertical_banding(
        &mut self,
        coefficients: Option<&BandingCoefficients>,
    ) -> Result<Option<BandingCoefficients>> {
        let coefficients = match coefficients {
            Some(c) => *c,
            None => match self.find_vertical_banding_coefficients()? {
                Some(c) => c,
                None => return Ok(None),
            },
        };
        if coefficients.is_identity() {
            return Ok(Some(coefficients));
        }

        let codec = self.codec()?;
        let max = codec.max_sample() as i32;
        let (info, buffer, _) = self.parts();
        let (width, height) = (info.width, info.height);
        let offsets = coefficients.offsets();
        for y in 0..height {
            for x in 0..width {
                let offset = offsets[x % BANDING_PERIOD];
                if offset == 0 {
                    continue;
                }
                let v = codec.get(buffer, x, y)? as i32;
                codec.set(buffer, x, y, (v + offset).clamp(0, max) as u16)?;
            }
        }
        Ok(Some(coefficients))
    }
}
