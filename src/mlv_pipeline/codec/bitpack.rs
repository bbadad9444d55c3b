//! Bit-packed sample access for 10, 12 and 14-bit raw buffers.
//!
//! The camera stores each row as a sequence of blocks of 8 samples. A block is `bits`
//! bytes long and is read as little-endian 16-bit words; inside the words the samples form
//! an MSB-first bit stream, so a sample may straddle two words. The split points per depth
//! (sample letters `a..h`, `w0..w6` the block's words, `[hi:lo]` bit ranges):
//!
//! ```text
//! 14 bit: a=w0[15:2]  b=w0[1:0]w1[15:4]  c=w1[3:0]w2[15:6]  d=w2[5:0]w3[15:8]
//!         e=w3[7:0]w4[15:10]  f=w4[9:0]w5[15:12]  g=w5[11:0]w6[15:14]  h=w6[13:0]
//! 12 bit: a=w0[15:4]  b=w0[3:0]w1[15:8]  c=w1[7:0]w2[15:12]  d=w2[11:0]
//!         e=w3[15:4]  f=w3[3:0]w4[15:8]  g=w4[7:0]w5[15:12]  h=w5[11:0]
//! 10 bit: a=w0[15:6]  b=w0[5:0]w1[15:12]  c=w1[11:2]  d=w1[1:0]w2[15:8]
//!         e=w2[7:0]w3[15:14]  f=w3[13:4]  g=w3[3:0]w4[15:10]  h=w4[9:0]
//! ```
//!
//! The high part always comes from the first word. 8-bit buffers hold one byte per sample
//! and 16-bit buffers one little-endian word per sample.

use crate::mlv_pipeline::common::error::{MlvError, Result};
use crate::mlv_pipeline::raw::types::RawInfo;

/// Where one sample of a block lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Slot {
    /// Index of the first word inside the block
    word: u8,
    /// Bit offset from the MSB of the first word
    offset: u8,
    /// Bits taken from the first word (the high part)
    hi: u8,
    /// Bits taken from the following word (the low part), 0 if none
    lo: u8,
}

const fn layout(bits: u32) -> [Slot; 8] {
    let mut slots = [Slot {
        word: 0,
        offset: 0,
        hi: 0,
        lo: 0,
    }; 8];
    let mut k = 0;
    while k < 8 {
        let start = k as u32 * bits;
        let offset = start % 16;
        let available = 16 - offset;
        let (hi, lo) = if bits <= available {
            (bits, 0)
        } else {
            (available, bits - available)
        };
        slots[k] = Slot {
            word: (start / 16) as u8,
            offset: offset as u8,
            hi: hi as u8,
            lo: lo as u8,
        };
        k += 1;
    }
    slots
}

const LAYOUT_10: [Slot; 8] = layout(10);
const LAYOUT_12: [Slot; 8] = layout(12);
const LAYOUT_14: [Slot; 8] = layout(14);

/// Sample depths the codec can address.
pub const SUPPORTED_BITS: [u32; 5] = [8, 10, 12, 14, 16];

pub fn is_supported_depth(bits: u32) -> bool {
    SUPPORTED_BITS.contains(&bits)
}

/// Packed rows are made of whole 8-sample blocks, so 10, 12 and 14-bit widths must be a
/// multiple of 8. Otherwise the last block of a row would run into the next row.
pub fn check_row_width(width: usize, bits: u32) -> Result<()> {
    if matches!(bits, 10 | 12 | 14) && width % 8 != 0 {
        return Err(MlvError::InvalidArgument(format!(
            "width {} is not a multiple of 8 at {} bits",
            width, bits
        )));
    }
    Ok(())
}

#[inline]
fn mask(bits: u8) -> u16 {
    ((1u32 << bits) - 1) as u16
}

#[inline]
fn read_word(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

#[inline]
fn write_word(buf: &mut [u8], at: usize, word: u16) {
    buf[at..at + 2].copy_from_slice(&word.to_le_bytes());
}

#[derive(Debug, Clone, Copy)]
enum Packing {
    Byte,
    Word,
    Packed(&'static [Slot; 8]),
}

/// Random access to the samples of one packed buffer geometry.
#[derive(Debug, Clone, Copy)]
pub struct PixelCodec {
    width: usize,
    height: usize,
    pitch: usize,
    bits: u32,
    packing: Packing,
}

impl PixelCodec {
    pub fn new(info: &RawInfo) -> Result<Self> {
        let packing = match info.bits_per_pixel {
            8 => Packing::Byte,
            16 => Packing::Word,
            10 => Packing::Packed(&LAYOUT_10),
            12 => Packing::Packed(&LAYOUT_12),
            14 => Packing::Packed(&LAYOUT_14),
            bits => {
                return Err(MlvError::InvalidArgument(format!(
                    "unsupported bit depth {}",
                    bits
                )));
            }
        };
        check_row_width(info.width, info.bits_per_pixel)?;
        let min_pitch = RawInfo::pitch_for(info.width, info.bits_per_pixel);
        if info.pitch < min_pitch {
            return Err(MlvError::InvalidArgument(format!(
                "pitch {} too small for {} samples at {} bits ({} bytes)",
                info.pitch, info.width, info.bits_per_pixel, min_pitch
            )));
        }
        Ok(Self {
            width: info.width,
            height: info.height,
            pitch: info.pitch,
            bits: info.bits_per_pixel,
            packing,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    pub fn max_sample(&self) -> u16 {
        ((1u32 << self.bits) - 1) as u16
    }

    /// Byte range `[start, end)` touched by sample `(x, y)`.
    fn span(&self, x: usize, y: usize) -> (usize, usize, Option<Slot>) {
        let row = y * self.pitch;
        match self.packing {
            Packing::Byte => (row + x, row + x + 1, None),
            Packing::Word => (row + 2 * x, row + 2 * x + 2, None),
            Packing::Packed(slots) => {
                let slot = slots[x % 8];
                let start = row + (x / 8) * self.bits as usize + 2 * slot.word as usize;
                let words = if slot.lo > 0 { 2 } else { 1 };
                (start, start + 2 * words, Some(slot))
            }
        }
    }

    fn check(&self, buf_len: usize, x: usize, y: usize) -> Result<(usize, Option<Slot>)> {
        if x >= self.width || y >= self.height {
            return Err(MlvError::InvalidArgument(format!(
                "pixel ({}, {}) outside {}x{} image",
                x, y, self.width, self.height
            )));
        }
        let (start, end, slot) = self.span(x, y);
        if end > buf_len {
            return Err(MlvError::InvalidArgument(format!(
                "pixel ({}, {}) needs bytes up to {} but buffer holds {}",
                x, y, end, buf_len
            )));
        }
        Ok((start, slot))
    }

    /// Reads the full-width sample at `(x, y)`.
    pub fn get(&self, buf: &[u8], x: usize, y: usize) -> Result<u16> {
        let (at, slot) = self.check(buf.len(), x, y)?;
        Ok(match (self.packing, slot) {
            (Packing::Byte, _) => buf[at] as u16,
            (Packing::Word, _) => read_word(buf, at),
            (Packing::Packed(_), Some(slot)) => {
                let w0 = read_word(buf, at);
                if slot.lo == 0 {
                    (w0 >> (16 - slot.offset - slot.hi)) & mask(slot.hi)
                } else {
                    let w1 = read_word(buf, at + 2);
                    ((w0 & mask(slot.hi)) << slot.lo) | (w1 >> (16 - slot.lo))
                }
            }
            (Packing::Packed(_), None) => unreachable!("packed span always has a slot"),
        })
    }

    /// Writes `value` (masked to the sample depth) at `(x, y)`, leaving the neighbors that
    /// share its words untouched.
    pub fn set(&self, buf: &mut [u8], x: usize, y: usize, value: u16) -> Result<()> {
        let (at, slot) = self.check(buf.len(), x, y)?;
        let value = value & self.max_sample();
        match (self.packing, slot) {
            (Packing::Byte, _) => buf[at] = value as u8,
            (Packing::Word, _) => write_word(buf, at, value),
            (Packing::Packed(_), Some(slot)) => {
                let w0 = read_word(buf, at);
                if slot.lo == 0 {
                    let shift = 16 - slot.offset - slot.hi;
                    let m = mask(slot.hi) << shift;
                    write_word(buf, at, (w0 & !m) | (value << shift));
                } else {
                    let w1 = read_word(buf, at + 2);
                    let lo_shift = 16 - slot.lo;
                    write_word(buf, at, (w0 & !mask(slot.hi)) | (value >> slot.lo));
                    write_word(
                        buf,
                        at + 2,
                        (w1 & !(mask(slot.lo) << lo_shift)) | ((value & mask(slot.lo)) << lo_shift),
                    );
                }
            }
            (Packing::Packed(_), None) => unreachable!("packed span always has a slot"),
        }
        Ok(())
    }

    /// Unpacks one row into `out` (`out.len()` must be at least the width).
    pub fn unpack_row(&self, buf: &[u8], y: usize, out: &mut [u16]) -> Result<()> {
        if out.len() < self.width {
            return Err(MlvError::InvalidArgument(format!(
                "row buffer of {} samples for width {}",
                out.len(),
                self.width
            )));
        }
        for (x, sample) in out.iter_mut().take(self.width).enumerate() {
            *sample = self.get(buf, x, y)?;
        }
        Ok(())
    }

    /// Unpacks the whole buffer into row-major samples.
    pub fn unpack(&self, buf: &[u8]) -> Result<Vec<u16>> {
        let mut samples = vec![0u16; self.width * self.height];
        if self.width == 0 {
            return Ok(samples);
        }
        for (y, row) in samples.chunks_exact_mut(self.width).enumerate() {
            self.unpack_row(buf, y, row)?;
        }
        Ok(samples)
    }

    /// Packs row-major `samples` into `buf`.
    pub fn pack(&self, samples: &[u16], buf: &mut [u8]) -> Result<()> {
        if samples.len() != self.width * self.height {
            return Err(MlvError::InvalidArgument(format!(
                "{} samples for a {}x{} image",
                samples.len(),
                self.width,
                self.height
            )));
        }
        for y in 0..self.height {
            for x in 0..self.width {
                self.set(buf, x, y, samples[y * self.width + x])?;
            }
        }
        Ok(())
    }
}

/// Reads one sample; see [`PixelCodec::get`].
pub fn get_pixel(info: &RawInfo, buf: &[u8], x: usize, y: usize) -> Result<u16> {
    PixelCodec::new(info)?.get(buf, x, y)
}

/// Writes one sample; see [`PixelCodec::set`].
pub fn set_pixel(info: &RawInfo, buf: &mut [u8], x: usize, y: usize, value: u16) -> Result<()> {
    PixelCodec::new(info)?.set(buf, x, y, value)
}
