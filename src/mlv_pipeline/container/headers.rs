//! Typed metadata chunk payloads
//!
//! Every payload is little-endian and packed. Decoders read only the documented prefix, so
//! newer firmware appending fields stays readable.

use std::io::{self, Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::mlv_pipeline::common::types::{Rational, WhiteBalance};
use crate::mlv_pipeline::container::chunk::ChunkTag;
use crate::mlv_pipeline::raw::types::RawInfo;

type Reader<'a> = Cursor<&'a [u8]>;

fn fixed_string<const N: usize>(r: &mut Reader<'_>) -> io::Result<String> {
    let mut bytes = [0u8; N];
    r.read_exact(&mut bytes)?;
    Ok(trim_nul(&bytes))
}

fn trim_nul(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).trim().to_string()
}

/// MLVI file flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FileFlags(pub u32);

impl FileFlags {
    pub const OUT_OF_ORDER: u32 = 1;
    pub const DROPPED_FRAMES: u32 = 2;
    pub const SINGLE_IMAGE: u32 = 4;
    pub const STOPPED: u32 = 8;

    pub fn contains(self, flag: u32) -> bool {
        self.0 & flag != 0
    }
}

pub const VIDEO_CLASS_RAW: u16 = 0x01;
pub const VIDEO_CLASS_FLAG_LZMA: u16 = 0x80;
pub const VIDEO_CLASS_FLAG_DELTA: u16 = 0x40;
pub const VIDEO_CLASS_FLAG_LJ92: u16 = 0x20;

/// MLVI payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHeader {
    pub version: String,
    pub guid: u64,
    pub file_num: u16,
    pub file_count: u16,
    pub flags: FileFlags,
    pub video_class: u16,
    pub audio_class: u16,
    pub video_frames: u32,
    pub audio_frames: u32,
    pub fps_nom: u32,
    pub fps_denom: u32,
}

impl FileHeader {
    fn parse(r: &mut Reader<'_>) -> io::Result<Self> {
        Ok(Self {
            version: fixed_string::<8>(r)?,
            guid: r.read_u64::<LittleEndian>()?,
            file_num: r.read_u16::<LittleEndian>()?,
            file_count: r.read_u16::<LittleEndian>()?,
            flags: FileFlags(r.read_u32::<LittleEndian>()?),
            video_class: r.read_u16::<LittleEndian>()?,
            audio_class: r.read_u16::<LittleEndian>()?,
            video_frames: r.read_u32::<LittleEndian>()?,
            audio_frames: r.read_u32::<LittleEndian>()?,
            fps_nom: r.read_u32::<LittleEndian>()?,
            fps_denom: r.read_u32::<LittleEndian>()?,
        })
    }

    pub fn frame_rate(&self) -> Rational {
        if self.fps_denom == 0 {
            return Rational::ZERO;
        }
        Rational::from_u64(self.fps_nom as u64, self.fps_denom as u64)
    }

    /// Seconds per frame, 0 when the rate is unset.
    pub fn frame_time(&self) -> f64 {
        if self.fps_nom == 0 {
            return 0.0;
        }
        self.fps_denom as f64 / self.fps_nom as f64
    }

    pub fn is_compressed(&self) -> bool {
        self.video_class & (VIDEO_CLASS_FLAG_LZMA | VIDEO_CLASS_FLAG_LJ92) != 0
    }

    pub fn compression_label(&self) -> &'static str {
        if self.video_class & VIDEO_CLASS_FLAG_LJ92 != 0 {
            "Lossless JPEG"
        } else if self.video_class & VIDEO_CLASS_FLAG_LZMA != 0 {
            "LZMA"
        } else {
            "Uncompressed"
        }
    }
}

/// RAWI payload: frame resolution plus the camera's raw buffer descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawInfoHeader {
    pub x_res: u16,
    pub y_res: u16,
    /// Descriptor of the full raw buffer the frame was cut from.
    pub raw_info: RawInfo,
}

impl RawInfoHeader {
    fn parse(r: &mut Reader<'_>) -> io::Result<Self> {
        let x_res = r.read_u16::<LittleEndian>()?;
        let y_res = r.read_u16::<LittleEndian>()?;
        let mut i32s = |n: usize| -> io::Result<Vec<i32>> {
            (0..n).map(|_| r.read_i32::<LittleEndian>()).collect()
        };
        let head = i32s(9)?;
        let crop = i32s(4)?;
        let active = i32s(4)?;
        let bias = i32s(2)?;
        let tail = i32s(2)?;
        let matrix = i32s(18)?;
        let dynamic_range = i32s(1)?;

        let dim = |v: i32| v.max(0) as usize;
        let raw_info = RawInfo {
            api_version: head[0] as u32,
            height: dim(head[2]),
            width: dim(head[3]),
            pitch: dim(head[4]),
            frame_size: dim(head[5]),
            bits_per_pixel: head[6].max(0) as u32,
            black_level: head[7],
            white_level: head[8],
            crop_origin: [crop[0], crop[1]],
            crop_size: [crop[2], crop[3]],
            active_area: [active[0], active[1], active[2], active[3]],
            exposure_bias: [bias[0], bias[1]],
            cfa_pattern: tail[0],
            calibration_illuminant1: tail[1],
            color_matrix1: std::array::from_fn(|i| matrix[i]),
            dynamic_range: dynamic_range[0],
        };
        Ok(Self {
            x_res,
            y_res,
            raw_info,
        })
    }

    /// Descriptor of one recorded frame: the buffer cropped to `x_res` x `y_res`.
    pub fn frame_info(&self) -> RawInfo {
        self.raw_info
            .cropped_to(self.x_res as usize, self.y_res as usize)
    }
}

/// RAWC payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCaptureHeader {
    pub sensor_res_x: u16,
    pub sensor_res_y: u16,
    pub sensor_crop: u16,
    pub binning_x: u8,
    pub skipping_x: u8,
    pub binning_y: u8,
    pub skipping_y: u8,
    pub offset_x: i16,
    pub offset_y: i16,
}

impl RawCaptureHeader {
    fn parse(r: &mut Reader<'_>) -> io::Result<Self> {
        let sensor_res_x = r.read_u16::<LittleEndian>()?;
        let sensor_res_y = r.read_u16::<LittleEndian>()?;
        let sensor_crop = r.read_u16::<LittleEndian>()?;
        let _reserved = r.read_u16::<LittleEndian>()?;
        Ok(Self {
            sensor_res_x,
            sensor_res_y,
            sensor_crop,
            binning_x: r.read_u8()?,
            skipping_x: r.read_u8()?,
            binning_y: r.read_u8()?,
            skipping_y: r.read_u8()?,
            offset_x: r.read_i16::<LittleEndian>()?,
            offset_y: r.read_i16::<LittleEndian>()?,
        })
    }
}

/// LENS payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LensHeader {
    /// Millimetres
    pub focal_length: u16,
    /// Millimetres
    pub focal_dist: u16,
    /// f-number x 100
    pub aperture: u16,
    pub stabilizer: u8,
    pub autofocus: u8,
    pub flags: u32,
    pub lens_id: u32,
    pub name: String,
    pub serial: String,
}

impl LensHeader {
    fn parse(r: &mut Reader<'_>) -> io::Result<Self> {
        Ok(Self {
            focal_length: r.read_u16::<LittleEndian>()?,
            focal_dist: r.read_u16::<LittleEndian>()?,
            aperture: r.read_u16::<LittleEndian>()?,
            stabilizer: r.read_u8()?,
            autofocus: r.read_u8()?,
            flags: r.read_u32::<LittleEndian>()?,
            lens_id: r.read_u32::<LittleEndian>()?,
            name: fixed_string::<32>(r)?,
            serial: fixed_string::<32>(r)?,
        })
    }

    pub fn aperture(&self) -> Rational {
        Rational::from_u64(self.aperture as u64, 100)
    }
}

/// EXPO payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExposureHeader {
    pub iso_mode: u32,
    pub iso_value: u32,
    pub iso_analog: u32,
    pub digital_gain: u32,
    /// Microseconds
    pub shutter_us: u64,
}

impl ExposureHeader {
    fn parse(r: &mut Reader<'_>) -> io::Result<Self> {
        Ok(Self {
            iso_mode: r.read_u32::<LittleEndian>()?,
            iso_value: r.read_u32::<LittleEndian>()?,
            iso_analog: r.read_u32::<LittleEndian>()?,
            digital_gain: r.read_u32::<LittleEndian>()?,
            shutter_us: r.read_u64::<LittleEndian>()?,
        })
    }

    /// Exposure time in seconds.
    pub fn shutter(&self) -> Rational {
        Rational::from_u64(self.shutter_us, 1_000_000)
    }
}

/// IDNT payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentHeader {
    pub camera_name: String,
    pub camera_model: u32,
    pub camera_serial: String,
}

impl IdentHeader {
    fn parse(r: &mut Reader<'_>) -> io::Result<Self> {
        Ok(Self {
            camera_name: fixed_string::<32>(r)?,
            camera_model: r.read_u32::<LittleEndian>()?,
            camera_serial: fixed_string::<32>(r)?,
        })
    }
}

/// WBAL payload. Gains are in 1/1024 units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhiteBalanceHeader {
    pub wb_mode: u32,
    pub kelvin: u32,
    pub gain_r: u32,
    pub gain_g: u32,
    pub gain_b: u32,
    pub shift_gm: u32,
    pub shift_ba: u32,
}

impl WhiteBalanceHeader {
    fn parse(r: &mut Reader<'_>) -> io::Result<Self> {
        Ok(Self {
            wb_mode: r.read_u32::<LittleEndian>()?,
            kelvin: r.read_u32::<LittleEndian>()?,
            gain_r: r.read_u32::<LittleEndian>()?,
            gain_g: r.read_u32::<LittleEndian>()?,
            gain_b: r.read_u32::<LittleEndian>()?,
            shift_gm: r.read_u32::<LittleEndian>()?,
            shift_ba: r.read_u32::<LittleEndian>()?,
        })
    }

    pub fn white_balance(&self) -> WhiteBalance {
        let gain = |g: u32| {
            if g == 0 {
                Rational::ONE
            } else {
                Rational::from_u64(g as u64, 1024)
            }
        };
        WhiteBalance {
            red: gain(self.gain_r),
            green: gain(self.gain_g),
            blue: gain(self.gain_b),
        }
    }
}

/// WAVI payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WavInfoHeader {
    pub format: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub bytes_per_second: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
}

impl WavInfoHeader {
    fn parse(r: &mut Reader<'_>) -> io::Result<Self> {
        Ok(Self {
            format: r.read_u16::<LittleEndian>()?,
            channels: r.read_u16::<LittleEndian>()?,
            sample_rate: r.read_u32::<LittleEndian>()?,
            bytes_per_second: r.read_u32::<LittleEndian>()?,
            block_align: r.read_u16::<LittleEndian>()?,
            bits_per_sample: r.read_u16::<LittleEndian>()?,
        })
    }
}

/// RTCI payload, a C `struct tm` snapshot taken when recording started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RtcHeader {
    pub sec: u16,
    pub min: u16,
    pub hour: u16,
    pub mday: u16,
    /// 0-11
    pub mon: u16,
    /// Years since 1900
    pub year: u16,
    pub wday: u16,
    pub yday: u16,
    pub isdst: u16,
    pub gmtoff: u16,
    pub zone: String,
}

impl RtcHeader {
    fn parse(r: &mut Reader<'_>) -> io::Result<Self> {
        let mut fields = [0u16; 10];
        r.read_u16_into::<LittleEndian>(&mut fields)?;
        let [sec, min, hour, mday, mon, year, wday, yday, isdst, gmtoff] = fields;
        Ok(Self {
            sec,
            min,
            hour,
            mday,
            mon,
            year,
            wday,
            yday,
            isdst,
            gmtoff,
            zone: fixed_string::<8>(r)?,
        })
    }

    pub fn to_datetime(&self) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(1900 + self.year as i32, self.mon as u32 + 1, self.mday as u32)?
            .and_hms_opt(self.hour as u32, self.min as u32, self.sec.min(59) as u32)
    }
}

/// STYL payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleHeader {
    pub style_id: u32,
    pub contrast: i32,
    pub sharpness: i32,
    pub saturation: i32,
    pub color_tone: i32,
    pub name: String,
}

impl StyleHeader {
    fn parse(r: &mut Reader<'_>) -> io::Result<Self> {
        Ok(Self {
            style_id: r.read_u32::<LittleEndian>()?,
            contrast: r.read_i32::<LittleEndian>()?,
            sharpness: r.read_i32::<LittleEndian>()?,
            saturation: r.read_i32::<LittleEndian>()?,
            color_tone: r.read_i32::<LittleEndian>()?,
            name: fixed_string::<16>(r)?,
        })
    }
}

/// ELVL payload, hundredths of a degree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelHeader {
    pub roll: u32,
    pub pitch: u32,
}

/// MARK payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerHeader {
    pub marker_type: u32,
}

/// A decoded metadata chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeaderChunk {
    File(FileHeader),
    RawInfo(RawInfoHeader),
    RawCapture(RawCaptureHeader),
    Lens(LensHeader),
    Exposure(ExposureHeader),
    Ident(IdentHeader),
    WhiteBalance(WhiteBalanceHeader),
    WavInfo(WavInfoHeader),
    Rtc(RtcHeader),
    Style(StyleHeader),
    Level(LevelHeader),
    Marker(MarkerHeader),
    Info(String),
}

impl HeaderChunk {
    /// Decodes the payload (bytes after the chunk header) of a metadata chunk.
    /// Returns `None` for tags that carry no metadata.
    pub fn decode(tag: ChunkTag, payload: &[u8]) -> io::Result<Option<Self>> {
        let r = &mut Cursor::new(payload);
        let chunk = match tag {
            ChunkTag::FileHeader => HeaderChunk::File(FileHeader::parse(r)?),
            ChunkTag::RawInfo => HeaderChunk::RawInfo(RawInfoHeader::parse(r)?),
            ChunkTag::RawCapture => HeaderChunk::RawCapture(RawCaptureHeader::parse(r)?),
            ChunkTag::Lens => HeaderChunk::Lens(LensHeader::parse(r)?),
            ChunkTag::Exposure => HeaderChunk::Exposure(ExposureHeader::parse(r)?),
            ChunkTag::Identification => HeaderChunk::Ident(IdentHeader::parse(r)?),
            ChunkTag::WhiteBalance => HeaderChunk::WhiteBalance(WhiteBalanceHeader::parse(r)?),
            ChunkTag::WavInfo => HeaderChunk::WavInfo(WavInfoHeader::parse(r)?),
            ChunkTag::RealTimeClock => HeaderChunk::Rtc(RtcHeader::parse(r)?),
            ChunkTag::Style => HeaderChunk::Style(StyleHeader::parse(r)?),
            ChunkTag::ElectronicLevel => HeaderChunk::Level(LevelHeader {
                roll: r.read_u32::<LittleEndian>()?,
                pitch: r.read_u32::<LittleEndian>()?,
            }),
            ChunkTag::Marker => HeaderChunk::Marker(MarkerHeader {
                marker_type: r.read_u32::<LittleEndian>()?,
            }),
            ChunkTag::Info => HeaderChunk::Info(trim_nul(payload)),
            ChunkTag::Video
            | ChunkTag::Audio
            | ChunkTag::Null
            | ChunkTag::Backup
            | ChunkTag::Unknown(_) => return Ok(None),
        };
        Ok(Some(chunk))
    }
}

/// Metadata of one capture, first occurrence of each chunk type wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Headers {
    pub file: Option<FileHeader>,
    pub raw_info: Option<RawInfoHeader>,
    pub raw_capture: Option<RawCaptureHeader>,
    pub lens: Option<LensHeader>,
    pub exposure: Option<ExposureHeader>,
    pub ident: Option<IdentHeader>,
    pub white_balance: Option<WhiteBalanceHeader>,
    pub wav_info: Option<WavInfoHeader>,
    pub rtc: Option<RtcHeader>,
    pub style: Option<StyleHeader>,
    pub level: Option<LevelHeader>,
    pub markers: Vec<MarkerHeader>,
    pub info: Vec<String>,
}

impl Headers {
    pub fn absorb(&mut self, chunk: HeaderChunk) {
        fn keep_first<T>(slot: &mut Option<T>, value: T) {
            if slot.is_none() {
                *slot = Some(value);
            }
        }
        match chunk {
            HeaderChunk::File(h) => keep_first(&mut self.file, h),
            HeaderChunk::RawInfo(h) => keep_first(&mut self.raw_info, h),
            HeaderChunk::RawCapture(h) => keep_first(&mut self.raw_capture, h),
            HeaderChunk::Lens(h) => keep_first(&mut self.lens, h),
            HeaderChunk::Exposure(h) => keep_first(&mut self.exposure, h),
            HeaderChunk::Ident(h) => keep_first(&mut self.ident, h),
            HeaderChunk::WhiteBalance(h) => keep_first(&mut self.white_balance, h),
            HeaderChunk::WavInfo(h) => keep_first(&mut self.wav_info, h),
            HeaderChunk::Rtc(h) => keep_first(&mut self.rtc, h),
            HeaderChunk::Style(h) => keep_first(&mut self.style, h),
            HeaderChunk::Level(h) => keep_first(&mut self.level, h),
            HeaderChunk::Marker(h) => self.markers.push(h),
            HeaderChunk::Info(s) => {
                if !s.is_empty() {
                    self.info.push(s)
                }
            }
        }
    }
}
