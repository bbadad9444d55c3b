//! Tag numbers the `tiff` crate does not name
//!
//! Baseline tags come from [`tiff::tags::Tag`]; these are the TIFF/EP, EXIF and DNG
//! additions a raw file needs.

pub const ORIENTATION: u16 = 274;
pub const SUB_IFDS: u16 = 330;
pub const CFA_REPEAT_PATTERN_DIM: u16 = 33421;
pub const CFA_PATTERN: u16 = 33422;
pub const EXPOSURE_TIME: u16 = 33434;
pub const F_NUMBER: u16 = 33437;
pub const EXIF_IFD: u16 = 34665;
pub const ISO_SPEED_RATINGS: u16 = 34855;
pub const DATE_TIME_ORIGINAL: u16 = 36867;
pub const FOCAL_LENGTH: u16 = 37386;
pub const BODY_SERIAL_NUMBER: u16 = 42033;
pub const LENS_MODEL: u16 = 42036;

pub const DNG_VERSION: u16 = 50706;
pub const DNG_BACKWARD_VERSION: u16 = 50707;
pub const UNIQUE_CAMERA_MODEL: u16 = 50708;
pub const CFA_PLANE_COLOR: u16 = 50710;
pub const CFA_LAYOUT: u16 = 50711;
pub const BLACK_LEVEL: u16 = 50714;
pub const WHITE_LEVEL: u16 = 50717;
pub const DEFAULT_SCALE: u16 = 50718;
pub const DEFAULT_CROP_ORIGIN: u16 = 50719;
pub const DEFAULT_CROP_SIZE: u16 = 50720;
pub const COLOR_MATRIX1: u16 = 50721;
pub const COLOR_MATRIX2: u16 = 50722;
pub const ANALOG_BALANCE: u16 = 50727;
pub const AS_SHOT_NEUTRAL: u16 = 50728;
pub const BASELINE_EXPOSURE: u16 = 50730;
pub const CAMERA_SERIAL_NUMBER: u16 = 50735;
pub const CALIBRATION_ILLUMINANT1: u16 = 50778;
pub const CALIBRATION_ILLUMINANT2: u16 = 50779;
pub const ACTIVE_AREA: u16 = 50829;
pub const FRAME_RATE: u16 = 51044;

/// PhotometricInterpretation of a color filter array image.
pub const PHOTOMETRIC_CFA: u16 = 32803;
pub const PHOTOMETRIC_RGB: u16 = 2;
