//! Packed sample codec
//!
//! Addressing of individual samples inside the camera's bit-packed raw buffers.

pub mod bitpack;

pub use bitpack::{
    PixelCodec, SUPPORTED_BITS, check_row_width, get_pixel, is_supported_depth, set_pixel,
};
