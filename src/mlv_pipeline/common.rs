//! Common utilities module
//!
//! Error type and the small value types shared across the pipeline.

pub mod error;
pub mod types;

pub use error::{ErrorKind, MlvError, Result};
pub use types::{CameraMatrices, Rational, WhiteBalance};
