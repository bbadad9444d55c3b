//! Small value types shared by the container, image and writer layers

use serde::{Deserialize, Serialize};

/// Exact signed fraction, as stored in TIFF RATIONAL/SRATIONAL fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    pub const ZERO: Rational = Rational { num: 0, den: 1 };
    pub const ONE: Rational = Rational { num: 1, den: 1 };

    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// Builds a rational from wider integers, reducing first and saturating if it still does
    /// not fit.
    pub fn from_u64(num: u64, den: u64) -> Self {
        let g = gcd(num, den).max(1);
        let (num, den) = (num / g, den / g);
        Self {
            num: i32::try_from(num).unwrap_or(i32::MAX),
            den: i32::try_from(den).unwrap_or(i32::MAX),
        }
    }

    pub fn reduced(self) -> Self {
        let g = gcd(self.num.unsigned_abs() as u64, self.den.unsigned_abs() as u64).max(1) as i32;
        let sign = if self.den < 0 { -1 } else { 1 };
        Self {
            num: sign * self.num / g,
            den: sign * self.den / g,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.num == 0
    }

    /// `None` when the denominator is zero.
    pub fn to_f64(&self) -> Option<f64> {
        (self.den != 0).then(|| self.num as f64 / self.den as f64)
    }

    /// `1 / self`, `None` for a zero numerator.
    pub fn recip(&self) -> Option<Self> {
        (self.num != 0).then(|| Self::new(self.den, self.num).reduced())
    }
}

impl Default for Rational {
    fn default() -> Self {
        Self::ZERO
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Per-channel white balance gains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhiteBalance {
    pub red: Rational,
    pub green: Rational,
    pub blue: Rational,
}

impl Default for WhiteBalance {
    fn default() -> Self {
        Self {
            red: Rational::ONE,
            green: Rational::ONE,
            blue: Rational::ONE,
        }
    }
}

impl WhiteBalance {
    /// Camera neutral as written to DNG `AsShotNeutral`: the inverse gains, normalized to
    /// green.
    pub fn as_shot_neutral(&self) -> [Rational; 3] {
        let neutral = |gain: Rational| -> Rational {
            if gain.is_zero() || self.green.is_zero() {
                return Rational::ONE;
            }
            Rational::from_u64(
                self.green.num.unsigned_abs() as u64 * gain.den.unsigned_abs() as u64,
                self.green.den.unsigned_abs() as u64 * gain.num.unsigned_abs() as u64,
            )
        };
        [neutral(self.red), Rational::ONE, neutral(self.blue)]
    }
}

/// EXIF light source codes used for DNG calibration illuminants.
pub const ILLUMINANT_STANDARD_LIGHT_A: i32 = 17;
pub const ILLUMINANT_D65: i32 = 21;

/// Two-illuminant color calibration. Each matrix is 9 numerator/denominator pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraMatrices {
    pub calibration_illuminant1: i32,
    pub color_matrix1: [i32; 18],
    /// Illuminant 0 means the second matrix is absent.
    pub calibration_illuminant2: i32,
    pub color_matrix2: [i32; 18],
}

impl Default for CameraMatrices {
    fn default() -> Self {
        Self {
            calibration_illuminant1: ILLUMINANT_D65,
            color_matrix1: identity_matrix(),
            calibration_illuminant2: 0,
            color_matrix2: [0; 18],
        }
    }
}

impl CameraMatrices {
    pub fn has_second_matrix(&self) -> bool {
        self.calibration_illuminant2 != 0 && self.color_matrix2.chunks(2).any(|p| p[0] != 0)
    }
}

pub(crate) fn matrix_rationals(matrix: &[i32; 18]) -> [Rational; 9] {
    std::array::from_fn(|i| {
        let den = matrix[2 * i + 1];
        Rational::new(matrix[2 * i], if den == 0 { 1 } else { den })
    })
}

pub(crate) const fn identity_matrix() -> [i32; 18] {
    let mut m = [0i32; 18];
    let mut i = 0;
    while i < 9 {
        m[2 * i] = if i % 4 == 0 { 10000 } else { 0 };
        m[2 * i + 1] = 10000;
        i += 1;
    }
    m
}
