//! Sets of known-bad sensor sites

use serde::{Deserialize, Serialize};

/// One sensor site in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pixel {
    pub x: i32,
    pub y: i32,
}

impl Pixel {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Growable, unordered collection of pixel coordinates.
///
/// Order of insertion is not part of the contract. Mutation needs `&mut`; to share a map
/// between frames being processed concurrently, publish it behind an `Arc`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelMap {
    pixels: Vec<Pixel>,
}

impl PixelMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            pixels: Vec::with_capacity(capacity),
        }
    }

    pub fn add(&mut self, pixel: Pixel) {
        self.pixels.push(pixel);
    }

    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.pixels.capacity()
    }

    /// Grows the capacity to at least `capacity`. Never drops entries.
    pub fn set_capacity(&mut self, capacity: usize) {
        if capacity > self.pixels.len() {
            self.pixels.reserve(capacity - self.pixels.len());
        }
    }

    /// Raw view for batch processing.
    pub fn pixels(&self) -> &[Pixel] {
        &self.pixels
    }

    pub fn enumerate<F: FnMut(&Pixel)>(&self, mut callback: F) {
        for pixel in &self.pixels {
            callback(pixel);
        }
    }
}

impl FromIterator<Pixel> for PixelMap {
    fn from_iter<I: IntoIterator<Item = Pixel>>(iter: I) -> Self {
        Self {
            pixels: iter.into_iter().collect(),
        }
    }
}

impl Extend<Pixel> for PixelMap {
    fn extend<I: IntoIterator<Item = Pixel>>(&mut self, iter: I) {
        self.pixels.extend(iter);
    }
}
