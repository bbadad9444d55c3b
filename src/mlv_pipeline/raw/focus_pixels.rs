//! Autofocus pixel removal
//!
//! Dual-pixel AF sensors carry sites that read phase data instead of light. Their positions
//! depend on the camera and on the raw buffer resolution of the video mode, so they are kept
//! as `.fpm` tables (one `x y` pair per line, full-buffer coordinates, `#` comments) rather
//! than code. Tables are calibration data measured per camera and are not bundled; they are
//! loaded from a directory of `.fpm` files named `<model_hex>_<width>x<height>.fpm`.

use std::collections::HashMap;
use std::fs;
use std::ops::BitOr;
use std::path::Path;

use tracing::{debug, instrument};

use crate::mlv_pipeline::common::error::{MlvError, Result};
use crate::mlv_pipeline::pixel_map::Pixel;
use crate::mlv_pipeline::raw::image::RawImage;

/// Camera and buffer resolution combination selecting a focus-pixel table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FocusPixelsType(u32);

impl FocusPixelsType {
    pub const NONE: Self = Self(0);

    pub const EOSM: Self = Self(1 << 0);
    pub const D100: Self = Self(1 << 1);
    pub const D650: Self = Self(1 << 2);
    pub const D700: Self = Self(1 << 3);

    pub const RES_1808X728: Self = Self(1 << 16);
    pub const RES_1872X1060: Self = Self(1 << 17);
    pub const RES_1808X1190: Self = Self(1 << 18);
    pub const RES_2592X1108: Self = Self(1 << 19);

    const CAMERA_MASK: u32 = 0xffff;
    const RESOLUTION_MASK: u32 = 0xffff_0000;

    const CAMERAS: [(Self, u32); 4] = [
        (Self::EOSM, 0x8000_0331),
        (Self::D100, 0x8000_0346),
        (Self::D650, 0x8000_0301),
        (Self::D700, 0x8000_0326),
    ];

    const RESOLUTIONS: [(Self, u32, u32); 4] = [
        (Self::RES_1808X728, 1808, 728),
        (Self::RES_1872X1060, 1872, 1060),
        (Self::RES_1808X1190, 1808, 1190),
        (Self::RES_2592X1108, 2592, 1108),
    ];

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Selects the table for a camera model id and raw buffer size, if one is known.
    pub fn for_camera(camera_model: u32, width: u32, height: u32) -> Option<Self> {
        let camera = Self::CAMERAS
            .iter()
            .find(|(_, id)| *id == camera_model)
            .map(|(ty, _)| *ty)?;
        let resolution = Self::RESOLUTIONS
            .iter()
            .find(|(_, w, h)| *w == width && *h == height)
            .map(|(ty, _, _)| *ty)?;
        Some(camera | resolution)
    }

    /// Every camera and resolution combination with a known table name.
    fn all_keys() -> impl Iterator<Item = TableKey> {
        Self::from_bits(Self::CAMERA_MASK | Self::RESOLUTION_MASK).keys()
    }

    /// Every single-camera, single-resolution key covered by this mask.
    fn keys(self) -> impl Iterator<Item = TableKey> {
        let cameras = self.0 & Self::CAMERA_MASK;
        let resolutions = self.0 & Self::RESOLUTION_MASK;
        Self::CAMERAS
            .into_iter()
            .filter(move |(ty, _)| cameras & ty.0 != 0)
            .flat_map(move |(_, model)| {
                Self::RESOLUTIONS
                    .into_iter()
                    .filter(move |(ty, _, _)| resolutions & ty.0 != 0)
                    .map(move |(_, width, height)| TableKey {
                        model,
                        width,
                        height,
                    })
            })
    }
}

impl BitOr for FocusPixelsType {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct TableKey {
    model: u32,
    width: u32,
    height: u32,
}

impl TableKey {
    fn file_name(&self) -> String {
        format!("{:08x}_{}x{}.fpm", self.model, self.width, self.height)
    }
}

/// Parses the `.fpm` text format.
pub fn parse_fpm(text: &str) -> Result<Vec<Pixel>> {
    let mut pixels = Vec::new();
    for (number, line) in text.lines().enumerate() {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split_whitespace().map(str::parse::<i32>);
        match (fields.next(), fields.next(), fields.next()) {
            (Some(Ok(x)), Some(Ok(y)), None) => pixels.push(Pixel::new(x, y)),
            _ => {
                return Err(MlvError::InvalidArgument(format!(
                    "focus pixel table line {}: expected `x y`, got `{line}`",
                    number + 1
                )));
            }
        }
    }
    Ok(pixels)
}

/// Focus-pixel coordinate tables keyed by camera model and buffer resolution.
#[derive(Debug, Clone, Default)]
pub struct FocusPixelTables {
    tables: HashMap<TableKey, Vec<Pixel>>,
}

impl FocusPixelTables {
    /// Loads every `<model_hex>_<width>x<height>.fpm` table present in `dir`.
    ///
    /// Combinations without a file have no sites. A missing directory, or a table that
    /// cannot be read or parsed, fails the whole load.
    pub fn with_directory<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(MlvError::FileError(format!(
                "focus pixel directory {} not found",
                dir.display()
            )));
        }
        let mut tables = HashMap::new();
        for key in FocusPixelsType::all_keys() {
            let path = dir.join(key.file_name());
            if !path.is_file() {
                continue;
            }
            let text = fs::read_to_string(&path).map_err(|e| {
                MlvError::FileError(format!("failed to read {}: {e}", path.display()))
            })?;
            let pixels = parse_fpm(&text)?;
            debug!("Loaded {} focus pixels from {}", pixels.len(), path.display());
            tables.insert(key, pixels);
        }
        Ok(FocusPixelTables { tables })
    }

    /// Number of loaded tables.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// All sites for the given type, in full-buffer coordinates.
    pub fn lookup(&self, ty: FocusPixelsType) -> Vec<Pixel> {
        ty.keys()
            .filter_map(|key| self.tables.get(&key))
            .flat_map(|pixels| pixels.iter().copied())
            .collect()
    }
}

impl RawImage {
    /// Interpolates the sites `tables` lists for `ty`.
    ///
    /// `crop_x`/`crop_y` give the position of this frame inside the full raw buffer, so
    /// table coordinates are shifted by the crop before they are matched against the frame.
    #[instrument(skip(self, tables))]
    pub fn fix_focus_pixels(
        &mut self,
        tables: &FocusPixelTables,
        ty: FocusPixelsType,
        crop_x: u16,
        crop_y: u16,
    ) -> Result<()> {
        self.codec()?;
        let sites = tables.lookup(ty);
        if sites.is_empty() {
            debug!("No focus pixel table for {:#x}", ty.bits());
            return Ok(());
        }
        let (dx, dy) = (crop_x as i64, crop_y as i64);
        self.fix_sites(sites.iter().map(|p| (p.x as i64 - dx, p.y as i64 - dy)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mlv_pipeline::raw::test_support::flat_image;
    use tempfile::TempDir;

    #[test]
    fn camera_and_resolution_select_type() {
        let ty = FocusPixelsType::for_camera(0x8000_0331, 1808, 728).unwrap();
        assert_eq!(ty, FocusPixelsType::EOSM | FocusPixelsType::RES_1808X728);
        assert!(ty.contains(FocusPixelsType::EOSM));
        assert!(FocusPixelsType::for_camera(0x8000_0285, 1808, 728).is_none());
        assert!(FocusPixelsType::for_camera(0x8000_0331, 1920, 1080).is_none());
    }

    #[test]
    fn only_present_tables_are_loaded() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("80000331_1872x1060.fpm"), "10 20\n12 20\n").unwrap();
        fs::write(dir.path().join("80000331_1920x1080.fpm"), "1 1\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "not a table").unwrap();

        let tables = FocusPixelTables::with_directory(dir.path()).unwrap();
        assert_eq!(tables.len(), 1);
        let eosm = FocusPixelsType::EOSM | FocusPixelsType::RES_1872X1060;
        assert_eq!(tables.lookup(eosm).len(), 2);
        assert!(tables.lookup(FocusPixelsType::EOSM).is_empty());
        assert!(tables.lookup(FocusPixelsType::D650 | FocusPixelsType::RES_1872X1060).is_empty());
        let err = FocusPixelTables::with_directory(dir.path().join("absent")).unwrap_err();
        assert_eq!(err.kind(), crate::mlv_pipeline::common::error::ErrorKind::FileError);
    }

    #[test]
    fn malformed_lines_are_rejected() {
        assert_eq!(parse_fpm("# c\n1 2\n\n3 4 # tail\n").unwrap().len(), 2);
        assert!(parse_fpm("1 2 3\n").is_err());
        assert!(parse_fpm("x y\n").is_err());
    }

    #[test]
    fn crop_offset_shifts_table_coordinates() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("80000346_1808x728.fpm"), "# test\n104 52\n500 500\n").unwrap();
        let tables = FocusPixelTables::with_directory(dir.path()).unwrap();
        let ty = FocusPixelsType::D100 | FocusPixelsType::RES_1808X728;
        assert_eq!(tables.lookup(ty), vec![Pixel::new(104, 52), Pixel::new(500, 500)]);

        let mut image = flat_image(32, 32, 14, 3000);
        image.set_pixel(4, 2, 9000).unwrap();
        image.set_pixel(104 % 32, 52 % 32, 9000).unwrap();
        image.fix_focus_pixels(&tables, ty, 100, 50).unwrap();
        assert_eq!(image.get_pixel(4, 2).unwrap(), 3000);
        assert_eq!(image.get_pixel(104 % 32, 52 % 32).unwrap(), 9000);
    }

    #[test]
    fn unknown_type_is_a_no_op() {
        let mut image = flat_image(16, 16, 14, 3000);
        let before = image.buffer().to_vec();
        image
            .fix_focus_pixels(&FocusPixelTables::default(), FocusPixelsType::NONE, 0, 0)
            .unwrap();
        assert_eq!(image.buffer(), &before[..]);
    }
}
