//! File naming of spanned recordings
//!
//! A recording larger than the card's file size limit continues in `.M00`, `.M01`, ...
//! next to the main `.MLV` file.

use std::path::{Path, PathBuf};

/// Largest number of continuation files the naming scheme allows.
pub const MAX_SIBLINGS: u16 = 100;

/// Path of continuation file `index` (0 = `.M00`). The extension is lower case when the
/// main file's extension is.
pub fn sibling_path(main: &Path, index: u16) -> PathBuf {
    let lower = main
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.chars().any(|c| c.is_ascii_lowercase()));
    let ext = format!("{}{:02}", if lower { 'm' } else { 'M' }, index);
    main.with_extension(ext)
}

/// Paths of every file in a set of `file_count` files, main file first.
pub fn file_set(main: &Path, file_count: u16) -> Vec<PathBuf> {
    let siblings = file_count.saturating_sub(1).min(MAX_SIBLINGS);
    std::iter::once(main.to_path_buf())
        .chain((0..siblings).map(|i| sibling_path(main, i)))
        .collect()
}
