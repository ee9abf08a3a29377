//! Region annotation file support.
//!
//! Region files are read through the [`RegionFormat`] trait; the only
//! built-in implementation is Echoview's `.evr` text format.
//!
//! Missing or unreadable annotation files are an expected condition (not
//! every survey leg has predictions or labels yet), so [`load_regions`]
//! never fails. It reports what happened through [`AnnotationLoad`] and the
//! caller decides how to degrade.
//!
//! # Example
//!
//! ```ignore
//! use echodash::formats::{load_regions, AnnotationLoad};
//!
//! match load_regions(Path::new("x0083_pred.evr")) {
//!     AnnotationLoad::Found(regions) => println!("{} regions", regions.len()),
//!     AnnotationLoad::NotFound => println!("no prediction yet"),
//!     AnnotationLoad::Malformed(e) => println!("unreadable: {}", e),
//! }
//! ```

mod error;
mod evr;

#[cfg(test)]
mod tests;

pub use error::FormatError;
pub use evr::{EvrFormat, parse_timestamp};

use std::path::Path;

use crate::model::Region;

/// A parser for one region file format.
pub trait RegionFormat: Send + Sync {
    /// Unique identifier for this format (e.g., "evr").
    fn id(&self) -> &'static str;

    /// Human-readable name for logs.
    fn display_name(&self) -> &'static str;

    /// File extensions this format uses, lowercase without the dot.
    fn extensions(&self) -> &[&'static str];

    /// Parse the full file content into regions, in file order.
    fn parse(&self, content: &str) -> Result<Vec<Region>, FormatError>;
}

/// Outcome of attempting to read one annotation file.
#[derive(Debug)]
pub enum AnnotationLoad {
    /// The file was read and parsed.
    Found(Vec<Region>),
    /// There is no file at the path.
    NotFound,
    /// The file exists but could not be read or parsed.
    Malformed(FormatError),
}

/// Find the format that handles a path, by extension.
pub fn format_for_path(path: &Path) -> Option<Box<dyn RegionFormat>> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    let formats: [Box<dyn RegionFormat>; 1] = [Box::new(EvrFormat)];
    formats
        .into_iter()
        .find(|f| f.extensions().iter().any(|e| *e == ext))
}

/// Attempt to read a region file. Never fails; see [`AnnotationLoad`].
pub fn load_regions(path: &Path) -> AnnotationLoad {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::debug!("No region file at {:?}", path);
            return AnnotationLoad::NotFound;
        }
        Err(e) => return AnnotationLoad::Malformed(e.into()),
    };

    let Some(format) = format_for_path(path) else {
        return AnnotationLoad::Malformed(FormatError::UnsupportedFile {
            path: path.to_path_buf(),
        });
    };

    match format.parse(&content) {
        Ok(regions) => {
            log::debug!(
                "Read {} regions from {:?} ({})",
                regions.len(),
                path,
                format.display_name()
            );
            AnnotationLoad::Found(regions)
        }
        Err(e) => AnnotationLoad::Malformed(e),
    }
}
