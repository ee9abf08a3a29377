//! Echogram data structures and loaders.
//!
//! This module provides:
//! - `EchogramData`: CPU-side echogram cube `[channel, ping_time, depth]`
//! - `LoaderRegistry`: extensible system for opening dataset stores
//! - `zarr`: the Zarr v2 directory store reader behind the built-in loader
//! - `blosc`: decoding of Blosc-compressed chunks
//!
//! ## Adding New Formats
//!
//! To add support for a new store format (e.g., NetCDF):
//!
//! 1. Create a new loader in `loaders/` implementing `DatasetLoader`
//! 2. Register it in `LoaderRegistry::new()`
//!
//! ```rust,ignore
//! use echodash::data::{DatasetLoader, EchogramData, LoaderError};
//!
//! pub struct NetcdfLoader;
//!
//! impl DatasetLoader for NetcdfLoader {
//!     fn id(&self) -> &'static str { "netcdf" }
//!     fn display_name(&self) -> &'static str { "NetCDF" }
//!     fn extensions(&self) -> &'static [&'static str] { &["nc"] }
//!     fn can_load(&self, path: &Path) -> bool { /* check the HDF5 signature */ }
//!     fn open(&self, path: &Path, variable: &str) -> Result<EchogramData, LoaderError> { /* ... */ }
//! }
//! ```

pub mod blosc;
mod echogram;
mod loader;
pub mod loaders;
pub mod zarr;

pub use echogram::EchogramData;
pub use loader::{DatasetLoader, LoaderError, LoaderRegistry};
