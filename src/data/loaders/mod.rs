//! Built-in echogram dataset loaders.
//!
//! This module contains implementations of the `DatasetLoader` trait
//! for the supported store formats.

mod zarr_loader;

pub use zarr_loader::{ZarrLoader, decode_cf_time};
