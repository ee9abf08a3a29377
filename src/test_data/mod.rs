//! Synthetic fixtures for tests: Zarr echogram stores and `.evr` files.

pub mod evr;
pub mod zarr;
