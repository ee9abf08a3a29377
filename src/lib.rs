//! echodash - Tricolor echogram dashboard
//!
//! Renders three frequency channels of a regridded Sv survey store as one RGB
//! echogram, outlines model-predicted and human-labelled fish-school regions
//! from Echoview `.evr` files on top, and serves the result as a web page
//! with a dataset selector.

pub mod color_utils;
pub mod compositor;
pub mod config;
pub mod constants;
pub mod data;
pub mod formats;
pub mod model;
pub mod overlay;
pub mod pipeline;
pub mod render;
pub mod resolver;
pub mod server;

#[cfg(test)]
mod test_data;

pub use config::AppConfig;
pub use pipeline::{Pipeline, PipelineError, RenderedView};
