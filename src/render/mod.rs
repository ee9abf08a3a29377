//! Echogram rendering: the tricolor base image and the coordinate mapping
//! that places region outlines on it.

mod axis;
mod composite;

pub use axis::AxisMapping;
pub use composite::{RenderError, encode_png, render_tricolor};
