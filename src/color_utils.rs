//! Color utility functions shared across the dashboard.
//!
//! Overlay colors are stored as RGB triples in the configuration and are
//! needed both as raster pixels and as CSS strings for the legend.

use image::Rgba;

/// Matplotlib's `m` shorthand, used for predicted regions.
pub const MAGENTA: [u8; 3] = [191, 0, 191];

/// Matplotlib's `c` shorthand, used for manual regions.
pub const CYAN: [u8; 3] = [0, 191, 191];

/// Convert an RGB triple into an opaque RGBA pixel.
pub fn to_rgba(color: [u8; 3]) -> Rgba<u8> {
    Rgba([color[0], color[1], color[2], 255])
}

/// Format an RGB triple as a CSS hex color (`#rrggbb`).
pub fn to_hex(color: [u8; 3]) -> String {
    format!("#{:02x}{:02x}{:02x}", color[0], color[1], color[2])
}

/// Scale a normalized value (0.0-1.0) to an 8-bit channel.
///
/// NaN maps to 0 so missing samples render dark rather than poisoning the pixel.
pub fn unit_to_u8(value: f32) -> u8 {
    if value.is_nan() {
        return 0;
    }
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}
