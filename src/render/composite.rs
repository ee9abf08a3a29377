//! Tricolor echogram rendering.
//!
//! Three channels of the Sv cube drive the red, green and blue components.
//! Each value is scaled linearly from `[vmin, vmax]` dB onto `0..=255` and
//! clamped. Pings run left to right and depth bins top to bottom; the
//! sample grid is then resized to the configured frame with nearest-neighbour
//! sampling so that individual pings stay crisp.

use std::io::Cursor;

use image::imageops::FilterType;
use image::{ImageFormat, Rgba, RgbaImage};
use ndarray::ArrayView2;
use thiserror::Error;

use crate::color_utils::unit_to_u8;
use crate::config::{ChannelRef, RenderConfig};
use crate::data::EchogramData;

/// Errors raised while rendering an echogram.
#[derive(Error, Debug)]
pub enum RenderError {
    /// A requested channel does not exist in the dataset
    #[error("Channel {channel} not found; dataset has {available:?}")]
    ChannelNotFound {
        channel: String,
        available: Vec<String>,
    },

    /// The dataset has no pings or no depth bins
    #[error("Nothing to render: {pings} pings x {depths} depth bins")]
    EmptyData { pings: usize, depths: usize },

    /// The output frame has zero area
    #[error("Invalid frame size {width}x{height}")]
    InvalidFrame { width: u32, height: u32 },

    /// PNG encoding failed
    #[error("Image encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

/// Render the tricolor composite of `data` at the configured frame size.
pub fn render_tricolor(data: &EchogramData, config: &RenderConfig) -> Result<RgbaImage, RenderError> {
    if config.width == 0 || config.height == 0 {
        return Err(RenderError::InvalidFrame {
            width: config.width,
            height: config.height,
        });
    }
    let (pings, depths) = (data.num_pings(), data.num_depths());
    if pings == 0 || depths == 0 {
        return Err(RenderError::EmptyData { pings, depths });
    }

    let [(red, red_plane), (green, green_plane), (blue, blue_plane)] =
        resolve_channels(data, &config.channels)?;
    log::debug!(
        "Rendering {} as RGB = ({}, {}, {}), {}..{} dB",
        data.variable,
        data.channels[red],
        data.channels[green],
        data.channels[blue],
        config.vmin,
        config.vmax
    );

    let span = config.vmax - config.vmin;
    let normalize = |v: f32| (v - config.vmin) / span;

    let mut samples = RgbaImage::new(pings as u32, depths as u32);
    for (x, y, pixel) in samples.enumerate_pixels_mut() {
        let (p, d) = (x as usize, y as usize);
        let rgb = [&red_plane, &green_plane, &blue_plane].map(|plane| plane[[p, d]]);
        let alpha = if rgb.iter().all(|v| v.is_nan()) { 0 } else { 255 };
        let [r, g, b] = rgb.map(|v| unit_to_u8(normalize(v)));
        *pixel = Rgba([r, g, b, alpha]);
    }

    if samples.dimensions() == (config.width, config.height) {
        return Ok(samples);
    }
    Ok(image::imageops::resize(
        &samples,
        config.width,
        config.height,
        FilterType::Nearest,
    ))
}

/// Look up the red, green and blue channels with their `[ping_time, depth]` planes.
fn resolve_channels<'a>(
    data: &'a EchogramData,
    refs: &[ChannelRef; 3],
) -> Result<[(usize, ArrayView2<'a, f32>); 3], RenderError> {
    let find = |channel: &ChannelRef| {
        data.channel_index(channel)
            .and_then(|index| Some((index, data.channel(index)?)))
            .ok_or_else(|| RenderError::ChannelNotFound {
                channel: channel.to_string(),
                available: data.channels.clone(),
            })
    };
    Ok([find(&refs[0])?, find(&refs[1])?, find(&refs[2])?])
}

/// Encode an image as PNG.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, RenderError> {
    let mut bytes = Cursor::new(Vec::new());
    image.write_to(&mut bytes, ImageFormat::Png)?;
    Ok(bytes.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeDelta};
    use ndarray::Array3;

    fn data(values: Array3<f32>) -> EchogramData {
        let (c, p, d) = values.dim();
        let t0 = NaiveDate::from_ymd_opt(2023, 9, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        EchogramData::new(
            "Sv",
            (0..c).map(|i| format!("ch{}", i)).collect(),
            (0..p).map(|i| t0 + TimeDelta::seconds(i as i64)).collect(),
            (0..d).map(|i| i as f64).collect(),
            values,
        )
        .unwrap()
    }

    fn config(width: u32, height: u32) -> RenderConfig {
        RenderConfig {
            width,
            height,
            ..RenderConfig::default()
        }
    }

    #[test]
    fn test_channel_roles_and_scaling() {
        // ch0 at vmin, ch1 midway, ch2 at vmax; default roles are [2, 1, 0]
        let mut values = Array3::zeros((3, 1, 1));
        values[[0, 0, 0]] = -70.0;
        values[[1, 0, 0]] = -55.0;
        values[[2, 0, 0]] = -40.0;

        let image = render_tricolor(&data(values), &config(1, 1)).unwrap();
        assert_eq!(image.get_pixel(0, 0), &Rgba([255, 128, 0, 255]));
    }

    #[test]
    fn test_values_clamped() {
        let mut values = Array3::zeros((3, 1, 1));
        values[[2, 0, 0]] = 10.0;
        values[[1, 0, 0]] = -120.0;
        values[[0, 0, 0]] = f32::NAN;

        let image = render_tricolor(&data(values), &config(1, 1)).unwrap();
        assert_eq!(image.get_pixel(0, 0), &Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn test_all_nan_is_transparent() {
        let values = Array3::from_elem((3, 1, 1), f32::NAN);
        let image = render_tricolor(&data(values), &config(1, 1)).unwrap();
        assert_eq!(image.get_pixel(0, 0)[3], 0);
    }

    #[test]
    fn test_depth_runs_down_pings_run_right() {
        let mut values = Array3::from_elem((3, 2, 2), -70.0);
        // Red on the last ping, green on the deepest bin
        values[[2, 1, 0]] = -40.0;
        values[[2, 1, 1]] = -40.0;
        values[[1, 0, 1]] = -40.0;
        values[[1, 1, 1]] = -40.0;

        let image = render_tricolor(&data(values), &config(4, 4)).unwrap();
        assert_eq!(image.dimensions(), (4, 4));
        assert_eq!(image.get_pixel(0, 0), &Rgba([0, 0, 0, 255]));
        assert_eq!(image.get_pixel(3, 0), &Rgba([255, 0, 0, 255]));
        assert_eq!(image.get_pixel(0, 3), &Rgba([0, 255, 0, 255]));
        assert_eq!(image.get_pixel(3, 3), &Rgba([255, 255, 0, 255]));
    }

    #[test]
    fn test_missing_channel() {
        let values = Array3::zeros((2, 1, 1));
        let err = render_tricolor(&data(values), &config(1, 1)).unwrap_err();
        assert!(matches!(err, RenderError::ChannelNotFound { .. }));
    }

    #[test]
    fn test_channel_by_name() {
        let mut values = Array3::from_elem((3, 1, 1), -70.0);
        values[[0, 0, 0]] = -40.0;
        let mut cfg = config(1, 1);
        cfg.channels = [
            ChannelRef::Name("ch0".into()),
            ChannelRef::Index(1),
            ChannelRef::Index(2),
        ];

        let image = render_tricolor(&data(values), &cfg).unwrap();
        assert_eq!(image.get_pixel(0, 0), &Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn test_empty_data() {
        let values = Array3::zeros((3, 0, 4));
        assert!(matches!(
            render_tricolor(&data(values), &config(10, 10)),
            Err(RenderError::EmptyData { pings: 0, depths: 4 })
        ));
    }

    #[test]
    fn test_encode_png_signature() {
        let png = encode_png(&RgbaImage::new(2, 2)).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }
}
