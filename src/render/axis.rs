//! Mapping from echogram coordinates to frame pixels.

use chrono::NaiveDateTime;

use crate::data::EchogramData;
use crate::model::Vertex;

/// Maps ping time and depth onto the pixels of a rendered frame.
///
/// Each ping occupies one column band and each depth bin one row band of the
/// frame; coordinates between samples are interpolated linearly and
/// coordinates outside the data are extrapolated from the end spacing, so
/// outlines that leave the echogram still point the right way before they
/// are clipped.
#[derive(Debug, Clone)]
pub struct AxisMapping {
    times: Vec<f64>,
    depths: Vec<f64>,
    width: u32,
    height: u32,
}

impl AxisMapping {
    pub fn new(times: &[NaiveDateTime], depths: &[f64], width: u32, height: u32) -> Self {
        Self {
            times: times.iter().map(|t| time_to_seconds(*t)).collect(),
            depths: depths.to_vec(),
            width,
            height,
        }
    }

    /// Mapping for `data` rendered at `width` x `height`.
    pub fn for_data(data: &EchogramData, width: u32, height: u32) -> Self {
        Self::new(&data.ping_time, &data.depth, width, height)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Horizontal pixel position of `time`.
    pub fn x(&self, time: NaiveDateTime) -> f32 {
        to_pixel(&self.times, time_to_seconds(time), self.width)
    }

    /// Vertical pixel position of `depth`; the first depth bin is at the top.
    pub fn y(&self, depth: f64) -> f32 {
        to_pixel(&self.depths, depth, self.height)
    }

    /// Pixel position of a vertex.
    pub fn project(&self, vertex: &Vertex) -> (f32, f32) {
        (self.x(vertex.time), self.y(vertex.depth))
    }
}

fn time_to_seconds(time: NaiveDateTime) -> f64 {
    time.and_utc().timestamp_micros() as f64 / 1e6
}

fn to_pixel(coords: &[f64], value: f64, extent: u32) -> f32 {
    if coords.is_empty() {
        return 0.0;
    }
    let scale = f64::from(extent) / coords.len() as f64;
    ((fractional_index(coords, value) + 0.5) * scale) as f32
}

/// Position of `value` along monotonic `coords`, in units of samples.
fn fractional_index(coords: &[f64], value: f64) -> f64 {
    let n = coords.len();
    if n < 2 {
        return 0.0;
    }
    let ascending = coords[n - 1] >= coords[0];
    let before = |c: f64| if ascending { c <= value } else { c >= value };

    // Segment [i, i + 1] containing value, clamped to the first/last segment
    let i = coords.partition_point(|&c| before(c)).clamp(1, n - 1) - 1;
    let (a, b) = (coords[i], coords[i + 1]);
    if b == a {
        return i as f64;
    }
    i as f64 + (value - a) / (b - a)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeDelta};

    fn t(seconds: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2019, 7, 2)
            .unwrap()
            .and_hms_opt(3, 0, 0)
            .unwrap()
            + TimeDelta::seconds(seconds)
    }

    #[test]
    fn test_fractional_index() {
        let coords = [0.0, 1.0, 2.0, 4.0];
        assert_eq!(fractional_index(&coords, 0.0), 0.0);
        assert_eq!(fractional_index(&coords, 1.5), 1.5);
        assert_eq!(fractional_index(&coords, 3.0), 2.5);
        assert_eq!(fractional_index(&coords, 4.0), 3.0);
        assert_eq!(fractional_index(&coords, -1.0), -1.0);
        assert_eq!(fractional_index(&coords, 6.0), 4.0);
    }

    #[test]
    fn test_fractional_index_descending() {
        let coords = [10.0, 8.0, 6.0];
        assert_eq!(fractional_index(&coords, 9.0), 0.5);
        assert_eq!(fractional_index(&coords, 6.0), 2.0);
    }

    #[test]
    fn test_pixel_centers() {
        let times: Vec<_> = (0..4).map(t).collect();
        let mapping = AxisMapping::new(&times, &[1.0, 2.0], 400, 100);

        assert_eq!(mapping.x(t(0)), 50.0);
        assert_eq!(mapping.x(t(3)), 350.0);
        assert_eq!(mapping.y(1.0), 25.0);
        assert_eq!(mapping.y(2.0), 75.0);
        assert_eq!(mapping.project(&Vertex::new(t(1), 1.5)), (150.0, 50.0));
    }

    #[test]
    fn test_degenerate_axes() {
        let mapping = AxisMapping::new(&[t(0)], &[], 10, 10);
        assert_eq!(mapping.x(t(50)), 5.0);
        assert_eq!(mapping.y(3.0), 0.0);
    }
}
