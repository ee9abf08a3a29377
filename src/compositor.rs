//! Layer compositing: the base echogram plus whichever overlays exist.

use image::RgbaImage;
use imageproc::drawing::draw_line_segment_mut;

use crate::color_utils::to_rgba;
use crate::overlay::OverlayLayer;
use crate::render::AxisMapping;

/// A base echogram and the overlays drawn on top of it, bottom to top.
#[derive(Debug, Clone)]
pub struct Composite {
    pub base: RgbaImage,
    pub layers: Vec<OverlayLayer>,
}

/// Stack every present overlay onto `base`, in the order given.
///
/// Absent overlays are skipped; each present one is kept regardless of the
/// others.
pub fn compose(
    base: RgbaImage,
    overlays: impl IntoIterator<Item = Option<OverlayLayer>>,
) -> Composite {
    let layers: Vec<OverlayLayer> = overlays.into_iter().flatten().collect();
    log::debug!("Composed base with {} overlay layers", layers.len());
    Composite { base, layers }
}

impl Composite {
    /// Rasterise the overlays onto a copy of the base image.
    pub fn flatten(&self, mapping: &AxisMapping) -> RgbaImage {
        let mut image = self.base.clone();
        for layer in &self.layers {
            let color = to_rgba(layer.style.color);
            let offsets = stroke_offsets(layer.style.line_width);
            for path in layer.paths() {
                let points: Vec<(f32, f32)> = path.vertices.iter().map(|v| mapping.project(v)).collect();
                for segment in points.windows(2) {
                    for &(dx, dy) in &offsets {
                        draw_line_segment_mut(
                            &mut image,
                            (segment[0].0 + dx, segment[0].1 + dy),
                            (segment[1].0 + dx, segment[1].1 + dy),
                            color,
                        );
                    }
                }
            }
        }
        image
    }

    /// Number of overlay layers.
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }
}

/// Pixel offsets that together stroke a line `width` pixels wide.
fn stroke_offsets(width: u32) -> Vec<(f32, f32)> {
    let width = width.max(1) as i32;
    let start = -(width - 1) / 2;
    let steps = start..start + width;
    steps
        .clone()
        .flat_map(|dx| steps.clone().map(move |dy| (dx as f32, dy as f32)))
        .collect()
}
