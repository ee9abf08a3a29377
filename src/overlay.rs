//! Region overlays: predicted and manual outlines ready for drawing.
//!
//! Both sources go through the same steps. The annotation file is read (a
//! missing or unreadable file only costs the overlay, never the view), the
//! manual regions are narrowed to the label allow-list, and every outline is
//! closed with [`Region::close`] so that it draws as a loop.

use std::path::Path;

use serde::Serialize;

use crate::config::{OverlayStyle, RegionsConfig};
use crate::formats::{AnnotationLoad, load_regions};
use crate::model::{Region, RegionId, RegionSource, Vertex};

/// One drawable set of region outlines.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayLayer {
    pub source: RegionSource,
    pub style: OverlayStyle,
    /// Closed regions, in file order
    pub regions: Vec<Region>,
}

/// A single closed outline of a layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinePath<'a> {
    pub id: RegionId,
    pub class: &'a str,
    pub vertices: &'a [Vertex],
}

impl OverlayLayer {
    /// Build a layer, closing every region's outline.
    pub fn new(source: RegionSource, style: OverlayStyle, mut regions: Vec<Region>) -> Self {
        for region in &mut regions {
            region.close();
        }
        Self {
            source,
            style,
            regions,
        }
    }

    /// The outlines of this layer, computed on demand.
    pub fn paths(&self) -> impl Iterator<Item = LinePath<'_>> + '_ {
        self.regions.iter().map(|region| LinePath {
            id: region.id,
            class: &region.class,
            vertices: &region.vertices,
        })
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

/// Keep only the regions whose class is in `allow_list`.
///
/// Filtering an already filtered list changes nothing.
pub fn filter_by_class(regions: Vec<Region>, allow_list: &[String]) -> Vec<Region> {
    let before = regions.len();
    let kept: Vec<Region> = regions
        .into_iter()
        .filter(|r| allow_list.iter().any(|label| *label == r.class))
        .collect();
    if kept.len() < before {
        log::debug!(
            "Dropped {} of {} regions outside the label allow-list",
            before - kept.len(),
            before
        );
    }
    kept
}

/// Overlay of model-predicted regions, or `None` when there is nothing to draw.
pub fn build_prediction_overlay(path: &Path, config: &RegionsConfig) -> Option<OverlayLayer> {
    let regions = regions_or_warn(path, "No hake regions detected!")?;
    build_layer(RegionSource::Predicted, config.prediction_style, regions)
}

/// Overlay of human-labelled regions in the allow-list, or `None` when there
/// is nothing to draw.
pub fn build_manual_overlay(path: &Path, config: &RegionsConfig) -> Option<OverlayLayer> {
    let regions = regions_or_warn(path, "No hake regions labeled!")?;
    let regions = filter_by_class(regions, &config.label_allow_list);
    build_layer(RegionSource::Manual, config.manual_style, regions)
}

fn build_layer(source: RegionSource, style: OverlayStyle, regions: Vec<Region>) -> Option<OverlayLayer> {
    if regions.is_empty() {
        log::info!("{} overlay has no regions", source.name());
        return None;
    }
    let layer = OverlayLayer::new(source, style, regions);
    log::info!("{} overlay: {} regions", source.name(), layer.len());
    Some(layer)
}

fn regions_or_warn(path: &Path, message: &str) -> Option<Vec<Region>> {
    match load_regions(path) {
        AnnotationLoad::Found(regions) => Some(regions),
        AnnotationLoad::NotFound => {
            log::warn!("{} ({:?} does not exist)", message, path);
            None
        }
        AnnotationLoad::Malformed(e) => {
            log::warn!("{} ({:?} could not be read: {})", message, path, e);
            None
        }
    }
}
