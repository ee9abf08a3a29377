//! Region annotations in time-depth space.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Unique identifier of a region within one annotation file.
pub type RegionId = u32;

/// A single polygon vertex: ping time and depth in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub time: NaiveDateTime,
    pub depth: f64,
}

impl Vertex {
    pub fn new(time: NaiveDateTime, depth: f64) -> Self {
        Self { time, depth }
    }
}

/// Bounding rectangle stored in a region header.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionBounds {
    /// Earliest time covered
    pub left: NaiveDateTime,
    /// Latest time covered
    pub right: NaiveDateTime,
    /// Shallowest depth
    pub top: f64,
    /// Deepest depth
    pub bottom: f64,
}

/// Echoview region type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegionType {
    /// Bad data (no data)
    NoData,
    /// Analysis region
    Analysis,
    /// Marker region
    Marker,
    /// Fish tracks
    FishTracks,
    /// Bad data (empty water)
    EmptyWater,
    /// Any code not listed above
    Other(i32),
}

impl From<i32> for RegionType {
    fn from(code: i32) -> Self {
        match code {
            0 => RegionType::NoData,
            1 => RegionType::Analysis,
            2 => RegionType::Marker,
            3 => RegionType::FishTracks,
            4 => RegionType::EmptyWater,
            other => RegionType::Other(other),
        }
    }
}

/// Where a set of regions came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionSource {
    /// Model output
    Predicted,
    /// Human labels
    Manual,
}

impl RegionSource {
    /// Get the display name for this source.
    pub fn name(&self) -> &'static str {
        match self {
            RegionSource::Predicted => "Predicted",
            RegionSource::Manual => "Manual",
        }
    }
}

/// One annotated polygon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub id: RegionId,
    /// Class label, e.g. `Age-1 Hake`
    pub class: String,
    pub name: String,
    pub region_type: RegionType,
    pub notes: Vec<String>,
    pub detection_settings: Vec<String>,
    pub bounds: Option<RegionBounds>,
    pub vertices: Vec<Vertex>,
}

impl Region {
    /// Create a region with only the fields the overlays need.
    pub fn new(id: RegionId, class: impl Into<String>, vertices: Vec<Vertex>) -> Self {
        Self {
            id,
            class: class.into(),
            name: String::new(),
            region_type: RegionType::Analysis,
            notes: Vec::new(),
            detection_settings: Vec::new(),
            bounds: None,
            vertices,
        }
    }

    /// Whether the outline already ends where it begins.
    pub fn is_closed(&self) -> bool {
        is_ring_closed(&self.vertices)
    }

    /// Close the outline in place. See [`close_ring`].
    pub fn close(&mut self) {
        close_ring(&mut self.vertices);
    }
}

/// Whether a vertex sequence ends on its first vertex.
///
/// Empty and single-vertex sequences count as closed.
pub fn is_ring_closed(vertices: &[Vertex]) -> bool {
    match (vertices.first(), vertices.last()) {
        (Some(first), Some(last)) => vertices.len() == 1 || first == last,
        _ => true,
    }
}

/// Close a vertex sequence by appending a copy of its first vertex.
///
/// Leaves sequences that are already closed untouched, so applying it twice
/// equals applying it once. Vertices are never reordered or deduplicated.
pub fn close_ring(vertices: &mut Vec<Vertex>) {
    if is_ring_closed(vertices) {
        return;
    }
    if let Some(first) = vertices.first().copied() {
        vertices.push(first);
    }
}
