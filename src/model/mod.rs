//! Data models for region annotations.

mod region;

pub use region::{
    Region, RegionBounds, RegionId, RegionSource, RegionType, Vertex, close_ring, is_ring_closed,
};
