//! In-memory echogram cube.

use chrono::NaiveDateTime;
use ndarray::{Array3, ArrayView2, Axis};

use crate::config::ChannelRef;

/// CPU-side echogram data, ordered `[channel, ping_time, depth]`.
#[derive(Debug, Clone)]
pub struct EchogramData {
    /// Name of the variable the values came from (e.g. `Sv`)
    pub variable: String,
    /// Channel names, one per entry of the first axis
    pub channels: Vec<String>,
    /// Ping times, one per entry of the second axis
    pub ping_time: Vec<NaiveDateTime>,
    /// Depth in meters, one per entry of the third axis; row 0 renders at the top
    pub depth: Vec<f64>,
    /// Backscatter values in dB
    pub values: Array3<f32>,
}

impl EchogramData {
    /// Bundle coordinates and values, checking that the axes agree.
    pub fn new(
        variable: impl Into<String>,
        channels: Vec<String>,
        ping_time: Vec<NaiveDateTime>,
        depth: Vec<f64>,
        values: Array3<f32>,
    ) -> Result<Self, String> {
        let expected = (channels.len(), ping_time.len(), depth.len());
        if values.dim() != expected {
            return Err(format!(
                "value shape {:?} does not match coordinates (channel, ping_time, depth) = {:?}",
                values.dim(),
                expected
            ));
        }
        Ok(Self {
            variable: variable.into(),
            channels,
            ping_time,
            depth,
            values,
        })
    }

    /// Number of frequency channels.
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Number of pings along the time axis.
    pub fn num_pings(&self) -> usize {
        self.ping_time.len()
    }

    /// Number of depth bins.
    pub fn num_depths(&self) -> usize {
        self.depth.len()
    }

    /// Resolve a channel reference to its position.
    pub fn channel_index(&self, channel: &ChannelRef) -> Option<usize> {
        match channel {
            ChannelRef::Index(i) => (*i < self.channels.len()).then_some(*i),
            ChannelRef::Name(name) => self.channels.iter().position(|c| c == name),
        }
    }

    /// Values of one channel as a `[ping_time, depth]` view.
    pub fn channel(&self, index: usize) -> Option<ArrayView2<'_, f32>> {
        (index < self.num_channels()).then(|| self.values.index_axis(Axis(0), index))
    }

    /// First and last ping time.
    pub fn time_range(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        Some((*self.ping_time.first()?, *self.ping_time.last()?))
    }

    /// One-line description for logs.
    pub fn summary(&self) -> String {
        let time = self
            .time_range()
            .map(|(a, b)| format!("{} .. {}", a, b))
            .unwrap_or_else(|| "empty".to_string());
        let depth = match (self.depth.first(), self.depth.last()) {
            (Some(a), Some(b)) => format!("{:.2} .. {:.2} m", a, b),
            _ => "empty".to_string(),
        };
        format!(
            "{}: {} channels x {} pings x {} depths; time {}; depth {}; channels {:?}",
            self.variable,
            self.num_channels(),
            self.num_pings(),
            self.num_depths(),
            time,
            depth,
            self.channels
        )
    }
}
