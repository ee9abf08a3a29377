//! Zarr v2 store writer for tests.

use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::ZlibEncoder;
use serde_json::json;

use crate::data::blosc::{Codec, HEADER_LEN};

/// Block size used for Blosc-compressed test chunks.
const BLOSC_BLOCK_SIZE: usize = 256;

/// Chunk compressor of a test array.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Compressor {
    None,
    Zlib,
    Blosc,
}

/// Element payload of a test array.
enum Payload {
    F32(Vec<f64>),
    F64(Vec<f64>),
    Unicode(Vec<String>),
}

/// Description of one array to write.
pub struct ArraySpec {
    name: String,
    dims: Vec<String>,
    shape: Vec<usize>,
    chunks: Vec<usize>,
    payload: Payload,
    attrs: serde_json::Map<String, serde_json::Value>,
    compressor: Compressor,
    skipped: Vec<String>,
}

impl ArraySpec {
    fn new(name: &str, dims: &[&str], shape: &[usize], chunks: &[usize], payload: Payload) -> Self {
        Self {
            name: name.to_string(),
            dims: dims.iter().map(|d| d.to_string()).collect(),
            shape: shape.to_vec(),
            chunks: chunks.to_vec(),
            payload,
            attrs: serde_json::Map::new(),
            compressor: Compressor::None,
            skipped: Vec::new(),
        }
    }

    /// Little-endian `f4` array given in C order.
    pub fn f32(name: &str, dims: &[&str], shape: &[usize], chunks: &[usize], values: &[f64]) -> Self {
        Self::new(name, dims, shape, chunks, Payload::F32(values.to_vec()))
    }

    /// Little-endian `f8` array given in C order.
    pub fn f64(name: &str, dims: &[&str], shape: &[usize], chunks: &[usize], values: &[f64]) -> Self {
        Self::new(name, dims, shape, chunks, Payload::F64(values.to_vec()))
    }

    /// One-dimensional `<U{n}` coordinate named after its dimension, in one chunk.
    pub fn unicode(name: &str, values: &[&str]) -> Self {
        let n = values.len();
        Self::new(
            name,
            &[name],
            &[n],
            &[n.max(1)],
            Payload::Unicode(values.iter().map(|s| s.to_string()).collect()),
        )
    }

    pub fn attr(mut self, key: &str, value: serde_json::Value) -> Self {
        self.attrs.insert(key.to_string(), value);
        self
    }

    pub fn zlib(mut self) -> Self {
        self.compressor = Compressor::Zlib;
        self
    }

    /// Compress chunks the way xarray does by default: Blosc, lz4, byte shuffle.
    pub fn blosc(mut self) -> Self {
        self.compressor = Compressor::Blosc;
        self
    }

    /// Do not write the chunk with this key, so readers fall back to the fill value.
    pub fn skip_chunk(mut self, key: &str) -> Self {
        self.skipped.push(key.to_string());
        self
    }

    fn dtype(&self) -> String {
        match &self.payload {
            Payload::F32(_) => "<f4".to_string(),
            Payload::F64(_) => "<f8".to_string(),
            Payload::Unicode(values) => {
                let width = values.iter().map(|s| s.chars().count()).max().unwrap_or(1);
                format!("<U{}", width.max(1))
            }
        }
    }

    fn item_size(&self) -> usize {
        match &self.payload {
            Payload::F32(_) => 4,
            Payload::F64(_) => 8,
            Payload::Unicode(_) => 4 * self.dtype()[2..].parse::<usize>().unwrap(),
        }
    }

    fn encode_item(&self, flat: Option<usize>, out: &mut Vec<u8>) {
        match &self.payload {
            Payload::F32(values) => {
                let v = flat.map_or(f32::NAN, |i| values[i] as f32);
                out.extend(v.to_le_bytes());
            }
            Payload::F64(values) => {
                let v = flat.map_or(f64::NAN, |i| values[i]);
                out.extend(v.to_le_bytes());
            }
            Payload::Unicode(values) => {
                let width = self.dtype()[2..].parse::<usize>().unwrap();
                let s = flat.map_or("", |i| values[i].as_str());
                let mut chars: Vec<u32> = s.chars().map(u32::from).collect();
                chars.resize(width, 0);
                for c in chars {
                    out.extend(c.to_le_bytes());
                }
            }
        }
    }

    fn write(&self, group: &Path) {
        let dir = group.join(&self.name);
        std::fs::create_dir_all(&dir).unwrap();

        let compressor = match self.compressor {
            Compressor::None => serde_json::Value::Null,
            Compressor::Zlib => json!({"id": "zlib", "level": 1}),
            Compressor::Blosc => json!({
                "id": "blosc",
                "cname": "lz4",
                "clevel": 5,
                "shuffle": 1,
                "blocksize": 0,
            }),
        };
        let fill = match self.payload {
            Payload::Unicode(_) => json!(""),
            _ => json!("NaN"),
        };
        let zarray = json!({
            "zarr_format": 2,
            "shape": self.shape,
            "chunks": self.chunks,
            "dtype": self.dtype(),
            "compressor": compressor,
            "fill_value": fill,
            "order": "C",
            "filters": null,
        });
        std::fs::write(dir.join(".zarray"), zarray.to_string()).unwrap();

        let mut attrs = self.attrs.clone();
        attrs.insert("_ARRAY_DIMENSIONS".to_string(), json!(self.dims));
        std::fs::write(dir.join(".zattrs"), serde_json::Value::Object(attrs).to_string()).unwrap();

        let grid: Vec<usize> = self
            .shape
            .iter()
            .zip(&self.chunks)
            .map(|(s, c)| s.div_ceil(*c))
            .collect();
        let strides = strides(&self.shape);

        for chunk_index in indices(&grid) {
            let key = chunk_index
                .iter()
                .map(|i| i.to_string())
                .collect::<Vec<_>>()
                .join(".");
            if self.skipped.contains(&key) {
                continue;
            }

            let mut bytes = Vec::new();
            for local in indices(&self.chunks) {
                let global: Vec<usize> = (0..self.shape.len())
                    .map(|d| chunk_index[d] * self.chunks[d] + local[d])
                    .collect();
                let inside = global.iter().zip(&self.shape).all(|(g, s)| g < s);
                let flat = inside.then(|| global.iter().zip(&strides).map(|(g, s)| g * s).sum());
                self.encode_item(flat, &mut bytes);
            }

            match self.compressor {
                Compressor::None => {}
                Compressor::Zlib => bytes = zlib(&bytes),
                Compressor::Blosc => {
                    // Type sizes past 255 are compressed as plain bytes
                    let typesize = Some(self.item_size()).filter(|s| *s <= 255).unwrap_or(1);
                    bytes = blosc_frame(&bytes, typesize, BLOSC_BLOCK_SIZE, Codec::Lz4);
                }
            }
            std::fs::write(dir.join(key), bytes).unwrap();
        }
    }
}

fn zlib(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::fast());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

/// Encode `data` as a Blosc frame with byte shuffle and `codec`.
///
/// Full blocks are split into one stream per byte of `typesize` when large
/// enough; streams that do not shrink are stored raw.
pub fn blosc_frame(data: &[u8], typesize: usize, blocksize: usize, codec: Codec) -> Vec<u8> {
    let codec_bits: u8 = match codec {
        Codec::Lz4 => 1,
        Codec::Zlib => 3,
        other => panic!("no test encoder for {}", other.name()),
    };
    let splittable = typesize <= 16 && blocksize / typesize >= 128;
    let mut flags = 0x01 | (codec_bits << 5);
    if !splittable {
        flags |= 0x10;
    }

    let nblocks = data.len().div_ceil(blocksize);
    let body_start = HEADER_LEN + 4 * nblocks;
    let mut starts = Vec::new();
    let mut body = Vec::new();
    for block in data.chunks(blocksize) {
        starts.push((body_start + body.len()) as u32);
        let nsplits = if splittable && block.len() == blocksize {
            typesize
        } else {
            1
        };

        let elements = block.len() / typesize;
        let mut shuffled = vec![0u8; block.len()];
        for j in 0..typesize {
            for i in 0..elements {
                shuffled[j * elements + i] = block[i * typesize + j];
            }
        }
        let tail = elements * typesize;
        shuffled[tail..].copy_from_slice(&block[tail..]);

        for stream in shuffled.chunks(block.len() / nsplits) {
            let compressed = match codec {
                Codec::Lz4 => lz4_flex::block::compress(stream),
                _ => zlib(stream),
            };
            let stored = if compressed.len() < stream.len() {
                compressed.as_slice()
            } else {
                stream
            };
            body.extend((stored.len() as u32).to_le_bytes());
            body.extend_from_slice(stored);
        }
    }

    let mut frame = vec![2, 1, flags, typesize as u8];
    for word in [data.len(), blocksize, body_start + body.len()] {
        frame.extend((word as u32).to_le_bytes());
    }
    for start in starts {
        frame.extend(start.to_le_bytes());
    }
    frame.extend(body);
    frame
}

fn strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; shape.len()];
    for d in (0..shape.len().saturating_sub(1)).rev() {
        strides[d] = strides[d + 1] * shape[d + 1];
    }
    strides
}

fn indices(bounds: &[usize]) -> Vec<Vec<usize>> {
    let mut all = vec![Vec::new()];
    for &bound in bounds {
        all = all
            .into_iter()
            .flat_map(|prefix| {
                (0..bound).map(move |i| {
                    let mut next = prefix.clone();
                    next.push(i);
                    next
                })
            })
            .collect();
    }
    all
}

/// Write a Zarr v2 group containing `arrays`.
pub fn write_group(root: &Path, arrays: &[ArraySpec]) {
    std::fs::create_dir_all(root).unwrap();
    std::fs::write(root.join(".zgroup"), r#"{"zarr_format": 2}"#).unwrap();
    for array in arrays {
        array.write(root);
    }
}

/// Channel names used by the synthetic stores.
pub const CHANNEL_NAMES: [&str; 4] = ["GPT  18 kHz", "GPT  38 kHz", "GPT 120 kHz", "GPT 200 kHz"];

/// Reference time of the synthetic ping axis.
pub const PING_EPOCH: &str = "2019-07-02 03:00:00";

/// Builder for a synthetic `Sv` echogram store.
pub struct EchogramStore {
    channels: usize,
    pings: usize,
    depths: usize,
    vertical: &'static str,
    time_first: bool,
    blosc: bool,
}

impl EchogramStore {
    pub fn new(channels: usize, pings: usize, depths: usize) -> Self {
        Self {
            channels,
            pings,
            depths,
            vertical: "depth",
            time_first: false,
            blosc: false,
        }
    }

    /// Name the vertical dimension differently (e.g. `echo_range`).
    pub fn vertical_name(mut self, name: &'static str) -> Self {
        self.vertical = name;
        self
    }

    /// Store `Sv` as `[ping_time, vertical, channel]`.
    pub fn time_first(mut self) -> Self {
        self.time_first = true;
        self
    }

    /// Compress every array with Blosc instead of zlib or nothing.
    pub fn blosc(mut self) -> Self {
        self.blosc = true;
        self
    }

    /// `Sv` value of channel `c`, ping `p`, depth bin `d`.
    pub fn value_at(c: usize, p: usize, d: usize) -> f32 {
        -80.0 + 10.0 * c as f32 + p as f32 + 0.5 * d as f32
    }

    /// Ping time of ping `p`: one second apart from [`PING_EPOCH`].
    pub fn ping_seconds(p: usize) -> f64 {
        p as f64
    }

    /// Depth of bin `d` in meters.
    pub fn depth_at(d: usize) -> f64 {
        0.5 + d as f64
    }

    /// Write the store to `path` and return it.
    pub fn write(self, path: &Path) -> PathBuf {
        let (c, p, d) = (self.channels, self.pings, self.depths);

        let (dims, shape, values): ([&str; 3], [usize; 3], Vec<f64>) = if self.time_first {
            let values = indices(&[p, d, c])
                .iter()
                .map(|i| f64::from(Self::value_at(i[2], i[0], i[1])))
                .collect();
            (["ping_time", self.vertical, "channel"], [p, d, c], values)
        } else {
            let values = indices(&[c, p, d])
                .iter()
                .map(|i| f64::from(Self::value_at(i[0], i[1], i[2])))
                .collect();
            (["channel", "ping_time", self.vertical], [c, p, d], values)
        };
        let chunks = shape.map(|s| s.div_ceil(2).max(1));

        let times: Vec<f64> = (0..p).map(Self::ping_seconds).collect();
        let depths: Vec<f64> = (0..d).map(Self::depth_at).collect();
        let names: Vec<&str> = (0..c).map(|i| CHANNEL_NAMES[i % CHANNEL_NAMES.len()]).collect();

        let arrays = [
            ArraySpec::f32("Sv", &dims, &shape, &chunks, &values).zlib(),
            ArraySpec::unicode("channel", &names),
            ArraySpec::f64("ping_time", &["ping_time"], &[p], &[p.max(1)], &times)
                .attr("units", json!(format!("seconds since {}", PING_EPOCH))),
            ArraySpec::f64(self.vertical, &[self.vertical], &[d], &[d.max(1)], &depths),
        ];
        let arrays = if self.blosc {
            arrays.map(ArraySpec::blosc)
        } else {
            arrays
        };
        write_group(path, &arrays);
        path.to_path_buf()
    }
}
