//! Minimal Zarr v2 directory store reader.
//!
//! Covers what xarray writes for regridded echogram cubes: `.zgroup` /
//! `.zarray` / `.zattrs` JSON metadata, C-ordered chunks keyed by `.` or `/`,
//! numeric and string dtypes, and the `blosc` (lz4 or zlib inside), `zlib`
//! and `gzip` compressors. Fortran order and Zarr v3 are rejected with a
//! descriptive error, as are shapes and chunks too large to hold in memory.

use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::read::{GzDecoder, ZlibDecoder};
use ndarray::{ArrayD, IxDyn};
use serde::Deserialize;

use crate::constants::{MAX_ARRAY_ELEMENTS, MAX_CHUNK_BYTES};
use crate::data::LoaderError;
use crate::data::blosc;

/// Array metadata from `.zarray`.
#[derive(Debug, Clone, Deserialize)]
struct ZarrayMeta {
    zarr_format: u32,
    shape: Vec<usize>,
    chunks: Vec<usize>,
    dtype: String,
    compressor: Option<CodecMeta>,
    #[serde(default)]
    fill_value: Option<serde_json::Value>,
    order: String,
    #[serde(default)]
    filters: Option<Vec<CodecMeta>>,
    #[serde(default)]
    dimension_separator: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct CodecMeta {
    id: String,
}

/// Element type of an array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DType {
    Float { size: usize, big_endian: bool },
    Int { size: usize, signed: bool, big_endian: bool },
    /// Fixed-width UTF-32 string of `chars` code points
    Unicode { chars: usize, big_endian: bool },
    /// Fixed-width byte string
    Bytes { len: usize },
    /// Variable-length strings (object dtype with the `vlen-utf8` filter)
    Object,
}

impl DType {
    fn parse(dtype: &str) -> Result<Self, LoaderError> {
        let unsupported = || LoaderError::new(format!("Unsupported dtype '{}'", dtype));
        if dtype == "|O" {
            return Ok(DType::Object);
        }
        let mut chars = dtype.chars();
        let order = chars.next().ok_or_else(unsupported)?;
        let kind = chars.next().ok_or_else(unsupported)?;
        let size: usize = chars.as_str().parse().map_err(|_| unsupported())?;
        let big_endian = match order {
            '<' | '|' | '=' => false,
            '>' => true,
            _ => return Err(unsupported()),
        };
        match (kind, size) {
            ('f', 4 | 8) => Ok(DType::Float { size, big_endian }),
            ('i', 1 | 2 | 4 | 8) => Ok(DType::Int { size, signed: true, big_endian }),
            ('u', 1 | 2 | 4 | 8) => Ok(DType::Int { size, signed: false, big_endian }),
            ('U', _) => Ok(DType::Unicode { chars: size, big_endian }),
            ('S', _) => Ok(DType::Bytes { len: size }),
            _ => Err(unsupported()),
        }
    }

    fn is_numeric(&self) -> bool {
        matches!(self, DType::Float { .. } | DType::Int { .. })
    }

    /// Size of one element in a decoded chunk, for fixed-width types.
    fn item_size(&self) -> Option<usize> {
        match *self {
            DType::Float { size, .. } | DType::Int { size, .. } => Some(size),
            DType::Unicode { chars, .. } => chars.checked_mul(4),
            DType::Bytes { len } => Some(len),
            DType::Object => None,
        }
    }
}

/// A Zarr v2 group on disk.
#[derive(Debug, Clone)]
pub struct ZarrGroup {
    root: PathBuf,
}

impl ZarrGroup {
    /// Open a group directory (must contain `.zgroup`).
    pub fn open(root: &Path) -> Result<Self, LoaderError> {
        let marker = root.join(".zgroup");
        let json = std::fs::read_to_string(&marker)
            .map_err(|e| LoaderError::new(format!("Cannot read {:?}: {}", marker, e)))?;
        let meta: serde_json::Value = serde_json::from_str(&json)
            .map_err(|e| LoaderError::new(format!("Invalid {:?}: {}", marker, e)))?;
        match meta.get("zarr_format").and_then(|v| v.as_u64()) {
            Some(2) => Ok(Self {
                root: root.to_path_buf(),
            }),
            other => Err(LoaderError::new(format!(
                "Unsupported zarr_format {:?} in {:?}",
                other, marker
            ))),
        }
    }

    /// Whether the group has an array named `name`.
    pub fn has_array(&self, name: &str) -> bool {
        self.root.join(name).join(".zarray").is_file()
    }

    /// Open the array named `name`.
    pub fn array(&self, name: &str) -> Result<ZarrArray, LoaderError> {
        ZarrArray::open(&self.root.join(name))
    }
}

/// A Zarr v2 array on disk.
#[derive(Debug, Clone)]
pub struct ZarrArray {
    path: PathBuf,
    meta: ZarrayMeta,
    dtype: DType,
    attrs: serde_json::Map<String, serde_json::Value>,
    /// Elements in the whole array
    len: usize,
    /// Elements in one chunk
    chunk_len: usize,
    /// Decoded bytes one chunk may hold
    chunk_bytes: usize,
}

impl ZarrArray {
    /// Open an array directory and validate its metadata.
    pub fn open(path: &Path) -> Result<Self, LoaderError> {
        let meta_path = path.join(".zarray");
        let json = std::fs::read_to_string(&meta_path)
            .map_err(|e| LoaderError::new(format!("Cannot read {:?}: {}", meta_path, e)))?;
        let meta: ZarrayMeta = serde_json::from_str(&json)
            .map_err(|e| LoaderError::new(format!("Invalid {:?}: {}", meta_path, e)))?;

        if meta.zarr_format != 2 {
            return Err(LoaderError::new(format!(
                "Unsupported zarr_format {} in {:?}",
                meta.zarr_format, meta_path
            )));
        }
        if meta.order != "C" {
            return Err(LoaderError::new(format!(
                "Unsupported array order '{}' in {:?}",
                meta.order, meta_path
            )));
        }
        if meta.shape.len() != meta.chunks.len() {
            return Err(LoaderError::new(format!(
                "Shape {:?} and chunks {:?} disagree in {:?}",
                meta.shape, meta.chunks, meta_path
            )));
        }
        if meta.chunks.contains(&0) {
            return Err(LoaderError::new(format!("Zero chunk size in {:?}", meta_path)));
        }
        let len = element_count(&meta.shape).ok_or_else(|| {
            LoaderError::new(format!(
                "Shape {:?} in {:?} exceeds {} elements",
                meta.shape, meta_path, MAX_ARRAY_ELEMENTS
            ))
        })?;
        let chunk_len = element_count(&meta.chunks).ok_or_else(|| {
            LoaderError::new(format!(
                "Chunks {:?} in {:?} exceed {} elements",
                meta.chunks, meta_path, MAX_ARRAY_ELEMENTS
            ))
        })?;
        if let Some(compressor) = &meta.compressor
            && !matches!(compressor.id.as_str(), "blosc" | "zlib" | "gzip")
        {
            return Err(LoaderError::new(format!(
                "Unsupported compressor '{}' in {:?}",
                compressor.id, meta_path
            )));
        }

        let dtype = DType::parse(&meta.dtype)?;
        let chunk_bytes = match dtype {
            // Variable-length items only have an upper bound
            DType::Object => MAX_CHUNK_BYTES,
            _ => dtype
                .item_size()
                .and_then(|size| size.checked_mul(chunk_len))
                .filter(|bytes| *bytes <= MAX_CHUNK_BYTES)
                .ok_or_else(|| {
                    LoaderError::new(format!(
                        "Chunks of {} x {} exceed {} bytes in {:?}",
                        chunk_len, meta.dtype, MAX_CHUNK_BYTES, meta_path
                    ))
                })?,
        };
        let filters: Vec<&str> = meta
            .filters
            .iter()
            .flatten()
            .map(|f| f.id.as_str())
            .collect();
        match (dtype, filters.as_slice()) {
            (DType::Object, ["vlen-utf8"]) => {}
            (DType::Object, _) => {
                return Err(LoaderError::new(format!(
                    "Object array {:?} needs exactly the vlen-utf8 filter, found {:?}",
                    path, filters
                )));
            }
            (_, []) => {}
            (_, other) => {
                return Err(LoaderError::new(format!(
                    "Unsupported filters {:?} in {:?}",
                    other, meta_path
                )));
            }
        }

        let attrs_path = path.join(".zattrs");
        let attrs = if attrs_path.is_file() {
            let json = std::fs::read_to_string(&attrs_path)
                .map_err(|e| LoaderError::new(format!("Cannot read {:?}: {}", attrs_path, e)))?;
            serde_json::from_str(&json)
                .map_err(|e| LoaderError::new(format!("Invalid {:?}: {}", attrs_path, e)))?
        } else {
            serde_json::Map::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            meta,
            dtype,
            attrs,
            len,
            chunk_len,
            chunk_bytes,
        })
    }

    /// Array shape.
    pub fn shape(&self) -> &[usize] {
        &self.meta.shape
    }

    /// Dimension names from xarray's `_ARRAY_DIMENSIONS` attribute.
    pub fn dimensions(&self) -> Result<Vec<String>, LoaderError> {
        let dims = self
            .attrs
            .get("_ARRAY_DIMENSIONS")
            .and_then(|v| v.as_array())
            .ok_or_else(|| {
                LoaderError::new(format!("{:?} has no _ARRAY_DIMENSIONS attribute", self.path))
            })?;
        let dims: Vec<String> = dims
            .iter()
            .filter_map(|d| d.as_str().map(str::to_string))
            .collect();
        if dims.len() != self.meta.shape.len() {
            return Err(LoaderError::new(format!(
                "{:?} names {} dimensions for a {}-d array",
                self.path,
                dims.len(),
                self.meta.shape.len()
            )));
        }
        Ok(dims)
    }

    /// A string attribute, if present.
    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).and_then(|v| v.as_str())
    }

    /// Read a numeric array, converting every element to `f64`.
    pub fn read_f64(&self) -> Result<ArrayD<f64>, LoaderError> {
        let dtype = self.dtype;
        if !dtype.is_numeric() {
            return Err(LoaderError::new(format!(
                "{:?} holds {}, not numbers",
                self.path, self.meta.dtype
            )));
        }
        let fill = self.numeric_fill();
        let values = self.read_chunks(fill, |bytes, count| decode_numeric(bytes, count, dtype))?;
        ArrayD::from_shape_vec(IxDyn(&self.meta.shape), values)
            .map_err(|e| LoaderError::new(format!("{:?}: {}", self.path, e)))
    }

    /// Read a one-dimensional string array.
    pub fn read_strings(&self) -> Result<Vec<String>, LoaderError> {
        let dtype = self.dtype;
        if dtype.is_numeric() {
            return Err(LoaderError::new(format!(
                "{:?} holds {}, not strings",
                self.path, self.meta.dtype
            )));
        }
        if self.meta.shape.len() != 1 {
            return Err(LoaderError::new(format!(
                "{:?} is {}-d, expected a 1-d string array",
                self.path,
                self.meta.shape.len()
            )));
        }
        self.read_chunks(String::new(), |bytes, count| decode_strings(bytes, count, dtype))
    }

    fn numeric_fill(&self) -> f64 {
        let default = match self.dtype {
            DType::Float { .. } => f64::NAN,
            _ => 0.0,
        };
        match &self.meta.fill_value {
            Some(serde_json::Value::Number(n)) => n.as_f64().unwrap_or(default),
            Some(serde_json::Value::String(s)) => match s.as_str() {
                "NaN" => f64::NAN,
                "Infinity" => f64::INFINITY,
                "-Infinity" => f64::NEG_INFINITY,
                _ => default,
            },
            _ => default,
        }
    }

    fn chunk_key(&self, index: &[usize]) -> String {
        if index.is_empty() {
            return "0".to_string();
        }
        let separator = self.meta.dimension_separator.as_deref().unwrap_or(".");
        index
            .iter()
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(separator)
    }

    /// Raw chunk bytes after decompression, or `None` for a missing chunk.
    fn read_chunk_bytes(&self, key: &str) -> Result<Option<Vec<u8>>, LoaderError> {
        let path = self.path.join(key);
        let raw = match std::fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(LoaderError::new(format!("Cannot read chunk {:?}: {}", path, e)));
            }
        };

        let limit = self.chunk_bytes;
        let decoded = match self.meta.compressor.as_ref().map(|c| c.id.as_str()) {
            None => raw,
            Some("blosc") => blosc::decompress(&raw, limit).map_err(|e| {
                LoaderError::new(format!("Cannot decompress chunk {:?}: {}", path, e))
            })?,
            Some(id) => {
                // One byte past the limit tells an oversized chunk from a full one
                let mut out = Vec::new();
                let cap = limit as u64 + 1;
                let result = match id {
                    "gzip" => GzDecoder::new(raw.as_slice()).take(cap).read_to_end(&mut out),
                    _ => ZlibDecoder::new(raw.as_slice()).take(cap).read_to_end(&mut out),
                };
                result.map_err(|e| {
                    LoaderError::new(format!("Cannot decompress chunk {:?}: {}", path, e))
                })?;
                if out.len() > limit {
                    return Err(LoaderError::new(format!(
                        "Chunk {:?} expands past {} bytes",
                        path, limit
                    )));
                }
                out
            }
        };
        Ok(Some(decoded))
    }

    /// Assemble the full array from its chunks in C order.
    fn read_chunks<T, F>(&self, fill: T, decode: F) -> Result<Vec<T>, LoaderError>
    where
        T: Clone,
        F: Fn(&[u8], usize) -> Result<Vec<T>, String>,
    {
        let shape = &self.meta.shape;
        let chunks = &self.meta.chunks;
        let (total, chunk_len) = (self.len, self.chunk_len);
        let mut out = vec![fill; total];
        if total == 0 {
            return Ok(out);
        }

        let grid: Vec<usize> = shape
            .iter()
            .zip(chunks)
            .map(|(s, c)| s.div_ceil(*c))
            .collect();
        let strides = c_strides(shape);

        for chunk_index in MultiIndex::new(&grid) {
            let key = self.chunk_key(&chunk_index);
            let Some(bytes) = self.read_chunk_bytes(&key)? else {
                continue;
            };
            let items = decode(&bytes, chunk_len)
                .map_err(|e| LoaderError::new(format!("Chunk {:?}/{}: {}", self.path, key, e)))?;

            let origin: Vec<usize> = chunk_index.iter().zip(chunks).map(|(i, c)| i * c).collect();
            for (local, item) in MultiIndex::new(chunks).zip(items) {
                let mut flat = 0;
                let mut inside = true;
                for dim in 0..shape.len() {
                    let global = origin[dim] + local[dim];
                    if global >= shape[dim] {
                        inside = false;
                        break;
                    }
                    flat += global * strides[dim];
                }
                if inside {
                    out[flat] = item;
                }
            }
        }
        Ok(out)
    }
}

/// Product of `dims`, if it stays within [`MAX_ARRAY_ELEMENTS`].
fn element_count(dims: &[usize]) -> Option<usize> {
    dims.iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .filter(|n| *n <= MAX_ARRAY_ELEMENTS)
}

fn c_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; shape.len()];
    for dim in (0..shape.len().saturating_sub(1)).rev() {
        strides[dim] = strides[dim + 1] * shape[dim + 1];
    }
    strides
}

/// Row-major walk over every index below `bounds`.
struct MultiIndex {
    bounds: Vec<usize>,
    next: Option<Vec<usize>>,
}

impl MultiIndex {
    fn new(bounds: &[usize]) -> Self {
        let next = if bounds.contains(&0) {
            None
        } else {
            Some(vec![0; bounds.len()])
        };
        Self {
            bounds: bounds.to_vec(),
            next,
        }
    }
}

impl Iterator for MultiIndex {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        let current = self.next.take()?;
        let mut following = current.clone();
        for dim in (0..following.len()).rev() {
            following[dim] += 1;
            if following[dim] < self.bounds[dim] {
                self.next = Some(following);
                return Some(current);
            }
            following[dim] = 0;
        }
        // Wrapped around every dimension: this was the last index
        Some(current)
    }
}

fn decode_numeric(bytes: &[u8], count: usize, dtype: DType) -> Result<Vec<f64>, String> {
    let size = dtype.item_size().unwrap_or(1);
    let expected = count
        .checked_mul(size)
        .ok_or_else(|| format!("{} items of {} bytes overflow", count, size))?;
    if bytes.len() != expected {
        return Err(format!(
            "expected {} bytes ({} items), found {}",
            expected,
            count,
            bytes.len()
        ));
    }

    let values = bytes
        .chunks_exact(size)
        .map(|b| match dtype {
            DType::Float { size: 4, big_endian } => {
                let raw = [b[0], b[1], b[2], b[3]];
                f64::from(if big_endian {
                    f32::from_be_bytes(raw)
                } else {
                    f32::from_le_bytes(raw)
                })
            }
            DType::Float { big_endian, .. } => {
                let raw = [b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]];
                if big_endian {
                    f64::from_be_bytes(raw)
                } else {
                    f64::from_le_bytes(raw)
                }
            }
            DType::Int { signed, big_endian, .. } => decode_int(b, signed, big_endian),
            _ => f64::NAN,
        })
        .collect();
    Ok(values)
}

fn decode_int(bytes: &[u8], signed: bool, big_endian: bool) -> f64 {
    // Widen to 8 bytes in little-endian order, sign-extending when needed
    let mut le: Vec<u8> = if big_endian {
        bytes.iter().rev().copied().collect()
    } else {
        bytes.to_vec()
    };
    let negative = signed && le.last().is_some_and(|b| b & 0x80 != 0);
    le.resize(8, if negative { 0xff } else { 0x00 });
    let raw = [le[0], le[1], le[2], le[3], le[4], le[5], le[6], le[7]];
    if signed {
        i64::from_le_bytes(raw) as f64
    } else {
        u64::from_le_bytes(raw) as f64
    }
}

fn decode_strings(bytes: &[u8], count: usize, dtype: DType) -> Result<Vec<String>, String> {
    match dtype {
        DType::Unicode { chars, big_endian } => {
            let width = chars
                .checked_mul(4)
                .ok_or_else(|| format!("{} character strings are too wide", chars))?;
            let expected = count
                .checked_mul(width)
                .ok_or_else(|| format!("{} items of {} bytes overflow", count, width))?;
            if bytes.len() != expected {
                return Err(format!("expected {} bytes, found {}", expected, bytes.len()));
            }
            Ok(bytes
                .chunks_exact(width.max(1))
                .take(count)
                .map(|item| {
                    item.chunks_exact(4)
                        .map(|c| {
                            let raw = [c[0], c[1], c[2], c[3]];
                            if big_endian {
                                u32::from_be_bytes(raw)
                            } else {
                                u32::from_le_bytes(raw)
                            }
                        })
                        .take_while(|&cp| cp != 0)
                        .filter_map(char::from_u32)
                        .collect()
                })
                .collect())
        }
        DType::Bytes { len } => {
            let expected = count
                .checked_mul(len)
                .ok_or_else(|| format!("{} items of {} bytes overflow", count, len))?;
            if bytes.len() != expected {
                return Err(format!("expected {} bytes, found {}", expected, bytes.len()));
            }
            Ok(bytes
                .chunks_exact(len.max(1))
                .take(count)
                .map(|item| {
                    let end = item.iter().position(|&b| b == 0).unwrap_or(item.len());
                    String::from_utf8_lossy(&item[..end]).into_owned()
                })
                .collect())
        }
        DType::Object => decode_vlen_utf8(bytes, count),
        _ => Err("not a string dtype".to_string()),
    }
}

/// numcodecs `vlen-utf8`: item count, then length-prefixed UTF-8 items.
fn decode_vlen_utf8(bytes: &[u8], count: usize) -> Result<Vec<String>, String> {
    fn read_u32(bytes: &[u8], at: usize) -> Result<usize, String> {
        let b = bytes
            .get(at..at + 4)
            .ok_or_else(|| format!("truncated length at byte {}", at))?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as usize)
    }

    let n = read_u32(bytes, 0)?;
    if n != count {
        return Err(format!("expected {} items, header says {}", count, n));
    }
    let mut pos = 4;
    // Every item carries at least its 4 byte length
    let mut items = Vec::with_capacity(n.min(bytes.len() / 4));
    for _ in 0..n {
        let len = read_u32(bytes, pos)?;
        pos += 4;
        let item = bytes
            .get(pos..pos.saturating_add(len))
            .ok_or_else(|| format!("truncated item at byte {}", pos))?;
        items.push(String::from_utf8_lossy(item).into_owned());
        pos += len;
    }
    Ok(items)
}
