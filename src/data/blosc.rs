//! Blosc frame decoding for compressed Zarr chunks.
//!
//! xarray writes Zarr v2 stores with the numcodecs `blosc` compressor unless
//! told otherwise. A frame is a 16 byte header followed either by the raw
//! buffer (memcpy flag) or by a table of block offsets and the blocks
//! themselves. A block is one compressed stream, or one stream per byte of
//! the type size when it was split, and its bytes or bits were shuffled by
//! element before compression.
//!
//! Header layout (little endian):
//!
//! ```text
//! 0: version  1: codec version  2: flags  3: type size
//! 4: nbytes (u32)  8: block size (u32)  12: cbytes (u32)
//! ```
//!
//! The `lz4`/`lz4hc` and `zlib` codecs are decoded; `blosclz`, `snappy` and
//! `zstd` frames are reported as unsupported.

use std::io::Read;

use flate2::read::ZlibDecoder;
use thiserror::Error;

/// Size of the frame header.
pub const HEADER_LEN: usize = 16;

const FLAG_SHUFFLE: u8 = 0x01;
const FLAG_MEMCPYED: u8 = 0x02;
const FLAG_BITSHUFFLE: u8 = 0x04;
const FLAG_DONT_SPLIT: u8 = 0x10;

/// Type sizes above this are never split into per-byte streams.
const MAX_SPLITS: usize = 16;

/// Blocks with fewer elements than this are never split.
const MIN_SPLIT_ELEMENTS: usize = 128;

/// Errors raised while decoding a Blosc frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BloscError {
    #[error("frame ends before the {what}")]
    Truncated { what: &'static str },

    #[error("invalid frame header: {0}")]
    InvalidHeader(String),

    #[error("frame holds {declared} bytes, more than the {limit} allowed")]
    TooLarge { declared: usize, limit: usize },

    #[error("unsupported blosc codec '{0}'")]
    UnsupportedCodec(&'static str),

    #[error("block {block}: {message}")]
    Block { block: usize, message: String },
}

/// Compressor recorded in the top three flag bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    BloscLz,
    Lz4,
    Snappy,
    Zlib,
    Zstd,
    Unknown,
}

impl Codec {
    fn from_flags(flags: u8) -> Self {
        match flags >> 5 {
            0 => Codec::BloscLz,
            1 => Codec::Lz4,
            2 => Codec::Snappy,
            3 => Codec::Zlib,
            4 => Codec::Zstd,
            _ => Codec::Unknown,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Codec::BloscLz => "blosclz",
            Codec::Lz4 => "lz4",
            Codec::Snappy => "snappy",
            Codec::Zlib => "zlib",
            Codec::Zstd => "zstd",
            Codec::Unknown => "unknown",
        }
    }

    /// Decompress one stream into `out`, which must be filled exactly.
    fn decompress_into(&self, stream: &[u8], out: &mut [u8]) -> Result<(), String> {
        match self {
            Codec::Lz4 => {
                let written = lz4_flex::block::decompress_into(stream, out)
                    .map_err(|e| format!("lz4: {}", e))?;
                if written != out.len() {
                    return Err(format!("lz4 gave {} bytes, expected {}", written, out.len()));
                }
                Ok(())
            }
            Codec::Zlib => ZlibDecoder::new(stream)
                .read_exact(out)
                .map_err(|e| format!("zlib: {}", e)),
            other => Err(format!("unsupported codec '{}'", other.name())),
        }
    }
}

/// Parsed frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: u8,
    pub flags: u8,
    pub typesize: usize,
    /// Decoded size
    pub nbytes: usize,
    pub blocksize: usize,
    /// Frame size including the header
    pub cbytes: usize,
}

impl FrameHeader {
    pub fn parse(frame: &[u8]) -> Result<Self, BloscError> {
        let header = frame
            .get(..HEADER_LEN)
            .ok_or(BloscError::Truncated { what: "header" })?;
        let word = |at: usize| {
            u32::from_le_bytes([header[at], header[at + 1], header[at + 2], header[at + 3]]) as usize
        };
        let parsed = Self {
            version: header[0],
            flags: header[2],
            typesize: usize::from(header[3]),
            nbytes: word(4),
            blocksize: word(8),
            cbytes: word(12),
        };

        if parsed.typesize == 0 {
            return Err(BloscError::InvalidHeader("type size is 0".to_string()));
        }
        if parsed.nbytes > 0 && parsed.blocksize == 0 {
            return Err(BloscError::InvalidHeader("block size is 0".to_string()));
        }
        if parsed.cbytes > frame.len() {
            return Err(BloscError::Truncated { what: "compressed payload" });
        }
        Ok(parsed)
    }

    pub fn codec(&self) -> Codec {
        Codec::from_flags(self.flags)
    }

    fn memcpyed(&self) -> bool {
        self.flags & FLAG_MEMCPYED != 0
    }

    /// Number of streams a block of `bsize` bytes was compressed as.
    fn splits(&self, bsize: usize, leftover: bool) -> usize {
        let split = self.flags & FLAG_DONT_SPLIT == 0
            && !leftover
            && self.typesize <= MAX_SPLITS
            && bsize / self.typesize >= MIN_SPLIT_ELEMENTS;
        if split { self.typesize } else { 1 }
    }
}

/// Decode a whole frame, refusing frames that expand beyond `limit` bytes.
pub fn decompress(frame: &[u8], limit: usize) -> Result<Vec<u8>, BloscError> {
    let header = FrameHeader::parse(frame)?;
    if header.nbytes > limit {
        return Err(BloscError::TooLarge {
            declared: header.nbytes,
            limit,
        });
    }
    if header.nbytes == 0 {
        return Ok(Vec::new());
    }

    if header.memcpyed() {
        return frame
            .get(HEADER_LEN..HEADER_LEN + header.nbytes)
            .map(<[u8]>::to_vec)
            .ok_or(BloscError::Truncated { what: "uncompressed payload" });
    }

    let codec = header.codec();
    if !matches!(codec, Codec::Lz4 | Codec::Zlib) {
        return Err(BloscError::UnsupportedCodec(codec.name()));
    }

    let nblocks = header.nbytes.div_ceil(header.blocksize);
    let leftover = header.nbytes % header.blocksize;
    let starts = frame
        .get(HEADER_LEN..HEADER_LEN + nblocks * 4)
        .ok_or(BloscError::Truncated { what: "block offsets" })?;

    let mut out = vec![0u8; header.nbytes];
    for (block, (offset, dest)) in starts
        .chunks_exact(4)
        .zip(out.chunks_mut(header.blocksize))
        .enumerate()
    {
        let start = u32::from_le_bytes([offset[0], offset[1], offset[2], offset[3]]) as usize;
        let src = frame
            .get(start..)
            .ok_or(BloscError::Truncated { what: "block data" })?;
        let is_leftover = leftover != 0 && block == nblocks - 1;
        decode_block(&header, codec, src, dest, is_leftover)
            .map_err(|message| BloscError::Block { block, message })?;
    }
    Ok(out)
}

fn decode_block(
    header: &FrameHeader,
    codec: Codec,
    src: &[u8],
    dest: &mut [u8],
    leftover: bool,
) -> Result<(), String> {
    let bsize = dest.len();
    let typesize = header.typesize;
    let byte_shuffled = header.flags & FLAG_SHUFFLE != 0 && typesize > 1;
    let bit_shuffled = header.flags & FLAG_BITSHUFFLE != 0 && bsize >= typesize;

    let mut shuffled = if byte_shuffled || bit_shuffled {
        vec![0u8; bsize]
    } else {
        Vec::new()
    };
    let target: &mut [u8] = if byte_shuffled || bit_shuffled {
        &mut shuffled
    } else {
        &mut *dest
    };

    let nsplits = header.splits(bsize, leftover);
    if bsize % nsplits != 0 {
        return Err(format!("{} bytes do not split into {} streams", bsize, nsplits));
    }
    let neblock = bsize / nsplits;

    let mut pos = 0;
    for part in target.chunks_mut(neblock) {
        let len_bytes = src
            .get(pos..pos + 4)
            .ok_or_else(|| "truncated stream length".to_string())?;
        let cbytes =
            u32::from_le_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]) as usize;
        pos += 4;
        let stream = src
            .get(pos..pos.saturating_add(cbytes))
            .ok_or_else(|| format!("stream of {} bytes runs past the frame", cbytes))?;
        if cbytes == neblock {
            // Incompressible streams are stored as is
            part.copy_from_slice(stream);
        } else {
            codec.decompress_into(stream, part)?;
        }
        pos += cbytes;
    }

    if byte_shuffled {
        unshuffle(typesize, &shuffled, dest);
    } else if bit_shuffled {
        bit_unshuffle(typesize, &shuffled, dest);
    }
    Ok(())
}

/// Undo the byte shuffle: byte `j` of every element was stored contiguously.
fn unshuffle(typesize: usize, src: &[u8], dest: &mut [u8]) {
    let elements = src.len() / typesize;
    for j in 0..typesize {
        for i in 0..elements {
            dest[i * typesize + j] = src[j * elements + i];
        }
    }
    let tail = elements * typesize;
    dest[tail..].copy_from_slice(&src[tail..]);
}

/// Undo the bit shuffle: one row of bits per (byte, bit) of the element.
///
/// Only a whole number of 8-element groups is shuffled; blocks that are not
/// were stored unshuffled.
fn bit_unshuffle(typesize: usize, src: &[u8], dest: &mut [u8]) {
    let elements = src.len() / typesize;
    if elements % 8 != 0 {
        dest.copy_from_slice(src);
        return;
    }
    let row_len = elements / 8;
    let tail = elements * typesize;
    dest[..tail].fill(0);
    for j in 0..typesize {
        for bit in 0..8 {
            let row = &src[(j * 8 + bit) * row_len..][..row_len];
            for i in 0..elements {
                let value = (row[i / 8] >> (i % 8)) & 1;
                dest[i * typesize + j] |= value << bit;
            }
        }
    }
    dest[tail..].copy_from_slice(&src[tail..]);
}
