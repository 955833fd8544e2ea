//! ROOT compression framing (ZL = zlib, XZ = LZMA, L4 = LZ4, ZS = ZSTD).
//!
//! ROOT writes compressed payloads as one or more blocks with a 9-byte header:
//! ```text
//! bytes 0-1:  algorithm tag ("ZL", "XZ", "L4", "ZS"; "CS" is the legacy codec)
//! byte  2:    method
//! bytes 3-5:  compressed size   (3-byte little-endian)
//! bytes 6-8:  uncompressed size (3-byte little-endian)
//! ```
//! LZ4 blocks carry an additional 8-byte checksum before the LZ4 payload.
//! The tag on disk always decides the codec, whatever the file-level
//! [`Compression`] says.

use std::fmt;

use crate::error::{Result, RootError};

/// Size of the block header.
pub const HEADER_SIZE: usize = 9;
/// Size of the checksum that prefixes LZ4 payloads.
pub const LZ4_CHECKSUM_SIZE: usize = 8;

std::thread_local! {
    static ZSTD_DECODER: std::cell::RefCell<ruzstd::decoding::FrameDecoder> =
        std::cell::RefCell::new(ruzstd::decoding::FrameDecoder::new());
}

/// Compression algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    /// No compression.
    None,
    /// zlib (deflate).
    Zlib,
    /// LZMA in an XZ container.
    Lzma,
    /// Legacy ROOT codec; recognised but not decodable.
    Old,
    /// LZ4 block format.
    Lz4,
    /// Zstandard.
    Zstd,
}

impl Algorithm {
    /// Algorithm announced by a block tag.
    pub fn from_tag(tag: &[u8]) -> Option<Self> {
        match tag {
            b"ZL" => Some(Algorithm::Zlib),
            b"XZ" => Some(Algorithm::Lzma),
            b"L4" => Some(Algorithm::Lz4),
            b"ZS" => Some(Algorithm::Zstd),
            b"CS" => Some(Algorithm::Old),
            _ => None,
        }
    }
}

/// File- or branch-level compression setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Compression {
    /// Codec.
    pub algorithm: Algorithm,
    /// Level in `0..=9`; `0` means uncompressed.
    pub level: u8,
}

impl Compression {
    /// Decode ROOT's `fCompress` (`algorithm * 100 + level`).
    ///
    /// Algorithm `0` is ROOT's "global default", which is zlib.
    pub fn from_fcompress(fcompress: i32) -> Self {
        let fcompress = fcompress.max(0);
        let level = (fcompress % 100).min(9) as u8;
        let algorithm = match fcompress / 100 {
            _ if level == 0 => Algorithm::None,
            0 | 1 => Algorithm::Zlib,
            2 => Algorithm::Lzma,
            3 => Algorithm::Old,
            4 => Algorithm::Lz4,
            5 => Algorithm::Zstd,
            other => {
                log::warn!("unknown compression algorithm {other} in fCompress={fcompress}");
                Algorithm::Zlib
            }
        };
        Self { algorithm, level }
    }

    /// No compression.
    pub fn none() -> Self {
        Self { algorithm: Algorithm::None, level: 0 }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self.algorithm, self.level)
    }
}

/// Decompress a framed payload into exactly `expected_len` bytes.
///
/// Consecutive blocks are concatenated until `expected_len` bytes have been
/// produced. Failures are never retried.
pub fn decompress(src: &[u8], expected_len: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(expected_len);
    let mut offset = 0;

    while out.len() < expected_len {
        if offset + HEADER_SIZE > src.len() {
            return Err(RootError::Decompression(format!(
                "truncated block header at offset {offset} ({} bytes produced of {expected_len})",
                out.len()
            )));
        }
        let tag = &src[offset..offset + 2];
        let c_size = read_le24(&src[offset + 3..offset + 6]);
        let u_size = read_le24(&src[offset + 6..offset + 9]);
        offset += HEADER_SIZE;

        let end = offset + c_size;
        if end > src.len() {
            return Err(RootError::Decompression(format!(
                "compressed block claims {c_size} bytes but only {} remain",
                src.len() - offset
            )));
        }
        let body = &src[offset..end];

        let block = match Algorithm::from_tag(tag) {
            Some(Algorithm::Zlib) => decompress_zlib(body, u_size)?,
            Some(Algorithm::Lzma) => decompress_xz(body, u_size)?,
            Some(Algorithm::Lz4) => decompress_lz4(body, u_size)?,
            Some(Algorithm::Zstd) => decompress_zstd(body, u_size)?,
            Some(Algorithm::Old) => {
                return Err(RootError::UnsupportedAlgorithm("CS (legacy ROOT codec)".into()));
            }
            _ => {
                return Err(RootError::UnsupportedAlgorithm(format!(
                    "{:?}",
                    String::from_utf8_lossy(tag)
                )));
            }
        };

        if block.len() != u_size {
            return Err(RootError::Decompression(format!(
                "expected {u_size} uncompressed bytes, got {}",
                block.len()
            )));
        }
        out.extend_from_slice(&block);
        offset = end;
    }

    if out.len() != expected_len {
        return Err(RootError::Decompression(format!(
            "total decompressed length {} != expected {expected_len}",
            out.len()
        )));
    }
    Ok(out)
}

fn decompress_zlib(data: &[u8], expected: usize) -> Result<Vec<u8>> {
    use flate2::read::ZlibDecoder;
    use std::io::Read;

    let mut out = Vec::with_capacity(expected);
    ZlibDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|e| RootError::Decompression(format!("zlib: {e}")))?;
    Ok(out)
}

fn decompress_lz4(data: &[u8], expected: usize) -> Result<Vec<u8>> {
    // The checksum (xxhash64 of the payload) is not verified.
    if data.len() < LZ4_CHECKSUM_SIZE {
        return Err(RootError::Decompression("LZ4 block too small for checksum header".into()));
    }
    lz4_flex::decompress(&data[LZ4_CHECKSUM_SIZE..], expected)
        .map_err(|e| RootError::Decompression(format!("lz4: {e}")))
}

fn decompress_zstd(data: &[u8], expected: usize) -> Result<Vec<u8>> {
    let mut out = vec![0u8; expected];
    let written = ZSTD_DECODER
        .with(|cell| cell.borrow_mut().decode_all(data, &mut out))
        .map_err(|e| RootError::Decompression(format!("zstd: {e}")))?;
    out.truncate(written);
    Ok(out)
}

fn decompress_xz(data: &[u8], expected: usize) -> Result<Vec<u8>> {
    let mut input = std::io::BufReader::new(data);
    let mut out = Vec::with_capacity(expected);
    lzma_rs::xz_decompress(&mut input, &mut out)
        .map_err(|e| RootError::Decompression(format!("xz: {e}")))?;
    Ok(out)
}

fn read_le24(b: &[u8]) -> usize {
    b[0] as usize | ((b[1] as usize) << 8) | ((b[2] as usize) << 16)
}
