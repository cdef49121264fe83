//! Compression engine used by the packer.
//!
//! Packing streams a file through the encoder in fixed-size input chunks so
//! peak memory stays independent of the file size.  Unpacking is one-shot:
//! the entry's `base_size` is known from the header and bounds the output.
//!
//! Every compressed blob is a single standard Zstandard frame.

use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::Path;
use thiserror::Error;

/// Input chunk size fed to the encoder (matches `ZSTD_CStreamInSize`).
pub const CHUNK_SIZE: usize = 128 * 1024;
/// Default Zstd compression level.
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;
pub const MIN_COMPRESSION_LEVEL: i32 = 1;
pub const MAX_COMPRESSION_LEVEL: i32 = 22;

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Compression error: {0}")]
    Compression(String),
    #[error("Decompression error: {0}")]
    Decompression(String),
    #[error("Decompressed {actual} bytes, expected {expected}")]
    SizeMismatch { expected: u64, actual: u64 },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── Compressed output ────────────────────────────────────────────────────────

/// Result of compressing one file.
#[derive(Debug, Clone)]
pub struct Compressed {
    pub data:          Vec<u8>,
    /// Bytes consumed from the source file.
    pub original_size: u64,
}

// ── Engine trait ─────────────────────────────────────────────────────────────

pub trait CompressionEngine {
    /// Compress the file at `path`, streaming it in chunks.
    fn compress_file(&self, path: &Path, level: i32) -> Result<Compressed, CodecError>;
    /// Decompress `data` that is known to expand to exactly `original_size` bytes.
    fn decompress(&self, data: &[u8], original_size: u64) -> Result<Vec<u8>, CodecError>;
}

// ── Zstandard ────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy)]
pub struct ZstdEngine;

impl ZstdEngine {
    /// Stream any reader through the encoder.  Returns the frame and the
    /// number of input bytes consumed.
    pub fn compress_reader<R: Read>(&self, mut reader: R, level: i32) -> Result<Compressed, CodecError> {
        let mut encoder = zstd::stream::write::Encoder::new(Vec::new(), level)
            .map_err(|e| CodecError::Compression(e.to_string()))?;

        let mut chunk = vec![0u8; CHUNK_SIZE];
        let mut original_size = 0u64;
        loop {
            let n = match reader.read(&mut chunk) {
                Ok(0)  => break,
                Ok(n)  => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(CodecError::Io(e)),
            };
            encoder.write_all(&chunk[..n])
                .map_err(|e| CodecError::Compression(e.to_string()))?;
            original_size += n as u64;
        }

        let data = encoder.finish()
            .map_err(|e| CodecError::Compression(e.to_string()))?;
        Ok(Compressed { data, original_size })
    }
}

impl CompressionEngine for ZstdEngine {
    fn compress_file(&self, path: &Path, level: i32) -> Result<Compressed, CodecError> {
        let file = File::open(path)?;
        self.compress_reader(BufReader::with_capacity(CHUNK_SIZE, file), level)
    }

    fn decompress(&self, data: &[u8], original_size: u64) -> Result<Vec<u8>, CodecError> {
        let capacity = usize::try_from(original_size)
            .map_err(|_| CodecError::Decompression(format!("size {original_size} exceeds address space")))?;
        let out = zstd::bulk::decompress(data, capacity)
            .map_err(|e| CodecError::Decompression(e.to_string()))?;
        if out.len() as u64 != original_size {
            return Err(CodecError::SizeMismatch { expected: original_size, actual: out.len() as u64 });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compresses_across_chunk_boundaries() {
        let data: Vec<u8> = (0..CHUNK_SIZE * 2 + 17).map(|i| (i % 61) as u8).collect();
        let engine = ZstdEngine;
        let out = engine.compress_reader(&data[..], DEFAULT_COMPRESSION_LEVEL).unwrap();
        assert_eq!(out.original_size, data.len() as u64);
        assert!(out.data.len() < data.len());
        assert_eq!(engine.decompress(&out.data, out.original_size).unwrap(), data);
    }

    #[test]
    fn empty_input_yields_valid_frame() {
        let engine = ZstdEngine;
        let out = engine.compress_reader(&b""[..], 1).unwrap();
        assert_eq!(out.original_size, 0);
        assert!(!out.data.is_empty());
        assert!(engine.decompress(&out.data, 0).unwrap().is_empty());
    }

    #[test]
    fn wrong_original_size_is_rejected() {
        let engine = ZstdEngine;
        let out = engine.compress_reader(&b"twelve bytes"[..], 3).unwrap();
        assert!(engine.decompress(&out.data, 4).is_err());
        assert!(matches!(
            engine.decompress(&out.data, 64),
            Err(CodecError::SizeMismatch { expected: 64, actual: 12 })
        ));
    }

    #[test]
    fn corrupt_frame_fails() {
        let engine = ZstdEngine;
        assert!(matches!(
            engine.decompress(b"definitely not zstd", 19),
            Err(CodecError::Decompression(_))
        ));
    }
}
