//! Error taxonomy shared by the packer and the reader.
//!
//! Every failure aborts the current run.  Variants carry the offending path
//! and the expected/actual values so the binaries can render a useful message
//! without re-deriving context.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::codec::CodecError;
use crate::crypto::CryptoError;

pub type FlkResult<T> = Result<T, FlkError>;

#[derive(Error, Debug)]
pub enum FlkError {
    // ── Pack-time validation ────────────────────────────────────────────────
    #[error("Invalid input directory: {}", path.display())]
    InvalidInputDirectory { path: PathBuf },

    #[error("Too many files: found {found}, maximum is {max}")]
    TooManyFiles { found: usize, max: usize },

    #[error("Path too long: {path} ({len} bytes, must be under {max})")]
    PathTooLong { path: String, len: usize, max: usize },

    #[error("Compressed path too long: {path} ({len} bytes after substitution, must be under {max})")]
    CompressedPathTooLong { path: String, len: usize, max: usize },

    #[error("Path is not valid UTF-8: {}", path.display())]
    NonUtf8Path { path: PathBuf },

    #[error("Path contains reserved control byte 0x{byte:02x}: {path:?}")]
    ReservedPathByte { path: String, byte: u8 },

    #[error("File too large: {path} ({size} bytes, limit {max})")]
    FileTooLarge { path: String, size: u64, max: u64 },

    #[error("Invalid compression level {level} (expected 1-22)")]
    InvalidCompressionLevel { level: i32 },

    #[error("No password supplied for an encrypted pack or archive")]
    MissingPassword,

    // ── Engine / I/O failures ───────────────────────────────────────────────
    #[error("Failed to read {}: {source}", path.display())]
    FileReadFailure { path: PathBuf, source: io::Error },

    #[error("Compression failed for {}: {source}", path.display())]
    CompressionFailure { path: PathBuf, source: CodecError },

    #[error("Decompression failed for {path}: {source}")]
    DecompressionFailure { path: String, source: CodecError },

    #[error("Encryption failed for {path}: {source}")]
    EncryptionFailure { path: String, source: CryptoError },

    #[error("Key derivation failed: {0}")]
    KeyDerivationFailure(#[source] CryptoError),

    #[error("Failed to write {}: {source}", path.display())]
    WriteFailure { path: PathBuf, source: io::Error },

    // ── Decryption ──────────────────────────────────────────────────────────
    #[error("Encrypted payload too short: {len} bytes, need at least {min}")]
    DecryptionTooShort { len: usize, min: usize },

    #[error("Authentication failed: wrong password or tampered data")]
    DecryptionAuthFailure,

    // ── Archive parsing ─────────────────────────────────────────────────────
    #[error("Not an FLK archive (magic {found:02x?})")]
    InvalidMagic { found: [u8; 4] },

    #[error("Unsupported FLK version: {0}")]
    UnsupportedVersion(u8),

    #[error("Corrupt header: {0}")]
    CorruptHeader(String),

    #[error("Entry {index} ({path}) spans {offset}..{end}, archive is {archive_len} bytes")]
    EntryOutOfBounds { index: usize, path: String, offset: u64, end: u64, archive_len: u64 },

    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    #[error("Size mismatch for {path}: expected {expected} bytes, got {actual}")]
    SizeMismatch { path: String, expected: u64, actual: u64 },

    #[error("Refusing to extract unsafe path: {0:?}")]
    UnsafeEntryPath(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl FlkError {
    /// True for failures that indicate tampering or wrong credentials rather
    /// than a malformed input or a bug.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, FlkError::DecryptionAuthFailure)
    }

    /// Map a decryption-side [`CryptoError`] onto the reader taxonomy.
    pub(crate) fn from_decrypt(err: CryptoError) -> Self {
        match err {
            CryptoError::TooShort { len, min } => FlkError::DecryptionTooShort { len, min },
            CryptoError::DecryptionFailed      => FlkError::DecryptionAuthFailure,
            other                              => FlkError::KeyDerivationFailure(other),
        }
    }
}
