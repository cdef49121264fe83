//! Reading .flk archives.
//!
//! The container does not record which transform produced its blobs.
//! Encryption is implied by a non-empty global salt; compression must be
//! stated by the caller through [`UnpackOptions::compressed`].
//!
//! ```no_run
//! use flkpak::reader::{FlkReader, UnpackOptions};
//!
//! let opts = UnpackOptions { compressed: true, password: None };
//! let mut ar = FlkReader::open("assets.flk", &opts)?;
//! for info in ar.list() {
//!     println!("{} {}", info.path, info.base_size);
//! }
//! let data = ar.read_file("textures/hero.png")?;
//! # Ok::<(), flkpak::FlkError>(())
//! ```

use std::fs::{self, File};
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Component, Path, PathBuf};

use serde::Serialize;

use crate::codec::{CompressionEngine, ZstdEngine};
use crate::crypto::Decryptor;
use crate::error::{FlkError, FlkResult};
use crate::format::{Entry, Header, HEADER_SIZE, MAX_FILE_SIZE};
use crate::path_codec;

// ── UnpackOptions ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct UnpackOptions {
    /// Blobs are Zstd frames (archive was packed with compression).
    pub compressed: bool,
    /// Required when the archive carries a global salt.
    pub password:   Option<String>,
}

// ── EntryInfo ─────────────────────────────────────────────────────────────────

/// Descriptor returned by [`FlkReader::list`].
#[derive(Debug, Clone, Serialize)]
pub struct EntryInfo {
    pub index:       usize,
    /// Decoded relative path.
    pub path:        String,
    pub offset:      u64,
    pub base_size:   u64,
    pub packed_size: u64,
}

impl EntryInfo {
    fn from_entry(index: usize, entry: &Entry) -> Self {
        Self {
            index,
            path:        decode_path(entry),
            offset:      entry.offset,
            base_size:   entry.base_size,
            packed_size: entry.packed_size,
        }
    }
}

pub fn decode_path(entry: &Entry) -> String {
    path_codec::decompress(&String::from_utf8_lossy(entry.path_bytes()))
}

// ── VerifyReport ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize)]
pub struct VerifyReport {
    pub entries_checked: usize,
    pub bytes_decoded:   u64,
}

// ── FlkReader ─────────────────────────────────────────────────────────────────

pub struct FlkReader<R: Read + Seek> {
    reader:      R,
    pub header:  Header,
    pub salt:    Vec<u8>,
    archive_len: u64,
    compressed:  bool,
    decryptor:   Option<Decryptor>,
    engine:      ZstdEngine,
}

impl FlkReader<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P, opts: &UnpackOptions) -> FlkResult<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|source| FlkError::FileReadFailure { path: path.to_path_buf(), source })?;
        Self::new(BufReader::new(file), opts)
    }
}

impl<R: Read + Seek> FlkReader<R> {
    /// Parse the header and salt.  When the archive is encrypted and a
    /// password is supplied, the decryption key is derived here; without one
    /// the header can still be listed but blob reads fail.
    pub fn new(mut reader: R, opts: &UnpackOptions) -> FlkResult<Self> {
        let archive_len = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;
        if archive_len < HEADER_SIZE as u64 {
            return Err(FlkError::CorruptHeader(format!(
                "archive is {archive_len} bytes, header needs {HEADER_SIZE}"
            )));
        }

        let header = Header::read(&mut reader)?;
        if header.data_start() > archive_len {
            return Err(FlkError::CorruptHeader(format!(
                "salt of {} bytes runs past end of archive", header.salt_len
            )));
        }
        let mut salt = vec![0u8; header.salt_len as usize];
        reader.read_exact(&mut salt)?;

        let decryptor = match (&opts.password, salt.is_empty()) {
            (Some(password), false) => Some(
                Decryptor::new(password, &salt).map_err(FlkError::KeyDerivationFailure)?,
            ),
            _ => None,
        };

        tracing::debug!(
            "opened archive: {} entries, salt {} bytes, content version {}",
            header.entry_count(), salt.len(), header.content_version
        );

        Ok(Self {
            reader,
            header,
            salt,
            archive_len,
            compressed: opts.compressed,
            decryptor,
            engine: ZstdEngine,
        })
    }

    pub fn is_encrypted(&self) -> bool { !self.salt.is_empty() }
    pub fn archive_len(&self) -> u64 { self.archive_len }
    pub fn len(&self) -> usize { self.header.entries.len() }
    pub fn is_empty(&self) -> bool { self.header.entries.is_empty() }

    pub fn list(&self) -> Vec<EntryInfo> {
        self.header.entries.used().iter()
            .enumerate()
            .map(|(i, e)| EntryInfo::from_entry(i, e))
            .collect()
    }

    pub fn stat(&self, path: &str) -> Option<EntryInfo> {
        self.list().into_iter().find(|e| e.path == path)
    }

    /// Stored bytes of entry `index`, exactly as written.
    pub fn read_raw(&mut self, index: usize) -> FlkResult<Vec<u8>> {
        let entry = self.header.entries.get(index)
            .ok_or_else(|| FlkError::EntryNotFound(format!("#{index}")))?;
        let end = entry.offset.checked_add(entry.packed_size)
            .filter(|&end| end <= self.archive_len && entry.offset >= self.header.data_start())
            .ok_or_else(|| FlkError::EntryOutOfBounds {
                index,
                path:        decode_path(entry),
                offset:      entry.offset,
                end:         entry.offset.saturating_add(entry.packed_size),
                archive_len: self.archive_len,
            })?;

        let mut blob = vec![0u8; (end - entry.offset) as usize];
        self.reader.seek(SeekFrom::Start(entry.offset))?;
        self.reader.read_exact(&mut blob)?;
        Ok(blob)
    }

    /// Original contents of entry `index`: decrypt, then decompress.
    pub fn read_entry(&mut self, index: usize) -> FlkResult<Vec<u8>> {
        let blob = self.read_raw(index)?;
        let entry = &self.header.entries.used()[index];
        if entry.base_size > MAX_FILE_SIZE {
            return Err(FlkError::CorruptHeader(format!(
                "entry {index} ({}) declares {} bytes, limit is {MAX_FILE_SIZE}",
                decode_path(entry), entry.base_size
            )));
        }

        let data = match (&self.decryptor, self.salt.is_empty()) {
            (Some(dec), _) => dec.decrypt(&blob).map_err(FlkError::from_decrypt)?,
            (None, true)   => blob,
            (None, false)  => return Err(FlkError::MissingPassword),
        };

        let data = if self.compressed {
            self.engine.decompress(&data, entry.base_size)
                .map_err(|source| FlkError::DecompressionFailure { path: decode_path(entry), source })?
        } else {
            data
        };

        if data.len() as u64 != entry.base_size {
            return Err(FlkError::SizeMismatch {
                path:     decode_path(entry),
                expected: entry.base_size,
                actual:   data.len() as u64,
            });
        }
        Ok(data)
    }

    pub fn read_file(&mut self, path: &str) -> FlkResult<Vec<u8>> {
        let index = self.stat(path)
            .ok_or_else(|| FlkError::EntryNotFound(path.to_owned()))?
            .index;
        self.read_entry(index)
    }

    /// Extract every entry under `dest`, creating directories as needed.
    /// Returns the number of files written.
    pub fn extract_all<P: AsRef<Path>>(&mut self, dest: P) -> FlkResult<usize> {
        let dest = dest.as_ref();
        for info in self.list() {
            let target = safe_join(dest, &info.path)?;
            let data = self.read_entry(info.index)?;
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)
                    .map_err(|source| FlkError::WriteFailure { path: parent.to_path_buf(), source })?;
            }
            fs::write(&target, &data)
                .map_err(|source| FlkError::WriteFailure { path: target.clone(), source })?;
            tracing::info!("extracted {} ({} bytes)", info.path, data.len());
        }
        Ok(self.len())
    }

    /// Structural and content check of the whole archive.
    pub fn verify(&mut self) -> FlkResult<VerifyReport> {
        let mut expected = self.header.data_start();
        for (index, entry) in self.header.entries.used().iter().enumerate() {
            if entry.offset != expected {
                return Err(FlkError::CorruptHeader(format!(
                    "entry {index} ({}) at offset {}, expected {expected}",
                    decode_path(entry), entry.offset
                )));
            }
            expected = expected.saturating_add(entry.packed_size);
        }
        if let Some(slot) = self.header.entries.unused().iter().position(|e| !e.is_sentinel()) {
            return Err(FlkError::CorruptHeader(format!(
                "unused slot {} does not carry the sentinel pattern",
                self.header.entries.len() + slot
            )));
        }

        let mut report = VerifyReport::default();
        for index in 0..self.len() {
            let data = self.read_entry(index)?;
            report.entries_checked += 1;
            report.bytes_decoded   += data.len() as u64;
        }
        if expected != self.archive_len {
            tracing::warn!("{} trailing bytes after last entry", self.archive_len.saturating_sub(expected));
        }
        Ok(report)
    }
}

/// Join an archive path onto `dest`, refusing anything that could escape it.
fn safe_join(dest: &Path, rel: &str) -> FlkResult<PathBuf> {
    let rel_path = Path::new(rel);
    if rel.is_empty() || !rel_path.components().all(|c| matches!(c, Component::Normal(_))) {
        return Err(FlkError::UnsafeEntryPath(rel.to_owned()));
    }
    Ok(dest.join(rel_path))
}
