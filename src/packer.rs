//! Pack a directory tree into a single .flk archive.
//!
//! ```no_run
//! use flkpak::packer::{pack, PackMode, PackOptions};
//!
//! let opts = PackOptions { mode: PackMode::Compressed, ..PackOptions::default() };
//! let summary = pack("assets", "assets.flk", &opts)?;
//! println!("{} entries, {} bytes", summary.entry_count, summary.archive_size);
//! # Ok::<(), flkpak::FlkError>(())
//! ```
//!
//! A run walks the input once, validates every file, transforms it according
//! to the [`PackMode`], then fixes up the sentinel slots and offsets and
//! writes header, salt and blobs in one pass.  Any failure aborts the run; a
//! partially written output file is left as is.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::codec::{CompressionEngine, ZstdEngine, DEFAULT_COMPRESSION_LEVEL,
                   MAX_COMPRESSION_LEVEL, MIN_COMPRESSION_LEVEL};
use crate::crypto::Encryptor;
use crate::error::{FlkError, FlkResult};
use crate::format::{Entry, Header, MAX_ENTRIES, MAX_FILE_SIZE, MAX_PATH_LEN};
use crate::path_codec;

// ── PackMode ──────────────────────────────────────────────────────────────────

/// The four per-file transforms a run can apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PackMode {
    #[default]
    Plain,
    Compressed,
    Encrypted,
    CompressedEncrypted,
}

impl PackMode {
    pub fn from_flags(compress: bool, encrypt: bool) -> Self {
        match (compress, encrypt) {
            (false, false) => PackMode::Plain,
            (true,  false) => PackMode::Compressed,
            (false, true)  => PackMode::Encrypted,
            (true,  true)  => PackMode::CompressedEncrypted,
        }
    }

    pub fn compresses(self) -> bool {
        matches!(self, PackMode::Compressed | PackMode::CompressedEncrypted)
    }

    pub fn encrypts(self) -> bool {
        matches!(self, PackMode::Encrypted | PackMode::CompressedEncrypted)
    }

    /// Stored paths go through [`path_codec`] only in the compressed modes.
    pub fn encodes_paths(self) -> bool {
        self.compresses()
    }

    pub fn name(self) -> &'static str {
        match self {
            PackMode::Plain               => "uncompressed + unencrypted",
            PackMode::Compressed          => "compressed + unencrypted",
            PackMode::Encrypted           => "uncompressed + encrypted",
            PackMode::CompressedEncrypted => "compressed + encrypted",
        }
    }
}

// ── PackOptions ───────────────────────────────────────────────────────────────

/// Configuration for [`pack`].
#[derive(Debug, Clone)]
pub struct PackOptions {
    pub mode:            PackMode,
    /// Zstd level, 1-22.  Ignored unless the mode compresses.
    pub level:           i32,
    /// Stored verbatim in the header.
    pub content_version: u32,
    /// Required when the mode encrypts.
    pub password:        Option<String>,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            mode:            PackMode::Plain,
            level:           DEFAULT_COMPRESSION_LEVEL,
            content_version: 0,
            password:        None,
        }
    }
}

// ── PackSummary ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PackSummary {
    pub mode:         PackMode,
    pub entry_count:  usize,
    pub salt_len:     usize,
    /// Sum of `base_size` over all entries.
    pub total_base:   u64,
    /// Sum of `packed_size` over all entries.
    pub total_packed: u64,
    pub archive_size: u64,
}

// ── Validation ────────────────────────────────────────────────────────────────

/// Per-file constraints checked before any bytes are read.  `rel_path` is
/// the original, unencoded relative path.
pub fn validate_file(rel_path: &str, size: u64) -> FlkResult<()> {
    if rel_path.len() >= MAX_PATH_LEN {
        return Err(FlkError::PathTooLong {
            path: rel_path.to_owned(),
            len:  rel_path.len(),
            max:  MAX_PATH_LEN,
        });
    }
    if size > MAX_FILE_SIZE {
        return Err(FlkError::FileTooLarge {
            path: rel_path.to_owned(),
            size,
            max:  MAX_FILE_SIZE,
        });
    }
    if let Some(byte) = path_codec::find_reserved_byte(rel_path) {
        return Err(FlkError::ReservedPathByte { path: rel_path.to_owned(), byte });
    }
    Ok(())
}

/// Encode `rel_path` for storage and check it still fits the path field.
pub fn encode_stored_path(rel_path: &str) -> FlkResult<String> {
    let stored = path_codec::compress(rel_path);
    if stored.len() >= MAX_PATH_LEN {
        return Err(FlkError::CompressedPathTooLong {
            path: rel_path.to_owned(),
            len:  stored.len(),
            max:  MAX_PATH_LEN,
        });
    }
    Ok(stored)
}

/// Relative path with `/` separators, independent of the host platform.
/// Names that are not valid UTF-8 fail the run instead of being rewritten.
pub fn normalize_rel_path(root: &Path, file: &Path) -> FlkResult<String> {
    let rel = file.strip_prefix(root).map_err(|_| FlkError::InvalidInputDirectory {
        path: root.to_path_buf(),
    })?;
    let parts = rel
        .components()
        .map(|c| c.as_os_str().to_str().ok_or_else(|| FlkError::NonUtf8Path { path: file.to_path_buf() }))
        .collect::<FlkResult<Vec<&str>>>()?;
    Ok(parts.join("/"))
}

// ── Packer ────────────────────────────────────────────────────────────────────

struct SourceFile {
    abs:  PathBuf,
    rel:  String,
    size: u64,
}

/// State of a single pack run.  Consumed by [`Packer::run`].
pub struct Packer<C: CompressionEngine = ZstdEngine> {
    input:      PathBuf,
    output:     PathBuf,
    opts:       PackOptions,
    compressor: C,
    header:     Header,
    blobs:      Vec<Vec<u8>>,
    encryptor:  Option<Encryptor>,
    salt:       Vec<u8>,
}

impl Packer<ZstdEngine> {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(input: P, output: Q, opts: PackOptions) -> Self {
        Self::with_engine(input, output, opts, ZstdEngine)
    }
}

impl<C: CompressionEngine> Packer<C> {
    pub fn with_engine<P: AsRef<Path>, Q: AsRef<Path>>(
        input:      P,
        output:     Q,
        opts:       PackOptions,
        compressor: C,
    ) -> Self {
        let header = Header::new(opts.content_version);
        Self {
            input:  input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            opts,
            compressor,
            header,
            blobs:     Vec::new(),
            encryptor: None,
            salt:      Vec::new(),
        }
    }

    pub fn run(mut self) -> FlkResult<PackSummary> {
        self.validate_input()?;
        let files = self.enumerate()?;

        tracing::info!(
            mode = self.opts.mode.name(),
            level = self.opts.level,
            "packing {} file(s) from {} into {}",
            files.len(), self.input.display(), self.output.display()
        );

        for file in &files {
            self.process_file(file)?;
        }

        let archive_size = self.finalize();
        self.serialize()?;

        let summary = PackSummary {
            mode:         self.opts.mode,
            entry_count:  self.header.entries.len(),
            salt_len:     self.salt.len(),
            total_base:   self.header.entries.used().iter().map(|e| e.base_size).sum(),
            total_packed: self.header.entries.used().iter().map(|e| e.packed_size).sum(),
            archive_size,
        };
        tracing::info!(
            "packed {} file(s) into {} ({} bytes)",
            summary.entry_count, self.output.display(), summary.archive_size
        );
        Ok(summary)
    }

    // ── ValidatingInput ──────────────────────────────────────────────────────

    fn validate_input(&self) -> FlkResult<()> {
        if !self.input.is_dir() {
            return Err(FlkError::InvalidInputDirectory { path: self.input.clone() });
        }
        if self.opts.mode.compresses()
            && !(MIN_COMPRESSION_LEVEL..=MAX_COMPRESSION_LEVEL).contains(&self.opts.level)
        {
            return Err(FlkError::InvalidCompressionLevel { level: self.opts.level });
        }
        if self.opts.mode.encrypts() && self.opts.password.is_none() {
            return Err(FlkError::MissingPassword);
        }
        Ok(())
    }

    // ── Counting + Enumerating ───────────────────────────────────────────────

    /// Regular files under the input, sorted by name per directory.  Symlinks
    /// to files are packed as the file they point at; directory symlinks are
    /// not descended.  The count is checked before any file is validated or
    /// read.
    fn enumerate(&self) -> FlkResult<Vec<SourceFile>> {
        let mut files = Vec::new();
        for ent in WalkDir::new(&self.input).follow_links(false).sort_by_file_name() {
            let ent = ent.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| self.input.clone());
                let source = e.into_io_error()
                    .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "directory walk failed"));
                FlkError::FileReadFailure { path, source }
            })?;

            let size = if ent.file_type().is_file() {
                ent.metadata()
                    .map_err(|e| FlkError::FileReadFailure {
                        path:   ent.path().to_path_buf(),
                        source: e.into_io_error().unwrap_or_else(|| io::Error::new(
                            io::ErrorKind::Other, "metadata unavailable")),
                    })?
                    .len()
            } else if ent.path_is_symlink() {
                match fs::metadata(ent.path()) {
                    Ok(meta) if meta.is_file() => meta.len(),
                    Ok(_) => {
                        tracing::warn!("skipping symlink to non-file {}", ent.path().display());
                        continue;
                    }
                    Err(e) => {
                        tracing::warn!("skipping dangling symlink {}: {e}", ent.path().display());
                        continue;
                    }
                }
            } else {
                continue;
            };

            files.push(SourceFile {
                rel:  normalize_rel_path(&self.input, ent.path())?,
                abs:  ent.into_path(),
                size,
            });
        }

        tracing::debug!("found {} file(s) in {}", files.len(), self.input.display());
        if files.len() > MAX_ENTRIES {
            return Err(FlkError::TooManyFiles { found: files.len(), max: MAX_ENTRIES });
        }
        Ok(files)
    }

    // ── Validating → Transforming → Filling ──────────────────────────────────

    fn process_file(&mut self, file: &SourceFile) -> FlkResult<()> {
        validate_file(&file.rel, file.size)?;
        let stored_path = if self.opts.mode.encodes_paths() {
            encode_stored_path(&file.rel)?
        } else {
            file.rel.clone()
        };

        if stored_path.len() == file.rel.len() {
            tracing::info!("processing {}", file.rel);
        } else {
            tracing::info!(
                "processing {} (path saved {} bytes)",
                file.rel, file.rel.len() - stored_path.len()
            );
        }

        let (blob, base_size) = self.transform(file)?;
        tracing::debug!("{}: {} -> {} bytes", file.rel, base_size, blob.len());

        self.header.entries.push(Entry::new(stored_path.as_bytes(), base_size, blob.len() as u64))?;
        self.blobs.push(blob);
        Ok(())
    }

    /// Returns the bytes to store and the pre-transform size.
    fn transform(&mut self, file: &SourceFile) -> FlkResult<(Vec<u8>, u64)> {
        let (data, base_size) = if self.opts.mode.compresses() {
            let out = self.compressor
                .compress_file(&file.abs, self.opts.level)
                .map_err(|source| FlkError::CompressionFailure { path: file.abs.clone(), source })?;
            (out.data, out.original_size)
        } else {
            let data = fs::read(&file.abs)
                .map_err(|source| FlkError::FileReadFailure { path: file.abs.clone(), source })?;
            let len = data.len() as u64;
            (data, len)
        };

        if !self.opts.mode.encrypts() {
            return Ok((data, base_size));
        }

        let encryptor = self.encryptor()?;
        let blob = encryptor
            .encrypt(&data)
            .map_err(|source| FlkError::EncryptionFailure { path: file.rel.clone(), source })?;
        Ok((blob, base_size))
    }

    /// The run's encryptor, created with a fresh salt on first use.
    fn encryptor(&mut self) -> FlkResult<&Encryptor> {
        if self.encryptor.is_none() {
            let password = self.opts.password.as_deref().ok_or(FlkError::MissingPassword)?;
            let enc = Encryptor::new(password).map_err(FlkError::KeyDerivationFailure)?;
            self.salt = enc.salt().to_vec();
            tracing::debug!("captured {}-byte global salt", self.salt.len());
            self.encryptor = Some(enc);
        }
        self.encryptor.as_ref().ok_or(FlkError::MissingPassword)
    }

    // ── Finalizing ───────────────────────────────────────────────────────────

    /// Sentinel-fill unused slots, record the salt length and assign offsets.
    /// Returns the final archive length.
    fn finalize(&mut self) -> u64 {
        self.header.entries.fill_unused();
        self.header.salt_len = self.salt.len() as u32;
        let end = self.header.assign_offsets();
        if let Some(first) = self.header.entries.used().first() {
            tracing::debug!("first blob at offset {}", first.offset);
        }
        end
    }

    // ── Serializing ──────────────────────────────────────────────────────────

    fn serialize(&self) -> FlkResult<()> {
        let write_failure = |source| FlkError::WriteFailure { path: self.output.clone(), source };

        let file = File::create(&self.output).map_err(write_failure)?;
        let mut out = BufWriter::new(file);
        self.header.write(&mut out).map_err(write_failure)?;
        out.write_all(&self.salt).map_err(write_failure)?;
        for blob in &self.blobs {
            out.write_all(blob).map_err(write_failure)?;
        }
        out.flush().map_err(write_failure)?;
        Ok(())
    }
}

/// Pack `input` into `output` with `opts`.
pub fn pack<P: AsRef<Path>, Q: AsRef<Path>>(input: P, output: Q, opts: &PackOptions) -> FlkResult<PackSummary> {
    Packer::new(input, output, opts.clone()).run()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_flags_select_all_four_modes() {
        assert_eq!(PackMode::from_flags(false, false), PackMode::Plain);
        assert_eq!(PackMode::from_flags(true, false), PackMode::Compressed);
        assert_eq!(PackMode::from_flags(false, true), PackMode::Encrypted);
        assert_eq!(PackMode::from_flags(true, true), PackMode::CompressedEncrypted);
        assert!(PackMode::CompressedEncrypted.encodes_paths());
        assert!(!PackMode::Encrypted.encodes_paths());
    }

    #[test]
    fn path_length_boundary() {
        let ok = "a".repeat(MAX_PATH_LEN - 1);
        assert!(validate_file(&ok, 0).is_ok());

        let long = "a".repeat(MAX_PATH_LEN);
        assert!(matches!(
            validate_file(&long, 0),
            Err(FlkError::PathTooLong { len: 128, max: 128, .. })
        ));
    }

    #[test]
    fn file_size_boundary() {
        assert!(validate_file("big.bin", MAX_FILE_SIZE).is_ok());
        assert!(matches!(
            validate_file("big.bin", MAX_FILE_SIZE + 1),
            Err(FlkError::FileTooLarge { size, .. }) if size == (1 << 30) + 1
        ));
    }

    #[test]
    fn path_is_checked_before_size() {
        let long = "b".repeat(200);
        assert!(matches!(validate_file(&long, u64::MAX), Err(FlkError::PathTooLong { .. })));
    }

    #[test]
    fn control_bytes_are_rejected() {
        assert!(matches!(
            validate_file("sounds/\x02.wav", 1),
            Err(FlkError::ReservedPathByte { byte: 0x02, .. })
        ));
    }

    #[test]
    fn stored_path_must_fit_after_encoding() {
        // No dictionary hits: encoding leaves 127 bytes, which still fits.
        let fits = "z".repeat(MAX_PATH_LEN - 1);
        assert_eq!(encode_stored_path(&fits).unwrap().len(), MAX_PATH_LEN - 1);

        let over = "z".repeat(MAX_PATH_LEN);
        assert!(matches!(
            encode_stored_path(&over),
            Err(FlkError::CompressedPathTooLong { len: 128, .. })
        ));

        let shrunk = encode_stored_path("textures/stone.png").unwrap();
        assert_eq!(shrunk, "\x01stone\x0D");
    }

    #[test]
    fn relative_paths_use_forward_slashes() {
        let root = Path::new("/root/assets");
        let file = root.join("textures").join("ui").join("icon.png");
        assert_eq!(normalize_rel_path(root, &file).unwrap(), "textures/ui/icon.png");
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_names_are_rejected() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let root = Path::new("/root/assets");
        let file = root.join(OsStr::from_bytes(b"a\xff.txt"));
        assert!(matches!(
            normalize_rel_path(root, &file),
            Err(FlkError::NonUtf8Path { path }) if path == file
        ));
    }
}
