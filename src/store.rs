//! File persistence for archives.
//!
//! The file body is [`Archive::to_bytes`]. Optionally an 8-byte little-endian
//! xxh64 of the body is appended, and the result compressed as a zstd frame.
//! Saves go through a `.tmp` file and a rename, so a crash mid-write leaves
//! the previous file intact.

use crate::archive::Archive;
use crate::error::{Error, Result};
use crate::schema::Schema;
use fs2::FileExt;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];
const CHECKSUM_LEN: usize = 8;

/// Whether an [`ArchiveFile`] guards the archive against other writers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockMode {
    /// Hold an exclusive advisory lock on `<path>.lock` for the handle's
    /// lifetime.
    #[default]
    Exclusive,
    /// No locking; the caller serializes writers.
    None,
}

/// How an archive is written to and read from disk.
///
/// ```
/// use bitemporal::{ArchiveOptions, LockMode};
///
/// let options = ArchiveOptions::default().compression(3).checksum(true);
/// assert_eq!(options.lock, LockMode::Exclusive);
///
/// let options = ArchiveOptions::from_json(r#"{"checksum": true, "lock": "none"}"#).unwrap();
/// assert!(options.checksum);
/// assert_eq!(options.compression, None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[non_exhaustive]
pub struct ArchiveOptions {
    /// zstd level to compress saves with; `None` writes the raw format.
    /// Compressed files are recognized on load regardless of this setting.
    pub compression: Option<i32>,
    /// Append an xxh64 footer on save and require it on load.
    pub checksum: bool,
    pub lock: LockMode,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        ArchiveOptions {
            compression: None,
            checksum: false,
            lock: LockMode::Exclusive,
        }
    }
}

impl ArchiveOptions {
    pub fn compression(mut self, level: i32) -> Self {
        self.compression = Some(level);
        self
    }

    pub fn checksum(mut self, enabled: bool) -> Self {
        self.checksum = enabled;
        self
    }

    pub fn lock(mut self, mode: LockMode) -> Self {
        self.lock = mode;
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))
    }
}

/// Handle on an archive file.
///
/// With [`LockMode::Exclusive`] only one handle per path can be open at a
/// time, across processes; the lock is released when the handle is dropped.
#[derive(Debug)]
pub struct ArchiveFile {
    path: PathBuf,
    options: ArchiveOptions,
    _lock: Option<File>,
}

impl ArchiveFile {
    /// Open a handle on `path`, creating its parent directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Locked`] if another handle holds the lock.
    pub fn open(path: impl AsRef<Path>, options: ArchiveOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let lock = match options.lock {
            LockMode::Exclusive => {
                let lock_path = sibling(&path, ".lock");
                let file = OpenOptions::new()
                    .create(true)
                    .truncate(false)
                    .write(true)
                    .open(&lock_path)?;
                match file.try_lock_exclusive() {
                    Ok(()) => Some(file),
                    Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                        warn!("archive {} is locked by another writer", path.display());
                        return Err(Error::Locked { path });
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            LockMode::None => None,
        };

        Ok(ArchiveFile {
            path,
            options,
            _lock: lock,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn options(&self) -> &ArchiveOptions {
        &self.options
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read the archive, or start an empty one if the file does not exist.
    pub fn load(&self, schema: impl Into<Arc<Schema>>) -> Result<Archive> {
        let schema = schema.into();
        let bytes = match fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("no archive at {}, starting empty", self.path.display());
                return Ok(Archive::new(schema));
            }
            Err(e) => return Err(e.into()),
        };
        let archive = decode_file(&bytes, &self.options, schema)?;
        info!(
            "loaded archive {}: {} transactions, {} strings",
            self.path.display(),
            archive.transaction_count(),
            archive.text().len()
        );
        Ok(archive)
    }

    /// Replace the file with `archive`.
    ///
    /// The on-disk file changes only if the whole write succeeds.
    pub fn save(&self, archive: &Archive) -> Result<()> {
        write_atomic(&self.path, archive, &self.options)
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

pub(crate) fn encode_file(archive: &Archive, options: &ArchiveOptions) -> Result<Vec<u8>> {
    let mut body = archive.to_bytes();
    if options.checksum {
        let hash = xxhash_rust::xxh64::xxh64(&body, 0);
        body.extend_from_slice(&hash.to_le_bytes());
    }
    match options.compression {
        Some(level) => Ok(zstd::encode_all(&body[..], level)?),
        None => Ok(body),
    }
}

pub(crate) fn decode_file(
    bytes: &[u8],
    options: &ArchiveOptions,
    schema: Arc<Schema>,
) -> Result<Archive> {
    let decompressed;
    let mut body = bytes;
    if bytes.starts_with(&ZSTD_MAGIC) {
        decompressed = zstd::decode_all(bytes)
            .map_err(|e| Error::format(format!("compressed archive is corrupt: {e}")))?;
        body = &decompressed;
    }

    if options.checksum {
        let split = body
            .len()
            .checked_sub(CHECKSUM_LEN)
            .ok_or_else(|| Error::format("archive is too short to carry a checksum"))?;
        let (data, footer) = body.split_at(split);
        let mut expected = [0u8; CHECKSUM_LEN];
        expected.copy_from_slice(footer);
        let expected = u64::from_le_bytes(expected);
        let actual = xxhash_rust::xxh64::xxh64(data, 0);
        if actual != expected {
            return Err(Error::format(format!(
                "checksum mismatch: stored {expected:016x}, computed {actual:016x}"
            )));
        }
        body = data;
    }

    Archive::from_bytes(schema, body)
}

pub(crate) fn write_atomic(path: &Path, archive: &Archive, options: &ArchiveOptions) -> Result<()> {
    let bytes = encode_file(archive, options)?;
    let tmp_path = sibling(path, ".tmp");

    let mut file = File::create(&tmp_path)?;
    file.write_all(&bytes)?;
    file.sync_data()?;
    drop(file);

    fs::rename(&tmp_path, path)?;
    info!(
        "saved archive {}: {} transactions, {} bytes",
        path.display(),
        archive.transaction_count(),
        bytes.len()
    );
    Ok(())
}
