//! Storage Module
//!
//! Scoped file access for data files and journal logs.
//!
//! ## Responsibilities
//! - Exact-length reads and writes against real files
//! - Flush-on-release for writable handles (double `sync_all`, forcing
//!   metadata out on platforms where one pass is not enough)
//! - Serializing raw open/close and directory operations behind one
//!   process-wide mutex; descriptor-table and directory operations are not
//!   assumed reentrant across threads under this workload

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;

use parking_lot::Mutex;

use crate::error::{Error, Result};

/// Process-wide lock serializing open/close and directory operations
static FILE_IO_LOCK: Mutex<()> = Mutex::new(());

/// How a [`DataFile`] is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Read-only; the file must exist
    Read,

    /// Append; the file is created if missing
    Append,
}

/// Scoped handle to an open file
///
/// Writable handles are flushed to durable storage twice when released.
pub struct DataFile {
    file: Option<File>,
    writable: bool,
}

impl DataFile {
    /// Open a file in the given mode
    pub fn open(path: &Path, mode: OpenMode) -> Result<Self> {
        let _io = FILE_IO_LOCK.lock();

        let opened = match mode {
            OpenMode::Read => File::open(path),
            OpenMode::Append => OpenOptions::new().create(true).append(true).open(path),
        };

        let file = opened.map_err(|e| Error::FileOpen(format!("{}: {}", path.display(), e)))?;

        Ok(Self {
            file: Some(file),
            writable: mode == OpenMode::Append,
        })
    }

    /// Current size of the open file in bytes
    pub fn size(&self) -> Result<u64> {
        let file = self.file.as_ref().expect("file is open until drop");
        Ok(file.metadata()?.len())
    }

    /// Read the entire file contents
    pub fn read_all(&mut self) -> Result<Vec<u8>> {
        let file = self.file.as_mut().expect("file is open until drop");
        let mut contents = Vec::new();
        file.read_to_end(&mut contents)
            .map_err(|e| Error::FileRead(e.to_string()))?;
        Ok(contents)
    }

    /// Append exactly `data.len()` bytes
    pub fn append(&mut self, data: &[u8]) -> Result<()> {
        let file = self.file.as_mut().expect("file is open until drop");
        file.write_all(data)
            .map_err(|e| Error::FileWrite(e.to_string()))
    }

    /// Size of the file at `path`, or 0 if it does not exist
    pub fn size_of(path: &Path) -> u64 {
        fs::metadata(path).map(|m| m.len()).unwrap_or(0)
    }

    /// Whether a file exists at `path`
    pub fn exists(path: &Path) -> bool {
        path.exists()
    }
}

impl Drop for DataFile {
    fn drop(&mut self) {
        let Some(file) = self.file.take() else {
            return;
        };

        if self.writable {
            if let Err(e) = file.sync_all() {
                tracing::warn!("sync on release failed: {}", e);
            }
            if let Err(e) = file.sync_all() {
                tracing::warn!("second sync on release failed: {}", e);
            }
        }

        let _io = FILE_IO_LOCK.lock();
        drop(file);
    }
}

/// Truncate the file at `path` to `len` bytes
pub fn truncate(path: &Path, len: u64) -> Result<()> {
    let _io = FILE_IO_LOCK.lock();

    let file = OpenOptions::new()
        .write(true)
        .open(path)
        .map_err(|e| Error::FileOpen(format!("{}: {}", path.display(), e)))?;
    file.set_len(len)
        .map_err(|e| Error::FileWrite(format!("{}: {}", path.display(), e)))?;
    file.sync_all()
        .map_err(|e| Error::FileWrite(format!("{}: {}", path.display(), e)))?;
    Ok(())
}

/// Remove the file at `path`
pub fn remove(path: &Path) -> Result<()> {
    let _io = FILE_IO_LOCK.lock();
    fs::remove_file(path).map_err(Error::from)
}
