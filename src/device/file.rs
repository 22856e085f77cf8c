//! File-backed FRAM image
//!
//! Keeps a byte-for-byte image of the chip in a regular file. Useful for
//! inspecting and editing dumps taken from real hardware.

use super::{check_range, BackingStore};
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// FRAM device stored in an image file
#[derive(Debug)]
pub struct FileFram {
    path: PathBuf,
    file: Mutex<File>,
    capacity: u16,
}

impl FileFram {
    /// Open or create an image of `capacity` bytes
    ///
    /// A shorter existing file is zero-extended, a longer one is left as is
    /// and only its first `capacity` bytes are addressable.
    pub fn open<P: AsRef<Path>>(path: P, capacity: u16) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| Error::Io(format!("Failed to open image {:?}: {}", path, e)))?;

        let len = file
            .metadata()
            .map_err(|e| Error::Io(format!("Failed to stat image: {}", e)))?
            .len();
        if len < capacity as u64 {
            file.set_len(capacity as u64)
                .map_err(|e| Error::Io(format!("Failed to extend image: {}", e)))?;
        }

        debug!(path = ?path, capacity, "Opened FRAM image");
        Ok(Self {
            path,
            file: Mutex::new(file),
            capacity,
        })
    }

    /// Location of the image file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush the image to disk
    pub fn flush(&self) -> Result<()> {
        self.file
            .lock()
            .sync_all()
            .map_err(|e| Error::Io(format!("Flush failed: {}", e)))
    }
}

impl BackingStore for FileFram {
    fn is_connected(&self) -> bool {
        true
    }

    fn capacity_bytes(&self) -> u16 {
        self.capacity
    }

    fn read(&self, addr: u16, buf: &mut [u8]) -> Result<()> {
        let start = check_range(addr, buf.len(), self.capacity as usize)?;
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(start as u64))
            .map_err(|e| Error::Io(format!("Seek failed: {}", e)))?;
        file.read_exact(buf)
            .map_err(|e| Error::Io(format!("Read failed: {}", e)))
    }

    fn write(&self, addr: u16, data: &[u8]) -> Result<()> {
        let start = check_range(addr, data.len(), self.capacity as usize)?;
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(start as u64))
            .map_err(|e| Error::Io(format!("Seek failed: {}", e)))?;
        file.write_all(data)
            .map_err(|e| Error::Io(format!("Write failed: {}", e)))
    }
}
