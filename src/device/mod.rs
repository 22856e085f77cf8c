//! Backing store layer
//!
//! The preference store never talks to a bus directly. Everything it needs
//! from the physical FRAM chip is the small byte-oriented contract below:
//!
//! ```text
//! BackingStore
//!   ├─→ is_connected()      (polled before every record access)
//!   ├─→ capacity_bytes()    (0 means "no device")
//!   ├─→ read / write        (raw byte ranges)
//!   └─→ read16 / read32 / write32  (little-endian helpers)
//! ```
//!
//! Two implementations ship with the crate:
//! - [`MemoryFram`] keeps the cells in RAM and can be shared between two
//!   store instances to simulate a reboot
//! - [`FileFram`] mirrors the chip into an image file on disk

pub mod file;
pub mod memory;

pub use file::FileFram;
pub use memory::MemoryFram;

use crate::error::{Error, Result};

/// Byte-addressed access to a fixed-capacity non-volatile memory device
///
/// Implementations use interior mutability so a single device can be shared
/// by the store and all handles it hands out.
pub trait BackingStore: Send + Sync {
    /// Whether the device currently answers on its bus
    fn is_connected(&self) -> bool;

    /// Device size in bytes, 0 when the device could not be identified
    fn capacity_bytes(&self) -> u16;

    /// Fill `buf` with the bytes starting at `addr`
    fn read(&self, addr: u16, buf: &mut [u8]) -> Result<()>;

    /// Write `data` starting at `addr`
    fn write(&self, addr: u16, data: &[u8]) -> Result<()>;

    fn read16(&self, addr: u16) -> Result<u16> {
        let mut bytes = [0u8; 2];
        self.read(addr, &mut bytes)?;
        Ok(u16::from_le_bytes(bytes))
    }

    fn read32(&self, addr: u16) -> Result<u32> {
        let mut bytes = [0u8; 4];
        self.read(addr, &mut bytes)?;
        Ok(u32::from_le_bytes(bytes))
    }

    fn write32(&self, addr: u16, value: u32) -> Result<()> {
        self.write(addr, &value.to_le_bytes())
    }
}

/// Check that `[addr, addr + len)` lies inside a device of `capacity` bytes
pub(crate) fn check_range(addr: u16, len: usize, capacity: usize) -> Result<usize> {
    let start = addr as usize;
    let end = start + len;
    if end > capacity {
        return Err(Error::Io(format!(
            "Access {}..{} exceeds device size {}",
            start, end, capacity
        )));
    }
    Ok(start)
}
