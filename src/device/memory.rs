//! In-memory FRAM device
//!
//! Used by tests and by applications that want the preference semantics
//! without a chip attached. Clones share the same cells, so dropping a
//! store and building a new one on a clone behaves like a reboot.

use super::{check_range, BackingStore};
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// RAM-backed FRAM simulation
#[derive(Clone, Debug)]
pub struct MemoryFram {
    cells: Arc<Mutex<Vec<u8>>>,
    connected: Arc<AtomicBool>,
    capacity: u16,
}

impl MemoryFram {
    /// Create a connected device of `capacity` bytes, all cells zero
    pub fn new(capacity: u16) -> Self {
        Self::from_bytes(vec![0u8; capacity as usize])
    }

    /// Create a device preloaded with `bytes`
    ///
    /// The capacity is clamped to the 16-bit address space.
    pub fn from_bytes(mut bytes: Vec<u8>) -> Self {
        bytes.truncate(u16::MAX as usize);
        let capacity = bytes.len() as u16;
        Self {
            cells: Arc::new(Mutex::new(bytes)),
            connected: Arc::new(AtomicBool::new(true)),
            capacity,
        }
    }

    /// Simulate the chip dropping off (or returning to) the bus
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Copy of the whole cell array
    pub fn snapshot(&self) -> Vec<u8> {
        self.cells.lock().clone()
    }

    /// Overwrite a single cell regardless of connectivity
    pub fn poke(&self, addr: u16, value: u8) {
        if let Some(cell) = self.cells.lock().get_mut(addr as usize) {
            *cell = value;
        }
    }

    /// Read a single cell regardless of connectivity
    pub fn peek(&self, addr: u16) -> Option<u8> {
        self.cells.lock().get(addr as usize).copied()
    }
}

impl BackingStore for MemoryFram {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn capacity_bytes(&self) -> u16 {
        self.capacity
    }

    fn read(&self, addr: u16, buf: &mut [u8]) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::DeviceUnavailable("memory device detached".to_string()));
        }
        let cells = self.cells.lock();
        let start = check_range(addr, buf.len(), cells.len())?;
        buf.copy_from_slice(&cells[start..start + buf.len()]);
        Ok(())
    }

    fn write(&self, addr: u16, data: &[u8]) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::DeviceUnavailable("memory device detached".to_string()));
        }
        let mut cells = self.cells.lock();
        let start = check_range(addr, data.len(), cells.len())?;
        cells[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }
}
