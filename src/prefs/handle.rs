//! Preference handles
//!
//! A handle is what callers keep: bound to one slot address and one codec.
//! Handles are rebuilt on every boot, the slot binding behind them persists.

use super::codec::RecordCodec;
use crate::device::BackingStore;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Storage behind a valid handle
pub trait PreferenceBackend: Send + Sync {
    /// Persist `data`; `false` when nothing was written
    fn save(&self, data: &[u8]) -> bool;

    /// Fill `data` with the stored value; `false` means "no prior value"
    fn load(&self, data: &mut [u8]) -> bool;
}

/// Caller-owned capability to save/load one preference
///
/// An empty handle is returned whenever a slot could not be provided.
/// Its save/load always report failure, so callers can treat it like a
/// value that was never saved.
#[derive(Default)]
pub struct PreferenceHandle {
    backend: Option<Box<dyn PreferenceBackend>>,
}

impl PreferenceHandle {
    pub fn new<B: PreferenceBackend + 'static>(backend: B) -> Self {
        Self {
            backend: Some(Box::new(backend)),
        }
    }

    /// A handle with no slot behind it
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.backend.is_some()
    }

    pub fn save(&self, data: &[u8]) -> bool {
        match &self.backend {
            Some(backend) => backend.save(data),
            None => false,
        }
    }

    pub fn load(&self, data: &mut [u8]) -> bool {
        match &self.backend {
            Some(backend) => backend.load(data),
            None => false,
        }
    }
}

impl fmt::Debug for PreferenceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreferenceHandle")
            .field("valid", &self.is_valid())
            .finish()
    }
}

/// Record at a fixed FRAM address
pub struct FramBackend<D: BackingStore> {
    device: Arc<D>,
    address: u16,
    length: usize,
    codec: RecordCodec,
}

impl<D: BackingStore> FramBackend<D> {
    pub fn new(device: Arc<D>, address: u16, length: usize, codec: RecordCodec) -> Self {
        Self {
            device,
            address,
            length,
            codec,
        }
    }

    pub fn address(&self) -> u16 {
        self.address
    }
}

impl<D: BackingStore> PreferenceBackend for FramBackend<D> {
    fn save(&self, data: &[u8]) -> bool {
        if !self.device.is_connected() || data.len() != self.length {
            return false;
        }

        let record = self.codec.encode(data);
        match self.device.write(self.address, &record) {
            Ok(()) => {
                debug!(address = self.address, size = record.len(), "Saved preference");
                true
            }
            Err(e) => {
                warn!(address = self.address, error = %e, "Preference write failed");
                false
            }
        }
    }

    fn load(&self, data: &mut [u8]) -> bool {
        if !self.device.is_connected() || data.len() != self.length {
            return false;
        }

        let mut record = vec![0u8; self.codec.record_len(self.length)];
        if let Err(e) = self.device.read(self.address, &mut record) {
            warn!(address = self.address, error = %e, "Preference read failed");
            return false;
        }

        match self.codec.decode(&record) {
            Some(payload) => {
                data.copy_from_slice(payload);
                true
            }
            None => false,
        }
    }
}
