//! RAM-only preference store
//!
//! Base link for a [`PreferenceChain`](super::PreferenceChain) when no other
//! provider exists. Values live for the process lifetime only.

use super::chain::PreferenceStore;
use super::handle::{PreferenceBackend, PreferenceHandle};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

type Cells = Arc<Mutex<HashMap<u32, Vec<u8>>>>;

/// In-memory preference store
#[derive(Debug, Default)]
pub struct VolatilePreferences {
    values: Cells,
    syncs: AtomicUsize,
    resets: AtomicUsize,
}

impl VolatilePreferences {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored values
    pub fn len(&self) -> usize {
        self.values.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.lock().is_empty()
    }

    /// How often `sync` reached this store
    pub fn sync_count(&self) -> usize {
        self.syncs.load(Ordering::SeqCst)
    }

    /// How often `reset` reached this store
    pub fn reset_count(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }
}

impl PreferenceStore for VolatilePreferences {
    fn make_handle(&self, type_tag: u32, length: usize) -> PreferenceHandle {
        PreferenceHandle::new(VolatileBackend {
            values: self.values.clone(),
            type_tag,
            length,
        })
    }

    fn sync(&self) -> bool {
        self.syncs.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn reset(&self) -> bool {
        self.resets.fetch_add(1, Ordering::SeqCst);
        self.values.lock().clear();
        true
    }

    fn name(&self) -> &str {
        "volatile"
    }
}

struct VolatileBackend {
    values: Cells,
    type_tag: u32,
    length: usize,
}

impl PreferenceBackend for VolatileBackend {
    fn save(&self, data: &[u8]) -> bool {
        if data.len() != self.length {
            return false;
        }
        self.values.lock().insert(self.type_tag, data.to_vec());
        true
    }

    fn load(&self, data: &mut [u8]) -> bool {
        match self.values.lock().get(&self.type_tag) {
            Some(value) if value.len() == data.len() => {
                data.copy_from_slice(value);
                true
            }
            _ => false,
        }
    }
}
