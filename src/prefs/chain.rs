//! Preference store contract and delegation chain
//!
//! Stores are assembled at startup into an explicit chain. The newest link
//! serves allocation requests; lifecycle calls (`sync`, `reset`) can be
//! forwarded backwards by each link to the store it replaced.
//!
//! ```text
//! PreferenceChain
//!   ├─→ [0] VolatilePreferences    (base)
//!   └─→ [1] FramPreferences ──prev──→ [0]   ← active
//! ```

use super::handle::PreferenceHandle;
use std::fmt;
use std::sync::Arc;

/// Provider of preference handles
pub trait PreferenceStore: Send + Sync {
    /// Handle for a record of `length` bytes identified by `type_tag`
    ///
    /// Never fails loudly: an empty handle signals that no storage is
    /// available for this request.
    fn make_handle(&self, type_tag: u32, length: usize) -> PreferenceHandle;

    /// Compatibility overload for callers that pick a storage medium;
    /// the medium hint is ignored
    fn make_handle_in_flash(&self, type_tag: u32, length: usize, _in_flash: bool) -> PreferenceHandle {
        self.make_handle(type_tag, length)
    }

    /// Commit pending writes
    fn sync(&self) -> bool;

    /// Forget every stored preference
    fn reset(&self) -> bool;

    /// Short name used in diagnostics
    fn name(&self) -> &str {
        "preferences"
    }
}

/// Ordered list of installed stores, oldest first
#[derive(Clone, Default)]
pub struct PreferenceChain {
    links: Vec<Arc<dyn PreferenceStore>>,
}

impl PreferenceChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chain starting with `base`
    pub fn with_base(base: Arc<dyn PreferenceStore>) -> Self {
        Self { links: vec![base] }
    }

    /// Install `store` as the new active link
    pub fn push(&mut self, store: Arc<dyn PreferenceStore>) {
        self.links.push(store);
    }

    /// Store currently serving requests
    pub fn active(&self) -> Option<Arc<dyn PreferenceStore>> {
        self.links.last().cloned()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Names of all links, oldest first
    pub fn names(&self) -> Vec<String> {
        self.links.iter().map(|s| s.name().to_string()).collect()
    }
}

impl fmt::Debug for PreferenceChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreferenceChain")
            .field("links", &self.names())
            .finish()
    }
}

impl PreferenceStore for PreferenceChain {
    fn make_handle(&self, type_tag: u32, length: usize) -> PreferenceHandle {
        match self.links.last() {
            Some(store) => store.make_handle(type_tag, length),
            None => PreferenceHandle::empty(),
        }
    }

    fn sync(&self) -> bool {
        self.links.last().map_or(true, |store| store.sync())
    }

    fn reset(&self) -> bool {
        self.links.last().map_or(true, |store| store.reset())
    }

    fn name(&self) -> &str {
        "chain"
    }
}
