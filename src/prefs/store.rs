//! Store facade
//!
//! Composes the registry, the pool allocator, the version guard and the
//! record codec behind the [`PreferenceStore`] contract.
//!
//! ```text
//! Uninitialized ─initialize()─→ Checking ─┬─→ Ready   (version guard runs here, once)
//!                                         └─→ Failed  (terminal, every call is a no-op)
//! ```

use super::allocator::{Pool, PoolAllocator};
use super::chain::{PreferenceChain, PreferenceStore};
use super::codec::{IntegrityScheme, RecordCodec};
use super::guard::VersionGuard;
use super::handle::{FramBackend, PreferenceHandle};
use super::registry::StaticSlotRegistry;
use super::slot::{SlotFlags, SlotTable};
use crate::config::{PreferenceRequest, StoreConfig};
use crate::device::BackingStore;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Lifecycle of a store within one process run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreState {
    Uninitialized,
    Checking,
    Ready,
    Failed,
}

/// Everything guarded by the allocation lock
#[derive(Debug)]
pub(super) struct Layout {
    pub(super) slots: SlotTable,
    pub(super) allocator: PoolAllocator,
    pub(super) registry: StaticSlotRegistry,
}

/// Preference store on a FRAM device
pub struct FramPreferences<D: BackingStore> {
    device: Arc<D>,
    scheme: IntegrityScheme,
    guard: VersionGuard,
    state: StoreState,
    pub(super) layout: Mutex<Layout>,
    previous: Option<Arc<dyn PreferenceStore>>,
}

impl<D: BackingStore + 'static> FramPreferences<D> {
    /// Build an uninitialized store from a validated configuration
    pub fn new(device: D, config: &StoreConfig) -> Result<Self> {
        Self::with_shared_device(Arc::new(device), config)
    }

    /// Same as [`FramPreferences::new`] for a device shared with other users
    pub fn with_shared_device(device: Arc<D>, config: &StoreConfig) -> Result<Self> {
        config.validate()?;

        let pool = match &config.pool {
            Some(pool) => Pool::new(pool.start, pool.size),
            None => Pool::disabled(),
        };

        let mut slots = SlotTable::new();
        let registry = StaticSlotRegistry::declare(&mut slots, &config.static_slots);

        Ok(Self {
            device,
            scheme: config.scheme,
            guard: VersionGuard::new(&config.build_identity),
            state: StoreState::Uninitialized,
            layout: Mutex::new(Layout {
                slots,
                allocator: PoolAllocator::new(pool),
                registry,
            }),
            previous: None,
        })
    }

    /// Validate the device and layout, then run the version guard
    ///
    /// `previous` is the store this one replaces; lifecycle calls are
    /// forwarded to it. On error the store is failed for the rest of the run.
    pub fn initialize(&mut self, previous: Option<Arc<dyn PreferenceStore>>) -> Result<()> {
        match self.state {
            StoreState::Ready => return Ok(()),
            StoreState::Failed => {
                return Err(Error::DeviceUnavailable("store failed earlier in this run".to_string()))
            }
            _ => {}
        }

        self.state = StoreState::Checking;
        match self.check() {
            Ok(()) => {
                self.previous = previous;
                self.state = StoreState::Ready;
                let layout = self.layout.lock();
                let pool = layout.allocator.pool();
                info!(
                    capacity = self.device.capacity_bytes(),
                    pool_start = pool.start,
                    pool_size = pool.size,
                    cleared = pool.was_cleared(),
                    static_slots = layout.registry.len(),
                    scheme = %self.scheme,
                    "FRAM preferences ready"
                );
                Ok(())
            }
            Err(e) => {
                self.state = StoreState::Failed;
                error!(error = %e, "FRAM preferences failed");
                Err(e)
            }
        }
    }

    /// Initialize on top of `chain`'s active store and append to the chain
    ///
    /// A store that fails to initialize is not installed.
    pub fn install(mut self, chain: &mut PreferenceChain) -> Result<Arc<Self>> {
        self.initialize(chain.active())?;
        let store = Arc::new(self);
        chain.push(store.clone());
        Ok(store)
    }

    fn check(&self) -> Result<()> {
        let capacity = self.device.capacity_bytes();
        if capacity == 0 {
            return Err(Error::DeviceUnavailable("device returns 0 size".to_string()));
        }
        if !self.device.is_connected() {
            return Err(Error::DeviceUnavailable("device connect failed".to_string()));
        }

        let mut layout = self.layout.lock();
        let Layout {
            slots,
            allocator,
            registry,
        } = &mut *layout;

        let pool = allocator.pool();
        if pool.is_enabled() && pool.end() > capacity as u32 {
            return Err(Error::LayoutOverflow {
                region: "pool".to_string(),
                end: pool.end(),
                capacity,
            });
        }
        registry.check_device(slots, capacity)?;

        self.guard.check(self.device.as_ref(), allocator.pool_mut())?;
        Ok(())
    }

    /// Make a handle for each request in order, returning how many got a slot
    ///
    /// Pool addresses depend on the order of first requests, so a process
    /// that opens an existing image replays the firmware's boot requests
    /// before touching any other tag.
    pub fn preload(&self, requests: &[PreferenceRequest]) -> usize {
        let granted = requests
            .iter()
            .filter(|request| self.make_handle(request.tag, request.len).is_valid())
            .count();
        debug!(requested = requests.len(), granted, "Replayed pool requests");
        granted
    }

    /// Whether `tag` is routed to a static slot or already owns a pool slot
    pub fn has_slot(&self, tag: u32) -> bool {
        let layout = self.layout.lock();
        if layout.registry.resolve(tag).is_some() {
            return true;
        }
        layout
            .allocator
            .binding(tag)
            .and_then(|index| layout.slots.get(index))
            .is_some_and(|slot| slot.capacity != 0 && !slot.flags.contains(SlotFlags::ERR_SIZE_POOL))
    }

    /// Current lifecycle state
    pub fn state(&self) -> StoreState {
        self.state
    }

    /// Whether handles can be made
    pub fn is_ready(&self) -> bool {
        self.state == StoreState::Ready
    }

    /// Whether initialization failed
    pub fn is_failed(&self) -> bool {
        self.state == StoreState::Failed
    }

    /// Underlying device
    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    /// Integrity scheme for every record
    pub fn scheme(&self) -> IntegrityScheme {
        self.scheme
    }

    /// Hash stamped into the pool header
    pub fn version_hash(&self) -> u32 {
        self.guard.hash()
    }

    /// Snapshot of the pool cursor
    pub fn pool(&self) -> Pool {
        *self.layout.lock().allocator.pool()
    }

    /// Whether a previous store was captured at initialization
    pub fn has_previous(&self) -> bool {
        self.previous.is_some()
    }

    fn make_fram_handle(&self, type_tag: u32, length: usize) -> Result<PreferenceHandle> {
        let record_len = u16::try_from(length + self.scheme.trailer_len() as usize).map_err(|_| {
            Error::PoolExhausted {
                tag: type_tag,
                requested: u16::MAX,
                available: self.pool().remaining(),
            }
        })?;

        let mut layout = self.layout.lock();
        let Layout {
            slots,
            allocator,
            registry,
        } = &mut *layout;

        let (address, codec_tag) = match registry.resolve(type_tag) {
            Some(index) => {
                let claim = registry.claim(slots, index, type_tag, record_len)?;
                (claim.address, claim.type_tag)
            }
            None => (allocator.allocate(slots, type_tag, record_len)?.address, type_tag),
        };

        debug!(tag = type_tag, address, size = record_len, "Created preference handle");
        Ok(PreferenceHandle::new(FramBackend::new(
            self.device.clone(),
            address,
            length,
            RecordCodec::new(self.scheme, codec_tag),
        )))
    }
}

impl<D: BackingStore + 'static> PreferenceStore for FramPreferences<D> {
    fn make_handle(&self, type_tag: u32, length: usize) -> PreferenceHandle {
        if !self.is_ready() {
            return PreferenceHandle::empty();
        }

        match self.make_fram_handle(type_tag, length) {
            Ok(handle) => handle,
            Err(e) => {
                warn!(tag = type_tag, length, error = %e, "No FRAM slot for preference");
                PreferenceHandle::empty()
            }
        }
    }

    fn sync(&self) -> bool {
        if !self.is_ready() {
            return false;
        }
        match &self.previous {
            Some(previous) => previous.sync(),
            None => true,
        }
    }

    fn reset(&self) -> bool {
        if !self.is_ready() {
            return false;
        }

        let pool = self.pool();
        let local = match VersionGuard::invalidate(self.device.as_ref(), &pool) {
            Ok(()) => {
                info!("Pool invalidated, records will be cleared on next boot");
                true
            }
            Err(e) => {
                warn!(error = %e, "Failed to invalidate pool header");
                false
            }
        };

        match &self.previous {
            Some(previous) => previous.reset(),
            None => local,
        }
    }

    fn name(&self) -> &str {
        "fram"
    }
}

impl<D: BackingStore> fmt::Debug for FramPreferences<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FramPreferences")
            .field("state", &self.state)
            .field("scheme", &self.scheme)
            .field("has_previous", &self.previous.is_some())
            .finish()
    }
}
