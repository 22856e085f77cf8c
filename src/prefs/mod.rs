//! FRAM Preferences
//!
//! Persistent preference slots on a byte-addressable FRAM device.
//!
//! # Architecture
//!
//! ```text
//! FramPreferences (facade)
//!   ├─→ StaticSlotRegistry   tag → fixed address        (checked first)
//!   ├─→ PoolAllocator        tag → bump-allocated slot  (fallback)
//!   ├─→ VersionGuard         fnv1(build identity) at pool base
//!   └─→ RecordCodec          payload || trailer on every save/load
//!
//! FRAM layout:
//!   [pool.start .. +4)           version hash (u32 LE)
//!   [pool.start+4 .. pool.end)   records, first come first served
//!   [static addresses]           declared slots, outside the pool
//! ```
//!
//! Allocation happens once per tag and run; slots are never freed. A
//! changed build identity wipes the pool at the next boot.

pub mod allocator;
pub mod chain;
pub mod codec;
pub mod guard;
pub mod handle;
pub mod registry;
pub mod report;
pub mod slot;
pub mod store;
pub mod volatile;

pub use allocator::{Allocation, Pool, PoolAllocator, POOL_HEADER_LEN};
pub use chain::{PreferenceChain, PreferenceStore};
pub use codec::{fold32to16, IntegrityScheme, RecordCodec};
pub use guard::{fnv1_hash, VersionGuard};
pub use handle::{FramBackend, PreferenceBackend, PreferenceHandle};
pub use registry::{Claim, StaticSlotRegistry};
pub use report::{PoolReport, SlotReport, SlotStatus, StoreReport};
pub use slot::{Slot, SlotError, SlotFlags, SlotTable};
pub use store::{FramPreferences, StoreState};
pub use volatile::VolatilePreferences;
