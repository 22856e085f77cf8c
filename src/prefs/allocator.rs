//! Pool allocator
//!
//! Carves the pool into variable-length slots on first request. The pool
//! is a bump arena: the cursor only moves forward during a run and slots
//! are never freed, moved or resized.
//!
//! ```text
//! start                                             start+size
//!   │ hash:u32 │ rec(tag A) │ rec(tag B) │ ...free... │
//!              ^data_start               ^next_free
//! ```

use super::slot::{Slot, SlotFlags, SlotTable};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Bytes at the pool base reserved for the version hash
pub const POOL_HEADER_LEN: u16 = 4;

/// Contiguous device range used for on-demand slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    pub start: u16,
    pub size: u16,
    next_free: u16,
    cleared: bool,
}

impl Pool {
    /// A pool of `size` bytes at `start`, header included
    pub fn new(start: u16, size: u16) -> Self {
        Self {
            start,
            size,
            next_free: start.saturating_add(POOL_HEADER_LEN),
            cleared: false,
        }
    }

    /// A zero-sized pool; every dynamic request fails
    pub fn disabled() -> Self {
        Self {
            start: 0,
            size: 0,
            next_free: 0,
            cleared: false,
        }
    }

    /// Whether the pool has any space at all
    pub fn is_enabled(&self) -> bool {
        self.size != 0
    }

    /// First byte after the version header
    pub fn data_start(&self) -> u16 {
        self.start.saturating_add(POOL_HEADER_LEN)
    }

    /// One past the last pool byte
    pub fn end(&self) -> u32 {
        self.start as u32 + self.size as u32
    }

    /// Address the next new slot would receive
    pub fn next_free(&self) -> u16 {
        self.next_free
    }

    /// Bytes consumed so far, header included
    pub fn used(&self) -> u16 {
        self.next_free - self.start
    }

    /// Bytes still available for new slots
    pub fn remaining(&self) -> u16 {
        (self.end().saturating_sub(self.next_free as u32)) as u16
    }

    /// Whether the version check wiped the pool this boot
    pub fn was_cleared(&self) -> bool {
        self.cleared
    }

    /// Record a full wipe and rewind the cursor to the data start
    pub fn mark_cleared(&mut self) {
        self.cleared = true;
        self.next_free = self.data_start();
    }
}

/// Result of a successful allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    /// Index into the slot table
    pub index: usize,
    /// First byte of the slot on the device
    pub address: u16,
}

/// Hands out pool slots keyed by type tag
#[derive(Debug)]
pub struct PoolAllocator {
    pool: Pool,
    /// Tag → slot table index
    bindings: HashMap<u32, usize>,
}

impl PoolAllocator {
    /// An allocator with no bindings over `pool`
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            bindings: HashMap::new(),
        }
    }

    /// The pool being carved
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Mutable pool access for the version guard
    pub fn pool_mut(&mut self) -> &mut Pool {
        &mut self.pool
    }

    /// Slot index bound to `tag`, if it was ever requested
    pub fn binding(&self, tag: u32) -> Option<usize> {
        self.bindings.get(&tag).copied()
    }

    /// Reserve (or look up) the slot for `tag`
    ///
    /// `record_len` is payload plus trailer. The first request for a tag
    /// reserves exactly that many bytes at the cursor. Later requests for the
    /// same tag return the same address as long as the record still fits.
    /// A failed reservation keeps its slot record for diagnostics and is not
    /// retried.
    pub fn allocate(&mut self, slots: &mut SlotTable, tag: u32, record_len: u16) -> Result<Allocation> {
        if let Some(index) = self.binding(tag) {
            return self.reuse(slots, index, tag, record_len);
        }

        let address = self.pool.next_free;
        let index = slots.push(Slot::new_dynamic(tag, address, record_len));
        self.bindings.insert(tag, index);

        if !self.pool.is_enabled() {
            if let Some(slot) = slots.get_mut(index) {
                slot.address = 0;
                slot.capacity = 0;
            }
            return Err(Error::SlotDisabled(format!("no pool for tag {}", tag)));
        }

        let end = address as u32 + record_len as u32;
        if end > self.pool.end() {
            if let Some(slot) = slots.get_mut(index) {
                slot.fail(SlotFlags::ERR_SIZE_POOL);
            }
            warn!(tag, requested = record_len, remaining = self.pool.remaining(), "Pool exhausted");
            return Err(Error::PoolExhausted {
                tag,
                requested: record_len,
                available: self.pool.remaining(),
            });
        }

        self.pool.next_free = end as u16;
        debug!(tag, address, size = record_len, "Allocated pool slot");
        Ok(Allocation { index, address })
    }

    fn reuse(&self, slots: &mut SlotTable, index: usize, tag: u32, record_len: u16) -> Result<Allocation> {
        let slot = slots
            .get_mut(index)
            .ok_or_else(|| Error::InvalidConfig(format!("dangling binding for tag {}", tag)))?;
        slot.requested_size = record_len;

        if slot.capacity == 0 {
            return Err(Error::SlotDisabled(format!("no pool for tag {}", tag)));
        }
        if slot.flags.contains(SlotFlags::ERR_SIZE_POOL) {
            return Err(Error::PoolExhausted {
                tag,
                requested: record_len,
                available: self.pool.remaining(),
            });
        }
        if record_len > slot.capacity {
            slot.fail(SlotFlags::ERR_SIZE_REQUEST);
            return Err(Error::OversizeRequest {
                key: slot.key.clone(),
                requested: record_len,
                capacity: slot.capacity,
            });
        }

        debug!(tag, address = slot.address, "Reusing pool slot");
        Ok(Allocation {
            index,
            address: slot.address,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allocator(start: u16, size: u16) -> (PoolAllocator, SlotTable) {
        (PoolAllocator::new(Pool::new(start, size)), SlotTable::new())
    }

    #[test]
    fn test_first_slot_follows_header() -> Result<()> {
        let (mut alloc, mut slots) = allocator(0, 100);

        let a = alloc.allocate(&mut slots, 0xAAAA, 12)?;
        assert_eq!(a.address, 4);
        assert_eq!(alloc.pool().next_free(), 16);
        assert_eq!(alloc.pool().used(), 16);
        Ok(())
    }

    #[test]
    fn test_same_tag_same_address() -> Result<()> {
        let (mut alloc, mut slots) = allocator(32, 64);

        let first = alloc.allocate(&mut slots, 7, 10)?;
        let cursor = alloc.pool().next_free();
        let second = alloc.allocate(&mut slots, 7, 10)?;

        assert_eq!(first, second);
        assert_eq!(alloc.pool().next_free(), cursor);
        assert_eq!(slots.len(), 1);
        Ok(())
    }

    #[test]
    fn test_same_tag_smaller_record_fits() -> Result<()> {
        let (mut alloc, mut slots) = allocator(0, 64);

        let first = alloc.allocate(&mut slots, 7, 10)?;
        let second = alloc.allocate(&mut slots, 7, 6)?;
        assert_eq!(first.address, second.address);
        assert_eq!(slots.get(first.index).map(|s| s.requested_size), Some(6));
        Ok(())
    }

    #[test]
    fn test_same_tag_larger_record_rejected() -> Result<()> {
        let (mut alloc, mut slots) = allocator(0, 64);

        let first = alloc.allocate(&mut slots, 7, 10)?;
        let err = alloc.allocate(&mut slots, 7, 12).unwrap_err();
        assert!(matches!(err, Error::OversizeRequest { requested: 12, capacity: 10, .. }));

        let slot = slots.get(first.index).unwrap();
        assert!(slot.flags.contains(SlotFlags::ERR_SIZE_REQUEST));
        assert_eq!(slot.capacity, 10);
        Ok(())
    }

    #[test]
    fn test_exhaustion_leaves_cursor() -> Result<()> {
        let (mut alloc, mut slots) = allocator(0, 20);

        alloc.allocate(&mut slots, 1, 10)?;
        assert_eq!(alloc.pool().next_free(), 14);

        let err = alloc.allocate(&mut slots, 2, 8).unwrap_err();
        assert_eq!(
            err,
            Error::PoolExhausted {
                tag: 2,
                requested: 8,
                available: 6
            }
        );
        assert_eq!(alloc.pool().next_free(), 14);

        // Failed slot is kept for diagnostics and not retried
        let failed = alloc.binding(2).and_then(|i| slots.get(i)).unwrap();
        assert!(failed.flags.contains(SlotFlags::ERR_SIZE_POOL));
        assert!(alloc.allocate(&mut slots, 2, 2).is_err());

        // A smaller request for a new tag still fits
        let c = alloc.allocate(&mut slots, 3, 6)?;
        assert_eq!(c.address, 14);
        assert_eq!(alloc.pool().next_free(), 20);
        assert_eq!(alloc.pool().remaining(), 0);
        Ok(())
    }

    #[test]
    fn test_slots_never_overlap() -> Result<()> {
        let (mut alloc, mut slots) = allocator(100, 200);

        for tag in 0..40u32 {
            let _ = alloc.allocate(&mut slots, tag, (tag % 7 + 3) as u16);
        }

        let live: Vec<_> = slots.iter().filter(|s| !s.flags.is_error()).collect();
        assert!(!live.is_empty());
        for (i, a) in live.iter().enumerate() {
            assert!(a.address >= 104 && a.end() <= 300);
            for b in &live[i + 1..] {
                assert!(!a.overlaps(b), "{} overlaps {}", a, b);
            }
        }
        Ok(())
    }

    #[test]
    fn test_disabled_pool() {
        let mut alloc = PoolAllocator::new(Pool::disabled());
        let mut slots = SlotTable::new();

        assert!(matches!(
            alloc.allocate(&mut slots, 5, 4),
            Err(Error::SlotDisabled(_))
        ));
        assert!(alloc.allocate(&mut slots, 5, 4).is_err());
        assert_eq!(slots.len(), 1);
        assert_eq!(slots.get(0).map(|s| s.capacity), Some(0));
    }

    #[test]
    fn test_mark_cleared() {
        let mut pool = Pool::new(8, 40);
        assert!(!pool.was_cleared());

        pool.mark_cleared();
        assert!(pool.was_cleared());
        assert_eq!(pool.next_free(), 12);
        assert_eq!(pool.used(), POOL_HEADER_LEN);
        assert_eq!(pool.remaining(), 36);
    }
}
