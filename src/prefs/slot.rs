//! Slot bookkeeping shared by the pool allocator and the static registry

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Per-slot state bits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotFlags(pub u8);

impl SlotFlags {
    /// No bits set
    pub const NONE: SlotFlags = SlotFlags(0);
    /// Declared at configuration time rather than carved from the pool
    pub const STATIC: SlotFlags = SlotFlags(1 << 0);
    /// Integrity tag is derived from the slot key
    pub const PERSIST_KEY: SlotFlags = SlotFlags(1 << 1);
    /// Slot is unusable; one of the causes below is set
    pub const ERR: SlotFlags = SlotFlags(1 << 4);
    /// A caller asked for more than the slot holds
    pub const ERR_SIZE_REQUEST: SlotFlags = SlotFlags(1 << 5);
    /// Slot extends past the end of the device
    pub const ERR_SIZE_DEVICE: SlotFlags = SlotFlags(1 << 6);
    /// Slot did not fit in the remaining pool space
    pub const ERR_SIZE_POOL: SlotFlags = SlotFlags(1 << 7);

    /// Whether every bit of `other` is set
    pub fn contains(self, other: SlotFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether the slot is marked unusable
    pub fn is_error(self) -> bool {
        self.contains(SlotFlags::ERR)
    }

    /// Error causes that are set, in flag order
    pub fn error_causes(self) -> Vec<SlotError> {
        [
            (SlotFlags::ERR_SIZE_REQUEST, SlotError::SizeRequest),
            (SlotFlags::ERR_SIZE_DEVICE, SlotError::SizeDevice),
            (SlotFlags::ERR_SIZE_POOL, SlotError::SizePool),
        ]
        .into_iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, cause)| cause)
        .collect()
    }
}

/// Why a slot was marked unusable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotError {
    /// A caller asked for more than the slot holds
    SizeRequest,
    /// Slot extends past the end of the device
    SizeDevice,
    /// Slot did not fit in the remaining pool space
    SizePool,
}

impl BitOr for SlotFlags {
    type Output = SlotFlags;

    fn bitor(self, rhs: SlotFlags) -> SlotFlags {
        SlotFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for SlotFlags {
    fn bitor_assign(&mut self, rhs: SlotFlags) {
        self.0 |= rhs.0;
    }
}

/// One addressed, capacity-bounded region holding a single record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    /// Declared key for static slots, decimal tag for pool slots
    pub key: String,
    /// First byte of the record
    pub address: u16,
    /// Bytes reserved, trailer included. 0 marks an inert static slot
    pub capacity: u16,
    /// Record size (payload + trailer) of the last request, 0 before first use
    pub requested_size: u16,
    pub flags: SlotFlags,
}

impl Slot {
    /// A slot declared up front at a fixed address
    pub fn new_static(key: impl Into<String>, address: u16, capacity: u16, persist_key: bool) -> Self {
        let mut flags = SlotFlags::STATIC;
        if persist_key {
            flags |= SlotFlags::PERSIST_KEY;
        }
        Self {
            key: key.into(),
            address,
            capacity,
            requested_size: 0,
            flags,
        }
    }

    /// A pool slot created on first request for `tag`
    pub fn new_dynamic(tag: u32, address: u16, capacity: u16) -> Self {
        Self {
            key: tag.to_string(),
            address,
            capacity,
            requested_size: capacity,
            flags: SlotFlags::NONE,
        }
    }

    /// Whether the slot was declared in the configuration
    pub fn is_static(&self) -> bool {
        self.flags.contains(SlotFlags::STATIC)
    }

    /// Whether records are validated against the key hash
    pub fn persist_key(&self) -> bool {
        self.flags.contains(SlotFlags::PERSIST_KEY)
    }

    /// Mark the slot unusable for `cause`
    pub fn fail(&mut self, cause: SlotFlags) {
        self.flags |= SlotFlags::ERR | cause;
    }

    /// One past the last reserved byte
    pub fn end(&self) -> u32 {
        self.address as u32 + self.capacity as u32
    }

    /// Whether `[address, end)` intersects the other slot's range
    pub fn overlaps(&self, other: &Slot) -> bool {
        self.capacity != 0
            && other.capacity != 0
            && (self.address as u32) < other.end()
            && (other.address as u32) < self.end()
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.capacity == 0 {
            write!(f, "Slot({}, inert)", self.key)
        } else {
            write!(f, "Slot({}, addr={}-{})", self.key, self.address, self.end() - 1)
        }
    }
}

/// Append-only list of every slot seen this run
///
/// Indices handed out by [`SlotTable::push`] stay valid for the process
/// lifetime; slots are never removed.
#[derive(Debug, Default, Clone)]
pub struct SlotTable {
    slots: Vec<Slot>,
}

impl SlotTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a slot and return its permanent index
    pub fn push(&mut self, slot: Slot) -> usize {
        self.slots.push(slot);
        self.slots.len() - 1
    }

    /// Get the slot at `index`
    pub fn get(&self, index: usize) -> Option<&Slot> {
        self.slots.get(index)
    }

    /// Get the slot at `index` for flag/size updates
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Slot> {
        self.slots.get_mut(index)
    }

    /// Iterate slots in creation order
    pub fn iter(&self) -> impl Iterator<Item = &Slot> {
        self.slots.iter()
    }

    /// Get number of slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
