//! Static slot registry
//!
//! Pins selected type tags to fixed device addresses declared in the
//! configuration. Consulted before the pool allocator.
//!
//! A slot in persist-key mode validates its record against
//! `fnv1_hash(key)` instead of the caller's numeric tag, so the stored value
//! survives a renumbering of type tags as long as the key stays the same.

use super::guard::fnv1_hash;
use super::slot::{Slot, SlotFlags, SlotTable};
use crate::config::StaticSlotConfig;
use crate::error::{Error, Result};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Address and integrity tag granted to a caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Claim {
    /// Index into the slot table
    pub index: usize,
    /// First byte of the slot on the device
    pub address: u16,
    /// Tag the record codec must use
    pub type_tag: u32,
}

/// Tag → declared slot lookup
#[derive(Debug, Default)]
pub struct StaticSlotRegistry {
    by_tag: HashMap<u32, usize>,
    /// Registered slot indices in declaration order
    declared: Vec<usize>,
}

impl StaticSlotRegistry {
    /// Register every declaration as a slot in `slots`
    ///
    /// A declaration without an explicit tag is matched on the hash of its
    /// key. When two declarations resolve to the same tag the first wins.
    pub fn declare(slots: &mut SlotTable, decls: &[StaticSlotConfig]) -> Self {
        let mut by_tag = HashMap::new();
        let mut declared = Vec::with_capacity(decls.len());

        for decl in decls {
            let index = slots.push(Slot::new_static(
                decl.key.clone(),
                decl.address,
                decl.size,
                decl.persist_key,
            ));
            let tag = decl.resolved_tag();
            if by_tag.contains_key(&tag) {
                warn!(key = %decl.key, tag, "Duplicate static slot tag ignored");
                continue;
            }
            by_tag.insert(tag, index);
            declared.push(index);
            debug!(key = %decl.key, tag, address = decl.address, size = decl.size, "Declared static slot");
        }

        Self { by_tag, declared }
    }

    /// Number of registered tags
    pub fn len(&self) -> usize {
        self.by_tag.len()
    }

    /// Check if no slot was registered
    pub fn is_empty(&self) -> bool {
        self.by_tag.is_empty()
    }

    /// Slot index pinned to `tag`
    pub fn resolve(&self, tag: u32) -> Option<usize> {
        self.by_tag.get(&tag).copied()
    }

    /// Flag every static slot that reaches past a device of `capacity` bytes
    ///
    /// Returns the first offending slot, in declaration order, as a layout
    /// error.
    pub fn check_device(&self, slots: &mut SlotTable, capacity: u16) -> Result<()> {
        let mut first_error = None;

        for &index in &self.declared {
            let Some(slot) = slots.get_mut(index) else {
                continue;
            };
            if slot.capacity != 0 && slot.end() > capacity as u32 {
                slot.fail(SlotFlags::ERR_SIZE_DEVICE);
                if first_error.is_none() {
                    first_error = Some(Error::LayoutOverflow {
                        region: format!("static slot '{}'", slot.key),
                        end: slot.end(),
                        capacity,
                    });
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Hand out the slot at `index` for a record of `record_len` bytes
    ///
    /// Fails closed: an inert slot or a record larger than the declared
    /// capacity never yields an address.
    pub fn claim(&self, slots: &mut SlotTable, index: usize, caller_tag: u32, record_len: u16) -> Result<Claim> {
        let slot = slots
            .get_mut(index)
            .ok_or_else(|| Error::InvalidConfig(format!("unknown static slot {}", index)))?;
        slot.requested_size = record_len;

        if slot.capacity == 0 {
            return Err(Error::SlotDisabled(slot.key.clone()));
        }
        if record_len > slot.capacity {
            slot.fail(SlotFlags::ERR_SIZE_REQUEST);
            return Err(Error::OversizeRequest {
                key: slot.key.clone(),
                requested: record_len,
                capacity: slot.capacity,
            });
        }

        let type_tag = if slot.persist_key() {
            fnv1_hash(&slot.key)
        } else {
            caller_tag
        };

        Ok(Claim {
            index,
            address: slot.address,
            type_tag,
        })
    }
}
