//! Versioning guard
//!
//! The pool header holds `fnv1_hash(build_identity)`. A different build
//! identity at boot wipes every pool record; there is no partial migration.
//!
//! ```text
//! boot ─→ read32(pool.start) == hash ? ─yes─→ keep records
//!                                     └─no──→ zero [data_start, end) ─→ write32(start, hash)
//! ```
//!
//! The hash is written only after the wipe completes, so a power loss
//! mid-wipe triggers another wipe on the next boot.

use super::allocator::Pool;
use crate::device::BackingStore;
use crate::error::Result;
use tracing::{debug, info};

const FNV1_OFFSET_BASIS: u32 = 2_166_136_261;
const FNV1_PRIME: u32 = 16_777_619;

/// Zero-fill granularity
const CLEAR_CHUNK: usize = 16;

/// 32-bit FNV-1 (multiply, then xor)
pub fn fnv1_hash(input: &str) -> u32 {
    input.bytes().fold(FNV1_OFFSET_BASIS, |hash, byte| {
        hash.wrapping_mul(FNV1_PRIME) ^ byte as u32
    })
}

/// Invalidates the pool whenever the build identity changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionGuard {
    hash: u32,
}

impl VersionGuard {
    pub fn new(build_identity: &str) -> Self {
        Self {
            hash: fnv1_hash(build_identity),
        }
    }

    /// Hash expected in the pool header
    pub fn hash(&self) -> u32 {
        self.hash
    }

    /// Compare the stored header with the current identity
    ///
    /// Returns `true` when the pool had to be wiped.
    pub fn check<D: BackingStore + ?Sized>(&self, device: &D, pool: &mut Pool) -> Result<bool> {
        if !pool.is_enabled() {
            return Ok(false);
        }

        let stored = device.read32(pool.start)?;
        if stored == self.hash {
            debug!(hash = self.hash, "Pool version matches");
            return Ok(false);
        }

        info!(stored, expected = self.hash, "Build identity changed, clearing pool");
        Self::clear(device, pool)?;
        device.write32(pool.start, self.hash)?;
        pool.mark_cleared();
        Ok(true)
    }

    /// Zero the pool data region, leaving the header untouched
    pub fn clear<D: BackingStore + ?Sized>(device: &D, pool: &Pool) -> Result<()> {
        if !pool.is_enabled() {
            return Ok(());
        }

        let zeros = [0u8; CLEAR_CHUNK];
        let end = pool.end();
        let mut addr = pool.data_start() as u32;
        while addr < end {
            let len = CLEAR_CHUNK.min((end - addr) as usize);
            device.write(addr as u16, &zeros[..len])?;
            addr += len as u32;
        }

        debug!(start = pool.data_start(), end, "Pool cleared");
        Ok(())
    }

    /// Zero the header so the next boot wipes the pool
    pub fn invalidate<D: BackingStore + ?Sized>(device: &D, pool: &Pool) -> Result<()> {
        if pool.is_enabled() {
            device.write32(pool.start, 0)?;
        }
        Ok(())
    }
}
