//! Diagnostic description of a store
//!
//! `describe()` captures pool usage and every slot seen this run;
//! `log_config()` prints the same through `tracing`.

use super::codec::IntegrityScheme;
use super::slot::{Slot, SlotError};
use super::store::{FramPreferences, StoreState};
use crate::device::BackingStore;
use serde::Serialize;
use tracing::{debug, error, info, warn};

/// Pool section of a report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolReport {
    pub start: u16,
    /// Last pool byte
    pub last: u16,
    pub size: u16,
    /// Bytes in use, header included
    pub used: u16,
    /// Whether the version guard wiped the pool at boot
    pub cleared: bool,
    pub fits_device: bool,
}

/// Health of one slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    Ok,
    /// Zero capacity, never yields a handle
    Inert,
    Error,
}

/// Slot section of a report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotReport {
    pub key: String,
    #[serde(rename = "static")]
    pub is_static: bool,
    pub persist_key: bool,
    /// First and last reserved byte; the last may lie past the 16-bit
    /// address space when the slot overflowed
    pub range: Option<(u32, u32)>,
    /// Last requested record size, trailer included
    pub requested_size: Option<u16>,
    pub status: SlotStatus,
    pub errors: Vec<SlotError>,
}

impl From<&Slot> for SlotReport {
    fn from(slot: &Slot) -> Self {
        let status = if slot.capacity == 0 {
            SlotStatus::Inert
        } else if slot.flags.is_error() {
            SlotStatus::Error
        } else {
            SlotStatus::Ok
        };

        Self {
            key: slot.key.clone(),
            is_static: slot.is_static(),
            persist_key: slot.persist_key(),
            range: (slot.capacity != 0).then(|| (slot.address as u32, slot.end() - 1)),
            requested_size: (slot.requested_size != 0).then_some(slot.requested_size),
            status,
            errors: slot.flags.error_causes(),
        }
    }
}

/// Snapshot of a store's layout and health
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreReport {
    pub state: StoreState,
    pub device_capacity: u16,
    pub device_connected: bool,
    pub scheme: IntegrityScheme,
    pub pool: Option<PoolReport>,
    pub slots: Vec<SlotReport>,
}

impl<D: BackingStore + 'static> FramPreferences<D> {
    /// Capture pool usage and every slot created so far
    pub fn describe(&self) -> StoreReport {
        let capacity = self.device().capacity_bytes();
        let layout = self.layout.lock();
        let pool = layout.allocator.pool();

        let pool_report = pool.is_enabled().then(|| PoolReport {
            start: pool.start,
            last: (pool.end() - 1) as u16,
            size: pool.size,
            used: pool.used(),
            cleared: pool.was_cleared(),
            fits_device: pool.end() <= capacity as u32,
        });

        StoreReport {
            state: self.state(),
            device_capacity: capacity,
            device_connected: self.device().is_connected(),
            scheme: self.scheme(),
            pool: pool_report,
            slots: layout.slots.iter().map(SlotReport::from).collect(),
        }
    }

    /// Log the report, one line per slot
    pub fn log_config(&self) {
        let report = self.describe();
        info!("FRAM preferences:");

        if report.device_capacity == 0 {
            error!("  Device returns 0 size!");
            return;
        }
        if !report.device_connected {
            error!("  Device connect failed!");
            return;
        }

        info!("  Scheme: {} ({}-byte trailer)", report.scheme, report.scheme.trailer_len());

        if let Some(pool) = &report.pool {
            info!("  Pool: {} bytes ({}-{})", pool.size, pool.start, pool.last);
            if !pool.fits_device {
                error!("  * Does not fit in FRAM (0-{})!", report.device_capacity - 1);
            }
            if pool.cleared {
                info!("  Pool was cleared");
            }
            info!("  Pool: {} bytes used", pool.used);
        }

        for slot in &report.slots {
            let mut msg = format!("  Pref: key: {}", slot.key);
            if slot.is_static && slot.persist_key {
                msg.push_str(", persist_key");
            }
            if let Some((first, last)) = slot.range {
                msg.push_str(&format!(", addr: {}-{}", first, last));
            }
            if let Some(size) = slot.requested_size {
                msg.push_str(&format!(", request size: {}", size));
            }

            match slot.status {
                SlotStatus::Inert => warn!("{}", msg),
                SlotStatus::Error => {
                    error!("{}", msg);
                    for cause in &slot.errors {
                        match cause {
                            SlotError::SizeRequest => error!("  * Requested larger size!"),
                            SlotError::SizeDevice => {
                                error!("  * Does not fit in FRAM (0-{})!", report.device_capacity - 1)
                            }
                            SlotError::SizePool => error!("  * Does not fit in pool!"),
                        }
                    }
                }
                SlotStatus::Ok => debug!("{}", msg),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{StaticSlotConfig, StoreConfig};
    use crate::device::MemoryFram;
    use crate::error::Result;
    use crate::prefs::PreferenceStore;

    #[test]
    fn test_describe_pool_and_slots() -> Result<()> {
        let config = StoreConfig::with_pool(0, 40)
            .static_slot(StaticSlotConfig::new("fixed", 64, 16).with_tag(9).persist_key())
            .static_slot(StaticSlotConfig::new("off", 100, 0).with_tag(10));
        let mut store = FramPreferences::new(MemoryFram::new(128), &config)?;
        store.initialize(None)?;

        assert!(store.make_handle(1, 10).is_valid());
        assert!(!store.make_handle(2, 30).is_valid());
        assert!(!store.make_handle(10, 4).is_valid());
        store.log_config();

        let report = store.describe();
        assert_eq!(report.state, StoreState::Ready);
        assert_eq!(
            report.pool,
            Some(PoolReport {
                start: 0,
                last: 39,
                size: 40,
                used: 16,
                cleared: true,
                fits_device: true,
            })
        );

        assert_eq!(report.slots.len(), 4);
        let fixed = &report.slots[0];
        assert!(fixed.is_static && fixed.persist_key);
        assert_eq!(fixed.range, Some((64, 79)));
        assert_eq!(fixed.requested_size, None);

        let off = &report.slots[1];
        assert_eq!(off.status, SlotStatus::Inert);
        assert_eq!(off.requested_size, Some(6));

        let ok = &report.slots[2];
        assert_eq!(ok.key, "1");
        assert_eq!(ok.status, SlotStatus::Ok);
        assert_eq!(ok.range, Some((4, 15)));

        let exhausted = &report.slots[3];
        assert_eq!(exhausted.status, SlotStatus::Error);
        assert_eq!(exhausted.errors, vec![SlotError::SizePool]);
        Ok(())
    }

    #[test]
    fn test_report_serializes() -> Result<()> {
        let mut store = FramPreferences::new(MemoryFram::new(64), &StoreConfig::with_pool(0, 32))?;
        store.initialize(None)?;

        let json = serde_json::to_value(store.describe()).unwrap();
        assert_eq!(json["state"], "ready");
        assert_eq!(json["scheme"], "checksum");
        assert_eq!(json["pool"]["used"], 4);
        Ok(())
    }

    #[test]
    fn test_overflowing_slot_range_is_not_truncated() -> Result<()> {
        let mut store = FramPreferences::new(MemoryFram::new(2048), &StoreConfig::with_pool(1000, 200))?;
        store.initialize(None)?;

        assert!(!store.make_handle(1, 65500).is_valid());
        store.log_config();

        let report = store.describe();
        let slot = &report.slots[0];
        assert_eq!(slot.status, SlotStatus::Error);
        assert_eq!(slot.range, Some((1004, 66505)));
        assert_eq!(slot.errors, vec![SlotError::SizePool]);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["slots"][0]["errors"][0], "size_pool");
        Ok(())
    }
}
