//! Store configuration
//!
//! Loaded from a TOML file layered with `FRAM_PREF_*` environment
//! variables:
//!
//! ```toml
//! scheme = "checksum"
//! build_identity = "2024-05-01 12:00:00"
//!
//! [pool]
//! start = 0
//! size = 1024
//!
//! [[static_slots]]
//! key = "wifi_credentials"
//! address = 2048
//! size = 100
//! persist_key = true
//!
//! # Pool requests made at boot, in the order the firmware makes them
//! [[requests]]
//! tag = 43690
//! len = 10
//! ```
//!
//! Pool slots are handed out in request order and that order is not stored
//! on the device. A tool that opens an image outside the firmware replays
//! `requests` to land on the same addresses.

use crate::error::{Error, Result};
use crate::prefs::{fnv1_hash, IntegrityScheme, Slot};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Pool base address used when the configuration omits `start`
pub const DEFAULT_POOL_START: u16 = 0;

/// Smallest pool that holds the version header and one record
pub const MIN_POOL_SIZE: u16 = 9;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "FRAM_PREF";

fn default_pool_start() -> u16 {
    DEFAULT_POOL_START
}

/// Dynamic allocation region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Bytes reserved, the 4-byte version header included
    pub size: u16,
    #[serde(default = "default_pool_start")]
    pub start: u16,
}

impl PoolConfig {
    pub fn new(size: u16) -> Self {
        Self {
            size,
            start: DEFAULT_POOL_START,
        }
    }

    pub fn at(start: u16, size: u16) -> Self {
        Self { size, start }
    }

    fn end(&self) -> u32 {
        self.start as u32 + self.size as u32
    }
}

/// A slot pinned to a fixed address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticSlotConfig {
    pub key: String,
    pub address: u16,
    /// Bytes reserved, trailer included. 0 disables the slot
    pub size: u16,
    /// Type tag routed to this slot; defaults to the hash of `key`
    #[serde(default)]
    pub tag: Option<u32>,
    /// Validate records against the key hash instead of the caller's tag
    #[serde(default)]
    pub persist_key: bool,
}

impl StaticSlotConfig {
    pub fn new(key: impl Into<String>, address: u16, size: u16) -> Self {
        Self {
            key: key.into(),
            address,
            size,
            tag: None,
            persist_key: false,
        }
    }

    pub fn with_tag(mut self, tag: u32) -> Self {
        self.tag = Some(tag);
        self
    }

    pub fn persist_key(mut self) -> Self {
        self.persist_key = true;
        self
    }

    /// Tag that routes requests to this slot
    pub fn resolved_tag(&self) -> u32 {
        self.tag.unwrap_or_else(|| fnv1_hash(&self.key))
    }

    fn as_slot(&self) -> Slot {
        Slot::new_static(self.key.clone(), self.address, self.size, self.persist_key)
    }
}

/// Parse a type tag given as decimal or `0x`-prefixed hex
pub fn parse_tag(value: &str) -> std::result::Result<u32, String> {
    let value = value.trim();
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).map_err(|e| e.to_string()),
        None => value.parse::<u32>().map_err(|e| e.to_string()),
    }
}

/// A pool request replayed at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferenceRequest {
    pub tag: u32,
    /// Payload length, trailer excluded
    pub len: usize,
}

impl PreferenceRequest {
    pub fn new(tag: u32, len: usize) -> Self {
        Self { tag, len }
    }
}

impl FromStr for PreferenceRequest {
    type Err = String;

    /// `tag:len`, e.g. `0xAAAA:10`
    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        let (tag, len) = value
            .split_once(':')
            .ok_or_else(|| format!("expected TAG:LEN, got '{}'", value))?;
        let len = len.trim().parse::<usize>().map_err(|e| e.to_string())?;
        Ok(Self::new(parse_tag(tag)?, len))
    }
}

/// Complete preference store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Dynamic pool; `None` disables pool allocation
    pub pool: Option<PoolConfig>,
    pub scheme: IntegrityScheme,
    /// Identity hashed into the pool header
    pub build_identity: String,
    pub static_slots: Vec<StaticSlotConfig>,
    /// Pool requests replayed by [`FramPreferences::preload`](crate::FramPreferences::preload)
    pub requests: Vec<PreferenceRequest>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            pool: None,
            scheme: IntegrityScheme::default(),
            build_identity: crate::default_build_identity(),
            static_slots: Vec::new(),
            requests: Vec::new(),
        }
    }
}

impl StoreConfig {
    /// Configuration with a pool of `size` bytes at `start`
    pub fn with_pool(start: u16, size: u16) -> Self {
        Self {
            pool: Some(PoolConfig::at(start, size)),
            ..Self::default()
        }
    }

    pub fn scheme(mut self, scheme: IntegrityScheme) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn build_identity(mut self, identity: impl Into<String>) -> Self {
        self.build_identity = identity.into();
        self
    }

    pub fn static_slot(mut self, slot: StaticSlotConfig) -> Self {
        self.static_slots.push(slot);
        self
    }

    /// Append a pool request to replay at startup
    pub fn request(mut self, tag: u32, len: usize) -> Self {
        self.requests.push(PreferenceRequest::new(tag, len));
        self
    }

    /// Load a TOML file and apply `FRAM_PREF_*` overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).format(config::FileFormat::Toml))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| Error::InvalidConfig(format!("Failed to read config: {}", e)))?;

        let cfg: StoreConfig = settings
            .try_deserialize()
            .map_err(|e| Error::InvalidConfig(format!("Failed to parse config: {}", e)))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let cfg: StoreConfig = toml::from_str(text)
            .map_err(|e| Error::InvalidConfig(format!("Failed to parse config: {}", e)))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check the layout for errors that do not depend on the device
    pub fn validate(&self) -> Result<()> {
        if let Some(pool) = &self.pool {
            if pool.size < MIN_POOL_SIZE {
                return Err(Error::InvalidConfig(format!(
                    "pool size {} is below the minimum of {}",
                    pool.size, MIN_POOL_SIZE
                )));
            }
            if pool.end() > u16::MAX as u32 {
                return Err(Error::InvalidConfig(format!(
                    "pool {}+{} exceeds the 16-bit address space",
                    pool.start, pool.size
                )));
            }
        }

        let trailer = self.scheme.trailer_len();
        let mut seen_tags = std::collections::HashSet::new();

        for (i, decl) in self.static_slots.iter().enumerate() {
            if decl.size != 0 && decl.size < trailer {
                return Err(Error::InvalidConfig(format!(
                    "static slot '{}' holds {} bytes, less than the {}-byte trailer",
                    decl.key, decl.size, trailer
                )));
            }

            let slot = decl.as_slot();
            if slot.end() > u16::MAX as u32 {
                return Err(Error::InvalidConfig(format!(
                    "static slot '{}' exceeds the 16-bit address space",
                    decl.key
                )));
            }

            if !seen_tags.insert(decl.resolved_tag()) {
                return Err(Error::InvalidConfig(format!(
                    "static slot '{}' reuses tag {}",
                    decl.key,
                    decl.resolved_tag()
                )));
            }

            if let Some(pool) = &self.pool {
                let region = Slot::new_static("pool", pool.start, pool.size, false);
                if slot.overlaps(&region) {
                    return Err(Error::InvalidConfig(format!(
                        "static slot '{}' overlaps the pool",
                        decl.key
                    )));
                }
            }

            for other in &self.static_slots[..i] {
                if slot.overlaps(&other.as_slot()) {
                    return Err(Error::InvalidConfig(format!(
                        "static slots '{}' and '{}' overlap",
                        other.key, decl.key
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = StoreConfig::default();
        assert!(cfg.pool.is_none());
        assert_eq!(cfg.scheme, IntegrityScheme::Checksum);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_parse_toml() -> Result<()> {
        let cfg = StoreConfig::from_toml_str(
            r#"
            scheme = "combined"
            build_identity = "v1"

            [pool]
            size = 100

            [[static_slots]]
            key = "wifi"
            address = 200
            size = 40
            persist_key = true

            [[static_slots]]
            key = "unused"
            address = 300
            size = 0
            tag = 7
            "#,
        )?;

        assert_eq!(cfg.pool, Some(PoolConfig::at(DEFAULT_POOL_START, 100)));
        assert_eq!(cfg.scheme, IntegrityScheme::Combined);
        assert_eq!(cfg.build_identity, "v1");
        assert_eq!(cfg.static_slots.len(), 2);
        assert!(cfg.static_slots[0].persist_key);
        assert_eq!(cfg.static_slots[0].resolved_tag(), fnv1_hash("wifi"));
        assert_eq!(cfg.static_slots[1].resolved_tag(), 7);
        Ok(())
    }

    #[test]
    fn test_parse_requests() -> Result<()> {
        let cfg = StoreConfig::from_toml_str(
            r#"
            [pool]
            size = 64

            [[requests]]
            tag = 2
            len = 8

            [[requests]]
            tag = 1
            len = 4
            "#,
        )?;
        assert_eq!(
            cfg.requests,
            vec![PreferenceRequest::new(2, 8), PreferenceRequest::new(1, 4)]
        );
        Ok(())
    }

    #[test]
    fn test_request_from_str() {
        assert_eq!("0xAAAA:10".parse::<PreferenceRequest>(), Ok(PreferenceRequest::new(0xAAAA, 10)));
        assert_eq!("7:0".parse::<PreferenceRequest>(), Ok(PreferenceRequest::new(7, 0)));
        assert!("0xAAAA".parse::<PreferenceRequest>().is_err());
        assert!("x:1".parse::<PreferenceRequest>().is_err());
    }

    #[test]
    fn test_parse_tag() {
        assert_eq!(parse_tag("0xAAAA"), Ok(0xAAAA));
        assert_eq!(parse_tag("43690"), Ok(0xAAAA));
        assert!(parse_tag("0xZZ").is_err());
    }

    #[test]
    fn test_load_file() -> Result<()> {
        let path = std::env::temp_dir().join(format!("fram_pref_cfg_{}.toml", std::process::id()));
        std::fs::write(&path, "build_identity = \"file\"\n[pool]\nstart = 16\nsize = 64\n")
            .map_err(|e| Error::Io(e.to_string()))?;

        let cfg = StoreConfig::load(&path)?;
        assert_eq!(cfg.pool, Some(PoolConfig::at(16, 64)));
        assert_eq!(cfg.build_identity, "file");

        std::fs::remove_file(path).ok();
        Ok(())
    }

    #[test]
    fn test_pool_bounds() {
        assert!(StoreConfig::with_pool(0, 8).validate().is_err());
        assert!(StoreConfig::with_pool(0, 9).validate().is_ok());
        assert!(StoreConfig::with_pool(65000, 600).validate().is_err());
    }

    #[test]
    fn test_static_smaller_than_trailer() {
        let cfg = StoreConfig::default()
            .scheme(IntegrityScheme::TypeTag)
            .static_slot(StaticSlotConfig::new("tiny", 0, 3));
        assert!(matches!(cfg.validate(), Err(Error::InvalidConfig(_))));

        // Zero size is an intentionally inert slot
        let cfg = StoreConfig::default().static_slot(StaticSlotConfig::new("off", 0, 0));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_static_overlaps_rejected() {
        let with_pool = StoreConfig::with_pool(0, 100).static_slot(StaticSlotConfig::new("a", 90, 20));
        assert!(with_pool.validate().is_err());

        let pair = StoreConfig::default()
            .static_slot(StaticSlotConfig::new("a", 0, 20))
            .static_slot(StaticSlotConfig::new("b", 19, 4));
        assert!(pair.validate().is_err());

        let adjacent = StoreConfig::with_pool(0, 100)
            .static_slot(StaticSlotConfig::new("a", 100, 20))
            .static_slot(StaticSlotConfig::new("b", 120, 4));
        assert!(adjacent.validate().is_ok());
    }

    #[test]
    fn test_duplicate_tags_rejected() {
        let cfg = StoreConfig::default()
            .static_slot(StaticSlotConfig::new("a", 0, 10).with_tag(5))
            .static_slot(StaticSlotConfig::new("b", 10, 10).with_tag(5));
        assert!(cfg.validate().is_err());
    }
}
