// FRAM Preferences - Rust Implementation
// A persistent key/slot preference store on byte-addressable FRAM

#![warn(rust_2018_idioms)]

pub mod config;
pub mod device;
pub mod prefs;

// Re-exports for convenience
pub use config::{PreferenceRequest, StoreConfig};
pub use device::{BackingStore, FileFram, MemoryFram};
pub use prefs::{
    FramPreferences, IntegrityScheme, PreferenceChain, PreferenceHandle, PreferenceStore,
    StoreReport, VolatilePreferences,
};

/// FRAM preference error types
pub mod error {
    use thiserror::Error;

    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum Error {
        #[error("Device unavailable: {0}")]
        DeviceUnavailable(String),

        #[error("Layout overflow: {region} ends at {end} but device holds {capacity} bytes")]
        LayoutOverflow {
            region: String,
            end: u32,
            capacity: u16,
        },

        #[error("Pool exhausted: tag {tag:#010x} needs {requested} bytes, {available} left")]
        PoolExhausted {
            tag: u32,
            requested: u16,
            available: u16,
        },

        #[error("Oversize request: slot '{key}' needs {requested} bytes, holds {capacity}")]
        OversizeRequest {
            key: String,
            requested: u16,
            capacity: u16,
        },

        #[error("Slot disabled: {0}")]
        SlotDisabled(String),

        #[error("Invalid configuration: {0}")]
        InvalidConfig(String),

        #[error("I/O error: {0}")]
        Io(String),
    }

    pub type Result<T> = std::result::Result<T, Error>;
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build identity used when the configuration does not name one
pub fn default_build_identity() -> String {
    format!("{} {}", env!("CARGO_PKG_NAME"), VERSION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_format() {
        let _version: &str = VERSION;
    }

    #[test]
    fn test_default_build_identity_names_crate() {
        let identity = default_build_identity();
        assert!(identity.starts_with("fram-pref "));
        assert!(identity.ends_with(VERSION));
    }
}
