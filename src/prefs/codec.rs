//! Record codec
//!
//! Every record is stored as `payload || trailer`. The trailer always
//! depends on the payload or on the caller's identity, so a write torn by
//! a power loss reads back as "absent" rather than as garbage.
//!
//! ```text
//! Checksum:  [payload][sum:u16 LE]
//! TypeTag:   [payload][tag:u32 LE]
//! Combined:  [payload][sum:u16 LE][tag:u32 LE]
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which integrity trailer follows each record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityScheme {
    /// 2-byte checksum over the folded type tag and the payload
    #[default]
    Checksum,
    /// 4-byte raw type tag
    TypeTag,
    /// Checksum followed by the type tag
    Combined,
}

impl IntegrityScheme {
    /// Width of the trailer in bytes
    pub const fn trailer_len(self) -> u16 {
        match self {
            IntegrityScheme::Checksum => 2,
            IntegrityScheme::TypeTag => 4,
            IntegrityScheme::Combined => 6,
        }
    }

    fn has_checksum(self) -> bool {
        matches!(self, IntegrityScheme::Checksum | IntegrityScheme::Combined)
    }

    fn has_tag(self) -> bool {
        matches!(self, IntegrityScheme::TypeTag | IntegrityScheme::Combined)
    }
}

impl fmt::Display for IntegrityScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IntegrityScheme::Checksum => "checksum",
            IntegrityScheme::TypeTag => "type_tag",
            IntegrityScheme::Combined => "combined",
        };
        f.write_str(name)
    }
}

/// Fold a 32-bit tag into 16 bits by adding its halves
pub fn fold32to16(tag: u32) -> u16 {
    ((tag >> 16) as u16).wrapping_add(tag as u16)
}

/// Encoder/validator bound to one scheme and one type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordCodec {
    scheme: IntegrityScheme,
    type_tag: u32,
}

impl RecordCodec {
    /// A codec for records of `type_tag` under `scheme`
    pub fn new(scheme: IntegrityScheme, type_tag: u32) -> Self {
        Self { scheme, type_tag }
    }

    /// Scheme used for the trailer
    pub fn scheme(&self) -> IntegrityScheme {
        self.scheme
    }

    /// Tag mixed into the trailer
    pub fn type_tag(&self) -> u32 {
        self.type_tag
    }

    /// Width of this codec's trailer in bytes
    pub fn trailer_len(&self) -> usize {
        self.scheme.trailer_len() as usize
    }

    /// Size of an encoded record carrying `payload_len` bytes
    pub fn record_len(&self, payload_len: usize) -> usize {
        payload_len + self.trailer_len()
    }

    /// `fold32to16(tag) + Σ payload` modulo 2^16
    pub fn checksum(&self, payload: &[u8]) -> u16 {
        payload
            .iter()
            .fold(fold32to16(self.type_tag), |sum, &b| sum.wrapping_add(b as u16))
    }

    /// Append the trailer to `payload`
    pub fn encode(&self, payload: &[u8]) -> Vec<u8> {
        let mut record = Vec::with_capacity(self.record_len(payload.len()));
        record.extend_from_slice(payload);
        if self.scheme.has_checksum() {
            record.extend_from_slice(&self.checksum(payload).to_le_bytes());
        }
        if self.scheme.has_tag() {
            record.extend_from_slice(&self.type_tag.to_le_bytes());
        }
        record
    }

    /// Split a stored record and return its payload if the trailer matches
    ///
    /// Any mismatch is reported as `None`, the same as a record that was
    /// never written.
    pub fn decode<'a>(&self, record: &'a [u8]) -> Option<&'a [u8]> {
        let payload_len = record.len().checked_sub(self.trailer_len())?;
        let (payload, trailer) = record.split_at(payload_len);

        let mut rest = trailer;
        if self.scheme.has_checksum() {
            let stored = u16::from_le_bytes([rest[0], rest[1]]);
            if stored != self.checksum(payload) {
                return None;
            }
            rest = &rest[2..];
        }
        if self.scheme.has_tag() {
            let stored = u32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]);
            if stored != self.type_tag {
                return None;
            }
        }

        Some(payload)
    }
}
