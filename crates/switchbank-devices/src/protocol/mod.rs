//! Field-bus message encoding.
//!
//! The control handler only sees [`SwitchbankEncoder`]; the PGN a bank is
//! updated with selects the encoder through an [`EncoderRegistry`].
//!
//! ```text
//! (instance, [bool; n])  ──encode──→  N2kMessage  ──Display──→  "ts,prio,pgn,src,dst,len,hex.."
//! ```

pub mod pgn127502;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::Result;

pub use pgn127502::Pgn127502Encoder;

/// Broadcast destination address.
pub const BROADCAST: u8 = 255;

/// An encoded NMEA 2000 message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct N2kMessage {
    pub pgn: u32,
    pub priority: u8,
    pub source: u8,
    pub destination: u8,
    pub data: Vec<u8>,
    pub timestamp: DateTime<Utc>,
}

impl N2kMessage {
    pub fn new(pgn: u32, priority: u8, data: Vec<u8>) -> Self {
        Self {
            pgn,
            priority,
            source: 0,
            destination: BROADCAST,
            data,
            timestamp: Utc::now(),
        }
    }
}

/// Actisense-style text rendering.
impl fmt::Display for N2kMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{},{},{}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.priority,
            self.pgn,
            self.source,
            self.destination,
            self.data.len()
        )?;
        for byte in &self.data {
            write!(f, ",{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Encodes the full state of a switch bank.
pub trait SwitchbankEncoder: Send + Sync {
    fn pgn(&self) -> u32;

    /// Encode `states` (slot 0 = channel 1) for bank `instance`.
    fn encode(&self, instance: u8, states: &[bool]) -> Result<N2kMessage>;
}

/// Encoders keyed by PGN.
#[derive(Clone)]
pub struct EncoderRegistry {
    encoders: HashMap<u32, Arc<dyn SwitchbankEncoder>>,
}

impl EncoderRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        Self {
            encoders: HashMap::new(),
        }
    }

    pub fn register(&mut self, encoder: Arc<dyn SwitchbankEncoder>) {
        self.encoders.insert(encoder.pgn(), encoder);
    }

    pub fn get(&self, pgn: u32) -> Option<Arc<dyn SwitchbankEncoder>> {
        self.encoders.get(&pgn).cloned()
    }

    pub fn supports(&self, pgn: u32) -> bool {
        self.encoders.contains_key(&pgn)
    }
}

impl Default for EncoderRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(Pgn127502Encoder::default()));
        registry
    }
}

impl fmt::Debug for EncoderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut pgns: Vec<_> = self.encoders.keys().collect();
        pgns.sort();
        f.debug_struct("EncoderRegistry").field("pgns", &pgns).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_message_display() {
        let mut message = N2kMessage::new(127502, 3, vec![0x0a, 0x01, 0xff]);
        message.timestamp = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(
            message.to_string(),
            "2024-05-01T12:00:00.000Z,3,127502,0,255,3,0a,01,ff"
        );
    }

    #[test]
    fn test_default_registry() {
        let registry = EncoderRegistry::default();
        assert!(registry.supports(127502));
        assert!(!registry.supports(127501));
        assert!(EncoderRegistry::empty().get(127502).is_none());
    }
}
