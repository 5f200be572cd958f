//! PGN 127502, Switch Bank Control.
//!
//! Payload layout (8 bytes):
//!
//! | byte | content |
//! |------|---------|
//! | 0 | bank instance |
//! | 1..=7 | 28 two-bit channel fields, channel 1 in the low bits of byte 1 |
//!
//! Field values: `0` off, `1` on, `3` no change.

use switchbank_core::config::{defaults, limits};

use super::{N2kMessage, SwitchbankEncoder};
use crate::error::{DeviceError, Result};

const PAYLOAD_LEN: usize = 8;
const NO_CHANGE: u8 = 0b11;

/// Encoder for Switch Bank Control messages.
#[derive(Debug, Clone)]
pub struct Pgn127502Encoder {
    priority: u8,
}

impl Pgn127502Encoder {
    pub fn with_priority(priority: u8) -> Self {
        Self {
            priority: priority & 0x07,
        }
    }
}

impl Default for Pgn127502Encoder {
    fn default() -> Self {
        Self::with_priority(3)
    }
}

impl SwitchbankEncoder for Pgn127502Encoder {
    fn pgn(&self) -> u32 {
        defaults::PGN
    }

    fn encode(&self, instance: u8, states: &[bool]) -> Result<N2kMessage> {
        if instance > limits::MAX_INSTANCE {
            return Err(DeviceError::Encode(format!(
                "instance {} exceeds {}",
                instance,
                limits::MAX_INSTANCE
            )));
        }
        if states.len() > limits::MAX_CHANNELS {
            return Err(DeviceError::Encode(format!(
                "{} channel states exceed {}",
                states.len(),
                limits::MAX_CHANNELS
            )));
        }

        let mut data = [0u8; PAYLOAD_LEN];
        data[0] = instance;
        for slot in 0..limits::MAX_CHANNELS {
            let field = match states.get(slot) {
                Some(true) => 1,
                Some(false) => 0,
                None => NO_CHANGE,
            };
            data[1 + slot / 4] |= field << ((slot % 4) * 2);
        }

        Ok(N2kMessage::new(self.pgn(), self.priority, data.to_vec()))
    }
}
