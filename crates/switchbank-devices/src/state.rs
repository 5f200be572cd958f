//! Channel state cache.
//!
//! One state vector per relay bank, kept current from the live value stream
//! of every channel path. The control handler reads the vector to build full
//! bank updates, so the cache itself never emits anything.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use switchbank_core::config::limits;
use switchbank_core::PathReceiver;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::config::Configuration;

/// Cache shared between the observer task and the control handler.
pub type SharedStateCache = Arc<Mutex<ChannelStateCache>>;

/// Per-instance channel states; `None` is unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelStateCache {
    banks: HashMap<u8, Vec<Option<bool>>>,
}

impl ChannelStateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an all-unknown vector for every relay bank.
    pub fn from_config(configuration: &Configuration) -> Self {
        let banks = configuration
            .relay_banks()
            .map(|bank| (bank.instance, vec![None; bank.channel_count]))
            .collect();
        Self { banks }
    }

    pub fn into_shared(self) -> SharedStateCache {
        Arc::new(Mutex::new(self))
    }

    pub fn contains(&self, instance: u8) -> bool {
        self.banks.contains_key(&instance)
    }

    /// Record an observed state. Returns whether the slot changed.
    pub fn observe(&mut self, instance: u8, index: u8, state: bool) -> bool {
        match self.slot_mut(instance, index) {
            Some(slot) if *slot == Some(state) => false,
            Some(slot) => {
                *slot = Some(state);
                true
            }
            None => false,
        }
    }

    /// Write a state requested by a control message.
    pub fn set(&mut self, instance: u8, index: u8, state: bool) {
        if let Some(slot) = self.slot_mut(instance, index) {
            *slot = Some(state);
        }
    }

    pub fn get(&self, instance: u8, index: u8) -> Option<bool> {
        let slot = (index as usize).checked_sub(1)?;
        self.banks.get(&instance)?.get(slot).copied().flatten()
    }

    /// Raw state vector of a bank.
    pub fn vector(&self, instance: u8) -> Option<&[Option<bool>]> {
        self.banks.get(&instance).map(Vec::as_slice)
    }

    /// State vector with unknown slots read as off.
    pub fn resolved(&self, instance: u8) -> Vec<bool> {
        self.banks
            .get(&instance)
            .map(|states| states.iter().map(|s| s.unwrap_or(false)).collect())
            .unwrap_or_default()
    }

    /// Slot for a 1-based channel index, growing the vector when needed.
    fn slot_mut(&mut self, instance: u8, index: u8) -> Option<&mut Option<bool>> {
        let index = index as usize;
        if index == 0 || index > limits::MAX_CHANNELS {
            return None;
        }
        let states = self.banks.entry(instance).or_default();
        if states.len() < index {
            states.resize(index, None);
        }
        states.get_mut(index - 1)
    }
}

/// Interpret an observed value as a binary state.
///
/// Accepts `0`, `1`, `true` and `false`.
pub fn parse_binary(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f == 0.0 => Some(false),
            Some(f) if f == 1.0 => Some(true),
            _ => None,
        },
        _ => None,
    }
}

/// Feed the cache from a path subscription until the stream ends.
///
/// `channels` maps each subscribed path to its `(instance, index)`.
pub fn spawn_observer(
    cache: SharedStateCache,
    mut rx: PathReceiver,
    channels: HashMap<String, (u8, u8)>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some((path, value)) = rx.recv().await {
            let Some(&(instance, index)) = channels.get(&path) else {
                continue;
            };
            let Some(state) = parse_binary(&value) else {
                trace!(path = %path, value = %value, "ignoring non-binary observation");
                continue;
            };
            if cache.lock().observe(instance, index, state) {
                debug!(instance, index, state, "channel state observed");
            }
        }
        debug!("state observer finished");
    })
}
