//! Control request handler.
//!
//! A put on one channel path becomes a full-bank update: the requested bit is
//! merged into the bank's cached state vector and the whole vector is encoded
//! and emitted on the outbound channel.

use std::collections::HashMap;

use serde_json::Value;
use switchbank_core::config::{defaults, limits};
use switchbank_core::{enum_from_str, DataTree, PutHandler, PutResponse};
use tracing::debug;

use crate::config::{as_integer, Configuration};
use crate::error::{DeviceError, RequestError, Result};
use crate::protocol::{EncoderRegistry, N2kMessage};
use crate::state::SharedStateCache;

/// Where a request came from, carried in the request value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestSource {
    /// Values `0` and `1`
    Physical,
    /// Values `2` and `3`
    Virtual,
}

enum_from_str!(RequestSource, [Physical => "physical", Virtual => "virtual"]);

/// A validated single-channel write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchRequest {
    pub instance: u8,
    /// 1-based channel index
    pub index: u8,
    pub state: bool,
    pub source: RequestSource,
}

impl SwitchRequest {
    /// Validate `(path, value)`.
    ///
    /// The path is read from its tail as `<instance>.<index>.state`, so any
    /// root prefix is accepted.
    pub fn parse(path: &str, value: &Value) -> std::result::Result<Self, RequestError> {
        let parts: Vec<&str> = path.split('.').collect();
        if parts.len() < 3 || parts[parts.len() - 1] != "state" {
            return Err(RequestError::InvalidPath(path.to_string()));
        }

        let instance = parse_segment(parts[parts.len() - 3])
            .ok_or_else(|| RequestError::InvalidPath(format!("{}: instance is not a number", path)))?;
        if !(0..=i64::from(limits::MAX_INSTANCE)).contains(&instance) {
            return Err(RequestError::InstanceOutOfRange(instance));
        }

        let index = parse_segment(parts[parts.len() - 2])
            .ok_or_else(|| RequestError::InvalidPath(format!("{}: channel is not a number", path)))?;
        if !(1..=limits::MAX_CHANNELS as i64).contains(&index) {
            return Err(RequestError::ChannelOutOfRange(index));
        }

        let code = match value {
            Value::Number(_) | Value::String(_) => as_integer(value),
            _ => None,
        }
        .filter(|code| (0..=3).contains(code))
        .ok_or_else(|| RequestError::InvalidValue(value.to_string()))?;

        Ok(Self {
            instance: instance as u8,
            index: index as u8,
            state: code & 1 == 1,
            source: if code < 2 {
                RequestSource::Physical
            } else {
                RequestSource::Virtual
            },
        })
    }
}

fn parse_segment(segment: &str) -> Option<i64> {
    segment.parse::<i64>().ok()
}

/// Result of a processed request.
#[derive(Debug, Clone)]
pub struct ControlOutcome {
    pub request: SwitchRequest,
    pub message: N2kMessage,
}

/// Put handler for relay channel paths.
#[derive(Clone)]
pub struct ControlHandler {
    tree: DataTree,
    cache: SharedStateCache,
    encoders: EncoderRegistry,
    /// PGN configured per bank instance
    bank_pgns: HashMap<u8, u32>,
}

impl ControlHandler {
    pub fn new(
        tree: DataTree,
        cache: SharedStateCache,
        encoders: EncoderRegistry,
        configuration: &Configuration,
    ) -> Self {
        let bank_pgns = configuration
            .relay_banks()
            .map(|bank| (bank.instance, bank.pgn))
            .collect();
        Self {
            tree,
            cache,
            encoders,
            bank_pgns,
        }
    }

    /// Validate, merge, encode and emit one request.
    pub fn process(&self, path: &str, value: &Value) -> Result<ControlOutcome> {
        debug!(path, value = %value, "processing put request");
        let request = SwitchRequest::parse(path, value)?;

        let pgn = self
            .bank_pgns
            .get(&request.instance)
            .copied()
            .unwrap_or(defaults::PGN);
        let encoder = self
            .encoders
            .get(pgn)
            .ok_or_else(|| DeviceError::Encode(format!("no encoder for PGN {}", pgn)))?;

        let states = {
            let mut cache = self.cache.lock();
            cache.set(request.instance, request.index, request.state);
            cache.resolved(request.instance)
        };

        let message = encoder.encode(request.instance, &states)?;
        self.tree
            .emit(defaults::OUTBOUND_CHANNEL, message.to_string(), defaults::PLUGIN_ID);

        Ok(ControlOutcome { request, message })
    }
}

impl PutHandler for ControlHandler {
    fn handle_put(&self, _context: &str, path: &str, value: &Value) -> PutResponse {
        match self.process(path, value) {
            Ok(outcome) => self.tree.status().notice(format!(
                "transmitted NMEA message '{}' ({} request)",
                outcome.message, outcome.request.source
            )),
            Err(DeviceError::Request(e)) => {
                self.tree.status().error(format!("{} [{}]", e, e.code()))
            }
            Err(e) => self.tree.status().error(e.to_string()),
        }
        PutResponse::completed()
    }
}
