//! Configuration normalizer.
//!
//! Turns the raw plugin options into a validated [`Configuration`]. Invalid
//! entries are dropped one at a time and reported as [`ConfigIssue`]s; only an
//! absent or empty switchbank list fails the whole load.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use switchbank_core::config::{defaults, env_vars, limits};
use switchbank_core::enum_from_str;
use tracing::debug;

use crate::error::{DeviceError, Result};

/// Switch bank module kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BankType {
    /// Actuator module; receives control messages
    #[default]
    Relay,
    /// Input module; only described
    Switch,
}

enum_from_str!(BankType, [Relay => "relay", Switch => "switch"]);

/// HTTP method used to deliver the metadata digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PublishMethod {
    Patch,
    Post,
    Put,
}

enum_from_str!(PublishMethod, [Patch => "PATCH", Post => "POST", Put => "PUT"]);

/// One channel of a switch bank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    /// 1-based channel index
    pub index: u8,
    pub description: String,
    /// Data tree path of the channel state, fixed at normalization.
    pub path: String,
}

/// A multi-channel relay or switch-input module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Switchbank {
    pub instance: u8,
    #[serde(rename = "type")]
    pub bank_type: BankType,
    pub description: String,
    pub pgn: u32,
    pub channel_count: usize,
    pub channels: Vec<Channel>,
}

impl Switchbank {
    pub fn is_relay(&self) -> bool {
        self.bank_type == BankType::Relay
    }
}

/// Remote metadata publication settings.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublisherConfig {
    pub endpoint: Option<String>,
    pub method: Option<PublishMethod>,
    /// `username:password`
    #[serde(default, skip_serializing)]
    pub credentials: Option<String>,
    pub server: String,
    pub auth_path: String,
    pub retries: u32,
    /// Milliseconds between attempts
    pub interval: u64,
}

impl PublisherConfig {
    /// Remote publication needs an endpoint, a method and credentials.
    pub fn is_remote(&self) -> bool {
        self.endpoint.is_some() && self.method.is_some() && self.credentials.is_some()
    }

    pub fn url(&self) -> Option<String> {
        self.endpoint
            .as_deref()
            .map(|endpoint| switchbank_core::config::join_url(&self.server, endpoint))
    }
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            method: defaults::PUBLISH_METHOD.parse().ok(),
            credentials: None,
            server: env_vars::server().unwrap_or_else(|| defaults::SERVER.to_string()),
            auth_path: defaults::AUTH_PATH.to_string(),
            retries: defaults::PUBLISH_RETRIES,
            interval: defaults::PUBLISH_INTERVAL_MS,
        }
    }
}

impl fmt::Debug for PublisherConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublisherConfig")
            .field("endpoint", &self.endpoint)
            .field("method", &self.method)
            .field("credentials", &self.credentials.as_ref().map(|_| "<redacted>"))
            .field("server", &self.server)
            .field("auth_path", &self.auth_path)
            .field("retries", &self.retries)
            .field("interval", &self.interval)
            .finish()
    }
}

/// Validated configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    pub root: String,
    pub switchbanks: Vec<Switchbank>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_publisher: Option<PublisherConfig>,
}

impl Configuration {
    pub fn relay_banks(&self) -> impl Iterator<Item = &Switchbank> {
        self.switchbanks.iter().filter(|b| b.is_relay())
    }

    pub fn relay_count(&self) -> usize {
        self.relay_banks().count()
    }

    pub fn switch_count(&self) -> usize {
        self.switchbanks.len() - self.relay_count()
    }

    /// Channel paths of every relay bank.
    pub fn relay_paths(&self) -> Vec<String> {
        self.relay_banks()
            .flat_map(|b| b.channels.iter().map(|c| c.path.clone()))
            .collect()
    }

    /// Remote publication settings, if complete.
    pub fn remote_publisher(&self) -> Option<&PublisherConfig> {
        self.metadata_publisher.as_ref().filter(|p| p.is_remote())
    }
}

/// A recoverable problem found while normalizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ConfigIssue {
    RootDefaulted { reason: String },
    SwitchbankDropped { position: usize, reason: String },
    ChannelDropped { instance: u8, position: usize, reason: String },
    ChannelCountAdjusted { instance: u8, reason: String },
    EmptyBank { instance: u8 },
    PublisherInvalid { reason: String },
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigIssue::RootDefaulted { reason } => {
                write!(f, "using default root '{}' ({})", defaults::ROOT, reason)
            }
            ConfigIssue::SwitchbankDropped { reason, .. } => {
                write!(f, "dropping switchbank ({})", reason)
            }
            ConfigIssue::ChannelDropped {
                instance, reason, ..
            } => write!(f, "dropping channel on switchbank {} ({})", instance, reason),
            ConfigIssue::ChannelCountAdjusted { instance, reason } => {
                write!(f, "switchbank {} channel count adjusted ({})", instance, reason)
            }
            ConfigIssue::EmptyBank { instance } => {
                write!(f, "switchbank {} has no channels", instance)
            }
            ConfigIssue::PublisherInvalid { reason } => {
                write!(f, "ignoring metadata publisher setting ({})", reason)
            }
        }
    }
}

/// Normalizer output.
#[derive(Debug, Clone)]
pub struct Normalized {
    pub configuration: Configuration,
    pub issues: Vec<ConfigIssue>,
}

/// Validate raw plugin options.
pub fn normalize(options: &Value) -> Result<Normalized> {
    let mut issues = Vec::new();
    let configuration = normalize_into(options, &mut issues)?;
    Ok(Normalized {
        configuration,
        issues,
    })
}

/// Validate raw plugin options, appending every issue to `issues` even when
/// the load fails.
pub fn normalize_into(options: &Value, issues: &mut Vec<ConfigIssue>) -> Result<Configuration> {
    let options = options
        .as_object()
        .ok_or_else(|| DeviceError::ConfigInvalid("options must be an object".into()))?;

    let root = match options.get("root") {
        None | Some(Value::Null) => defaults::ROOT.to_string(),
        Some(Value::String(root)) if !root.is_empty() => root.clone(),
        Some(Value::String(_)) => {
            issues.push(ConfigIssue::RootDefaulted {
                reason: "root is empty".into(),
            });
            defaults::ROOT.to_string()
        }
        Some(other) => {
            issues.push(ConfigIssue::RootDefaulted {
                reason: format!("root is not a string ({})", other),
            });
            defaults::ROOT.to_string()
        }
    };

    let candidates = match options.get("switchbanks") {
        Some(Value::Array(banks)) => banks,
        Some(_) => {
            return Err(DeviceError::ConfigInvalid(
                "'switchbanks' must be an array".into(),
            ))
        }
        None => {
            return Err(DeviceError::ConfigInvalid(
                "missing 'switchbanks' property".into(),
            ))
        }
    };

    let mut seen = HashSet::new();
    let mut switchbanks = Vec::with_capacity(candidates.len());
    for (position, candidate) in candidates.iter().enumerate() {
        match normalize_bank(&root, candidate, &mut seen, issues) {
            Ok(bank) => switchbanks.push(bank),
            Err(reason) => issues.push(ConfigIssue::SwitchbankDropped { position, reason }),
        }
    }

    if switchbanks.is_empty() {
        return Err(DeviceError::ConfigInvalid("no switchbanks configured".into()));
    }

    let metadata_publisher = match options.get("metadataPublisher") {
        None | Some(Value::Null) => None,
        Some(Value::Object(publisher)) => Some(normalize_publisher(publisher, issues)),
        Some(other) => {
            issues.push(ConfigIssue::PublisherInvalid {
                reason: format!("'metadataPublisher' is not an object ({})", other),
            });
            None
        }
    };

    let configuration = Configuration {
        root,
        switchbanks,
        metadata_publisher,
    };
    debug!(
        banks = configuration.switchbanks.len(),
        issues = issues.len(),
        "configuration normalized"
    );

    Ok(configuration)
}

fn normalize_bank(
    root: &str,
    candidate: &Value,
    seen: &mut HashSet<u8>,
    issues: &mut Vec<ConfigIssue>,
) -> std::result::Result<Switchbank, String> {
    let bank = candidate
        .as_object()
        .ok_or_else(|| format!("switchbank is not an object ({})", candidate))?;

    let instance = match bank.get("instance") {
        None | Some(Value::Null) => return Err("missing switchbank 'instance' property".into()),
        Some(raw) => match as_integer(raw) {
            Some(0) => return Err("missing switchbank 'instance' property".into()),
            Some(n) if (1..=i64::from(limits::MAX_INSTANCE)).contains(&n) => n as u8,
            Some(n) => return Err(format!("switchbank 'instance' is out of range ({})", n)),
            None => return Err(format!("switchbank 'instance' is not an integer ({})", raw)),
        },
    };
    if seen.contains(&instance) {
        return Err(format!("duplicate switchbank instance ({})", instance));
    }

    let bank_type = match bank.get("type") {
        None | Some(Value::Null) => BankType::default(),
        Some(Value::String(s)) => s
            .parse::<BankType>()
            .map_err(|_| format!("switchbank 'type' is invalid ({})", s))?,
        Some(other) => return Err(format!("switchbank 'type' is invalid ({})", other)),
    };

    let pgn = match bank.get("pgn").or_else(|| bank.get("PGN")) {
        None | Some(Value::Null) => defaults::PGN,
        Some(raw) => as_integer(raw)
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| format!("switchbank 'pgn' is invalid ({})", raw))?,
    };

    let mut indexes = HashSet::new();
    let mut channels = Vec::new();
    if let Some(raw_channels) = bank.get("channels") {
        let list = raw_channels.as_array().map(Vec::as_slice).unwrap_or(&[]);
        if !raw_channels.is_array() && !raw_channels.is_null() {
            issues.push(ConfigIssue::ChannelDropped {
                instance,
                position: 0,
                reason: format!("'channels' is not an array ({})", raw_channels),
            });
        }
        for (position, raw) in list.iter().enumerate() {
            match normalize_channel(root, instance, raw, &mut indexes) {
                Ok(channel) => channels.push(channel),
                Err(reason) => issues.push(ConfigIssue::ChannelDropped {
                    instance,
                    position,
                    reason,
                }),
            }
        }
    }

    let highest = channels.iter().map(|c| c.index as usize).max().unwrap_or(0);
    let explicit = match bank.get("channelCount").or_else(|| bank.get("channelcount")) {
        None | Some(Value::Null) => None,
        Some(raw) => match as_integer(raw).and_then(|n| usize::try_from(n).ok()) {
            Some(n) => Some(n),
            None => {
                issues.push(ConfigIssue::ChannelCountAdjusted {
                    instance,
                    reason: format!("'channelCount' is not a count ({})", raw),
                });
                None
            }
        },
    };
    let mut channel_count = explicit.unwrap_or(0).max(highest);
    if channel_count > limits::MAX_CHANNELS {
        issues.push(ConfigIssue::ChannelCountAdjusted {
            instance,
            reason: format!("{} exceeds {}", channel_count, limits::MAX_CHANNELS),
        });
        channel_count = limits::MAX_CHANNELS;
    }

    if channels.is_empty() {
        issues.push(ConfigIssue::EmptyBank { instance });
    }

    seen.insert(instance);
    Ok(Switchbank {
        instance,
        bank_type,
        description: string_or_empty(bank.get("description")),
        pgn,
        channel_count,
        channels,
    })
}

fn normalize_channel(
    root: &str,
    instance: u8,
    raw: &Value,
    indexes: &mut HashSet<u8>,
) -> std::result::Result<Channel, String> {
    let channel = raw
        .as_object()
        .ok_or_else(|| format!("channel is not an object ({})", raw))?;

    let index = match channel.get("index") {
        None | Some(Value::Null) => return Err("missing channel 'index' property".into()),
        Some(raw_index) => match as_integer(raw_index) {
            Some(n) if (1..=limits::MAX_CHANNELS as i64).contains(&n) => n as u8,
            Some(n) => return Err(format!("channel 'index' is out of range ({})", n)),
            None => return Err(format!("channel 'index' is not an integer ({})", raw_index)),
        },
    };
    if !indexes.insert(index) {
        return Err(format!("duplicate channel index ({})", index));
    }

    Ok(Channel {
        index,
        description: string_or_empty(channel.get("description")),
        path: channel_path(root, instance, index),
    })
}

fn normalize_publisher(
    publisher: &Map<String, Value>,
    issues: &mut Vec<ConfigIssue>,
) -> PublisherConfig {
    let mut config = PublisherConfig::default();

    config.endpoint = non_empty_string(publisher.get("endpoint"));
    config.credentials = non_empty_string(publisher.get("credentials"));

    if let Some(method) = non_empty_string(publisher.get("method")) {
        match method.to_uppercase().parse::<PublishMethod>() {
            Ok(method) => config.method = Some(method),
            Err(_) => {
                issues.push(ConfigIssue::PublisherInvalid {
                    reason: format!("unsupported method ({})", method),
                });
                config.method = None;
            }
        }
    }

    if let Some(server) = non_empty_string(publisher.get("server")) {
        config.server = server;
    }
    if let Some(auth_path) = non_empty_string(publisher.get("authPath")) {
        config.auth_path = auth_path;
    }

    if let Some(raw) = publisher.get("retries").filter(|v| !v.is_null()) {
        match as_integer(raw).and_then(|n| u32::try_from(n).ok()) {
            Some(retries) => config.retries = retries,
            None => issues.push(ConfigIssue::PublisherInvalid {
                reason: format!("'retries' is not a count ({})", raw),
            }),
        }
    }
    if let Some(raw) = publisher.get("interval").filter(|v| !v.is_null()) {
        match as_integer(raw).and_then(|n| u64::try_from(n).ok()).filter(|n| *n > 0) {
            Some(interval) => config.interval = interval,
            None => issues.push(ConfigIssue::PublisherInvalid {
                reason: format!("'interval' is not a positive number ({})", raw),
            }),
        }
    }

    config
}

/// `root + instance + "." + index + ".state"`
pub fn channel_path(root: &str, instance: u8, index: u8) -> String {
    format!("{}{}.{}.state", root, instance, index)
}

/// Path of a bank's own metadata entry.
pub fn bank_path(root: &str, instance: u8) -> String {
    format!("{}{}", root, instance)
}

/// Integral JSON number or numeric string.
pub(crate) fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && f.is_finite()).map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.fract() == 0.0 && f.is_finite())
                    .map(|f| f as i64)
            })
        }
        _ => None,
    }
}

fn string_or_empty(value: Option<&Value>) -> String {
    value
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_default()
}

fn non_empty_string(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
