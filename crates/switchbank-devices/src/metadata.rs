//! Metadata digest builder.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use switchbank_core::config::defaults;

use crate::config::{bank_path, BankType, Configuration};

/// Metadata published for a bank path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankMetadata {
    pub instance: u8,
    #[serde(rename = "type")]
    pub bank_type: BankType,
    pub description: String,
    pub channel_count: usize,
    #[serde(rename = "$source")]
    pub source: String,
}

/// Metadata published for a channel state path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelMetadata {
    pub description: String,
    #[serde(rename = "type")]
    pub bank_type: BankType,
    pub short_name: String,
    pub display_name: String,
    pub long_name: String,
    /// Staleness threshold (ms)
    pub timeout: u64,
    #[serde(rename = "$source")]
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataEntry {
    Channel(ChannelMetadata),
    Bank(BankMetadata),
}

/// Path-keyed metadata, in sorted path order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataDigest(BTreeMap<String, MetadataEntry>);

impl MetadataDigest {
    pub fn get(&self, path: &str) -> Option<&MetadataEntry> {
        self.0.get(path)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `(path, metadata)` pairs ready for a data tree commit.
    pub fn to_metas(&self) -> Vec<(String, Value)> {
        self.0
            .iter()
            .filter_map(|(path, entry)| {
                serde_json::to_value(entry)
                    .ok()
                    .map(|value| (path.clone(), value))
            })
            .collect()
    }

    pub fn to_json(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

/// Build the digest for every bank and channel of a configuration.
pub fn build_digest(configuration: &Configuration) -> MetadataDigest {
    let source = format!("plugin:{}", defaults::PLUGIN_ID);
    let mut digest = BTreeMap::new();

    for bank in &configuration.switchbanks {
        digest.insert(
            bank_path(&configuration.root, bank.instance),
            MetadataEntry::Bank(BankMetadata {
                instance: bank.instance,
                bank_type: bank.bank_type,
                description: bank.description.clone(),
                channel_count: bank.channel_count,
                source: source.clone(),
            }),
        );

        for channel in &bank.channels {
            let short_name = format!("[{},{}]", bank.instance, channel.index);
            let display_name = if channel.description.is_empty() {
                short_name.clone()
            } else {
                channel.description.clone()
            };
            digest.insert(
                channel.path.clone(),
                MetadataEntry::Channel(ChannelMetadata {
                    description: format!("Binary {} state (0 = OFF, 1 = ON)", bank.bank_type),
                    bank_type: bank.bank_type,
                    long_name: format!("{} {}", display_name, short_name),
                    short_name,
                    display_name,
                    timeout: defaults::METADATA_TIMEOUT_MS,
                    source: source.clone(),
                }),
            );
        }
    }

    MetadataDigest(digest)
}
