//! Events flowing through the data tree.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::status::Severity;

/// Event published on the data tree bus.
///
/// Plugins observe deltas and publish metadata, outbound field-bus messages
/// and status diagnostics through the same bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TreeEvent {
    /// A value changed at a path.
    Delta {
        path: String,
        value: Value,
        source: String,
        timestamp: i64,
    },

    /// Metadata was committed for a path.
    Meta {
        path: String,
        meta: Value,
        timestamp: i64,
    },

    /// A message was emitted on an outbound transmit channel.
    Outbound {
        channel: String,
        payload: String,
        timestamp: i64,
    },

    /// A status or diagnostic message was reported.
    Status {
        severity: Severity,
        message: String,
        timestamp: i64,
    },
}

impl TreeEvent {
    /// Build a delta stamped with the current time.
    pub fn delta(path: impl Into<String>, value: Value, source: impl Into<String>) -> Self {
        Self::Delta {
            path: path.into(),
            value,
            source: source.into(),
            timestamp: now_millis(),
        }
    }

    /// Build an outbound message event stamped with the current time.
    pub fn outbound(channel: impl Into<String>, payload: impl Into<String>) -> Self {
        Self::Outbound {
            channel: channel.into(),
            payload: payload.into(),
            timestamp: now_millis(),
        }
    }

    /// Get the event type name.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Delta { .. } => "Delta",
            Self::Meta { .. } => "Meta",
            Self::Outbound { .. } => "Outbound",
            Self::Status { .. } => "Status",
        }
    }

    /// Path the event refers to, if any.
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::Delta { path, .. } | Self::Meta { path, .. } => Some(path),
            _ => None,
        }
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            Self::Delta { timestamp, .. }
            | Self::Meta { timestamp, .. }
            | Self::Outbound { timestamp, .. }
            | Self::Status { timestamp, .. } => *timestamp,
        }
    }

    pub fn is_delta(&self) -> bool {
        matches!(self, Self::Delta { .. })
    }

    pub fn is_meta(&self) -> bool {
        matches!(self, Self::Meta { .. })
    }

    pub fn is_outbound(&self) -> bool {
        matches!(self, Self::Outbound { .. })
    }

    pub fn is_status(&self) -> bool {
        matches!(self, Self::Status { .. })
    }
}

/// Metadata attached to every published event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Unique event ID
    pub event_id: String,
    /// Component that published the event
    pub source: String,
    /// Publish time in milliseconds since the epoch
    pub timestamp: i64,
}

impl EventMetadata {
    /// Create new event metadata.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            source: source.into(),
            timestamp: now_millis(),
        }
    }
}

/// Current time in milliseconds since the epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
