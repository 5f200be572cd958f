//! Status and diagnostic side-channel.
//!
//! Plugins report what they are doing (and what they refused to do) here
//! rather than through return values. Every report is mirrored to `tracing`
//! and, when a bus is attached, published as a [`TreeEvent::Status`].

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::defaults;
use crate::enum_from_str;
use crate::event::{now_millis, TreeEvent};
use crate::eventbus::EventBus;

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Normal operating status
    Notice,
    /// Recoverable problem, processing continued
    Warning,
    /// Request or operation rejected
    Error,
}

enum_from_str!(Severity, [Notice => "notice", Warning => "warning", Error => "error"]);

/// A single status report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    /// Milliseconds since the epoch
    pub timestamp: i64,
}

/// Bounded history of status reports.
#[derive(Clone)]
pub struct StatusBoard {
    source: String,
    history: Arc<Mutex<VecDeque<Diagnostic>>>,
    capacity: usize,
    bus: Option<EventBus>,
}

impl StatusBoard {
    /// Create a detached status board.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            history: Arc::new(Mutex::new(VecDeque::new())),
            capacity: defaults::STATUS_HISTORY,
            bus: None,
        }
    }

    /// Create a status board that also publishes to a bus.
    pub fn with_bus(source: impl Into<String>, bus: EventBus) -> Self {
        Self {
            bus: Some(bus),
            ..Self::new(source)
        }
    }

    /// Limit the number of retained diagnostics.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Report normal operating status.
    pub fn notice(&self, message: impl Into<String>) {
        self.report(Severity::Notice, message.into());
    }

    /// Report a recoverable problem.
    pub fn warning(&self, message: impl Into<String>) {
        self.report(Severity::Warning, message.into());
    }

    /// Report a rejected request or failed operation.
    pub fn error(&self, message: impl Into<String>) {
        self.report(Severity::Error, message.into());
    }

    fn report(&self, severity: Severity, message: String) {
        match severity {
            Severity::Notice => info!(source = %self.source, "{}", message),
            Severity::Warning => warn!(source = %self.source, "{}", message),
            Severity::Error => error!(source = %self.source, "{}", message),
        }

        let diagnostic = Diagnostic {
            severity,
            message,
            timestamp: now_millis(),
        };

        {
            let mut history = self.history.lock();
            if history.len() == self.capacity {
                history.pop_front();
            }
            history.push_back(diagnostic.clone());
        }

        if let Some(bus) = &self.bus {
            bus.publish_with_source(
                TreeEvent::Status {
                    severity: diagnostic.severity,
                    message: diagnostic.message,
                    timestamp: diagnostic.timestamp,
                },
                self.source.clone(),
            );
        }
    }

    /// All retained diagnostics, oldest first.
    pub fn history(&self) -> Vec<Diagnostic> {
        self.history.lock().iter().cloned().collect()
    }

    /// Retained diagnostics of one severity, oldest first.
    pub fn by_severity(&self, severity: Severity) -> Vec<Diagnostic> {
        self.history
            .lock()
            .iter()
            .filter(|d| d.severity == severity)
            .cloned()
            .collect()
    }

    /// Most recent notice, if any.
    pub fn last_status(&self) -> Option<Diagnostic> {
        self.last_of(Severity::Notice)
    }

    /// Most recent error, if any.
    pub fn last_error(&self) -> Option<Diagnostic> {
        self.last_of(Severity::Error)
    }

    fn last_of(&self, severity: Severity) -> Option<Diagnostic> {
        self.history
            .lock()
            .iter()
            .rev()
            .find(|d| d.severity == severity)
            .cloned()
    }

    /// Whether any retained diagnostic contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.history.lock().iter().any(|d| d.message.contains(needle))
    }

    pub fn len(&self) -> usize {
        self.history.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.lock().is_empty()
    }
}

impl std::fmt::Debug for StatusBoard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusBoard")
            .field("source", &self.source)
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
