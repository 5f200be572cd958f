//! In-process data tree.
//!
//! The tree holds the latest value and committed metadata of every path,
//! routes put (write) requests to the handler registered for their path and
//! carries outbound messages and status reports over its [`EventBus`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::config::defaults;
use crate::error::{Error, Result};
use crate::event::{now_millis, EventMetadata, TreeEvent};
use crate::eventbus::EventBus;
use crate::status::StatusBoard;

/// State reported back to the originator of a put request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PutState {
    Completed,
    Pending,
}

/// Result of a put request as seen by its originator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutResponse {
    pub state: PutState,
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl PutResponse {
    /// `{state: COMPLETED, statusCode: 200}`.
    pub fn completed() -> Self {
        Self {
            state: PutState::Completed,
            status_code: 200,
            message: None,
        }
    }

    /// No handler is registered for the path.
    pub fn unhandled(path: &str) -> Self {
        Self {
            state: PutState::Completed,
            status_code: 405,
            message: Some(format!("no put handler for '{}'", path)),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// Handler for put requests on a path.
///
/// Handlers run to completion on the caller's task; they must not block.
pub trait PutHandler: Send + Sync {
    fn handle_put(&self, context: &str, path: &str, value: &Value) -> PutResponse;
}

impl<F> PutHandler for F
where
    F: Fn(&str, &str, &Value) -> PutResponse + Send + Sync,
{
    fn handle_put(&self, context: &str, path: &str, value: &Value) -> PutResponse {
        self(context, path, value)
    }
}

struct Registration {
    source: String,
    handler: Arc<dyn PutHandler>,
}

struct TreeInner {
    bus: EventBus,
    status: StatusBoard,
    values: RwLock<HashMap<String, Value>>,
    metas: RwLock<BTreeMap<String, Value>>,
    handlers: RwLock<HashMap<(String, String), Registration>>,
}

/// Shared handle to the in-process data tree.
#[derive(Clone)]
pub struct DataTree {
    inner: Arc<TreeInner>,
}

impl DataTree {
    /// Create a tree with its own event bus.
    pub fn new() -> Self {
        Self::with_bus(EventBus::with_name("tree"))
    }

    /// Create a tree on top of an existing bus.
    pub fn with_bus(bus: EventBus) -> Self {
        let status = StatusBoard::with_bus(defaults::PLUGIN_ID, bus.clone());
        Self {
            inner: Arc::new(TreeInner {
                bus,
                status,
                values: RwLock::new(HashMap::new()),
                metas: RwLock::new(BTreeMap::new()),
                handlers: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    /// Status side-channel of the plugin attached to this tree.
    pub fn status(&self) -> &StatusBoard {
        &self.inner.status
    }

    // ========== Values ==========

    /// Record a new value at `path` and publish it as a delta.
    pub fn handle_delta(&self, path: &str, value: Value, source: &str) {
        self.inner
            .values
            .write()
            .insert(path.to_string(), value.clone());
        self.inner
            .bus
            .publish_with_source(TreeEvent::delta(path, value, source), source);
    }

    /// Latest value at `path`.
    pub fn value(&self, path: &str) -> Option<Value> {
        self.inner.values.read().get(path).cloned()
    }

    /// Subscribe to the value stream of a set of paths.
    ///
    /// The stream suppresses consecutive identical values per path.
    pub fn subscribe_paths<I, S>(&self, paths: I) -> PathReceiver
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        PathReceiver {
            rx: self.inner.bus.subscribe().into_inner(),
            paths: paths.into_iter().map(Into::into).collect(),
            last: HashMap::new(),
        }
    }

    // ========== Put handlers ==========

    /// Route put requests for `(context, path)` to `handler`.
    ///
    /// A source may replace its own registration; claiming a path owned by
    /// another source fails.
    pub fn register_put_handler(
        &self,
        context: &str,
        path: &str,
        handler: Arc<dyn PutHandler>,
        source: &str,
    ) -> Result<()> {
        let key = (context.to_string(), path.to_string());
        let mut handlers = self.inner.handlers.write();
        if let Some(existing) = handlers.get(&key) {
            if existing.source != source {
                return Err(Error::HandlerConflict(format!(
                    "{} (owned by {})",
                    path, existing.source
                )));
            }
        }
        handlers.insert(
            key,
            Registration {
                source: source.to_string(),
                handler,
            },
        );
        debug!(context, path, source, "put handler registered");
        Ok(())
    }

    /// Drop every put handler registered by `source`.
    pub fn unregister_put_handlers(&self, source: &str) -> usize {
        let mut handlers = self.inner.handlers.write();
        let before = handlers.len();
        handlers.retain(|_, reg| reg.source != source);
        before - handlers.len()
    }

    pub fn has_put_handler(&self, context: &str, path: &str) -> bool {
        self.inner
            .handlers
            .read()
            .contains_key(&(context.to_string(), path.to_string()))
    }

    pub fn put_handler_count(&self) -> usize {
        self.inner.handlers.read().len()
    }

    /// Deliver a put request to the handler registered for its path.
    pub fn put(&self, context: &str, path: &str, value: &Value) -> PutResponse {
        let handler = self
            .inner
            .handlers
            .read()
            .get(&(context.to_string(), path.to_string()))
            .map(|reg| Arc::clone(&reg.handler));

        match handler {
            Some(handler) => handler.handle_put(context, path, value),
            None => {
                warn!(context, path, "put request has no handler");
                PutResponse::unhandled(path)
            }
        }
    }

    // ========== Metadata ==========

    /// Commit a batch of metadata in one step.
    pub fn commit_metas<I>(&self, metas: I, source: &str) -> usize
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let committed: Vec<(String, Value)> = metas.into_iter().collect();
        {
            let mut store = self.inner.metas.write();
            for (path, meta) in &committed {
                store.insert(path.clone(), meta.clone());
            }
        }

        let timestamp = now_millis();
        for (path, meta) in &committed {
            self.inner.bus.publish_with_source(
                TreeEvent::Meta {
                    path: path.clone(),
                    meta: meta.clone(),
                    timestamp,
                },
                source,
            );
        }
        debug!(count = committed.len(), source, "metadata committed");
        committed.len()
    }

    /// Committed metadata at `path`.
    pub fn meta(&self, path: &str) -> Option<Value> {
        self.inner.metas.read().get(path).cloned()
    }

    /// Snapshot of all committed metadata.
    pub fn metas(&self) -> BTreeMap<String, Value> {
        self.inner.metas.read().clone()
    }

    // ========== Outbound ==========

    /// Emit a message on an outbound transmit channel.
    pub fn emit(&self, channel: &str, payload: impl Into<String>, source: &str) -> bool {
        self.inner
            .bus
            .publish_with_source(TreeEvent::outbound(channel, payload), source)
    }
}

impl Default for DataTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Value stream for a fixed set of paths.
pub struct PathReceiver {
    rx: broadcast::Receiver<(TreeEvent, EventMetadata)>,
    paths: HashSet<String>,
    last: HashMap<String, Value>,
}

impl PathReceiver {
    /// Receive the next changed `(path, value)`.
    ///
    /// Returns `None` once the bus is closed.
    pub async fn recv(&mut self) -> Option<(String, Value)> {
        loop {
            match self.rx.recv().await {
                Ok((TreeEvent::Delta { path, value, .. }, _)) => {
                    if let Some(update) = self.accept(path, value) {
                        return Some(update);
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "path subscription lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Try to receive a changed value without waiting.
    pub fn try_recv(&mut self) -> Option<(String, Value)> {
        while let Ok((event, _)) = self.rx.try_recv() {
            if let TreeEvent::Delta { path, value, .. } = event {
                if let Some(update) = self.accept(path, value) {
                    return Some(update);
                }
            }
        }
        None
    }

    fn accept(&mut self, path: String, value: Value) -> Option<(String, Value)> {
        if !self.paths.contains(&path) {
            return None;
        }
        if self.last.get(&path) == Some(&value) {
            return None;
        }
        self.last.insert(path.clone(), value.clone());
        Some((path, value))
    }

    pub fn paths(&self) -> &HashSet<String> {
        &self.paths
    }
}
