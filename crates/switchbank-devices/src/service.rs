//! Switchbank service lifecycle.
//!
//! `start` wires a configuration into a [`DataTree`]: metadata publication,
//! the channel state observer and one put handler per relay channel path.
//! `stop` releases all of it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use switchbank_core::config::defaults;
use switchbank_core::{enum_from_str, DataTree, PutHandler};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::{normalize_into, Configuration};
use crate::control::ControlHandler;
use crate::error::{DeviceError, Result};
use crate::metadata::build_digest;
use crate::protocol::EncoderRegistry;
use crate::publisher::{MetadataPublisher, PublishOutcome, RemoteTransport};
use crate::state::{spawn_observer, ChannelStateCache, SharedStateCache};

/// Lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Stopped,
    Running,
    /// The last start was refused
    Degraded,
}

enum_from_str!(ServiceState, [Stopped => "stopped", Running => "running", Degraded => "degraded"]);

struct ServiceInner {
    state: ServiceState,
    configuration: Option<Configuration>,
    cache: Option<SharedStateCache>,
    tasks: Vec<JoinHandle<()>>,
}

impl ServiceInner {
    fn stopped() -> Self {
        Self {
            state: ServiceState::Stopped,
            configuration: None,
            cache: None,
            tasks: Vec::new(),
        }
    }
}

/// The switch bank bridge attached to a data tree.
pub struct SwitchbankService {
    tree: DataTree,
    encoders: EncoderRegistry,
    transport: Option<Arc<dyn RemoteTransport>>,
    last_publish: Arc<Mutex<Option<PublishOutcome>>>,
    inner: Mutex<ServiceInner>,
}

impl SwitchbankService {
    pub fn new(tree: DataTree) -> Self {
        Self {
            tree,
            encoders: EncoderRegistry::default(),
            transport: None,
            last_publish: Arc::new(Mutex::new(None)),
            inner: Mutex::new(ServiceInner::stopped()),
        }
    }

    pub fn with_encoders(mut self, encoders: EncoderRegistry) -> Self {
        self.encoders = encoders;
        self
    }

    /// Use `transport` for remote publication instead of HTTP.
    pub fn with_transport(mut self, transport: Arc<dyn RemoteTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn tree(&self) -> &DataTree {
        &self.tree
    }

    pub fn state(&self) -> ServiceState {
        self.inner.lock().state
    }

    pub fn configuration(&self) -> Option<Configuration> {
        self.inner.lock().configuration.clone()
    }

    pub fn cache(&self) -> Option<SharedStateCache> {
        self.inner.lock().cache.clone()
    }

    /// Outcome of the most recent metadata publication, once finished.
    pub fn last_publish(&self) -> Option<PublishOutcome> {
        self.last_publish.lock().clone()
    }

    /// Start from raw plugin options. A running service is stopped first.
    pub async fn start(&self, options: &Value) -> Result<()> {
        if self.state() == ServiceState::Running {
            self.stop();
        }
        let status = self.tree.status();

        let mut issues = Vec::new();
        let loaded = normalize_into(options, &mut issues);
        for issue in &issues {
            status.warning(issue.to_string());
        }
        let configuration = match loaded {
            Ok(configuration) => configuration,
            Err(e) => {
                status.error(format!("stopped ({})", e));
                self.inner.lock().state = ServiceState::Degraded;
                return Err(e);
            }
        };
        debug!(configuration = ?configuration, "using configuration");

        status.notice(format!(
            "operating {} switch and {} relay switch banks",
            configuration.switch_count(),
            configuration.relay_count()
        ));

        let mut tasks = Vec::new();

        // Metadata
        let digest = build_digest(&configuration);
        let publisher = self.publisher_for(&configuration);
        *self.last_publish.lock() = None;
        if publisher.is_remote() {
            let tree = self.tree.clone();
            let last_publish = Arc::clone(&self.last_publish);
            tasks.push(tokio::spawn(async move {
                let outcome = publisher.publish(&digest).await;
                report_publish(&tree, &outcome);
                *last_publish.lock() = Some(outcome);
            }));
        } else {
            let outcome = publisher.publish(&digest).await;
            report_publish(&self.tree, &outcome);
            *self.last_publish.lock() = Some(outcome);
        }

        // Channel state
        let cache = ChannelStateCache::from_config(&configuration).into_shared();
        let channels: HashMap<String, (u8, u8)> = configuration
            .relay_banks()
            .flat_map(|bank| {
                bank.channels
                    .iter()
                    .map(move |c| (c.path.clone(), (bank.instance, c.index)))
            })
            .collect();
        let rx = self.tree.subscribe_paths(channels.keys().cloned());
        tasks.push(spawn_observer(Arc::clone(&cache), rx, channels));

        // Put handlers
        let handler: Arc<dyn PutHandler> = Arc::new(ControlHandler::new(
            self.tree.clone(),
            Arc::clone(&cache),
            self.encoders.clone(),
            &configuration,
        ));
        let mut registered = 0;
        for bank in configuration.relay_banks() {
            if !self.encoders.supports(bank.pgn) {
                status.warning(format!(
                    "switchbank {} uses unsupported PGN {}, not accepting put requests",
                    bank.instance, bank.pgn
                ));
                continue;
            }
            for channel in &bank.channels {
                debug!(path = %channel.path, "installing put handler");
                match self.tree.register_put_handler(
                    defaults::CONTEXT,
                    &channel.path,
                    Arc::clone(&handler),
                    defaults::PLUGIN_ID,
                ) {
                    Ok(()) => registered += 1,
                    Err(e) => status.error(e.to_string()),
                }
            }
        }
        info!(handlers = registered, "switchbank service started");

        let mut inner = self.inner.lock();
        inner.state = ServiceState::Running;
        inner.configuration = Some(configuration);
        inner.cache = Some(cache);
        inner.tasks = tasks;
        Ok(())
    }

    /// Release every subscription, handler and in-flight publish cycle.
    pub fn stop(&self) {
        let removed = self.release(&mut self.inner.lock());
        info!(handlers = removed, "switchbank service stopped");
    }

    /// Abort the tasks and drop the handlers registered by `start`.
    fn release(&self, inner: &mut ServiceInner) -> usize {
        for task in inner.tasks.drain(..) {
            task.abort();
        }
        let removed = if inner.state == ServiceState::Running {
            self.tree.unregister_put_handlers(defaults::PLUGIN_ID)
        } else {
            0
        };
        inner.configuration = None;
        inner.cache = None;
        inner.state = ServiceState::Stopped;
        removed
    }

    /// Require a running service.
    pub fn ensure_running(&self) -> Result<()> {
        match self.state() {
            ServiceState::Running => Ok(()),
            state => Err(DeviceError::State(format!("is {}", state))),
        }
    }

    fn publisher_for(&self, configuration: &Configuration) -> MetadataPublisher {
        match (configuration.remote_publisher(), &self.transport) {
            (Some(config), Some(transport)) => {
                MetadataPublisher::remote(self.tree.clone(), config.clone(), Arc::clone(transport))
            }
            _ => MetadataPublisher::from_config(self.tree.clone(), configuration),
        }
    }
}

impl Drop for SwitchbankService {
    fn drop(&mut self) {
        let mut inner = std::mem::replace(self.inner.get_mut(), ServiceInner::stopped());
        let removed = self.release(&mut inner);
        if removed > 0 {
            debug!(handlers = removed, "switchbank service dropped while running");
        }
    }
}

fn report_publish(tree: &DataTree, outcome: &PublishOutcome) {
    match outcome {
        PublishOutcome::Local { committed } => {
            debug!(committed, "metadata committed");
        }
        PublishOutcome::Remote { endpoint, .. } => {
            tree.status()
                .notice(format!("metadata published to '{}'", endpoint));
        }
        PublishOutcome::FallbackLocal { reason, .. } => {
            tree.status().warning(format!("publish failed ({})", reason));
        }
    }
}
