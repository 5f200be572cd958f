//! Metadata publication.
//!
//! Local mode commits the digest to the data tree. Remote mode runs one
//! retrying publish cycle against an HTTP consumer and falls back to a local
//! commit when the cycle fails.

pub mod local;
pub mod remote;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use switchbank_core::DataTree;
use tracing::{info, warn};

use crate::config::{Configuration, PublisherConfig};
use crate::error::Result;
use crate::metadata::MetadataDigest;

pub use local::LocalSink;
pub use remote::{Credentials, RemoteSink, RemoteTransport};

/// Destination for a metadata digest.
#[async_trait]
pub trait MetadataSink: Send + Sync {
    /// Get the sink name.
    fn name(&self) -> &str;

    /// Publish a digest. Returns the number of delivery attempts made.
    async fn publish(&self, digest: &MetadataDigest) -> Result<u32>;
}

/// Progress of one remote publish cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptState {
    Attempting,
    Succeeded { attempts: u32 },
    Exhausted { attempts: u32, last_error: Option<String> },
}

/// Retry budget of one publish cycle.
#[derive(Debug, Clone)]
pub struct PublishAttempt {
    remaining_retries: u32,
    interval: Duration,
    attempts: u32,
    last_error: Option<String>,
    state: AttemptState,
}

/// Shortest interval between attempts.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

impl PublishAttempt {
    /// A zero interval is raised to one millisecond.
    pub fn new(retries: u32, interval: Duration) -> Self {
        Self {
            remaining_retries: retries,
            interval: interval.max(MIN_INTERVAL),
            attempts: 0,
            last_error: None,
            state: AttemptState::Attempting,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn remaining_retries(&self) -> u32 {
        self.remaining_retries
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn state(&self) -> &AttemptState {
        &self.state
    }

    pub fn is_finished(&self) -> bool {
        self.state != AttemptState::Attempting
    }

    /// Spend one retry. Returns `false` once the budget is gone.
    pub fn begin(&mut self) -> bool {
        if self.is_finished() {
            return false;
        }
        if self.remaining_retries == 0 {
            self.exhaust();
            return false;
        }
        self.remaining_retries -= 1;
        self.attempts += 1;
        true
    }

    pub fn succeed(&mut self) {
        self.state = AttemptState::Succeeded {
            attempts: self.attempts,
        };
    }

    /// Record a rejected attempt.
    pub fn reject(&mut self, reason: impl Into<String>) {
        self.last_error = Some(reason.into());
        if self.remaining_retries == 0 {
            self.exhaust();
        }
    }

    /// End the cycle on an unrecoverable error.
    pub fn abort(&mut self, reason: impl Into<String>) {
        self.last_error = Some(reason.into());
        self.exhaust();
    }

    pub fn failure_reason(&self) -> String {
        match &self.last_error {
            Some(e) => format!("tried {} times with no success ({})", self.attempts, e),
            None => format!("tried {} times with no success", self.attempts),
        }
    }

    fn exhaust(&mut self) {
        self.state = AttemptState::Exhausted {
            attempts: self.attempts,
            last_error: self.last_error.clone(),
        };
    }
}

/// How a digest ended up published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Local { committed: usize },
    Remote { endpoint: String, attempts: u32 },
    FallbackLocal { reason: String, committed: usize },
}

/// Chooses between local and remote publication.
pub struct MetadataPublisher {
    local: LocalSink,
    remote: Option<RemoteSink>,
}

impl MetadataPublisher {
    /// Local-only publisher.
    pub fn local(tree: DataTree) -> Self {
        Self {
            local: LocalSink::new(tree),
            remote: None,
        }
    }

    /// Remote publisher with local fallback.
    pub fn remote(tree: DataTree, config: PublisherConfig, transport: Arc<dyn RemoteTransport>) -> Self {
        Self {
            local: LocalSink::new(tree),
            remote: Some(RemoteSink::new(config, transport)),
        }
    }

    /// Pick the mode from a configuration, using the HTTP transport when
    /// remote publication is configured.
    pub fn from_config(tree: DataTree, configuration: &Configuration) -> Self {
        match configuration.remote_publisher() {
            #[cfg(feature = "http")]
            Some(config) => Self::remote(
                tree,
                config.clone(),
                Arc::new(remote::HttpTransport::new()),
            ),
            #[cfg(not(feature = "http"))]
            Some(_) => {
                warn!("remote metadata publication needs the 'http' feature");
                Self::local(tree)
            }
            None => Self::local(tree),
        }
    }

    pub fn is_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// Publish `digest`, falling back to a local commit on remote failure.
    pub async fn publish(&self, digest: &MetadataDigest) -> PublishOutcome {
        let Some(remote) = &self.remote else {
            let committed = self.local.add_metas(digest).commit();
            return PublishOutcome::Local { committed };
        };

        let endpoint = remote.endpoint().unwrap_or_default().to_string();
        match remote.publish(digest).await {
            Ok(attempts) => {
                info!(endpoint = %endpoint, attempts, "metadata published");
                PublishOutcome::Remote { endpoint, attempts }
            }
            Err(e) => {
                warn!(endpoint = %endpoint, error = %e, "metadata publish failed, committing locally");
                let committed = self.local.add_metas(digest).commit();
                PublishOutcome::FallbackLocal {
                    reason: e.to_string(),
                    committed,
                }
            }
        }
    }
}
