//! Switch bank bridge between the data tree and NMEA 2000.
//!
//! ## Features
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `http` | ✅ | Remote metadata publication over HTTP |
//!
//! ## Architecture
//!
//! - **Normalizer** (`config`): raw plugin options to a validated [`Configuration`]
//! - **Digest builder** (`metadata`): configuration to a path-keyed [`MetadataDigest`]
//! - **Publisher** (`publisher`): local commit, or remote HTTP delivery with retry and local fallback
//! - **State cache** (`state`): per relay bank channel state, fed by live deltas
//! - **Control handler** (`control`): single-channel put request to a full-bank PGN 127502 message
//! - **Service** (`service`): start/stop lifecycle wiring the above to a [`DataTree`](switchbank_core::DataTree)

pub mod config;
pub mod control;
pub mod error;
pub mod metadata;
pub mod protocol;
pub mod publisher;
pub mod service;
pub mod state;

pub use config::{
    normalize, normalize_into, BankType, Channel, ConfigIssue, Configuration, Normalized, PublishMethod,
    PublisherConfig, Switchbank,
};
pub use control::{ControlHandler, ControlOutcome, RequestSource, SwitchRequest};
pub use error::{DeviceError, RequestError, Result};
pub use metadata::{build_digest, MetadataDigest, MetadataEntry};
pub use protocol::{EncoderRegistry, N2kMessage, Pgn127502Encoder, SwitchbankEncoder};
pub use publisher::{
    AttemptState, LocalSink, MetadataPublisher, MetadataSink, PublishAttempt, PublishOutcome,
    RemoteSink,
};
pub use service::{ServiceState, SwitchbankService};
pub use state::{ChannelStateCache, SharedStateCache};

#[cfg(feature = "http")]
pub use publisher::remote::HttpTransport;
pub use publisher::remote::{Credentials, RemoteTransport};
