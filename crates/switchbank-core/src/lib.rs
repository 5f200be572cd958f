//! Core types for the switchbank bridge.
//!
//! This crate models the host data tree the bridge plugs into: a broadcast
//! event bus carrying value deltas, metadata, outbound field-bus messages and
//! status diagnostics, plus the put-handler registry through which write
//! requests reach a plugin.

pub mod config;
pub mod error;
pub mod event;
pub mod eventbus;
pub mod macros;
pub mod status;
pub mod tree;

pub use error::{Error, Result};
pub use event::{EventMetadata, TreeEvent};
pub use eventbus::{
    DEFAULT_CHANNEL_CAPACITY, EventBus, EventBusReceiver, FilterBuilder, FilteredReceiver,
};
pub use status::{Diagnostic, Severity, StatusBoard};
pub use tree::{DataTree, PathReceiver, PutHandler, PutResponse, PutState};

