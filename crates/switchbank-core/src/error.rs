//! Unified error type for the core crate.

/// Errors raised by the host data tree.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A put handler owned by another source is registered for the path.
    #[error("Put handler already registered: {0}")]
    HandlerConflict(String),
}

/// Result type alias using the core error.
pub type Result<T> = std::result::Result<T, Error>;
