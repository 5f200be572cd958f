//! Error types for the switch bank bridge.

use thiserror::Error;

/// Result type for bridge operations.
pub type Result<T> = std::result::Result<T, DeviceError>;

/// Errors raised while loading, publishing or encoding.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The options cannot produce a usable configuration.
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    /// Metadata publication failed.
    #[error("Publish failed: {0}")]
    Publish(String),

    /// A state vector cannot be encoded.
    #[error("Encode failed: {0}")]
    Encode(String),

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(String),

    /// A put request was rejected.
    #[error(transparent)]
    Request(#[from] RequestError),

    /// The service is not in a state that allows the operation.
    #[error("Service {0}")]
    State(String),
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for DeviceError {
    fn from(e: reqwest::Error) -> Self {
        DeviceError::Http(e.to_string())
    }
}

/// Rejected put request.
///
/// Each variant carries a stable code, see [`RequestError::code`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("put request path is invalid ({0})")]
    InvalidPath(String),

    #[error("put request instance is out of range ({0})")]
    InstanceOutOfRange(i64),

    #[error("put request channel is out of range ({0})")]
    ChannelOutOfRange(i64),

    #[error("put request contains invalid value ({0})")]
    InvalidValue(String),
}

impl RequestError {
    pub fn code(&self) -> &'static str {
        match self {
            RequestError::InvalidPath(_) => "INVALID_PATH",
            RequestError::InstanceOutOfRange(_) => "INSTANCE_OUT_OF_RANGE",
            RequestError::ChannelOutOfRange(_) => "CHANNEL_OUT_OF_RANGE",
            RequestError::InvalidValue(_) => "INVALID_VALUE",
        }
    }
}
