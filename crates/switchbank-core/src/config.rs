//! Shared defaults and limits.
//!
//! Every crate in the workspace reads its defaults from here so the plugin
//! options, the service and the binary agree on the same values.

/// Default option values.
pub mod defaults {
    /// Path prefix for every switchbank key.
    pub const ROOT: &str = "electrical.switches.bank.";
    /// Plugin identifier, used as the `$source` of published data.
    pub const PLUGIN_ID: &str = "switchbank";
    /// Context under which put handlers are registered.
    pub const CONTEXT: &str = "vessels.self";
    /// Outbound event carrying field-bus messages.
    pub const OUTBOUND_CHANNEL: &str = "nmea2000out";
    /// PGN used to update a relay module.
    pub const PGN: u32 = 127502;
    /// Staleness threshold advertised in channel metadata (ms).
    pub const METADATA_TIMEOUT_MS: u64 = 10_000;
    /// Metadata publication HTTP method.
    pub const PUBLISH_METHOD: &str = "POST";
    /// Attempts per remote publish cycle.
    pub const PUBLISH_RETRIES: u32 = 3;
    /// Interval between remote publish attempts (ms).
    pub const PUBLISH_INTERVAL_MS: u64 = 10_000;
    /// Base URL of the metadata consumer.
    pub const SERVER: &str = "http://localhost:3000";
    /// Credential exchange path on the metadata consumer.
    pub const AUTH_PATH: &str = "/signalk/v1/auth/login";
    /// Number of diagnostics kept by a status board.
    pub const STATUS_HISTORY: usize = 256;
}

/// Protocol limits.
pub mod limits {
    /// Highest addressable module instance.
    pub const MAX_INSTANCE: u8 = 0xFE;
    /// Highest channel count of a single module.
    pub const MAX_CHANNELS: usize = 28;
}

/// Environment variable names.
pub mod env_vars {
    /// Emit JSON log lines when set to `true`.
    pub const LOG_JSON: &str = "SWITCHBANK_LOG_JSON";
    /// Override the metadata consumer base URL.
    pub const SERVER: &str = "SWITCHBANK_SERVER";

    /// Whether JSON logging was requested.
    pub fn log_json() -> bool {
        std::env::var(LOG_JSON)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(false)
    }

    /// Metadata consumer base URL from the environment, if set.
    pub fn server() -> Option<String> {
        std::env::var(SERVER).ok().filter(|s| !s.trim().is_empty())
    }
}

/// Join a server base URL and a request path with exactly one slash.
pub fn join_url(server: &str, path: &str) -> String {
    let server = server.trim_end_matches('/');
    if path.is_empty() {
        return server.to_string();
    }
    if path.starts_with('/') {
        format!("{}{}", server, path)
    } else {
        format!("{}/{}", server, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url() {
        assert_eq!(
            join_url("http://localhost:3000/", "/signalk/v1/auth/login"),
            "http://localhost:3000/signalk/v1/auth/login"
        );
        assert_eq!(
            join_url("http://localhost:3000", "plugins/meta"),
            "http://localhost:3000/plugins/meta"
        );
        assert_eq!(join_url("http://h/", ""), "http://h");
    }

    #[test]
    fn test_limits() {
        assert_eq!(limits::MAX_INSTANCE, 254);
        assert_eq!(limits::MAX_CHANNELS, 28);
    }
}
