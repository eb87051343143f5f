//! Default configuration values
//!
//! Single source of truth for defaults, shared by serde and `Default`.

use super::{OverrideEntry, TlsVersion};

/// Environment variable prefix for all configuration options
pub const ENV_PREFIX: &str = "SNI_OVERRIDE";

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "sni-override.json";

/// Default log level as string
pub const LOG_LEVEL_STR: &str = "info";

/// Default connect timeout in milliseconds
pub fn connect_timeout_ms() -> u64 {
    10_000
}

/// Default TLS handshake timeout in milliseconds
pub fn handshake_timeout_ms() -> u64 {
    10_000
}

/// `TCP_NODELAY` on by default; request heads are small
pub fn tcp_nodelay() -> bool {
    true
}

/// No TCP keepalive unless asked for
pub fn tcp_keepalive_secs() -> Option<u64> {
    None
}

/// Minimum TLS protocol version
pub fn min_tls_version() -> TlsVersion {
    TlsVersion::Tls12
}

/// Trust the platform root store
pub fn use_system_roots() -> bool {
    true
}

/// No ALPN offered
pub fn alpn() -> Vec<String> {
    Vec::new()
}

/// Default log level
pub fn log_level() -> String {
    LOG_LEVEL_STR.to_string()
}

/// No overrides
pub fn overrides() -> Vec<OverrideEntry> {
    Vec::new()
}
