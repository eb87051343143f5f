//! sni-override: host-override interception for outbound HTTPS
//!
//! This library opens outbound connections on behalf of an HTTP client and
//! lets an operator redirect chosen hostnames to fixed IP addresses. The
//! TCP connection goes to the override address, while TLS Server Name
//! Indication, certificate verification and the `Host` header keep using
//! the original hostname, so the server still presents and the client still
//! accepts the certificate issued for that name.
//!
//! # Main Features
//!
//! - Exact and `*.suffix` wildcard overrides, changeable at runtime
//! - Lock-free rule lookups with snapshot consistency
//! - Fail-closed handshakes with optional certificate fingerprint pinning
//! - `Host` header and request URI rewriting
//!
//! # Example
//!
//! ```no_run
//! use sni_override::{ConnectionRequest, InterceptingTransport, Result};
//! use sni_override::config::TransportConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let transport = InterceptingTransport::from_config(&TransportConfig::default())?;
//!     transport.add_override("example.org", "122.228.95.175", None)?;
//!
//!     let request = ConnectionRequest::tls("example.org", 443)?;
//!     let connection = transport.open_connection(&request).await?;
//!
//!     // TCP peer is the override address; SNI was example.org
//!     assert_eq!(connection.dialed_address().ip().to_string(), "122.228.95.175");
//!     Ok(())
//! }
//! ```

// Public modules
pub mod common;
pub mod config;
pub mod rules;
pub mod tls;
pub mod transport;

// Re-export commonly used structures and functions for convenience
pub use common::{init_logger, ConnectError, OverrideError, Phase, Result, TlsError};
pub use config::{ConfigError, TransportConfig};
pub use rules::{OverrideRule, RuleTable};
pub use tls::{Fingerprint, TlsHandshakeConfig, TlsHandshaker, TlsInfo, TlsSettings};
pub use transport::{
    encode_request_head, rewrite_headers, Connect, ConnectionRequest, Dialer, EstablishedConnection,
    InterceptingTransport, RequestRewriter, Scheme, SharedConnector,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
