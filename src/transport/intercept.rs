//! Intercepting transport
//!
//! The entry point protocol layers call to open an outbound connection.
//! For a hostname with an override the TCP connection goes to the override
//! address, while the TLS handshake still presents and verifies the original
//! hostname. A failed override dial is reported as is; the transport never
//! falls back to dialing the hostname directly.

use std::net::SocketAddr;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use log::{debug, info, warn};

use super::connection::EstablishedConnection;
use super::dialer::Dialer;
use super::request::{ConnectionRequest, Scheme};
use crate::common::Result;
use crate::config::{ConfigError, OverrideEntry, TransportConfig};
use crate::rules::RuleTable;
use crate::tls::{TlsHandshakeConfig, TlsHandshaker, TlsSettings};

/// Opens outbound connections on behalf of a protocol layer
///
/// Implementations are passed explicitly to whatever needs them; nothing in
/// this crate installs a global connector.
pub trait Connect: Send + Sync {
    /// Establish a connection for `request`
    fn connect<'a>(&'a self, request: &'a ConnectionRequest) -> BoxFuture<'a, Result<EstablishedConnection>>;
}

/// Shared, type-erased connector
pub type SharedConnector = Arc<dyn Connect>;

/// Connection factory applying host overrides
#[derive(Debug, Clone)]
pub struct InterceptingTransport {
    rules: Arc<RuleTable>,
    dialer: Dialer,
    tls: TlsHandshaker,
}

impl InterceptingTransport {
    /// Create a transport over an existing rule table
    ///
    /// The table may be shared with other transports or mutated at runtime.
    pub fn new(rules: Arc<RuleTable>, dialer: Dialer, tls: TlsHandshaker) -> Self {
        Self { rules, dialer, tls }
    }

    /// Create a transport from configuration, pre-loading its overrides
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid or the TLS context cannot be
    /// built.
    pub fn from_config(config: &TransportConfig) -> Result<Self> {
        config.validate()?;

        let tls = TlsHandshaker::new(&TlsSettings::from_config(config))?;
        let rules = Arc::new(RuleTable::new());
        for rule in config.override_rules()? {
            rules.upsert(rule);
        }

        Ok(Self::new(rules, Dialer::from_config(config), tls))
    }

    /// Rule table consulted by this transport
    pub fn rules(&self) -> &Arc<RuleTable> {
        &self.rules
    }

    /// Redirect connections for `hostname` to `address`
    ///
    /// `address` is an IP literal, optionally with a port (`10.0.0.1:8443`,
    /// `[::1]:8443`). A port given both in `address` and in `port` must
    /// agree. `hostname` may be a `*.suffix` wildcard.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidAddress` or `ConfigError::InvalidHostname`
    /// for malformed input; the table is left unchanged.
    pub fn add_override(&self, hostname: &str, address: &str, port: Option<u16>) -> std::result::Result<(), ConfigError> {
        let rule = OverrideEntry {
            host: hostname.to_string(),
            address: address.to_string(),
            port,
        }
        .to_rule()?;

        self.rules.upsert(rule);
        Ok(())
    }

    /// Stop redirecting `hostname`
    ///
    /// # Returns
    ///
    /// Whether an override was registered
    pub fn remove_override(&self, hostname: &str) -> bool {
        self.rules.remove(hostname)
    }

    /// Open a connection for `request`
    ///
    /// The destination is the request's address hint if set, else the
    /// matching override, else the hostname itself. For TLS requests the
    /// handshake uses `request.hostname()` for SNI and verification.
    ///
    /// Dropping the returned future before it completes closes any socket
    /// it has opened.
    pub async fn open_connection(&self, request: &ConnectionRequest) -> Result<EstablishedConnection> {
        let hostname = request.hostname();
        let port = request.port();

        if request.scheme() == Scheme::Tls
            && request.insecure_skip_chain_verification()
            && request.pinned_fingerprint().is_none()
        {
            warn!("Refusing to skip chain verification for {} without a pinned fingerprint", hostname);
            return Err(ConfigError::InsecureWithoutPin.into());
        }

        let destination: Option<SocketAddr> = match request.address_hint() {
            Some(hint) => {
                debug!("Using address hint {} for {}", hint, hostname);
                Some(hint)
            }
            None => self.rules.resolve(hostname).map(|rule| {
                debug!("Override {} applies to {}", rule, hostname);
                rule.socket_addr(port)
            }),
        };
        let overridden = destination.is_some();

        let (stream, dialed) = self.dialer.connect(hostname, port, destination).await?;
        if overridden {
            info!("Connected to {} for {} (override)", dialed, hostname);
        } else {
            debug!("Connected to {} for {}", dialed, hostname);
        }

        match request.scheme() {
            Scheme::Plain => Ok(EstablishedConnection::plain(stream, hostname, port, dialed, overridden)),
            Scheme::Tls => {
                let config = TlsHandshakeConfig::new(hostname, dialed)
                    .with_pinned_fingerprint(request.pinned_fingerprint())
                    .with_insecure_skip_chain_verification(request.insecure_skip_chain_verification());

                let (tls, info) = self.tls.handshake(stream, &config).await?;
                Ok(EstablishedConnection::tls(tls, info, hostname, port, dialed, overridden))
            }
        }
    }
}

impl Connect for InterceptingTransport {
    fn connect<'a>(&'a self, request: &'a ConnectionRequest) -> BoxFuture<'a, Result<EstablishedConnection>> {
        self.open_connection(request).boxed()
    }
}
