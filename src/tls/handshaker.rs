//! TLS client handshake
//!
//! The handshaker wraps an already connected socket in TLS. Whatever address
//! the socket was dialed to, the server name sent in SNI and the name the
//! certificate is verified against are the hostname the caller asked for.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, info, warn};
use openssl::ssl::{SslConnector, SslMethod, SslVerifyMode, SslVersion};
use openssl::x509::store::X509StoreBuilder;
use openssl::x509::X509;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;
use tokio_openssl::SslStream;

use super::cert::{load_certificates, Fingerprint};
use super::verify::{classify, pin_callback, PinOutcome};
use crate::common::{Result, TlsError};
use crate::config::{ConfigError, TlsVersion, TransportConfig};
use crate::rules::normalize_hostname;

/// Trust and protocol settings shared by every handshake of a transport
#[derive(Clone)]
pub struct TlsSettings {
    /// Minimum protocol version offered
    pub min_version: TlsVersion,
    /// Trust the platform root store
    pub use_system_roots: bool,
    /// PEM bundle of additional trusted roots
    pub ca_file: Option<PathBuf>,
    /// Additional trusted roots held in memory
    pub root_certificates: Vec<X509>,
    /// ALPN protocols, in preference order
    pub alpn: Vec<String>,
    /// Upper bound for a single handshake
    pub handshake_timeout: Duration,
}

impl Default for TlsSettings {
    fn default() -> Self {
        Self::from_config(&TransportConfig::default())
    }
}

impl TlsSettings {
    /// Settings described by a transport configuration
    pub fn from_config(config: &TransportConfig) -> Self {
        Self {
            min_version: config.min_tls_version,
            use_system_roots: config.use_system_roots,
            ca_file: config.ca_file.clone(),
            root_certificates: Vec::new(),
            alpn: config.alpn.clone(),
            handshake_timeout: config.handshake_timeout(),
        }
    }

    /// Trust an additional root certificate
    pub fn add_root_certificate(mut self, cert: X509) -> Self {
        self.root_certificates.push(cert);
        self
    }
}

impl fmt::Debug for TlsSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsSettings")
            .field("min_version", &self.min_version)
            .field("use_system_roots", &self.use_system_roots)
            .field("ca_file", &self.ca_file)
            .field("root_certificates", &self.root_certificates.len())
            .field("alpn", &self.alpn)
            .field("handshake_timeout", &self.handshake_timeout)
            .finish()
    }
}

/// Per-connection handshake parameters
///
/// Built from the original hostname only, so the server name and the
/// verification host cannot be set to the dialed address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsHandshakeConfig {
    server_name_indication: String,
    certificate_verification_host: String,
    dialed_address: SocketAddr,
    pinned_fingerprint: Option<Fingerprint>,
    insecure_skip_chain_verification: bool,
}

impl TlsHandshakeConfig {
    /// Handshake parameters for `original_hostname` reached at `dialed_address`
    pub fn new(original_hostname: &str, dialed_address: SocketAddr) -> Self {
        let host = normalize_hostname(original_hostname);
        Self {
            server_name_indication: host.clone(),
            certificate_verification_host: host,
            dialed_address,
            pinned_fingerprint: None,
            insecure_skip_chain_verification: false,
        }
    }

    /// Require the leaf certificate to have this fingerprint
    pub fn with_pinned_fingerprint(mut self, fingerprint: Option<Fingerprint>) -> Self {
        self.pinned_fingerprint = fingerprint;
        self
    }

    /// Ignore chain-trust errors; only honoured together with a pin
    pub fn with_insecure_skip_chain_verification(mut self, skip: bool) -> Self {
        self.insecure_skip_chain_verification = skip;
        self
    }

    pub fn server_name_indication(&self) -> &str {
        &self.server_name_indication
    }

    pub fn certificate_verification_host(&self) -> &str {
        &self.certificate_verification_host
    }

    pub fn dialed_address(&self) -> SocketAddr {
        self.dialed_address
    }

    pub fn pinned_fingerprint(&self) -> Option<Fingerprint> {
        self.pinned_fingerprint
    }

    pub fn insecure_skip_chain_verification(&self) -> bool {
        self.insecure_skip_chain_verification
    }
}

/// Details of a completed handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsInfo {
    /// Server name sent in SNI (and verified)
    pub server_name: String,
    /// Negotiated protocol version, e.g. `TLSv1.3`
    pub version: String,
    /// Negotiated ALPN protocol
    pub alpn: Option<String>,
    /// Fingerprint of the peer's leaf certificate
    pub peer_fingerprint: Option<Fingerprint>,
}

impl TlsInfo {
    fn from_stream<S: AsyncRead + AsyncWrite>(stream: &SslStream<S>, server_name: &str) -> Self {
        let ssl = stream.ssl();
        Self {
            server_name: server_name.to_string(),
            version: ssl.version_str().to_string(),
            alpn: ssl
                .selected_alpn_protocol()
                .map(|p| String::from_utf8_lossy(p).into_owned()),
            peer_fingerprint: ssl
                .peer_certificate()
                .and_then(|cert| Fingerprint::of(&cert).ok()),
        }
    }
}

/// TLS client over an arbitrary connected stream
#[derive(Clone)]
pub struct TlsHandshaker {
    connector: SslConnector,
    handshake_timeout: Duration,
}

impl TlsHandshaker {
    /// Build the OpenSSL client context
    ///
    /// # Errors
    ///
    /// Fails if the CA file cannot be loaded or OpenSSL rejects a setting.
    pub fn new(settings: &TlsSettings) -> Result<Self> {
        let mut builder = SslConnector::builder(SslMethod::tls_client()).map_err(TlsError::from)?;

        if !settings.use_system_roots {
            debug!("System roots disabled");
            let store = X509StoreBuilder::new().map_err(TlsError::from)?;
            builder.set_cert_store(store.build());
        }

        let mut roots = settings.root_certificates.clone();
        if let Some(ref ca_file) = settings.ca_file {
            roots.extend(load_certificates(ca_file)?);
        }
        for cert in roots {
            builder.cert_store_mut().add_cert(cert).map_err(TlsError::from)?;
        }

        let min_version = match settings.min_version {
            TlsVersion::Tls12 => SslVersion::TLS1_2,
            TlsVersion::Tls13 => SslVersion::TLS1_3,
        };
        builder
            .set_min_proto_version(Some(min_version))
            .map_err(TlsError::from)?;

        if !settings.alpn.is_empty() {
            let wire = alpn_wire_format(&settings.alpn)?;
            builder.set_alpn_protos(&wire).map_err(TlsError::from)?;
        }

        info!(
            "TLS client ready (min version {}, system roots {}, ALPN [{}])",
            settings.min_version,
            settings.use_system_roots,
            settings.alpn.join(",")
        );

        Ok(Self {
            connector: builder.build(),
            handshake_timeout: settings.handshake_timeout,
        })
    }

    /// Handshake timeout applied to every session
    pub fn handshake_timeout(&self) -> Duration {
        self.handshake_timeout
    }

    /// Run a client handshake over `stream`
    ///
    /// The stream is consumed; on any failure it is dropped, which closes
    /// the underlying socket.
    pub async fn handshake<S>(
        &self,
        stream: S,
        config: &TlsHandshakeConfig,
    ) -> std::result::Result<(SslStream<S>, TlsInfo), TlsError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let sni = config.server_name_indication();
        let verify_host = config.certificate_verification_host();
        let pin = config.pinned_fingerprint();
        let skip_chain = config.insecure_skip_chain_verification() && pin.is_some();

        if config.insecure_skip_chain_verification() && pin.is_none() {
            warn!(
                "Ignoring insecure chain skip for {}: no fingerprint pinned",
                verify_host
            );
        }
        if skip_chain {
            warn!(
                "Certificate chain verification disabled for {}; relying on pinned fingerprint",
                verify_host
            );
        }

        let mut session = self.connector.configure()?;
        session.set_use_server_name_indication(false);
        session.set_verify_hostname(true);
        let mut ssl = session.into_ssl(verify_host)?;

        if sni.parse::<IpAddr>().is_err() {
            ssl.set_hostname(sni)?;
        }

        let outcome = pin.map(|_| Arc::new(Mutex::new(PinOutcome::default())));
        if let Some(ref outcome) = outcome {
            ssl.set_verify_callback(
                SslVerifyMode::PEER,
                pin_callback(pin, skip_chain, Arc::clone(outcome)),
            );
        }

        debug!(
            "TLS handshake with {} (SNI {}) via {}",
            verify_host,
            sni,
            config.dialed_address()
        );

        let mut tls = SslStream::new(ssl, stream)?;
        match timeout(self.handshake_timeout, Pin::new(&mut tls).connect()).await {
            Ok(Ok(())) => {
                let info = TlsInfo::from_stream(&tls, sni);
                debug!(
                    "TLS established with {} ({}, ALPN {:?})",
                    verify_host, info.version, info.alpn
                );
                Ok((tls, info))
            }
            Ok(Err(e)) => {
                let err = classify(
                    &e,
                    tls.ssl(),
                    verify_host,
                    config.dialed_address(),
                    pin,
                    outcome.as_ref(),
                );
                warn!("{}", err);
                Err(err)
            }
            Err(_) => Err(TlsError::Timeout {
                host: verify_host.to_string(),
                timeout: self.handshake_timeout,
            }),
        }
    }
}

impl fmt::Debug for TlsHandshaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsHandshaker")
            .field("handshake_timeout", &self.handshake_timeout)
            .finish()
    }
}

/// Length-prefixed ALPN list as sent on the wire
fn alpn_wire_format(protocols: &[String]) -> std::result::Result<Vec<u8>, ConfigError> {
    let mut wire = Vec::new();
    for protocol in protocols {
        let len = u8::try_from(protocol.len())
            .ok()
            .filter(|len| *len > 0)
            .ok_or_else(|| ConfigError::InvalidValue {
                name: "alpn".to_string(),
                reason: format!("ALPN protocol '{}' must be 1-255 bytes", protocol),
            })?;
        wire.push(len);
        wire.extend_from_slice(protocol.as_bytes());
    }
    Ok(wire)
}
