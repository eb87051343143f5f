//! Error handling module
//!
//! This module defines the error taxonomy of the interception layer and the
//! result type alias used throughout the crate. Every failure carries the
//! phase it happened in, so a caller can tell an override misconfiguration
//! (dial) apart from a certificate problem (handshake).

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

pub use crate::config::ConfigError;

/// Failure while establishing the TCP connection
#[derive(Error, Debug)]
pub enum ConnectError {
    /// The connect attempt did not complete within the configured timeout
    #[error("connection to {target} timed out after {timeout:?}")]
    Timeout {
        /// Host (or address) and port we tried to reach
        target: String,
        /// Configured connect timeout
        timeout: Duration,
    },

    /// The peer actively refused the connection
    #[error("connection to {addr} refused")]
    Refused {
        /// Address that refused the connection
        addr: SocketAddr,
    },

    /// The peer could not be reached (no route, reset, other socket error)
    #[error("{addr} unreachable: {source}")]
    Unreachable {
        /// Address we tried to reach
        addr: SocketAddr,
        /// Underlying socket error
        #[source]
        source: io::Error,
    },

    /// Hostname resolution failed or returned no addresses
    #[error("DNS resolution failed for {host}: {reason}")]
    DnsFailure {
        /// Hostname that could not be resolved
        host: String,
        /// Resolver error message
        reason: String,
    },
}

impl ConnectError {
    /// Classify a socket error returned by `connect(2)`
    ///
    /// `timeout` is the dialer's configured budget, reported when the kernel
    /// gives up before we do.
    pub fn from_io(addr: SocketAddr, err: io::Error, timeout: Duration) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => ConnectError::Refused { addr },
            io::ErrorKind::TimedOut => ConnectError::Timeout {
                target: addr.to_string(),
                timeout,
            },
            _ => ConnectError::Unreachable { addr, source: err },
        }
    }
}

/// Failure during the TLS handshake
#[derive(Error, Debug)]
pub enum TlsError {
    /// Generic handshake failure (alert, reset, malformed record)
    #[error("TLS handshake with {host} failed: {reason}")]
    HandshakeFailed {
        /// Hostname used for SNI and verification
        host: String,
        /// Description of the failure
        reason: String,
    },

    /// The certificate chain is valid but not issued for the requested host
    #[error("certificate presented by {dialed} is not valid for {host}: {reason}")]
    CertificateMismatch {
        /// Hostname the certificate was checked against
        host: String,
        /// Address that presented the certificate
        dialed: SocketAddr,
        /// Verification error reported by OpenSSL
        reason: String,
    },

    /// The certificate chain does not lead to a trusted root
    #[error("untrusted certificate chain for {host}: {reason}")]
    UntrustedChain {
        /// Hostname the certificate was checked against
        host: String,
        /// Verification error reported by OpenSSL
        reason: String,
    },

    /// No mutually supported protocol version
    #[error("TLS protocol version not supported by {host}: {reason}")]
    ProtocolVersionUnsupported {
        /// Hostname used for SNI
        host: String,
        /// Description of the failure
        reason: String,
    },

    /// Leaf certificate did not match the pinned fingerprint
    #[error("certificate fingerprint mismatch for {host}: expected {expected}, got {actual}")]
    FingerprintMismatch {
        /// Hostname used for SNI
        host: String,
        /// Pinned fingerprint
        expected: String,
        /// Fingerprint of the presented leaf certificate
        actual: String,
    },

    /// The handshake did not complete within the configured timeout
    #[error("TLS handshake with {host} timed out after {timeout:?}")]
    Timeout {
        /// Hostname used for SNI
        host: String,
        /// Configured handshake timeout
        timeout: Duration,
    },

    /// The TLS context or session could not be set up
    #[error("TLS setup error: {0}")]
    Setup(#[from] openssl::error::ErrorStack),
}

/// Phase of connection establishment a failure belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Invalid rule or configuration
    Config,
    /// TCP connect (including DNS)
    Dial,
    /// TLS handshake and certificate validation
    Handshake,
    /// I/O on an already established connection
    Io,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Config => write!(f, "config"),
            Phase::Dial => write!(f, "dial"),
            Phase::Handshake => write!(f, "handshake"),
            Phase::Io => write!(f, "io"),
        }
    }
}

/// Unified error type of the interception layer
#[derive(Error, Debug)]
pub enum OverrideError {
    /// Dial failure
    #[error("dial error: {0}")]
    Connect(#[from] ConnectError),

    /// Handshake failure
    #[error("TLS error: {0}")]
    Tls(#[from] TlsError),

    /// Configuration or rule error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl OverrideError {
    /// Phase in which the error happened
    pub fn phase(&self) -> Phase {
        match self {
            OverrideError::Connect(_) => Phase::Dial,
            OverrideError::Tls(_) => Phase::Handshake,
            OverrideError::Config(_) => Phase::Config,
            OverrideError::Io(_) => Phase::Io,
        }
    }
}

/// Result type alias
///
/// This is a `Result` type alias that uses our `OverrideError`.
pub type Result<T> = std::result::Result<T, OverrideError>;
