//! TLS handling module
//!
//! This module handles the client side of TLS: certificate loading and
//! fingerprints, verification hooks and the handshake itself.

mod cert;
mod handshaker;
mod verify;

pub use cert::{certificate_fingerprint, certificate_subject, load_certificates, Fingerprint};
pub use handshaker::{TlsHandshakeConfig, TlsHandshaker, TlsInfo, TlsSettings};
