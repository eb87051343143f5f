//! Certificate verification hooks
//!
//! OpenSSL performs chain and hostname verification itself; this module adds
//! leaf fingerprint pinning on top of it, optionally tolerates chain-trust
//! errors, and maps a failed handshake onto a [`TlsError`].

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use log::{debug, warn};
use openssl::ssl::{self, SslRef};
use openssl::x509::{X509StoreContextRef, X509VerifyResult};
use openssl_sys as ffi;

use super::cert::Fingerprint;
use crate::common::TlsError;

/// What the verify callback saw during one handshake
#[derive(Debug, Default)]
pub(crate) struct PinOutcome {
    /// Fingerprint of the leaf certificate presented by the peer
    pub(crate) observed: Option<Fingerprint>,
    /// The leaf did not match the pin
    pub(crate) mismatch: bool,
    /// Chain errors ignored because chain verification was skipped
    pub(crate) tolerated: Vec<X509VerifyResult>,
}

pub(crate) type SharedOutcome = Arc<Mutex<PinOutcome>>;

/// Verification codes meaning the chain does not lead to a trusted root
fn is_chain_error(code: i32) -> bool {
    matches!(
        code,
        ffi::X509_V_ERR_UNABLE_TO_GET_ISSUER_CERT
            | ffi::X509_V_ERR_UNABLE_TO_GET_ISSUER_CERT_LOCALLY
            | ffi::X509_V_ERR_DEPTH_ZERO_SELF_SIGNED_CERT
            | ffi::X509_V_ERR_SELF_SIGNED_CERT_IN_CHAIN
            | ffi::X509_V_ERR_UNABLE_TO_VERIFY_LEAF_SIGNATURE
            | ffi::X509_V_ERR_CERT_UNTRUSTED
            | ffi::X509_V_ERR_INVALID_CA
            | ffi::X509_V_ERR_CERT_CHAIN_TOO_LONG
    )
}

fn is_name_error(code: i32) -> bool {
    matches!(
        code,
        ffi::X509_V_ERR_HOSTNAME_MISMATCH | ffi::X509_V_ERR_IP_ADDRESS_MISMATCH
    )
}

/// Build the verify callback installed on a pinned session
///
/// The callback runs once per certificate (and once per error) while OpenSSL
/// walks the chain. It never turns a failure into success except for chain
/// errors when `skip_chain` is set; hostname errors always fail.
pub(crate) fn pin_callback(
    expected: Option<Fingerprint>,
    skip_chain: bool,
    outcome: SharedOutcome,
) -> impl Fn(bool, &mut X509StoreContextRef) -> bool + Send + Sync + 'static {
    move |preverify_ok, ctx| {
        let mut state = outcome.lock().unwrap_or_else(|e| e.into_inner());
        let mut ok = preverify_ok;

        if !ok && skip_chain && is_chain_error(ctx.error().as_raw()) {
            debug!(
                "Ignoring chain error at depth {}: {}",
                ctx.error_depth(),
                ctx.error().error_string()
            );
            state.tolerated.push(ctx.error());
            ok = true;
        }

        if !ok || ctx.error_depth() != 0 {
            return ok;
        }

        let actual = match ctx.current_cert().map(Fingerprint::of) {
            Some(Ok(fp)) => fp,
            Some(Err(e)) => {
                warn!("Failed to fingerprint peer certificate: {}", e);
                ctx.set_error(X509VerifyResult::APPLICATION_VERIFICATION);
                return false;
            }
            None => return ok,
        };
        state.observed = Some(actual);

        match expected {
            Some(expected) if expected != actual => {
                state.mismatch = true;
                ctx.set_error(X509VerifyResult::APPLICATION_VERIFICATION);
                false
            }
            _ => true,
        }
    }
}

/// Map a failed handshake onto a [`TlsError`]
///
/// `ssl` is the session the handshake ran on; its verify result tells
/// certificate problems apart from protocol-level failures.
pub(crate) fn classify(
    err: &ssl::Error,
    ssl: &SslRef,
    host: &str,
    dialed: SocketAddr,
    expected: Option<Fingerprint>,
    outcome: Option<&SharedOutcome>,
) -> TlsError {
    if let (Some(expected), Some(outcome)) = (expected, outcome) {
        let state = outcome.lock().unwrap_or_else(|e| e.into_inner());
        if state.mismatch {
            return TlsError::FingerprintMismatch {
                host: host.to_string(),
                expected: expected.to_string(),
                actual: state
                    .observed
                    .map(|fp| fp.to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
            };
        }
    }

    let verify = ssl.verify_result();
    if verify != X509VerifyResult::OK {
        let code = verify.as_raw();
        let reason = verify.error_string().to_string();
        let tolerated = outcome
            .map(|o| {
                o.lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .tolerated
                    .iter()
                    .any(|t| t.as_raw() == code)
            })
            .unwrap_or(false);

        if is_name_error(code) {
            return TlsError::CertificateMismatch {
                host: host.to_string(),
                dialed,
                reason,
            };
        }
        if !tolerated {
            return TlsError::UntrustedChain {
                host: host.to_string(),
                reason,
            };
        }
    }

    let reason = err.to_string();
    if let Some(stack) = err.ssl_error() {
        let protocol = stack.errors().iter().any(|e| {
            e.reason()
                .map(|r| {
                    let r = r.to_lowercase();
                    r.contains("unsupported protocol")
                        || r.contains("protocol version")
                        || r.contains("no protocols available")
                        || r.contains("version too low")
                })
                .unwrap_or(false)
        });
        if protocol {
            return TlsError::ProtocolVersionUnsupported {
                host: host.to_string(),
                reason,
            };
        }
    }

    TlsError::HandshakeFailed {
        host: host.to_string(),
        reason,
    }
}
