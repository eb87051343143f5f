//! Shared test fixtures
//!
//! Certificates are generated on the fly with OpenSSL; TLS servers run on
//! loopback and stand in for the override target.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use openssl::asn1::Asn1Time;
use openssl::bn::{BigNum, MsbOption};
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::ssl::{NameType, Ssl, SslAcceptor, SslMethod, SslVersion};
use openssl::x509::extension::{
    AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, KeyUsage, SubjectAlternativeName,
    SubjectKeyIdentifier,
};
use openssl::x509::{X509Builder, X509Name, X509NameBuilder, X509};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_openssl::SslStream;

use sni_override::{Dialer, InterceptingTransport, RuleTable, TlsHandshaker, TlsSettings};

fn new_key() -> PKey<Private> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap()
}

fn name(common_name: &str) -> X509Name {
    let mut builder = X509NameBuilder::new().unwrap();
    builder.append_entry_by_nid(Nid::COMMONNAME, common_name).unwrap();
    builder.build()
}

fn base_builder(subject: &X509Name, key: &PKey<Private>) -> X509Builder {
    let mut builder = X509Builder::new().unwrap();
    builder.set_version(2).unwrap();

    let mut serial = BigNum::new().unwrap();
    serial.rand(64, MsbOption::MAYBE_ZERO, false).unwrap();
    builder.set_serial_number(&serial.to_asn1_integer().unwrap()).unwrap();

    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() as i64;
    builder.set_not_before(&Asn1Time::from_unix(now - 3600).unwrap()).unwrap();
    builder.set_not_after(&Asn1Time::days_from_now(30).unwrap()).unwrap();

    builder.set_subject_name(subject).unwrap();
    builder.set_pubkey(key).unwrap();
    builder
}

/// Certificate authority for test certificates
pub struct TestCa {
    pub cert: X509,
    key: PKey<Private>,
}

impl TestCa {
    pub fn new(common_name: &str) -> Self {
        let key = new_key();
        let subject = name(common_name);
        let mut builder = base_builder(&subject, &key);
        builder.set_issuer_name(&subject).unwrap();

        builder
            .append_extension(BasicConstraints::new().critical().ca().build().unwrap())
            .unwrap();
        builder
            .append_extension(KeyUsage::new().critical().key_cert_sign().crl_sign().build().unwrap())
            .unwrap();
        let ski = SubjectKeyIdentifier::new()
            .build(&builder.x509v3_context(None, None))
            .unwrap();
        builder.append_extension(ski).unwrap();

        builder.sign(&key, MessageDigest::sha256()).unwrap();
        Self {
            cert: builder.build(),
            key,
        }
    }

    /// Issue a server certificate for the given DNS names
    pub fn issue(&self, dns_names: &[&str]) -> (X509, PKey<Private>) {
        let key = new_key();
        let subject = name(dns_names.first().copied().unwrap_or("localhost"));
        let mut builder = base_builder(&subject, &key);
        builder.set_issuer_name(self.cert.subject_name()).unwrap();

        builder
            .append_extension(BasicConstraints::new().build().unwrap())
            .unwrap();
        builder
            .append_extension(
                KeyUsage::new()
                    .critical()
                    .digital_signature()
                    .key_encipherment()
                    .build()
                    .unwrap(),
            )
            .unwrap();
        builder
            .append_extension(ExtendedKeyUsage::new().server_auth().build().unwrap())
            .unwrap();

        let mut san = SubjectAlternativeName::new();
        for dns_name in dns_names {
            if dns_name.parse::<std::net::IpAddr>().is_ok() {
                san.ip(dns_name);
            } else {
                san.dns(dns_name);
            }
        }
        let san = san
            .build(&builder.x509v3_context(Some(&*self.cert), None))
            .unwrap();
        builder.append_extension(san).unwrap();

        let aki = AuthorityKeyIdentifier::new()
            .keyid(false)
            .issuer(false)
            .build(&builder.x509v3_context(Some(&*self.cert), None))
            .unwrap();
        builder.append_extension(aki).unwrap();

        builder.sign(&self.key, MessageDigest::sha256()).unwrap();
        (builder.build(), key)
    }
}

/// What a test server observed
#[derive(Debug, Default)]
pub struct Observed {
    /// SNI of every accepted handshake (`None` when the client sent none)
    pub server_names: Vec<Option<String>>,
    /// Request heads received after the handshake
    pub requests: Vec<String>,
    /// Number of TCP connections accepted
    pub accepted: usize,
}

/// Loopback TLS server answering every request with `200 OK`
pub struct TlsServer {
    pub addr: SocketAddr,
    observed: Arc<Mutex<Observed>>,
}

impl TlsServer {
    pub async fn start(cert: &X509, key: &PKey<Private>) -> Self {
        Self::start_with(cert, key, None).await
    }

    pub async fn start_with(cert: &X509, key: &PKey<Private>, max_version: Option<SslVersion>) -> Self {
        let observed = Arc::new(Mutex::new(Observed::default()));

        let mut acceptor = SslAcceptor::mozilla_intermediate_v5(SslMethod::tls()).unwrap();
        acceptor.set_certificate(cert).unwrap();
        acceptor.set_private_key(key).unwrap();
        if max_version.is_some() {
            acceptor.set_max_proto_version(max_version).unwrap();
        }
        let sni_log = Arc::clone(&observed);
        acceptor.set_servername_callback(move |ssl, _alert| {
            let name = ssl.servername(NameType::HOST_NAME).map(str::to_string);
            sni_log.lock().unwrap().server_names.push(name);
            Ok(())
        });
        let acceptor = acceptor.build();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let state = Arc::clone(&observed);
        tokio::spawn(async move {
            loop {
                let (tcp, _) = match listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(_) => break,
                };
                state.lock().unwrap().accepted += 1;

                let ssl = Ssl::new(acceptor.context()).unwrap();
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let mut tls = SslStream::new(ssl, tcp).unwrap();
                    if Pin::new(&mut tls).accept().await.is_err() {
                        return;
                    }

                    let head = read_head(&mut tls).await;
                    if head.is_empty() {
                        return;
                    }
                    state.lock().unwrap().requests.push(head);

                    let _ = tls
                        .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok")
                        .await;
                    let _ = tls.shutdown().await;
                });
            }
        });

        Self { addr, observed }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn server_names(&self) -> Vec<Option<String>> {
        self.observed.lock().unwrap().server_names.clone()
    }

    pub fn requests(&self) -> Vec<String> {
        self.observed.lock().unwrap().requests.clone()
    }

    pub fn accepted(&self) -> usize {
        self.observed.lock().unwrap().accepted
    }
}

async fn read_head<S: tokio::io::AsyncRead + Unpin>(stream: &mut S) -> String {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }
    String::from_utf8_lossy(&head).into_owned()
}

/// Transport trusting only `roots`, with short timeouts
pub fn transport_trusting(roots: &[&X509]) -> InterceptingTransport {
    let mut settings = TlsSettings {
        use_system_roots: false,
        handshake_timeout: Duration::from_secs(5),
        ..TlsSettings::default()
    };
    for root in roots {
        settings = settings.add_root_certificate((*root).clone());
    }

    InterceptingTransport::new(
        Arc::new(RuleTable::new()),
        Dialer::new(Duration::from_secs(2)),
        TlsHandshaker::new(&settings).unwrap(),
    )
}

/// Read until EOF, tolerating a missing close_notify
pub async fn read_to_end<S: tokio::io::AsyncRead + Unpin>(stream: &mut S) -> String {
    let mut out = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => out.extend_from_slice(&buf[..n]),
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}
