//! sni-override command line tool
//!
//! Sends a single HTTP/1.1 request through the intercepting transport and
//! prints the raw response. Useful to check that an override reaches the
//! expected server with the expected certificate.

use std::io::Write;
use std::path::PathBuf;

use clap::Parser;
use http::header::{HeaderName, HeaderValue, CONNECTION, USER_AGENT};
use http::{Method, Request, Uri};
use log::{info, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use sni_override::common::{init_logger, Result};
use sni_override::config::{ConfigError, TransportConfig};
use sni_override::tls::{certificate_fingerprint, Fingerprint};
use sni_override::{encode_request_head, ConnectionRequest, InterceptingTransport, RequestRewriter, APP_NAME, VERSION};

/// Send one HTTPS request with host overrides applied
#[derive(Parser, Debug)]
#[clap(author, version = VERSION, about, long_about = None)]
struct Args {
    /// Configuration file (JSON)
    #[clap(long)]
    config: Option<PathBuf>,

    /// Override, as HOST=ADDR[:PORT]; may be repeated
    #[clap(long = "override", value_name = "HOST=ADDR[:PORT]")]
    overrides: Vec<String>,

    /// Expected SHA-256 fingerprint of the server certificate
    #[clap(long, value_name = "HEX", conflicts_with = "pin_cert")]
    pin: Option<String>,

    /// Pin the fingerprint of the certificate in this PEM file
    #[clap(long, value_name = "PEM")]
    pin_cert: Option<PathBuf>,

    /// Skip certificate chain verification (requires a pin)
    #[clap(long)]
    insecure_skip_chain: bool,

    /// Additional trusted root certificates (PEM)
    #[clap(long, value_name = "PEM")]
    ca_file: Option<PathBuf>,

    /// Extra request header, as 'Name: value'; may be repeated
    #[clap(short = 'H', long = "header", value_name = "NAME: VALUE")]
    headers: Vec<String>,

    /// Log level (overrides the configuration)
    #[clap(long)]
    log_level: Option<String>,

    /// Request URL
    url: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = TransportConfig::load(args.config.as_deref())?;
    if let Some(ref level) = args.log_level {
        config.log_level = level.clone();
    }
    if let Some(ref ca_file) = args.ca_file {
        config.ca_file = Some(ca_file.clone());
    }

    init_logger(&config.log_level);
    info!("Starting {} v{}", APP_NAME, VERSION);

    config.log();
    for warning in config.check_warnings() {
        warn!("{}", warning);
    }

    let transport = InterceptingTransport::from_config(&config)?;
    for entry in &args.overrides {
        let (host, address) = entry.split_once('=').ok_or_else(|| ConfigError::InvalidValue {
            name: "override".to_string(),
            reason: format!("expected HOST=ADDR[:PORT], got '{}'", entry),
        })?;
        transport.add_override(host, address, None)?;
    }

    let request = build_request(&args)?;

    let mut target = ConnectionRequest::from_http_request(&request)?
        .with_insecure_skip_chain_verification(args.insecure_skip_chain);
    if let Some(pin) = pinned_fingerprint(&args)? {
        info!("Pinning server certificate {}", pin);
        target = target.with_pinned_fingerprint(pin);
    }

    let mut connection = transport.open_connection(&target).await?;
    match connection.tls_info() {
        Some(tls) => info!(
            "Connected to {} as {} ({}, SNI {})",
            connection.dialed_address(),
            connection.original_hostname(),
            tls.version,
            tls.server_name
        ),
        None => info!(
            "Connected to {} as {}",
            connection.dialed_address(),
            connection.original_hostname()
        ),
    }

    let request = RequestRewriter::for_connection(&connection).rewrite(request);
    connection.write_all(&encode_request_head(&request)).await?;
    connection.flush().await?;

    let mut response = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        match connection.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => response.extend_from_slice(&buf[..n]),
            // Servers often close without close_notify once the response is sent
            Err(e) if !response.is_empty() => {
                warn!("Connection closed uncleanly: {}", e);
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }

    let mut stdout = std::io::stdout();
    stdout.write_all(&response)?;
    stdout.flush()?;

    Ok(())
}

fn build_request(args: &Args) -> Result<Request<()>> {
    let uri: Uri = args.url.parse().map_err(|e| ConfigError::InvalidValue {
        name: "url".to_string(),
        reason: format!("{}", e),
    })?;

    let mut builder = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .header(USER_AGENT, format!("{}/{}", APP_NAME, VERSION))
        .header(CONNECTION, "close");

    for header in &args.headers {
        let (name, value) = header.split_once(':').ok_or_else(|| ConfigError::InvalidValue {
            name: "header".to_string(),
            reason: format!("expected 'Name: value', got '{}'", header),
        })?;
        let name = HeaderName::from_bytes(name.trim().as_bytes()).map_err(|e| ConfigError::InvalidValue {
            name: "header".to_string(),
            reason: e.to_string(),
        })?;
        let value = HeaderValue::from_str(value.trim()).map_err(|e| ConfigError::InvalidValue {
            name: "header".to_string(),
            reason: e.to_string(),
        })?;
        builder = builder.header(name, value);
    }

    let request = builder.body(()).map_err(|e| ConfigError::InvalidValue {
        name: "request".to_string(),
        reason: e.to_string(),
    })?;
    Ok(request)
}

fn pinned_fingerprint(args: &Args) -> Result<Option<Fingerprint>> {
    if let Some(ref hex) = args.pin {
        return Ok(Some(hex.parse()?));
    }
    if let Some(ref path) = args.pin_cert {
        return Ok(Some(certificate_fingerprint(path)?));
    }
    Ok(None)
}
