//! Established connections

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_openssl::SslStream;

use super::request::Scheme;
use crate::tls::TlsInfo;

/// Plain TCP or TLS over TCP
pub enum MaybeTlsStream {
    /// Unencrypted stream
    Plain(TcpStream),
    /// OpenSSL session over TCP
    Tls(SslStream<TcpStream>),
}

impl MaybeTlsStream {
    /// Underlying TCP stream
    pub fn tcp(&self) -> &TcpStream {
        match self {
            MaybeTlsStream::Plain(s) => s,
            MaybeTlsStream::Tls(s) => s.get_ref(),
        }
    }
}

impl fmt::Debug for MaybeTlsStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaybeTlsStream::Plain(_) => f.write_str("MaybeTlsStream::Plain"),
            MaybeTlsStream::Tls(_) => f.write_str("MaybeTlsStream::Tls"),
        }
    }
}

impl AsyncRead for MaybeTlsStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            MaybeTlsStream::Tls(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for MaybeTlsStream {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            MaybeTlsStream::Tls(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_flush(cx),
            MaybeTlsStream::Tls(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            MaybeTlsStream::Tls(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

/// A connected stream tagged with how it was established
///
/// The stream is closed when the connection is dropped.
pub struct EstablishedConnection {
    stream: MaybeTlsStream,
    original_hostname: String,
    port: u16,
    dialed_address: SocketAddr,
    overridden: bool,
    tls_info: Option<TlsInfo>,
}

impl EstablishedConnection {
    pub(crate) fn plain(
        stream: TcpStream,
        original_hostname: &str,
        port: u16,
        dialed_address: SocketAddr,
        overridden: bool,
    ) -> Self {
        Self {
            stream: MaybeTlsStream::Plain(stream),
            original_hostname: original_hostname.to_string(),
            port,
            dialed_address,
            overridden,
            tls_info: None,
        }
    }

    pub(crate) fn tls(
        stream: SslStream<TcpStream>,
        info: TlsInfo,
        original_hostname: &str,
        port: u16,
        dialed_address: SocketAddr,
        overridden: bool,
    ) -> Self {
        Self {
            stream: MaybeTlsStream::Tls(stream),
            original_hostname: original_hostname.to_string(),
            port,
            dialed_address,
            overridden,
            tls_info: Some(info),
        }
    }

    /// Hostname the connection was requested for
    pub fn original_hostname(&self) -> &str {
        &self.original_hostname
    }

    /// Port the connection was requested for
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Address the TCP connection was made to
    pub fn dialed_address(&self) -> SocketAddr {
        self.dialed_address
    }

    /// Whether an override rule or address hint chose the destination
    pub fn is_overridden(&self) -> bool {
        self.overridden
    }

    pub fn is_tls(&self) -> bool {
        self.tls_info.is_some()
    }

    pub fn scheme(&self) -> Scheme {
        if self.is_tls() {
            Scheme::Tls
        } else {
            Scheme::Plain
        }
    }

    /// Handshake details for TLS connections
    pub fn tls_info(&self) -> Option<&TlsInfo> {
        self.tls_info.as_ref()
    }

    /// Local address of the TCP connection
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.stream.tcp().local_addr()
    }

    pub fn stream(&self) -> &MaybeTlsStream {
        &self.stream
    }

    pub fn stream_mut(&mut self) -> &mut MaybeTlsStream {
        &mut self.stream
    }

    /// Take the stream, dropping the metadata
    pub fn into_inner(self) -> MaybeTlsStream {
        self.stream
    }
}

impl fmt::Debug for EstablishedConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EstablishedConnection")
            .field("original_hostname", &self.original_hostname)
            .field("port", &self.port)
            .field("dialed_address", &self.dialed_address)
            .field("overridden", &self.overridden)
            .field("tls_info", &self.tls_info)
            .finish()
    }
}

impl AsyncRead for EstablishedConnection {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut Pin::into_inner(self).stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for EstablishedConnection {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        Pin::new(&mut Pin::into_inner(self).stream).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut Pin::into_inner(self).stream).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut Pin::into_inner(self).stream).poll_shutdown(cx)
    }
}
