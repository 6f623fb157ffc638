//! Byte transport: TCP dialing, socket options and optional TLS layering.

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use rustls::pki_types::ServerName;
use rustls::RootCertStore;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{lookup_host, TcpSocket, TcpStream};
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, trace};

/// A duplex byte channel to the peer, either plaintext or TLS.
pub enum Transport {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl AsyncRead for Transport {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            Transport::Tls(stream) => Pin::new(stream.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Transport {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Transport::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            Transport::Tls(stream) => Pin::new(stream.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(stream) => Pin::new(stream).poll_flush(cx),
            Transport::Tls(stream) => Pin::new(stream.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            Transport::Tls(stream) => Pin::new(stream.as_mut()).poll_shutdown(cx),
        }
    }
}

/// Socket options applied to every dialed connection.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub tcp_nodelay: bool,
    pub send_buffer_size: Option<u32>,
    pub recv_buffer_size: Option<u32>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self { tcp_nodelay: true, send_buffer_size: None, recv_buffer_size: None }
    }
}

/// Dials connections to one authority, layering TLS when configured.
pub struct Connector {
    host: String,
    port: u16,
    options: ConnectOptions,
    tls: Option<(TlsConnector, ServerName<'static>)>,
}

impl Connector {
    pub fn plain(host: impl Into<String>, port: u16, options: ConnectOptions) -> Self {
        Self { host: host.into(), port, options, tls: None }
    }

    pub fn tls(
        host: impl Into<String>,
        port: u16,
        options: ConnectOptions,
        tls_config: Arc<rustls::ClientConfig>,
    ) -> io::Result<Self> {
        let host = host.into();
        let server_name = ServerName::try_from(host.clone())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let connector = TlsConnector::from(tls_config);
        Ok(Self { host, port, options, tls: Some((connector, server_name)) })
    }

    pub async fn dial(&self) -> io::Result<Transport> {
        let addr = resolve(&self.host, self.port).await?;

        let socket = match addr {
            SocketAddr::V4(_) => TcpSocket::new_v4()?,
            SocketAddr::V6(_) => TcpSocket::new_v6()?,
        };
        if let Some(size) = self.options.send_buffer_size {
            socket.set_send_buffer_size(size)?;
        }
        if let Some(size) = self.options.recv_buffer_size {
            socket.set_recv_buffer_size(size)?;
        }

        let stream = socket.connect(addr).await?;
        stream.set_nodelay(self.options.tcp_nodelay)?;
        trace!(%addr, "tcp connected");

        match &self.tls {
            None => Ok(Transport::Plain(stream)),
            Some((connector, server_name)) => {
                let tls_stream = connector.connect(server_name.clone(), stream).await?;
                debug!(host = %self.host, "tls session established");
                Ok(Transport::Tls(Box::new(tls_stream)))
            }
        }
    }
}

async fn resolve(host: &str, port: u16) -> io::Result<SocketAddr> {
    lookup_host((host, port)).await?.next().ok_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, format!("no address found for {host}:{port}"))
    })
}

/// The default TLS configuration: system trust roots, no client auth.
pub fn default_tls_config() -> io::Result<Arc<rustls::ClientConfig>> {
    let mut root_store = RootCertStore::empty();

    let native_certs = rustls_native_certs::load_native_certs();
    if !native_certs.errors.is_empty() {
        tracing::warn!(errors = ?native_certs.errors, "some native certificates could not be loaded");
    }
    for cert in native_certs.certs {
        root_store.add(cert).map_err(io::Error::other)?;
    }

    let config = rustls::ClientConfig::builder().with_root_certificates(root_store).with_no_client_auth();

    Ok(Arc::new(config))
}
