use std::sync::Arc;

use thiserror::Error;

use crate::transport::ConnectOptions;

const DEFAULT_MAX_CONNECTIONS: usize = 20;
const DEFAULT_MAX_WAITERS: usize = 100;
const DEFAULT_BODY_CHANNEL_CAPACITY: usize = 16;

/// The protocol spoken to the authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }
}

/// Configuration of a [`Client`](crate::Client); one client binds one
/// authority (`scheme://host:port`).
pub struct ClientConfig {
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) scheme: Scheme,
    pub(crate) tls: Option<Arc<rustls::ClientConfig>>,
    pub(crate) max_connections: usize,
    pub(crate) max_waiters: usize,
    pub(crate) options: ConnectOptions,
    pub(crate) body_channel_capacity: usize,
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("host must be set")]
    MissingHost,
}

pub struct ClientConfigBuilder {
    host: Option<String>,
    port: Option<u16>,
    scheme: Scheme,
    tls: Option<Arc<rustls::ClientConfig>>,
    max_connections: usize,
    max_waiters: usize,
    options: ConnectOptions,
    body_channel_capacity: usize,
}

impl ClientConfigBuilder {
    fn new() -> Self {
        Self {
            host: None,
            port: None,
            scheme: Scheme::Http,
            tls: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            max_waiters: DEFAULT_MAX_WAITERS,
            options: ConnectOptions::default(),
            body_channel_capacity: DEFAULT_BODY_CHANNEL_CAPACITY,
        }
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Defaults to the scheme's well-known port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn scheme(mut self, scheme: Scheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// Override the TLS configuration used for `https` (trust roots, client
    /// auth). The system trust roots are used when unset.
    pub fn tls(mut self, tls: Arc<rustls::ClientConfig>) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Hard cap on the number of pooled connections.
    pub fn max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// Cap on acquirers queued while every connection is busy.
    pub fn max_waiters(mut self, max_waiters: usize) -> Self {
        self.max_waiters = max_waiters;
        self
    }

    pub fn tcp_nodelay(mut self, tcp_nodelay: bool) -> Self {
        self.options.tcp_nodelay = tcp_nodelay;
        self
    }

    pub fn send_buffer_size(mut self, size: u32) -> Self {
        self.options.send_buffer_size = Some(size);
        self
    }

    pub fn recv_buffer_size(mut self, size: u32) -> Self {
        self.options.recv_buffer_size = Some(size);
        self
    }

    /// Depth of the per-request body queue; bounds chunks buffered between
    /// the connection and a slow consumer.
    pub fn body_channel_capacity(mut self, capacity: usize) -> Self {
        self.body_channel_capacity = capacity.max(1);
        self
    }

    pub fn build(self) -> Result<ClientConfig, ConfigError> {
        let host = self.host.ok_or(ConfigError::MissingHost)?;
        let port = self.port.unwrap_or_else(|| self.scheme.default_port());
        Ok(ClientConfig {
            host,
            port,
            scheme: self.scheme,
            tls: self.tls,
            max_connections: self.max_connections,
            max_waiters: self.max_waiters,
            options: self.options,
            body_channel_capacity: self.body_channel_capacity,
        })
    }
}
