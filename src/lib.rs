//! Asynchronous HTTP/1.1 client over TCP/TLS.
//!
//! A [`Client`] binds to one authority (`scheme://host:port`) and multiplexes
//! caller requests over a bounded pool of persistent connections. Request and
//! response bodies are streamed chunk by chunk, and a `101 Switching
//! Protocols` response hands the raw byte stream over to the caller.

pub mod client;
pub mod codec;
pub mod protocol;
pub mod transport;

mod error;

pub use client::{Client, ClientConfig, ClientConfigBuilder, ConfigError, Scheme};
pub use error::ClientError;
pub use protocol::body::{BodyStream, Content, ContentStream, Released, Upgraded};
pub use protocol::{Request, RequestHead, Response, ResponseHead};
