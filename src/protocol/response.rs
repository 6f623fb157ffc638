use bytes::Bytes;
use futures::Stream;
use http::{HeaderMap, StatusCode, Version};

use crate::error::ClientError;
use crate::protocol::body::{Content, Released, UpgradeSlot, Upgraded};

/// The parsed head of an inbound response.
pub struct ResponseHead {
    status: StatusCode,
    version: Version,
    headers: HeaderMap,
}

impl ResponseHead {
    pub(crate) fn new(status: StatusCode, version: Version, headers: HeaderMap) -> Self {
        Self { status, version, headers }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

/// An inbound response: head, streamed content, and (for status `101`) the
/// transport-handoff capability.
pub struct Response {
    head: ResponseHead,
    content: Content,
    upgrade: Option<UpgradeSlot>,
    released: Released,
    conn_id: u64,
}

impl Response {
    pub(crate) fn new(
        head: ResponseHead,
        content: Content,
        upgrade: Option<UpgradeSlot>,
        released: Released,
        conn_id: u64,
    ) -> Self {
        Self { head, content, upgrade, released, conn_id }
    }

    pub fn status(&self) -> StatusCode {
        self.head.status
    }

    pub fn version(&self) -> Version {
        self.head.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.head.headers
    }

    pub fn content_mut(&mut self) -> &mut Content {
        &mut self.content
    }

    pub fn into_content(self) -> Content {
        self.content
    }

    /// Identifier of the connection this response arrived on. Diagnostics
    /// only.
    pub fn connection_id(&self) -> u64 {
        self.conn_id
    }

    /// The release edge of the exchange: resolves once the connection went
    /// back to the pool (or was destroyed).
    pub fn released(&self) -> Released {
        self.released.clone()
    }

    /// Take over the transport after a `101 Switching Protocols` response.
    ///
    /// `upstream` is pumped into the transport; the returned [`Upgraded`]
    /// yields the peer's raw bytes and ends when the transport closes.
    /// Fails with [`ClientError::UpgradeRefused`] on any other status and
    /// with [`ClientError::StreamAlreadyConsumed`] when invoked twice.
    pub fn upgrade<S>(&mut self, upstream: S) -> Result<Upgraded, ClientError>
    where
        S: Stream<Item = Bytes> + Send + 'static,
    {
        if self.head.status != StatusCode::SWITCHING_PROTOCOLS {
            return Err(ClientError::UpgradeRefused);
        }
        match self.upgrade.take() {
            Some(slot) => Ok(slot.start(upstream)),
            None => Err(ClientError::StreamAlreadyConsumed),
        }
    }
}
