use bytes::Bytes;
use http::HeaderMap;

use crate::protocol::RequestHead;

/// One frame of an HTTP/1.1 message as it crosses the codec: the head,
/// then payload items until the terminal marker.
pub enum Message<T> {
    Head(T),
    Payload(PayloadItem),
}

impl Message<(RequestHead, PayloadSize)> {
    /// Frame an outbound request head together with the framing decision
    /// for its body.
    pub fn request(head: RequestHead, payload_size: PayloadSize) -> Self {
        Message::Head((head, payload_size))
    }
}

impl<T> Message<T> {
    pub fn into_payload_item(self) -> Option<PayloadItem> {
        match self {
            Message::Head(_) => None,
            Message::Payload(payload_item) => Some(payload_item),
        }
    }
}

/// One piece of a message body.
///
/// `Trailers` only shows up on inbound chunked bodies that carry a trailer
/// section; `Eof` is the terminal marker and always comes last.
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadItem {
    Chunk(Bytes),
    Trailers(HeaderMap),
    Eof,
}

impl PayloadItem {
    pub fn is_eof(&self) -> bool {
        matches!(self, PayloadItem::Eof)
    }

    pub fn is_chunk(&self) -> bool {
        matches!(self, PayloadItem::Chunk(_))
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn into_trailers(self) -> Option<HeaderMap> {
        match self {
            PayloadItem::Trailers(trailers) => Some(trailers),
            _ => None,
        }
    }
}

/// How a message body is framed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadSize {
    Empty,
    Length(u64),
    Chunked,
}
