use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::codec::DecodeError;
use crate::protocol::PayloadItem;

/// Decodes a body with no framing headers: everything up to the transport
/// close belongs to the message (RFC 7230 §3.3.3). The `Eof` marker is only
/// produced from `decode_eof`, i.e. when the peer has closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UntilCloseDecoder {
    done: bool,
}

impl UntilCloseDecoder {
    pub fn new() -> Self {
        Self { done: false }
    }

    pub fn is_finished(&self) -> bool {
        self.done
    }
}

impl Decoder for UntilCloseDecoder {
    type Item = PayloadItem;
    type Error = DecodeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        Ok(Some(PayloadItem::Chunk(src.split().freeze())))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if !src.is_empty() {
            return Ok(Some(PayloadItem::Chunk(src.split().freeze())));
        }
        if !self.done {
            self.done = true;
            return Ok(Some(PayloadItem::Eof));
        }
        Ok(None)
    }
}
