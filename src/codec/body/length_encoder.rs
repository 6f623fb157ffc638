use bytes::BytesMut;
use tokio_util::codec::Encoder;

use crate::codec::EncodeError;
use crate::protocol::PayloadItem;

/// Encodes a `Content-Length` framed upload: chunks pass through verbatim
/// up to the declared length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthEncoder {
    remaining: u64,
}

impl LengthEncoder {
    pub fn new(length: u64) -> Self {
        Self { remaining: length }
    }
}

impl Encoder<PayloadItem> for LengthEncoder {
    type Error = EncodeError;

    fn encode(&mut self, item: PayloadItem, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            PayloadItem::Chunk(bytes) => {
                if bytes.is_empty() {
                    return Ok(());
                }
                if (bytes.len() as u64) > self.remaining {
                    return crate::codec::error::InvalidRequestSnafu {
                        message: "body larger than the declared content-length",
                    }
                    .fail();
                }
                self.remaining -= bytes.len() as u64;
                dst.extend_from_slice(&bytes[..]);
                Ok(())
            }
            // trailers have no place in a sized upload
            PayloadItem::Trailers(_) => Ok(()),
            PayloadItem::Eof => {
                if self.remaining > 0 {
                    return crate::codec::error::InvalidRequestSnafu {
                        message: "body shorter than the declared content-length",
                    }
                    .fail();
                }
                Ok(())
            }
        }
    }
}
