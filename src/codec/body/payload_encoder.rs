use bytes::BytesMut;
use tokio_util::codec::Encoder;

use crate::codec::body::{ChunkedEncoder, LengthEncoder};
use crate::codec::EncodeError;
use crate::protocol::{PayloadItem, PayloadSize};

/// Encodes the payload of one request message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadEncoder {
    kind: Kind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    /// content-length payload
    Length(LengthEncoder),

    /// transfer-encoding chunked payload
    Chunked(ChunkedEncoder),

    /// no payload; only the terminal marker is accepted
    Empty,
}

impl PayloadEncoder {
    pub fn new(size: PayloadSize) -> Self {
        let kind = match size {
            PayloadSize::Empty => Kind::Empty,
            PayloadSize::Length(length) => Kind::Length(LengthEncoder::new(length)),
            PayloadSize::Chunked => Kind::Chunked(ChunkedEncoder::new()),
        };
        Self { kind }
    }
}

impl Encoder<PayloadItem> for PayloadEncoder {
    type Error = EncodeError;

    fn encode(&mut self, item: PayloadItem, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match &mut self.kind {
            Kind::Length(length_encoder) => length_encoder.encode(item, dst),
            Kind::Chunked(chunked_encoder) => chunked_encoder.encode(item, dst),
            Kind::Empty => match item {
                PayloadItem::Chunk(_) => crate::codec::error::InvalidRequestSnafu {
                    message: "body chunk on a request declared empty",
                }
                .fail(),
                PayloadItem::Trailers(_) | PayloadItem::Eof => Ok(()),
            },
        }
    }
}
