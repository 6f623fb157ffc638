use std::cmp;

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::codec::body::{ChunkedDecoder, UntilCloseDecoder};
use crate::codec::error::BodySnafu;
use crate::codec::DecodeError;
use crate::protocol::PayloadItem;

/// Decodes the payload of one response message.
///
/// A sized body is a plain countdown held right here; the byte-accounting
/// makes a truncated message report exactly how much was still owed.
pub struct PayloadDecoder {
    kind: Kind,
}

enum Kind {
    /// content-length payload: `remaining` of `total` bytes still expected
    Length { remaining: u64, total: u64 },

    /// transfer-encoding chunked payload
    Chunked(ChunkedDecoder),

    /// unframed payload, terminated by the transport close
    UntilClose(UntilCloseDecoder),
}

impl PayloadDecoder {
    /// create an empty `PayloadDecoder`
    pub fn empty() -> Self {
        Self::fix_length(0)
    }

    /// create a chunked `PayloadDecoder`
    pub fn chunked() -> Self {
        Self { kind: Kind::Chunked(ChunkedDecoder::new()) }
    }

    /// create a fixed length `PayloadDecoder`
    pub fn fix_length(length: u64) -> Self {
        Self { kind: Kind::Length { remaining: length, total: length } }
    }

    /// create a read-until-close `PayloadDecoder`
    pub fn until_close() -> Self {
        Self { kind: Kind::UntilClose(UntilCloseDecoder::new()) }
    }

    pub fn is_empty(&self) -> bool {
        matches!(&self.kind, Kind::Length { total: 0, .. })
    }

    /// True when the decoder keeps reading until the peer closes; such a
    /// connection can never go back to the pool.
    pub fn is_until_close(&self) -> bool {
        matches!(&self.kind, Kind::UntilClose(_))
    }
}

impl Decoder for PayloadDecoder {
    type Item = PayloadItem;
    type Error = DecodeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match &mut self.kind {
            Kind::Length { remaining, .. } => {
                if *remaining == 0 {
                    return Ok(Some(PayloadItem::Eof));
                }
                if src.is_empty() {
                    return Ok(None);
                }

                let take = cmp::min(*remaining, src.len() as u64) as usize;
                let bytes = src.split_to(take).freeze();
                *remaining -= bytes.len() as u64;
                Ok(Some(PayloadItem::Chunk(bytes)))
            }
            Kind::Chunked(chunked_decoder) => chunked_decoder.decode(src),
            Kind::UntilClose(until_close_decoder) => until_close_decoder.decode(src),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match &mut self.kind {
            Kind::Length { remaining, total } => {
                if *remaining > 0 {
                    return BodySnafu {
                        message: format!("connection closed with {remaining} of {total} body bytes outstanding"),
                    }
                    .fail();
                }
                Ok(Some(PayloadItem::Eof))
            }
            Kind::Chunked(chunked_decoder) => {
                if chunked_decoder.is_finished() {
                    chunked_decoder.decode(src)
                } else {
                    BodySnafu { message: "connection closed in the middle of a chunked body" }.fail()
                }
            }
            Kind::UntilClose(until_close_decoder) => until_close_decoder.decode_eof(src),
        }
    }
}
