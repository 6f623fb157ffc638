use bytes::BytesMut;
use tokio_util::codec::Encoder;

use crate::codec::body::PayloadEncoder;
use crate::codec::error::InvalidRequestSnafu;
use crate::codec::header::HeaderEncoder;
use crate::codec::EncodeError;
use crate::protocol::{Message, PayloadItem, PayloadSize, RequestHead};

/// Encodes one request after another: a head frame, then payload frames
/// ending in `Eof`.
pub struct RequestEncoder {
    header_encoder: HeaderEncoder,
    payload_encoder: Option<PayloadEncoder>,
}

impl RequestEncoder {
    pub fn new() -> Self {
        Self { header_encoder: HeaderEncoder, payload_encoder: None }
    }
}

impl Encoder<Message<(RequestHead, PayloadSize)>> for RequestEncoder {
    type Error = EncodeError;

    fn encode(&mut self, item: Message<(RequestHead, PayloadSize)>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Message::Head((head, payload_size)) => {
                if self.payload_encoder.is_some() {
                    return InvalidRequestSnafu { message: "previous request body is unfinished" }.fail();
                }
                self.header_encoder.encode((head, payload_size), dst)?;
                self.payload_encoder = Some(PayloadEncoder::new(payload_size));
                Ok(())
            }

            Message::Payload(payload_item) => match &mut self.payload_encoder {
                Some(payload_encoder) => {
                    let eof = payload_item.is_eof();
                    payload_encoder.encode(payload_item, dst)?;
                    if eof {
                        self.payload_encoder.take();
                    }
                    Ok(())
                }
                None => match payload_item {
                    // stray markers are harmless, body bytes are not
                    PayloadItem::Trailers(_) | PayloadItem::Eof => Ok(()),
                    PayloadItem::Chunk(_) => {
                        InvalidRequestSnafu { message: "body chunk without a request head" }.fail()
                    }
                },
            },
        }
    }
}
