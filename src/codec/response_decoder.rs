use bytes::BytesMut;
use http::Method;
use tokio_util::codec::Decoder;

use crate::codec::body::PayloadDecoder;
use crate::codec::error::UnexpectedEofSnafu;
use crate::codec::header::HeaderDecoder;
use crate::codec::DecodeError;
use crate::protocol::{Message, PayloadItem, ResponseHead};

/// Decodes one response after another: a head frame, then payload frames
/// ending in `Eof`.
///
/// [`ResponseDecoder::prepare`] must be called before each exchange so the
/// decoder knows whether a `HEAD` response (headers, no body) is coming.
pub struct ResponseDecoder {
    header_decoder: HeaderDecoder,
    payload_decoder: Option<PayloadDecoder>,
}

impl ResponseDecoder {
    pub fn new() -> Self {
        Self { header_decoder: HeaderDecoder::new(), payload_decoder: None }
    }

    pub fn prepare(&mut self, method: &Method) {
        self.header_decoder.set_head_request(*method == Method::HEAD);
    }

    /// True while payload frames of the current message are outstanding.
    pub fn in_message(&self) -> bool {
        self.payload_decoder.is_some()
    }

    /// True when the current body only ends with the transport close.
    pub fn reads_until_close(&self) -> bool {
        self.payload_decoder.as_ref().is_some_and(|d| d.is_until_close())
    }
}

impl Decoder for ResponseDecoder {
    type Item = Message<ResponseHead>;
    type Error = DecodeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // parse payload if have payload_decoder
        if let Some(payload_decoder) = &mut self.payload_decoder {
            let message = match payload_decoder.decode(src)? {
                Some(item @ PayloadItem::Eof) => {
                    // message complete, next frame is a head again
                    self.payload_decoder.take();
                    Some(Message::Payload(item))
                }
                // chunks and trailer frames pass straight through
                Some(item) => Some(Message::Payload(item)),
                None => None,
            };

            return Ok(message);
        }

        // parse response head
        let message = match self.header_decoder.decode(src)? {
            Some((head, payload_decoder)) => {
                self.payload_decoder = Some(payload_decoder);
                Some(Message::Head(head))
            }
            None => None,
        };

        Ok(message)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(payload_decoder) = &mut self.payload_decoder {
            let message = match payload_decoder.decode_eof(src)? {
                Some(item @ PayloadItem::Eof) => {
                    self.payload_decoder.take();
                    Some(Message::Payload(item))
                }
                Some(item) => Some(Message::Payload(item)),
                None => None,
            };

            return Ok(message);
        }

        if src.is_empty() {
            return Ok(None);
        }

        // the peer closed while a head was on the wire; see whether the
        // buffered bytes already form a complete one
        match self.decode(src)? {
            Some(message) => Ok(Some(message)),
            None => UnexpectedEofSnafu.fail(),
        }
    }
}
