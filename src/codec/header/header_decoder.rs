use bytes::{Buf, BytesMut};
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode, Version};
use httparse::{Error, Status};
use snafu::ensure;
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::codec::body::PayloadDecoder;
use crate::codec::error::{InvalidMessageSnafu, TooLargeHeaderSnafu};
use crate::codec::DecodeError;
use crate::codec::DecodeError::{InvalidContentLength, InvalidHeader, TooManyHeaders};
use crate::protocol::ResponseHead;

const MAX_HEADER_NUM: usize = 64;
const MAX_HEADER_BYTES: usize = 8 * 1024;

/// Decodes a response head and decides how the following body is framed.
///
/// The decoder has to know whether the in-flight request was a `HEAD`:
/// such responses carry framing headers but no body.
pub struct HeaderDecoder {
    head_request: bool,
}

impl HeaderDecoder {
    pub fn new() -> Self {
        Self { head_request: false }
    }

    pub fn set_head_request(&mut self, head_request: bool) {
        self.head_request = head_request;
    }
}

impl Decoder for HeaderDecoder {
    type Item = (ResponseHead, PayloadDecoder);
    type Error = DecodeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADER_NUM];
        let mut resp = httparse::Response::new(&mut headers);

        let parsed_result = resp.parse(src.as_ref()).map_err(|e| match e {
            Error::TooManyHeaders => TooManyHeaders { max_num: MAX_HEADER_NUM, source: e },
            _ => InvalidHeader { source: e },
        });

        match parsed_result? {
            Status::Complete(body_offset) => {
                trace!(head_size = body_offset, "parsed response head");
                ensure!(
                    body_offset <= MAX_HEADER_BYTES,
                    TooLargeHeaderSnafu { current_size: body_offset, max_size: MAX_HEADER_BYTES }
                );

                let head = into_response_head(resp)?;
                let payload_decoder = parse_payload(&head, self.head_request)?;

                src.advance(body_offset);
                Ok(Some((head, payload_decoder)))
            }
            Status::Partial => {
                ensure!(
                    src.len() <= MAX_HEADER_BYTES,
                    TooLargeHeaderSnafu { current_size: src.len(), max_size: MAX_HEADER_BYTES }
                );
                Ok(None)
            }
        }
    }
}

fn into_response_head(resp: httparse::Response) -> Result<ResponseHead, DecodeError> {
    let code = resp.code.ok_or_else(|| InvalidMessageSnafu { message: "missing status code" }.build())?;
    let status = StatusCode::from_u16(code)
        .map_err(|_| InvalidMessageSnafu { message: format!("invalid status code {code}") }.build())?;

    let version = match resp.version {
        Some(0) => Version::HTTP_10,
        Some(1) => Version::HTTP_11,
        v => return InvalidMessageSnafu { message: format!("unsupported http version {v:?}") }.fail(),
    };

    let mut headers = HeaderMap::with_capacity(resp.headers.len());
    for header in resp.headers.iter() {
        let name = HeaderName::from_bytes(header.name.as_bytes())
            .map_err(|_| InvalidMessageSnafu { message: format!("invalid header name {}", header.name) }.build())?;
        let value = HeaderValue::from_bytes(header.value)
            .map_err(|_| InvalidMessageSnafu { message: format!("invalid value of header {}", header.name) }.build())?;
        headers.append(name, value);
    }

    Ok(ResponseHead::new(status, version, headers))
}

/// Body framing rules of RFC 7230 §3.3.3, seen from the client side.
fn parse_payload(head: &ResponseHead, head_request: bool) -> Result<PayloadDecoder, DecodeError> {
    if head_request
        || head.status().is_informational()
        || head.status() == StatusCode::NO_CONTENT
        || head.status() == StatusCode::NOT_MODIFIED
    {
        return Ok(PayloadDecoder::empty());
    }

    let te_header = head.headers().get(http::header::TRANSFER_ENCODING);
    let cl_header = head.headers().get(http::header::CONTENT_LENGTH);

    match (te_header, cl_header) {
        // no framing headers: the body runs until the peer closes
        (None, None) => Ok(PayloadDecoder::until_close()),

        (te_value @ Some(_), None) => {
            if is_chunked(te_value) {
                Ok(PayloadDecoder::chunked())
            } else {
                Ok(PayloadDecoder::until_close())
            }
        }

        (None, Some(cl_value)) => {
            let cl_str = cl_value.to_str().map_err(|_| InvalidContentLength { message: "can't to_str".into() })?;

            let length = cl_str.trim().parse::<u64>().map_err(|_| InvalidContentLength { message: cl_str.into() })?;

            Ok(PayloadDecoder::fix_length(length))
        }

        (Some(_), Some(_)) => {
            Err(InvalidContentLength { message: "transfer_encoding and content_length both present in headers".into() })
        }
    }
}

fn is_chunked(header_value: Option<&HeaderValue>) -> bool {
    header_value
        .and_then(|value| value.to_str().ok())
        .and_then(|encodings| encodings.rsplit(',').next())
        .map(|last_encoding| last_encoding.trim() == "chunked")
        .unwrap_or(false)
}
