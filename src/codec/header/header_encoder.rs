use bytes::{BufMut, BytesMut};
use http::{header, HeaderValue, Method};
use tokio_util::codec::Encoder;
use tracing::trace;

use crate::codec::EncodeError;
use crate::protocol::{PayloadSize, RequestHead};

/// Serializes a request head: request line with `path[?query]` as the
/// request-target, then the headers in map order.
///
/// Framing headers are completed from the payload size when the caller did
/// not set them; caller-provided values are left untouched.
pub struct HeaderEncoder;

impl Encoder<(RequestHead, PayloadSize)> for HeaderEncoder {
    type Error = EncodeError;

    fn encode(&mut self, item: (RequestHead, PayloadSize), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (mut head, payload_size) = item;

        dst.put_slice(head.method().as_str().as_bytes());
        dst.put_slice(b" ");
        if head.path().is_empty() {
            dst.put_slice(b"/");
        } else {
            dst.put_slice(head.path().as_bytes());
        }
        if let Some(query) = head.query() {
            dst.put_slice(b"?");
            dst.put_slice(query.as_bytes());
        }
        dst.put_slice(b" HTTP/1.1\r\n");

        complete_framing_headers(&mut head, payload_size);

        for (header_name, header_value) in head.headers().iter() {
            dst.put_slice(header_name.as_str().as_bytes());
            dst.put_slice(b": ");
            dst.put_slice(header_value.as_bytes());
            dst.put_slice(b"\r\n");
        }
        dst.put_slice(b"\r\n");

        trace!(method = %head.method(), path = head.path(), "encoded request head");
        Ok(())
    }
}

fn complete_framing_headers(head: &mut RequestHead, payload_size: PayloadSize) {
    match payload_size {
        PayloadSize::Length(length) => {
            if !head.headers().contains_key(header::CONTENT_LENGTH) {
                head.headers_mut().insert(header::CONTENT_LENGTH, HeaderValue::from(length));
            }
        }
        PayloadSize::Chunked => {
            if !head.headers().contains_key(header::TRANSFER_ENCODING) {
                head.headers_mut().insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
            }
        }
        PayloadSize::Empty => {
            // only methods that usually carry a body get an explicit zero
            if method_expects_body(head.method())
                && !head.headers().contains_key(header::CONTENT_LENGTH)
                && !head.headers().contains_key(header::TRANSFER_ENCODING)
            {
                head.headers_mut().insert(header::CONTENT_LENGTH, HeaderValue::from_static("0"));
            }
        }
    }
}

fn method_expects_body(method: &Method) -> bool {
    *method == Method::POST || *method == Method::PUT || *method == Method::PATCH
}

#[cfg(test)]
mod tests {
    use http::header::HeaderName;

    use super::*;

    fn encode(head: RequestHead, size: PayloadSize) -> String {
        let mut dst = BytesMut::new();
        HeaderEncoder.encode((head, size), &mut dst).unwrap();
        String::from_utf8(dst.to_vec()).unwrap()
    }

    #[test]
    fn request_line_with_query() {
        let mut head = RequestHead::new(Method::GET, "/index");
        head.set_query("a=1&b=2");
        head.headers_mut().insert(header::HOST, HeaderValue::from_static("example.com"));

        let encoded = encode(head, PayloadSize::Empty);

        assert!(encoded.starts_with("GET /index?a=1&b=2 HTTP/1.1\r\n"));
        assert!(encoded.contains("host: example.com\r\n"));
        assert!(encoded.ends_with("\r\n\r\n"));
        assert!(!encoded.contains("content-length"));
    }

    #[test]
    fn sized_post_gets_content_length() {
        let head = RequestHead::new(Method::POST, "/upload");
        let encoded = encode(head, PayloadSize::Length(11));
        assert!(encoded.contains("content-length: 11\r\n"));
    }

    #[test]
    fn caller_content_length_wins() {
        let mut head = RequestHead::new(Method::POST, "/upload");
        head.headers_mut().insert(header::CONTENT_LENGTH, HeaderValue::from_static("11"));
        let encoded = encode(head, PayloadSize::Length(11));
        assert_eq!(encoded.matches("content-length").count(), 1);
    }

    #[test]
    fn empty_post_is_zero_sized() {
        let head = RequestHead::new(Method::POST, "/submit");
        let encoded = encode(head, PayloadSize::Empty);
        assert!(encoded.contains("content-length: 0\r\n"));
    }

    #[test]
    fn chunked_upload_declares_transfer_encoding() {
        let head = RequestHead::new(Method::PUT, "/stream");
        let encoded = encode(head, PayloadSize::Chunked);
        assert!(encoded.contains("transfer-encoding: chunked\r\n"));
    }

    #[test]
    fn repeated_headers_are_all_written() {
        let mut head = RequestHead::new(Method::GET, "/");
        let name = HeaderName::from_static("accept");
        head.headers_mut().append(&name, HeaderValue::from_static("text/html"));
        head.headers_mut().append(&name, HeaderValue::from_static("application/json"));

        let encoded = encode(head, PayloadSize::Empty);
        assert!(encoded.contains("accept: text/html\r\n"));
        assert!(encoded.contains("accept: application/json\r\n"));
    }
}
