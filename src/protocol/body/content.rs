use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use http::header::{self, HeaderValue};
use http::HeaderMap;

use crate::error::ClientError;
use crate::protocol::body::BodyStream;
use crate::protocol::PayloadSize;

/// A lazy, finite, single-shot byte sequence plus the headers that describe
/// it (`Content-Type`, `Content-Length`, `Transfer-Encoding`).
///
/// Consuming the sequence a second time fails with
/// [`ClientError::StreamAlreadyConsumed`].
pub struct Content {
    headers: HeaderMap,
    kind: Option<ContentKind>,
}

enum ContentKind {
    Empty,
    Full(Bytes),
    /// Response download fed by a connection driver.
    Streamed(BodyStream),
    /// Caller-supplied upload source of unknown length.
    Source(BoxStream<'static, Bytes>),
}

impl Content {
    /// The distinguished zero-length value.
    pub fn empty() -> Self {
        Self { headers: HeaderMap::new(), kind: Some(ContentKind::Empty) }
    }

    /// A fully buffered value; sets `Content-Length`.
    pub fn full(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(bytes.len()));
        Self { headers, kind: Some(ContentKind::Full(bytes)) }
    }

    /// A fully buffered value with a `Content-Type`.
    pub fn full_with_type(bytes: impl Into<Bytes>, content_type: HeaderValue) -> Self {
        let mut content = Self::full(bytes);
        content.headers.insert(header::CONTENT_TYPE, content_type);
        content
    }

    /// An upload source of unknown length; sent with
    /// `Transfer-Encoding: chunked`.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Bytes> + Send + 'static,
    {
        let mut headers = HeaderMap::new();
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        Self { headers, kind: Some(ContentKind::Source(stream.boxed())) }
    }

    pub(crate) fn streamed(headers: HeaderMap, body: BodyStream) -> Self {
        Self { headers, kind: Some(ContentKind::Streamed(body)) }
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// True for the distinguished empty value (and only before consumption).
    pub fn is_empty(&self) -> bool {
        matches!(self.kind, Some(ContentKind::Empty))
    }

    pub fn is_consumed(&self) -> bool {
        self.kind.is_none()
    }

    /// How the value frames on the wire when used as an upload.
    pub(crate) fn payload_size(&self) -> PayloadSize {
        match &self.kind {
            Some(ContentKind::Empty) | None => PayloadSize::Empty,
            Some(ContentKind::Full(bytes)) if bytes.is_empty() => PayloadSize::Empty,
            Some(ContentKind::Full(bytes)) => PayloadSize::Length(bytes.len() as u64),
            Some(ContentKind::Streamed(_)) | Some(ContentKind::Source(_)) => PayloadSize::Chunked,
        }
    }

    /// Consume the sequence. The one and only read of this value.
    pub fn stream(&mut self) -> Result<ContentStream, ClientError> {
        match self.kind.take() {
            Some(ContentKind::Empty) => Ok(ContentStream { kind: StreamKind::Empty }),
            Some(ContentKind::Full(bytes)) => Ok(ContentStream { kind: StreamKind::Once(Some(bytes)) }),
            Some(ContentKind::Streamed(body)) => Ok(ContentStream { kind: StreamKind::Body(body) }),
            Some(ContentKind::Source(source)) => Ok(ContentStream { kind: StreamKind::Source(source) }),
            None => Err(ClientError::StreamAlreadyConsumed),
        }
    }

    /// Consume the sequence and collect it into one buffer.
    pub async fn bytes(&mut self) -> Result<Bytes, ClientError> {
        let mut stream = self.stream()?;
        let mut collected = BytesMut::new();
        while let Some(chunk) = stream.next().await {
            collected.extend_from_slice(&chunk?[..]);
        }
        Ok(collected.freeze())
    }

    /// Consume the sequence and discard it to the end. A no-op when the
    /// sequence was consumed already.
    pub async fn drain(&mut self) -> Result<(), ClientError> {
        let mut stream = match self.stream() {
            Ok(stream) => stream,
            Err(ClientError::StreamAlreadyConsumed) => return Ok(()),
            Err(e) => return Err(e),
        };
        while let Some(chunk) = stream.next().await {
            chunk?;
        }
        Ok(())
    }
}

/// The consumed view of a [`Content`], yielding body chunks in arrival
/// order.
pub struct ContentStream {
    kind: StreamKind,
}

enum StreamKind {
    Empty,
    Once(Option<Bytes>),
    Body(BodyStream),
    Source(BoxStream<'static, Bytes>),
}

impl ContentStream {
    /// Trailer headers of a chunked message, present once the stream has
    /// been read to its end.
    pub fn trailers(&self) -> Option<&HeaderMap> {
        match &self.kind {
            StreamKind::Body(body) => body.trailers(),
            _ => None,
        }
    }
}

impl Stream for ContentStream {
    type Item = Result<Bytes, ClientError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match &mut self.get_mut().kind {
            StreamKind::Empty => Poll::Ready(None),
            StreamKind::Once(bytes) => Poll::Ready(bytes.take().map(Ok)),
            StreamKind::Body(body) => body.poll_next_unpin(cx),
            StreamKind::Source(source) => match futures::ready!(source.poll_next_unpin(cx)) {
                Some(bytes) => Poll::Ready(Some(Ok(bytes))),
                None => Poll::Ready(None),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn full_content_sets_length_and_collects() {
        let mut content = Content::full("hello");
        assert_eq!(
            content.headers().get(header::CONTENT_LENGTH),
            Some(&HeaderValue::from_static("5"))
        );
        assert_eq!(content.payload_size(), PayloadSize::Length(5));
        assert_eq!(content.bytes().await.unwrap(), Bytes::from_static(b"hello"));
    }

    #[tokio::test]
    async fn second_read_fails() {
        let mut content = Content::full("hello");
        content.stream().unwrap();
        assert!(matches!(content.stream(), Err(ClientError::StreamAlreadyConsumed)));
        assert!(matches!(content.bytes().await, Err(ClientError::StreamAlreadyConsumed)));
    }

    #[tokio::test]
    async fn empty_is_distinguished_and_one_shot() {
        let mut content = Content::empty();
        assert!(content.is_empty());
        assert_eq!(content.payload_size(), PayloadSize::Empty);
        assert_eq!(content.bytes().await.unwrap(), Bytes::new());
        assert!(matches!(content.stream(), Err(ClientError::StreamAlreadyConsumed)));
    }

    #[tokio::test]
    async fn drain_tolerates_consumed_content() {
        let mut content = Content::full("x");
        content.drain().await.unwrap();
        content.drain().await.unwrap();
    }

    #[test]
    fn stream_source_is_chunked() {
        let content = Content::from_stream(futures::stream::iter(vec![Bytes::from_static(b"a")]));
        assert_eq!(content.payload_size(), PayloadSize::Chunked);
        assert_eq!(
            content.headers().get(header::TRANSFER_ENCODING),
            Some(&HeaderValue::from_static("chunked"))
        );
    }
}
