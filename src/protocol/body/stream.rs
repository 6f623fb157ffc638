use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt, Shared};
use futures::Stream;
use http::HeaderMap;
use http_body::{Body, Frame};
use tokio::sync::{mpsc, oneshot};

use crate::error::ClientError;
use crate::protocol::PayloadItem;

/// One slot of the per-request body queue: a payload item, or the error
/// that terminated the body.
pub(crate) type BodyFrame = Result<PayloadItem, ClientError>;

/// The receiving side of a streamed message body.
///
/// Backed by a bounded channel filled by the connection driver; the driver
/// only decodes the next chunk once the previous one has been accepted, so
/// a slow consumer stalls the transport reads instead of buffering without
/// bound.
///
/// As a [`Stream`] it yields the data chunks and keeps any trailer headers
/// aside (see [`BodyStream::trailers`]); as an [`http_body::Body`] the
/// trailer section is delivered as a proper trailers frame.
pub struct BodyStream {
    rx: mpsc::Receiver<BodyFrame>,
    trailers: Option<HeaderMap>,
    done: bool,
}

impl BodyStream {
    pub(crate) fn new(rx: mpsc::Receiver<BodyFrame>) -> Self {
        Self { rx, trailers: None, done: false }
    }

    /// Trailer headers of a chunked message, present once the stream has
    /// reached its end.
    pub fn trailers(&self) -> Option<&HeaderMap> {
        self.trailers.as_ref()
    }

    fn terminated(&mut self) -> ClientError {
        // sender vanished without a terminal marker
        self.done = true;
        ClientError::body("body producer dropped before end of message")
    }
}

impl Stream for BodyStream {
    type Item = Result<Bytes, ClientError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if this.done {
                return Poll::Ready(None);
            }

            match ready!(this.rx.poll_recv(cx)) {
                Some(Ok(PayloadItem::Chunk(bytes))) => return Poll::Ready(Some(Ok(bytes))),
                Some(Ok(PayloadItem::Trailers(trailers))) => {
                    this.trailers = Some(trailers);
                }
                Some(Ok(PayloadItem::Eof)) => {
                    this.done = true;
                    return Poll::Ready(None);
                }
                Some(Err(e)) => {
                    this.done = true;
                    return Poll::Ready(Some(Err(e)));
                }
                None => {
                    let e = this.terminated();
                    return Poll::Ready(Some(Err(e)));
                }
            }
        }
    }
}

impl Body for BodyStream {
    type Data = Bytes;
    type Error = ClientError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }

        match ready!(this.rx.poll_recv(cx)) {
            Some(Ok(PayloadItem::Chunk(bytes))) => Poll::Ready(Some(Ok(Frame::data(bytes)))),
            Some(Ok(PayloadItem::Trailers(trailers))) => {
                this.trailers = Some(trailers.clone());
                Poll::Ready(Some(Ok(Frame::trailers(trailers))))
            }
            Some(Ok(PayloadItem::Eof)) => {
                this.done = true;
                Poll::Ready(None)
            }
            Some(Err(e)) => {
                this.done = true;
                Poll::Ready(Some(Err(e)))
            }
            None => {
                let e = this.terminated();
                Poll::Ready(Some(Err(e)))
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.done
    }
}

/// The release edge of a request/response exchange.
///
/// Resolves when the connection has delivered the terminal body marker and
/// went back to the pool, or when the connection was destroyed. Cloneable;
/// every clone observes the same one-shot edge.
#[derive(Clone)]
pub struct Released {
    shared: Shared<BoxFuture<'static, ()>>,
}

impl Released {
    pub(crate) fn new(rx: oneshot::Receiver<()>) -> Self {
        // a dropped sender resolves the edge too: destroyed counts as released
        let fut = async move {
            let _ = rx.await;
        };
        Self { shared: fut.boxed().shared() }
    }

    pub async fn wait(&self) {
        self.shared.clone().await
    }
}
