use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use bytes::BytesMut;
use futures::{SinkExt, StreamExt};
use http::{header, HeaderMap, Method, StatusCode};
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, trace, warn};

use crate::client::pool::PoolShared;
use crate::codec::{EncodeError, RequestEncoder, ResponseDecoder};
use crate::error::ClientError;
use crate::protocol::body::{BodyFrame, BodyStream, Content, ContentStream, Released, UpgradeSlot};
use crate::protocol::{Message, PayloadItem, PayloadSize, Request, RequestHead, Response, ResponseHead};
use crate::transport::Transport;

const READ_BUFFER_SIZE: usize = 8 * 1024;

// process-wide, survives any pool teardown; diagnostics only
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Handle to one pooled connection. At most one request is in flight at any
/// time; the `in_flight` counter asserts it.
pub(crate) struct Conn {
    id: u64,
    in_flight: AtomicUsize,
    upgraded: AtomicBool,
    open: AtomicBool,
    cmd_tx: mpsc::Sender<Exchange>,
    cancel_tx: watch::Sender<bool>,
}

struct Exchange {
    head: RequestHead,
    content: Content,
    reply: oneshot::Sender<Result<Response, ClientError>>,
}

impl Conn {
    /// Build the handle and its driver. The caller registers the handle
    /// first and then spawns [`Driver::run`], so a dying driver always finds
    /// itself registered when it reports back.
    pub(crate) fn new(transport: Transport, pool: Weak<PoolShared>, body_capacity: usize) -> (Arc<Conn>, Driver) {
        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        let (cmd_tx, cmd_rx) = mpsc::channel(1);
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let conn = Arc::new(Conn {
            id,
            in_flight: AtomicUsize::new(0),
            upgraded: AtomicBool::new(false),
            open: AtomicBool::new(true),
            cmd_tx,
            cancel_tx,
        });

        let (read_half, write_half) = tokio::io::split(transport);
        let driver = Driver {
            conn: conn.clone(),
            framed_read: FramedRead::with_capacity(read_half, ResponseDecoder::new(), READ_BUFFER_SIZE),
            framed_write: FramedWrite::new(write_half, RequestEncoder::new()),
            cmd_rx,
            cancel_rx,
            pool,
            body_capacity,
        };

        (conn, driver)
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    pub(crate) fn is_upgraded(&self) -> bool {
        self.upgraded.load(Ordering::Acquire)
    }

    /// Ask the driver to close the transport. In-flight work fails with
    /// [`ClientError::ClientAlreadyClosed`].
    pub(crate) fn close(&self) {
        let _ = self.cancel_tx.send(true);
    }

    /// Drive one request through the connection and hand back the response
    /// once its head arrived.
    pub(crate) async fn send(&self, request: Request) -> Result<Response, ClientError> {
        if request.content_ref().is_consumed() {
            return Err(ClientError::StreamAlreadyConsumed);
        }

        if self.in_flight.compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire).is_err() {
            self.close();
            return Err(ClientError::fatal("connection dispatched while a request is in flight"));
        }

        let (head, content) = request.into_parts();
        let (reply_tx, reply_rx) = oneshot::channel();

        if self.cmd_tx.send(Exchange { head, content, reply: reply_tx }).await.is_err() {
            return Err(ClientError::ConnectionClosed);
        }

        match reply_rx.await {
            Ok(result) => result,
            Err(_) => Err(ClientError::ConnectionClosed),
        }
    }
}

enum Outcome {
    /// Exchange finished cleanly, the connection may serve the next one.
    Reuse,
    /// The transport is no longer usable (error, `Connection: close`,
    /// upgrade); tear it down.
    Close,
}

/// Owns the transport halves and the codec state of one connection. All
/// codec mutation happens on this task; callers talk to it through the
/// exchange channel.
pub(crate) struct Driver {
    conn: Arc<Conn>,
    framed_read: FramedRead<ReadHalf<Transport>, ResponseDecoder>,
    framed_write: FramedWrite<WriteHalf<Transport>, RequestEncoder>,
    cmd_rx: mpsc::Receiver<Exchange>,
    cancel_rx: watch::Receiver<bool>,
    pool: Weak<PoolShared>,
    body_capacity: usize,
}

impl Driver {
    pub(crate) async fn run(mut self) {
        debug!(conn_id = self.conn.id, "connection driver started");

        loop {
            let exchange = tokio::select! {
                biased;
                _ = self.cancel_rx.changed() => break,
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(exchange) => exchange,
                    // every handle is gone, nothing can dispatch anymore
                    None => break,
                },
                frame = self.framed_read.next() => {
                    match frame {
                        None => debug!(conn_id = self.conn.id, "peer closed idle connection"),
                        Some(Ok(_)) => warn!(conn_id = self.conn.id, "unsolicited frame on idle connection"),
                        Some(Err(e)) => warn!(conn_id = self.conn.id, cause = %e, "idle connection failed"),
                    }
                    break;
                }
            };

            match self.exchange(exchange).await {
                Outcome::Reuse => continue,
                Outcome::Close => break,
            }
        }

        self.shutdown().await;
    }

    async fn shutdown(self) {
        self.conn.open.store(false, Ordering::Release);

        let mut write_half = self.framed_write.into_inner();
        let _ = write_half.shutdown().await;

        if let Some(pool) = self.pool.upgrade() {
            pool.destroy(self.conn.id);
        }
        debug!(conn_id = self.conn.id, "connection closed");
    }

    async fn exchange(&mut self, exchange: Exchange) -> Outcome {
        let Exchange { head, mut content, reply } = exchange;

        if !self.framed_read.read_buffer().is_empty() {
            let _ = reply.send(Err(ClientError::fatal("unsolicited bytes before the request was sent")));
            return Outcome::Close;
        }

        let payload_size = content.payload_size();
        let content_headers = std::mem::take(content.headers_mut());
        let upload = match content.stream() {
            Ok(upload) => upload,
            // `send` checks before dispatching, this cannot be reached
            Err(_) => {
                let _ = reply.send(Err(ClientError::fatal("request content consumed before dispatch")));
                return Outcome::Close;
            }
        };

        let method = head.method().clone();
        let merged = merge_headers(head, content_headers);
        let request_close = wants_close(merged.headers());

        trace!(conn_id = self.conn.id, method = %method, path = merged.path(), "dispatching request");

        if let Err(e) = self.write_request(merged, payload_size, upload).await {
            let _ = reply.send(Err(e));
            return Outcome::Close;
        }

        let response_head = match self.read_response_head(&method).await {
            Ok(head) => head,
            Err(e) => {
                let _ = reply.send(Err(e));
                return Outcome::Close;
            }
        };

        if response_head.status() == StatusCode::SWITCHING_PROTOCOLS {
            self.conn.upgraded.store(true, Ordering::Release);
            self.serve_upgraded(response_head, reply).await;
            return Outcome::Close;
        }

        let response_close = wants_close(response_head.headers()) || self.framed_read.decoder().reads_until_close();

        let (body_tx, body_rx) = mpsc::channel::<BodyFrame>(self.body_capacity);
        let (release_tx, release_rx) = oneshot::channel();

        let content = Content::streamed(content_headers_of(&response_head), BodyStream::new(body_rx));
        let status = response_head.status();
        let response = Response::new(response_head, content, None, Released::new(release_rx), self.conn.id);

        // a caller that gave up still leaves a body on the wire to drain
        let mut discard = reply.send(Ok(response)).is_err();

        trace!(conn_id = self.conn.id, status = %status, discard, "response head delivered");

        loop {
            let frame = tokio::select! {
                biased;
                _ = self.cancel_rx.changed() => {
                    let _ = body_tx.try_send(Err(ClientError::ClientAlreadyClosed));
                    return Outcome::Close;
                }
                frame = self.framed_read.next() => frame,
            };

            match frame {
                Some(Ok(Message::Payload(PayloadItem::Eof))) => {
                    if !discard {
                        let _ = self.enqueue(&body_tx, PayloadItem::Eof).await;
                    }
                    break;
                }
                // data chunks and a possible trailer frame, in arrival order
                Some(Ok(Message::Payload(item))) => {
                    if !discard {
                        match self.enqueue(&body_tx, item).await {
                            Ok(true) => {}
                            Ok(false) => discard = true,
                            Err(()) => return Outcome::Close,
                        }
                    }
                }
                Some(Ok(Message::Head(_))) => {
                    let _ = body_tx.try_send(Err(ClientError::fatal("response head in the middle of a body")));
                    return Outcome::Close;
                }
                Some(Err(e)) => {
                    let _ = body_tx.try_send(Err(e.into()));
                    return Outcome::Close;
                }
                None => {
                    let _ = body_tx.try_send(Err(ClientError::body("connection closed before end of message")));
                    return Outcome::Close;
                }
            }
        }

        // the exchange is complete: clear the guard, hand the connection
        // back, and only then raise the release edge so an observer of the
        // edge finds the connection already in rotation
        self.conn.in_flight.store(0, Ordering::Release);

        let outcome = if request_close || response_close {
            trace!(conn_id = self.conn.id, "connection close requested, not pooling");
            Outcome::Close
        } else {
            match self.pool.upgrade() {
                Some(pool) => {
                    pool.release(self.conn.clone());
                    Outcome::Reuse
                }
                None => Outcome::Close,
            }
        };

        let _ = release_tx.send(());
        outcome
    }

    /// Serialize head and body. The next transport read is only requested
    /// once this completed.
    async fn write_request(
        &mut self,
        head: RequestHead,
        payload_size: PayloadSize,
        mut upload: ContentStream,
    ) -> Result<(), ClientError> {
        self.framed_write.send(Message::request(head, payload_size)).await.map_err(write_error)?;

        loop {
            let chunk = tokio::select! {
                biased;
                _ = self.cancel_rx.changed() => return Err(ClientError::ClientAlreadyClosed),
                chunk = upload.next() => chunk,
            };

            match chunk {
                Some(Ok(bytes)) => {
                    self.framed_write.send(Message::Payload(PayloadItem::Chunk(bytes))).await.map_err(write_error)?;
                }
                Some(Err(e)) => return Err(e),
                None => {
                    self.framed_write.send(Message::Payload(PayloadItem::Eof)).await.map_err(write_error)?;
                    return Ok(());
                }
            }
        }
    }

    async fn read_response_head(&mut self, method: &Method) -> Result<ResponseHead, ClientError> {
        self.framed_read.decoder_mut().prepare(method);

        let frame = tokio::select! {
            biased;
            _ = self.cancel_rx.changed() => return Err(ClientError::ClientAlreadyClosed),
            frame = self.framed_read.next() => frame,
        };

        match frame {
            Some(Ok(Message::Head(head))) => Ok(head),
            Some(Ok(Message::Payload(_))) => Err(ClientError::fatal("payload frame before a response head")),
            // a close with a half-written head is still "closed before the
            // response arrived" from the caller's point of view
            Some(Err(crate::codec::DecodeError::UnexpectedEof)) => Err(ClientError::ConnectionClosed),
            Some(Err(e)) => Err(e.into()),
            None => Err(ClientError::ConnectionClosed),
        }
    }

    /// Returns `Ok(false)` when the consumer abandoned the body and
    /// `Err(())` on cancellation.
    async fn enqueue(&mut self, body_tx: &mpsc::Sender<BodyFrame>, item: PayloadItem) -> Result<bool, ()> {
        tokio::select! {
            biased;
            _ = self.cancel_rx.changed() => Err(()),
            sent = body_tx.send(Ok(item)) => Ok(sent.is_ok()),
        }
    }

    /// Raw byte mode after a `101`: the codec is out of the picture, inbound
    /// buffers go to the downstream queue, the upstream queue goes to the
    /// write half. Ends with the transport.
    async fn serve_upgraded(&mut self, head: ResponseHead, reply: oneshot::Sender<Result<Response, ClientError>>) {
        debug!(conn_id = self.conn.id, "switching protocols, leaving http mode");

        let (body_tx, body_rx) = mpsc::channel::<BodyFrame>(self.body_capacity);
        let (write_tx, mut write_rx) = mpsc::channel(self.body_capacity);
        let (close_tx, mut close_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();

        let slot = UpgradeSlot { write_tx, rx: body_rx, close_tx };
        let response = Response::new(head, Content::empty(), Some(slot), Released::new(release_rx), self.conn.id);

        if reply.send(Ok(response)).is_err() {
            return;
        }

        // bytes the head parser already buffered belong to the new protocol
        let leftover = self.framed_read.read_buffer_mut().split().freeze();
        if !leftover.is_empty() {
            match self.enqueue(&body_tx, PayloadItem::Chunk(leftover)).await {
                Ok(true) => {}
                Ok(false) | Err(()) => return,
            }
        }

        let reader = self.framed_read.get_mut();
        let writer = self.framed_write.get_mut();
        let mut read_buf = BytesMut::with_capacity(READ_BUFFER_SIZE);
        let mut upstream_open = true;

        loop {
            tokio::select! {
                biased;
                _ = self.cancel_rx.changed() => break,
                // the downstream side was dropped (or closed explicitly)
                _ = &mut close_rx => break,
                result = reader.read_buf(&mut read_buf) => match result {
                    Ok(0) => {
                        // a full queue is fine: the closing sender signals
                        // end of stream just as well as the marker would
                        let _ = body_tx.try_send(Ok(PayloadItem::Eof));
                        break;
                    }
                    Ok(_) => {
                        let chunk = read_buf.split().freeze();
                        let delivered = tokio::select! {
                            biased;
                            _ = self.cancel_rx.changed() => false,
                            sent = body_tx.send(Ok(PayloadItem::Chunk(chunk))) => sent.is_ok(),
                        };
                        if !delivered {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = body_tx.try_send(Err(ClientError::body(format!("upgraded read failed: {e}"))));
                        break;
                    }
                },
                message = write_rx.recv(), if upstream_open => match message {
                    Some(bytes) => {
                        let written: io::Result<()> = async {
                            writer.write_all(&bytes).await?;
                            writer.flush().await
                        }
                        .await;
                        if let Err(e) = written {
                            warn!(conn_id = self.conn.id, cause = %e, "upgraded write failed");
                            break;
                        }
                    }
                    None => upstream_open = false,
                },
            }
        }
        // dropping `release_tx` resolves the release edge: destroyed counts
        drop(release_tx);
    }
}

/// Content headers first, request headers after; the request side wins on
/// a duplicate name so callers can override `Content-Type` and friends.
fn merge_headers(mut head: RequestHead, content_headers: HeaderMap) -> RequestHead {
    if content_headers.is_empty() {
        return head;
    }

    let request_headers = std::mem::take(head.headers_mut());
    let mut merged = content_headers;
    for name in request_headers.keys() {
        merged.remove(name);
    }
    for (name, value) in request_headers.iter() {
        merged.append(name, value.clone());
    }

    *head.headers_mut() = merged;
    head
}

fn wants_close(headers: &HeaderMap) -> bool {
    headers.get_all(header::CONNECTION).iter().any(|value| {
        value
            .to_str()
            .map(|tokens| tokens.split(',').any(|token| token.trim().eq_ignore_ascii_case("close")))
            .unwrap_or(false)
    })
}

/// The body-describing subset of the response headers, carried on the
/// response content.
fn content_headers_of(head: &ResponseHead) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for name in [header::CONTENT_TYPE, header::CONTENT_LENGTH, header::TRANSFER_ENCODING] {
        for value in head.headers().get_all(&name) {
            headers.append(name.clone(), value.clone());
        }
    }
    headers
}

fn write_error(e: EncodeError) -> ClientError {
    match e {
        EncodeError::Io { source } => ClientError::write(source),
        other => ClientError::write(io::Error::other(other)),
    }
}

#[cfg(test)]
mod tests {
    use http::HeaderValue;

    use super::*;

    #[test]
    fn merge_prefers_request_headers() {
        let mut head = RequestHead::new(Method::POST, "/");
        head.headers_mut().insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        head.headers_mut().insert(header::HOST, HeaderValue::from_static("example.com"));

        let mut content_headers = HeaderMap::new();
        content_headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        content_headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("2"));

        let merged = merge_headers(head, content_headers);

        assert_eq!(merged.headers().get(header::CONTENT_TYPE), Some(&HeaderValue::from_static("application/json")));
        assert_eq!(merged.headers().get(header::CONTENT_LENGTH), Some(&HeaderValue::from_static("2")));
        assert_eq!(merged.headers().get(header::HOST), Some(&HeaderValue::from_static("example.com")));
    }

    #[test]
    fn connection_close_detection() {
        let mut headers = HeaderMap::new();
        assert!(!wants_close(&headers));

        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        assert!(!wants_close(&headers));

        headers.insert(header::CONNECTION, HeaderValue::from_static("Close"));
        assert!(wants_close(&headers));

        headers.insert(header::CONNECTION, HeaderValue::from_static("upgrade, close"));
        assert!(wants_close(&headers));
    }

    #[test]
    fn connection_ids_are_monotonic() {
        let first = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        let second = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        assert!(second > first);
    }
}
