use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tracing::trace;

use crate::error::ClientError;
use crate::protocol::body::stream::BodyFrame;
use crate::protocol::PayloadItem;

/// The two channel ends the connection driver arms when it sees a `101`
/// response. Held by the response until the caller invokes `upgrade`.
pub(crate) struct UpgradeSlot {
    pub(crate) write_tx: mpsc::Sender<Bytes>,
    pub(crate) rx: mpsc::Receiver<BodyFrame>,
    pub(crate) close_tx: oneshot::Sender<()>,
}

impl UpgradeSlot {
    /// Wire the caller's upstream into the transport and hand back the
    /// downstream byte sequence.
    pub(crate) fn start<S>(self, upstream: S) -> Upgraded
    where
        S: Stream<Item = Bytes> + Send + 'static,
    {
        let write_tx = self.write_tx;
        tokio::spawn(async move {
            let mut upstream = std::pin::pin!(upstream);
            while let Some(bytes) = upstream.next().await {
                if write_tx.send(bytes).await.is_err() {
                    trace!("upgrade transport went away, upstream dropped");
                    break;
                }
            }
        });

        Upgraded { rx: self.rx, done: false, _close: self.close_tx }
    }
}

/// Raw bytes flowing from the peer after a `101 Switching Protocols`
/// exchange. No longer HTTP: chunks are delivered as read off the wire and
/// the stream ends when the transport closes.
///
/// Dropping this value closes the transport; the connection it rode on is
/// destroyed, never returned to the pool.
pub struct Upgraded {
    rx: mpsc::Receiver<BodyFrame>,
    done: bool,
    // dropping the sender tells the driver to tear the transport down
    _close: oneshot::Sender<()>,
}

impl Stream for Upgraded {
    type Item = Result<Bytes, ClientError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if this.done {
                return Poll::Ready(None);
            }

            match ready!(this.rx.poll_recv(cx)) {
                Some(Ok(PayloadItem::Chunk(bytes))) => return Poll::Ready(Some(Ok(bytes))),
                // raw mode has no framing, so no trailers can show up
                Some(Ok(PayloadItem::Trailers(_))) => continue,
                Some(Ok(PayloadItem::Eof)) | None => {
                    this.done = true;
                    return Poll::Ready(None);
                }
                Some(Err(e)) => {
                    this.done = true;
                    return Poll::Ready(Some(Err(e)));
                }
            }
        }
    }
}
