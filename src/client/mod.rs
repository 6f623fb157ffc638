mod config;
mod conn;
mod pool;

pub use config::{ClientConfig, ClientConfigBuilder, ConfigError, Scheme};

use std::future::Future;
use std::sync::Arc;

use http::{header, HeaderValue, Method, StatusCode, Uri};
use tracing::debug;

use crate::client::pool::Pool;
use crate::error::ClientError;
use crate::protocol::{Request, Response};
use crate::transport::{default_tls_config, Connector};

// redirect loops are cut here; the last redirect response is returned as-is
const MAX_REDIRECTS: usize = 8;

/// An asynchronous HTTP/1.1 client bound to one authority.
///
/// Cheap to clone; all clones share one connection pool.
#[derive(Clone)]
pub struct Client {
    pool: Arc<Pool>,
    config: Arc<ClientConfig>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let connector = match config.scheme {
            Scheme::Http => Connector::plain(config.host.clone(), config.port, config.options.clone()),
            Scheme::Https => {
                let tls = match &config.tls {
                    Some(tls) => tls.clone(),
                    None => default_tls_config().map_err(ClientError::connect)?,
                };
                Connector::tls(config.host.clone(), config.port, config.options.clone(), tls)
                    .map_err(ClientError::connect)?
            }
        };

        let pool = Pool::new(connector, config.max_connections, config.max_waiters, config.body_channel_capacity);

        Ok(Self { pool: Arc::new(pool), config: Arc::new(config) })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Send one request: acquire a connection, dispatch, hand back the
    /// response with its streaming content. The connection returns to the
    /// pool once the body reached its terminal marker (or the body was
    /// abandoned and drained).
    pub async fn send(&self, request: Request) -> Result<Response, ClientError> {
        let conn = self.pool.acquire().await?;
        match conn.send(request).await {
            Ok(response) => Ok(response),
            Err(e) => {
                // dispatch failed before the wire was touched, or the
                // connection died; open connections go back into rotation
                self.pool.release(conn);
                Err(e)
            }
        }
    }

    /// Send and follow `301/302/303/307/308` redirects, GET only. The
    /// intermediate response body is drained before re-sending. A `Location`
    /// pointing at a different authority stops the chase and the redirect
    /// response itself is returned.
    pub async fn send_following(&self, mut request: Request) -> Result<Response, ClientError> {
        let mut redirects = 0;

        loop {
            let method = request.method().clone();
            let headers = request.headers().clone();

            let response = self.send(request).await?;

            if !is_redirect(response.status()) || redirects >= MAX_REDIRECTS {
                return Ok(response);
            }
            let Some(location) = response.headers().get(header::LOCATION).cloned() else {
                return Ok(response);
            };
            if method != Method::GET {
                return Err(ClientError::AutoRedirectNotSupported);
            }
            let Some((path, query)) = self.local_target(&location) else {
                return Ok(response);
            };

            debug!(status = %response.status(), path = %path, "following redirect");

            // drain the intermediate body so its connection is reusable
            let released = response.released();
            let mut content = response.into_content();
            let _ = content.drain().await;
            drop(content);
            released.wait().await;

            let mut next = Request::new(Method::GET, path);
            *next.headers_mut() = headers;
            if let Some(query) = query {
                next = next.query(query);
            }

            request = next;
            redirects += 1;
        }
    }

    /// Run `script` against the response and only resolve after the
    /// response body is drained, whether `script` succeeded or failed.
    ///
    /// The request must carry a `Host` header.
    pub async fn run<F, Fut, T>(&self, request: Request, follow_redirects: bool, script: F) -> Result<T, ClientError>
    where
        F: FnOnce(Response) -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        if !has_host_header(&request) {
            return Err(ClientError::HostHeaderMissing);
        }

        let response = if follow_redirects {
            self.send_following(request).await?
        } else {
            self.send(request).await?
        };

        let released = response.released();
        let result = script(response).await;

        // the release edge only rises once the wire side of the body is
        // done; waiting on it is what makes the drain guarantee hold
        released.wait().await;

        result
    }

    /// Run `script` with a handle to this client and always stop the client
    /// afterwards, whatever the outcome.
    pub async fn run_and_stop<F, Fut, T>(&self, script: F) -> T
    where
        F: FnOnce(Client) -> Fut,
        Fut: Future<Output = T>,
    {
        let result = script(self.clone()).await;
        self.stop().await;
        result
    }

    /// Close the pool: fail queued acquirers, close every connection, wait
    /// until all of them are gone. Idempotent.
    pub async fn stop(&self) {
        self.pool.stop().await;
    }

    /// Number of live connections. Diagnostics only.
    pub fn opened_connections(&self) -> usize {
        self.pool.opened_connections()
    }

    /// Number of idle pooled connections. Diagnostics only.
    pub fn idle_connections(&self) -> usize {
        self.pool.idle_connections()
    }

    /// Resolve a `Location` header against this client's authority: a path
    /// (with optional query), or an absolute URL on the same authority.
    fn local_target(&self, location: &HeaderValue) -> Option<(String, Option<String>)> {
        let location = location.to_str().ok()?;

        if location.starts_with('/') {
            return match location.split_once('?') {
                Some((path, query)) => Some((path.to_string(), Some(query.to_string()))),
                None => Some((location.to_string(), None)),
            };
        }

        let uri: Uri = location.parse().ok()?;
        let scheme_matches = match uri.scheme_str() {
            Some("http") => self.config.scheme == Scheme::Http,
            Some("https") => self.config.scheme == Scheme::Https,
            _ => false,
        };
        let authority = uri.authority()?;
        let port = authority.port_u16().unwrap_or_else(|| self.config.scheme.default_port());

        if scheme_matches && authority.host().eq_ignore_ascii_case(&self.config.host) && port == self.config.port {
            Some((uri.path().to_string(), uri.query().map(str::to_string)))
        } else {
            None
        }
    }
}

fn is_redirect(status: StatusCode) -> bool {
    matches!(status.as_u16(), 301 | 302 | 303 | 307 | 308)
}

fn has_host_header(request: &Request) -> bool {
    request.headers().contains_key(header::HOST) || request.content_ref().headers().contains_key(header::HOST)
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use bytes::Bytes;
    use futures::StreamExt;
    use http::header::{HOST, UPGRADE};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::time::{sleep, timeout, Duration};

    use super::*;
    use crate::protocol::body::Content;

    enum Reply {
        /// write the bytes, keep the connection open
        Send(Vec<u8>),
        /// write the bytes, then close
        SendAndClose(Vec<u8>),
        /// wait first, then write the bytes
        DelayedSend(Duration, Vec<u8>),
    }

    /// A scripted peer. Parses just enough HTTP to route on the
    /// request-target and to skip sized request bodies.
    struct TestServer {
        addr: SocketAddr,
        hits: Arc<AtomicUsize>,
    }

    impl TestServer {
        async fn start<F>(respond: F) -> Self
        where
            F: Fn(&str) -> Reply + Send + Sync + 'static,
        {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let hits = Arc::new(AtomicUsize::new(0));
            let respond = Arc::new(respond);

            let accept_hits = hits.clone();
            tokio::spawn(async move {
                loop {
                    let Ok((stream, _)) = listener.accept().await else { break };
                    tokio::spawn(serve_connection(stream, respond.clone(), accept_hits.clone()));
                }
            });

            Self { addr, hits }
        }

        fn hits(&self) -> usize {
            self.hits.load(Ordering::SeqCst)
        }

        fn client(&self, max_connections: usize, max_waiters: usize) -> Client {
            let config = ClientConfig::builder()
                .host("127.0.0.1")
                .port(self.addr.port())
                .max_connections(max_connections)
                .max_waiters(max_waiters)
                .build()
                .unwrap();
            Client::new(config).unwrap()
        }
    }

    async fn serve_connection(
        mut stream: TcpStream,
        respond: Arc<impl Fn(&str) -> Reply + Send + Sync + 'static>,
        hits: Arc<AtomicUsize>,
    ) {
        let mut buf: Vec<u8> = Vec::new();
        loop {
            let head_end = loop {
                if let Some(pos) = find_subslice(&buf, b"\r\n\r\n") {
                    break pos + 4;
                }
                let mut chunk = [0u8; 4096];
                match stream.read(&mut chunk).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => buf.extend_from_slice(&chunk[..n]),
                }
            };

            let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
            let target = head.split_whitespace().nth(1).unwrap_or("/").to_string();
            let content_length = head
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length").then(|| value.trim().parse::<usize>().ok())?
                })
                .unwrap_or(0);

            let total = head_end + content_length;
            while buf.len() < total {
                let mut chunk = [0u8; 4096];
                match stream.read(&mut chunk).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => buf.extend_from_slice(&chunk[..n]),
                }
            }
            buf.drain(..total);

            hits.fetch_add(1, Ordering::SeqCst);

            match respond(&target) {
                Reply::Send(bytes) => {
                    if stream.write_all(&bytes).await.is_err() {
                        return;
                    }
                }
                Reply::SendAndClose(bytes) => {
                    let _ = stream.write_all(&bytes).await;
                    let _ = stream.shutdown().await;
                    return;
                }
                Reply::DelayedSend(delay, bytes) => {
                    sleep(delay).await;
                    if stream.write_all(&bytes).await.is_err() {
                        return;
                    }
                }
            }
        }
    }

    fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack.windows(needle.len()).position(|window| window == needle)
    }

    fn ok_with_body(body: &str) -> Vec<u8> {
        format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n{}", body.len(), body).into_bytes()
    }

    fn get(path: &str) -> Request {
        Request::get(path).header(HOST, HeaderValue::from_static("localhost"))
    }

    async fn eventually(what: &str, condition: impl Fn() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            sleep(Duration::from_millis(5)).await;
        }
        panic!("never happened: {what}");
    }

    #[tokio::test]
    async fn single_get_reuses_the_connection() {
        let _ = tracing_subscriber::fmt::try_init();

        let server = TestServer::start(|_| Reply::Send(ok_with_body("hello"))).await;
        let client = server.client(1, 10);

        let mut response = client.send(get("/a")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let first_id = response.connection_id();
        let released = response.released();

        let body = response.content_mut().bytes().await.unwrap();
        assert_eq!(body, Bytes::from_static(b"hello"));
        released.wait().await;
        assert_eq!(client.opened_connections(), 1);

        let response = client.send(get("/b")).await.unwrap();
        assert_eq!(response.connection_id(), first_id);
        assert_eq!(client.opened_connections(), 1);
        assert_eq!(server.hits(), 2);

        client.stop().await;
    }

    #[tokio::test]
    async fn waiter_queue_respects_caps_and_order() {
        let server =
            TestServer::start(|_| Reply::DelayedSend(Duration::from_millis(150), ok_with_body("slow"))).await;
        let client = server.client(1, 1);

        let c1 = client.clone();
        let first = tokio::spawn(async move { c1.send(get("/slow")).await });
        sleep(Duration::from_millis(30)).await;

        let c2 = client.clone();
        let second = tokio::spawn(async move { c2.send(get("/slow")).await });
        sleep(Duration::from_millis(30)).await;

        // pool and waiter slot are both taken now
        let third = client.send(get("/slow")).await;
        assert!(matches!(third, Err(ClientError::TooManyWaiters)));

        let first = first.await.unwrap().unwrap();
        let second = second.await.unwrap().unwrap();
        assert_eq!(first.connection_id(), second.connection_id());
        assert_eq!(client.opened_connections(), 1);
        assert_eq!(server.hits(), 2);

        client.stop().await;
    }

    #[tokio::test]
    async fn abandoned_body_still_releases_the_connection() {
        let big = "x".repeat(256 * 1024);
        let server = TestServer::start(move |_| Reply::Send(ok_with_body(&big))).await;
        let client = server.client(1, 10);

        let mut response = client.send(get("/big")).await.unwrap();
        let first_id = response.connection_id();
        let released = response.released();

        // read a little, then walk away mid-body
        let mut stream = response.content_mut().stream().unwrap();
        let first_chunk = stream.next().await.unwrap().unwrap();
        assert!(!first_chunk.is_empty());
        drop(stream);
        drop(response);

        released.wait().await;
        assert_eq!(client.opened_connections(), 1);

        let response = client.send(get("/again")).await.unwrap();
        assert_eq!(response.connection_id(), first_id);
        assert_eq!(server.hits(), 2);

        client.stop().await;
    }

    #[tokio::test]
    async fn upgrade_hands_over_raw_bytes() {
        let _ = tracing_subscriber::fmt::try_init();

        let server = TestServer::start(|_| {
            let mut bytes =
                b"HTTP/1.1 101 Switching Protocols\r\nUpgrade: echo\r\nConnection: Upgrade\r\n\r\n".to_vec();
            bytes.extend_from_slice(&[0xDE, 0xAD]);
            Reply::SendAndClose(bytes)
        })
        .await;
        let client = server.client(1, 10);

        let request = get("/ws").header(UPGRADE, HeaderValue::from_static("echo"));
        let mut response = client.send(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::SWITCHING_PROTOCOLS);

        // a 101 carries no http content
        assert!(response.content_mut().bytes().await.unwrap().is_empty());

        let upgraded = response.upgrade(futures::stream::empty()).unwrap();
        let raw: Vec<Bytes> = upgraded.map(|chunk| chunk.unwrap()).collect().await;
        let raw: Vec<u8> = raw.concat();
        assert_eq!(raw, vec![0xDE, 0xAD]);

        // a second takeover is refused
        assert!(matches!(
            response.upgrade(futures::stream::empty()),
            Err(ClientError::StreamAlreadyConsumed)
        ));

        // upgraded connections die with their transport, they are not pooled
        eventually("upgraded connection destroyed", || client.opened_connections() == 0).await;

        client.stop().await;
    }

    #[tokio::test]
    async fn upgrade_on_regular_response_is_refused() {
        let server = TestServer::start(|_| Reply::Send(ok_with_body("nope"))).await;
        let client = server.client(1, 10);

        let mut response = client.send(get("/")).await.unwrap();
        assert!(matches!(
            response.upgrade(futures::stream::empty()),
            Err(ClientError::UpgradeRefused)
        ));

        client.stop().await;
    }

    #[tokio::test]
    async fn get_redirect_is_followed_and_drained() {
        let server = TestServer::start(|target| match target {
            "/a" => Reply::Send(
                b"HTTP/1.1 302 Found\r\nLocation: /b\r\nContent-Length: 4\r\n\r\ngone".to_vec(),
            ),
            _ => Reply::Send(ok_with_body("done")),
        })
        .await;
        let client = server.client(2, 10);

        let mut response = client.send_following(get("/a")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.content_mut().bytes().await.unwrap(), Bytes::from_static(b"done"));
        assert_eq!(server.hits(), 2);

        client.stop().await;
    }

    #[tokio::test]
    async fn non_get_redirect_is_rejected() {
        let server = TestServer::start(|_| {
            Reply::Send(b"HTTP/1.1 302 Found\r\nLocation: /b\r\nContent-Length: 0\r\n\r\n".to_vec())
        })
        .await;
        let client = server.client(1, 10);

        let request = Request::post("/a")
            .header(HOST, HeaderValue::from_static("localhost"))
            .content(Content::full("payload"));
        let result = client.send_following(request).await;
        assert!(matches!(result, Err(ClientError::AutoRedirectNotSupported)));

        client.stop().await;
    }

    #[tokio::test]
    async fn foreign_redirect_is_returned_as_is() {
        let server = TestServer::start(|_| {
            Reply::Send(
                b"HTTP/1.1 302 Found\r\nLocation: http://elsewhere.example/b\r\nContent-Length: 0\r\n\r\n".to_vec(),
            )
        })
        .await;
        let client = server.client(1, 10);

        let response = client.send_following(get("/a")).await.unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(server.hits(), 1);

        client.stop().await;
    }

    #[tokio::test]
    async fn stop_fails_waiters_and_drains_connections() {
        let server =
            TestServer::start(|_| Reply::DelayedSend(Duration::from_millis(400), ok_with_body("late"))).await;
        let client = server.client(1, 2);

        let c1 = client.clone();
        let in_flight = tokio::spawn(async move { c1.send(get("/slow")).await });
        sleep(Duration::from_millis(30)).await;

        let c2 = client.clone();
        let waiting = tokio::spawn(async move { c2.send(get("/slow")).await });
        sleep(Duration::from_millis(30)).await;

        client.stop().await;
        assert_eq!(client.opened_connections(), 0);

        assert!(matches!(in_flight.await.unwrap(), Err(ClientError::ClientAlreadyClosed)));
        assert!(matches!(waiting.await.unwrap(), Err(ClientError::ClientAlreadyClosed)));

        // the pool stays closed
        assert!(matches!(client.send(get("/after")).await, Err(ClientError::ClientAlreadyClosed)));
    }

    #[tokio::test]
    async fn connection_close_is_not_pooled() {
        let server = TestServer::start(|_| {
            Reply::SendAndClose(
                b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\nConnection: close\r\n\r\nbye".to_vec(),
            )
        })
        .await;
        let client = server.client(2, 10);

        let mut response = client.send(get("/")).await.unwrap();
        let first_id = response.connection_id();
        assert_eq!(response.content_mut().bytes().await.unwrap(), Bytes::from_static(b"bye"));

        eventually("closed connection destroyed", || client.opened_connections() == 0).await;

        let response = client.send(get("/")).await.unwrap();
        assert_ne!(response.connection_id(), first_id);

        client.stop().await;
    }

    #[tokio::test]
    async fn no_content_response_is_reusable() {
        let server = TestServer::start(|_| Reply::Send(b"HTTP/1.1 204 No Content\r\n\r\n".to_vec())).await;
        let client = server.client(1, 10);

        let mut response = client.send(get("/a")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let first_id = response.connection_id();
        let released = response.released();
        assert!(response.content_mut().bytes().await.unwrap().is_empty());
        released.wait().await;

        let response = client.send(get("/b")).await.unwrap();
        assert_eq!(response.connection_id(), first_id);

        client.stop().await;
    }

    #[tokio::test]
    async fn head_response_has_headers_but_no_body() {
        let server =
            TestServer::start(|_| Reply::Send(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\n".to_vec())).await;
        let client = server.client(1, 10);

        let request = Request::new(Method::HEAD, "/").header(HOST, HeaderValue::from_static("localhost"));
        let mut response = client.send(request).await.unwrap();
        let released = response.released();

        assert_eq!(response.headers().get(header::CONTENT_LENGTH), Some(&HeaderValue::from_static("5")));
        assert!(response.content_mut().bytes().await.unwrap().is_empty());

        released.wait().await;
        assert_eq!(client.opened_connections(), 1);

        client.stop().await;
    }

    #[tokio::test]
    async fn chunked_response_round_trips_with_trailers() {
        let server = TestServer::start(|_| {
            Reply::Send(
                b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nTrailer: x-checksum\r\n\r\n\
                  5\r\nhello\r\n6\r\n world\r\n0\r\nx-checksum: abc123\r\n\r\n"
                    .to_vec(),
            )
        })
        .await;
        let client = server.client(1, 10);

        let mut response = client.send(get("/")).await.unwrap();
        let mut stream = response.content_mut().stream().unwrap();

        let mut collected = Vec::new();
        while let Some(chunk) = stream.next().await {
            collected.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(collected, b"hello world");
        assert_eq!(
            stream.trailers().and_then(|trailers| trailers.get("x-checksum")),
            Some(&HeaderValue::from_static("abc123"))
        );

        client.stop().await;
    }

    #[tokio::test]
    async fn request_body_is_uploaded() {
        let server = TestServer::start(|_| Reply::Send(ok_with_body("ack"))).await;
        let client = server.client(1, 10);

        let request = Request::post("/upload")
            .header(HOST, HeaderValue::from_static("localhost"))
            .content(Content::full_with_type("some payload", HeaderValue::from_static("text/plain")));
        let mut response = client.send(request).await.unwrap();
        assert_eq!(response.content_mut().bytes().await.unwrap(), Bytes::from_static(b"ack"));

        client.stop().await;
    }

    #[tokio::test]
    async fn second_body_read_fails() {
        let server = TestServer::start(|_| Reply::Send(ok_with_body("once"))).await;
        let client = server.client(1, 10);

        let mut response = client.send(get("/")).await.unwrap();
        response.content_mut().bytes().await.unwrap();
        assert!(matches!(response.content_mut().stream(), Err(ClientError::StreamAlreadyConsumed)));

        client.stop().await;
    }

    #[tokio::test]
    async fn run_requires_a_host_header() {
        let server = TestServer::start(|_| Reply::Send(ok_with_body("unused"))).await;
        let client = server.client(1, 10);

        let result = client.run(Request::get("/"), false, |_response| async { Ok(()) }).await;
        assert!(matches!(result, Err(ClientError::HostHeaderMissing)));
        assert_eq!(server.hits(), 0);

        client.stop().await;
    }

    #[tokio::test]
    async fn run_drains_even_when_the_script_fails() {
        let server = TestServer::start(|_| Reply::Send(ok_with_body("drain me"))).await;
        let client = server.client(1, 10);

        let result: Result<(), _> = client
            .run(get("/"), false, |response| async move {
                // bail out without touching the body
                drop(response);
                Err(ClientError::body("script gave up"))
            })
            .await;
        assert!(matches!(result, Err(ClientError::Body { .. })));

        // the connection was drained and is immediately reusable
        assert_eq!(client.opened_connections(), 1);
        let response = client.send(get("/next")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(server.hits(), 2);

        client.stop().await;
    }

    #[tokio::test]
    async fn run_and_stop_always_stops() {
        let server = TestServer::start(|_| Reply::Send(ok_with_body("bye"))).await;
        let client = server.client(2, 10);

        let body = client
            .run_and_stop(|client| async move {
                let mut response = client.send(get("/")).await.unwrap();
                response.content_mut().bytes().await.unwrap()
            })
            .await;

        assert_eq!(body, Bytes::from_static(b"bye"));
        assert_eq!(client.opened_connections(), 0);
        assert!(matches!(client.send(get("/")).await, Err(ClientError::ClientAlreadyClosed)));
    }

    #[tokio::test]
    async fn connect_failure_surfaces() {
        // nothing listens on this port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = ClientConfig::builder().host("127.0.0.1").port(port).build().unwrap();
        let client = Client::new(config).unwrap();

        let result = timeout(Duration::from_secs(5), client.send(get("/"))).await.unwrap();
        assert!(matches!(result, Err(ClientError::Connect { .. })));
        assert_eq!(client.opened_connections(), 0);
    }

    #[tokio::test]
    async fn until_close_body_is_delivered() {
        let server = TestServer::start(|_| {
            Reply::SendAndClose(b"HTTP/1.1 200 OK\r\n\r\nunframed body".to_vec())
        })
        .await;
        let client = server.client(1, 10);

        let mut response = client.send(get("/")).await.unwrap();
        assert_eq!(response.content_mut().bytes().await.unwrap(), Bytes::from_static(b"unframed body"));

        eventually("until-close connection destroyed", || client.opened_connections() == 0).await;

        client.stop().await;
    }
}
