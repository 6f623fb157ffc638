use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method};

use crate::protocol::body::Content;

/// The head of an outbound request: method, request-target pieces and
/// caller-attached headers.
///
/// The request-target on the wire is `path[?query]`; scheme and authority
/// come from the client the request is sent through.
pub struct RequestHead {
    method: Method,
    path: String,
    query: Option<String>,
    headers: HeaderMap,
}

impl RequestHead {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), query: None, headers: HeaderMap::new() }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub(crate) fn set_query(&mut self, query: impl Into<String>) {
        self.query = Some(query.into());
    }

    pub(crate) fn set_path(&mut self, path: impl Into<String>) {
        self.path = path.into();
    }

    pub(crate) fn clear_query(&mut self) {
        self.query = None;
    }
}

/// An outbound request: a [`RequestHead`] plus a [`Content`] carrying the
/// body and its body-describing headers.
pub struct Request {
    head: RequestHead,
    content: Content,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { head: RequestHead::new(method, path), content: Content::empty() }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.head.set_query(query);
        self
    }

    /// Append a header. Headers are a multi-map; repeated names keep every
    /// value in insertion order.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.head.headers.append(name, value);
        self
    }

    pub fn content(mut self, content: Content) -> Self {
        self.content = content;
        self
    }

    pub fn method(&self) -> &Method {
        &self.head.method
    }

    pub fn path(&self) -> &str {
        &self.head.path
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.head.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.head.headers
    }

    pub fn content_ref(&self) -> &Content {
        &self.content
    }

    pub(crate) fn into_parts(self) -> (RequestHead, Content) {
        (self.head, self.content)
    }
}
