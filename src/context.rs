//! Per-request execution context.
//!
//! One [`Context`] lives for exactly one in-flight request: acquired from the
//! application's pool, bound to the matched chain, mutated throughout the
//! cooperative handler walk, then drained and released. [`Context::reset`]
//! enumerates the full field set; every field added here must be cleared
//! there, and the reset-completeness test holds a sentinel for each one.

use crate::bindings::Bindings;
use crate::chain::Chain;
use crate::encoding;
use crate::error::{BoxError, TracedError};
use crate::pool::Reusable;
use crate::store::Store;
use bytes::{Bytes, BytesMut};
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method, Response, StatusCode, Uri};
use serde::Serialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

static X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
static X_REAL_IP: HeaderName = HeaderName::from_static("x-real-ip");

/// Request header opting a single response into gzip-compressed JSON.
pub static COMPRESS_HINT: HeaderName = HeaderName::from_static("x-cr");

/// Mutable state for one request/response cycle, pooled across requests.
///
/// Exclusively owned by the single handling flow for the duration of one
/// request; no reference to it may be retained past release.
#[derive(Default)]
pub struct Context {
    // request view
    method: Method,
    uri: Uri,
    request_headers: HeaderMap,
    request_body: Bytes,
    peer_addr: Option<SocketAddr>,
    params: HashMap<String, String>,
    query: Option<HashMap<String, String>>,
    bindings: Bindings,
    store: Store,

    // response state
    status: StatusCode,
    wire_status: StatusCode,
    committed: bool,
    response_headers: HeaderMap,
    body: BytesMut,
    bytes_written: usize,
    errors: Vec<BoxError>,

    // chain execution
    cursor: usize,
    chain: Option<Arc<Chain>>,
    compressed: bool,
}

impl Context {
    /// Clears every field back to its zero-equivalent state, retaining
    /// backing storage where the collections allow it.
    pub(crate) fn reset(&mut self) {
        self.method = Method::default();
        self.uri = Uri::default();
        self.request_headers.clear();
        self.request_body = Bytes::new();
        self.peer_addr = None;
        self.params.clear();
        self.query = None;
        self.bindings.clear();
        self.store = Store::default();

        self.status = StatusCode::OK;
        self.wire_status = StatusCode::OK;
        self.committed = false;
        self.response_headers.clear();
        self.body.clear();
        self.bytes_written = 0;
        self.errors.clear();

        self.cursor = 0;
        self.chain = None;
        self.compressed = false;
    }

    /// Binds a freshly reset context to one inbound request and its matched
    /// chain. The compression flag is resolved here, once, before any write:
    /// the route-level flag or the `X-CR` request header.
    #[allow(clippy::too_many_arguments, reason = "one call site, the dispatch entry")]
    pub(crate) fn bind_request(
        &mut self,
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
        peer_addr: Option<SocketAddr>,
        store: Store,
        chain: Arc<Chain>,
        params: Vec<(String, String)>,
    ) {
        self.compressed = chain.compressed() || headers.contains_key(&COMPRESS_HINT);
        self.method = method;
        self.uri = uri;
        self.request_headers = headers;
        self.request_body = body;
        self.peer_addr = peer_addr;
        self.store = store;
        self.params.extend(params);
        self.chain = Some(chain);
    }

    /// Resumes the chain at the current cursor.
    ///
    /// The cursor is advanced before control transfers, so it always names
    /// the resume point and a handler may re-enter `next` without re-running
    /// itself. Past the end of the chain this is a no-op: the terminal
    /// condition, not an error. A handler that never calls `next` simply
    /// short-circuits the rest of the chain.
    pub fn next(&mut self) {
        let handler = match self.chain.as_ref().and_then(|chain| chain.handler(self.cursor)) {
            Some(handler) => Arc::clone(handler),
            None => return,
        };
        self.cursor += 1;
        (*handler)(self);
    }

    // ---- request side ----

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn request_headers(&self) -> &HeaderMap {
        &self.request_headers
    }

    /// Returns a request header as a string, `None` if absent or not UTF-8.
    pub fn request_header(&self, name: &HeaderName) -> Option<&str> {
        self.request_headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn request_body(&self) -> &Bytes {
        &self.request_body
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Returns the path parameter extracted under `name`.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Returns the query-string value under `name`. The query is parsed once
    /// per request and cached; for repeated keys the first value wins.
    pub fn query(&mut self, name: &str) -> Option<&str> {
        let uri = &self.uri;
        let cache = self.query.get_or_insert_with(|| parse_query(uri.query()));
        cache.get(name).map(String::as_str)
    }

    /// Resolves the client IP: first `X-Forwarded-For` token, then
    /// `X-Real-Ip`, then the transport peer address with the port stripped.
    /// Proxy headers are not authenticated; callers needing spoof resistance
    /// must layer their own trusted-proxy allowlist.
    pub fn client_ip(&self) -> Option<String> {
        if let Some(forwarded) = self.request_header(&X_FORWARDED_FOR) {
            let first = forwarded.split(',').next().unwrap_or(forwarded).trim();
            if !first.is_empty() {
                return Some(first.to_string());
            }
        }
        if let Some(real_ip) = self.request_header(&X_REAL_IP) {
            let trimmed = real_ip.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        self.peer_addr.map(|addr| addr.ip().to_string())
    }

    /// Binds a request-scoped value. Visible to every later handler in this
    /// chain, gone after the request completes.
    pub fn set_value<T: Send + Sync + 'static>(&mut self, key: impl Into<String>, value: T) {
        self.bindings.bind(key, value);
    }

    /// Reads a request-scoped value bound by an earlier handler.
    pub fn value<T: 'static>(&self, key: &str) -> Option<&T> {
        self.bindings.get::<T>(key)
    }

    /// The process-wide key/value store shared across requests.
    pub fn store(&self) -> &Store {
        &self.store
    }

    // ---- response side ----

    /// Sets the response status. The first call commits the status that goes
    /// on the wire; later calls update only the bookkeeping field reported in
    /// the request log, since the transport forbids re-sending headers.
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
        if !self.committed {
            self.wire_status = status;
            self.committed = true;
        }
    }

    /// The last status a handler set (bookkeeping view, as logged).
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The status committed to the wire.
    pub fn response_status(&self) -> StatusCode {
        self.wire_status
    }

    /// Sets a response header only if no handler upstream already set it.
    pub fn header(&mut self, name: HeaderName, value: HeaderValue) {
        self.response_headers.entry(name).or_insert(value);
    }

    /// Appends a response header unconditionally.
    pub fn append_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.response_headers.append(name, value);
    }

    pub fn response_headers(&self) -> &HeaderMap {
        &self.response_headers
    }

    /// Writes a JSON response: status, `Content-Type` (set-if-absent), the
    /// serialized payload, and one trailing newline. Statuses that forbid a
    /// body (1xx, 204, 304) write the status only. In compressed mode the
    /// body is gzip-encoded and `Content-Encoding: gzip` is set-if-absent.
    ///
    /// Serialization failures are appended to the error list and the
    /// response is still sent best-effort with whatever was committed.
    pub fn json<T: Serialize>(&mut self, status: StatusCode, payload: &T) {
        if !encoding::body_allowed(status) {
            self.set_status(status);
            return;
        }
        self.header(http::header::CONTENT_TYPE, HeaderValue::from_static(mime::APPLICATION_JSON.as_ref()));
        if self.compressed {
            encoding::write_compressed_json(self, status, payload);
        } else {
            encoding::write_json(self, status, payload);
        }
    }

    /// True when this response was resolved to gzip-compressed mode.
    pub fn compressed(&self) -> bool {
        self.compressed
    }

    /// Total payload bytes written so far (pre-compression count).
    pub fn bytes_written(&self) -> usize {
        self.bytes_written
    }

    /// Records an error for the end-of-request log, wrapping it with the
    /// caller's origin unless it is already traced. Never aborts the chain.
    #[track_caller]
    pub fn append_error(&mut self, err: impl Into<BoxError>) {
        self.errors.push(TracedError::wrap(err.into()));
    }

    /// Errors accumulated so far, in append order.
    pub fn errors(&self) -> &[BoxError] {
        &self.errors
    }

    pub(crate) fn take_errors(&mut self) -> Vec<BoxError> {
        std::mem::take(&mut self.errors)
    }

    /// Appends raw bytes to the response body, counting them.
    pub(crate) fn push_body(&mut self, data: &[u8]) {
        self.body.extend_from_slice(data);
        self.bytes_written += data.len();
    }

    pub(crate) fn body_mut(&mut self) -> &mut BytesMut {
        &mut self.body
    }

    pub(crate) fn add_bytes(&mut self, count: usize) {
        self.bytes_written += count;
    }

    /// Assembles the final response for the transport collaborator.
    pub(crate) fn take_response(&mut self) -> Response<Bytes> {
        let mut response = Response::new(self.body.split().freeze());
        *response.status_mut() = self.wire_status;
        *response.headers_mut() = std::mem::take(&mut self.response_headers);
        response
    }
}

impl Reusable for Context {
    fn reset(&mut self) {
        Context::reset(self);
    }
}

fn parse_query(query: Option<&str>) -> HashMap<String, String> {
    let pairs: Vec<(String, String)> = match query {
        Some(query) => serde_urlencoded::from_str(query).unwrap_or_default(),
        None => Vec::new(),
    };
    let mut map = HashMap::with_capacity(pairs.len());
    for (key, value) in pairs {
        map.entry(key).or_insert(value);
    }
    map
}
