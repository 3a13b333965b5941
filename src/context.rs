//! Per-request context
//!
//! A `Context` lives for exactly one request. It borrows the inbound request
//! and the response sink, exposes request accessors (`query`, `form_value`,
//! `header`) and response writers (`string`, `json`, `html`, `data`).
//!
//! # Commit semantics
//!
//! ```text
//! Uncommitted --status()/string()/json()/html()/data()/write()--> Committed
//! ```
//!
//! Headers staged with `set_header` are snapshotted at commit. After that the
//! status line and headers are fixed; further `set_header` or `status` calls
//! are accepted but do not change the response.

use std::fmt;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use hyper::{Method, Request, Response, StatusCode};
use serde::Serialize;

use crate::logger;

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// Largest body decoded by `form_value` (10 MiB); bigger bodies still reach handlers
pub const MAX_FORM_SIZE: usize = 10 << 20;

/// Response sink for one request
///
/// Mirrors what a transport does with a response: headers are staged until
/// the head is written, the first body write commits an implicit 200.
#[derive(Debug, Default)]
pub struct ResponseWriter {
    staged: HeaderMap,
    head: Option<(StatusCode, HeaderMap)>,
    body: Vec<u8>,
}

impl ResponseWriter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Headers that will be sent with the head, if it has not been written yet
    pub fn header_mut(&mut self) -> &mut HeaderMap {
        &mut self.staged
    }

    /// Write the status line and snapshot staged headers. Only the first call counts.
    pub fn write_header(&mut self, status: StatusCode) {
        if let Some((sent, _)) = &self.head {
            logger::log_warning(&format!(
                "Superfluous response status {status}, already sent {sent}"
            ));
            return;
        }
        self.head = Some((status, self.staged.clone()));
    }

    pub fn write(&mut self, data: &[u8]) {
        if self.head.is_none() {
            self.write_header(StatusCode::OK);
        }
        self.body.extend_from_slice(data);
    }

    #[must_use]
    pub const fn is_committed(&self) -> bool {
        self.head.is_some()
    }

    /// Finish the request: an unwritten head is committed as 200 with the staged headers
    #[must_use]
    pub fn into_response(self) -> Response<Full<Bytes>> {
        let (status, headers) = self.head.unwrap_or((StatusCode::OK, self.staged));
        let mut response = Response::new(Full::new(Bytes::from(self.body)));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }
}

/// Explicit response commit state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitState {
    /// Headers may still be set
    Uncommitted,
    /// Status and headers have been flushed
    Committed,
}

/// Per-request facade handed to handlers
pub struct Context<'a> {
    req: &'a Request<Bytes>,
    writer: &'a mut ResponseWriter,
    path: String,
    method: String,
    status_code: Option<StatusCode>,
    state: CommitState,
}

impl<'a> Context<'a> {
    pub fn new(req: &'a Request<Bytes>, writer: &'a mut ResponseWriter) -> Self {
        Self {
            path: req.uri().path().to_string(),
            method: req.method().as_str().to_string(),
            req,
            writer,
            status_code: None,
            state: CommitState::Uncommitted,
        }
    }

    /// Request path, without the query string
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Status recorded by the first commit, `None` before that
    #[must_use]
    pub const fn status_code(&self) -> Option<StatusCode> {
        self.status_code
    }

    #[must_use]
    pub const fn commit_state(&self) -> CommitState {
        self.state
    }

    #[must_use]
    pub const fn is_committed(&self) -> bool {
        matches!(self.state, CommitState::Committed)
    }

    /// The raw request this context wraps
    #[must_use]
    pub const fn request(&self) -> &'a Request<Bytes> {
        self.req
    }

    /// Request header as text; empty if absent or not visible ASCII
    #[must_use]
    pub fn header(&self, key: &str) -> String {
        self.req
            .headers()
            .get(key)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    }

    /// First value bound to `key` in the URL query string, or empty
    #[must_use]
    pub fn query(&self, key: &str) -> String {
        self.req
            .uri()
            .query()
            .and_then(|q| lookup(q.as_bytes(), key))
            .unwrap_or_default()
    }

    /// Value bound to `key` in a url-encoded form body, falling back to the
    /// URL query. Only POST, PUT and PATCH bodies are decoded, and only up to
    /// `MAX_FORM_SIZE`; anything else sees the query alone.
    #[must_use]
    pub fn form_value(&self, key: &str) -> String {
        self.post_form(key)
            .unwrap_or_else(|| self.query(key))
    }

    fn post_form(&self, key: &str) -> Option<String> {
        if !matches!(*self.req.method(), Method::POST | Method::PUT | Method::PATCH) {
            return None;
        }
        if self.req.body().len() > MAX_FORM_SIZE {
            logger::log_warning(&format!(
                "Form body on {} {} exceeds {MAX_FORM_SIZE} bytes; not decoded",
                self.method, self.path
            ));
            return None;
        }
        let content_type = self.req.headers().get(CONTENT_TYPE)?.to_str().ok()?;
        let mime = content_type.split(';').next().unwrap_or_default().trim();
        if !mime.eq_ignore_ascii_case(FORM_URLENCODED) {
            return None;
        }
        lookup(self.req.body(), key)
    }

    /// Stage a response header. Ignored once the response is committed.
    pub fn set_header(&mut self, key: &str, value: &str) {
        if self.is_committed() {
            logger::log_warning(&format!(
                "Header '{key}' set after response commit on {} {}; ignored",
                self.method, self.path
            ));
            return;
        }
        match (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.writer.header_mut().insert(name, value);
            }
            _ => logger::log_warning(&format!("Invalid response header '{key}: {value}'; ignored")),
        }
    }

    /// Record `code` and commit the status line with the headers staged so far
    pub fn status(&mut self, code: StatusCode) {
        if self.state == CommitState::Uncommitted {
            self.status_code = Some(code);
            self.state = CommitState::Committed;
        }
        self.writer.write_header(code);
    }

    /// Raw body write; commits an implicit 200 if nothing was committed yet
    pub fn write(&mut self, data: &[u8]) {
        if self.state == CommitState::Uncommitted {
            self.status(StatusCode::OK);
        }
        self.writer.write(data);
    }

    /// Plain-text response; pass `format_args!` for formatted output
    pub fn string(&mut self, code: StatusCode, body: impl fmt::Display) {
        self.set_header("Content-Type", "text/plain");
        self.status(code);
        self.writer.write(body.to_string().as_bytes());
    }

    /// JSON response
    ///
    /// `value` is fully serialized before anything is committed, so a
    /// serialization failure becomes a clean 500 instead of a truncated body.
    pub fn json<T: Serialize + ?Sized>(&mut self, code: StatusCode, value: &T) {
        match serde_json::to_vec(value) {
            Ok(mut buf) => {
                buf.push(b'\n');
                self.set_header("Content-Type", "application/json");
                self.status(code);
                self.writer.write(&buf);
            }
            Err(err) => {
                logger::log_error(&format!(
                    "JSON serialization failed on {} {}: {err}",
                    self.method, self.path
                ));
                self.string(StatusCode::INTERNAL_SERVER_ERROR, err);
            }
        }
    }

    /// HTML response, written verbatim without escaping
    pub fn html(&mut self, code: StatusCode, html: &str) {
        self.set_header("Content-Type", "text/html");
        self.status(code);
        self.writer.write(html.as_bytes());
    }

    /// Raw bytes; no content type is set
    pub fn data(&mut self, code: StatusCode, data: &[u8]) {
        self.status(code);
        self.writer.write(data);
    }
}

fn lookup(encoded: &[u8], key: &str) -> Option<String> {
    url::form_urlencoded::parse(encoded)
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn request(method: &str, uri: &str) -> Request<Bytes> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Bytes::new())
            .unwrap()
    }

    fn form_request(uri: &str, body: &str) -> Request<Bytes> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("Content-Type", "application/x-www-form-urlencoded; charset=utf-8")
            .body(Bytes::from(body.to_string()))
            .unwrap()
    }

    fn run<F>(req: &Request<Bytes>, f: F) -> Response<Full<Bytes>>
    where
        F: FnOnce(&mut Context<'_>),
    {
        let mut writer = ResponseWriter::new();
        let mut ctx = Context::new(req, &mut writer);
        f(&mut ctx);
        writer.into_response()
    }

    fn body_of(resp: Response<Full<Bytes>>) -> Vec<u8> {
        use http_body_util::BodyExt;
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        rt.block_on(resp.into_body().collect())
            .unwrap()
            .to_bytes()
            .to_vec()
    }

    fn text(resp: Response<Full<Bytes>>) -> String {
        String::from_utf8(body_of(resp)).unwrap()
    }

    #[test]
    fn test_path_and_method_exclude_query() {
        let req = request("GET", "/hello?name=go");
        let mut writer = ResponseWriter::new();
        let ctx = Context::new(&req, &mut writer);
        assert_eq!(ctx.path(), "/hello");
        assert_eq!(ctx.method(), "GET");
        assert_eq!(ctx.status_code(), None);
        assert_eq!(ctx.commit_state(), CommitState::Uncommitted);
    }

    #[test]
    fn test_query_first_value_and_absent() {
        let req = request("GET", "/search?q=first&q=second&empty=&enc=a%20b+c");
        let mut writer = ResponseWriter::new();
        let ctx = Context::new(&req, &mut writer);
        assert_eq!(ctx.query("q"), "first");
        assert_eq!(ctx.query("missing"), "");
        assert_eq!(ctx.query("empty"), "");
        assert_eq!(ctx.query("enc"), "a b c");
    }

    #[test]
    fn test_query_without_query_string() {
        let req = request("GET", "/plain");
        let mut writer = ResponseWriter::new();
        let ctx = Context::new(&req, &mut writer);
        assert_eq!(ctx.query("q"), "");
    }

    #[test]
    fn test_form_value_reads_body_before_query() {
        let req = form_request("/login?username=from-query&page=2", "username=geektutu&password=1234");
        let mut writer = ResponseWriter::new();
        let ctx = Context::new(&req, &mut writer);
        assert_eq!(ctx.form_value("username"), "geektutu");
        assert_eq!(ctx.form_value("password"), "1234");
        assert_eq!(ctx.form_value("page"), "2");
        assert_eq!(ctx.form_value("missing"), "");
    }

    #[test]
    fn test_form_value_ignores_non_form_body() {
        let req = Request::builder()
            .method("POST")
            .uri("/login")
            .header("Content-Type", "application/json")
            .body(Bytes::from_static(b"username=geektutu"))
            .unwrap();
        let mut writer = ResponseWriter::new();
        let ctx = Context::new(&req, &mut writer);
        assert_eq!(ctx.form_value("username"), "");
    }

    #[test]
    fn test_form_value_skips_body_on_get() {
        let req = Request::builder()
            .method("GET")
            .uri("/q?other=query")
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(Bytes::from_static(b"k=body&other=body"))
            .unwrap();
        let mut writer = ResponseWriter::new();
        let ctx = Context::new(&req, &mut writer);
        assert_eq!(ctx.form_value("k"), "");
        assert_eq!(ctx.form_value("other"), "query");
    }

    #[test]
    fn test_form_value_reads_put_and_patch_bodies() {
        for method in ["PUT", "PATCH"] {
            let req = Request::builder()
                .method(method)
                .uri("/item")
                .header("Content-Type", "application/x-www-form-urlencoded")
                .body(Bytes::from_static(b"k=body"))
                .unwrap();
            let mut writer = ResponseWriter::new();
            let ctx = Context::new(&req, &mut writer);
            assert_eq!(ctx.form_value("k"), "body", "method {method}");
        }
    }

    #[test]
    fn test_form_value_ignores_oversized_body() {
        let mut body = b"k=body&pad=".to_vec();
        body.resize(MAX_FORM_SIZE + 1, b'x');
        let req = Request::builder()
            .method("POST")
            .uri("/upload?k=query")
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(Bytes::from(body))
            .unwrap();
        let mut writer = ResponseWriter::new();
        let ctx = Context::new(&req, &mut writer);
        assert_eq!(ctx.form_value("k"), "query");
        assert_eq!(ctx.form_value("pad"), "");
    }

    #[test]
    fn test_request_header() {
        let req = Request::builder()
            .uri("/")
            .header("User-Agent", "curl/8.0")
            .body(Bytes::new())
            .unwrap();
        let mut writer = ResponseWriter::new();
        let ctx = Context::new(&req, &mut writer);
        assert_eq!(ctx.header("user-agent"), "curl/8.0");
        assert_eq!(ctx.header("referer"), "");
    }

    #[test]
    fn test_string_sets_plain_text() {
        let req = request("GET", "/hello?name=go");
        let resp = run(&req, |c| {
            let name = c.query("name");
            c.string(StatusCode::OK, format_args!("hello, {name}"));
        });
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["content-type"], "text/plain");
        assert_eq!(text(resp), "hello, go");
    }

    #[test]
    fn test_html_is_verbatim() {
        let req = request("GET", "/");
        let resp = run(&req, |c| c.html(StatusCode::OK, "<h1>Hello <script>x</script></h1>"));
        assert_eq!(resp.headers()["content-type"], "text/html");
        assert_eq!(text(resp), "<h1>Hello <script>x</script></h1>");
    }

    #[test]
    fn test_data_sets_no_content_type() {
        let req = request("GET", "/raw");
        let resp = run(&req, |c| c.data(StatusCode::ACCEPTED, &[0, 159, 146, 150]));
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        assert!(resp.headers().get("content-type").is_none());
        assert_eq!(body_of(resp), vec![0, 159, 146, 150]);
    }

    #[test]
    fn test_data_keeps_header_set_beforehand() {
        let req = request("GET", "/raw");
        let resp = run(&req, |c| {
            c.set_header("Content-Type", "application/octet-stream");
            c.data(StatusCode::OK, b"bin");
        });
        assert_eq!(resp.headers()["content-type"], "application/octet-stream");
    }

    #[test]
    fn test_json_round_trip() {
        let req = request("GET", "/json");
        let mut expected = HashMap::new();
        expected.insert("username".to_string(), "geektutu".to_string());
        expected.insert("password".to_string(), "1234".to_string());

        let payload = expected.clone();
        let resp = run(&req, move |c| c.json(StatusCode::CREATED, &payload));
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(resp.headers()["content-type"], "application/json");

        let decoded: HashMap<String, String> = serde_json::from_slice(&body_of(resp)).unwrap();
        assert_eq!(decoded, expected);
    }

    #[test]
    fn test_json_failure_commits_clean_500() {
        let req = request("GET", "/json");
        let mut bad = HashMap::new();
        bad.insert((1, 2), "tuple keys are not valid JSON object keys");

        let mut writer = ResponseWriter::new();
        let mut ctx = Context::new(&req, &mut writer);
        ctx.json(StatusCode::OK, &bad);
        assert_eq!(ctx.status_code(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        let resp = writer.into_response();

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(resp.headers()["content-type"], "text/plain");
        let body = text(resp);
        assert!(!body.is_empty());
        assert!(!body.starts_with('{'));
    }

    #[test]
    fn test_header_after_status_has_no_effect() {
        let req = request("GET", "/late");
        let resp = run(&req, |c| {
            c.set_header("X-Early", "yes");
            c.status(StatusCode::OK);
            c.set_header("X-Late", "yes");
            c.set_header("X-Early", "changed");
            c.write(b"body");
        });
        assert_eq!(resp.headers()["x-early"], "yes");
        assert!(resp.headers().get("x-late").is_none());
        assert_eq!(text(resp), "body");
    }

    #[test]
    fn test_header_after_body_write_has_no_effect() {
        let req = request("GET", "/late");
        let resp = run(&req, |c| {
            c.string(StatusCode::OK, "done");
            c.set_header("Content-Type", "application/json");
        });
        assert_eq!(resp.headers()["content-type"], "text/plain");
    }

    #[test]
    fn test_second_status_is_ignored() {
        let req = request("GET", "/twice");
        let mut writer = ResponseWriter::new();
        let mut ctx = Context::new(&req, &mut writer);
        ctx.status(StatusCode::ACCEPTED);
        ctx.status(StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(ctx.status_code(), Some(StatusCode::ACCEPTED));
        assert!(ctx.is_committed());
        assert_eq!(writer.into_response().status(), StatusCode::ACCEPTED);
    }

    #[test]
    fn test_write_commits_implicit_ok() {
        let req = request("GET", "/write");
        let mut writer = ResponseWriter::new();
        let mut ctx = Context::new(&req, &mut writer);
        ctx.write(b"a");
        ctx.write(b"b");
        assert_eq!(ctx.status_code(), Some(StatusCode::OK));
        let resp = writer.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(text(resp), "ab");
    }

    #[test]
    fn test_untouched_response_is_empty_ok_with_staged_headers() {
        let req = request("GET", "/noop");
        let resp = run(&req, |c| c.set_header("X-Only", "staged"));
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["x-only"], "staged");
        assert!(body_of(resp).is_empty());
    }

    #[test]
    fn test_invalid_header_is_skipped() {
        let req = request("GET", "/bad-header");
        let resp = run(&req, |c| {
            c.set_header("Bad Header", "value");
            c.set_header("X-Ok", "bad\nvalue");
            c.status(StatusCode::NO_CONTENT);
        });
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert!(resp.headers().is_empty());
    }
}
