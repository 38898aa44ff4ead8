//! Parsed response: status line, headers, framed body.
//!
//! The body is read fully at receive time rather than streamed lazily off
//! a reader holding a raw pointer back into the pool -- that trick is
//! unsafe and this crate has only one connection slot to give back, so
//! the simpler, safe choice is to fully drain the body before the slot is
//! offered for reuse (see DESIGN.md).

use std::io::Read;
use std::time::Duration;

use crate::chunked::ChunkedDecoder;
use crate::decode::ContentDecoder;
use crate::error::Error;
use crate::header::HeaderMap;
use crate::recv::ReceiverHelper;
use crate::send_body::ProgressCallback;
use crate::tls::TlsDiagnostics;

/// A `Read` wrapper that reports bytes pulled off the wire so far to a
/// download-progress callback, with `total` fixed at construction time
/// from the response's `Content-Length` header when present.
struct ProgressRead<'a, R> {
    inner: R,
    received: u64,
    total: Option<u64>,
    callback: ProgressCallback<'a>,
}

impl<'a, R: Read> ProgressRead<'a, R> {
    fn new(inner: R, total: Option<u64>, callback: ProgressCallback<'a>) -> Self {
        ProgressRead {
            inner,
            received: 0,
            total,
            callback,
        }
    }
}

impl<R: Read> Read for ProgressRead<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            self.received += n as u64;
            (self.callback)(self.received, self.total);
        }
        Ok(n)
    }
}

/// Status codes that always carry a zero-length body regardless of
/// framing headers.
fn is_headless_body(method: &str, status: u16) -> bool {
    method.eq_ignore_ascii_case("HEAD") || matches!(status, 100 | 204 | 304)
}

/// Diagnostic information collected while establishing the connection and
/// driving this response.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    pub tls: Option<TlsDiagnostics>,
    pub reconnect_count: u32,
}

/// A fully-received HTTP response.
pub struct Response {
    http_version: String,
    status: u16,
    status_text: String,
    headers: HeaderMap,
    middle_headers: Option<HeaderMap>,
    diagnostics: Diagnostics,
    body: Vec<u8>,
}

impl Response {
    pub fn http_version(&self) -> &str {
        &self.http_version
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.headers.has(name)
    }

    pub fn all(&self, name: &str) -> Vec<&str> {
        self.headers.get_all(name)
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Headers captured from every intermediate 3xx hop, keyed by last
    /// occurrence, when `enable_middle_headers` was set.
    pub fn middle_headers(&self) -> Option<&HeaderMap> {
        self.middle_headers.as_ref()
    }

    pub(crate) fn set_middle_headers(&mut self, h: HeaderMap) {
        self.middle_headers = Some(h);
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub(crate) fn diagnostics_mut(&mut self) -> &mut Diagnostics {
        &mut self.diagnostics
    }

    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// True iff the status is 3xx or a `Location`/`Redirect-Location`
    /// header is present.
    pub fn has_redirect(&self) -> bool {
        (300..400).contains(&self.status) || self.has("location") || self.has("redirect-location")
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }

    pub fn is_error(&self) -> bool {
        self.is_client_error() || self.is_server_error()
    }

    /// The response body bytes, already decoded per the framing and
    /// content-coding headers at receive time.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn into_body(self) -> Vec<u8> {
        self.body
    }

    /// A fresh `Read` over the already-decoded body bytes, for callers
    /// that want a `Read`-shaped interface (e.g. `serde_json::from_reader`
    /// equivalents the ergonomic layer may build on top).
    pub fn into_reader(self) -> impl Read {
        std::io::Cursor::new(self.body)
    }

    pub fn into_string(self) -> Result<String, Error> {
        String::from_utf8(self.body).map_err(|e| Error::receive(format!("response body is not UTF-8: {e}"), false))
    }

    /// The `Content-Type` header with any `charset=` parameter stripped off.
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type").map(|v| v.split(';').next().unwrap_or(v).trim())
    }

    /// The `charset` parameter of `Content-Type`, if present.
    pub fn charset(&self) -> Option<&str> {
        self.header("content-type")?.split(';').skip(1).find_map(|param| {
            let (name, value) = param.split_once('=')?;
            if name.trim().eq_ignore_ascii_case("charset") {
                Some(value.trim().trim_matches('"'))
            } else {
                None
            }
        })
    }
}

/// Parse the status line and headers off `stream`, then read and decode
/// the body per the framing decision tree below. Returns the parsed
/// response, the connection back (always fully drained, ready for reuse),
/// whether the server asked for the connection to close, and the raw
/// `Set-Cookie` values in header order (for the caller to feed the jar).
pub(crate) fn read<R: Read>(
    stream: R,
    method: &str,
    read_write_timeout: Duration,
    download_progress: Option<ProgressCallback<'_>>,
) -> Result<(Response, R, bool, Vec<String>), Error> {
    let mut helper = ReceiverHelper::new(stream, read_write_timeout);

    let (http_version, status, status_text) = read_status_line(&mut helper)?;

    let mut headers = HeaderMap::new();
    let mut set_cookies = Vec::new();
    loop {
        let line = helper
            .read_line()?
            .ok_or_else(|| Error::receive("connection closed while reading headers", false))?;
        if line.is_empty() {
            break;
        }
        let (name, value) = split_header_line(&line)?;
        if name.eq_ignore_ascii_case("set-cookie") {
            set_cookies.push(value.to_string());
            headers.append(name, value);
        } else {
            headers.set(name, value);
        }
    }

    let connection_close = header_is_close(&headers, "connection") || header_is_close(&headers, "proxy-connection");

    let body = if is_headless_body(method, status) {
        Vec::new()
    } else {
        read_body(&mut helper, &headers, download_progress)?
    };

    let stream = helper.into_inner();

    let response = Response {
        http_version,
        status,
        status_text,
        headers,
        middle_headers: None,
        diagnostics: Diagnostics::default(),
        body,
    };

    Ok((response, stream, connection_close, set_cookies))
}

fn header_is_close(headers: &HeaderMap, name: &str) -> bool {
    headers.get(name).map(|v| v.eq_ignore_ascii_case("close")).unwrap_or(false)
}

/// Read lines until a non-empty one arrives, ignoring leading empty lines
/// and tolerant of stray CRLFs, then parse it as
/// `HTTP/<version> <status> [reason]`.
fn read_status_line<R: Read>(helper: &mut ReceiverHelper<R>) -> Result<(String, u16, String), Error> {
    const MAX_LEADING_BLANK_LINES: usize = 25;

    for _ in 0..=MAX_LEADING_BLANK_LINES {
        let line = helper.read_line()?.ok_or_else(Error::empty_message_body)?;
        if line.is_empty() {
            continue;
        }
        return parse_status_line(&line);
    }

    Err(Error::receive("too many leading blank lines before status", false))
}

fn parse_status_line(line: &str) -> Result<(String, u16, String), Error> {
    let version_end = line
        .find(' ')
        .ok_or_else(|| Error::receive(format!("malformed status line {line:?}"), false))?;
    let version = line[..version_end]
        .strip_prefix("HTTP/")
        .ok_or_else(|| Error::receive(format!("malformed status line {line:?}"), false))?
        .to_string();

    let rest = line[version_end + 1..].trim_start();
    let (status_str, reason) = match rest.find(' ') {
        Some(i) => (&rest[..i], rest[i + 1..].trim()),
        None => (rest, ""),
    };

    let status: u16 = status_str
        .parse()
        .map_err(|_| Error::receive(format!("malformed status code {status_str:?}"), false))?;

    Ok((version, status, reason.to_string()))
}

fn split_header_line(line: &str) -> Result<(&str, &str), Error> {
    let (name, value) = line
        .split_once(':')
        .ok_or_else(|| Error::receive(format!("malformed header line {line:?}"), false))?;
    Ok((name.trim(), value.trim_matches(|c| c == ' ' || c == '\t' || c == '\r' || c == '\n')))
}

/// Evaluate the body-framing decision tree and return the fully decoded
/// body. When `progress` is given, it is invoked after each
/// read off the raw (pre-decode) transport bytes, so its totals reflect
/// what was actually received on the wire rather than the decoded size.
fn read_body<R: Read>(helper: &mut ReceiverHelper<R>, headers: &HeaderMap, progress: Option<ProgressCallback<'_>>) -> Result<Vec<u8>, Error> {
    let chunked = headers
        .get("transfer-encoding")
        .map(|v| v.eq_ignore_ascii_case("chunked"))
        .unwrap_or(false);
    let content_length = headers.get("content-length").and_then(|v| v.trim().parse::<u64>().ok());
    let content_encoding = headers.get("content-encoding");

    let mut out = Vec::new();

    match progress {
        Some(cb) => {
            if chunked {
                let progress_src = ProgressRead::new(ChunkedDecoder::new(helper), None, cb);
                let mut decoder = ContentDecoder::new(progress_src, content_encoding)?;
                decoder
                    .read_to_end(&mut out)
                    .map_err(|e| Error::receive(e.to_string(), false))?;
            } else if let Some(len) = content_length {
                let progress_src = ProgressRead::new(helper.take(len), Some(len), cb);
                let mut decoder = ContentDecoder::new(progress_src, content_encoding)?;
                decoder
                    .read_to_end(&mut out)
                    .map_err(|e| Error::receive(e.to_string(), false))?;
            } else {
                let progress_src = ProgressRead::new(&mut *helper, None, cb);
                let mut decoder = ContentDecoder::new(progress_src, content_encoding)?;
                decoder
                    .read_to_end(&mut out)
                    .map_err(|e| Error::receive(e.to_string(), false))?;
            }
        }
        None => {
            if chunked {
                let mut decoder = ContentDecoder::new(ChunkedDecoder::new(helper), content_encoding)?;
                decoder
                    .read_to_end(&mut out)
                    .map_err(|e| Error::receive(e.to_string(), false))?;
            } else if let Some(len) = content_length {
                let mut decoder = ContentDecoder::new(helper.take(len), content_encoding)?;
                decoder
                    .read_to_end(&mut out)
                    .map_err(|e| Error::receive(e.to_string(), false))?;
            } else {
                let mut decoder = ContentDecoder::new(&mut *helper, content_encoding)?;
                decoder
                    .read_to_end(&mut out)
                    .map_err(|e| Error::receive(e.to_string(), false))?;
            }
        }
    }

    Ok(out)
}

/// Test-only constructors used by sibling modules' unit tests (redirect
/// controller, pool) that need a `Response` without driving a real
/// socket.
#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub(crate) fn build(status: u16, headers: HeaderMap, body: Vec<u8>, diagnostics: Diagnostics) -> Response {
        Response {
            http_version: "1.1".to_string(),
            status,
            status_text: String::new(),
            headers,
            middle_headers: None,
            diagnostics,
            body,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    fn read_resp(raw: &[u8], method: &str) -> (Response, bool, Vec<String>) {
        let (resp, _stream, close, cookies) = read(Cursor::new(raw.to_vec()), method, Duration::from_secs(1), None).unwrap();
        (resp, close, cookies)
    }

    #[test]
    fn plain_identity_body() {
        let (resp, _close, _cookies) = read_resp(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello", "GET");
        assert_eq!(resp.status(), 200);
        assert!(resp.is_ok());
        assert!(!resp.has_redirect());
        assert_eq!(resp.body(), b"hello");
    }

    #[test]
    fn chunked_body_is_decoded() {
        let raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nhel\r\n2\r\nlo\r\n0\r\n\r\n";
        let (resp, _close, _cookies) = read_resp(raw, "GET");
        assert_eq!(resp.body(), b"hello");
    }

    #[test]
    fn download_progress_reports_bytes_and_known_total() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello";
        let ticks = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let ticks_clone = ticks.clone();
        let cb: ProgressCallback<'_> = Box::new(move |sent, total| ticks_clone.lock().unwrap().push((sent, total)));

        let (resp, _stream, _close, _cookies) = read(Cursor::new(raw.to_vec()), "GET", Duration::from_secs(1), Some(cb)).unwrap();

        assert_eq!(resp.body(), b"hello");
        let recorded = ticks.lock().unwrap();
        assert!(!recorded.is_empty());
        assert_eq!(recorded.last(), Some(&(5u64, Some(5u64))));
    }

    #[test]
    fn head_response_has_no_body_even_with_content_length() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\n";
        let (resp, _close, _cookies) = read_resp(raw, "HEAD");
        assert_eq!(resp.body(), b"");
    }

    #[test]
    fn connection_close_header_is_detected() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";
        let (_resp, close, _cookies) = read_resp(raw, "GET");
        assert!(close);
    }

    #[test]
    fn set_cookie_headers_are_collected_in_order() {
        let raw = b"HTTP/1.1 200 OK\r\nSet-Cookie: a=1\r\nSet-Cookie: b=2\r\nContent-Length: 0\r\n\r\n";
        let (_resp, _close, cookies) = read_resp(raw, "GET");
        assert_eq!(cookies, vec!["a=1".to_string(), "b=2".to_string()]);
    }

    #[test]
    fn leading_blank_lines_before_status_are_tolerated() {
        let raw = b"\r\n\r\nHTTP/1.1 204 No Content\r\n\r\n";
        let (resp, _close, _cookies) = read_resp(raw, "GET");
        assert_eq!(resp.status(), 204);
    }

    #[test]
    fn empty_connection_before_status_is_empty_message_body() {
        let err = read(Cursor::new(Vec::new()), "GET", Duration::from_secs(1), None).unwrap_err();
        assert!(err.is_empty_message_body());
    }
}
