//! Request model and wire serialization.
//!
//! The prelude (request line, headers, blank line) is assembled into a
//! single `Vec<u8>` and written with one `write_all`, then the body is
//! streamed separately.

use std::io::Write;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;

use crate::address::Address;
use crate::config::{AgentConfig, RequestConfig};
use crate::cookie::CookieJar;
use crate::header::{is_reserved, HeaderMap};
use crate::proxy::Proxy;
use crate::send_body::{ContentSource, ProgressCallback};
use crate::Error;

/// An HTTP request method: GET, HEAD, POST, PUT, PATCH, DELETE, OPTIONS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Options => "OPTIONS",
        }
    }

    /// Methods that carry a request body: POST, PUT, PATCH, DELETE.
    pub(crate) fn allows_body(&self) -> bool {
        matches!(self, Method::Post | Method::Put | Method::Patch | Method::Delete)
    }
}

/// One outgoing request.
pub struct Request {
    pub(crate) method: Method,
    pub(crate) address: Address,
    pub(crate) permanent_headers: HeaderMap,
    pub(crate) temporary_headers: HeaderMap,
    pub(crate) body: ContentSource,
    pub(crate) jar: Option<Arc<CookieJar>>,
    pub(crate) config: RequestConfig,
    pub(crate) upload_progress: Option<ProgressCallback<'static>>,
    pub(crate) download_progress: Option<ProgressCallback<'static>>,
}

impl Request {
    pub fn new(method: Method, url: &str) -> Result<Request, Error> {
        Ok(Request {
            method,
            address: Address::parse(url)?,
            permanent_headers: HeaderMap::new(),
            temporary_headers: HeaderMap::new(),
            body: ContentSource::Empty,
            jar: None,
            config: RequestConfig::default(),
            upload_progress: None,
            download_progress: None,
        })
    }

    /// Register a callback invoked after each chunk of the request body is
    /// written to the socket, as `(bytes_sent, total)` with `total` `None`
    /// when the body source has no known length.
    pub fn on_upload_progress(mut self, f: impl FnMut(u64, Option<u64>) + Send + 'static) -> Request {
        self.upload_progress = Some(Box::new(f));
        self
    }

    /// Register a callback invoked as the response body is read off the
    /// socket, as `(bytes_received, total)` with `total` `None` when the
    /// response carries no `Content-Length`.
    pub fn on_download_progress(mut self, f: impl FnMut(u64, Option<u64>) + Send + 'static) -> Request {
        self.download_progress = Some(Box::new(f));
        self
    }

    /// Set a permanent header. Rejected for reserved, framer-managed
    /// names: `Host`, `Content-Length`, `Content-Type`, `Connection`,
    /// `Proxy-Connection`, `Accept-Encoding`.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Result<Request, Error> {
        let name = name.into();
        if is_reserved(&name) {
            return Err(Error::InvalidInput(format!("{name} is a reserved, framer-managed header")));
        }
        self.permanent_headers.set(name, value);
        Ok(self)
    }

    /// Set a temporary header, erased after one send (carried across
    /// same-host redirects only when `keep_temporary_headers_on_redirect`
    /// is set).
    pub fn temporary_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Result<Request, Error> {
        let name = name.into();
        if is_reserved(&name) {
            return Err(Error::InvalidInput(format!("{name} is a reserved, framer-managed header")));
        }
        self.temporary_headers.set(name, value);
        Ok(self)
    }

    pub fn body(mut self, body: ContentSource) -> Request {
        self.body = body;
        self
    }

    pub fn jar(mut self, jar: Arc<CookieJar>) -> Request {
        self.jar = Some(jar);
        self
    }

    pub fn config(mut self, config: RequestConfig) -> Request {
        self.config = config;
        self
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn address(&self) -> &Address {
        &self.address
    }
}

/// Write the request line, assembled headers, cookies, and body to
/// `sink`, in a fixed order. `active_proxy` is the proxy this request is
/// being sent through, if any (affects `Proxy-*` headers and
/// absolute-URI start lines).
pub(crate) fn write_to(
    req: &mut Request,
    sink: &mut impl Write,
    agent: &AgentConfig,
    active_proxy: Option<&Proxy>,
    progress: Option<ProgressCallback<'_>>,
) -> Result<(), Error> {
    let mut prelude: Vec<u8> = Vec::new();

    let target = if active_proxy.map(|p| p.kind().is_http_type()).unwrap_or(false) && agent.absolute_uri_in_start_line {
        req.address.as_str().to_string()
    } else {
        req.address.path_and_query()
    };

    write!(prelude, "{} {} HTTP/1.1\r\n", req.method.as_str(), target).map_err(|e| Error::SendFailure(e.to_string()))?;

    let base = build_base_headers(req, agent, active_proxy)?;

    let mut headers = base;
    headers.overlay(&req.permanent_headers);
    headers.overlay(&req.temporary_headers);

    for h in headers.iter() {
        write!(prelude, "{}: {}\r\n", h.name(), h.value()).map_err(|e| Error::SendFailure(e.to_string()))?;
    }

    if agent.policy.use_cookies && !headers.has("cookie") {
        if let Some(jar) = &req.jar {
            let lines = jar.cookie_headers(&req.address, agent.policy.cookie_single_header, agent.unescape_values_on_send());
            for v in lines {
                write!(prelude, "Cookie: {v}\r\n").map_err(|e| Error::SendFailure(e.to_string()))?;
            }
        }
    }

    write!(prelude, "\r\n").map_err(|e| Error::SendFailure(e.to_string()))?;

    sink.write_all(&prelude).map_err(|e| Error::SendFailure(e.to_string()))?;

    if req.method.allows_body() {
        req.body.write_to(sink, agent.tcp_send_buffer_size, progress)?;
    }

    Ok(())
}

/// Compute the base header map, before the permanent/temporary overlays.
fn build_base_headers(req: &Request, agent: &AgentConfig, active_proxy: Option<&Proxy>) -> Result<HeaderMap, Error> {
    let mut headers = HeaderMap::new();

    // 1. Host
    headers.set("Host", req.address.host_header_value());

    // 2. Proxy-Connection or Connection. This engine always asks to keep
    // the connection open; the pool tears it down itself on a server
    // `Connection: close` or an expired keep-alive budget.
    if active_proxy.map(|p| p.kind().is_http_type()).unwrap_or(false) {
        headers.set("Proxy-Connection", "keep-alive");
    } else {
        headers.set("Connection", "keep-alive");
    }

    // 3. Proxy-Authorization
    if let Some(proxy) = active_proxy {
        if proxy.kind().is_http_type() {
            if let (Some(user), Some(pass)) = (proxy.username(), proxy.password()) {
                let creds = BASE64_STANDARD.encode(format!("{user}:{pass}"));
                headers.set("Proxy-Authorization", format!("Basic {creds}"));
            }
        }
    }

    // 4. Authorization
    if !req.address.username().is_empty() || req.address.password().is_some() {
        let user = req.address.username();
        let pass = req.address.password().unwrap_or_default();
        let creds = BASE64_STANDARD.encode(format!("{user}:{pass}"));
        headers.set("Authorization", format!("Basic {creds}"));
    }

    // 5. Accept-Encoding
    if agent.accept_encoding {
        headers.set("Accept-Encoding", "gzip,deflate");
    }

    // 6. Accept-Language
    headers.set("Accept-Language", accept_language(&agent.locale));

    // 7. Accept-Charset
    headers.set("Accept-Charset", accept_charset(&agent.charset));

    // 8. Content-Type / Content-Length for bodyful methods
    if req.method.allows_body() {
        if let Some(ct) = req.body.content_type() {
            headers.set("Content-Type", ct);
        }
        if let Some(len) = req.body.content_length()? {
            headers.set("Content-Length", len.to_string());
        }
    }

    Ok(headers)
}

fn accept_language(locale: &str) -> String {
    if locale.eq_ignore_ascii_case("en") || locale.to_ascii_lowercase().starts_with("en-") {
        locale.to_string()
    } else {
        format!("{locale}-{},{locale};q=0.8,en-US;q=0.6,en;q=0.4", locale.to_ascii_uppercase())
    }
}

fn accept_charset(charset: &str) -> String {
    if charset.eq_ignore_ascii_case("utf-8") {
        "utf-8;q=0.7,*;q=0.3".to_string()
    } else {
        format!("{charset},utf-8;q=0.7,*;q=0.3")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn write_prelude(req: &mut Request, agent: &AgentConfig) -> String {
        let mut out = Vec::new();
        write_to(req, &mut out, agent, None, None).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn get_request_has_no_content_length() {
        let mut req = Request::new(Method::Get, "http://example.com/x").unwrap();
        let agent = AgentConfig::builder().proxy(None).build();
        let out = write_prelude(&mut req, &agent);
        assert!(out.starts_with("GET /x HTTP/1.1\r\n"));
        assert!(!out.to_ascii_lowercase().contains("content-length"));
        assert!(out.contains("Host: example.com\r\n"));
    }

    #[test]
    fn post_with_body_sets_content_length_and_type() {
        let mut req = Request::new(Method::Post, "http://example.com/x")
            .unwrap()
            .body(ContentSource::text("hi"));
        let agent = AgentConfig::builder().proxy(None).build();
        let out = write_prelude(&mut req, &agent);
        assert!(out.contains("Content-Length: 2\r\n"));
        assert!(out.contains("Content-Type: text/plain"));
        assert!(out.ends_with("hi"));
    }

    #[test]
    fn permanent_and_temporary_headers_overlay_base() {
        let mut req = Request::new(Method::Get, "http://example.com/x")
            .unwrap()
            .header("X-A", "perm")
            .unwrap()
            .temporary_header("X-A", "temp")
            .unwrap();
        let agent = AgentConfig::builder().proxy(None).build();
        let out = write_prelude(&mut req, &agent);
        assert!(out.contains("X-A: temp\r\n"));
        assert!(!out.contains("X-A: perm"));
    }

    #[test]
    fn reserved_header_is_rejected() {
        let req = Request::new(Method::Get, "http://example.com/x").unwrap();
        assert!(req.header("Host", "evil.example").is_err());
    }

    #[test]
    fn upload_progress_callback_fires_with_known_total() {
        let ticks = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let ticks_clone = ticks.clone();
        let mut req = Request::new(Method::Post, "http://example.com/x")
            .unwrap()
            .body(ContentSource::text("hello"))
            .on_upload_progress(move |sent, total| ticks_clone.lock().unwrap().push((sent, total)));

        let agent = AgentConfig::builder().proxy(None).build();
        let progress = req.upload_progress.take();
        let mut out = Vec::new();
        write_to(&mut req, &mut out, &agent, None, progress).unwrap();

        let recorded = ticks.lock().unwrap();
        assert_eq!(recorded.last(), Some(&(5u64, Some(5u64))));
    }
}
