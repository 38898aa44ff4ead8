//! Client facade: `Agent::send` wires the proxy dialer, TLS upgrader,
//! request framer, response reader, redirect controller, keep-alive
//! controller, and cookie jar together into one call.
//!
//! `Agent` is a cheap-to-clone handle over `Arc`-shared mutable state (the
//! pool and the default cookie jar), plus per-verb convenience wrappers.

use std::net::TcpStream;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use crate::address::Address;
use crate::config::{AgentConfig, Timeouts, TlsConfig};
use crate::cookie::CookieJar;
use crate::error::Error;
use crate::pool::{self, Pool};
use crate::proxy::Proxy;
use crate::redirect;
use crate::request::{Method, Request};
use crate::response::Response;
use crate::stream::Stream;
use crate::tls::{self, TlsDiagnostics};

/// A request execution handle: cheap to clone, shares a connection pool
/// and (unless overridden per-request) a cookie jar with every clone.
#[derive(Clone)]
pub struct Agent {
    config: Arc<AgentConfig>,
    state: Arc<AgentState>,
}

struct AgentState {
    pool: Mutex<Pool>,
    jar: Arc<CookieJar>,
}

impl Default for Agent {
    fn default() -> Self {
        Agent::new(AgentConfig::default())
    }
}

impl Agent {
    pub fn new(config: AgentConfig) -> Agent {
        Agent {
            config: Arc::new(config),
            state: Arc::new(AgentState {
                pool: Mutex::new(Pool::new()),
                jar: Arc::new(CookieJar::new()),
            }),
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// The jar this agent attaches to requests that don't carry their
    /// own. A shared resource that may be held by multiple requests.
    pub fn jar(&self) -> Arc<CookieJar> {
        Arc::clone(&self.state.jar)
    }

    /// Build a request bound to this agent's default jar and config.
    pub fn request(&self, method: Method, url: &str) -> Result<Request, Error> {
        let mut req = Request::new(method, url)?;
        if self.config.policy.use_cookies {
            req = req.jar(self.jar());
        }
        Ok(req)
    }

    pub fn get(&self, url: &str) -> Result<Request, Error> {
        self.request(Method::Get, url)
    }

    pub fn head(&self, url: &str) -> Result<Request, Error> {
        self.request(Method::Head, url)
    }

    pub fn post(&self, url: &str) -> Result<Request, Error> {
        self.request(Method::Post, url)
    }

    pub fn put(&self, url: &str) -> Result<Request, Error> {
        self.request(Method::Put, url)
    }

    pub fn patch(&self, url: &str) -> Result<Request, Error> {
        self.request(Method::Patch, url)
    }

    pub fn delete(&self, url: &str) -> Result<Request, Error> {
        self.request(Method::Delete, url)
    }

    pub fn options(&self, url: &str) -> Result<Request, Error> {
        self.request(Method::Options, url)
    }

    /// Drive `request` through redirect-following and keep-alive reuse to
    /// completion. Equivalent to `send_cancelable(req, None)`.
    pub fn send(&self, request: Request) -> Result<Response, Error> {
        self.send_cancelable(request, None)
    }

    /// As [`Agent::send`], but checked against `cancel` before the TCP
    /// connect and before each TLS handshake step.
    pub fn send_cancelable(&self, mut request: Request, cancel: Option<&AtomicBool>) -> Result<Response, Error> {
        let policy = request.config.resolved_policy(&self.config);
        if policy.use_cookies && request.jar.is_none() {
            request.jar = Some(self.jar());
        }

        let mut redirect_count = 0u32;
        let mut middle_headers = Vec::new();
        let mut reconnect_count = 0u32;

        let mut req = request;
        loop {
            let (mut resp, attempts) = self.send_once_with_fail_reconnect(&mut req, cancel)?;
            reconnect_count += attempts;

            let policy = req.config.resolved_policy(&self.config);
            if policy.enable_middle_headers && resp.has_redirect() {
                middle_headers.push(resp.headers().clone());
            }

            match redirect::decide(req, &resp, &self.config, redirect_count)? {
                redirect::Decision::Surface | redirect::Decision::SurfaceExternal => {
                    resp.diagnostics_mut().reconnect_count = reconnect_count;
                    if !middle_headers.is_empty() {
                        if let Some(last) = middle_headers.pop() {
                            resp.set_middle_headers(last);
                        }
                    }
                    if resp.is_error() && !policy.ignore_protocol_errors {
                        return Err(Error::HttpStatus(Box::new(resp)));
                    }
                    return Ok(resp);
                }
                redirect::Decision::Follow(next) => {
                    redirect_count += 1;
                    req = *next;
                }
            }
        }
    }

    /// One logical request/response exchange, including a bounded
    /// fail-reconnect loop (a send/receive IOError retries the whole
    /// exchange up to `reconnect_limit` times). Returns the number of
    /// fail-reconnect attempts actually spent; a silent keep-alive
    /// reconnect (handled inside `send_once`) never contributes to this
    /// count -- it is not drawn from the reconnection budget.
    fn send_once_with_fail_reconnect(&self, req: &mut Request, cancel: Option<&AtomicBool>) -> Result<(Response, u32), Error> {
        let limit = if self.config.reconnect_enabled { self.config.reconnect_limit } else { 0 };
        let mut attempt = 0u32;

        loop {
            match self.send_once(req, cancel) {
                Ok(resp) => return Ok((resp, attempt)),
                Err(e) if matches!(e, Error::SendFailure(_) | Error::Io(_)) && attempt < limit => {
                    attempt += 1;
                    log::warn!("wirehttp: send/receive failed ({e}), fail-reconnect attempt {attempt}/{limit}");
                    self.state.pool.lock().expect("pool lock poisoned").drop_slot();
                    std::thread::sleep(self.config.reconnect_delay);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// A single attempt: acquire/establish a connection, write the
    /// request, read the response, update the pool and cookie jar. On a
    /// reused connection that produced an empty read, transparently
    /// re-opens and retries exactly once -- this function executes that
    /// silent reconnect itself, not the caller.
    fn send_once(&self, req: &mut Request, cancel: Option<&AtomicBool>) -> Result<Response, Error> {
        match self.send_once_inner(req, cancel, false) {
            Err(e) if e.is_empty_message_body() => {
                log::debug!("wirehttp: reused connection returned an empty response, reconnecting silently");
                self.send_once_inner(req, cancel, true)
            }
            other => other,
        }
    }

    /// `force_fresh` discards any pooled slot before connecting, used by
    /// the silent-reconnect retry so it cannot recurse onto the same
    /// dead connection.
    fn send_once_inner(&self, req: &mut Request, cancel: Option<&AtomicBool>, force_fresh: bool) -> Result<Response, Error> {
        check_cancel(cancel)?;

        let tls_config = req.config.resolved_tls(&self.config).clone();
        let timeouts = req.config.resolved_timeouts(&self.config);
        let proxy = self.resolve_proxy(req);
        let origin = req.address().origin();

        if force_fresh {
            self.state.pool.lock().expect("pool lock poisoned").drop_slot();
        }

        let pooled = self.state.pool.lock().expect("pool lock poisoned").acquire(&proxy, &origin);
        let (stream, tls_diagnostics, served_before) = match pooled {
            Some((stream, diag, served)) => (stream, diag, served),
            None => {
                let (stream, diag) = self.connect(req.address(), proxy.as_ref(), &tls_config, timeouts, cancel)?;
                (stream, diag, 0)
            }
        };

        match self.exchange(req, stream, proxy.as_ref(), &timeouts) {
            Ok((mut resp, stream, close)) => {
                resp.diagnostics_mut().tls = tls_diagnostics.clone();

                if let Some(jar) = req.jar.clone() {
                    self.apply_set_cookies(&jar, req.address(), &resp)?;
                }

                let server_ka = resp.header("keep-alive").map(pool::parse_keep_alive_header);

                self.state.pool.lock().expect("pool lock poisoned").put_back(
                    stream,
                    proxy,
                    origin,
                    tls_diagnostics,
                    close,
                    served_before + 1,
                    server_ka,
                    self.config.max_keep_alive_requests,
                    self.config.keep_alive_timeout,
                );

                Ok(resp)
            }
            Err(e) => {
                self.state.pool.lock().expect("pool lock poisoned").drop_slot();
                Err(e)
            }
        }
    }

    /// Write the request and read the response over an established
    /// `stream`. Returns the parsed response, the stream (ready for the
    /// caller to decide pool reuse), and whether the server asked for the
    /// connection to close.
    fn exchange(&self, req: &mut Request, mut stream: Stream, proxy: Option<&Proxy>, timeouts: &Timeouts) -> Result<(Response, Stream, bool), Error> {
        stream.set_read_timeout(timeouts.read_write).ok();
        stream.set_write_timeout(timeouts.read_write).ok();

        let upload_progress = req.upload_progress.take();
        let download_progress = req.download_progress.take();

        crate::request::write_to(req, &mut stream, &self.config, proxy, upload_progress)?;

        let method = req.method().as_str().to_string();
        let (resp, stream, close, _cookies) = crate::response::read(stream, &method, timeouts.read_write, download_progress)?;
        Ok((resp, stream, close))
    }

    /// Feed every raw `Set-Cookie` header from `resp` into `jar`, in
    /// header order.
    fn apply_set_cookies(&self, jar: &CookieJar, addr: &Address, resp: &Response) -> Result<(), Error> {
        for raw in resp.all("set-cookie") {
            jar.set(
                addr,
                raw,
                self.config.escape_values_on_receive,
                self.config.ignore_invalid_cookie,
                self.config.ignore_set_for_expired_cookies,
                self.config.expire_before_set,
            )?;
        }
        Ok(())
    }

    /// Request-local override > agent-global > none; optionally bypassed
    /// for loopback destinations.
    fn resolve_proxy(&self, req: &Request) -> Option<Proxy> {
        let proxy = req.config.resolved_proxy(&self.config);
        if self.config.bypass_proxy_for_loopback && is_loopback(req.address().host()) {
            return None;
        }
        proxy
    }

    /// Establish a fresh connection slot: dial (direct or through the
    /// proxy), then TLS-upgrade if the target is `https`.
    fn connect(
        &self,
        addr: &Address,
        proxy: Option<&Proxy>,
        tls_config: &TlsConfig,
        timeouts: Timeouts,
        cancel: Option<&AtomicBool>,
    ) -> Result<(Stream, Option<TlsDiagnostics>), Error> {
        check_cancel(cancel)?;

        if self.config.https_only && !addr.is_https() {
            return Err(Error::InvalidInput(format!("https_only is set, refusing to connect to {}", addr.as_str())));
        }

        log::debug!("wirehttp: connecting to {}:{} proxy={:?}", addr.host(), addr.port(), proxy.map(|p| p.host()));

        let stream = match proxy {
            Some(p) => p.dial(addr.host(), addr.port(), timeouts.connect, timeouts.read_write)?,
            None => crate::proxy::dial_direct(addr.host(), addr.port(), timeouts.connect)?,
        };

        if !addr.is_https() {
            return Ok((stream, None));
        }

        check_cancel(cancel)?;

        let tcp: TcpStream = stream.into_tcp()?;
        let (tls_stream, diagnostics) = tls::upgrade(tcp, addr.host(), tls_config, timeouts.read_write)?;
        Ok((tls_stream, Some(diagnostics)))
    }
}

fn check_cancel(cancel: Option<&AtomicBool>) -> Result<(), Error> {
    if cancel.map(|c| c.load(std::sync::atomic::Ordering::Relaxed)).unwrap_or(false) {
        return Err(Error::ConnectFailure("cancelled".into()));
    }
    Ok(())
}

fn is_loopback(host: &str) -> bool {
    host == "localhost" || host.parse::<std::net::IpAddr>().map(|ip| ip.is_loopback()).unwrap_or(false)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn loopback_detection() {
        assert!(is_loopback("localhost"));
        assert!(is_loopback("127.0.0.1"));
        assert!(is_loopback("::1"));
        assert!(!is_loopback("example.com"));
    }

    #[test]
    fn agent_attaches_default_jar_when_cookies_enabled() {
        let agent = Agent::new(AgentConfig::default());
        let req = agent.get("http://example.com/x").unwrap();
        assert!(req.jar.is_some());
    }
}
