//! wirehttp: a client-side HTTP/1.1 engine with hand-rolled wire framing,
//! proxy tunneling (direct, HTTP CONNECT, SOCKS4/4a/5, Azadi), a TLS
//! upgrader, redirect following, keep-alive reuse, and a cookie jar.
//!
//!
//! ```no_run
//! use wirehttp::Agent;
//!
//! let agent = Agent::default();
//! let response = agent.get("https://example.com/")?.call()?;
//! # Ok::<(), wirehttp::Error>(())
//! ```
//!
//! The snippet above uses `Request::call`, a thin convenience alias for
//! `Agent::send` kept on `Request` itself; see [`Request`] and [`Agent`].

mod address;
mod agent;
mod chunked;
mod config;
mod decode;
mod error;
mod header;
mod pool;
mod proxy;
mod recv;
mod redirect;
mod request;
mod response;
mod send_body;
mod stream;

#[cfg(feature = "cookies")]
pub mod cookie;

#[cfg(feature = "rustls")]
pub mod tls;

pub use address::Address;
pub use agent::Agent;
pub use config::{AgentConfig, AgentConfigBuilder, ClientCertKey, PolicyFlags, RedirectAuthHeaders, RequestConfig, RequestConfigBuilder, Timeouts, TlsConfig, TlsConfigBuilder};
pub use error::{Error, ProxyErrorKind};
pub use header::{HeaderField, HeaderMap};
pub use proxy::{Proxy, ProxyKind};
pub use request::{Method, Request};
pub use response::{Diagnostics, Response};
pub use send_body::{ContentSource, MultipartField, ProgressCallback};

#[cfg(feature = "cookies")]
pub use cookie::{Cookie, CookieJar};

#[cfg(feature = "rustls")]
pub use tls::TlsDiagnostics;

impl Request {
    /// Send this request on a use-once default [`Agent`].
    pub fn call(self) -> Result<Response, Error> {
        Agent::default().send(self)
    }
}

/// Build a [`Request`] on a use-once default [`Agent`], for callers that
/// don't need to build an [`Agent`] first.
pub fn get(url: &str) -> Result<Request, Error> {
    Agent::default().get(url)
}

pub fn head(url: &str) -> Result<Request, Error> {
    Agent::default().head(url)
}

pub fn post(url: &str) -> Result<Request, Error> {
    Agent::default().post(url)
}

pub fn put(url: &str) -> Result<Request, Error> {
    Agent::default().put(url)
}

pub fn patch(url: &str) -> Result<Request, Error> {
    Agent::default().patch(url)
}

pub fn delete(url: &str) -> Result<Request, Error> {
    Agent::default().delete(url)
}

pub fn options(url: &str) -> Result<Request, Error> {
    Agent::default().options(url)
}
