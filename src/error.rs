use std::fmt;
use std::io;

use crate::response::Response;

/// Errors produced while establishing a connection, driving a request
/// over the wire, or parsing the response.
#[derive(Debug)]
pub enum Error {
    /// TCP connect failed or timed out, a TLS handshake failed, or the
    /// proxy greeting/handshake was rejected.
    ConnectFailure(String),
    /// Socket error or timeout while writing the request.
    SendFailure(String),
    /// Socket error, timeout, or malformed response while reading.
    ReceiveFailure {
        /// Human readable detail.
        reason: String,
        /// Set when the failure was an empty read on the status line of
        /// a reused connection -- the trigger for the silent keep-alive
        /// reconnect.
        empty_message_body: bool,
    },
    /// A 4xx/5xx surfaced as an error because `ignore_protocol_errors`
    /// is false, or the redirect count was exceeded.
    ProtocolError(String),
    /// A proxy protocol (SOCKS4/4a/5, Azadi, HTTP CONNECT) rejected the
    /// handshake.
    ProxyError(ProxyErrorKind),
    /// A `Set-Cookie` used a reserved character or `$`-prefixed name and
    /// `ignore_invalid_cookie` was false.
    InvalidCookie(String),
    /// Caller violated an argument contract (empty host, bad port, ...).
    InvalidInput(String),
    /// Content-Encoding other than identity/gzip/deflate.
    InvalidEncoding(String),
    /// The url could not be understood.
    BadUrl(String),
    /// Some unspecified `std::io::Error`.
    Io(io::Error),
    /// A response carried an HTTP status code treated as an error because
    /// `ignore_protocol_errors` is false. Carries the response so the
    /// caller can still inspect headers/body.
    HttpStatus(Box<Response>),
}

/// Reasons a proxy handshake was rejected at the protocol level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyErrorKind {
    /// SOCKS4: request rejected or failed.
    Socks4RequestRejected,
    /// SOCKS4: client is not running identd (or not reachable from the server).
    Socks4IdentUnreachable,
    /// SOCKS4: client's identd and the user-id reported by the client differ.
    Socks4IdentMismatch,
    /// SOCKS5: general failure reported by the server.
    Socks5GeneralFailure,
    /// SOCKS5: connection not allowed by ruleset.
    Socks5NotAllowed,
    /// SOCKS5: network unreachable.
    Socks5NetworkUnreachable,
    /// SOCKS5: host unreachable.
    Socks5HostUnreachable,
    /// SOCKS5: connection refused.
    Socks5ConnectionRefused,
    /// SOCKS5: TTL expired.
    Socks5TtlExpired,
    /// SOCKS5: command not supported.
    Socks5CommandNotSupported,
    /// SOCKS5: address type not supported.
    Socks5AddressTypeNotSupported,
    /// SOCKS5: username/password authentication failed.
    Socks5AuthFailed,
    /// HTTP CONNECT did not reply 200.
    ConnectNonOk(u16),
    /// Azadi: login (credentials) rejected.
    AzadiLogin,
    /// Azadi: target host rejected by the proxy.
    AzadiHost,
    /// Azadi: the remote side of the tunnel failed.
    AzadiRemote,
    /// Azadi: an unrecognized reply code.
    AzadiUnknown(u32),
}

impl Error {
    pub(crate) fn connect(reason: impl Into<String>) -> Error {
        Error::ConnectFailure(reason.into())
    }

    /// A connect failure tagged with a sub-kind, e.g. `"ssl"` for TLS
    /// handshake failures.
    pub(crate) fn connect_tagged(reason: impl Into<String>, tag: &str) -> Error {
        Error::ConnectFailure(format!("[{tag}] {}", reason.into()))
    }

    pub(crate) fn receive(reason: impl Into<String>, empty_message_body: bool) -> Error {
        Error::ReceiveFailure {
            reason: reason.into(),
            empty_message_body,
        }
    }

    pub(crate) fn empty_message_body() -> Error {
        Error::ReceiveFailure {
            reason: "empty response".into(),
            empty_message_body: true,
        }
    }

    /// True iff this is the specific "reused connection returned nothing"
    /// failure that drives the silent keep-alive reconnect.
    pub fn is_empty_message_body(&self) -> bool {
        matches!(
            self,
            Error::ReceiveFailure {
                empty_message_body: true,
                ..
            }
        )
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ConnectFailure(r) => write!(f, "connect failure: {r}"),
            Error::SendFailure(r) => write!(f, "send failure: {r}"),
            Error::ReceiveFailure { reason, .. } => write!(f, "receive failure: {reason}"),
            Error::ProtocolError(r) => write!(f, "protocol error: {r}"),
            Error::ProxyError(k) => write!(f, "proxy error: {k:?}"),
            Error::InvalidCookie(r) => write!(f, "invalid cookie: {r}"),
            Error::InvalidInput(r) => write!(f, "invalid input: {r}"),
            Error::InvalidEncoding(r) => write!(f, "invalid content-encoding: {r}"),
            Error::BadUrl(r) => write!(f, "bad url: {r}"),
            Error::Io(e) => write!(f, "io error: {e}"),
            Error::HttpStatus(resp) => write!(f, "http status error: {}", resp.status()),
        }
    }
}

impl std::error::Error for Error {}
