//! The byte stream a request is driven over: a raw TCP socket, optionally
//! upgraded to TLS.
//!
//! Read/write dispatch over a small closed set of transports, rather than
//! a trait-object chain, since this crate does not need pluggable custom
//! transports.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

#[cfg(feature = "rustls")]
use rustls::StreamOwned;
#[cfg(feature = "rustls")]
use rustls::ClientConnection;

use crate::Error;

/// The live byte stream underlying a connection slot.
pub enum Stream {
    Plain(TcpStream),
    #[cfg(feature = "rustls")]
    Tls(Box<StreamOwned<ClientConnection, TcpStream>>),
}

impl Stream {
    pub(crate) fn set_read_timeout(&self, d: Duration) -> io::Result<()> {
        self.tcp_ref().set_read_timeout(non_zero(d))
    }

    pub(crate) fn set_write_timeout(&self, d: Duration) -> io::Result<()> {
        self.tcp_ref().set_write_timeout(non_zero(d))
    }

    fn tcp_ref(&self) -> &TcpStream {
        match self {
            Stream::Plain(s) => s,
            #[cfg(feature = "rustls")]
            Stream::Tls(s) => s.get_ref(),
        }
    }

    pub(crate) fn set_nodelay(&self, nodelay: bool) -> io::Result<()> {
        self.tcp_ref().set_nodelay(nodelay)
    }

    pub fn is_tls(&self) -> bool {
        match self {
            Stream::Plain(_) => false,
            #[cfg(feature = "rustls")]
            Stream::Tls(_) => true,
        }
    }

    /// Unwrap the plain TCP socket underneath a proxy tunnel so the TLS
    /// upgrader can take ownership of it: TLS is layered on top of
    /// whatever tunnel the proxy dialer established.
    pub(crate) fn into_tcp(self) -> Result<TcpStream, Error> {
        match self {
            Stream::Plain(s) => Ok(s),
            #[cfg(feature = "rustls")]
            Stream::Tls(_) => Err(Error::connect_tagged("stream is already TLS-wrapped", "ssl")),
        }
    }
}

fn non_zero(d: Duration) -> Option<Duration> {
    if d.is_zero() {
        None
    } else {
        Some(d)
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Plain(s) => s.read(buf),
            #[cfg(feature = "rustls")]
            Stream::Tls(s) => s.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::Plain(s) => s.write(buf),
            #[cfg(feature = "rustls")]
            Stream::Tls(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::Plain(s) => s.flush(),
            #[cfg(feature = "rustls")]
            Stream::Tls(s) => s.flush(),
        }
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Stream[{}]", if self.is_tls() { "tls" } else { "plain" })
    }
}

/// Connect a plain TCP socket with a connect timeout, mapping failures to
/// [`Error::ConnectFailure`].
pub(crate) fn connect_tcp(host: &str, port: u16, connect_timeout: Duration) -> Result<TcpStream, Error> {
    use std::net::ToSocketAddrs;

    let addrs: Vec<_> = (host, port)
        .to_socket_addrs()
        .map_err(|e| Error::connect(format!("dns lookup for {host}:{port} failed: {e}")))?
        .collect();

    let addr = addrs
        .first()
        .ok_or_else(|| Error::connect(format!("no addresses for {host}:{port}")))?;

    let stream = if connect_timeout.is_zero() {
        TcpStream::connect(addr)
    } else {
        TcpStream::connect_timeout(addr, connect_timeout)
    }
    .map_err(|e| Error::connect(format!("tcp connect to {addr} failed: {e}")))?;

    stream.set_nodelay(true).ok();

    Ok(stream)
}
