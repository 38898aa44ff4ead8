//! HTTP CONNECT tunnel (spec.md §4.1 "HTTP CONNECT").
//!
//! Grounded in the teacher's `ConnectProxyConnector::connect` in the
//! now-removed `src/proxy.rs`: write the CONNECT request by hand, read
//! response lines until the blank line, accept only 200.

use std::io::{BufRead, BufReader, Write};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;

use crate::error::ProxyErrorKind;
use crate::stream::{connect_tcp, Stream};
use crate::Error;

use super::Proxy;

pub(super) fn dial(
    proxy: &Proxy,
    dest_host: &str,
    dest_port: u16,
    connect_timeout: Duration,
    rw_timeout: Duration,
) -> Result<Stream, Error> {
    let tcp = connect_tcp(proxy.host(), proxy.port(), connect_timeout)?;
    tcp.set_read_timeout(non_zero(rw_timeout)).ok();
    tcp.set_write_timeout(non_zero(rw_timeout)).ok();

    if dest_port == 80 {
        return Ok(Stream::Plain(tcp));
    }

    let mut w = tcp.try_clone().map_err(Error::Io)?;

    write!(w, "CONNECT {dest_host}:{dest_port} HTTP/1.1\r\n").map_err(Error::Io)?;
    write!(w, "Host: {dest_host}:{dest_port}\r\n").map_err(Error::Io)?;

    let use_creds = proxy.username().is_some() || proxy.password().is_some();
    if use_creds {
        let user = proxy.username().unwrap_or_default();
        let pass = proxy.password().unwrap_or_default();
        let creds = BASE64_STANDARD.encode(format!("{user}:{pass}"));
        write!(w, "Proxy-Authorization: Basic {creds}\r\n").map_err(Error::Io)?;
    }

    write!(w, "Proxy-Connection: Keep-Alive\r\n").map_err(Error::Io)?;
    write!(w, "\r\n").map_err(Error::Io)?;
    w.flush().map_err(Error::Io)?;

    let mut reader = BufReader::new(tcp.try_clone().map_err(Error::Io)?);
    let status = read_status_line(&mut reader)?;
    drain_headers(&mut reader)?;

    if status != 200 {
        return Err(Error::ProxyError(ProxyErrorKind::ConnectNonOk(status)));
    }

    Ok(Stream::Plain(tcp))
}

fn read_status_line(reader: &mut impl BufRead) -> Result<u16, Error> {
    loop {
        let mut line = String::new();
        let n = reader
            .read_line(&mut line)
            .map_err(|e| Error::receive(format!("reading CONNECT status line: {e}"), false))?;
        if n == 0 {
            return Err(Error::receive("proxy server did not respond", true));
        }
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.splitn(3, ' ');
        let _version = parts.next();
        let code = parts
            .next()
            .ok_or_else(|| Error::ProtocolError(format!("malformed CONNECT status line: {line:?}")))?;
        return code
            .parse()
            .map_err(|_| Error::ProtocolError(format!("malformed CONNECT status code: {code:?}")));
    }
}

fn drain_headers(reader: &mut impl BufRead) -> Result<(), Error> {
    loop {
        let mut line = String::new();
        let n = reader
            .read_line(&mut line)
            .map_err(|e| Error::receive(format!("reading CONNECT headers: {e}"), false))?;
        if n == 0 || line.trim_end().is_empty() {
            return Ok(());
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
