//! SOCKS4 / SOCKS4a (spec.md §4.1 "SOCKS4", "SOCKS4a").

use std::io::{Read, Write};
use std::net::Ipv4Addr;
use std::time::Duration;

use crate::error::ProxyErrorKind;
use crate::stream::{connect_tcp, Stream};
use crate::Error;

use super::Proxy;

pub(super) fn dial(
    proxy: &Proxy,
    dest_host: &str,
    dest_port: u16,
    connect_timeout: Duration,
    socks4a: bool,
) -> Result<Stream, Error> {
    let mut tcp = connect_tcp(proxy.host(), proxy.port(), connect_timeout)?;

    let mut req = Vec::with_capacity(16);
    req.push(0x04);
    req.push(0x01);
    req.extend_from_slice(&dest_port.to_be_bytes());

    if socks4a {
        req.extend_from_slice(&[0, 0, 0, 1]);
    } else {
        let ip = resolve_ipv4(dest_host)?;
        req.extend_from_slice(&ip.octets());
    }

    let user_id = proxy.username().unwrap_or("");
    req.extend_from_slice(user_id.as_bytes());
    req.push(0x00);

    if socks4a {
        req.extend_from_slice(dest_host.as_bytes());
        req.push(0x00);
    }

    tcp.write_all(&req).map_err(Error::Io)?;

    let mut reply = [0u8; 8];
    tcp.read_exact(&mut reply)
        .map_err(|e| Error::receive(format!("socks4 reply: {e}"), false))?;

    match reply[1] {
        0x5A => Ok(Stream::Plain(tcp)),
        0x5B => Err(Error::ProxyError(ProxyErrorKind::Socks4RequestRejected)),
        0x5C => Err(Error::ProxyError(ProxyErrorKind::Socks4IdentUnreachable)),
        0x5D => Err(Error::ProxyError(ProxyErrorKind::Socks4IdentMismatch)),
        other => Err(Error::ProtocolError(format!("unknown socks4 reply code {other:#x}"))),
    }
}

fn resolve_ipv4(host: &str) -> Result<Ipv4Addr, Error> {
    if let Ok(ip) = host.parse::<Ipv4Addr>() {
        return Ok(ip);
    }
    use std::net::ToSocketAddrs;
    (host, 0)
        .to_socket_addrs()
        .map_err(|e| Error::connect(format!("dns lookup for {host} failed: {e}")))?
        .find_map(|addr| match addr.ip() {
            std::net::IpAddr::V4(v4) => Some(v4),
            std::net::IpAddr::V6(_) => None,
        })
        .ok_or_else(|| Error::connect(format!("no IPv4 address for {host}")))
}
