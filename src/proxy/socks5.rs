//! SOCKS5 (spec.md §4.1 "SOCKS5", RFC 1928).
//!
//! REDESIGN FLAG (SPEC_FULL.md): reads the reply's address field using its
//! declared `ATYP` length rather than a fixed 255-byte read.

use std::io::{Read, Write};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;

use crate::error::ProxyErrorKind;
use crate::stream::{connect_tcp, Stream};
use crate::Error;

use super::Proxy;

const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;

pub(super) fn dial(
    proxy: &Proxy,
    dest_host: &str,
    dest_port: u16,
    connect_timeout: Duration,
    rw_timeout: Duration,
) -> Result<Stream, Error> {
    let mut tcp = connect_tcp(proxy.host(), proxy.port(), connect_timeout)?;
    tcp.set_read_timeout(non_zero(rw_timeout)).ok();
    tcp.set_write_timeout(non_zero(rw_timeout)).ok();

    let user = proxy.username().unwrap_or("");
    let pass = proxy.password().unwrap_or("");
    let use_auth = !user.is_empty() && !pass.is_empty();

    let method = if use_auth { 0x02 } else { 0x00 };
    tcp.write_all(&[0x05, 0x01, method]).map_err(Error::Io)?;

    let mut greeting_reply = [0u8; 2];
    tcp.read_exact(&mut greeting_reply)
        .map_err(|e| Error::receive(format!("socks5 greeting reply: {e}"), false))?;
    if greeting_reply[0] != 0x05 {
        return Err(Error::ProtocolError("socks5 greeting: unexpected version".into()));
    }
    if greeting_reply[1] != method {
        return Err(Error::ProxyError(ProxyErrorKind::Socks5AuthFailed));
    }

    if use_auth {
        let mut auth_req = Vec::with_capacity(3 + user.len() + pass.len());
        auth_req.push(0x01);
        auth_req.push(user.len() as u8);
        auth_req.extend_from_slice(user.as_bytes());
        auth_req.push(pass.len() as u8);
        auth_req.extend_from_slice(pass.as_bytes());
        tcp.write_all(&auth_req).map_err(Error::Io)?;

        let mut auth_reply = [0u8; 2];
        tcp.read_exact(&mut auth_reply)
            .map_err(|e| Error::receive(format!("socks5 auth reply: {e}"), false))?;
        if auth_reply[1] != 0x00 {
            return Err(Error::ProxyError(ProxyErrorKind::Socks5AuthFailed));
        }
    }

    let mut connect_req = vec![0x05, 0x01, 0x00];
    match dest_host.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => {
            connect_req.push(ATYP_IPV4);
            connect_req.extend_from_slice(&v4.octets());
        }
        Ok(IpAddr::V6(v6)) => {
            connect_req.push(ATYP_IPV6);
            connect_req.extend_from_slice(&v6.octets());
        }
        Err(_) => {
            if dest_host.len() > 255 {
                return Err(Error::InvalidInput("destination host name too long for socks5".into()));
            }
            connect_req.push(ATYP_DOMAIN);
            connect_req.push(dest_host.len() as u8);
            connect_req.extend_from_slice(dest_host.as_bytes());
        }
    }
    connect_req.extend_from_slice(&dest_port.to_be_bytes());

    tcp.write_all(&connect_req).map_err(Error::Io)?;

    let mut head = [0u8; 4];
    tcp.read_exact(&mut head)
        .map_err(|e| Error::receive(format!("socks5 connect reply: {e}"), false))?;

    if head[0] != 0x05 {
        return Err(Error::ProtocolError("socks5 connect reply: unexpected version".into()));
    }

    check_reply_code(head[1])?;

    match head[3] {
        ATYP_IPV4 => {
            let mut buf = [0u8; 4 + 2];
            tcp.read_exact(&mut buf)
                .map_err(|e| Error::receive(format!("socks5 bound address: {e}"), false))?;
            let _ = Ipv4Addr::from([buf[0], buf[1], buf[2], buf[3]]);
        }
        ATYP_IPV6 => {
            let mut buf = [0u8; 16 + 2];
            tcp.read_exact(&mut buf)
                .map_err(|e| Error::receive(format!("socks5 bound address: {e}"), false))?;
        }
        ATYP_DOMAIN => {
            let mut len_buf = [0u8; 1];
            tcp.read_exact(&mut len_buf)
                .map_err(|e| Error::receive(format!("socks5 bound address len: {e}"), false))?;
            let mut buf = vec![0u8; len_buf[0] as usize + 2];
            tcp.read_exact(&mut buf)
                .map_err(|e| Error::receive(format!("socks5 bound address: {e}"), false))?;
        }
        other => {
            return Err(Error::ProtocolError(format!(
                "socks5 connect reply: unknown address type {other:#x}"
            )))
        }
    }

    Ok(Stream::Plain(tcp))
}

fn check_reply_code(code: u8) -> Result<(), Error> {
    match code {
        0x00 => Ok(()),
        0x01 => Err(Error::ProxyError(ProxyErrorKind::Socks5GeneralFailure)),
        0x02 => Err(Error::ProxyError(ProxyErrorKind::Socks5NotAllowed)),
        0x03 => Err(Error::ProxyError(ProxyErrorKind::Socks5NetworkUnreachable)),
        0x04 => Err(Error::ProxyError(ProxyErrorKind::Socks5HostUnreachable)),
        0x05 => Err(Error::ProxyError(ProxyErrorKind::Socks5ConnectionRefused)),
        0x06 => Err(Error::ProxyError(ProxyErrorKind::Socks5TtlExpired)),
        0x07 => Err(Error::ProxyError(ProxyErrorKind::Socks5CommandNotSupported)),
        0x08 => Err(Error::ProxyError(ProxyErrorKind::Socks5AddressTypeNotSupported)),
        other => Err(Error::ProtocolError(format!("unknown socks5 reply code {other:#x}"))),
    }
}

fn non_zero(d: Duration) -> Option<Duration> {
    if d.is_zero() {
        None
    } else {
        Some(d)
    }
}
