//! The "Azadi" authenticated tunnel (spec.md §4.1 "Azadi").
//!
//! An experimental, non-standard proxy protocol: a single ChaCha20-Poly1305
//! encrypted request/response exchange over a fixed-nonce key derived from
//! a shared secret via PBKDF2-HMAC-SHA1. The fixed nonce is a known defect
//! inherited from the source protocol (spec.md §9) and is preserved here
//! for wire compatibility rather than "fixed" unilaterally.
//!
//! Wire framing decision (not specified in the protocol description, since
//! it only describes the plaintext/ciphertext shape): each direction sends
//! a `u32` little-endian frame length, then `tag(16) || ciphertext`. See
//! `DESIGN.md`.

use std::io::{Read, Write};
use std::sync::Arc;
use std::time::Duration;

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use md5::Md5;
use pbkdf2::pbkdf2_hmac;
use sha1::Sha1;

use crate::error::ProxyErrorKind;
use crate::stream::{connect_tcp, Stream};
use crate::Error;

use super::{Proxy, ProxyInner, ProxyKind};

const PBKDF2_ITERATIONS: u32 = 1000;
const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Parse the `ap://<hex>` proxy URL form (spec.md §6): hex decodes to a
/// length-prefixed string array `[host, port, secret]`.
pub(super) fn parse_ap_url(hex: &str, from_env: bool) -> Result<Proxy, Error> {
    let bytes = decode_hex(hex)?;
    let fields = decode_string_array(&bytes)?;

    let [host, port, secret]: [String; 3] = fields
        .try_into()
        .map_err(|_| Error::InvalidInput("ap:// proxy blob must encode [host, port, secret]".into()))?;

    let port: u16 = port
        .parse()
        .map_err(|_| Error::InvalidInput(format!("ap:// proxy blob has invalid port {port:?}")))?;

    Ok(Proxy {
        inner: Arc::new(ProxyInner {
            kind: ProxyKind::Azadi,
            host,
            port,
            username: None,
            password: None,
            secret: Some(secret),
            from_env,
        }),
    })
}

pub(super) fn dial(
    proxy: &Proxy,
    dest_host: &str,
    dest_port: u16,
    connect_timeout: Duration,
    rw_timeout: Duration,
) -> Result<Stream, Error> {
    let secret = proxy
        .inner
        .secret
        .as_deref()
        .ok_or_else(|| Error::InvalidInput("azadi proxy has no shared secret".into()))?;

    let mut tcp = connect_tcp(proxy.host(), proxy.port(), connect_timeout)?;
    tcp.set_read_timeout(non_zero(rw_timeout)).ok();
    tcp.set_write_timeout(non_zero(rw_timeout)).ok();

    let (key, nonce) = derive_key_nonce(secret);
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
    let nonce = Nonce::from_slice(&nonce);

    let fields: Vec<String> = match (proxy.username(), proxy.password()) {
        (Some(u), Some(p)) if !u.is_empty() && !p.is_empty() => vec![
            u.to_string(),
            p.to_string(),
            dest_host.to_string(),
            dest_port.to_string(),
        ],
        _ => vec![dest_host.to_string(), dest_port.to_string()],
    };
    let plaintext = encode_string_array(&fields);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_ref())
        .map_err(|_| Error::ProxyError(ProxyErrorKind::AzadiUnknown(0)))?;
    write_frame(&mut tcp, &ciphertext)?;

    let reply_plain = {
        let ciphertext = read_frame(&mut tcp)?;
        cipher
            .decrypt(nonce, ciphertext.as_ref())
            .map_err(|_| Error::ProtocolError("azadi reply failed to decrypt".into()))?
    };

    if reply_plain.len() != 4 {
        return Err(Error::ProtocolError(format!(
            "azadi reply plaintext has unexpected length {}",
            reply_plain.len()
        )));
    }
    let code = u32::from_le_bytes([reply_plain[0], reply_plain[1], reply_plain[2], reply_plain[3]]);

    match code {
        1 => Ok(Stream::Plain(tcp)),
        2 => Err(Error::ProxyError(ProxyErrorKind::AzadiLogin)),
        3 => Err(Error::ProxyError(ProxyErrorKind::AzadiHost)),
        4 => Err(Error::ProxyError(ProxyErrorKind::AzadiRemote)),
        other => Err(Error::ProxyError(ProxyErrorKind::AzadiUnknown(other))),
    }
}

/// Derive the fixed key and nonce for a shared secret: PBKDF2-HMAC-SHA1
/// over the secret, salted with the MD5 digest of the secret, 1000
/// iterations, 44 bytes of output material (32-byte key, 12-byte nonce).
fn derive_key_nonce(secret: &str) -> ([u8; KEY_LEN], [u8; NONCE_LEN]) {
    use md5::Digest;

    let salt = Md5::digest(secret.as_bytes());

    let mut okm = [0u8; KEY_LEN + NONCE_LEN];
    pbkdf2_hmac::<Sha1>(secret.as_bytes(), &salt, PBKDF2_ITERATIONS, &mut okm);

    let mut key = [0u8; KEY_LEN];
    let mut nonce = [0u8; NONCE_LEN];
    key.copy_from_slice(&okm[..KEY_LEN]);
    nonce.copy_from_slice(&okm[KEY_LEN..]);
    (key, nonce)
}

fn encode_string_array(fields: &[String]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(fields.len() as u32).to_le_bytes());
    for f in fields {
        out.extend_from_slice(&(f.len() as u32).to_le_bytes());
        out.extend_from_slice(f.as_bytes());
    }
    out
}

fn decode_string_array(bytes: &[u8]) -> Result<Vec<String>, Error> {
    let bad = || Error::InvalidInput("malformed azadi string array".into());

    if bytes.len() < 4 {
        return Err(bad());
    }
    let count = u32::from_le_bytes(bytes[..4].try_into().unwrap()) as usize;
    let mut pos = 4;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        if bytes.len() < pos + 4 {
            return Err(bad());
        }
        let len = u32::from_le_bytes(bytes[pos..pos + 4].try_into().unwrap()) as usize;
        pos += 4;
        if bytes.len() < pos + len {
            return Err(bad());
        }
        let s = String::from_utf8(bytes[pos..pos + len].to_vec()).map_err(|_| bad())?;
        pos += len;
        out.push(s);
    }
    Ok(out)
}

fn decode_hex(hex: &str) -> Result<Vec<u8>, Error> {
    if hex.len() % 2 != 0 {
        return Err(Error::InvalidInput("ap:// hex blob has odd length".into()));
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .map_err(|_| Error::InvalidInput(format!("ap:// hex blob has invalid byte at {i}")))
        })
        .collect()
}

fn write_frame(w: &mut impl Write, ciphertext: &[u8]) -> Result<(), Error> {
    // ciphertext ends with the 16-byte Poly1305 tag; the wire puts the tag
    // first, matching the protocol's `tag || ciphertext` framing.
    let split_at = ciphertext.len() - TAG_LEN;
    let (body, tag) = ciphertext.split_at(split_at);

    let frame_len = (TAG_LEN + body.len()) as u32;
    w.write_all(&frame_len.to_le_bytes()).map_err(Error::Io)?;
    w.write_all(tag).map_err(Error::Io)?;
    w.write_all(body).map_err(Error::Io)?;
    w.flush().map_err(Error::Io)
}

fn read_frame(r: &mut impl Read) -> Result<Vec<u8>, Error> {
    let mut len_buf = [0u8; 4];
    r.read_exact(&mut len_buf)
        .map_err(|e| Error::receive(format!("azadi frame length: {e}"), false))?;
    let frame_len = u32::from_le_bytes(len_buf) as usize;
    if frame_len < TAG_LEN {
        return Err(Error::ProtocolError("azadi frame shorter than tag".into()));
    }

    let mut frame = vec![0u8; frame_len];
    r.read_exact(&mut frame)
        .map_err(|e| Error::receive(format!("azadi frame body: {e}"), false))?;

    // Re-assemble into the `body || tag` order the aead crate expects.
    let (tag, body) = frame.split_at(TAG_LEN);
    let mut ciphertext = Vec::with_capacity(frame_len);
    ciphertext.extend_from_slice(body);
    ciphertext.extend_from_slice(tag);
    Ok(ciphertext)
}

fn non_zero(d: Duration) -> Option<Duration> {
    if d.is_zero() {
        None
    } else {
        Some(d)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn string_array_round_trips() {
        let fields = vec!["host.example".to_string(), "443".to_string(), "s3cr3t".to_string()];
        let bytes = encode_string_array(&fields);
        let decoded = decode_string_array(&bytes).unwrap();
        assert_eq!(decoded, fields);
    }

    #[test]
    fn key_derivation_is_deterministic() {
        let (k1, n1) = derive_key_nonce("shared-secret");
        let (k2, n2) = derive_key_nonce("shared-secret");
        assert_eq!(k1, k2);
        assert_eq!(n1, n2);
        let (k3, _) = derive_key_nonce("different-secret");
        assert_ne!(k1, k3);
    }
}
