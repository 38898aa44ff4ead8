//! Length-prefixed binary (de)serialization of a cookie jar, round-trippable
//! to and from bytes.
//!
//! Each field is written as a `u32` little-endian length prefix followed
//! by its bytes, which is simpler to audit and extend than a packed
//! struct format (see DESIGN.md).

use std::io::{self, Read, Write};
use std::time::{Duration, SystemTime};

use super::jar::Cookie;
use super::CookieJar;

const MAGIC: &[u8; 4] = b"WHC1";

pub fn save(jar: &CookieJar, w: &mut impl Write) -> io::Result<()> {
    let cookies = jar.iter_snapshot();

    w.write_all(MAGIC)?;
    write_u32(w, cookies.len() as u32)?;

    for c in &cookies {
        write_string(w, c.name())?;
        write_string(w, c.value())?;
        write_string(w, c.domain())?;
        write_string(w, c.path())?;
        write_u8(w, c.is_secure() as u8)?;
        write_u8(w, c.is_http_only() as u8)?;
        write_u8(w, c.expired as u8)?;
        match c.expires() {
            Some(t) => {
                write_u8(w, 1)?;
                let secs = t.duration_since(SystemTime::UNIX_EPOCH).unwrap_or_default().as_secs();
                write_u64(w, secs)?;
            }
            None => write_u8(w, 0)?,
        }
    }

    Ok(())
}

pub fn load(jar: &CookieJar, r: &mut impl Read) -> io::Result<()> {
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "unrecognized cookie jar format"));
    }

    let count = read_u32(r)?;
    let mut cookies = Vec::with_capacity(count as usize);

    for _ in 0..count {
        let name = read_string(r)?;
        let value = read_string(r)?;
        let domain = read_string(r)?;
        let path = read_string(r)?;
        let secure = read_u8(r)? != 0;
        let http_only = read_u8(r)? != 0;
        let expired = read_u8(r)? != 0;
        let has_expires = read_u8(r)? != 0;
        let expires = if has_expires {
            let secs = read_u64(r)?;
            Some(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
        } else {
            None
        };

        cookies.push(Cookie {
            name,
            value,
            domain,
            path,
            expires,
            secure,
            http_only,
            expired,
        });
    }

    jar.replace_all(cookies);
    Ok(())
}

fn write_u8(w: &mut impl Write, v: u8) -> io::Result<()> {
    w.write_all(&[v])
}

fn write_u32(w: &mut impl Write, v: u32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn write_u64(w: &mut impl Write, v: u64) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn write_string(w: &mut impl Write, s: &str) -> io::Result<()> {
    write_u32(w, s.len() as u32)?;
    w.write_all(s.as_bytes())
}

fn read_u8(r: &mut impl Read) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_u32(r: &mut impl Read) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64(r: &mut impl Read) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_string(r: &mut impl Read) -> io::Result<String> {
    let len = read_u32(r)? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::address::Address;

    #[test]
    fn jar_round_trips_through_bytes() {
        let jar = CookieJar::new();
        let addr = Address::parse("https://example.com/x").unwrap();
        jar.set(&addr, "a=1; Path=/", false, false, false, true).unwrap();
        jar.set(&addr, "b=2; Path=/; Secure; HttpOnly", false, false, false, true).unwrap();

        let mut buf = Vec::new();
        save(&jar, &mut buf).unwrap();

        let restored = CookieJar::new();
        load(&restored, &mut &buf[..]).unwrap();

        let mut before: Vec<_> = jar.iter_snapshot().into_iter().map(|c| (c.name, c.value)).collect();
        let mut after: Vec<_> = restored.iter_snapshot().into_iter().map(|c| (c.name, c.value)).collect();
        before.sort();
        after.sort();
        assert_eq!(before, after);
    }

    #[test]
    fn expired_tombstone_survives_round_trip() {
        let jar = CookieJar::new();
        let addr = Address::parse("https://example.com/x").unwrap();
        // expire_before_set tombstones the first `a=1` when `a=2` is set.
        jar.set(&addr, "a=1; Path=/", false, false, false, true).unwrap();
        jar.set(&addr, "a=2; Path=/", false, false, false, true).unwrap();

        let mut buf = Vec::new();
        save(&jar, &mut buf).unwrap();

        let restored = CookieJar::new();
        load(&restored, &mut &buf[..]).unwrap();

        let mut after = restored.iter_snapshot();
        after.sort_by(|a, b| a.value().cmp(b.value()));
        assert_eq!(after.len(), 2);
        assert!(after[0].expired, "tombstoned cookie must stay expired after reload");
        assert!(!after[1].expired);

        // Only the live cookie is sent.
        let matching = restored.matching(&addr);
        assert_eq!(matching.len(), 1);
        assert_eq!(matching[0].value(), "2");
    }
}
