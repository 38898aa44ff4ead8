//! Cookie model and domain-scoped jar.

use std::sync::RwLock;
use std::time::SystemTime;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

use crate::address::Address;
use crate::error::Error;

use super::filters;

/// The clamp ceiling for a cookie's expiry: 9998-12-31 23:59:59 UTC,
/// avoiding the year-9999 overflow some downstream date parsers choke on.
const MAX_EXPIRY_UNIX_SECS: u64 = 253_370_764_799;

const FRAGMENT: &AsciiSet = &CONTROLS.add(b' ').add(b'"').add(b'%').add(b'<').add(b'>').add(b'`').add(b';').add(b',');

/// A single stored cookie.
#[derive(Debug, Clone)]
pub struct Cookie {
    pub(super) name: String,
    /// Stored escaped iff `escape_values_on_receive` was set when parsed.
    pub(super) value: String,
    pub(super) domain: String,
    pub(super) path: String,
    pub(super) expires: Option<SystemTime>,
    pub(super) secure: bool,
    pub(super) http_only: bool,
    pub(super) expired: bool,
}

impl Cookie {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn expires(&self) -> Option<SystemTime> {
        self.expires
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    pub fn is_http_only(&self) -> bool {
        self.http_only
    }

    fn is_expired(&self, now: SystemTime) -> bool {
        self.expired || self.expires.map(|e| e <= now).unwrap_or(false)
    }
}

/// A cross-request cookie store. Interior mutability is `RwLock`-guarded
/// so a jar can be shared between requests.
#[derive(Default, Debug)]
pub struct CookieJar {
    inner: RwLock<Vec<Cookie>>,
}

impl CookieJar {
    pub fn new() -> Self {
        CookieJar::default()
    }

    /// Parse and store one raw `Set-Cookie` value, seen while fetching
    /// `request_addr`.
    pub(crate) fn set(
        &self,
        request_addr: &Address,
        raw: &str,
        escape_values_on_receive: bool,
        ignore_invalid_cookie: bool,
        ignore_set_for_expired_cookies: bool,
        expire_before_set: bool,
    ) -> Result<(), Error> {
        let filtered = filters::apply_all(raw);

        let cookie = match parse_set_cookie(&filtered, request_addr, escape_values_on_receive) {
            Ok(c) => c,
            Err(e) => {
                if ignore_invalid_cookie {
                    return Ok(());
                } else {
                    return Err(e);
                }
            }
        };

        // Drop an already-expired `Set-Cookie` when the flag is set,
        // rather than storing a tombstone for a cookie that was never live.
        if ignore_set_for_expired_cookies && cookie.is_expired(SystemTime::now()) {
            return Ok(());
        }

        let mut store = self.inner.write().expect("cookie jar lock poisoned");

        if !expire_before_set {
            store.push(cookie);
            return Ok(());
        }

        // Expire-before-set: any existing cookie at the same (domain, name)
        // is marked expired, then the new value is inserted.
        for existing in store.iter_mut() {
            if existing.domain.eq_ignore_ascii_case(&cookie.domain) && existing.name == cookie.name {
                existing.expired = true;
            }
        }
        store.push(cookie);

        Ok(())
    }

    /// Cookies applicable to `addr`, filtered and ordered for sending.
    pub(crate) fn matching(&self, addr: &Address) -> Vec<Cookie> {
        let now = SystemTime::now();
        let store = self.inner.read().expect("cookie jar lock poisoned");
        store
            .iter()
            .filter(|c| !c.is_expired(now))
            .filter(|c| domain_matches(&c.domain, addr.host()))
            .filter(|c| path_matches(&c.path, addr.path()))
            .filter(|c| !c.secure || addr.is_https())
            .cloned()
            .collect()
    }

    /// Materialize the `Cookie:` header value(s) for `addr`: either one
    /// combined header or one header per cookie.
    pub(crate) fn cookie_headers(&self, addr: &Address, single_header: bool, unescape_on_send: bool) -> Vec<String> {
        let cookies = self.matching(addr);
        if cookies.is_empty() {
            return Vec::new();
        }

        let render = |c: &Cookie| -> String {
            let value = if unescape_on_send {
                percent_decode_str(&c.value).decode_utf8_lossy().into_owned()
            } else {
                c.value.clone()
            };
            format!("{}={}", c.name, value)
        };

        if single_header {
            vec![cookies.iter().map(render).collect::<Vec<_>>().join("; ")]
        } else {
            cookies.iter().map(render).collect()
        }
    }

    pub fn iter_snapshot(&self) -> Vec<Cookie> {
        self.inner.read().expect("cookie jar lock poisoned").clone()
    }

    pub(crate) fn replace_all(&self, cookies: Vec<Cookie>) {
        *self.inner.write().expect("cookie jar lock poisoned") = cookies;
    }
}

/// RFC 6265 domain-match: identical, or the cookie domain has a leading dot
/// and the request host is that domain or a subdomain of it.
fn domain_matches(cookie_domain: &str, host: &str) -> bool {
    if cookie_domain.eq_ignore_ascii_case(host) {
        return true;
    }
    if let Some(bare) = cookie_domain.strip_prefix('.') {
        return host.eq_ignore_ascii_case(bare) || host.to_ascii_lowercase().ends_with(&format!(".{}", bare.to_ascii_lowercase()));
    }
    false
}

fn path_matches(cookie_path: &str, request_path: &str) -> bool {
    cookie_path.is_empty() || request_path.starts_with(cookie_path)
}

const INVALID_NAME_CHARS: &[char] = &[' ', '\t', '\r', '\n', '=', ';', ','];

fn parse_set_cookie(raw: &str, request_addr: &Address, escape_values_on_receive: bool) -> Result<Cookie, Error> {
    let mut tokens = raw.split(';').map(|t| t.trim()).filter(|t| !t.is_empty());

    let pair = tokens
        .next()
        .ok_or_else(|| Error::InvalidCookie("empty Set-Cookie value".into()))?;

    let (name, raw_value) = pair
        .split_once('=')
        .ok_or_else(|| Error::InvalidCookie(format!("missing '=' in cookie pair {pair:?}")))?;

    if name.is_empty() || name.starts_with('$') || name.contains(INVALID_NAME_CHARS) {
        return Err(Error::InvalidCookie(format!("invalid cookie name {name:?}")));
    }

    let value = if escape_values_on_receive {
        utf8_percent_encode(raw_value, FRAGMENT).to_string()
    } else {
        raw_value.to_string()
    };

    let mut domain: Option<String> = None;
    let mut path: Option<String> = None;
    let mut expires: Option<SystemTime> = None;
    let mut secure = false;
    let mut http_only = false;

    for token in tokens {
        let (attr, val) = match token.split_once('=') {
            Some((a, v)) => (a.trim(), Some(v.trim())),
            None => (token.trim(), None),
        };
        match attr.to_ascii_lowercase().as_str() {
            "expires" => {
                if let Some(v) = val {
                    expires = parse_and_clamp_expiry(v);
                }
            }
            "path" => path = val.map(str::to_string),
            "domain" => domain = val.map(normalize_domain),
            "secure" => secure = true,
            "httponly" => http_only = true,
            _ => {}
        }
    }

    let (domain, path) = match domain {
        Some(d) => (d, path.unwrap_or_else(|| "/".to_string())),
        None => match &path {
            None => (request_addr.host().to_string(), "/".to_string()),
            Some(p) if p.is_empty() || p.starts_with('/') => (request_addr.host().to_string(), p.clone()),
            Some(p) if p.contains('.') => (p.clone(), "/".to_string()),
            Some(p) => (request_addr.host().to_string(), p.clone()),
        },
    };

    Ok(Cookie {
        name: name.to_string(),
        value,
        domain,
        path,
        expires,
        secure,
        http_only,
        expired: false,
    })
}

/// Strip a leading dot from a single-label wildcard domain (`.localhost`
/// becomes `localhost`); preserve it for multi-label domains.
fn normalize_domain(domain: &str) -> String {
    if let Some(rest) = domain.strip_prefix('.') {
        if !rest.contains('.') {
            return rest.to_string();
        }
    }
    domain.to_string()
}

fn parse_and_clamp_expiry(raw: &str) -> Option<SystemTime> {
    let parsed = httpdate::parse_http_date(raw).ok()?;
    let max = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(MAX_EXPIRY_UNIX_SECS);
    Some(if parsed > max { max } else { parsed })
}

#[cfg(test)]
mod test {
    use super::*;

    fn addr(s: &str) -> Address {
        Address::parse(s).unwrap()
    }

    #[test]
    fn parses_simple_cookie() {
        let a = addr("https://example.com/x");
        let c = parse_set_cookie("sid=abc123; Path=/; HttpOnly", &a, false).unwrap();
        assert_eq!(c.name(), "sid");
        assert_eq!(c.value(), "abc123");
        assert_eq!(c.domain(), "example.com");
        assert_eq!(c.path(), "/");
        assert!(c.is_http_only());
    }

    #[test]
    fn rejects_dollar_prefixed_name() {
        let a = addr("https://example.com/x");
        assert!(parse_set_cookie("$Version=1", &a, false).is_err());
    }

    #[test]
    fn domain_match_subdomain() {
        assert!(domain_matches(".example.com", "foo.example.com"));
        assert!(domain_matches(".example.com", "example.com"));
        assert!(!domain_matches(".example.com", "notexample.com"));
    }

    #[test]
    fn jar_send_and_expire_before_set() {
        let jar = CookieJar::new();
        let a = addr("https://example.com/x");
        jar.set(&a, "a=1; Path=/", false, false, false, true).unwrap();
        jar.set(&a, "a=2; Path=/", false, false, false, true).unwrap();

        let cookies = jar.matching(&a);
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies[0].value(), "2");
    }

    #[test]
    fn secure_cookie_not_sent_over_plain_http() {
        let jar = CookieJar::new();
        let https = addr("https://example.com/x");
        jar.set(&https, "a=1; Path=/; Secure", false, false, false, true).unwrap();

        let http = addr("http://example.com/x");
        assert!(jar.matching(&http).is_empty());
        assert_eq!(jar.matching(&https).len(), 1);
    }
}
