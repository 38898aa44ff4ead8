//! URL/Address model.
//!
//! Thin wrapper around [`url::Url`] that adds the computations the framer
//! needs: the effective port (falling back to the scheme default), the
//! `Host` header value (port elided iff it is the scheme default), and
//! joining a `Location` against the current address for redirects.

use std::fmt;

use url::Url;

use crate::Error;

/// A parsed, absolute request target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    url: Url,
}

impl Address {
    pub fn parse(input: &str) -> Result<Address, Error> {
        let url = Url::parse(input).map_err(|e| Error::BadUrl(format!("{input}: {e}")))?;
        Address::from_url(url)
    }

    pub(crate) fn from_url(url: Url) -> Result<Address, Error> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::BadUrl(format!("unsupported scheme: {}", url.scheme())));
        }
        if url.host_str().is_none() {
            return Err(Error::InvalidInput("url has no host".into()));
        }
        Ok(Address { url })
    }

    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    pub fn is_https(&self) -> bool {
        self.url.scheme() == "https"
    }

    pub fn host(&self) -> &str {
        self.url.host_str().expect("validated at construction")
    }

    /// The scheme's default port: 80 for http, 443 for https.
    pub fn default_port(&self) -> u16 {
        if self.is_https() {
            443
        } else {
            80
        }
    }

    /// The effective port: the explicit one, or the scheme default.
    pub fn port(&self) -> u16 {
        self.url.port().unwrap_or_else(|| self.default_port())
    }

    /// The value to send in the `Host:` header -- port elided iff it is
    /// the scheme default.
    pub fn host_header_value(&self) -> String {
        if self.url.port().map(|p| p != self.default_port()).unwrap_or(false) {
            format!("{}:{}", self.host(), self.port())
        } else {
            self.host().to_string()
        }
    }

    /// Path plus query, as used in the request line target when not
    /// proxying through an absolute-URI HTTP proxy.
    pub fn path_and_query(&self) -> String {
        let path = self.url.path();
        match self.url.query() {
            Some(q) => format!("{path}?{q}"),
            None => path.to_string(),
        }
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }

    pub fn username(&self) -> &str {
        self.url.username()
    }

    pub fn password(&self) -> Option<&str> {
        self.url.password()
    }

    /// The whole absolute URI, used as the request-line target when the
    /// active proxy is an HTTP-type proxy with `absolute_uri_in_start_line`
    /// set.
    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    /// `(scheme, host, port)` -- the origin tuple used by the keep-alive
    /// controller to decide whether a connection slot can be reused.
    pub fn origin(&self) -> (String, String, u16) {
        (self.scheme().to_string(), self.host().to_string(), self.port())
    }

    /// Resolve a `Location` header value against this address: absolute
    /// locations are used as-is, relative ones are joined.
    pub fn join(&self, location: &str) -> Result<Address, Error> {
        let joined = self
            .url
            .join(location)
            .map_err(|e| Error::BadUrl(format!("bad redirection location {location:?}: {e}")))?;
        Address::from_url(joined)
    }

    /// Resolve a redirect `Location` without rejecting non-http(s) targets
    /// outright: the redirect controller surfaces those verbatim instead
    /// of following them.
    pub(crate) fn resolve_redirect(&self, location: &str) -> Result<RedirectTarget, Error> {
        let joined = self
            .url
            .join(location)
            .map_err(|e| Error::BadUrl(format!("bad redirection location {location:?}: {e}")))?;
        if matches!(joined.scheme(), "http" | "https") {
            Ok(RedirectTarget::Follow(Address { url: joined }))
        } else {
            Ok(RedirectTarget::External)
        }
    }
}

/// The result of resolving a `Location` header against the current
/// address.
pub(crate) enum RedirectTarget {
    Follow(Address),
    External,
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn host_header_elides_default_port() {
        let a = Address::parse("https://example.com/x").unwrap();
        assert_eq!(a.host_header_value(), "example.com");
        let a = Address::parse("https://example.com:443/x").unwrap();
        assert_eq!(a.host_header_value(), "example.com");
        let a = Address::parse("https://example.com:8443/x").unwrap();
        assert_eq!(a.host_header_value(), "example.com:8443");
    }

    #[test]
    fn path_and_query() {
        let a = Address::parse("http://h/a/b?x=1&y=2").unwrap();
        assert_eq!(a.path_and_query(), "/a/b?x=1&y=2");
        let a = Address::parse("http://h/a/b").unwrap();
        assert_eq!(a.path_and_query(), "/a/b");
    }

    #[test]
    fn join_relative_and_absolute() {
        let a = Address::parse("https://a.example/x").unwrap();
        let b = a.join("/y").unwrap();
        assert_eq!(b.as_str(), "https://a.example/y");
        let c = a.join("https://b.example/y").unwrap();
        assert_eq!(c.host(), "b.example");
    }

    #[test]
    fn origin_tuple_distinguishes_host_change() {
        let a = Address::parse("https://a.example/x").unwrap();
        let b = Address::parse("https://b.example/x").unwrap();
        assert_ne!(a.origin(), b.origin());
    }

    #[test]
    fn rejects_non_http_scheme() {
        assert!(Address::parse("ftp://host/x").is_err());
    }
}
