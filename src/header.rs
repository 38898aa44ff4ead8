//! Ordered, case-insensitive header storage.
//!
//! Request and response headers are both modeled as an insertion-ordered
//! list of name/value pairs with case-insensitive name comparisons, last
//! write wins on `set`, but `Set-Cookie`/`append` style duplicates
//! preserved on receive.

use std::fmt;

/// One name/value header pair, as it would appear on the wire (without
/// the trailing CRLF).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderField {
    name: String,
    value: String,
}

impl HeaderField {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        HeaderField {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn is_name(&self, other: &str) -> bool {
        self.name.eq_ignore_ascii_case(other)
    }
}

impl fmt::Display for HeaderField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.value)
    }
}

/// Names the framer manages directly; callers may not set these on a
/// `Request` directly.
pub const RESERVED_HEADERS: &[&str] = &[
    "host",
    "content-length",
    "content-type",
    "connection",
    "proxy-connection",
    "accept-encoding",
];

pub fn is_reserved(name: &str) -> bool {
    RESERVED_HEADERS.iter().any(|r| name.eq_ignore_ascii_case(r))
}

/// An ordered multimap of headers.
///
/// `set` implements case-insensitive last-write-wins. `append` always adds
/// a new entry (used for things like repeated `Cookie:` headers when
/// `cookie_single_header` is false, and for preserving every `Set-Cookie`
/// line from a response).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    fields: Vec<HeaderField>,
}

impl HeaderMap {
    pub fn new() -> Self {
        HeaderMap { fields: Vec::new() }
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        if let Some(existing) = self.fields.iter_mut().find(|h| h.is_name(&name)) {
            existing.value = value.into();
        } else {
            self.fields.push(HeaderField::new(name, value));
        }
    }

    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push(HeaderField::new(name, value));
    }

    pub fn remove(&mut self, name: &str) {
        self.fields.retain(|h| !h.is_name(name));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.iter().find(|h| h.is_name(name)).map(|h| h.value())
    }

    pub fn has(&self, name: &str) -> bool {
        self.fields.iter().any(|h| h.is_name(name))
    }

    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|h| h.is_name(name))
            .map(|h| h.value())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HeaderField> {
        self.fields.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Overlay `other` onto `self`: every header in `other` is `set` (last
    /// writer wins, case-insensitive), in `other`'s order. Used to apply
    /// the permanent then temporary header maps on top of the base
    /// headers the framer computed.
    pub fn overlay(&mut self, other: &HeaderMap) {
        for h in other.iter() {
            self.set(h.name().to_string(), h.value().to_string());
        }
    }
}

impl<'a> IntoIterator for &'a HeaderMap {
    type Item = &'a HeaderField;
    type IntoIter = std::slice::Iter<'a, HeaderField>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn set_is_case_insensitive_last_write_wins() {
        let mut h = HeaderMap::new();
        h.set("Content-Type", "text/plain");
        h.set("content-type", "application/json");
        assert_eq!(h.len(), 1);
        assert_eq!(h.get("CONTENT-TYPE"), Some("application/json"));
    }

    #[test]
    fn append_keeps_duplicates() {
        let mut h = HeaderMap::new();
        h.append("Set-Cookie", "a=1");
        h.append("Set-Cookie", "b=2");
        assert_eq!(h.get_all("set-cookie"), vec!["a=1", "b=2"]);
    }

    #[test]
    fn overlay_last_writer_wins_in_overlay_order() {
        let mut base = HeaderMap::new();
        base.set("X-Trace", "base");
        let mut perm = HeaderMap::new();
        perm.set("X-Trace", "perm");
        base.overlay(&perm);
        assert_eq!(base.get("x-trace"), Some("perm"));
    }
}
