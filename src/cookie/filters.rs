//! Pre-storage string filters applied to a raw `Set-Cookie` value before
//! structured parsing.
//!
//! Simplification (DESIGN.md): the four filters are always applied as one
//! pipeline rather than individually toggleable -- there is no policy
//! flag that turns any one of them off.

pub(super) fn apply_all(raw: &str) -> String {
    let s = raw.trim().to_string();
    let s = normalize_path_slash(&s);
    let s = repair_expires_9999(&s);
    escape_trailing_comma(&s)
}

/// `path=/abc;` -> `path=/;`: a `path=/` attribute followed immediately by
/// more characters is truncated to the bare root.
fn normalize_path_slash(raw: &str) -> String {
    let lower = raw.to_ascii_lowercase();
    let Some(idx) = lower.find("path=/") else {
        return raw.to_string();
    };
    let value_start = idx + "path=".len();
    let rest = &raw[value_start..];
    let end = rest.find(';').unwrap_or(rest.len());
    let value = &rest[..end];

    if value.len() > 1 {
        let mut out = String::with_capacity(raw.len());
        out.push_str(&raw[..value_start]);
        out.push('/');
        out.push_str(&rest[end..]);
        out
    } else {
        raw.to_string()
    }
}

/// Overwrite the last `9` in an `expires=...9999...` value with `8`, so the
/// year becomes 9998 instead of overflowing downstream date parsers.
fn repair_expires_9999(raw: &str) -> String {
    let lower = raw.to_ascii_lowercase();
    let Some(idx) = lower.find("expires=") else {
        return raw.to_string();
    };
    let value_start = idx + "expires=".len();
    let rest = &raw[value_start..];
    let end = rest.find(';').unwrap_or(rest.len());
    let value = &rest[..end];

    let Some(year_start) = value.rfind("9999") else {
        return raw.to_string();
    };
    let last_nine = year_start + 3;

    let mut new_value = value.to_string();
    new_value.replace_range(last_nine..last_nine + 1, "8");

    let mut out = String::with_capacity(raw.len());
    out.push_str(&raw[..value_start]);
    out.push_str(&new_value);
    out.push_str(&rest[end..]);
    out
}

/// Percent-escape a trailing `,` in the cookie pair's value segment.
fn escape_trailing_comma(raw: &str) -> String {
    let end = raw.find(';').unwrap_or(raw.len());
    let pair = &raw[..end];
    let Some(eq) = pair.find('=') else {
        return raw.to_string();
    };
    let value = &pair[eq + 1..];
    if !value.ends_with(',') {
        return raw.to_string();
    }

    let mut out = String::with_capacity(raw.len() + 2);
    out.push_str(&pair[..=eq]);
    out.push_str(&value[..value.len() - 1]);
    out.push_str("%2C");
    out.push_str(&raw[end..]);
    out
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn truncates_path_with_trailing_segment() {
        assert_eq!(apply_all("a=1; path=/abc; Secure"), "a=1; path=/; Secure");
    }

    #[test]
    fn leaves_bare_root_path_alone() {
        assert_eq!(apply_all("a=1; path=/"), "a=1; path=/");
    }

    #[test]
    fn repairs_year_9999() {
        assert_eq!(
            apply_all("a=1; expires=Fri, 31 Dec 9999 23:59:59 GMT"),
            "a=1; expires=Fri, 31 Dec 9998 23:59:59 GMT"
        );
    }

    #[test]
    fn escapes_trailing_comma_in_value() {
        assert_eq!(apply_all("a=1,2,"), "a=1,2%2C");
    }

    #[test]
    fn leaves_ordinary_cookie_untouched() {
        assert_eq!(apply_all("a=1; path=/x; domain=example.com"), "a=1; path=/x; domain=example.com");
    }
}
