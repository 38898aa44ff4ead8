//! Redirect controller.
//!
//! A free function called in a loop from `agent::Agent::send`: resolve
//! the next URI, rewrite the method, then hand a rebuilt request back to
//! the caller to send with the same agent and jar. Pulled out into its
//! own module since the redirect rules here (host-scoped header
//! stripping, 307/308 preservation, middle headers) are substantial
//! enough to deserve their own tests.

use crate::address::RedirectTarget;
use crate::config::{AgentConfig, RedirectAuthHeaders};
use crate::error::Error;
use crate::header::HeaderMap;
use crate::request::Request;
use crate::response::Response;
use crate::send_body::ContentSource;

/// What the redirect controller decided to do with a response.
pub(crate) enum Decision {
    /// Not a redirect, or redirects are disabled: hand the response back
    /// to the caller unchanged.
    Surface,
    /// An external (non-http/https) redirect target: surface the
    /// response verbatim without following.
    SurfaceExternal,
    /// Follow the redirect with this rebuilt request.
    Follow(Box<Request>),
}

/// Decide what to do with `resp`, the response to `prev` at the current
/// `redirect_count` (number of redirects already followed for this
/// logical call).
pub(crate) fn decide(prev: Request, resp: &Response, agent: &AgentConfig, redirect_count: u32) -> Result<Decision, Error> {
    let policy = prev.config.resolved_policy(agent);

    if !resp.has_redirect() || !policy.allow_auto_redirect {
        return Ok(Decision::Surface);
    }

    let max_redirects = prev.config.resolved_max_redirects(agent);
    if redirect_count >= max_redirects {
        return Err(Error::ProtocolError(format!("redirect limit ({max_redirects}) exceeded")));
    }

    let location = resp
        .header("location")
        .or_else(|| resp.header("redirect-location"))
        .ok_or_else(|| Error::ProtocolError("redirect status with no Location header".into()))?;

    let target = match prev.address().resolve_redirect(location)? {
        RedirectTarget::External => return Ok(Decision::SurfaceExternal),
        RedirectTarget::Follow(addr) => addr,
    };

    let host_changed = target.host() != prev.address().host() || target.port() != prev.address().port();

    // Non-307/308 redirects drop the body and downgrade to GET; 307/308
    // preserve both.
    let preserve_method_and_body = matches!(resp.status(), 307 | 308);

    let method = if preserve_method_and_body { prev.method } else { crate::request::Method::Get };

    let mut permanent_headers = prev.permanent_headers;
    // Temporary headers carry across same-host redirects only when the
    // flag is set; a host change always drops them, regardless of the
    // flag (see DESIGN.md for why host change wins over the flag).
    let keep_temp = !host_changed && agent.policy.keep_temporary_headers_on_redirect;
    let temporary_headers = if keep_temp { prev.temporary_headers } else { HeaderMap::new() };

    if host_changed {
        // Authorization computed from URI credentials is naturally
        // dropped by `build_base_headers` once the target has none; this
        // only needs to strip a caller-set literal header, which always
        // happens on a host change regardless of `redirect_auth_headers`.
        permanent_headers.remove("host");
        permanent_headers.remove("origin");
        permanent_headers.remove("authorization");
    } else if agent.redirect_auth_headers == RedirectAuthHeaders::Never {
        permanent_headers.remove("authorization");
    }

    let body = if preserve_method_and_body { prev.body } else { ContentSource::Empty };

    let next = Request {
        method,
        address: target,
        permanent_headers,
        temporary_headers,
        body,
        jar: prev.jar,
        config: prev.config,
        upload_progress: prev.upload_progress,
        download_progress: prev.download_progress,
    };

    Ok(Decision::Follow(Box::new(next)))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::AgentConfig;
    use crate::header::HeaderMap;
    use crate::request::Method;
    use crate::response::Diagnostics;

    fn resp(status: u16, location: &str) -> Response {
        let mut headers = HeaderMap::new();
        headers.set("Location", location);
        crate::response::test_support::build(status, headers, Vec::new(), Diagnostics::default())
    }

    #[test]
    fn non_307_drops_body_and_downgrades_to_get() {
        let req = Request::new(Method::Post, "https://a.example/x")
            .unwrap()
            .body(ContentSource::text("q=1"));
        let agent = AgentConfig::builder().proxy(None).build();
        let r = resp(302, "https://b.example/y");
        match decide(req, &r, &agent, 0).unwrap() {
            Decision::Follow(next) => {
                assert_eq!(next.method, Method::Get);
                assert!(matches!(next.body, ContentSource::Empty));
                assert_eq!(next.address.host(), "b.example");
            }
            _ => panic!("expected follow"),
        }
    }

    #[test]
    fn host_change_strips_temporary_headers_and_host() {
        let req = Request::new(Method::Get, "https://a.example/x")
            .unwrap()
            .temporary_header("X-Trace", "t1")
            .unwrap();
        let agent = AgentConfig::builder().proxy(None).build();
        let r = resp(302, "https://b.example/y");
        match decide(req, &r, &agent, 0).unwrap() {
            Decision::Follow(next) => {
                assert!(next.temporary_headers.is_empty());
                assert!(!next.permanent_headers.has("host"));
            }
            _ => panic!("expected follow"),
        }
    }

    #[test]
    fn redirect_limit_exceeded_errors() {
        let req = Request::new(Method::Get, "https://a.example/x").unwrap();
        let agent = AgentConfig::builder().proxy(None).max_redirects(2).build();
        let r = resp(302, "https://a.example/y");
        let err = decide(req, &r, &agent, 2).unwrap_err();
        assert!(matches!(err, Error::ProtocolError(_)));
    }

    #[test]
    fn external_redirect_is_surfaced_not_followed() {
        let req = Request::new(Method::Get, "https://a.example/x").unwrap();
        let agent = AgentConfig::builder().proxy(None).build();
        let r = resp(302, "ftp://b.example/y");
        assert!(matches!(decide(req, &r, &agent, 0).unwrap(), Decision::SurfaceExternal));
    }

    #[test]
    fn preserves_method_and_body_on_307() {
        let req = Request::new(Method::Post, "https://a.example/x")
            .unwrap()
            .body(ContentSource::text("q=1"));
        let agent = AgentConfig::builder().proxy(None).build();
        let r = resp(307, "https://a.example/y");
        match decide(req, &r, &agent, 0).unwrap() {
            Decision::Follow(next) => {
                assert_eq!(next.method, Method::Post);
                assert!(matches!(next.body, ContentSource::Text(_)));
            }
            _ => panic!("expected follow"),
        }
    }
}
