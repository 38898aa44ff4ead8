//! Single connection slot + keep-alive controller.
//!
//! Deliberately one slot rather than a cross-origin pool: keep-alive
//! reuses only the single currently-open connection.

use std::time::{Duration, Instant};

use crate::proxy::Proxy;
use crate::stream::Stream;
use crate::tls::TlsDiagnostics;

/// Origin tuple `(scheme, host, port)` a connection slot was opened
/// against.
pub(crate) type Origin = (String, String, u16);

/// The live connection slot the façade currently owns.
pub(crate) struct ConnectionSlot {
    stream: Stream,
    proxy: Option<Proxy>,
    origin: Origin,
    idle_since: Instant,
    requests_served: u32,
    max_requests: u32,
    keep_alive_timeout: Duration,
    pub(crate) tls_diagnostics: Option<TlsDiagnostics>,
}

/// Holds at most one [`ConnectionSlot`].
#[derive(Default)]
pub(crate) struct Pool {
    slot: Option<ConnectionSlot>,
}

impl Pool {
    pub(crate) fn new() -> Pool {
        Pool { slot: None }
    }

    /// Take the current slot's stream for reuse iff the proxy identity
    /// and origin match and neither the request cap nor the idle timeout
    /// has elapsed. Otherwise drop any existing slot and
    /// return `None` so the caller builds a fresh one.
    pub(crate) fn acquire(&mut self, proxy: &Option<Proxy>, origin: &Origin) -> Option<(Stream, Option<TlsDiagnostics>, u32)> {
        let reusable = match &self.slot {
            Some(slot) => {
                &slot.proxy == proxy
                    && &slot.origin == origin
                    && slot.requests_served < slot.max_requests
                    && slot.idle_since.elapsed() < slot.keep_alive_timeout
            }
            None => false,
        };

        if reusable {
            let slot = self.slot.take().expect("checked Some above");
            log::trace!("pool: reusing connection to {}:{}", slot.origin.1, slot.origin.2);
            Some((slot.stream, slot.tls_diagnostics, slot.requests_served))
        } else {
            if self.slot.is_some() {
                log::trace!("pool: dropping stale connection slot");
            }
            self.slot = None;
            None
        }
    }

    /// Take back the stream the caller borrowed from `acquire`, or a
    /// freshly established one, after one request/response exchange.
    /// `server_keep_alive`
    /// is the `Keep-Alive: timeout=, max=` the response carried, if any,
    /// honored over the agent's own defaults. If `close` is set the slot
    /// is dropped instead of retained.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn put_back(
        &mut self,
        stream: Stream,
        proxy: Option<Proxy>,
        origin: Origin,
        tls_diagnostics: Option<TlsDiagnostics>,
        close: bool,
        requests_served: u32,
        server_keep_alive: Option<(Option<Duration>, Option<u32>)>,
        default_max_requests: u32,
        default_keep_alive_timeout: Duration,
    ) {
        if close {
            log::trace!("pool: connection closed by policy/server, discarding slot");
            self.slot = None;
            return;
        }

        let (server_timeout, server_max) = server_keep_alive.unwrap_or((None, None));

        self.slot = Some(ConnectionSlot {
            stream,
            proxy,
            origin,
            idle_since: Instant::now(),
            requests_served,
            max_requests: server_max.unwrap_or(default_max_requests),
            keep_alive_timeout: server_timeout.unwrap_or(default_keep_alive_timeout),
            tls_diagnostics,
        });
    }

    /// Unconditionally tear down the current slot (timeouts, cancellation,
    /// a send/receive failure).
    pub(crate) fn drop_slot(&mut self) {
        self.slot = None;
    }
}

/// Parse a `Keep-Alive: timeout=N, max=M` header value.
pub(crate) fn parse_keep_alive_header(value: &str) -> (Option<Duration>, Option<u32>) {
    let mut timeout = None;
    let mut max = None;
    for part in value.split(',') {
        let part = part.trim();
        if let Some(v) = part.strip_prefix("timeout=") {
            if let Ok(secs) = v.trim().parse::<u64>() {
                timeout = Some(Duration::from_secs(secs));
            }
        } else if let Some(v) = part.strip_prefix("max=") {
            if let Ok(m) = v.trim().parse::<u32>() {
                max = Some(m);
            }
        }
    }
    (timeout, max)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_keep_alive_header() {
        let (timeout, max) = parse_keep_alive_header("timeout=30, max=2");
        assert_eq!(timeout, Some(Duration::from_secs(30)));
        assert_eq!(max, Some(2));
    }

    #[test]
    fn parses_partial_keep_alive_header() {
        let (timeout, max) = parse_keep_alive_header("max=5");
        assert_eq!(timeout, None);
        assert_eq!(max, Some(5));
    }

    #[test]
    fn empty_pool_has_nothing_to_acquire() {
        let mut pool = Pool::new();
        assert!(pool.acquire(&None, &("https".into(), "h".into(), 443)).is_none());
    }
}
