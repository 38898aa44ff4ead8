//! Agent and per-request configuration.
//!
//! Flattened to two plain structs (no typestate scopes -- this crate has
//! no `http`-crate interop layer to make that machinery pay for itself).

use std::time::Duration;

use rustls_pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};

use crate::proxy::Proxy;

/// Policy for redirect `Authorization`/`Proxy-Authorization` headers.
/// A host change always strips them regardless of this setting; it only
/// affects the same-host case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectAuthHeaders {
    /// Never carry auth headers across a redirect.
    Never,
    /// Carry them only when the redirect stays on the same host.
    SameHost,
}

/// A client certificate and its private key, presented during the
/// handshake when the server requests one.
#[derive(Debug, Clone)]
pub struct ClientCertKey {
    pub(crate) cert_chain: Vec<CertificateDer<'static>>,
    pub(crate) key: ClonablePrivateKey,
}

/// `PrivateKeyDer` doesn't implement `Clone` (it zeroizes on drop); this
/// wrapper stores the raw PKCS#8 DER bytes and rewraps them on each clone,
/// since [`TlsConfig`] itself needs to be `Clone` for per-request overrides.
#[derive(Debug, Clone)]
pub(crate) struct ClonablePrivateKey(Vec<u8>);

impl ClonablePrivateKey {
    pub(crate) fn to_private_key_der(&self) -> PrivateKeyDer<'static> {
        PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(self.0.clone()))
    }
}

impl ClientCertKey {
    /// `key_der` must be a DER-encoded PKCS#8 private key.
    pub fn new(cert_chain: Vec<Vec<u8>>, key_der: Vec<u8>) -> Result<ClientCertKey, crate::Error> {
        if key_der.is_empty() {
            return Err(crate::Error::InvalidInput("client certificate private key is empty".to_string()));
        }
        Ok(ClientCertKey {
            cert_chain: cert_chain.into_iter().map(CertificateDer::from).collect(),
            key: ClonablePrivateKey(key_der),
        })
    }
}

/// TLS behavior, shared by agent and per-request config.
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    pub(crate) disable_verification: bool,
    pub(crate) cipher_suite_order: Option<Vec<String>>,
    pub(crate) client_cert: Option<ClientCertKey>,
}

impl TlsConfig {
    pub fn builder() -> TlsConfigBuilder {
        TlsConfigBuilder(TlsConfig::default())
    }
}

pub struct TlsConfigBuilder(TlsConfig);

impl TlsConfigBuilder {
    /// Accept any server certificate. **Insecure.** This must be an
    /// explicit opt-in rather than the shipped default; this method is
    /// that opt-in.
    pub fn danger_accept_invalid_certs(mut self, v: bool) -> Self {
        self.0.disable_verification = v;
        self
    }

    /// Explicit cipher-suite ordering. `None` (the default) uses
    /// rustls's own default ordering.
    pub fn cipher_suite_order(mut self, order: Vec<String>) -> Self {
        self.0.cipher_suite_order = Some(order);
        self
    }

    /// Present this certificate (and its private key) during the
    /// handshake if the server requests client authentication.
    pub fn client_cert(mut self, cert: ClientCertKey) -> Self {
        self.0.client_cert = Some(cert);
        self
    }

    pub fn build(self) -> TlsConfig {
        self.0
    }
}

/// Request timeout configuration.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    /// TCP connect + proxy handshake.
    pub connect: Duration,
    /// Each individual socket read or write.
    pub read_write: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            connect: Duration::from_secs(30),
            read_write: Duration::from_secs(30),
        }
    }
}

/// Policy flags carried on [`crate::Request`].
#[derive(Debug, Clone, Copy)]
pub struct PolicyFlags {
    pub allow_auto_redirect: bool,
    pub ignore_protocol_errors: bool,
    pub use_cookies: bool,
    pub enable_middle_headers: bool,
    pub cookie_single_header: bool,
    pub allow_empty_header_values: bool,
    pub keep_temporary_headers_on_redirect: bool,
}

impl Default for PolicyFlags {
    fn default() -> Self {
        PolicyFlags {
            allow_auto_redirect: true,
            ignore_protocol_errors: true,
            use_cookies: true,
            enable_middle_headers: false,
            cookie_single_header: true,
            allow_empty_header_values: false,
            keep_temporary_headers_on_redirect: false,
        }
    }
}

/// Agent-wide configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub(crate) proxy: Option<Proxy>,
    pub(crate) https_only: bool,
    pub(crate) bypass_proxy_for_loopback: bool,
    pub(crate) tls: TlsConfig,
    pub(crate) timeouts: Timeouts,
    pub(crate) policy: PolicyFlags,
    pub(crate) max_redirects: u32,
    pub(crate) max_keep_alive_requests: u32,
    pub(crate) keep_alive_timeout: Duration,
    pub(crate) reconnect_enabled: bool,
    pub(crate) reconnect_limit: u32,
    pub(crate) reconnect_delay: Duration,
    pub(crate) accept_encoding: bool,
    pub(crate) locale: String,
    pub(crate) charset: String,
    pub(crate) tcp_send_buffer_size: usize,
    pub(crate) absolute_uri_in_start_line: bool,
    pub(crate) unescape_values_on_send: Option<bool>,
    pub(crate) escape_values_on_receive: bool,
    pub(crate) redirect_auth_headers: RedirectAuthHeaders,
    /// Lenient by default: a malformed `Set-Cookie` is dropped rather
    /// than surfaced as an error unless this is explicitly turned off.
    pub(crate) ignore_invalid_cookie: bool,
    pub(crate) ignore_set_for_expired_cookies: bool,
    pub(crate) expire_before_set: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            proxy: Proxy::try_from_env(),
            https_only: false,
            bypass_proxy_for_loopback: true,
            tls: TlsConfig::default(),
            timeouts: Timeouts::default(),
            policy: PolicyFlags::default(),
            max_redirects: 5,
            max_keep_alive_requests: 100,
            keep_alive_timeout: Duration::from_secs(30),
            reconnect_enabled: true,
            reconnect_limit: 3,
            reconnect_delay: Duration::from_millis(100),
            accept_encoding: true,
            locale: "en".into(),
            charset: "utf-8".into(),
            tcp_send_buffer_size: 64 * 1024,
            absolute_uri_in_start_line: false,
            unescape_values_on_send: None,
            escape_values_on_receive: true,
            redirect_auth_headers: RedirectAuthHeaders::SameHost,
            ignore_invalid_cookie: true,
            ignore_set_for_expired_cookies: false,
            expire_before_set: true,
        }
    }
}

impl AgentConfig {
    pub fn builder() -> AgentConfigBuilder {
        AgentConfigBuilder(AgentConfig::default())
    }

    /// Whether to URL-unescape cookie values before sending them. Follows
    /// `escape_values_on_receive` unless explicitly overridden.
    pub(crate) fn unescape_values_on_send(&self) -> bool {
        self.unescape_values_on_send
            .unwrap_or(self.escape_values_on_receive)
    }
}

pub struct AgentConfigBuilder(AgentConfig);

macro_rules! builder_field {
    ($name:ident, $ty:ty) => {
        pub fn $name(mut self, v: $ty) -> Self {
            self.0.$name = v;
            self
        }
    };
}

impl AgentConfigBuilder {
    builder_field!(https_only, bool);
    builder_field!(bypass_proxy_for_loopback, bool);
    builder_field!(max_redirects, u32);
    builder_field!(max_keep_alive_requests, u32);
    builder_field!(reconnect_enabled, bool);
    builder_field!(reconnect_limit, u32);
    builder_field!(accept_encoding, bool);
    builder_field!(absolute_uri_in_start_line, bool);
    builder_field!(escape_values_on_receive, bool);

    pub fn proxy(mut self, v: Option<Proxy>) -> Self {
        self.0.proxy = v;
        self
    }

    pub fn tls(mut self, v: TlsConfig) -> Self {
        self.0.tls = v;
        self
    }

    pub fn connect_timeout(mut self, v: Duration) -> Self {
        self.0.timeouts.connect = v;
        self
    }

    pub fn read_write_timeout(mut self, v: Duration) -> Self {
        self.0.timeouts.read_write = v;
        self
    }

    pub fn keep_alive_timeout(mut self, v: Duration) -> Self {
        self.0.keep_alive_timeout = v;
        self
    }

    pub fn locale(mut self, v: impl Into<String>) -> Self {
        self.0.locale = v.into();
        self
    }

    pub fn charset(mut self, v: impl Into<String>) -> Self {
        self.0.charset = v.into();
        self
    }

    pub fn policy(mut self, v: PolicyFlags) -> Self {
        self.0.policy = v;
        self
    }

    pub fn unescape_values_on_send(mut self, v: bool) -> Self {
        self.0.unescape_values_on_send = Some(v);
        self
    }

    pub fn redirect_auth_headers(mut self, v: RedirectAuthHeaders) -> Self {
        self.0.redirect_auth_headers = v;
        self
    }

    builder_field!(ignore_invalid_cookie, bool);
    builder_field!(ignore_set_for_expired_cookies, bool);
    builder_field!(expire_before_set, bool);

    pub fn build(self) -> AgentConfig {
        self.0
    }
}

/// Per-request overrides -- timeouts, TLS options, proxy override, and
/// policy flags -- layered on top of the owning agent's [`AgentConfig`]
/// at send time. Unset fields inherit the agent's value -- there is no
/// typestate scope machinery here, since this crate has no `http`-crate
/// interop layer to make that pay for itself.
#[derive(Debug, Clone, Default)]
pub struct RequestConfig {
    /// `None` inherits the agent's proxy. `Some(None)` forces no proxy
    /// for this request even if the agent has one configured.
    proxy: Option<Option<Proxy>>,
    tls: Option<TlsConfig>,
    timeouts: Option<Timeouts>,
    policy: Option<PolicyFlags>,
    max_redirects: Option<u32>,
}

impl RequestConfig {
    pub fn builder() -> RequestConfigBuilder {
        RequestConfigBuilder(RequestConfig::default())
    }

    pub(crate) fn resolved_proxy(&self, agent: &AgentConfig) -> Option<Proxy> {
        match &self.proxy {
            Some(p) => p.clone(),
            None => agent.proxy.clone(),
        }
    }

    pub(crate) fn resolved_tls<'a>(&'a self, agent: &'a AgentConfig) -> &'a TlsConfig {
        self.tls.as_ref().unwrap_or(&agent.tls)
    }

    pub(crate) fn resolved_timeouts(&self, agent: &AgentConfig) -> Timeouts {
        self.timeouts.unwrap_or(agent.timeouts)
    }

    pub(crate) fn resolved_policy(&self, agent: &AgentConfig) -> PolicyFlags {
        self.policy.unwrap_or(agent.policy)
    }

    pub(crate) fn resolved_max_redirects(&self, agent: &AgentConfig) -> u32 {
        self.max_redirects.unwrap_or(agent.max_redirects)
    }
}

pub struct RequestConfigBuilder(RequestConfig);

impl RequestConfigBuilder {
    pub fn proxy(mut self, v: Option<Proxy>) -> Self {
        self.0.proxy = Some(v);
        self
    }

    pub fn tls(mut self, v: TlsConfig) -> Self {
        self.0.tls = Some(v);
        self
    }

    pub fn connect_timeout(mut self, v: Duration) -> Self {
        let mut t = self.0.timeouts.unwrap_or_default();
        t.connect = v;
        self.0.timeouts = Some(t);
        self
    }

    pub fn read_write_timeout(mut self, v: Duration) -> Self {
        let mut t = self.0.timeouts.unwrap_or_default();
        t.read_write = v;
        self.0.timeouts = Some(t);
        self
    }

    pub fn policy(mut self, v: PolicyFlags) -> Self {
        self.0.policy = Some(v);
        self
    }

    pub fn max_redirects(mut self, v: u32) -> Self {
        self.0.max_redirects = Some(v);
        self
    }

    pub fn build(self) -> RequestConfig {
        self.0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn client_cert_key_rejects_empty_private_key() {
        let err = ClientCertKey::new(vec![vec![1, 2, 3]], vec![]).unwrap_err();
        assert!(matches!(err, crate::Error::InvalidInput(_)));
    }

    #[test]
    fn client_cert_key_roundtrips_through_tls_config() {
        let cert = ClientCertKey::new(vec![vec![1, 2, 3]], vec![4, 5, 6]).unwrap();
        let tls_config = TlsConfig::builder().client_cert(cert).build();
        let client_cert = tls_config.client_cert.as_ref().unwrap();
        assert_eq!(client_cert.cert_chain.len(), 1);
        assert!(matches!(client_cert.key.to_private_key_der(), PrivateKeyDer::Pkcs8(_)));
    }
}
