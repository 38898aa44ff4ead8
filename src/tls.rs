//! TLS client handshake.
//!
//! A `rustls::ClientConfig` built once per agent, an opt-in
//! `ServerCertVerifier` that accepts everything (kept as an explicit,
//! non-default opt-in rather than removed), wrapped in a `StreamOwned`.

use std::fmt;
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, ClientConnection, RootCertStore, SignatureScheme, StreamOwned};

use crate::config::TlsConfig;
use crate::stream::Stream;
use crate::Error;

/// Diagnostics captured from a completed handshake.
#[derive(Debug, Clone, Default)]
pub struct TlsDiagnostics {
    pub cipher_suite: Option<String>,
    pub protocol_version: Option<String>,
    pub peer_certificate_der: Option<Vec<u8>>,
}

/// Perform a client handshake against `host` over `tcp`, returning the
/// wrapped duplex stream plus its diagnostics.
pub(crate) fn upgrade(
    tcp: TcpStream,
    host: &str,
    tls_config: &TlsConfig,
    read_write_timeout: Duration,
) -> Result<(Stream, TlsDiagnostics), Error> {
    let config = build_config(tls_config)?;

    let server_name = ServerName::try_from(host.to_string())
        .map_err(|_| Error::connect_tagged("invalid TLS server name", "ssl"))?;

    let conn = ClientConnection::new(config, server_name)
        .map_err(|e| Error::connect_tagged(format!("TLS setup failed: {e}"), "ssl"))?;

    tcp.set_read_timeout(non_zero(read_write_timeout)).ok();
    tcp.set_write_timeout(non_zero(read_write_timeout)).ok();

    let mut stream = StreamOwned::new(conn, tcp);

    // Drive the handshake to completion with an explicit zero-byte write;
    // rustls performs the handshake lazily on the first read/write.
    use std::io::Write;
    stream
        .flush()
        .map_err(|e| Error::connect_tagged(format!("TLS handshake failed: {e}"), "ssl"))?;

    let diagnostics = TlsDiagnostics {
        cipher_suite: stream.conn.negotiated_cipher_suite().map(|cs| format!("{:?}", cs.suite())),
        protocol_version: stream.conn.protocol_version().map(|v| format!("{v:?}")),
        peer_certificate_der: stream
            .conn
            .peer_certificates()
            .and_then(|certs| certs.first())
            .map(|c| c.as_ref().to_vec()),
    };

    Ok((Stream::Tls(Box::new(stream)), diagnostics))
}

fn build_config(tls_config: &TlsConfig) -> Result<Arc<ClientConfig>, Error> {
    let provider = Arc::new(make_provider(tls_config));

    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .expect("default TLS protocol versions");

    let builder = if tls_config.disable_verification {
        log::warn!("TLS certificate verification disabled: connections are not authenticated");
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAllVerifier { provider }))
    } else {
        let mut root_store = RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        builder.with_root_certificates(root_store)
    };

    let config = match &tls_config.client_cert {
        Some(cc) => builder
            .with_client_auth_cert(cc.cert_chain.clone(), cc.key.to_private_key_der())
            .map_err(|e| Error::connect_tagged(format!("client certificate rejected: {e}"), "ssl"))?,
        None => builder.with_no_client_auth(),
    };

    Ok(Arc::new(config))
}

/// The default `ring` provider, with its cipher-suite list reordered (and
/// filtered) per `tls_config.cipher_suite_order` when one was given. Names
/// are matched against each suite's `{:?}` rendering, e.g.
/// `"TLS13_AES_256_GCM_SHA384"`. Unrecognized names are skipped; an empty
/// or entirely-unmatched order falls back to the library default order.
fn make_provider(tls_config: &TlsConfig) -> CryptoProvider {
    let mut provider = rustls::crypto::ring::default_provider();

    if let Some(order) = &tls_config.cipher_suite_order {
        let ordered: Vec<_> = order
            .iter()
            .filter_map(|name| {
                provider
                    .cipher_suites
                    .iter()
                    .find(|cs| format!("{:?}", cs.suite()) == *name)
                    .copied()
            })
            .collect();
        if !ordered.is_empty() {
            provider.cipher_suites = ordered;
        } else {
            log::warn!("wirehttp: cipher_suite_order matched no known suite names, using library default order");
        }
    }

    provider
}

/// A `ServerCertVerifier` that accepts any certificate. **Insecure** --
/// only reachable via [`crate::config::TlsConfigBuilder::danger_accept_invalid_certs`].
#[derive(Debug)]
struct AcceptAllVerifier {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAllVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider.signature_verification_algorithms.supported_schemes()
    }
}

fn non_zero(d: Duration) -> Option<Duration> {
    if d.is_zero() {
        None
    } else {
        Some(d)
    }
}

impl fmt::Display for TlsDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cipher_suite={:?} protocol={:?}",
            self.cipher_suite, self.protocol_version
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn cipher_suite_order_reorders_and_filters() {
        let default_provider = rustls::crypto::ring::default_provider();
        let default_names: Vec<_> = default_provider.cipher_suites.iter().map(|cs| format!("{:?}", cs.suite())).collect();
        assert!(default_names.len() > 1, "need at least two suites to test reordering");

        let mut reversed = default_names.clone();
        reversed.reverse();
        reversed.push("NOT_A_REAL_SUITE".to_string());

        let tls_config = TlsConfig::builder().cipher_suite_order(reversed.clone()).build();
        let provider = make_provider(&tls_config);
        let names: Vec<_> = provider.cipher_suites.iter().map(|cs| format!("{:?}", cs.suite())).collect();

        assert_eq!(names, default_names.into_iter().rev().collect::<Vec<_>>());
    }

    #[test]
    fn unmatched_cipher_suite_order_falls_back_to_default() {
        let tls_config = TlsConfig::builder().cipher_suite_order(vec!["NOT_A_REAL_SUITE".to_string()]).build();
        let default_count = rustls::crypto::ring::default_provider().cipher_suites.len();
        let provider = make_provider(&tls_config);
        assert_eq!(provider.cipher_suites.len(), default_count);
    }
}
