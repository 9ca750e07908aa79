//! HTTPS connector construction.
//!
//! Native root certificates are loaded from the OS store once per process.

use std::sync::{Arc, OnceLock};

use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use rustls::crypto::CryptoProvider;
use rustls_pki_types::CertificateDer;

use super::config::{TlsRootConfig, TransportConfig, TransportSecurity};
use crate::error::TransportError;

static NATIVE_ROOTS: OnceLock<Vec<CertificateDer<'static>>> = OnceLock::new();

fn native_roots() -> &'static [CertificateDer<'static>] {
    NATIVE_ROOTS.get_or_init(|| {
        let loaded = rustls_native_certs::load_native_certs();
        for err in &loaded.errors {
            tracing::warn!(error = %err, "error loading native root certificate");
        }
        tracing::debug!(count = loaded.certs.len(), "loaded native root certificates");
        loaded.certs
    })
}

/// The globally installed provider if there is one, else aws-lc-rs.
fn crypto_provider() -> Arc<CryptoProvider> {
    CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}

fn native_client_config() -> Result<rustls::ClientConfig, TransportError> {
    let certs = native_roots();
    let mut roots = rustls::RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(certs.iter().cloned());
    if ignored > 0 {
        tracing::warn!(added, ignored, "some native root certificates could not be parsed");
    }
    if added == 0 {
        return Err(TransportError::Tls(
            format!("no usable native root CA certificates (found {})", certs.len()).into(),
        ));
    }

    let config = rustls::ClientConfig::builder_with_provider(crypto_provider())
        .with_safe_default_protocol_versions()
        .map_err(|e| TransportError::Tls(Box::new(e)))?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(config)
}

/// Builds the connector used by the pooled hyper client.
///
/// # Errors
/// Returns [`TransportError::Tls`] if the selected root store cannot be loaded.
pub(super) fn build_connector(
    config: &TransportConfig,
) -> Result<HttpsConnector<HttpConnector>, TransportError> {
    let mut http = HttpConnector::new();
    http.enforce_http(false);
    http.set_connect_timeout(Some(config.connect_timeout));

    let builder = match config.tls_roots {
        TlsRootConfig::WebPki => HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(crypto_provider())
            .map_err(|e| TransportError::Tls(Box::new(e)))?,
        TlsRootConfig::Native => HttpsConnectorBuilder::new().with_tls_config(native_client_config()?),
    };

    let builder = match config.security {
        TransportSecurity::AllowInsecureHttp => builder.https_or_http(),
        TransportSecurity::TlsOnly => builder.https_only(),
    };

    Ok(builder.enable_http1().wrap_connector(http))
}
