//! TLS acceptor construction from PEM files.

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use anyhow::{Context, Result};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::RootCertStore;
use tokio_rustls::TlsAcceptor;

use crate::config::ServerConfig;

/// Pick the process-wide crypto provider. Later calls are no-ops.
pub(crate) fn install_crypto_provider() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}

/// Build the listener-side TLS acceptor, verifying client certificates
/// against the configured CA pool when mTLS is on. Paths were checked by
/// config validation; missing ones still error rather than panic.
pub(crate) fn build_acceptor(config: &ServerConfig) -> Result<TlsAcceptor> {
    install_crypto_provider();

    let cert_path = config.tls_cert_path.as_deref().context("TLS_CERT_PATH is not set")?;
    let key_path = config.tls_key_path.as_deref().context("TLS_KEY_PATH is not set")?;
    let certs = load_certs(cert_path)?;
    let key = load_key(key_path)?;

    let tls_config = if config.tls_require_client_cert {
        let ca_path = config
            .tls_client_ca_cert_path
            .as_deref()
            .context("TLS_CLIENT_CA_CERT_PATH is not set")?;
        let mut roots = RootCertStore::empty();
        for cert in load_certs(ca_path)? {
            roots.add(cert).context("invalid certificate in client CA file")?;
        }
        let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
            .build()
            .context("failed to build client certificate verifier")?;
        rustls::ServerConfig::builder()
            .with_client_cert_verifier(verifier)
            .with_single_cert(certs, key)
            .context("invalid server certificate or key")?
    } else {
        rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .context("invalid server certificate or key")?
    };

    Ok(TlsAcceptor::from(Arc::new(tls_config)))
}

pub(crate) fn load_certs(path: &str) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path))?;
    rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<std::io::Result<Vec<_>>>()
        .with_context(|| format!("failed to read certificates from {}", path))
}

pub(crate) fn load_key(path: &str) -> Result<PrivateKeyDer<'static>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path))?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .with_context(|| format!("failed to read private key from {}", path))?
        .with_context(|| format!("no private key found in {}", path))
}
