//! TLS acceptor construction from PEM certificate material.

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use anyhow::Context as _;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;

use crate::config::TlsConfig;

/// Loads a certificate chain and private key from disk and builds a [`TlsAcceptor`].
///
/// # Errors
///
/// Returns an error if the files cannot be read, contain no usable
/// certificate or key, or rustls rejects the resulting configuration.
pub fn load_tls_acceptor(tls: &TlsConfig) -> anyhow::Result<TlsAcceptor> {
    let certs = load_certs(&tls.cert_path)
        .with_context(|| format!("reading TLS certificate at {}", tls.cert_path.display()))?;
    let key = load_key(&tls.key_path)
        .with_context(|| format!("reading TLS private key at {}", tls.key_path.display()))?;

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .context("building TLS server configuration")?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

fn load_certs(path: &std::path::Path) -> anyhow::Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .context("no certificates found in PEM file")
}

fn load_key(path: &std::path::Path) -> anyhow::Result<PrivateKeyDer<'static>> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)?
        .context("no private key found in PEM file")
}
