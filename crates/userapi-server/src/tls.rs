//! TLS acceptor construction from PEM files.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::crypto::ring::default_provider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig as RustlsConfig;
use tokio_rustls::TlsAcceptor;

use crate::error::{ServerError, ServerResult};

fn open(path: &Path) -> ServerResult<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| ServerError::TlsMaterial {
            path: path.to_path_buf(),
            source,
        })
}

fn load_certs(path: &Path) -> ServerResult<Vec<CertificateDer<'static>>> {
    let mut reader = open(path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| ServerError::TlsMaterial {
            path: path.to_path_buf(),
            source,
        })?;

    if certs.is_empty() {
        return Err(ServerError::Tls(format!(
            "no certificates found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

fn load_key(path: &Path) -> ServerResult<PrivateKeyDer<'static>> {
    let mut reader = open(path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|source| ServerError::TlsMaterial {
            path: path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| ServerError::Tls(format!("no private key found in {}", path.display())))
}

/// Builds a TLS acceptor from a PEM certificate chain and private key.
///
/// Offers HTTP/1.1 only.
///
/// # Errors
///
/// Returns [`ServerError::TlsMaterial`] if a file cannot be read and
/// [`ServerError::Tls`] if the material is empty or the key does not match.
pub fn load_tls_acceptor(cert_file: &Path, key_file: &Path) -> ServerResult<TlsAcceptor> {
    let certs = load_certs(cert_file)?;
    let key = load_key(key_file)?;

    let mut config = RustlsConfig::builder_with_provider(Arc::new(default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(|e| ServerError::Tls(e.to_string()))?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ServerError::Tls(e.to_string()))?;
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    tracing::debug!(cert = %cert_file.display(), "TLS acceptor built");
    Ok(TlsAcceptor::from(Arc::new(config)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_cert_file() {
        let err = load_tls_acceptor(
            Path::new("/nonexistent/cert.pem"),
            Path::new("/nonexistent/key.pem"),
        )
        .err().expect("expected error");

        match err {
            ServerError::TlsMaterial { path, .. } => {
                assert_eq!(path, Path::new("/nonexistent/cert.pem"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_cert_file_without_certificates() {
        let mut cert = tempfile::NamedTempFile::new().unwrap();
        writeln!(cert, "not a pem file").unwrap();
        let key = tempfile::NamedTempFile::new().unwrap();

        let err = load_tls_acceptor(cert.path(), key.path()).err().expect("expected error");
        assert!(matches!(err, ServerError::Tls(_)));
        assert!(err.to_string().contains("no certificates"));
    }
}
