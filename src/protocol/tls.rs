//! TLS configuration for both ends of a connection.
//!
//! Certificates and keys are read from PEM files. The server presents a certificate chain and
//! private key; the client trusts exactly the CA certificates it is given.

use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    sync::Arc,
};

use rustls::{
    ClientConfig, RootCertStore, ServerConfig,
    pki_types::{CertificateDer, PrivateKeyDer, ServerName},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("no certificates found in {0}")]
    NoCertificates(String),
    #[error("no private key found in {0}")]
    NoPrivateKey(String),
    #[error("invalid TLS server name '{0}'")]
    ServerName(String),
    #[error("TLS configuration rejected: {0}")]
    Rustls(#[from] rustls::Error),
}

/// Server certificate chain and key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerTlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

impl ServerTlsConfig {
    pub fn new(cert_path: impl AsRef<Path>, key_path: impl AsRef<Path>) -> Self {
        Self {
            cert_path: cert_path.as_ref().to_path_buf(),
            key_path: key_path.as_ref().to_path_buf(),
        }
    }

    pub fn build(&self) -> Result<Arc<ServerConfig>, TlsError> {
        let certs = load_certs(&self.cert_path)?;
        let key = load_private_key(&self.key_path)?;

        let config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)?;

        Ok(Arc::new(config))
    }
}

/// Trust anchors and expected server name for a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientTlsConfig {
    pub ca_path: PathBuf,
    /// Name checked against the server certificate; defaults to the dialed host.
    pub server_name: Option<String>,
}

impl ClientTlsConfig {
    pub fn new(ca_path: impl AsRef<Path>) -> Self {
        Self {
            ca_path: ca_path.as_ref().to_path_buf(),
            server_name: None,
        }
    }

    #[must_use]
    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }

    pub fn build(&self) -> Result<Arc<ClientConfig>, TlsError> {
        let mut roots = RootCertStore::empty();
        for cert in load_certs(&self.ca_path)? {
            roots.add(cert)?;
        }

        let config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();

        Ok(Arc::new(config))
    }
}

pub(crate) fn server_name(name: &str) -> Result<ServerName<'static>, TlsError> {
    ServerName::try_from(name.to_string()).map_err(|_| TlsError::ServerName(name.to_string()))
}

fn open(path: &Path) -> Result<BufReader<File>, TlsError> {
    let file = File::open(path).map_err(|source| TlsError::Read {
        path: path.display().to_string(),
        source,
    })?;
    Ok(BufReader::new(file))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let mut reader = open(path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Read {
            path: path.display().to_string(),
            source,
        })?;

    if certs.is_empty() {
        return Err(TlsError::NoCertificates(path.display().to_string()));
    }
    Ok(certs)
}

/// Accepts PKCS#1, PKCS#8 and SEC1 keys; the first key in the file wins.
fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let mut reader = open(path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|source| TlsError::Read {
            path: path.display().to_string(),
            source,
        })?
        .ok_or_else(|| TlsError::NoPrivateKey(path.display().to_string()))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempdir::TempDir;

    use super::*;

    fn fixture(name: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures")
            .join(name)
    }

    #[test]
    fn tls_config_new() {
        let config = ServerTlsConfig::new("/path/to/cert.pem", "/path/to/key.pem");
        assert_eq!(config.cert_path.to_str(), Some("/path/to/cert.pem"));
        assert_eq!(config.key_path.to_str(), Some("/path/to/key.pem"));
    }

    #[test]
    fn client_config_with_server_name() {
        let config = ClientTlsConfig::new("/path/to/ca.pem").with_server_name("localhost");
        assert_eq!(config.server_name.as_deref(), Some("localhost"));
    }

    #[test]
    fn server_config_from_fixtures() {
        let config = ServerTlsConfig::new(fixture("server-cert.pem"), fixture("server-key.pem"));
        assert!(config.build().is_ok());
    }

    #[test]
    fn client_config_from_fixtures() {
        assert!(ClientTlsConfig::new(fixture("ca-cert.pem")).build().is_ok());
    }

    #[test]
    fn missing_certificate_file() {
        let config = ServerTlsConfig::new("/nonexistent/cert.pem", fixture("server-key.pem"));
        assert!(matches!(config.build(), Err(TlsError::Read { .. })));
    }

    #[test]
    fn empty_pem_files() {
        let temp = TempDir::new("tls").unwrap();
        let empty = temp.path().join("empty.pem");
        fs::write(&empty, "").unwrap();

        let config = ServerTlsConfig::new(&empty, fixture("server-key.pem"));
        assert!(matches!(config.build(), Err(TlsError::NoCertificates(_))));

        let config = ServerTlsConfig::new(fixture("server-cert.pem"), &empty);
        assert!(matches!(config.build(), Err(TlsError::NoPrivateKey(_))));
    }

    #[test]
    fn server_names() {
        assert!(server_name("localhost").is_ok());
        assert!(server_name("127.0.0.1").is_ok());
        assert!(matches!(
            server_name("not a host name"),
            Err(TlsError::ServerName(_))
        ));
    }
}
