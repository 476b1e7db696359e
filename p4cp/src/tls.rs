//! TLS credential bundle for device channels.

use std::path::PathBuf;

use crate::errors::{Error, Result};

/// PEM material supplied either inline or as a file path.
#[derive(Clone, Debug)]
pub enum Pem {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl Pem {
    pub fn load(&self) -> Result<Vec<u8>> {
        match self {
            Pem::Path(path) => std::fs::read(path).map_err(|err| {
                Error::config(format!("cannot read {}: {}", path.display(), err))
            }),
            Pem::Bytes(bytes) => Ok(bytes.clone()),
        }
    }
}

impl From<PathBuf> for Pem {
    fn from(path: PathBuf) -> Self {
        Pem::Path(path)
    }
}

impl From<Vec<u8>> for Pem {
    fn from(bytes: Vec<u8>) -> Self {
        Pem::Bytes(bytes)
    }
}

/// Client TLS configuration: CA root, optional client cert/key pair, and an
/// optional override for the name checked against the server certificate.
#[derive(Clone, Debug, Default)]
pub struct TlsCredentials {
    pub ca_cert: Option<Pem>,
    pub client_cert: Option<Pem>,
    pub client_key: Option<Pem>,
    pub target_name_override: Option<String>,
}

impl TlsCredentials {
    /// Build grpcio channel credentials from the bundle.
    pub fn channel_credentials(&self) -> Result<grpcio::ChannelCredentials> {
        let mut builder = grpcio::ChannelCredentialsBuilder::new();
        if let Some(ca) = &self.ca_cert {
            builder = builder.root_cert(ca.load()?);
        }
        match (&self.client_cert, &self.client_key) {
            (Some(cert), Some(key)) => {
                builder = builder.cert(cert.load()?, key.load()?);
            }
            (None, None) => {}
            _ => {
                return Err(Error::config(
                    "client_cert and client_key must be provided together",
                ))
            }
        }
        Ok(builder.build())
    }
}
