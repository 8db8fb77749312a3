//! Client TLS material for store connections.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{Result, TlsError};

const PEM_MARKER: &[u8] = b"-----BEGIN";

/// Paths of the client TLS files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsFiles {
    /// Certificate Authority root certificate (PEM)
    pub ca_cert_file: PathBuf,
    /// Client certificate chain (PEM)
    pub cert_file: PathBuf,
    /// Client private key (PEM)
    pub key_file: PathBuf,
}

/// PEM contents loaded from [`TlsFiles`].
#[derive(Clone)]
pub struct TlsMaterial {
    pub ca_cert: Vec<u8>,
    pub cert: Vec<u8>,
    pub key: Vec<u8>,
}

// Keeps the private key out of logs
impl fmt::Debug for TlsMaterial {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("TlsMaterial")
            .field("ca_cert", &format_args!("{} bytes", self.ca_cert.len()))
            .field("cert", &format_args!("{} bytes", self.cert.len()))
            .field("key", &"<redacted>")
            .finish()
    }
}

impl TlsFiles {
    pub fn new(
        ca_cert_file: impl Into<PathBuf>,
        cert_file: impl Into<PathBuf>,
        key_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            ca_cert_file: ca_cert_file.into(),
            cert_file: cert_file.into(),
            key_file: key_file.into(),
        }
    }

    /// Reads the three files.
    ///
    /// # Errors
    /// - [`TlsError::Read`] if a file cannot be read
    /// - [`TlsError::Malformed`] if a file holds no PEM block
    pub fn load(&self) -> Result<TlsMaterial> {
        let material = TlsMaterial {
            ca_cert: read_pem(&self.ca_cert_file)?,
            cert: read_pem(&self.cert_file)?,
            key: read_pem(&self.key_file)?,
        };
        debug!(ca = ?self.ca_cert_file, cert = ?self.cert_file, "loaded TLS material");
        Ok(material)
    }
}

fn read_pem(path: &Path) -> Result<Vec<u8>> {
    let bytes = std::fs::read(path).map_err(|source| TlsError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    if !bytes.windows(PEM_MARKER.len()).any(|w| w == PEM_MARKER) {
        return Err(TlsError::Malformed {
            path: path.to_path_buf(),
        }
        .into());
    }
    Ok(bytes)
}
