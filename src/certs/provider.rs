//! Certificate providers.
//!
//! # Responsibilities
//! - `SelfSigned`: leaf signs itself
//! - `ExternalCa`: leaf signed by a CA read from PEM files
//! - `Mkcert`: locate the mkcert CA via `mkcert -CAROOT`, then as `ExternalCa`

use std::path::{Path, PathBuf};
use std::process::Command;

use rcgen::{CertificateParams, KeyPair};

use crate::certs::issuer::{issue_leaf, CaSigner};
use crate::certs::{CertError, TlsMaterial};

/// Source of the TLS listener's certificate.
pub trait CertificateProvider: Send + Sync {
    /// Issue a leaf covering `hostnames`.
    fn issue(&self, hostnames: &[String]) -> Result<TlsMaterial, CertError>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Leaf certificate that is its own issuer.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelfSigned;

impl CertificateProvider for SelfSigned {
    fn issue(&self, hostnames: &[String]) -> Result<TlsMaterial, CertError> {
        issue_leaf(hostnames, None)
    }

    fn name(&self) -> &'static str {
        "self-signed"
    }
}

/// CA key and certificate in PEM files.
#[derive(Debug, Clone)]
pub struct ExternalCa {
    key_file: PathBuf,
    cert_file: PathBuf,
}

impl ExternalCa {
    pub fn new(key_file: impl Into<PathBuf>, cert_file: impl Into<PathBuf>) -> Self {
        Self {
            key_file: key_file.into(),
            cert_file: cert_file.into(),
        }
    }

    pub fn cert_file(&self) -> &Path {
        &self.cert_file
    }

    /// Read and parse both files.
    pub fn load(&self) -> Result<CaSigner, CertError> {
        let key_pem = read_file(&self.key_file)?;
        let cert_pem = read_file(&self.cert_file)?;

        let key = KeyPair::from_pem(&key_pem).map_err(|e| CertError::CaParse {
            path: self.key_file.clone(),
            reason: e.to_string(),
        })?;

        let cert_der = rustls_pemfile::certs(&mut cert_pem.as_bytes())
            .next()
            .transpose()
            .map_err(|e| CertError::CaParse {
                path: self.cert_file.clone(),
                reason: e.to_string(),
            })?
            .ok_or_else(|| CertError::CaParse {
                path: self.cert_file.clone(),
                reason: "no certificate found".to_string(),
            })?;

        // Re-signing the parsed params yields an issuer carrying the CA's
        // subject and key identifier, which is all signing needs.
        let params = CertificateParams::from_ca_cert_pem(&cert_pem).map_err(|e| CertError::CaParse {
            path: self.cert_file.clone(),
            reason: e.to_string(),
        })?;
        let issuer = params.self_signed(&key)?;

        Ok(CaSigner {
            issuer,
            key,
            cert_der,
        })
    }
}

impl CertificateProvider for ExternalCa {
    fn issue(&self, hostnames: &[String]) -> Result<TlsMaterial, CertError> {
        let signer = self.load()?;
        tracing::info!(
            key_file = %self.key_file.display(),
            cert_file = %self.cert_file.display(),
            "Signing leaf certificate with external CA"
        );
        issue_leaf(hostnames, Some(&signer))
    }

    fn name(&self) -> &'static str {
        "external CA"
    }
}

/// The local CA installed by `mkcert -install`.
#[derive(Debug, Clone)]
pub struct Mkcert {
    program: PathBuf,
}

impl Default for Mkcert {
    fn default() -> Self {
        Self {
            program: PathBuf::from("mkcert"),
        }
    }
}

impl Mkcert {
    /// Use a specific `mkcert` binary.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Ask mkcert where its CA lives and check both files are there.
    pub fn locate(&self) -> Result<ExternalCa, CertError> {
        let output = Command::new(&self.program)
            .arg("-CAROOT")
            .output()
            .map_err(|e| CertError::Mkcert(format!("failed to run {}: {e}", self.program.display())))?;

        if !output.status.success() {
            return Err(CertError::Mkcert(format!(
                "{} -CAROOT exited with {}",
                self.program.display(),
                output.status
            )));
        }

        let root = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if root.is_empty() {
            return Err(CertError::Mkcert("mkcert -CAROOT printed nothing".to_string()));
        }
        ca_in_root(Path::new(&root))
    }
}

impl CertificateProvider for Mkcert {
    fn issue(&self, hostnames: &[String]) -> Result<TlsMaterial, CertError> {
        let ca = self.locate()?;
        tracing::info!(ca = %ca.cert_file().display(), "Using mkcert CA");
        ca.issue(hostnames)
    }

    fn name(&self) -> &'static str {
        "mkcert"
    }
}

/// The CA files inside an mkcert CAROOT directory.
fn ca_in_root(root: &Path) -> Result<ExternalCa, CertError> {
    let key_file = root.join("rootCA-key.pem");
    let cert_file = root.join("rootCA.pem");

    if !key_file.exists() {
        return Err(CertError::Mkcert(format!(
            "CA key not found at {}; have you run mkcert -install?",
            key_file.display()
        )));
    }
    if !cert_file.exists() {
        return Err(CertError::Mkcert(format!(
            "CA certificate not found at {}; have you run mkcert -install?",
            cert_file.display()
        )));
    }
    Ok(ExternalCa::new(key_file, cert_file))
}

fn read_file(path: &Path) -> Result<String, CertError> {
    std::fs::read_to_string(path).map_err(|source| CertError::CaFile {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{BasicConstraints, IsCa, KeyUsagePurpose};
    use tempfile::TempDir;

    fn write_ca(dir: &Path, key_name: &str, cert_name: &str) {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
        let cert = params.self_signed(&key).unwrap();
        std::fs::write(dir.join(key_name), key.serialize_pem()).unwrap();
        std::fs::write(dir.join(cert_name), cert.pem()).unwrap();
    }

    #[test]
    fn external_ca_signs_leaf() {
        let dir = TempDir::new().unwrap();
        write_ca(dir.path(), "ca.key", "ca.crt");

        let ca = ExternalCa::new(dir.path().join("ca.key"), dir.path().join("ca.crt"));
        let material = ca.issue(&["app.wip".to_string()]).unwrap();
        assert!(material.root_cert.is_some());
        assert_ne!(material.root_cert.as_ref(), Some(&material.leaf_cert));
    }

    #[test]
    fn missing_ca_file_names_path() {
        let dir = TempDir::new().unwrap();
        let ca = ExternalCa::new(dir.path().join("nope.key"), dir.path().join("nope.crt"));
        let err = ca.issue(&["app.wip".to_string()]).unwrap_err();
        assert!(matches!(err, CertError::CaFile { .. }));
        assert!(err.to_string().contains("nope.key"));
    }

    #[test]
    fn garbage_ca_key_is_parse_error() {
        let dir = TempDir::new().unwrap();
        write_ca(dir.path(), "ca.key", "ca.crt");
        std::fs::write(dir.path().join("ca.key"), "not a key").unwrap();

        let ca = ExternalCa::new(dir.path().join("ca.key"), dir.path().join("ca.crt"));
        assert!(matches!(ca.load(), Err(CertError::CaParse { .. })));
    }

    #[test]
    fn mkcert_root_requires_both_files() {
        let dir = TempDir::new().unwrap();
        let err = ca_in_root(dir.path()).unwrap_err();
        assert!(err.to_string().contains("mkcert -install"));

        write_ca(dir.path(), "rootCA-key.pem", "rootCA.pem");
        let ca = ca_in_root(dir.path()).unwrap();
        assert_eq!(ca.cert_file(), dir.path().join("rootCA.pem"));
    }

    #[test]
    fn mkcert_missing_binary() {
        let mkcert = Mkcert::with_program("/nonexistent/mkcert-binary");
        assert!(matches!(mkcert.locate(), Err(CertError::Mkcert(_))));
    }
}
