//! Certificates for the TLS listener.
//!
//! # Data Flow
//! ```text
//! ProxyConfig (use_mkcert | ca_key_file | neither)
//!     → provider_for (pick a CertificateProvider)
//!     → provider.rs (load the CA, if any)
//!     → issuer.rs (generate one RSA leaf covering every entry host)
//!     → TlsMaterial::rustls_config (ALPN h2 + http/1.1)
//! ```
//!
//! # Design Decisions
//! - One leaf per run, generated in memory and never written to disk
//! - Every configured host pattern becomes a SAN; wildcards stay wildcards
//! - Only the leaf is presented; clients are expected to trust the CA

pub mod issuer;
pub mod provider;

use std::path::PathBuf;
use std::sync::Arc;

use axum_server::tls_rustls::RustlsConfig;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use thiserror::Error;

use crate::config::ProxyConfig;

pub use provider::{CertificateProvider, ExternalCa, Mkcert, SelfSigned};

/// ALPN protocols offered by the TLS listener, in preference order.
pub const ALPN_PROTOCOLS: [&[u8]; 2] = [b"h2", b"http/1.1"];

/// Errors producing TLS material. All of them abort startup.
#[derive(Debug, Error)]
pub enum CertError {
    #[error("no hostnames to issue a certificate for")]
    NoHostnames,

    #[error("certificate generation failed: {0}")]
    Generate(#[from] rcgen::Error),

    #[error("failed to read {path}: {source}")]
    CaFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {reason}")]
    CaParse { path: PathBuf, reason: String },

    #[error("mkcert: {0}")]
    Mkcert(String),

    #[error("invalid TLS configuration: {0}")]
    Tls(#[from] rustls::Error),
}

/// A generated leaf and its key, plus the CA it chains to (if any).
#[derive(Debug)]
pub struct TlsMaterial {
    pub leaf_cert: CertificateDer<'static>,
    pub leaf_key: PrivatePkcs8KeyDer<'static>,
    pub root_cert: Option<CertificateDer<'static>>,
}

impl TlsMaterial {
    /// Server configuration presenting the leaf.
    pub fn server_config(&self) -> Result<rustls::ServerConfig, CertError> {
        let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
        let mut config = rustls::ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .with_no_client_auth()
            .with_single_cert(
                vec![self.leaf_cert.clone()],
                PrivateKeyDer::Pkcs8(self.leaf_key.clone_key()),
            )?;
        config.alpn_protocols = ALPN_PROTOCOLS.iter().map(|p| p.to_vec()).collect();
        Ok(config)
    }

    /// Same as [`server_config`](Self::server_config), wrapped for `axum-server`.
    pub fn rustls_config(&self) -> Result<RustlsConfig, CertError> {
        Ok(RustlsConfig::from_config(Arc::new(self.server_config()?)))
    }
}

/// Pick the provider the configuration asks for.
///
/// `use_mkcert` wins over explicit CA files; with neither, the leaf is
/// self-signed.
pub fn provider_for(config: &ProxyConfig) -> Box<dyn CertificateProvider> {
    if config.use_mkcert {
        return Box::new(Mkcert::default());
    }
    let key_file = config.ca_key_file.as_deref().filter(|k| !k.is_empty());
    match (key_file, config.ca_cert_path()) {
        (Some(key), Some(cert)) => Box::new(ExternalCa::new(key, cert)),
        _ => Box::new(SelfSigned),
    }
}
