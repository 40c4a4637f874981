//! Leaf certificate generation.

use rcgen::{
    Certificate, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa,
    KeyPair, KeyUsagePurpose, SerialNumber, PKCS_RSA_SHA256,
};
use rustls::pki_types::{CertificateDer, PrivatePkcs8KeyDer};

use crate::certs::{CertError, TlsMaterial};

/// Validity window of generated leaf certificates.
pub const LEAF_VALIDITY_DAYS: i64 = 30;

const ORGANIZATION: &str = "devproxy";
const COMMON_NAME: &str = "devproxy leaf";

/// Signing key and certificate of an external CA.
pub struct CaSigner {
    /// Issuer view of the CA, used for the issuer name and key identifier.
    pub issuer: Certificate,
    pub key: KeyPair,
    /// The CA certificate exactly as loaded from disk.
    pub cert_der: CertificateDer<'static>,
}

/// Generate an RSA leaf covering `hostnames`.
///
/// Self-signed when `signer` is `None`, otherwise issued by the CA.
pub fn issue_leaf(hostnames: &[String], signer: Option<&CaSigner>) -> Result<TlsMaterial, CertError> {
    if hostnames.is_empty() {
        return Err(CertError::NoHostnames);
    }

    let leaf_key = KeyPair::generate_for(&PKCS_RSA_SHA256)?;
    let params = leaf_params(hostnames)?;

    let leaf = match signer {
        None => params.self_signed(&leaf_key)?,
        Some(ca) => params.signed_by(&leaf_key, &ca.issuer, &ca.key)?,
    };

    tracing::debug!(
        hostnames = ?hostnames,
        signed_by_ca = signer.is_some(),
        "Issued leaf certificate"
    );

    Ok(TlsMaterial {
        leaf_cert: leaf.der().clone(),
        leaf_key: PrivatePkcs8KeyDer::from(leaf_key.serialize_der()),
        root_cert: signer.map(|ca| ca.cert_der.clone()),
    })
}

fn leaf_params(hostnames: &[String]) -> Result<CertificateParams, CertError> {
    let mut params = CertificateParams::new(hostnames.to_vec())?;

    let mut dn = DistinguishedName::new();
    dn.push(DnType::OrganizationName, ORGANIZATION);
    dn.push(DnType::CommonName, COMMON_NAME);
    params.distinguished_name = dn;

    let now = time::OffsetDateTime::now_utc();
    params.not_before = now;
    params.not_after = now + time::Duration::days(LEAF_VALIDITY_DAYS);
    params.serial_number = Some(random_serial());

    params.is_ca = IsCa::ExplicitNoCa;
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyEncipherment,
    ];
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];

    Ok(params)
}

/// 128 random bits, top bit cleared so the DER integer stays positive.
fn random_serial() -> SerialNumber {
    let mut bytes: [u8; 16] = rand::random();
    bytes[0] &= 0x7f;
    SerialNumber::from_slice(&bytes)
}
