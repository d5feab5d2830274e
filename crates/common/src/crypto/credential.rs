use rcgen::{
    CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair,
    KeyUsagePurpose, SerialNumber, PKCS_RSA_SHA256,
};
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::pkcs8::EncodePrivateKey;
use rsa::RsaPrivateKey;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs1KeyDer, PrivatePkcs8KeyDer};
use time::{Duration, OffsetDateTime};

use super::identity::{Identity, IdentityError};

/// PEM tag of the certificate block
pub const CERTIFICATE_PEM_TAG: &str = "CERTIFICATE";
/// PEM tag of the PKCS#1 private key block
pub const PRIVATE_KEY_PEM_TAG: &str = "RSA PRIVATE KEY";

/// Modulus size of generated keys
pub const RSA_KEY_BITS: usize = 2048;
/// How long a generated certificate stays valid
pub const VALIDITY_DAYS: i64 = 365;
/// Organization written into the certificate subject
pub const ORGANIZATION: &str = "ffsend";

// 20 octets is the RFC 5280 ceiling; the top bit is cleared to keep it positive
const SERIAL_NUMBER_SIZE: usize = 20;

/// Errors that can occur while generating or decoding a credential
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("failed to generate RSA key: {0}")]
    KeyGeneration(#[from] rsa::Error),
    #[error("failed to encode private key: {0}")]
    KeyEncoding(String),
    #[error("failed to build certificate: {0}")]
    Certificate(#[from] rcgen::Error),
    #[error("failed to read random bytes: {0}")]
    Random(#[from] getrandom::Error),
    #[error("failed to look up host name: {0}")]
    Hostname(#[from] std::io::Error),
    #[error("failed to parse PEM: {0}")]
    Pem(#[from] pem::PemError),
    #[error("invalid PEM tag, expected {expected}, got {found}")]
    UnexpectedPemTag {
        expected: &'static str,
        found: String,
    },
    #[error(transparent)]
    Identity(#[from] IdentityError),
}

/// This node's own certificate and private key.
///
/// The certificate is self-signed and kept as DER; the private key is an
/// RSA key in PKCS#1 DER form. A credential is generated once per
/// installation and reused for every connection after that.
///
/// # Examples
///
/// ```ignore
/// let credential = Credential::generate()?;
/// let (cert_pem, key_pem) = credential.to_pem();
/// let recovered = Credential::from_pem(&cert_pem, &key_pem)?;
/// assert_eq!(credential, recovered);
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    certificate: Vec<u8>,
    private_key: Vec<u8>,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("certificate", &format_args!("{} bytes", self.certificate.len()))
            .field("private_key", &"<redacted>")
            .finish()
    }
}

impl Credential {
    pub fn new(certificate: Vec<u8>, private_key: Vec<u8>) -> Self {
        Self {
            certificate,
            private_key,
        }
    }

    /// Generate a fresh self-signed credential named after the local host
    pub fn generate() -> Result<Self, CredentialError> {
        let host = hostname::get()?.to_string_lossy().into_owned();
        Self::generate_for(&host)
    }

    /// Generate a fresh self-signed credential with the given common name
    ///
    /// The certificate is valid from now for [`VALIDITY_DAYS`], may be used
    /// for signing and key encipherment, and for both the server and the
    /// client side of a TLS handshake.
    pub fn generate_for(common_name: &str) -> Result<Self, CredentialError> {
        let mut rng = rsa::rand_core::OsRng;
        let private_key = RsaPrivateKey::new(&mut rng, RSA_KEY_BITS)?;

        let pkcs1 = private_key
            .to_pkcs1_der()
            .map_err(|e| CredentialError::KeyEncoding(e.to_string()))?;
        let pkcs8 = private_key
            .to_pkcs8_der()
            .map_err(|e| CredentialError::KeyEncoding(e.to_string()))?;
        let key_pair = KeyPair::from_pkcs8_der_and_sign_algo(
            &PrivatePkcs8KeyDer::from(pkcs8.as_bytes()),
            &PKCS_RSA_SHA256,
        )?;

        let mut params = CertificateParams::default();
        let mut subject = DistinguishedName::new();
        subject.push(DnType::OrganizationName, ORGANIZATION);
        subject.push(DnType::CommonName, common_name);
        params.distinguished_name = subject;

        let now = OffsetDateTime::now_utc();
        params.not_before = now;
        params.not_after = now + Duration::days(VALIDITY_DAYS);
        params.serial_number = Some(random_serial_number()?);

        params.is_ca = IsCa::ExplicitNoCa;
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ServerAuth,
            ExtendedKeyUsagePurpose::ClientAuth,
        ];

        let certificate = params.self_signed(&key_pair)?;

        tracing::debug!(common_name, "generated self-signed credential");

        Ok(Self {
            certificate: certificate.der().to_vec(),
            private_key: pkcs1.as_bytes().to_vec(),
        })
    }

    /// DER bytes of the certificate
    pub fn certificate(&self) -> &[u8] {
        &self.certificate
    }

    /// PKCS#1 DER bytes of the private key
    pub fn private_key(&self) -> &[u8] {
        &self.private_key
    }

    /// The identity peers must pin to accept this node
    pub fn identity(&self) -> Result<Identity, CredentialError> {
        Ok(Identity::from_der(&self.certificate)?)
    }

    pub(crate) fn certificate_der(&self) -> CertificateDer<'static> {
        CertificateDer::from(self.certificate.clone())
    }

    pub(crate) fn private_key_der(&self) -> PrivateKeyDer<'static> {
        PrivateKeyDer::Pkcs1(PrivatePkcs1KeyDer::from(self.private_key.clone()))
    }

    /// Encode as a (certificate, private key) pair of PEM strings
    pub fn to_pem(&self) -> (String, String) {
        let certificate = pem::Pem::new(CERTIFICATE_PEM_TAG, self.certificate.clone());
        let private_key = pem::Pem::new(PRIVATE_KEY_PEM_TAG, self.private_key.clone());
        (pem::encode(&certificate), pem::encode(&private_key))
    }

    /// Decode from a (certificate, private key) pair of PEM strings
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Either PEM string is malformed
    /// - The certificate block is not tagged CERTIFICATE
    /// - The key block is not tagged RSA PRIVATE KEY
    /// - The certificate does not parse as X.509
    pub fn from_pem(certificate_pem: &str, private_key_pem: &str) -> Result<Self, CredentialError> {
        let certificate = decode_block(certificate_pem, CERTIFICATE_PEM_TAG)?;
        let private_key = decode_block(private_key_pem, PRIVATE_KEY_PEM_TAG)?;

        // the certificate must at least parse
        Identity::from_der(&certificate)?;

        Ok(Self {
            certificate,
            private_key,
        })
    }
}

fn decode_block(pem_str: &str, expected: &'static str) -> Result<Vec<u8>, CredentialError> {
    let block = pem::parse(pem_str)?;
    if block.tag() != expected {
        return Err(CredentialError::UnexpectedPemTag {
            expected,
            found: block.tag().to_string(),
        });
    }
    Ok(block.into_contents())
}

fn random_serial_number() -> Result<SerialNumber, CredentialError> {
    let mut bytes = [0u8; SERIAL_NUMBER_SIZE];
    getrandom::getrandom(&mut bytes)?;
    bytes[0] &= 0x7f;
    Ok(SerialNumber::from_slice(&bytes))
}
