use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use x509_parser::certificate::X509Certificate;

/// Size of an identity in bytes (SHA-256 output)
pub const IDENTITY_SIZE: usize = 32;

/// Errors that can occur when producing an identity from raw input
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("malformed certificate: {0}")]
    MalformedCertificate(String),
    #[error("identity hex decode error: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("invalid identity size, expected {IDENTITY_SIZE}, got {0}")]
    InvalidSize(usize),
}

/// Canonical identity of a peer, pinned in place of a CA chain.
///
/// An identity is the SHA-256 digest of the DER-encoded SubjectPublicKeyInfo
/// of a certificate. It ignores subject names, serial numbers and validity
/// windows, so a certificate regenerated around the same key keeps its
/// identity, and a new key always produces a new one.
///
/// # Examples
///
/// ```ignore
/// let credential = store.load()?;
/// let identity = credential.identity()?;
///
/// // Share the hex form out of band with the remote peer
/// println!("{}", identity);
/// let recovered: Identity = identity.to_hex().parse()?;
/// assert_eq!(identity, recovered);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity([u8; IDENTITY_SIZE]);

impl Identity {
    /// Derive the identity of an already-parsed certificate
    pub fn from_certificate(certificate: &X509Certificate<'_>) -> Self {
        Self::from_public_key_info(certificate.public_key().raw)
    }

    /// Parse a DER certificate and derive its identity
    pub fn from_der(der: &[u8]) -> Result<Self, IdentityError> {
        let (_, certificate) = x509_parser::parse_x509_certificate(der)
            .map_err(|e| IdentityError::MalformedCertificate(e.to_string()))?;
        Ok(Self::from_certificate(&certificate))
    }

    fn from_public_key_info(spki_der: &[u8]) -> Self {
        let digest = Sha256::digest(spki_der);
        let mut bytes = [0u8; IDENTITY_SIZE];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    /// Parse an identity from a hexadecimal string
    ///
    /// Accepts both plain hex and "0x"-prefixed hex strings.
    pub fn from_hex(hex: &str) -> Result<Self, IdentityError> {
        let hex = hex.trim();
        let hex = hex.strip_prefix("0x").unwrap_or(hex);
        let decoded = hex::decode(hex)?;
        Self::try_from(decoded.as_slice())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; IDENTITY_SIZE] {
        &self.0
    }
}

impl From<[u8; IDENTITY_SIZE]> for Identity {
    fn from(bytes: [u8; IDENTITY_SIZE]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for Identity {
    type Error = IdentityError;
    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; IDENTITY_SIZE] = bytes
            .try_into()
            .map_err(|_| IdentityError::InvalidSize(bytes.len()))?;
        Ok(Self(bytes))
    }
}

impl FromStr for Identity {
    type Err = IdentityError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", self.to_hex())
    }
}

impl Serialize for Identity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Identity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
