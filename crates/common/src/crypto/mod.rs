//! Cryptographic primitives for ffsend
//!
//! This module provides the identity model that replaces a certificate
//! authority:
//!
//! - **Credential**: a self-signed X.509 certificate and its RSA private key,
//!   generated once per node and presented on every connection
//! - **Identity**: SHA-256 of the certificate's SubjectPublicKeyInfo, the
//!   value a peer pins to recognize this node
//! - **Trust Set**: the identities an endpoint accepts as its remote peer
//!
//! # Security Model
//!
//! Certificates are never checked against a CA chain, and subject names are
//! never trusted. A peer is accepted if, and only if, it proves possession of
//! the private key behind a certificate whose identity is in the trust set.
//! Identities travel out of band, as hex strings.

mod credential;
mod identity;
mod trust;

pub use credential::{
    Credential, CredentialError, CERTIFICATE_PEM_TAG, PRIVATE_KEY_PEM_TAG, RSA_KEY_BITS,
    VALIDITY_DAYS,
};
pub use identity::{Identity, IdentityError, IDENTITY_SIZE};
pub use trust::TrustSet;
