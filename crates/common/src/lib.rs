/**
 * Cryptographic types and operations.
 *  - Self-signed credentials (certificate + RSA key)
 *  - Key-pinned identities and trust sets
 */
pub mod crypto;
/**
 * On-disk storage for this node's credential.
 *  Two PEM files under a per-user directory,
 *  replaced atomically.
 */
pub mod store;
/**
 * Mutually authenticated TLS over any byte stream.
 *  Certificate chains are not validated; instead the
 *  peer's identity must be pinned in a trust set.
 */
pub mod transport;
/**
 * Helper for reporting build version information.
 */
pub mod version;

pub mod prelude {
    pub use crate::crypto::{Credential, Identity, TrustSet};
    pub use crate::store::{CredentialStore, Generated};
    pub use crate::transport::{AuthenticatedConnection, HandshakeError, PinnedTls};
    pub use crate::version::build_info;
}
