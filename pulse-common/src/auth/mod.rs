pub mod ed25519;

use crate::error::Result;

/// Signing capability consumed by the consensus layer.
///
/// `verify_with_key` checks a signature produced by any node, given that
/// node's public key.
pub trait Authenticator: Send + Sync {
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>>;
    fn verify_with_key(&self, message: &[u8], signature: &[u8], public_key: &[u8]) -> Result<bool>;
    fn public_key(&self) -> Vec<u8>;
}
