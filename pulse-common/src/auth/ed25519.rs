use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::{CryptoRng, RngCore};

use super::Authenticator;
use crate::error::{CommonError, Result};

pub struct Ed25519Authenticator {
    keypair: SigningKey,
}

impl Ed25519Authenticator {
    pub fn new(keypair: SigningKey) -> Self {
        Self { keypair }
    }

    /// Generates a fresh key from the given randomness source.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self::new(SigningKey::generate(rng))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let seed: &[u8; 32] = bytes
            .try_into()
            .map_err(|_| CommonError::InvalidKey("Invalid key length".to_string()))?;
        Ok(Self::new(SigningKey::from_bytes(seed)))
    }

    pub fn from_hex(seed: &str) -> Result<Self> {
        let bytes = hex::decode(seed).map_err(|e| CommonError::InvalidKey(e.to_string()))?;
        Self::from_bytes(&bytes)
    }
}

impl Authenticator for Ed25519Authenticator {
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        let signature = self
            .keypair
            .try_sign(message)
            .map_err(|e| CommonError::Signing(e.to_string()))?;
        Ok(signature.to_bytes().to_vec())
    }

    fn verify_with_key(&self, message: &[u8], signature: &[u8], public_key: &[u8]) -> Result<bool> {
        let key_bytes: &[u8; 32] = public_key
            .try_into()
            .map_err(|_| CommonError::InvalidKey("Invalid public key length".to_string()))?;
        let verifying_key =
            VerifyingKey::from_bytes(key_bytes).map_err(|e| CommonError::InvalidKey(e.to_string()))?;
        let signature = match Signature::from_slice(signature) {
            Ok(sig) => sig,
            Err(_) => return Ok(false),
        };

        Ok(verifying_key.verify(message, &signature).is_ok())
    }

    fn public_key(&self) -> Vec<u8> {
        self.keypair.verifying_key().to_bytes().to_vec()
    }
}
