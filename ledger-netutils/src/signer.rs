//! Signing credentials attached to external messages.

use ring::signature::{Ed25519KeyPair, KeyPair};

/// Length of an ed25519 signature.
pub const SIGNATURE_LEN: usize = 64;

#[allow(missing_docs)] // error types document themselves
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SigningError {
    #[error("key is not valid hex: {0}")]
    Hex(String),
    #[error("key rejected: {0}")]
    KeyRejected(String),
}

/// Produces signatures over encoded payloads.
pub trait Signer: Send + Sync {
    /// The public half of the key, raw bytes.
    fn public_key(&self) -> Vec<u8>;

    /// Signs `data`.
    fn sign(&self, data: &[u8]) -> Result<[u8; SIGNATURE_LEN], SigningError>;
}

/// An ed25519 key pair held in memory.
pub struct KeyPairSigner {
    key_pair: Ed25519KeyPair,
}

impl KeyPairSigner {
    /// Builds the key pair from a hex encoded 32 byte secret seed.
    pub fn from_hex_secret(secret: &str) -> Result<Self, SigningError> {
        let seed = hex::decode(secret.trim()).map_err(|e| SigningError::Hex(e.to_string()))?;
        let key_pair = Ed25519KeyPair::from_seed_unchecked(&seed)
            .map_err(|e| SigningError::KeyRejected(e.to_string()))?;
        Ok(KeyPairSigner { key_pair })
    }

    /// Builds the key pair from hex encoded secret and public halves, checking that they match.
    pub fn from_hex_keys(public: &str, secret: &str) -> Result<Self, SigningError> {
        let seed = hex::decode(secret.trim()).map_err(|e| SigningError::Hex(e.to_string()))?;
        let public = hex::decode(public.trim()).map_err(|e| SigningError::Hex(e.to_string()))?;
        let key_pair = Ed25519KeyPair::from_seed_and_public_key(&seed, &public)
            .map_err(|e| SigningError::KeyRejected(e.to_string()))?;
        Ok(KeyPairSigner { key_pair })
    }
}

impl Signer for KeyPairSigner {
    fn public_key(&self) -> Vec<u8> {
        self.key_pair.public_key().as_ref().to_vec()
    }

    fn sign(&self, data: &[u8]) -> Result<[u8; SIGNATURE_LEN], SigningError> {
        let signature = self.key_pair.sign(data);
        let mut bytes = [0u8; SIGNATURE_LEN];
        bytes.copy_from_slice(signature.as_ref());
        Ok(bytes)
    }
}

impl std::fmt::Debug for KeyPairSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPairSigner")
            .field("public_key", &hex::encode(self.public_key()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ring::signature::{UnparsedPublicKey, ED25519};

    const SECRET: &str = "9617dc9b97d03d81cbfb84cde7c399f1059b94a06cd0d530e8e31a0dd9d87df1";

    #[test]
    fn signature_verifies_with_public_key() {
        let signer = KeyPairSigner::from_hex_secret(SECRET).unwrap();
        let signature = signer.sign(b"payload").unwrap();
        let public_key = signer.public_key();
        UnparsedPublicKey::new(&ED25519, &public_key)
            .verify(b"payload", &signature)
            .unwrap();
    }

    #[test]
    fn mismatched_public_key_is_rejected() {
        let other = "00".repeat(32);
        assert!(matches!(
            KeyPairSigner::from_hex_keys(&other, SECRET),
            Err(SigningError::KeyRejected(_))
        ));
    }

    #[test]
    fn bad_hex_is_rejected() {
        assert!(matches!(
            KeyPairSigner::from_hex_secret("not hex"),
            Err(SigningError::Hex(_))
        ));
    }
}
