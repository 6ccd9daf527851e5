//! Signing identity — optional ed25519 key for the publisher
//!
//! When present the key doubles as the node's peer identity and signs every
//! envelope before it is pushed. Without one the node runs with a fresh
//! ephemeral peer identity and messages go out unsigned.

use libp2p::identity::{Keypair, PublicKey};
use libp2p::PeerId;

/// Errors loading or using a signing key
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("private key is not valid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("private key must be 32 bytes, got {0}")]
    InvalidLength(usize),

    #[error("private key rejected: {0}")]
    InvalidKey(String),

    #[error("signing failed: {0}")]
    Signing(String),
}

/// An ed25519 keypair used to sign outgoing envelopes
#[derive(Clone)]
pub struct SigningIdentity {
    keypair: Keypair,
}

impl SigningIdentity {
    /// Generate a fresh random identity
    pub fn generate() -> Self {
        Self {
            keypair: Keypair::generate_ed25519(),
        }
    }

    /// Load an identity from a hex-encoded 32-byte ed25519 secret
    pub fn from_secret_hex(secret: &str) -> Result<Self, IdentityError> {
        let trimmed = secret.trim();
        let trimmed = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let mut bytes = hex::decode(trimmed)?;
        if bytes.len() != 32 {
            return Err(IdentityError::InvalidLength(bytes.len()));
        }
        let keypair = Keypair::ed25519_from_bytes(&mut bytes)
            .map_err(|e| IdentityError::InvalidKey(e.to_string()))?;
        Ok(Self { keypair })
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }

    pub fn public_key(&self) -> PublicKey {
        self.keypair.public()
    }

    pub fn peer_id(&self) -> PeerId {
        self.keypair.public().to_peer_id()
    }

    /// Sign arbitrary bytes
    pub fn sign(&self, data: &[u8]) -> Result<Vec<u8>, IdentityError> {
        self.keypair
            .sign(data)
            .map_err(|e| IdentityError::Signing(e.to_string()))
    }
}

impl std::fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningIdentity")
            .field("peer_id", &self.peer_id())
            .finish()
    }
}

/// Check a signature produced by [`SigningIdentity::sign`]
pub fn verify(public_key: &[u8], data: &[u8], signature: &[u8]) -> bool {
    match PublicKey::try_decode_protobuf(public_key) {
        Ok(key) => key.verify(data, signature),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60";

    #[test]
    fn test_load_from_hex() {
        let a = SigningIdentity::from_secret_hex(SECRET).unwrap();
        let b = SigningIdentity::from_secret_hex(&format!("0x{}", SECRET)).unwrap();
        assert_eq!(a.peer_id(), b.peer_id());
    }

    #[test]
    fn test_reject_bad_keys() {
        assert!(matches!(
            SigningIdentity::from_secret_hex("zz"),
            Err(IdentityError::InvalidHex(_))
        ));
        assert!(matches!(
            SigningIdentity::from_secret_hex("abcd"),
            Err(IdentityError::InvalidLength(2))
        ));
    }

    #[test]
    fn test_sign_and_verify() {
        let identity = SigningIdentity::generate();
        let sig = identity.sign(b"hello").unwrap();
        let public = identity.public_key().encode_protobuf();
        assert!(verify(&public, b"hello", &sig));
        assert!(!verify(&public, b"hellp", &sig));
        assert!(!verify(b"not a key", b"hello", &sig));
    }
}
