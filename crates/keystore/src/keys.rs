//! Transparent (ECDSA) key material and the hierarchical seed.

use std::sync::OnceLock;

use secp256k1::{PublicKey, Secp256k1, SecretKey};
use zeroize::Zeroize;

use zvault_primitives::hash::{hash160, sha256d};
use zvault_primitives::Hash256;
use zvault_shielded::hd_seed_fingerprint;

use crate::{KeyStoreError, SecureBytes};

/// Short transparent key identifier (hash160 of the serialized
/// public key).
pub type KeyId = [u8; 20];

pub const TRANSPARENT_SECRET_SIZE: usize = 32;

fn secp() -> &'static Secp256k1<secp256k1::All> {
    static SECP: OnceLock<Secp256k1<secp256k1::All>> = OnceLock::new();
    SECP.get_or_init(Secp256k1::new)
}

/// Root seed of the hierarchical wallet. Write-once in encrypted
/// stores.
#[derive(Clone, PartialEq, Eq)]
pub struct HdSeed {
    bytes: SecureBytes,
}

impl HdSeed {
    pub fn new(bytes: SecureBytes) -> Result<Self, KeyStoreError> {
        if bytes.is_empty() {
            return Err(KeyStoreError::BadParameter("seed must not be empty"));
        }
        Ok(Self { bytes })
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, KeyStoreError> {
        Self::new(SecureBytes::from_slice(bytes))
    }

    pub fn as_slice(&self) -> &[u8] {
        self.bytes.as_slice()
    }

    pub fn fingerprint(&self) -> Hash256 {
        hd_seed_fingerprint(self.bytes.as_slice())
    }
}

impl std::fmt::Debug for HdSeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HdSeed({} bytes)", self.bytes.len())
    }
}

/// Serialized secp256k1 public key, 33 bytes compressed or 65
/// uncompressed. Rides next to the ciphertext in encrypted stores so
/// lookups work while locked.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct TransparentPubKey {
    bytes: Vec<u8>,
}

impl TransparentPubKey {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, KeyStoreError> {
        if bytes.len() != 33 && bytes.len() != 65 {
            return Err(KeyStoreError::InvalidKey("invalid public key length"));
        }
        PublicKey::from_slice(&bytes)
            .map_err(|_| KeyStoreError::InvalidKey("invalid public key encoding"))?;
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn is_compressed(&self) -> bool {
        self.bytes.len() == 33
    }

    pub fn key_id(&self) -> KeyId {
        hash160(&self.bytes)
    }

    /// Serialize-hash of the public key, the identifier (and IV
    /// source) for the encrypted private key record.
    pub fn hash(&self) -> Hash256 {
        sha256d(&self.bytes)
    }
}

/// A transparent private key plus its derived public key.
#[derive(Clone)]
pub struct TransparentKey {
    secret: [u8; TRANSPARENT_SECRET_SIZE],
    compressed: bool,
    pubkey: TransparentPubKey,
}

impl TransparentKey {
    pub fn from_secret(
        secret: [u8; TRANSPARENT_SECRET_SIZE],
        compressed: bool,
    ) -> Result<Self, KeyStoreError> {
        let secret_key = SecretKey::from_slice(&secret)
            .map_err(|_| KeyStoreError::InvalidKey("invalid secret key scalar"))?;
        let pubkey = PublicKey::from_secret_key(secp(), &secret_key);
        let bytes = if compressed {
            pubkey.serialize().to_vec()
        } else {
            pubkey.serialize_uncompressed().to_vec()
        };
        Ok(Self {
            secret,
            compressed,
            pubkey: TransparentPubKey { bytes },
        })
    }

    pub fn secret_bytes(&self) -> &[u8; TRANSPARENT_SECRET_SIZE] {
        &self.secret
    }

    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    pub fn pubkey(&self) -> &TransparentPubKey {
        &self.pubkey
    }

    pub fn key_id(&self) -> KeyId {
        self.pubkey.key_id()
    }
}

impl PartialEq for TransparentKey {
    fn eq(&self, other: &Self) -> bool {
        self.secret == other.secret && self.compressed == other.compressed
    }
}

impl Eq for TransparentKey {}

impl Drop for TransparentKey {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}

impl std::fmt::Debug for TransparentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "TransparentKey(compressed: {}, key_id: ",
            self.compressed
        )?;
        for byte in &self.key_id()[..4] {
            write!(f, "{byte:02x}")?;
        }
        write!(f, "..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_scalar() {
        assert!(TransparentKey::from_secret([0u8; 32], true).is_err());
        assert!(TransparentKey::from_secret([0xFF; 32], true).is_err());
        assert!(TransparentKey::from_secret([1u8; 32], true).is_ok());
    }

    #[test]
    fn compressed_flag_changes_pubkey_encoding() {
        let compressed = TransparentKey::from_secret([1u8; 32], true).unwrap();
        let uncompressed = TransparentKey::from_secret([1u8; 32], false).unwrap();
        assert_eq!(compressed.pubkey().as_bytes().len(), 33);
        assert_eq!(uncompressed.pubkey().as_bytes().len(), 65);
        assert!(compressed.pubkey().is_compressed());
        assert_ne!(compressed.key_id(), uncompressed.key_id());
    }

    #[test]
    fn pubkey_roundtrips_through_bytes() {
        let key = TransparentKey::from_secret([7u8; 32], true).unwrap();
        let restored =
            TransparentPubKey::from_bytes(key.pubkey().as_bytes().to_vec()).unwrap();
        assert_eq!(&restored, key.pubkey());
        assert_eq!(restored.hash(), key.pubkey().hash());
    }

    #[test]
    fn pubkey_rejects_garbage() {
        assert!(TransparentPubKey::from_bytes(vec![0u8; 33]).is_err());
        assert!(TransparentPubKey::from_bytes(vec![2u8; 10]).is_err());
    }

    #[test]
    fn seed_fingerprint_is_stable() {
        let seed = HdSeed::from_slice(&[0u8; 32]).unwrap();
        assert_eq!(seed.fingerprint(), seed.clone().fingerprint());
        assert!(HdSeed::from_slice(&[]).is_err());
    }
}
