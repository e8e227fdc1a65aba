//! Encrypted hierarchical key store.
//!
//! Secrets are held either in plaintext typed maps (before wallet
//! encryption is enabled) or as AES-256-CBC ciphertexts under a
//! user-supplied master key, with a locked/unlocked lifecycle and a
//! persistence callback surface toward the wallet database.

use zvault_primitives::encoding::DecodeError;
use zvault_shielded::ShieldedError;

pub mod backend;
pub mod basic;
pub mod crypter;
pub mod keys;
pub mod records;
pub mod secure;
pub mod store;

pub use backend::{BackendError, DbBackend, KeystoreBackend, NullBackend, ReplaySummary};
pub use basic::{ShieldedKeyStore, TransparentKeyStore};
pub use crypter::{
    Crypter, KDF_METHOD_SHA512, WALLET_CRYPTO_IV_SIZE, WALLET_CRYPTO_KEY_SIZE,
    WALLET_CRYPTO_SALT_SIZE,
};
pub use keys::{HdSeed, KeyId, TransparentKey, TransparentPubKey};
pub use records::{
    KeyMetadata, RedeemScript, SaplingAddressRecord, SaplingDiversifiedAddress,
    SaplingLastDiversifier, StringPair, WalletTxBlob,
};
pub use secure::SecureBytes;
pub use store::CryptoKeyStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyStoreError {
    /// Malformed caller input: wrong salt length, zero rounds,
    /// unknown KDF method, wrong key or seed size.
    BadParameter(&'static str),
    /// Cipher used before key material was loaded.
    NotKeyed,
    /// The AES primitive rejected the input. Deliberately carries no
    /// further detail.
    CipherFailure,
    /// A ciphertext decrypted but the recomputed fingerprint did not
    /// match its identifier, or the plaintext did not parse. Also the
    /// wrong-password outcome of `unlock`.
    DecryptMismatch,
    /// Operation is invalid for the store's current mode.
    WrongMode,
    /// Attempt to overwrite the write-once HD seed.
    Duplicate,
    /// A persistence callback failed; the enclosing operation was
    /// aborted.
    PersistFailure(String),
    /// Key material failed domain validation.
    InvalidKey(&'static str),
    /// A record failed to deserialize outside a decrypt path.
    Decode(DecodeError),
}

impl std::fmt::Display for KeyStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyStoreError::BadParameter(msg) => write!(f, "bad parameter: {msg}"),
            KeyStoreError::NotKeyed => write!(f, "cipher key material not set"),
            KeyStoreError::CipherFailure => write!(f, "cipher operation failed"),
            KeyStoreError::DecryptMismatch => write!(f, "decrypted record failed validation"),
            KeyStoreError::WrongMode => write!(f, "operation invalid in current keystore mode"),
            KeyStoreError::Duplicate => write!(f, "record already exists"),
            KeyStoreError::PersistFailure(msg) => write!(f, "persistence callback failed: {msg}"),
            KeyStoreError::InvalidKey(msg) => write!(f, "{msg}"),
            KeyStoreError::Decode(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for KeyStoreError {}

impl From<DecodeError> for KeyStoreError {
    fn from(err: DecodeError) -> Self {
        KeyStoreError::Decode(err)
    }
}

impl From<ShieldedError> for KeyStoreError {
    fn from(err: ShieldedError) -> Self {
        match err {
            ShieldedError::InvalidData(msg) => KeyStoreError::InvalidKey(msg),
        }
    }
}

impl From<BackendError> for KeyStoreError {
    fn from(err: BackendError) -> Self {
        KeyStoreError::PersistFailure(err.to_string())
    }
}
