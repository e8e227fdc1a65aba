//! Persistence surface consumed by the store. Each callback receives
//! the identifying material and ciphertext of one crypted record and
//! must make it durable; a callback failure aborts the operation that
//! produced the record.
//!
//! Callbacks run while the store's locks are held, so a record is
//! durable before any lookup can observe it. The contract is that a
//! callback never re-enters the keystore.

use zvault_primitives::encoding::DecodeError;
use zvault_primitives::Hash256;
use zvault_shielded::{
    DiversifierPath, SaplingExtendedFullViewingKey, SaplingIncomingViewingKey,
    SaplingPaymentAddress, SproutPaymentAddress, SAPLING_EXTENDED_KEY_SIZE, SPROUT_SPENDING_KEY_SIZE,
};
use zvault_storage::{Column, KeyValueStore};

use crate::keys::TransparentPubKey;
use crate::store::CryptoKeyStore;
use crate::KeyStoreError;

const SCHEMA_VERSION_KEY: &[u8] = b"schema_version";
const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendError {
    message: String,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for BackendError {}

pub trait KeystoreBackend: Send + Sync {
    fn persist_crypted_hd_seed(
        &self,
        fingerprint: &Hash256,
        ciphertext: &[u8],
    ) -> Result<(), BackendError>;

    fn persist_crypted_key(
        &self,
        pubkey: &TransparentPubKey,
        ciphertext: &[u8],
    ) -> Result<(), BackendError>;

    fn persist_crypted_sprout_key(
        &self,
        address: &SproutPaymentAddress,
        receiving_key: &[u8; 32],
        ciphertext: &[u8],
    ) -> Result<(), BackendError>;

    fn persist_crypted_sapling_key(
        &self,
        extfvk: &SaplingExtendedFullViewingKey,
        ciphertext: &[u8],
    ) -> Result<(), BackendError>;

    fn persist_crypted_sapling_extfvk(
        &self,
        extfvk: &SaplingExtendedFullViewingKey,
        ciphertext: &[u8],
    ) -> Result<(), BackendError>;

    fn persist_crypted_sapling_address(
        &self,
        ivk: &SaplingIncomingViewingKey,
        address: &SaplingPaymentAddress,
        ciphertext: &[u8],
    ) -> Result<(), BackendError>;

    fn persist_crypted_sapling_diversified_address(
        &self,
        ivk: &SaplingIncomingViewingKey,
        address: &SaplingPaymentAddress,
        path: &DiversifierPath,
        ciphertext: &[u8],
    ) -> Result<(), BackendError>;

    /// Fired after every successful lock and unlock, outside the
    /// store's locks.
    fn notify_status_changed(&self, _locked: bool) {}
}

/// Backend that persists nothing. For stores whose durability is
/// handled elsewhere, and for tests.
#[derive(Default)]
pub struct NullBackend;

impl KeystoreBackend for NullBackend {
    fn persist_crypted_hd_seed(&self, _: &Hash256, _: &[u8]) -> Result<(), BackendError> {
        Ok(())
    }

    fn persist_crypted_key(&self, _: &TransparentPubKey, _: &[u8]) -> Result<(), BackendError> {
        Ok(())
    }

    fn persist_crypted_sprout_key(
        &self,
        _: &SproutPaymentAddress,
        _: &[u8; 32],
        _: &[u8],
    ) -> Result<(), BackendError> {
        Ok(())
    }

    fn persist_crypted_sapling_key(
        &self,
        _: &SaplingExtendedFullViewingKey,
        _: &[u8],
    ) -> Result<(), BackendError> {
        Ok(())
    }

    fn persist_crypted_sapling_extfvk(
        &self,
        _: &SaplingExtendedFullViewingKey,
        _: &[u8],
    ) -> Result<(), BackendError> {
        Ok(())
    }

    fn persist_crypted_sapling_address(
        &self,
        _: &SaplingIncomingViewingKey,
        _: &SaplingPaymentAddress,
        _: &[u8],
    ) -> Result<(), BackendError> {
        Ok(())
    }

    fn persist_crypted_sapling_diversified_address(
        &self,
        _: &SaplingIncomingViewingKey,
        _: &SaplingPaymentAddress,
        _: &DiversifierPath,
        _: &[u8],
    ) -> Result<(), BackendError> {
        Ok(())
    }
}

/// Outcome of one replay pass. Records whose load path needs the
/// master key are deferred while the store is locked; run `replay`
/// again after unlocking to pick them up.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub loaded: usize,
    pub deferred: usize,
}

/// Backend writing each crypted record class into its own column of
/// a `KeyValueStore`.
pub struct DbBackend<S: KeyValueStore> {
    db: S,
}

impl<S: KeyValueStore> DbBackend<S> {
    pub fn new(db: S) -> Result<Self, BackendError> {
        let backend = Self { db };
        backend.check_schema()?;
        Ok(backend)
    }

    pub fn db(&self) -> &S {
        &self.db
    }

    fn check_schema(&self) -> Result<(), BackendError> {
        match self
            .db
            .get(Column::Meta, SCHEMA_VERSION_KEY)
            .map_err(|err| BackendError::new(err.to_string()))?
        {
            Some(raw) => {
                let stored: [u8; 4] = raw
                    .as_slice()
                    .try_into()
                    .map_err(|_| BackendError::new("malformed wallet schema version"))?;
                if u32::from_le_bytes(stored) != SCHEMA_VERSION {
                    return Err(BackendError::new("unsupported wallet schema version"));
                }
                Ok(())
            }
            None => self
                .db
                .put(
                    Column::Meta,
                    SCHEMA_VERSION_KEY,
                    &SCHEMA_VERSION.to_le_bytes(),
                )
                .map_err(|err| BackendError::new(err.to_string())),
        }
    }

    fn put(&self, column: Column, key: &[u8], value: &[u8]) -> Result<(), BackendError> {
        self.db
            .put(column, key, value)
            .map_err(|err| BackendError::new(err.to_string()))
    }

    /// Re-installs every persisted record into `store`. Loads that
    /// require decryption (watch-only viewing keys and the address
    /// directory) are deferred while the store is locked; everything
    /// else loads without the master key.
    pub fn replay<B: KeystoreBackend>(
        &self,
        store: &CryptoKeyStore<B>,
    ) -> Result<ReplaySummary, KeyStoreError> {
        let mut summary = ReplaySummary::default();

        for (key, value) in self.scan(Column::CryptedHdSeed)? {
            let fingerprint: Hash256 = key
                .as_slice()
                .try_into()
                .map_err(|_| KeyStoreError::Decode(DecodeError::InvalidData("malformed seed record")))?;
            match store.load_crypted_hd_seed(fingerprint, value) {
                Ok(()) | Err(KeyStoreError::Duplicate) => summary.loaded += 1,
                Err(err) => return Err(err),
            }
        }

        for (key, value) in self.scan(Column::CryptedKey)? {
            let pubkey = TransparentPubKey::from_bytes(key)?;
            store.load_crypted_key(pubkey, value)?;
            summary.loaded += 1;
        }

        for (key, value) in self.scan(Column::CryptedSproutKey)? {
            let address_bytes: [u8; 64] = key
                .as_slice()
                .try_into()
                .map_err(|_| KeyStoreError::Decode(DecodeError::InvalidData("malformed sprout record")))?;
            if value.len() < SPROUT_SPENDING_KEY_SIZE {
                return Err(KeyStoreError::Decode(DecodeError::InvalidData(
                    "malformed sprout record",
                )));
            }
            let (receiving_key, ciphertext) = value.split_at(SPROUT_SPENDING_KEY_SIZE);
            let mut rk = [0u8; 32];
            rk.copy_from_slice(receiving_key);
            store.load_crypted_sprout_spending_key(
                SproutPaymentAddress::from_bytes(&address_bytes),
                rk,
                ciphertext.to_vec(),
            )?;
            summary.loaded += 1;
        }

        for (key, value) in self.scan(Column::CryptedSaplingKey)? {
            let extfvk_bytes: [u8; SAPLING_EXTENDED_KEY_SIZE] =
                key.as_slice().try_into().map_err(|_| {
                    KeyStoreError::Decode(DecodeError::InvalidData("malformed sapling key record"))
                })?;
            let extfvk = SaplingExtendedFullViewingKey::from_bytes(&extfvk_bytes)?;
            store.load_crypted_sapling_spending_key(extfvk, value)?;
            summary.loaded += 1;
        }

        let locked = store.is_locked();
        for (key, value) in self.scan(Column::CryptedSaplingExtfvk)? {
            if locked {
                summary.deferred += 1;
                continue;
            }
            let fingerprint: Hash256 = key.as_slice().try_into().map_err(|_| {
                KeyStoreError::Decode(DecodeError::InvalidData("malformed viewing key record"))
            })?;
            store.load_crypted_sapling_extfvk(&fingerprint, &value)?;
            summary.loaded += 1;
        }

        for (key, value) in self.scan(Column::CryptedSaplingAddress)? {
            if locked {
                summary.deferred += 1;
                continue;
            }
            let identifier: Hash256 = key.as_slice().try_into().map_err(|_| {
                KeyStoreError::Decode(DecodeError::InvalidData("malformed sapling address record"))
            })?;
            store.load_crypted_sapling_payment_address(&identifier, &value)?;
            summary.loaded += 1;
        }

        for (key, value) in self.scan(Column::CryptedSaplingDiversifiedAddress)? {
            if locked {
                summary.deferred += 1;
                continue;
            }
            let identifier: Hash256 = key.as_slice().try_into().map_err(|_| {
                KeyStoreError::Decode(DecodeError::InvalidData(
                    "malformed diversified address record",
                ))
            })?;
            store.load_crypted_sapling_diversified_address(&identifier, &value)?;
            summary.loaded += 1;
        }

        Ok(summary)
    }

    fn scan(&self, column: Column) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KeyStoreError> {
        self.db
            .scan_prefix(column, b"")
            .map_err(|err| KeyStoreError::PersistFailure(err.to_string()))
    }
}

impl<S: KeyValueStore> KeystoreBackend for DbBackend<S> {
    fn persist_crypted_hd_seed(
        &self,
        fingerprint: &Hash256,
        ciphertext: &[u8],
    ) -> Result<(), BackendError> {
        self.put(Column::CryptedHdSeed, fingerprint, ciphertext)
    }

    fn persist_crypted_key(
        &self,
        pubkey: &TransparentPubKey,
        ciphertext: &[u8],
    ) -> Result<(), BackendError> {
        self.put(Column::CryptedKey, pubkey.as_bytes(), ciphertext)
    }

    fn persist_crypted_sprout_key(
        &self,
        address: &SproutPaymentAddress,
        receiving_key: &[u8; 32],
        ciphertext: &[u8],
    ) -> Result<(), BackendError> {
        let mut value = Vec::with_capacity(receiving_key.len() + ciphertext.len());
        value.extend_from_slice(receiving_key);
        value.extend_from_slice(ciphertext);
        self.put(Column::CryptedSproutKey, &address.to_bytes(), &value)
    }

    fn persist_crypted_sapling_key(
        &self,
        extfvk: &SaplingExtendedFullViewingKey,
        ciphertext: &[u8],
    ) -> Result<(), BackendError> {
        self.put(Column::CryptedSaplingKey, &extfvk.to_bytes(), ciphertext)
    }

    fn persist_crypted_sapling_extfvk(
        &self,
        extfvk: &SaplingExtendedFullViewingKey,
        ciphertext: &[u8],
    ) -> Result<(), BackendError> {
        self.put(
            Column::CryptedSaplingExtfvk,
            &extfvk.fingerprint(),
            ciphertext,
        )
    }

    fn persist_crypted_sapling_address(
        &self,
        _ivk: &SaplingIncomingViewingKey,
        address: &SaplingPaymentAddress,
        ciphertext: &[u8],
    ) -> Result<(), BackendError> {
        self.put(Column::CryptedSaplingAddress, &address.hash(), ciphertext)
    }

    fn persist_crypted_sapling_diversified_address(
        &self,
        _ivk: &SaplingIncomingViewingKey,
        address: &SaplingPaymentAddress,
        _path: &DiversifierPath,
        ciphertext: &[u8],
    ) -> Result<(), BackendError> {
        self.put(
            Column::CryptedSaplingDiversifiedAddress,
            &address.hash(),
            ciphertext,
        )
    }
}
