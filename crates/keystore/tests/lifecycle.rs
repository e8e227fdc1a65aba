//! End-to-end lifecycle of the crypto key store: plaintext use,
//! one-shot encryption, lock/unlock, and the corruption halt.

use std::sync::atomic::{AtomicUsize, Ordering};

use zvault_keystore::records::{encrypt_record, encrypt_transparent_key};
use zvault_keystore::{
    BackendError, CryptoKeyStore, HdSeed, KeyStoreError, KeystoreBackend, NullBackend,
    SecureBytes, StringPair, TransparentKey, TransparentPubKey,
};
use zvault_primitives::Hash256;
use zvault_shielded::{
    DiversifierPath, SaplingExtendedFullViewingKey, SaplingExtendedSpendingKey,
    SaplingIncomingViewingKey, SaplingPaymentAddress, SproutPaymentAddress, SproutSpendingKey,
};

fn master_aa() -> SecureBytes {
    SecureBytes::from_slice(&[0xAA; 32])
}

fn master_bb() -> SecureBytes {
    SecureBytes::from_slice(&[0xBB; 32])
}

#[derive(Default)]
struct CountingBackend {
    persisted: AtomicUsize,
    lock_events: AtomicUsize,
    unlock_events: AtomicUsize,
}

impl CountingBackend {
    fn persisted(&self) -> usize {
        self.persisted.load(Ordering::SeqCst)
    }

    fn count(&self) -> Result<(), BackendError> {
        self.persisted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl KeystoreBackend for CountingBackend {
    fn persist_crypted_hd_seed(&self, _: &Hash256, _: &[u8]) -> Result<(), BackendError> {
        self.count()
    }

    fn persist_crypted_key(&self, _: &TransparentPubKey, _: &[u8]) -> Result<(), BackendError> {
        self.count()
    }

    fn persist_crypted_sprout_key(
        &self,
        _: &SproutPaymentAddress,
        _: &[u8; 32],
        _: &[u8],
    ) -> Result<(), BackendError> {
        self.count()
    }

    fn persist_crypted_sapling_key(
        &self,
        _: &SaplingExtendedFullViewingKey,
        _: &[u8],
    ) -> Result<(), BackendError> {
        self.count()
    }

    fn persist_crypted_sapling_extfvk(
        &self,
        _: &SaplingExtendedFullViewingKey,
        _: &[u8],
    ) -> Result<(), BackendError> {
        self.count()
    }

    fn persist_crypted_sapling_address(
        &self,
        _: &SaplingIncomingViewingKey,
        _: &SaplingPaymentAddress,
        _: &[u8],
    ) -> Result<(), BackendError> {
        self.count()
    }

    fn persist_crypted_sapling_diversified_address(
        &self,
        _: &SaplingIncomingViewingKey,
        _: &SaplingPaymentAddress,
        _: &DiversifierPath,
        _: &[u8],
    ) -> Result<(), BackendError> {
        self.count()
    }

    fn notify_status_changed(&self, locked: bool) {
        if locked {
            self.lock_events.fetch_add(1, Ordering::SeqCst);
        } else {
            self.unlock_events.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Fails every transparent-key persist; everything else succeeds.
#[derive(Default)]
struct FailingKeyBackend;

impl KeystoreBackend for FailingKeyBackend {
    fn persist_crypted_hd_seed(&self, _: &Hash256, _: &[u8]) -> Result<(), BackendError> {
        Ok(())
    }

    fn persist_crypted_key(&self, _: &TransparentPubKey, _: &[u8]) -> Result<(), BackendError> {
        Err(BackendError::new("disk full"))
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

#[test]
fn plaintext_add_get_transparent_key() {
    let store = CryptoKeyStore::new(NullBackend);
    let key = TransparentKey::from_secret([0x01; 32], true).unwrap();
    let key_id = key.key_id();
    store.add_key(key).unwrap();

    assert!(!store.is_crypted());
    assert!(store.have_key(&key_id));
    let restored = store.get_key(&key_id).unwrap().unwrap();
    assert_eq!(restored.secret_bytes(), &[0x01; 32]);
    assert!(restored.is_compressed());
}

#[test]
fn encrypt_keys_drains_plaintext_and_stays_readable() {
    let store = CryptoKeyStore::new(NullBackend);
    let key = TransparentKey::from_secret([0x01; 32], true).unwrap();
    let key_id = key.key_id();
    store.add_key(key).unwrap();

    store.encrypt_keys(master_aa()).unwrap();
    assert!(store.is_crypted());
    assert!(!store.is_locked());
    assert_eq!(store.plaintext_key_count(), 0);
    assert_eq!(store.crypted_key_count(), 1);

    let restored = store.get_key(&key_id).unwrap().unwrap();
    assert_eq!(restored.secret_bytes(), &[0x01; 32]);
}

#[test]
fn encrypt_keys_twice_is_refused() {
    let store = CryptoKeyStore::new(NullBackend);
    store
        .add_key(TransparentKey::from_secret([0x01; 32], true).unwrap())
        .unwrap();
    store.encrypt_keys(master_aa()).unwrap();
    assert_eq!(
        store.encrypt_keys(master_aa()),
        Err(KeyStoreError::WrongMode)
    );
}

#[test]
fn lock_hides_secrets_and_unlock_restores_them() {
    let store = CryptoKeyStore::new(NullBackend);
    let key = TransparentKey::from_secret([0x01; 32], true).unwrap();
    let key_id = key.key_id();
    let pubkey = key.pubkey().clone();
    store.add_key(key).unwrap();
    store.encrypt_keys(master_aa()).unwrap();

    store.lock().unwrap();
    assert!(store.is_locked());
    assert_eq!(store.get_key(&key_id), Err(KeyStoreError::WrongMode));
    // Non-secret lookups keep working while locked.
    assert_eq!(store.get_pubkey(&key_id), Some(pubkey));
    assert!(store.have_key(&key_id));
    assert_eq!(
        store.add_key(TransparentKey::from_secret([0x02; 32], true).unwrap()),
        Err(KeyStoreError::WrongMode)
    );

    store.unlock(master_aa()).unwrap();
    assert!(!store.is_locked());
    let restored = store.get_key(&key_id).unwrap().unwrap();
    assert_eq!(restored.secret_bytes(), &[0x01; 32]);
}

#[test]
fn wrong_master_is_rejected_and_store_stays_locked() {
    let store = CryptoKeyStore::new(NullBackend);
    let key = TransparentKey::from_secret([0x01; 32], true).unwrap();
    let key_id = key.key_id();
    store.add_key(key).unwrap();
    store.encrypt_keys(master_aa()).unwrap();
    store.lock().unwrap();

    assert_eq!(
        store.unlock(master_bb()),
        Err(KeyStoreError::DecryptMismatch)
    );
    assert!(store.is_locked());
    assert_eq!(store.get_key(&key_id), Err(KeyStoreError::WrongMode));
}

#[test]
fn unlock_of_empty_encrypted_store_fails() {
    let store = CryptoKeyStore::new(NullBackend);
    store.set_crypted().unwrap();
    assert_eq!(
        store.unlock(master_aa()),
        Err(KeyStoreError::DecryptMismatch)
    );
}

#[test]
fn hd_seed_is_write_once_after_encryption() {
    let store = CryptoKeyStore::new(NullBackend);
    let seed = HdSeed::from_slice(&[0x00; 32]).unwrap();
    let fingerprint = seed.fingerprint();
    store.set_hd_seed(seed.clone()).unwrap();
    assert!(store.have_hd_seed());

    store.encrypt_keys(master_aa()).unwrap();
    assert!(store.have_hd_seed());
    assert_eq!(store.get_hd_seed().unwrap().unwrap(), seed);

    // A second crypted seed is refused, whatever its contents.
    let stray = encrypt_record(&master_aa(), &fingerprint, &seed).unwrap();
    assert_eq!(
        store.set_crypted_hd_seed(fingerprint, stray),
        Err(KeyStoreError::Duplicate)
    );

    // Setting a replacement seed through the high-level path is also
    // refused once encrypted.
    let other = HdSeed::from_slice(&[0x11; 32]).unwrap();
    assert_eq!(store.set_hd_seed(other), Err(KeyStoreError::Duplicate));
}

#[test]
fn shielded_keys_survive_the_full_lifecycle() {
    let store = CryptoKeyStore::new(NullBackend);

    let sprout = SproutSpendingKey::random();
    let sprout_addr = sprout.address();
    store.add_sprout_spending_key(sprout.clone()).unwrap();

    let sapling = SaplingExtendedSpendingKey::master(&[0x55; 32]);
    let extfvk = sapling.to_extfvk().unwrap();
    store.add_sapling_spending_key(sapling.clone()).unwrap();

    let (path, address) = extfvk.default_address().unwrap();
    store
        .add_sapling_incoming_viewing_key(extfvk.ivk(), address)
        .unwrap();
    store
        .add_sapling_diversified_address(address, extfvk.ivk(), path)
        .unwrap();

    store.encrypt_keys(master_aa()).unwrap();
    assert_eq!(
        store.get_sprout_spending_key(&sprout_addr).unwrap().unwrap(),
        sprout
    );
    assert_eq!(
        store.get_sapling_spending_key(&extfvk).unwrap().unwrap(),
        sapling
    );

    store.lock().unwrap();
    assert_eq!(
        store.get_sprout_spending_key(&sprout_addr),
        Err(KeyStoreError::WrongMode)
    );
    assert_eq!(
        store.get_sapling_spending_key(&extfvk),
        Err(KeyStoreError::WrongMode)
    );
    // Viewing-side material stays reachable while locked.
    assert!(store.get_sprout_note_decryptor(&sprout_addr).is_some());
    assert_eq!(store.get_sapling_ivk_for_address(&address), Some(extfvk.ivk()));
    assert_eq!(
        store.get_sapling_diversified_address(&address),
        Some((extfvk.ivk(), path))
    );
    assert_eq!(store.get_sapling_extfvk_for_ivk(&extfvk.ivk()), Some(extfvk.clone()));
    // Address inserts produce a persisted ciphertext, so they are
    // refused while the master key is absent.
    assert_eq!(
        store.add_sapling_incoming_viewing_key(extfvk.ivk(), address),
        Err(KeyStoreError::WrongMode)
    );
    assert_eq!(
        store.add_sapling_diversified_address(address, extfvk.ivk(), path),
        Err(KeyStoreError::WrongMode)
    );

    store.unlock(master_aa()).unwrap();
    store
        .add_sapling_incoming_viewing_key(extfvk.ivk(), address)
        .unwrap();
    store
        .add_sapling_diversified_address(address, extfvk.ivk(), path)
        .unwrap();
    assert_eq!(
        store.get_sprout_spending_key(&sprout_addr).unwrap().unwrap(),
        sprout
    );
    assert_eq!(
        store.get_sapling_spending_key(&extfvk).unwrap().unwrap(),
        sapling
    );
}

#[test]
fn status_notifications_fire_on_lock_and_unlock() {
    let store = CryptoKeyStore::new(CountingBackend::default());
    store
        .add_key(TransparentKey::from_secret([0x01; 32], true).unwrap())
        .unwrap();
    store.encrypt_keys(master_aa()).unwrap();

    store.lock().unwrap();
    store.unlock(master_aa()).unwrap();
    store.lock().unwrap();

    assert_eq!(store.backend().lock_events.load(Ordering::SeqCst), 2);
    assert_eq!(store.backend().unlock_events.load(Ordering::SeqCst), 1);
    // Seed-less store with one key: exactly one persisted record.
    assert_eq!(store.backend().persisted(), 1);
}

#[test]
fn failed_persistence_aborts_encryption() {
    let store = CryptoKeyStore::new(FailingKeyBackend);
    store
        .add_key(TransparentKey::from_secret([0x01; 32], true).unwrap())
        .unwrap();
    assert!(matches!(
        store.encrypt_keys(master_aa()),
        Err(KeyStoreError::PersistFailure(_))
    ));
}

#[test]
fn aux_transforms_require_unlocked_store() {
    let store = CryptoKeyStore::new(NullBackend);
    store
        .add_key(TransparentKey::from_secret([0x01; 32], true).unwrap())
        .unwrap();

    let handle = [0x42; 32];
    let pair = StringPair {
        first: "receiving".to_string(),
        second: "cold storage".to_string(),
    };

    // Plaintext mode has no master key to encrypt under.
    assert_eq!(
        store.encrypt_string_pair(&handle, &pair),
        Err(KeyStoreError::WrongMode)
    );

    store.encrypt_keys(master_aa()).unwrap();
    let ciphertext = store.encrypt_string_pair(&handle, &pair).unwrap();
    assert_eq!(store.decrypt_string_pair(&handle, &ciphertext).unwrap(), pair);

    store.lock().unwrap();
    assert_eq!(
        store.decrypt_string_pair(&handle, &ciphertext),
        Err(KeyStoreError::WrongMode)
    );

    store.unlock(master_aa()).unwrap();
    assert_eq!(store.decrypt_string_pair(&handle, &ciphertext).unwrap(), pair);
}

#[test]
#[should_panic(expected = "keystore corrupted")]
fn partial_decryption_is_fatal() {
    let store = CryptoKeyStore::new(NullBackend);

    // One record encrypted under the real master, one under an
    // imposter: unlocking with the real master sees both a pass and a
    // fail, which is the unrecoverable state.
    let good = TransparentKey::from_secret([0x01; 32], true).unwrap();
    let good_ct = encrypt_transparent_key(&master_aa(), &good).unwrap();
    let bad = TransparentKey::from_secret([0x02; 32], true).unwrap();
    let bad_ct = encrypt_transparent_key(&master_bb(), &bad).unwrap();

    store
        .load_crypted_key(good.pubkey().clone(), good_ct)
        .unwrap();
    store.load_crypted_key(bad.pubkey().clone(), bad_ct).unwrap();

    let _ = store.unlock(master_aa());
}

#[test]
fn tampered_ciphertext_fails_unlock_cleanly_when_alone() {
    let store = CryptoKeyStore::new(NullBackend);
    let key = TransparentKey::from_secret([0x01; 32], true).unwrap();
    let mut ciphertext = encrypt_transparent_key(&master_aa(), &key).unwrap();
    ciphertext[0] ^= 0xFF;
    store
        .load_crypted_key(key.pubkey().clone(), ciphertext)
        .unwrap();

    // Every record fails: wrong password and corruption are
    // indistinguishable, and the store simply stays locked.
    assert_eq!(
        store.unlock(master_aa()),
        Err(KeyStoreError::DecryptMismatch)
    );
    assert!(store.is_locked());
}
