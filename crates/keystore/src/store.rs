//! The encrypted-mode repository layered over the plaintext maps.
//!
//! A store starts in plaintext mode, migrates once to encrypted mode
//! via `encrypt_keys`, and thereafter toggles between locked and
//! unlocked. While locked only ciphertexts and viewing-side indexes
//! are resident; the master key exists exactly while unlocked.
//!
//! Two mutexes partition the state: the key mutex guards the
//! transparent side together with the mode and master key, the
//! spending mutex guards the shielded side. Operations touching both
//! acquire the key mutex first, always.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use zvault_primitives::Hash256;
use zvault_shielded::{
    DiversifierPath, SaplingExtendedFullViewingKey, SaplingExtendedSpendingKey,
    SaplingIncomingViewingKey, SaplingPaymentAddress, SproutNoteDecryptor, SproutPaymentAddress,
    SproutSpendingKey,
};

use crate::backend::KeystoreBackend;
use crate::basic::{ShieldedKeyStore, TransparentKeyStore};
use crate::keys::{HdSeed, KeyId, TransparentKey, TransparentPubKey};
use crate::records::{
    decrypt_record, decrypt_transparent_key, encrypt_record, encrypt_transparent_key,
    KeyMetadata, RedeemScript, SaplingAddressRecord, SaplingDiversifiedAddress,
    SaplingLastDiversifier, StringPair, WalletTxBlob,
};
use crate::{KeyStoreError, SecureBytes, WALLET_CRYPTO_KEY_SIZE};

enum Mode {
    Plaintext,
    Locked,
    Unlocked(SecureBytes),
}

impl Mode {
    fn is_crypted(&self) -> bool {
        !matches!(self, Mode::Plaintext)
    }

    fn is_locked(&self) -> bool {
        matches!(self, Mode::Locked)
    }

    fn master(&self) -> Option<&SecureBytes> {
        match self {
            Mode::Unlocked(master) => Some(master),
            _ => None,
        }
    }
}

struct KeySide {
    mode: Mode,
    decryption_thoroughly_checked: bool,
    basic: TransparentKeyStore,
    crypted_keys: BTreeMap<KeyId, (TransparentPubKey, Vec<u8>)>,
}

struct SpendSide {
    basic: ShieldedKeyStore,
    crypted_hd_seed: Option<(Hash256, Vec<u8>)>,
    crypted_sprout_keys: BTreeMap<SproutPaymentAddress, Vec<u8>>,
    crypted_sapling_keys: BTreeMap<SaplingExtendedFullViewingKey, Vec<u8>>,
}

pub struct CryptoKeyStore<B: KeystoreBackend> {
    keys: Mutex<KeySide>,
    spend: Mutex<SpendSide>,
    backend: B,
}

impl<B: KeystoreBackend> CryptoKeyStore<B> {
    pub fn new(backend: B) -> Self {
        Self {
            keys: Mutex::new(KeySide {
                mode: Mode::Plaintext,
                decryption_thoroughly_checked: false,
                basic: TransparentKeyStore::new(),
                crypted_keys: BTreeMap::new(),
            }),
            spend: Mutex::new(SpendSide {
                basic: ShieldedKeyStore::new(),
                crypted_hd_seed: None,
                crypted_sprout_keys: BTreeMap::new(),
                crypted_sapling_keys: BTreeMap::new(),
            }),
            backend,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn lock_keys(&self) -> MutexGuard<'_, KeySide> {
        self.keys.lock().expect("keystore key lock")
    }

    fn lock_spend(&self) -> MutexGuard<'_, SpendSide> {
        self.spend.lock().expect("keystore spend lock")
    }

    // ---- mode queries ------------------------------------------------

    pub fn is_crypted(&self) -> bool {
        self.lock_keys().mode.is_crypted()
    }

    pub fn is_locked(&self) -> bool {
        self.lock_keys().mode.is_locked()
    }

    pub fn plaintext_key_count(&self) -> usize {
        self.lock_keys().basic.key_count()
    }

    pub fn crypted_key_count(&self) -> usize {
        self.lock_keys().crypted_keys.len()
    }

    // ---- lifecycle ---------------------------------------------------

    /// Advances a plaintext store to encrypted-locked, but only while
    /// every plaintext secret map is empty. Populated stores must go
    /// through `encrypt_keys`, which drains those maps. Idempotent on
    /// stores that are already encrypted.
    pub fn set_crypted(&self) -> Result<(), KeyStoreError> {
        let mut keys = self.lock_keys();
        let spend = self.lock_spend();
        ensure_crypted(&mut keys, &spend)
    }

    /// Zeroizes and drops the master key. The store must already be
    /// (or become) encrypted.
    pub fn lock(&self) -> Result<(), KeyStoreError> {
        {
            let mut keys = self.lock_keys();
            let spend = self.lock_spend();
            ensure_crypted(&mut keys, &spend)?;
            keys.mode = Mode::Locked;
        }
        self.backend.notify_status_changed(true);
        Ok(())
    }

    /// Validates the candidate master key against every stored
    /// ciphertext. All records must decrypt and fingerprint-verify;
    /// a store where some records pass and some fail under the same
    /// candidate is corrupted beyond repair and aborts the process.
    pub fn unlock(&self, candidate: SecureBytes) -> Result<(), KeyStoreError> {
        if candidate.len() != WALLET_CRYPTO_KEY_SIZE {
            return Err(KeyStoreError::BadParameter("master key must be 32 bytes"));
        }
        {
            let mut keys = self.lock_keys();
            let spend = self.lock_spend();
            ensure_crypted(&mut keys, &spend)?;

            let thorough = keys.decryption_thoroughly_checked;
            let mut key_pass = false;
            let mut key_fail = false;

            if let Some((fingerprint, ciphertext)) = &spend.crypted_hd_seed {
                match decrypt_record::<HdSeed>(&candidate, fingerprint, ciphertext) {
                    Ok(_) => key_pass = true,
                    Err(_) => key_fail = true,
                }
            }
            for (pubkey, ciphertext) in keys.crypted_keys.values() {
                match decrypt_transparent_key(&candidate, pubkey, ciphertext) {
                    Ok(_) => {
                        key_pass = true;
                        if thorough {
                            break;
                        }
                    }
                    Err(_) => {
                        key_fail = true;
                        break;
                    }
                }
            }
            for (address, ciphertext) in spend.crypted_sprout_keys.iter() {
                match decrypt_record::<SproutSpendingKey>(&candidate, &address.hash(), ciphertext)
                {
                    Ok(_) => {
                        key_pass = true;
                        if thorough {
                            break;
                        }
                    }
                    Err(_) => {
                        key_fail = true;
                        break;
                    }
                }
            }
            for (extfvk, ciphertext) in spend.crypted_sapling_keys.iter() {
                match decrypt_record::<SaplingExtendedSpendingKey>(
                    &candidate,
                    &extfvk.fingerprint(),
                    ciphertext,
                ) {
                    Ok(_) => {
                        key_pass = true;
                        if thorough {
                            break;
                        }
                    }
                    Err(_) => {
                        key_fail = true;
                        break;
                    }
                }
            }

            if key_pass && key_fail {
                zvault_log::log_error!(
                    "keystore is corrupted: some records decrypt with this master key but not all"
                );
                panic!("keystore corrupted: partial decryption under one master key");
            }
            if key_fail || !key_pass {
                zvault_log::log_debug!("unlock rejected: master key failed validation");
                return Err(KeyStoreError::DecryptMismatch);
            }

            keys.mode = Mode::Unlocked(candidate);
            keys.decryption_thoroughly_checked = true;
        }
        self.backend.notify_status_changed(false);
        Ok(())
    }

    /// One-shot plaintext-to-encrypted migration. On success every
    /// plaintext secret map is drained and the store is unlocked under
    /// `master`. A failure mid-way (cipher or persistence) aborts the
    /// operation and may leave the store partially encrypted; callers
    /// treat that wallet as unusable until restored from backup.
    pub fn encrypt_keys(&self, master: SecureBytes) -> Result<(), KeyStoreError> {
        if master.len() != WALLET_CRYPTO_KEY_SIZE {
            return Err(KeyStoreError::BadParameter("master key must be 32 bytes"));
        }
        let mut keys = self.lock_keys();
        let mut spend = self.lock_spend();
        if keys.mode.is_crypted()
            || !keys.crypted_keys.is_empty()
            || spend.crypted_hd_seed.is_some()
            || !spend.crypted_sprout_keys.is_empty()
            || !spend.crypted_sapling_keys.is_empty()
        {
            return Err(KeyStoreError::WrongMode);
        }

        let working = master.clone();
        keys.mode = Mode::Unlocked(master);

        if let Some(seed) = spend.basic.hd_seed().cloned() {
            let fingerprint = seed.fingerprint();
            let ciphertext = encrypt_record(&working, &fingerprint, &seed)?;
            self.backend
                .persist_crypted_hd_seed(&fingerprint, &ciphertext)?;
            spend.crypted_hd_seed = Some((fingerprint, ciphertext));
            spend.basic.clear_hd_seed();
        }

        let transparent: Vec<(KeyId, TransparentKey)> = keys
            .basic
            .keys()
            .map(|(key_id, key)| (*key_id, key.clone()))
            .collect();
        for (key_id, key) in transparent {
            let ciphertext = encrypt_transparent_key(&working, &key)?;
            self.backend
                .persist_crypted_key(key.pubkey(), &ciphertext)?;
            keys.crypted_keys
                .insert(key_id, (key.pubkey().clone(), ciphertext));
        }
        keys.basic.clear_keys();

        let sprout: Vec<(SproutPaymentAddress, SproutSpendingKey)> = spend
            .basic
            .sprout_keys()
            .map(|(address, key)| (*address, key.clone()))
            .collect();
        for (address, key) in sprout {
            let ciphertext = encrypt_record(&working, &address.hash(), &key)?;
            self.backend.persist_crypted_sprout_key(
                &address,
                &key.receiving_key(),
                &ciphertext,
            )?;
            spend.crypted_sprout_keys.insert(address, ciphertext);
            spend.basic.add_note_decryptor(address, key.receiving_key());
        }
        spend.basic.clear_sprout_keys();

        let sapling: Vec<(SaplingExtendedFullViewingKey, SaplingExtendedSpendingKey)> = spend
            .basic
            .sapling_keys()
            .map(|(extfvk, key)| (extfvk.clone(), key.clone()))
            .collect();
        for (extfvk, key) in sapling {
            let ciphertext = encrypt_record(&working, &extfvk.fingerprint(), &key)?;
            self.backend
                .persist_crypted_sapling_key(&extfvk, &ciphertext)?;
            spend.basic.add_sapling_fvk(extfvk.clone());
            spend.crypted_sapling_keys.insert(extfvk, ciphertext);
        }
        spend.basic.clear_sapling_keys();

        // Viewing keys without a resident spending key are encrypted
        // as their own records.
        let watch_fvks: Vec<SaplingExtendedFullViewingKey> = spend
            .basic
            .sapling_fvks()
            .filter(|(_, extfvk)| !spend.crypted_sapling_keys.contains_key(extfvk))
            .map(|(_, extfvk)| extfvk.clone())
            .collect();
        for extfvk in watch_fvks {
            let ciphertext = encrypt_record(&working, &extfvk.fingerprint(), &extfvk)?;
            self.backend
                .persist_crypted_sapling_extfvk(&extfvk, &ciphertext)?;
        }

        let addresses: Vec<(SaplingPaymentAddress, SaplingIncomingViewingKey)> = spend
            .basic
            .sapling_ivks()
            .map(|(address, ivk)| (*address, *ivk))
            .collect();
        for (address, ivk) in addresses {
            let record = SaplingAddressRecord { ivk, address };
            let ciphertext = encrypt_record(&working, &address.hash(), &record)?;
            self.backend
                .persist_crypted_sapling_address(&ivk, &address, &ciphertext)?;
        }

        let diversified: Vec<(
            SaplingPaymentAddress,
            SaplingIncomingViewingKey,
            DiversifierPath,
        )> = spend
            .basic
            .sapling_diversified()
            .map(|(address, (ivk, path))| (*address, *ivk, *path))
            .collect();
        for (address, ivk, path) in diversified {
            let record = SaplingDiversifiedAddress { address, ivk, path };
            let ciphertext = encrypt_record(&working, &address.hash(), &record)?;
            self.backend.persist_crypted_sapling_diversified_address(
                &ivk,
                &address,
                &path,
                &ciphertext,
            )?;
        }

        keys.decryption_thoroughly_checked = true;
        zvault_log::log_info!(
            "keystore encrypted: {} transparent, {} sprout, {} sapling records",
            keys.crypted_keys.len(),
            spend.crypted_sprout_keys.len(),
            spend.crypted_sapling_keys.len(),
        );
        Ok(())
    }

    fn with_master<R>(
        &self,
        f: impl FnOnce(&SecureBytes) -> Result<R, KeyStoreError>,
    ) -> Result<R, KeyStoreError> {
        let keys = self.lock_keys();
        match keys.mode.master() {
            Some(master) => f(master),
            None => Err(KeyStoreError::WrongMode),
        }
    }

    // ---- transparent keys --------------------------------------------

    pub fn add_key(&self, key: TransparentKey) -> Result<(), KeyStoreError> {
        let mut keys = self.lock_keys();
        let keys = &mut *keys;
        match &keys.mode {
            Mode::Plaintext => {
                keys.basic.add_key(key);
                Ok(())
            }
            Mode::Locked => Err(KeyStoreError::WrongMode),
            Mode::Unlocked(master) => {
                let ciphertext = encrypt_transparent_key(master, &key)?;
                self.backend.persist_crypted_key(key.pubkey(), &ciphertext)?;
                let pubkey = key.pubkey().clone();
                keys.crypted_keys
                    .insert(key.key_id(), (pubkey, ciphertext));
                Ok(())
            }
        }
    }

    /// Installs a pre-encrypted transparent key and persists it.
    pub fn add_crypted_key(
        &self,
        pubkey: TransparentPubKey,
        ciphertext: Vec<u8>,
    ) -> Result<(), KeyStoreError> {
        self.insert_crypted_key(pubkey, ciphertext, true)
    }

    /// Replay path for records already persisted: installs without
    /// re-invoking the persistence callback.
    pub fn load_crypted_key(
        &self,
        pubkey: TransparentPubKey,
        ciphertext: Vec<u8>,
    ) -> Result<(), KeyStoreError> {
        self.insert_crypted_key(pubkey, ciphertext, false)
    }

    fn insert_crypted_key(
        &self,
        pubkey: TransparentPubKey,
        ciphertext: Vec<u8>,
        persist: bool,
    ) -> Result<(), KeyStoreError> {
        let mut keys = self.lock_keys();
        let spend = self.lock_spend();
        ensure_crypted(&mut keys, &spend)?;
        if persist {
            self.backend.persist_crypted_key(&pubkey, &ciphertext)?;
        }
        keys.crypted_keys
            .insert(pubkey.key_id(), (pubkey, ciphertext));
        Ok(())
    }

    pub fn have_key(&self, key_id: &KeyId) -> bool {
        let keys = self.lock_keys();
        if keys.mode.is_crypted() {
            keys.crypted_keys.contains_key(key_id)
        } else {
            keys.basic.have_key(key_id)
        }
    }

    pub fn get_key(&self, key_id: &KeyId) -> Result<Option<TransparentKey>, KeyStoreError> {
        let keys = self.lock_keys();
        match &keys.mode {
            Mode::Plaintext => Ok(keys.basic.get_key(key_id).cloned()),
            Mode::Locked => match keys.crypted_keys.get(key_id) {
                Some(_) => Err(KeyStoreError::WrongMode),
                None => Ok(None),
            },
            Mode::Unlocked(master) => match keys.crypted_keys.get(key_id) {
                Some((pubkey, ciphertext)) => {
                    Ok(Some(decrypt_transparent_key(master, pubkey, ciphertext)?))
                }
                None => Ok(None),
            },
        }
    }

    /// Public keys stay readable while locked: in encrypted mode the
    /// serialized pubkey rides next to the ciphertext.
    pub fn get_pubkey(&self, key_id: &KeyId) -> Option<TransparentPubKey> {
        let keys = self.lock_keys();
        if keys.mode.is_crypted() {
            keys.crypted_keys
                .get(key_id)
                .map(|(pubkey, _)| pubkey.clone())
        } else {
            keys.basic.get_pubkey(key_id).cloned()
        }
    }

    // ---- redeem scripts (non-secret index) ---------------------------

    pub fn add_redeem_script(&self, script: RedeemScript) -> [u8; 20] {
        self.lock_keys().basic.add_script(script)
    }

    pub fn get_redeem_script(&self, script_id: &[u8; 20]) -> Option<RedeemScript> {
        self.lock_keys().basic.get_script(script_id).cloned()
    }

    pub fn have_redeem_script(&self, script_id: &[u8; 20]) -> bool {
        self.lock_keys().basic.have_script(script_id)
    }

    // ---- hd seed -----------------------------------------------------

    pub fn set_hd_seed(&self, seed: HdSeed) -> Result<(), KeyStoreError> {
        let keys = self.lock_keys();
        let mut spend = self.lock_spend();
        match &keys.mode {
            Mode::Plaintext => {
                spend.basic.set_hd_seed(seed);
                Ok(())
            }
            Mode::Locked => Err(KeyStoreError::WrongMode),
            Mode::Unlocked(master) => {
                if spend.crypted_hd_seed.is_some() {
                    return Err(KeyStoreError::Duplicate);
                }
                let fingerprint = seed.fingerprint();
                let ciphertext = encrypt_record(master, &fingerprint, &seed)?;
                self.backend
                    .persist_crypted_hd_seed(&fingerprint, &ciphertext)?;
                spend.crypted_hd_seed = Some((fingerprint, ciphertext));
                Ok(())
            }
        }
    }

    /// Installs an already-encrypted seed and persists it. The seed
    /// record is write-once: a second call fails and leaves the
    /// stored ciphertext unchanged.
    pub fn set_crypted_hd_seed(
        &self,
        fingerprint: Hash256,
        ciphertext: Vec<u8>,
    ) -> Result<(), KeyStoreError> {
        self.insert_crypted_hd_seed(fingerprint, ciphertext, true)
    }

    pub fn load_crypted_hd_seed(
        &self,
        fingerprint: Hash256,
        ciphertext: Vec<u8>,
    ) -> Result<(), KeyStoreError> {
        self.insert_crypted_hd_seed(fingerprint, ciphertext, false)
    }

    fn insert_crypted_hd_seed(
        &self,
        fingerprint: Hash256,
        ciphertext: Vec<u8>,
        persist: bool,
    ) -> Result<(), KeyStoreError> {
        let mut keys = self.lock_keys();
        let mut spend = self.lock_spend();
        ensure_crypted(&mut keys, &spend)?;
        if spend.crypted_hd_seed.is_some() {
            return Err(KeyStoreError::Duplicate);
        }
        if persist {
            self.backend
                .persist_crypted_hd_seed(&fingerprint, &ciphertext)?;
        }
        spend.crypted_hd_seed = Some((fingerprint, ciphertext));
        Ok(())
    }

    pub fn have_hd_seed(&self) -> bool {
        let keys = self.lock_keys();
        let spend = self.lock_spend();
        if keys.mode.is_crypted() {
            spend.crypted_hd_seed.is_some()
        } else {
            spend.basic.hd_seed().is_some()
        }
    }

    pub fn get_hd_seed(&self) -> Result<Option<HdSeed>, KeyStoreError> {
        let keys = self.lock_keys();
        let spend = self.lock_spend();
        match &keys.mode {
            Mode::Plaintext => Ok(spend.basic.hd_seed().cloned()),
            Mode::Locked => match spend.crypted_hd_seed {
                Some(_) => Err(KeyStoreError::WrongMode),
                None => Ok(None),
            },
            Mode::Unlocked(master) => match &spend.crypted_hd_seed {
                Some((fingerprint, ciphertext)) => {
                    Ok(Some(decrypt_record(master, fingerprint, ciphertext)?))
                }
                None => Ok(None),
            },
        }
    }

    // ---- sprout spending keys ----------------------------------------

    pub fn add_sprout_spending_key(&self, key: SproutSpendingKey) -> Result<(), KeyStoreError> {
        let keys = self.lock_keys();
        let mut spend = self.lock_spend();
        match &keys.mode {
            Mode::Plaintext => {
                spend.basic.add_sprout_key(key);
                Ok(())
            }
            Mode::Locked => Err(KeyStoreError::WrongMode),
            Mode::Unlocked(master) => {
                let address = key.address();
                let receiving_key = key.receiving_key();
                let ciphertext = encrypt_record(master, &address.hash(), &key)?;
                self.backend
                    .persist_crypted_sprout_key(&address, &receiving_key, &ciphertext)?;
                spend.crypted_sprout_keys.insert(address, ciphertext);
                spend.basic.add_note_decryptor(address, receiving_key);
                Ok(())
            }
        }
    }

    pub fn add_crypted_sprout_spending_key(
        &self,
        address: SproutPaymentAddress,
        receiving_key: [u8; 32],
        ciphertext: Vec<u8>,
    ) -> Result<(), KeyStoreError> {
        self.insert_crypted_sprout_key(address, receiving_key, ciphertext, true)
    }

    pub fn load_crypted_sprout_spending_key(
        &self,
        address: SproutPaymentAddress,
        receiving_key: [u8; 32],
        ciphertext: Vec<u8>,
    ) -> Result<(), KeyStoreError> {
        self.insert_crypted_sprout_key(address, receiving_key, ciphertext, false)
    }

    fn insert_crypted_sprout_key(
        &self,
        address: SproutPaymentAddress,
        receiving_key: [u8; 32],
        ciphertext: Vec<u8>,
        persist: bool,
    ) -> Result<(), KeyStoreError> {
        let mut keys = self.lock_keys();
        let mut spend = self.lock_spend();
        ensure_crypted(&mut keys, &spend)?;
        if persist {
            self.backend
                .persist_crypted_sprout_key(&address, &receiving_key, &ciphertext)?;
        }
        spend.crypted_sprout_keys.insert(address, ciphertext);
        spend.basic.add_note_decryptor(address, receiving_key);
        Ok(())
    }

    pub fn have_sprout_spending_key(&self, address: &SproutPaymentAddress) -> bool {
        let keys = self.lock_keys();
        let spend = self.lock_spend();
        if keys.mode.is_crypted() {
            spend.crypted_sprout_keys.contains_key(address)
        } else {
            spend.basic.have_sprout_key(address)
        }
    }

    pub fn get_sprout_spending_key(
        &self,
        address: &SproutPaymentAddress,
    ) -> Result<Option<SproutSpendingKey>, KeyStoreError> {
        let keys = self.lock_keys();
        let spend = self.lock_spend();
        match &keys.mode {
            Mode::Plaintext => Ok(spend.basic.get_sprout_key(address).cloned()),
            Mode::Locked => match spend.crypted_sprout_keys.get(address) {
                Some(_) => Err(KeyStoreError::WrongMode),
                None => Ok(None),
            },
            Mode::Unlocked(master) => match spend.crypted_sprout_keys.get(address) {
                Some(ciphertext) => {
                    Ok(Some(decrypt_record(master, &address.hash(), ciphertext)?))
                }
                None => Ok(None),
            },
        }
    }

    /// Note decryptors are viewing-side material and stay available
    /// in every mode, including locked.
    pub fn get_sprout_note_decryptor(
        &self,
        address: &SproutPaymentAddress,
    ) -> Option<SproutNoteDecryptor> {
        self.lock_spend().basic.get_note_decryptor(address).copied()
    }

    // ---- sapling spending keys ---------------------------------------

    pub fn add_sapling_spending_key(
        &self,
        key: SaplingExtendedSpendingKey,
    ) -> Result<(), KeyStoreError> {
        let extfvk = key.to_extfvk()?;
        let keys = self.lock_keys();
        let mut spend = self.lock_spend();
        match &keys.mode {
            Mode::Plaintext => {
                spend.basic.add_sapling_key(extfvk, key);
                Ok(())
            }
            Mode::Locked => Err(KeyStoreError::WrongMode),
            Mode::Unlocked(master) => {
                let ciphertext = encrypt_record(master, &extfvk.fingerprint(), &key)?;
                self.backend
                    .persist_crypted_sapling_key(&extfvk, &ciphertext)?;
                spend.basic.add_sapling_fvk(extfvk.clone());
                spend.crypted_sapling_keys.insert(extfvk, ciphertext);
                Ok(())
            }
        }
    }

    pub fn add_crypted_sapling_spending_key(
        &self,
        extfvk: SaplingExtendedFullViewingKey,
        ciphertext: Vec<u8>,
    ) -> Result<(), KeyStoreError> {
        self.insert_crypted_sapling_key(extfvk, ciphertext, true)
    }

    /// Replay path keyed by the extended full viewing key itself; no
    /// decryption, so it works while locked.
    pub fn load_crypted_sapling_spending_key(
        &self,
        extfvk: SaplingExtendedFullViewingKey,
        ciphertext: Vec<u8>,
    ) -> Result<(), KeyStoreError> {
        self.insert_crypted_sapling_key(extfvk, ciphertext, false)
    }

    /// Replay path keyed by viewing-key fingerprint: decrypts to
    /// recover and index the viewing key, so the store must be
    /// unlocked. Returns the recovered viewing key.
    pub fn load_crypted_sapling_spending_key_by_fingerprint(
        &self,
        fingerprint: &Hash256,
        ciphertext: Vec<u8>,
    ) -> Result<SaplingExtendedFullViewingKey, KeyStoreError> {
        let mut keys = self.lock_keys();
        let mut spend = self.lock_spend();
        ensure_crypted(&mut keys, &spend)?;
        let master = keys.mode.master().ok_or(KeyStoreError::WrongMode)?;
        let key: SaplingExtendedSpendingKey = decrypt_record(master, fingerprint, &ciphertext)?;
        let extfvk = key.to_extfvk()?;
        spend.basic.add_sapling_fvk(extfvk.clone());
        spend.crypted_sapling_keys.insert(extfvk.clone(), ciphertext);
        Ok(extfvk)
    }

    fn insert_crypted_sapling_key(
        &self,
        extfvk: SaplingExtendedFullViewingKey,
        ciphertext: Vec<u8>,
        persist: bool,
    ) -> Result<(), KeyStoreError> {
        let mut keys = self.lock_keys();
        let mut spend = self.lock_spend();
        ensure_crypted(&mut keys, &spend)?;
        if persist {
            self.backend
                .persist_crypted_sapling_key(&extfvk, &ciphertext)?;
        }
        spend.basic.add_sapling_fvk(extfvk.clone());
        spend.crypted_sapling_keys.insert(extfvk, ciphertext);
        Ok(())
    }

    pub fn have_sapling_spending_key(&self, extfvk: &SaplingExtendedFullViewingKey) -> bool {
        let keys = self.lock_keys();
        let spend = self.lock_spend();
        if keys.mode.is_crypted() {
            spend.crypted_sapling_keys.contains_key(extfvk)
        } else {
            spend.basic.have_sapling_key(extfvk)
        }
    }

    pub fn get_sapling_spending_key(
        &self,
        extfvk: &SaplingExtendedFullViewingKey,
    ) -> Result<Option<SaplingExtendedSpendingKey>, KeyStoreError> {
        let keys = self.lock_keys();
        let spend = self.lock_spend();
        match &keys.mode {
            Mode::Plaintext => Ok(spend.basic.get_sapling_key(extfvk).cloned()),
            Mode::Locked => match spend.crypted_sapling_keys.get(extfvk) {
                Some(_) => Err(KeyStoreError::WrongMode),
                None => Ok(None),
            },
            Mode::Unlocked(master) => match spend.crypted_sapling_keys.get(extfvk) {
                Some(ciphertext) => Ok(Some(decrypt_record(
                    master,
                    &extfvk.fingerprint(),
                    ciphertext,
                )?)),
                None => Ok(None),
            },
        }
    }

    // ---- sapling viewing keys and address indexes --------------------

    pub fn add_sapling_extfvk(
        &self,
        extfvk: SaplingExtendedFullViewingKey,
    ) -> Result<(), KeyStoreError> {
        let keys = self.lock_keys();
        let mut spend = self.lock_spend();
        match &keys.mode {
            Mode::Plaintext => {
                spend.basic.add_sapling_fvk(extfvk);
                Ok(())
            }
            Mode::Locked => Err(KeyStoreError::WrongMode),
            Mode::Unlocked(master) => {
                let ciphertext = encrypt_record(master, &extfvk.fingerprint(), &extfvk)?;
                self.backend
                    .persist_crypted_sapling_extfvk(&extfvk, &ciphertext)?;
                spend.basic.add_sapling_fvk(extfvk);
                Ok(())
            }
        }
    }

    /// Decrypt-validate-index replay for a watch-only viewing key.
    pub fn load_crypted_sapling_extfvk(
        &self,
        fingerprint: &Hash256,
        ciphertext: &[u8],
    ) -> Result<SaplingExtendedFullViewingKey, KeyStoreError> {
        let mut keys = self.lock_keys();
        let mut spend = self.lock_spend();
        ensure_crypted(&mut keys, &spend)?;
        let master = keys.mode.master().ok_or(KeyStoreError::WrongMode)?;
        let extfvk: SaplingExtendedFullViewingKey =
            decrypt_record(master, fingerprint, ciphertext)?;
        spend.basic.add_sapling_fvk(extfvk.clone());
        Ok(extfvk)
    }

    pub fn get_sapling_extfvk_for_ivk(
        &self,
        ivk: &SaplingIncomingViewingKey,
    ) -> Option<SaplingExtendedFullViewingKey> {
        self.lock_spend().basic.get_sapling_fvk(ivk).cloned()
    }

    /// Indexes the (address, ivk) pair. In encrypted mode the pair is
    /// also encrypted and handed to the persistence layer, so the
    /// store must be unlocked.
    pub fn add_sapling_incoming_viewing_key(
        &self,
        ivk: SaplingIncomingViewingKey,
        address: SaplingPaymentAddress,
    ) -> Result<(), KeyStoreError> {
        let keys = self.lock_keys();
        let mut spend = self.lock_spend();
        match &keys.mode {
            Mode::Plaintext => {
                spend.basic.add_sapling_ivk(address, ivk);
                Ok(())
            }
            Mode::Locked => Err(KeyStoreError::WrongMode),
            Mode::Unlocked(master) => {
                let record = SaplingAddressRecord { ivk, address };
                let ciphertext = encrypt_record(master, &address.hash(), &record)?;
                self.backend
                    .persist_crypted_sapling_address(&ivk, &address, &ciphertext)?;
                spend.basic.add_sapling_ivk(address, ivk);
                Ok(())
            }
        }
    }

    pub fn get_sapling_ivk_for_address(
        &self,
        address: &SaplingPaymentAddress,
    ) -> Option<SaplingIncomingViewingKey> {
        self.lock_spend().basic.get_sapling_ivk(address).copied()
    }

    pub fn load_crypted_sapling_payment_address(
        &self,
        identifier: &Hash256,
        ciphertext: &[u8],
    ) -> Result<SaplingAddressRecord, KeyStoreError> {
        let mut keys = self.lock_keys();
        let mut spend = self.lock_spend();
        ensure_crypted(&mut keys, &spend)?;
        let master = keys.mode.master().ok_or(KeyStoreError::WrongMode)?;
        let record: SaplingAddressRecord = decrypt_record(master, identifier, ciphertext)?;
        spend.basic.add_sapling_ivk(record.address, record.ivk);
        Ok(record)
    }

    pub fn add_sapling_diversified_address(
        &self,
        address: SaplingPaymentAddress,
        ivk: SaplingIncomingViewingKey,
        path: DiversifierPath,
    ) -> Result<(), KeyStoreError> {
        let keys = self.lock_keys();
        let mut spend = self.lock_spend();
        match &keys.mode {
            Mode::Plaintext => {
                spend.basic.add_sapling_diversified(address, ivk, path);
                Ok(())
            }
            Mode::Locked => Err(KeyStoreError::WrongMode),
            Mode::Unlocked(master) => {
                let record = SaplingDiversifiedAddress { address, ivk, path };
                let ciphertext = encrypt_record(master, &address.hash(), &record)?;
                self.backend.persist_crypted_sapling_diversified_address(
                    &ivk,
                    &address,
                    &path,
                    &ciphertext,
                )?;
                spend.basic.add_sapling_diversified(address, ivk, path);
                Ok(())
            }
        }
    }

    pub fn get_sapling_diversified_address(
        &self,
        address: &SaplingPaymentAddress,
    ) -> Option<(SaplingIncomingViewingKey, DiversifierPath)> {
        self.lock_spend()
            .basic
            .get_sapling_diversified(address)
            .copied()
    }

    pub fn load_crypted_sapling_diversified_address(
        &self,
        identifier: &Hash256,
        ciphertext: &[u8],
    ) -> Result<SaplingDiversifiedAddress, KeyStoreError> {
        let mut keys = self.lock_keys();
        let mut spend = self.lock_spend();
        ensure_crypted(&mut keys, &spend)?;
        let master = keys.mode.master().ok_or(KeyStoreError::WrongMode)?;
        let record: SaplingDiversifiedAddress = decrypt_record(master, identifier, ciphertext)?;
        spend
            .basic
            .add_sapling_diversified(record.address, record.ivk, record.path);
        Ok(record)
    }

    pub fn set_sapling_last_diversifier(
        &self,
        handle: Hash256,
        ivk: SaplingIncomingViewingKey,
        path: DiversifierPath,
    ) {
        self.lock_spend()
            .basic
            .set_sapling_last_diversifier(handle, ivk, path);
    }

    pub fn get_sapling_last_diversifier(
        &self,
        handle: &Hash256,
    ) -> Option<(SaplingIncomingViewingKey, DiversifierPath)> {
        self.lock_spend()
            .basic
            .get_sapling_last_diversifier(handle)
            .copied()
    }

    // ---- auxiliary record transforms ---------------------------------
    //
    // These encrypt and decrypt under the resident master key without
    // keeping a map in the store; the ciphertext belongs to the
    // wallet database. All of them require the store to be unlocked.
    // The explicit-master forms live in `records`.

    pub fn encrypt_redeem_script(
        &self,
        script: &RedeemScript,
    ) -> Result<(Hash256, Vec<u8>), KeyStoreError> {
        let identifier = script.hash();
        let ciphertext = self.with_master(|master| encrypt_record(master, &identifier, script))?;
        Ok((identifier, ciphertext))
    }

    pub fn decrypt_redeem_script(
        &self,
        identifier: &Hash256,
        ciphertext: &[u8],
    ) -> Result<RedeemScript, KeyStoreError> {
        self.with_master(|master| decrypt_record(master, identifier, ciphertext))
    }

    pub fn encrypt_string_pair(
        &self,
        handle: &Hash256,
        pair: &StringPair,
    ) -> Result<Vec<u8>, KeyStoreError> {
        self.with_master(|master| encrypt_record(master, handle, pair))
    }

    pub fn decrypt_string_pair(
        &self,
        handle: &Hash256,
        ciphertext: &[u8],
    ) -> Result<StringPair, KeyStoreError> {
        self.with_master(|master| decrypt_record(master, handle, ciphertext))
    }

    pub fn encrypt_public_key(
        &self,
        handle: &Hash256,
        pubkey: &TransparentPubKey,
    ) -> Result<Vec<u8>, KeyStoreError> {
        self.with_master(|master| encrypt_record(master, handle, pubkey))
    }

    pub fn decrypt_public_key(
        &self,
        handle: &Hash256,
        ciphertext: &[u8],
    ) -> Result<TransparentPubKey, KeyStoreError> {
        self.with_master(|master| decrypt_record(master, handle, ciphertext))
    }

    pub fn encrypt_wallet_tx(
        &self,
        handle: &Hash256,
        blob: &WalletTxBlob,
    ) -> Result<Vec<u8>, KeyStoreError> {
        self.with_master(|master| encrypt_record(master, handle, blob))
    }

    pub fn decrypt_wallet_tx(
        &self,
        handle: &Hash256,
        ciphertext: &[u8],
    ) -> Result<WalletTxBlob, KeyStoreError> {
        self.with_master(|master| decrypt_record(master, handle, ciphertext))
    }

    pub fn encrypt_sapling_metadata(
        &self,
        extfvk: &SaplingExtendedFullViewingKey,
        metadata: &KeyMetadata,
    ) -> Result<Vec<u8>, KeyStoreError> {
        self.with_master(|master| encrypt_record(master, &extfvk.fingerprint(), metadata))
    }

    pub fn decrypt_sapling_metadata(
        &self,
        fingerprint: &Hash256,
        ciphertext: &[u8],
    ) -> Result<KeyMetadata, KeyStoreError> {
        self.with_master(|master| decrypt_record(master, fingerprint, ciphertext))
    }

    pub fn encrypt_sapling_payment_address(
        &self,
        record: &SaplingAddressRecord,
    ) -> Result<Vec<u8>, KeyStoreError> {
        self.with_master(|master| encrypt_record(master, &record.address.hash(), record))
    }

    pub fn decrypt_sapling_payment_address(
        &self,
        identifier: &Hash256,
        ciphertext: &[u8],
    ) -> Result<SaplingAddressRecord, KeyStoreError> {
        self.with_master(|master| decrypt_record(master, identifier, ciphertext))
    }

    pub fn encrypt_sapling_diversified_address(
        &self,
        record: &SaplingDiversifiedAddress,
    ) -> Result<Vec<u8>, KeyStoreError> {
        self.with_master(|master| encrypt_record(master, &record.address.hash(), record))
    }

    pub fn decrypt_sapling_diversified_address(
        &self,
        identifier: &Hash256,
        ciphertext: &[u8],
    ) -> Result<SaplingDiversifiedAddress, KeyStoreError> {
        self.with_master(|master| decrypt_record(master, identifier, ciphertext))
    }

    pub fn encrypt_sapling_last_diversifier(
        &self,
        handle: &Hash256,
        record: &SaplingLastDiversifier,
    ) -> Result<Vec<u8>, KeyStoreError> {
        self.with_master(|master| encrypt_record(master, handle, record))
    }

    pub fn decrypt_sapling_last_diversifier(
        &self,
        handle: &Hash256,
        ciphertext: &[u8],
    ) -> Result<SaplingLastDiversifier, KeyStoreError> {
        self.with_master(|master| decrypt_record(master, handle, ciphertext))
    }
}

/// Plaintext-to-crypted advance. Only legal while every plaintext
/// secret map is empty; `encrypt_keys` is the operation that drains
/// them.
fn ensure_crypted(keys: &mut KeySide, spend: &SpendSide) -> Result<(), KeyStoreError> {
    if keys.mode.is_crypted() {
        return Ok(());
    }
    if !keys.basic.keys_is_empty()
        || !spend.basic.sprout_is_empty()
        || !spend.basic.sapling_is_empty()
        || spend.basic.hd_seed().is_some()
    {
        return Err(KeyStoreError::WrongMode);
    }
    keys.mode = Mode::Locked;
    Ok(())
}
