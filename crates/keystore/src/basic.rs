//! Plaintext-mode repositories: typed maps from identifier to secret
//! for each record class, split along the store's two lock domains.
//! The transparent side lives under the key mutex, the shielded side
//! under the spending-key mutex; `CryptoKeyStore` owns both.

use std::collections::BTreeMap;

use zvault_primitives::Hash256;
use zvault_shielded::{
    DiversifierPath, SaplingExtendedFullViewingKey, SaplingExtendedSpendingKey,
    SaplingIncomingViewingKey, SaplingPaymentAddress, SproutNoteDecryptor, SproutPaymentAddress,
    SproutSpendingKey,
};

use crate::keys::{HdSeed, KeyId, TransparentKey, TransparentPubKey};
use crate::records::RedeemScript;

/// Transparent-side maps: private keys by key id plus the redeem
/// script directory. Scripts are not secret and stay resident in
/// encrypted mode.
#[derive(Default)]
pub struct TransparentKeyStore {
    keys: BTreeMap<KeyId, TransparentKey>,
    scripts: BTreeMap<[u8; 20], RedeemScript>,
}

impl TransparentKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_key(&mut self, key: TransparentKey) -> KeyId {
        let key_id = key.key_id();
        self.keys.insert(key_id, key);
        key_id
    }

    pub fn get_key(&self, key_id: &KeyId) -> Option<&TransparentKey> {
        self.keys.get(key_id)
    }

    pub fn have_key(&self, key_id: &KeyId) -> bool {
        self.keys.contains_key(key_id)
    }

    pub fn get_pubkey(&self, key_id: &KeyId) -> Option<&TransparentPubKey> {
        self.keys.get(key_id).map(|key| key.pubkey())
    }

    pub fn keys(&self) -> impl Iterator<Item = (&KeyId, &TransparentKey)> {
        self.keys.iter()
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    pub fn keys_is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Drops every plaintext private key. Secrets zeroize on drop.
    pub fn clear_keys(&mut self) {
        self.keys.clear();
    }

    pub fn add_script(&mut self, script: RedeemScript) -> [u8; 20] {
        let script_id = script.script_id();
        self.scripts.insert(script_id, script);
        script_id
    }

    pub fn get_script(&self, script_id: &[u8; 20]) -> Option<&RedeemScript> {
        self.scripts.get(script_id)
    }

    pub fn have_script(&self, script_id: &[u8; 20]) -> bool {
        self.scripts.contains_key(script_id)
    }
}

/// Shielded-side maps: the HD seed, Sprout and Sapling spending
/// keys, and the viewing-side indexes that survive locking.
#[derive(Default)]
pub struct ShieldedKeyStore {
    hd_seed: Option<HdSeed>,
    sprout_keys: BTreeMap<SproutPaymentAddress, SproutSpendingKey>,
    note_decryptors: BTreeMap<SproutPaymentAddress, SproutNoteDecryptor>,
    sapling_keys: BTreeMap<SaplingExtendedFullViewingKey, SaplingExtendedSpendingKey>,
    sapling_fvks: BTreeMap<SaplingIncomingViewingKey, SaplingExtendedFullViewingKey>,
    sapling_ivks: BTreeMap<SaplingPaymentAddress, SaplingIncomingViewingKey>,
    sapling_diversified: BTreeMap<SaplingPaymentAddress, (SaplingIncomingViewingKey, DiversifierPath)>,
    sapling_last_diversifier: BTreeMap<Hash256, (SaplingIncomingViewingKey, DiversifierPath)>,
}

impl ShieldedKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_hd_seed(&mut self, seed: HdSeed) {
        self.hd_seed = Some(seed);
    }

    pub fn hd_seed(&self) -> Option<&HdSeed> {
        self.hd_seed.as_ref()
    }

    pub fn clear_hd_seed(&mut self) {
        self.hd_seed = None;
    }

    pub fn add_sprout_key(&mut self, key: SproutSpendingKey) -> SproutPaymentAddress {
        let address = key.address();
        self.note_decryptors
            .insert(address, SproutNoteDecryptor::new(key.receiving_key()));
        self.sprout_keys.insert(address, key);
        address
    }

    pub fn add_note_decryptor(&mut self, address: SproutPaymentAddress, receiving_key: [u8; 32]) {
        self.note_decryptors
            .insert(address, SproutNoteDecryptor::new(receiving_key));
    }

    pub fn get_sprout_key(&self, address: &SproutPaymentAddress) -> Option<&SproutSpendingKey> {
        self.sprout_keys.get(address)
    }

    pub fn have_sprout_key(&self, address: &SproutPaymentAddress) -> bool {
        self.sprout_keys.contains_key(address)
    }

    pub fn get_note_decryptor(
        &self,
        address: &SproutPaymentAddress,
    ) -> Option<&SproutNoteDecryptor> {
        self.note_decryptors.get(address)
    }

    pub fn sprout_keys(&self) -> impl Iterator<Item = (&SproutPaymentAddress, &SproutSpendingKey)> {
        self.sprout_keys.iter()
    }

    pub fn sprout_is_empty(&self) -> bool {
        self.sprout_keys.is_empty()
    }

    pub fn clear_sprout_keys(&mut self) {
        self.sprout_keys.clear();
    }

    pub fn add_sapling_key(
        &mut self,
        extfvk: SaplingExtendedFullViewingKey,
        key: SaplingExtendedSpendingKey,
    ) {
        self.sapling_fvks.insert(extfvk.ivk(), extfvk.clone());
        self.sapling_keys.insert(extfvk, key);
    }

    pub fn add_sapling_fvk(&mut self, extfvk: SaplingExtendedFullViewingKey) {
        self.sapling_fvks.insert(extfvk.ivk(), extfvk);
    }

    pub fn get_sapling_key(
        &self,
        extfvk: &SaplingExtendedFullViewingKey,
    ) -> Option<&SaplingExtendedSpendingKey> {
        self.sapling_keys.get(extfvk)
    }

    pub fn have_sapling_key(&self, extfvk: &SaplingExtendedFullViewingKey) -> bool {
        self.sapling_keys.contains_key(extfvk)
    }

    pub fn get_sapling_fvk(
        &self,
        ivk: &SaplingIncomingViewingKey,
    ) -> Option<&SaplingExtendedFullViewingKey> {
        self.sapling_fvks.get(ivk)
    }

    pub fn sapling_fvks(
        &self,
    ) -> impl Iterator<Item = (&SaplingIncomingViewingKey, &SaplingExtendedFullViewingKey)> {
        self.sapling_fvks.iter()
    }

    pub fn sapling_keys(
        &self,
    ) -> impl Iterator<Item = (&SaplingExtendedFullViewingKey, &SaplingExtendedSpendingKey)> {
        self.sapling_keys.iter()
    }

    pub fn sapling_is_empty(&self) -> bool {
        self.sapling_keys.is_empty()
    }

    pub fn clear_sapling_keys(&mut self) {
        self.sapling_keys.clear();
    }

    pub fn add_sapling_ivk(
        &mut self,
        address: SaplingPaymentAddress,
        ivk: SaplingIncomingViewingKey,
    ) {
        self.sapling_ivks.insert(address, ivk);
    }

    pub fn get_sapling_ivk(
        &self,
        address: &SaplingPaymentAddress,
    ) -> Option<&SaplingIncomingViewingKey> {
        self.sapling_ivks.get(address)
    }

    pub fn sapling_ivks(
        &self,
    ) -> impl Iterator<Item = (&SaplingPaymentAddress, &SaplingIncomingViewingKey)> {
        self.sapling_ivks.iter()
    }

    pub fn add_sapling_diversified(
        &mut self,
        address: SaplingPaymentAddress,
        ivk: SaplingIncomingViewingKey,
        path: DiversifierPath,
    ) {
        self.sapling_diversified.insert(address, (ivk, path));
    }

    pub fn get_sapling_diversified(
        &self,
        address: &SaplingPaymentAddress,
    ) -> Option<&(SaplingIncomingViewingKey, DiversifierPath)> {
        self.sapling_diversified.get(address)
    }

    pub fn sapling_diversified(
        &self,
    ) -> impl Iterator<
        Item = (
            &SaplingPaymentAddress,
            &(SaplingIncomingViewingKey, DiversifierPath),
        ),
    > {
        self.sapling_diversified.iter()
    }

    pub fn set_sapling_last_diversifier(
        &mut self,
        handle: Hash256,
        ivk: SaplingIncomingViewingKey,
        path: DiversifierPath,
    ) {
        self.sapling_last_diversifier.insert(handle, (ivk, path));
    }

    pub fn get_sapling_last_diversifier(
        &self,
        handle: &Hash256,
    ) -> Option<&(SaplingIncomingViewingKey, DiversifierPath)> {
        self.sapling_last_diversifier.get(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transparent_add_get_have() {
        let mut store = TransparentKeyStore::new();
        let key = TransparentKey::from_secret([1u8; 32], true).unwrap();
        let expected = key.clone();
        let key_id = store.add_key(key);
        assert!(store.have_key(&key_id));
        assert_eq!(store.get_key(&key_id), Some(&expected));
        assert_eq!(store.get_pubkey(&key_id), Some(expected.pubkey()));
        assert!(!store.have_key(&[0u8; 20]));
    }

    #[test]
    fn scripts_survive_clear_keys() {
        let mut store = TransparentKeyStore::new();
        store.add_key(TransparentKey::from_secret([1u8; 32], true).unwrap());
        let script_id = store.add_script(RedeemScript {
            script: vec![0x51, 0x87],
        });
        store.clear_keys();
        assert!(store.keys_is_empty());
        assert!(store.have_script(&script_id));
    }

    #[test]
    fn sprout_add_installs_note_decryptor() {
        let mut store = ShieldedKeyStore::new();
        let key = SproutSpendingKey::random();
        let expected_pk_enc = key.address().pk_enc;
        let address = store.add_sprout_key(key);
        assert!(store.have_sprout_key(&address));
        let decryptor = store.get_note_decryptor(&address).unwrap();
        assert_eq!(decryptor.pk_enc(), expected_pk_enc);
    }

    #[test]
    fn note_decryptors_survive_clear() {
        let mut store = ShieldedKeyStore::new();
        let address = store.add_sprout_key(SproutSpendingKey::random());
        store.clear_sprout_keys();
        assert!(store.sprout_is_empty());
        assert!(store.get_note_decryptor(&address).is_some());
    }

    #[test]
    fn sapling_key_indexes_fvk_by_ivk() {
        let mut store = ShieldedKeyStore::new();
        let sk = SaplingExtendedSpendingKey::master(&[9u8; 32]);
        let extfvk = sk.to_extfvk().unwrap();
        store.add_sapling_key(extfvk.clone(), sk);
        assert!(store.have_sapling_key(&extfvk));
        assert_eq!(store.get_sapling_fvk(&extfvk.ivk()), Some(&extfvk));
    }
}
