//! The record catalogue: every class of secret the store can hold,
//! its canonical serialization, and the generic encrypt/decrypt pair
//! every class goes through.
//!
//! A record supplies three things: an encoding, a decoding, and an
//! optional fingerprint. The fingerprint, when present, is recomputed
//! from the decrypted value and compared against the record
//! identifier, which doubles as the integrity check for the
//! unauthenticated legacy ciphertext format.

use zvault_primitives::encoding::{DecodeError, Decoder, Encoder, PROTOCOL_VERSION};
use zvault_primitives::hash::{hash160, sha256d};
use zvault_primitives::Hash256;
use zvault_shielded::{
    DiversifierPath, SaplingExtendedFullViewingKey, SaplingExtendedSpendingKey,
    SaplingIncomingViewingKey, SaplingPaymentAddress, SproutSpendingKey, DIVERSIFIER_PATH_SIZE,
    SAPLING_ADDRESS_SIZE, SAPLING_EXTENDED_KEY_SIZE, SPROUT_SPENDING_KEY_SIZE,
};

use crate::crypter::{decrypt_secret, encrypt_secret};
use crate::keys::{HdSeed, TransparentKey, TransparentPubKey, TRANSPARENT_SECRET_SIZE};
use crate::{KeyStoreError, SecureBytes};

/// Canonical serialization of one secret record class.
pub trait SecretRecord: Sized {
    fn record_encode(&self, encoder: &mut Encoder);
    fn record_decode(decoder: &mut Decoder) -> Result<Self, DecodeError>;

    /// Identifier recomputed from the decrypted value, for classes
    /// whose identifier is a domain fingerprint. Classes addressed by
    /// caller-supplied handles return `None` and skip verification.
    fn fingerprint(&self) -> Option<Hash256> {
        None
    }
}

pub fn encode_record<T: SecretRecord>(record: &T) -> SecureBytes {
    let mut encoder = Encoder::new(PROTOCOL_VERSION);
    record.record_encode(&mut encoder);
    SecureBytes::from(encoder.into_inner())
}

fn decode_record_bytes<T: SecretRecord>(bytes: &[u8]) -> Result<T, DecodeError> {
    let mut decoder = Decoder::new(bytes, PROTOCOL_VERSION);
    let record = T::record_decode(&mut decoder)?;
    if !decoder.is_empty() {
        return Err(DecodeError::TrailingBytes);
    }
    Ok(record)
}

/// Serializes and encrypts a record under its identifier-derived IV.
pub fn encrypt_record<T: SecretRecord>(
    master: &SecureBytes,
    identifier: &Hash256,
    record: &T,
) -> Result<Vec<u8>, KeyStoreError> {
    let plaintext = encode_record(record);
    encrypt_secret(master, &plaintext, identifier)
}

/// Decrypts, deserializes and fingerprint-verifies a record. Every
/// failure mode after key setup collapses into `DecryptMismatch`; a
/// caller learns nothing about where the mismatch happened.
pub fn decrypt_record<T: SecretRecord>(
    master: &SecureBytes,
    identifier: &Hash256,
    ciphertext: &[u8],
) -> Result<T, KeyStoreError> {
    let plaintext = decrypt_secret(master, ciphertext, identifier)
        .map_err(|err| match err {
            KeyStoreError::BadParameter(_) | KeyStoreError::NotKeyed => err,
            _ => KeyStoreError::DecryptMismatch,
        })?;
    let record = decode_record_bytes::<T>(plaintext.as_slice())
        .map_err(|_| KeyStoreError::DecryptMismatch)?;
    if let Some(recomputed) = record.fingerprint() {
        if &recomputed != identifier {
            return Err(KeyStoreError::DecryptMismatch);
        }
    }
    Ok(record)
}

/// Encrypts a transparent private key under the hash of its public
/// key. Returns the ciphertext; the public key rides alongside it in
/// the crypted map.
pub fn encrypt_transparent_key(
    master: &SecureBytes,
    key: &TransparentKey,
) -> Result<Vec<u8>, KeyStoreError> {
    let plaintext = SecureBytes::from_slice(key.secret_bytes());
    encrypt_secret(master, &plaintext, &key.pubkey().hash())
}

/// Inverse of `encrypt_transparent_key`. The compressed flag comes
/// from the stored public key, and the key is only accepted when the
/// public key re-derived from the decrypted scalar matches it.
pub fn decrypt_transparent_key(
    master: &SecureBytes,
    pubkey: &TransparentPubKey,
    ciphertext: &[u8],
) -> Result<TransparentKey, KeyStoreError> {
    let plaintext = decrypt_secret(master, ciphertext, &pubkey.hash())
        .map_err(|err| match err {
            KeyStoreError::BadParameter(_) | KeyStoreError::NotKeyed => err,
            _ => KeyStoreError::DecryptMismatch,
        })?;
    if plaintext.len() != TRANSPARENT_SECRET_SIZE {
        return Err(KeyStoreError::DecryptMismatch);
    }
    let mut secret = [0u8; TRANSPARENT_SECRET_SIZE];
    secret.copy_from_slice(plaintext.as_slice());
    let key = TransparentKey::from_secret(secret, pubkey.is_compressed())
        .map_err(|_| KeyStoreError::DecryptMismatch)?;
    if key.pubkey() != pubkey {
        return Err(KeyStoreError::DecryptMismatch);
    }
    Ok(key)
}

impl SecretRecord for HdSeed {
    fn record_encode(&self, encoder: &mut Encoder) {
        encoder.write_bytes(self.as_slice());
    }

    fn record_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let bytes = decoder.read_rest()?;
        HdSeed::new(SecureBytes::from(bytes))
            .map_err(|_| DecodeError::InvalidData("empty hd seed"))
    }

    fn fingerprint(&self) -> Option<Hash256> {
        Some(HdSeed::fingerprint(self))
    }
}

impl SecretRecord for SproutSpendingKey {
    fn record_encode(&self, encoder: &mut Encoder) {
        encoder.write_bytes(&self.to_bytes());
    }

    fn record_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let bytes = decoder.read_fixed::<SPROUT_SPENDING_KEY_SIZE>()?;
        SproutSpendingKey::from_bytes(bytes)
            .map_err(|_| DecodeError::InvalidData("invalid sprout spending key"))
    }

    fn fingerprint(&self) -> Option<Hash256> {
        Some(self.address().hash())
    }
}

impl SecretRecord for SaplingExtendedSpendingKey {
    fn record_encode(&self, encoder: &mut Encoder) {
        encoder.write_bytes(&self.to_bytes());
    }

    fn record_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let bytes = decoder.read_fixed::<SAPLING_EXTENDED_KEY_SIZE>()?;
        SaplingExtendedSpendingKey::from_bytes(&bytes)
            .map_err(|_| DecodeError::InvalidData("invalid sapling spending key"))
    }

    fn fingerprint(&self) -> Option<Hash256> {
        self.to_extfvk().ok().map(|extfvk| extfvk.fingerprint())
    }
}

impl SecretRecord for SaplingExtendedFullViewingKey {
    fn record_encode(&self, encoder: &mut Encoder) {
        encoder.write_bytes(&self.to_bytes());
    }

    fn record_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let bytes = decoder.read_fixed::<SAPLING_EXTENDED_KEY_SIZE>()?;
        SaplingExtendedFullViewingKey::from_bytes(&bytes)
            .map_err(|_| DecodeError::InvalidData("invalid sapling viewing key"))
    }

    fn fingerprint(&self) -> Option<Hash256> {
        Some(SaplingExtendedFullViewingKey::fingerprint(self))
    }
}

/// Script whose hash appears in a pay-to-script address; stored
/// encrypted as auxiliary data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RedeemScript {
    pub script: Vec<u8>,
}

impl RedeemScript {
    pub fn script_id(&self) -> [u8; 20] {
        hash160(&self.script)
    }

    pub fn hash(&self) -> Hash256 {
        sha256d(&self.script)
    }
}

impl SecretRecord for RedeemScript {
    fn record_encode(&self, encoder: &mut Encoder) {
        encoder.write_var_bytes(&self.script);
    }

    fn record_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        Ok(Self {
            script: decoder.read_var_bytes()?,
        })
    }

    fn fingerprint(&self) -> Option<Hash256> {
        Some(self.hash())
    }
}

impl SecretRecord for TransparentPubKey {
    fn record_encode(&self, encoder: &mut Encoder) {
        encoder.write_var_bytes(self.as_bytes());
    }

    fn record_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let bytes = decoder.read_var_bytes()?;
        TransparentPubKey::from_bytes(bytes)
            .map_err(|_| DecodeError::InvalidData("invalid public key"))
    }
}

/// Two length-prefixed UTF-8 strings under a caller-supplied handle.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StringPair {
    pub first: String,
    pub second: String,
}

impl SecretRecord for StringPair {
    fn record_encode(&self, encoder: &mut Encoder) {
        encoder.write_var_str(&self.first);
        encoder.write_var_str(&self.second);
    }

    fn record_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        Ok(Self {
            first: decoder.read_var_str()?,
            second: decoder.read_var_str()?,
        })
    }
}

/// (incoming viewing key, payment address) pair, identified by the
/// address hash.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaplingAddressRecord {
    pub ivk: SaplingIncomingViewingKey,
    pub address: SaplingPaymentAddress,
}

impl SecretRecord for SaplingAddressRecord {
    fn record_encode(&self, encoder: &mut Encoder) {
        encoder.write_bytes(self.ivk.as_bytes());
        encoder.write_bytes(&self.address.to_bytes());
    }

    fn record_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let ivk = SaplingIncomingViewingKey(decoder.read_fixed::<32>()?);
        let address_bytes = decoder.read_fixed::<SAPLING_ADDRESS_SIZE>()?;
        let address = SaplingPaymentAddress::from_bytes(&address_bytes)
            .map_err(|_| DecodeError::InvalidData("invalid sapling address"))?;
        Ok(Self { ivk, address })
    }

    fn fingerprint(&self) -> Option<Hash256> {
        Some(self.address.hash())
    }
}

/// Diversified address directory entry: ((address, ivk), 88-bit
/// path), identified by the address hash.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaplingDiversifiedAddress {
    pub address: SaplingPaymentAddress,
    pub ivk: SaplingIncomingViewingKey,
    pub path: DiversifierPath,
}

impl SecretRecord for SaplingDiversifiedAddress {
    fn record_encode(&self, encoder: &mut Encoder) {
        encoder.write_bytes(&self.address.to_bytes());
        encoder.write_bytes(self.ivk.as_bytes());
        encoder.write_bytes(self.path.as_bytes());
    }

    fn record_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let address_bytes = decoder.read_fixed::<SAPLING_ADDRESS_SIZE>()?;
        let address = SaplingPaymentAddress::from_bytes(&address_bytes)
            .map_err(|_| DecodeError::InvalidData("invalid sapling address"))?;
        let ivk = SaplingIncomingViewingKey(decoder.read_fixed::<32>()?);
        let path = DiversifierPath(decoder.read_fixed::<DIVERSIFIER_PATH_SIZE>()?);
        Ok(Self { address, ivk, path })
    }

    fn fingerprint(&self) -> Option<Hash256> {
        Some(self.address.hash())
    }
}

/// Most recently used diversifier for an incoming viewing key, under
/// a caller-supplied handle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaplingLastDiversifier {
    pub ivk: SaplingIncomingViewingKey,
    pub path: DiversifierPath,
}

impl SecretRecord for SaplingLastDiversifier {
    fn record_encode(&self, encoder: &mut Encoder) {
        encoder.write_bytes(self.ivk.as_bytes());
        encoder.write_bytes(self.path.as_bytes());
    }

    fn record_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let ivk = SaplingIncomingViewingKey(decoder.read_fixed::<32>()?);
        let path = DiversifierPath(decoder.read_fixed::<DIVERSIFIER_PATH_SIZE>()?);
        Ok(Self { ivk, path })
    }
}

/// Bookkeeping for a sapling key, identified by the owning extended
/// full viewing key's fingerprint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyMetadata {
    pub version: u32,
    pub create_time: i64,
    pub hd_keypath: String,
    pub seed_fingerprint: Hash256,
}

impl SecretRecord for KeyMetadata {
    fn record_encode(&self, encoder: &mut Encoder) {
        encoder.write_u32_le(self.version);
        encoder.write_i64_le(self.create_time);
        encoder.write_var_str(&self.hd_keypath);
        encoder.write_bytes(&self.seed_fingerprint);
    }

    fn record_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        Ok(Self {
            version: decoder.read_u32_le()?,
            create_time: decoder.read_i64_le()?,
            hd_keypath: decoder.read_var_str()?,
            seed_fingerprint: decoder.read_fixed::<32>()?,
        })
    }
}

/// Opaque wallet transaction payload under a caller-supplied handle.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WalletTxBlob {
    pub bytes: Vec<u8>,
}

impl SecretRecord for WalletTxBlob {
    fn record_encode(&self, encoder: &mut Encoder) {
        encoder.write_bytes(&self.bytes);
    }

    fn record_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        Ok(Self {
            bytes: decoder.read_rest()?,
        })
    }
}
