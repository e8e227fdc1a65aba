//! Sprout key material. Addresses are derived from the 252-bit
//! spending key through the SHA-256-compression-function PRFs; the
//! transmission keypair lives on Curve25519.

use rand_core::{OsRng, RngCore};
use sha2::compress256;
use sha2::digest::generic_array::GenericArray;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use zvault_primitives::hash::sha256d;
use zvault_primitives::Hash256;

use crate::ShieldedError;

pub const SPROUT_SPENDING_KEY_SIZE: usize = 32;
pub const SPROUT_ADDRESS_SIZE: usize = 64;

const SHA256_IV: [u32; 8] = [
    0x6a09e667, 0xbb67ae85, 0x3c6ef372, 0xa54ff53a, 0x510e527f, 0x9b05688c, 0x1f83d9ab, 0x5be0cd19,
];

/// 252-bit Sprout spending key. The four leading bits are always
/// clear; construction enforces it.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SproutSpendingKey([u8; 32]);

impl SproutSpendingKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, ShieldedError> {
        if (bytes[0] & 0xF0) != 0 {
            return Err(ShieldedError::InvalidData(
                "spending key has invalid leading bits",
            ));
        }
        Ok(Self(bytes))
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0
    }

    pub fn random() -> Self {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        bytes[0] &= 0x0f;
        Self(bytes)
    }

    /// Curve25519 secret used to decrypt incoming notes.
    pub fn receiving_key(&self) -> [u8; 32] {
        let mut sk = prf_addr_sk_enc(&self.0);
        clamp_curve25519(&mut sk);
        sk
    }

    pub fn viewing_key(&self) -> SproutViewingKey {
        SproutViewingKey {
            a_pk: prf_addr_a_pk(&self.0),
            sk_enc: self.receiving_key(),
        }
    }

    pub fn address(&self) -> SproutPaymentAddress {
        self.viewing_key().address()
    }
}

impl std::fmt::Debug for SproutSpendingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SproutSpendingKey(..)")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SproutViewingKey {
    pub a_pk: [u8; 32],
    pub sk_enc: [u8; 32],
}

impl SproutViewingKey {
    pub fn address(&self) -> SproutPaymentAddress {
        SproutPaymentAddress {
            a_pk: self.a_pk,
            pk_enc: generate_pubkey(&self.sk_enc),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct SproutPaymentAddress {
    pub a_pk: [u8; 32],
    pub pk_enc: [u8; 32],
}

impl SproutPaymentAddress {
    pub fn from_bytes(bytes: &[u8; SPROUT_ADDRESS_SIZE]) -> Self {
        let mut a_pk = [0u8; 32];
        a_pk.copy_from_slice(&bytes[..32]);
        let mut pk_enc = [0u8; 32];
        pk_enc.copy_from_slice(&bytes[32..]);
        Self { a_pk, pk_enc }
    }

    pub fn to_bytes(&self) -> [u8; SPROUT_ADDRESS_SIZE] {
        let mut out = [0u8; SPROUT_ADDRESS_SIZE];
        out[..32].copy_from_slice(&self.a_pk);
        out[32..].copy_from_slice(&self.pk_enc);
        out
    }

    /// Serialize-hash of the address, the identifier under which the
    /// owning spending key is encrypted.
    pub fn hash(&self) -> Hash256 {
        sha256d(&self.to_bytes())
    }
}

/// Viewing-side decryptor state kept for incoming-note detection.
/// Holds no spending material.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SproutNoteDecryptor {
    sk_enc: [u8; 32],
    pk_enc: [u8; 32],
}

impl SproutNoteDecryptor {
    pub fn new(receiving_key: [u8; 32]) -> Self {
        let pk_enc = generate_pubkey(&receiving_key);
        Self {
            sk_enc: receiving_key,
            pk_enc,
        }
    }

    pub fn pk_enc(&self) -> [u8; 32] {
        self.pk_enc
    }
}

fn clamp_curve25519(key: &mut [u8; 32]) {
    key[0] &= 248;
    key[31] &= 127;
    key[31] |= 64;
}

fn generate_pubkey(sk: &[u8; 32]) -> [u8; 32] {
    X25519PublicKey::from(&StaticSecret::from(*sk)).to_bytes()
}

fn sha256_compress(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut block = [0u8; 64];
    block[..32].copy_from_slice(left);
    block[32..].copy_from_slice(right);

    let mut state: [u32; 8] = SHA256_IV;
    let block = GenericArray::clone_from_slice(&block);
    compress256(&mut state, &[block]);

    let mut out = [0u8; 32];
    for (i, word) in state.iter().enumerate() {
        out[i * 4..(i + 1) * 4].copy_from_slice(&word.to_be_bytes());
    }
    out
}

fn prf(a: bool, b: bool, c: bool, d: bool, x: &[u8; 32], y: &[u8; 32]) -> [u8; 32] {
    let mut left = *x;
    left[0] &= 0x0f;
    left[0] |= (u8::from(a) << 7) | (u8::from(b) << 6) | (u8::from(c) << 5) | (u8::from(d) << 4);
    sha256_compress(&left, y)
}

fn prf_addr(a_sk: &[u8; 32], t: u8) -> [u8; 32] {
    let mut y = [0u8; 32];
    y[0] = t;
    prf(true, true, false, false, a_sk, &y)
}

fn prf_addr_a_pk(a_sk: &[u8; 32]) -> [u8; 32] {
    prf_addr(a_sk, 0)
}

fn prf_addr_sk_enc(a_sk: &[u8; 32]) -> [u8; 32] {
    prf_addr(a_sk, 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_bytes_rejects_high_bits() {
        let mut bytes = [0u8; 32];
        bytes[0] = 0x10;
        assert!(SproutSpendingKey::from_bytes(bytes).is_err());
        bytes[0] = 0x0f;
        assert!(SproutSpendingKey::from_bytes(bytes).is_ok());
    }

    #[test]
    fn random_keys_have_clear_leading_bits() {
        for _ in 0..8 {
            let key = SproutSpendingKey::random();
            assert_eq!(key.to_bytes()[0] & 0xF0, 0);
        }
    }

    #[test]
    fn address_derivation_is_deterministic() {
        let key = SproutSpendingKey::from_bytes([3u8; 32]).unwrap();
        let addr1 = key.address();
        let addr2 = key.address();
        assert_eq!(addr1, addr2);
        assert_eq!(addr1.hash(), addr2.hash());
    }

    #[test]
    fn distinct_keys_distinct_addresses() {
        let a = SproutSpendingKey::random();
        let b = SproutSpendingKey::random();
        assert_ne!(a.address(), b.address());
    }

    #[test]
    fn address_bytes_roundtrip() {
        let addr = SproutSpendingKey::random().address();
        let bytes = addr.to_bytes();
        assert_eq!(SproutPaymentAddress::from_bytes(&bytes), addr);
    }

    #[test]
    fn decryptor_matches_viewing_key() {
        let key = SproutSpendingKey::random();
        let decryptor = SproutNoteDecryptor::new(key.receiving_key());
        assert_eq!(decryptor.pk_enc(), key.address().pk_enc);
    }
}
