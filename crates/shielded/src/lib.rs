//! Shielded key material: Sprout spending/viewing keys and payment
//! addresses (SHA-256-compression PRFs plus X25519), Sapling extended
//! keys and their BLAKE2b fingerprints.

use blake2b_simd::Params as Blake2bParams;
use zvault_primitives::Hash256;

pub mod sapling;
pub mod sprout;

pub use sapling::{
    DiversifierPath, SaplingExtendedFullViewingKey, SaplingExtendedSpendingKey,
    SaplingIncomingViewingKey, SaplingPaymentAddress, DIVERSIFIER_PATH_SIZE,
    SAPLING_ADDRESS_SIZE, SAPLING_EXTENDED_KEY_SIZE,
};
pub use sprout::{
    SproutNoteDecryptor, SproutPaymentAddress, SproutSpendingKey, SproutViewingKey,
    SPROUT_SPENDING_KEY_SIZE,
};

const HD_SEED_FP_PERSONAL: &[u8; 16] = b"Zcash_HD_Seed_FP";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShieldedError {
    InvalidData(&'static str),
}

impl std::fmt::Display for ShieldedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShieldedError::InvalidData(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for ShieldedError {}

pub(crate) fn blake2b_256(personal: &[u8; 16], data: &[u8]) -> Hash256 {
    let hash = Blake2bParams::new()
        .hash_length(32)
        .personal(personal)
        .hash(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(hash.as_bytes());
    out
}

/// Fingerprint of a hierarchical-deterministic seed. The construction
/// matches the legacy wallet format, so fingerprints stored by older
/// wallets keep resolving.
pub fn hd_seed_fingerprint(seed: &[u8]) -> Hash256 {
    blake2b_256(HD_SEED_FP_PERSONAL, seed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_fingerprint_is_deterministic() {
        let a = hd_seed_fingerprint(&[0u8; 32]);
        let b = hd_seed_fingerprint(&[0u8; 32]);
        assert_eq!(a, b);
        assert_ne!(a, hd_seed_fingerprint(&[1u8; 32]));
    }

    #[test]
    fn seed_fingerprint_depends_on_length() {
        assert_ne!(
            hd_seed_fingerprint(&[7u8; 32]),
            hd_seed_fingerprint(&[7u8; 33])
        );
    }
}
