//! Sapling extended keys, wrapped around their 169-byte ZIP-32
//! encodings. Wrappers validate on construction so the derived
//! fingerprint and incoming viewing key are always available.

use sapling_crypto::zip32::{ExtendedFullViewingKey, ExtendedSpendingKey};
use sapling_crypto::PaymentAddress;
use zeroize::{Zeroize, ZeroizeOnDrop};
use zip32::DiversifierIndex;

use zvault_primitives::hash::sha256d;
use zvault_primitives::Hash256;

use crate::{blake2b_256, ShieldedError};

pub const SAPLING_EXTENDED_KEY_SIZE: usize = 169;
pub const SAPLING_ADDRESS_SIZE: usize = 43;
pub const DIVERSIFIER_PATH_SIZE: usize = 11;

const SAPLING_FVK_FP_PERSONAL: &[u8; 16] = b"ZcashSaplingFVFP";

/// 88-bit diversifier path selecting one payment address out of the
/// address space of a single incoming viewing key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct DiversifierPath(pub [u8; DIVERSIFIER_PATH_SIZE]);

impl DiversifierPath {
    pub fn zero() -> Self {
        Self([0u8; DIVERSIFIER_PATH_SIZE])
    }

    pub fn as_bytes(&self) -> &[u8; DIVERSIFIER_PATH_SIZE] {
        &self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct SaplingIncomingViewingKey(pub [u8; 32]);

impl SaplingIncomingViewingKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct SaplingPaymentAddress([u8; SAPLING_ADDRESS_SIZE]);

impl SaplingPaymentAddress {
    pub fn from_bytes(bytes: &[u8; SAPLING_ADDRESS_SIZE]) -> Result<Self, ShieldedError> {
        if PaymentAddress::from_bytes(bytes).is_none() {
            return Err(ShieldedError::InvalidData(
                "invalid sapling payment address encoding",
            ));
        }
        Ok(Self(*bytes))
    }

    pub fn to_bytes(&self) -> [u8; SAPLING_ADDRESS_SIZE] {
        self.0
    }

    /// Serialize-hash of the address, the identifier under which
    /// address records are encrypted.
    pub fn hash(&self) -> Hash256 {
        sha256d(&self.0)
    }
}

/// Extended full viewing key. Fingerprint and incoming viewing key
/// are computed once at construction.
#[derive(Clone)]
pub struct SaplingExtendedFullViewingKey {
    bytes: [u8; SAPLING_EXTENDED_KEY_SIZE],
    fingerprint: Hash256,
    ivk: SaplingIncomingViewingKey,
}

impl SaplingExtendedFullViewingKey {
    pub fn from_bytes(bytes: &[u8; SAPLING_EXTENDED_KEY_SIZE]) -> Result<Self, ShieldedError> {
        let extfvk = ExtendedFullViewingKey::read(bytes.as_slice())
            .map_err(|_| ShieldedError::InvalidData("invalid sapling viewing key encoding"))?;
        let mut fvk_bytes = Vec::with_capacity(96);
        extfvk
            .fvk
            .write(&mut fvk_bytes)
            .map_err(|_| ShieldedError::InvalidData("invalid sapling viewing key encoding"))?;
        let fingerprint = blake2b_256(SAPLING_FVK_FP_PERSONAL, &fvk_bytes);
        let ivk = SaplingIncomingViewingKey(extfvk.fvk.vk.ivk().to_repr());
        Ok(Self {
            bytes: *bytes,
            fingerprint,
            ivk,
        })
    }

    pub fn to_bytes(&self) -> [u8; SAPLING_EXTENDED_KEY_SIZE] {
        self.bytes
    }

    /// BLAKE2b fingerprint of the embedded full viewing key; used as
    /// the identifier for every record keyed by this viewing key.
    pub fn fingerprint(&self) -> Hash256 {
        self.fingerprint
    }

    pub fn ivk(&self) -> SaplingIncomingViewingKey {
        self.ivk
    }

    /// First valid payment address at or after the zero diversifier.
    pub fn default_address(
        &self,
    ) -> Result<(DiversifierPath, SaplingPaymentAddress), ShieldedError> {
        self.address_at(DiversifierPath::zero())
    }

    pub fn address_at(
        &self,
        start: DiversifierPath,
    ) -> Result<(DiversifierPath, SaplingPaymentAddress), ShieldedError> {
        let extfvk = ExtendedFullViewingKey::read(self.bytes.as_slice())
            .map_err(|_| ShieldedError::InvalidData("invalid sapling viewing key encoding"))?;
        let dfvk = extfvk.to_diversifiable_full_viewing_key();
        let (index, address) = dfvk
            .find_address(DiversifierIndex::from(*start.as_bytes()))
            .ok_or(ShieldedError::InvalidData(
                "sapling diversifier space exhausted",
            ))?;
        let address = SaplingPaymentAddress(address.to_bytes());
        Ok((DiversifierPath(*index.as_bytes()), address))
    }
}

impl PartialEq for SaplingExtendedFullViewingKey {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for SaplingExtendedFullViewingKey {}

impl PartialOrd for SaplingExtendedFullViewingKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SaplingExtendedFullViewingKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.bytes.cmp(&other.bytes)
    }
}

impl std::fmt::Debug for SaplingExtendedFullViewingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SaplingExtendedFullViewingKey(fp: ")?;
        for byte in &self.fingerprint[..4] {
            write!(f, "{byte:02x}")?;
        }
        write!(f, "..)")
    }
}

/// Extended spending key in its 169-byte ZIP-32 encoding.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SaplingExtendedSpendingKey {
    bytes: [u8; SAPLING_EXTENDED_KEY_SIZE],
}

impl SaplingExtendedSpendingKey {
    /// ZIP-32 master key for a seed. Used when minting new accounts.
    pub fn master(seed: &[u8]) -> Self {
        let extsk = ExtendedSpendingKey::master(seed);
        Self {
            bytes: extsk.to_bytes(),
        }
    }

    pub fn from_bytes(bytes: &[u8; SAPLING_EXTENDED_KEY_SIZE]) -> Result<Self, ShieldedError> {
        ExtendedSpendingKey::from_bytes(bytes)
            .map_err(|_| ShieldedError::InvalidData("invalid sapling spending key encoding"))?;
        Ok(Self { bytes: *bytes })
    }

    pub fn to_bytes(&self) -> [u8; SAPLING_EXTENDED_KEY_SIZE] {
        self.bytes
    }

    pub fn to_extfvk(&self) -> Result<SaplingExtendedFullViewingKey, ShieldedError> {
        let extsk = ExtendedSpendingKey::from_bytes(&self.bytes)
            .map_err(|_| ShieldedError::InvalidData("invalid sapling spending key encoding"))?;
        #[allow(deprecated)]
        let extfvk = extsk.to_extended_full_viewing_key();
        let mut buf = Vec::with_capacity(SAPLING_EXTENDED_KEY_SIZE);
        extfvk
            .write(&mut buf)
            .map_err(|_| ShieldedError::InvalidData("invalid sapling viewing key encoding"))?;
        let bytes: [u8; SAPLING_EXTENDED_KEY_SIZE] = buf
            .as_slice()
            .try_into()
            .map_err(|_| ShieldedError::InvalidData("invalid sapling viewing key encoding"))?;
        SaplingExtendedFullViewingKey::from_bytes(&bytes)
    }
}

impl std::fmt::Debug for SaplingExtendedSpendingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SaplingExtendedSpendingKey(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key(seed_byte: u8) -> SaplingExtendedSpendingKey {
        SaplingExtendedSpendingKey::master(&[seed_byte; 32])
    }

    #[test]
    fn spending_key_bytes_roundtrip() {
        let sk = test_key(1);
        let restored = SaplingExtendedSpendingKey::from_bytes(&sk.to_bytes()).unwrap();
        assert_eq!(sk, restored);
    }

    #[test]
    fn extfvk_roundtrip_preserves_fingerprint() {
        let extfvk = test_key(2).to_extfvk().unwrap();
        let restored = SaplingExtendedFullViewingKey::from_bytes(&extfvk.to_bytes()).unwrap();
        assert_eq!(extfvk.fingerprint(), restored.fingerprint());
        assert_eq!(extfvk.ivk(), restored.ivk());
    }

    #[test]
    fn distinct_seeds_distinct_fingerprints() {
        let a = test_key(3).to_extfvk().unwrap();
        let b = test_key(4).to_extfvk().unwrap();
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.ivk(), b.ivk());
    }

    #[test]
    fn default_address_is_stable() {
        let extfvk = test_key(5).to_extfvk().unwrap();
        let (path1, addr1) = extfvk.default_address().unwrap();
        let (path2, addr2) = extfvk.default_address().unwrap();
        assert_eq!(path1, path2);
        assert_eq!(addr1, addr2);
        assert_eq!(
            SaplingPaymentAddress::from_bytes(&addr1.to_bytes()).unwrap(),
            addr1
        );
    }
}
