//! AES-256-CBC primitive and the legacy passphrase KDF.
//!
//! Record IVs are the first 16 bytes of the record's 32-byte
//! identifier, so a given (identifier, master key) pair always
//! reproduces the same ciphertext. Identifiers must therefore be
//! unique per logical secret; caller-supplied handles share this
//! obligation.

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use sha2::{Digest, Sha512};
use zeroize::Zeroize;

use zvault_primitives::Hash256;

use crate::{KeyStoreError, SecureBytes};

pub const WALLET_CRYPTO_KEY_SIZE: usize = 32;
pub const WALLET_CRYPTO_IV_SIZE: usize = 16;
pub const WALLET_CRYPTO_SALT_SIZE: usize = 8;
pub const AES_BLOCK_SIZE: usize = 16;

/// The only supported derivation method: iterated SHA-512 over
/// passphrase and salt, as produced by the historical
/// `EVP_BytesToKey(AES-256-CBC, SHA-512)` construction.
pub const KDF_METHOD_SHA512: u32 = 0;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

pub struct Crypter {
    key: [u8; WALLET_CRYPTO_KEY_SIZE],
    iv: [u8; WALLET_CRYPTO_IV_SIZE],
    keyed: bool,
}

impl Default for Crypter {
    fn default() -> Self {
        Self::new()
    }
}

impl Crypter {
    pub fn new() -> Self {
        Self {
            key: [0u8; WALLET_CRYPTO_KEY_SIZE],
            iv: [0u8; WALLET_CRYPTO_IV_SIZE],
            keyed: false,
        }
    }

    /// Derives key and IV from a passphrase. The output is
    /// bit-identical to wallets written by the legacy implementation.
    pub fn set_key_from_passphrase(
        &mut self,
        passphrase: &[u8],
        salt: &[u8],
        rounds: u32,
        method: u32,
    ) -> Result<(), KeyStoreError> {
        if rounds < 1 {
            return Err(KeyStoreError::BadParameter("kdf rounds must be at least 1"));
        }
        if salt.len() != WALLET_CRYPTO_SALT_SIZE {
            return Err(KeyStoreError::BadParameter("kdf salt must be 8 bytes"));
        }
        if method != KDF_METHOD_SHA512 {
            return Err(KeyStoreError::BadParameter("unknown kdf method"));
        }

        // One SHA-512 block covers key (32) + IV (16); the first
        // digest absorbs passphrase and salt, the rest re-hash it.
        let mut hasher = Sha512::new();
        hasher.update(passphrase);
        hasher.update(salt);
        let mut buf: [u8; 64] = hasher.finalize().into();
        for _ in 1..rounds {
            buf = Sha512::digest(buf).into();
        }

        self.key.copy_from_slice(&buf[..WALLET_CRYPTO_KEY_SIZE]);
        self.iv
            .copy_from_slice(&buf[WALLET_CRYPTO_KEY_SIZE..WALLET_CRYPTO_KEY_SIZE + WALLET_CRYPTO_IV_SIZE]);
        buf.zeroize();
        self.keyed = true;
        Ok(())
    }

    pub fn set_key(&mut self, key: &[u8], iv: &[u8]) -> Result<(), KeyStoreError> {
        if key.len() != WALLET_CRYPTO_KEY_SIZE {
            return Err(KeyStoreError::BadParameter("cipher key must be 32 bytes"));
        }
        if iv.len() != WALLET_CRYPTO_IV_SIZE {
            return Err(KeyStoreError::BadParameter("cipher iv must be 16 bytes"));
        }
        self.key.copy_from_slice(key);
        self.iv.copy_from_slice(iv);
        self.keyed = true;
        Ok(())
    }

    pub fn is_keyed(&self) -> bool {
        self.keyed
    }

    /// PKCS#7-padded CBC encryption. Output length is the plaintext
    /// length rounded up to the next block boundary.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, KeyStoreError> {
        if !self.keyed {
            return Err(KeyStoreError::NotKeyed);
        }
        let cipher = Aes256CbcEnc::new(&self.key.into(), &self.iv.into());
        Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
    }

    /// Inverse of `encrypt`. Fails on truncated input and on invalid
    /// padding; the error is deliberately uninformative.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<SecureBytes, KeyStoreError> {
        if !self.keyed {
            return Err(KeyStoreError::NotKeyed);
        }
        if ciphertext.is_empty() || ciphertext.len() % AES_BLOCK_SIZE != 0 {
            return Err(KeyStoreError::CipherFailure);
        }
        let cipher = Aes256CbcDec::new(&self.key.into(), &self.iv.into());
        let plaintext = cipher
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| KeyStoreError::CipherFailure)?;
        Ok(SecureBytes::from(plaintext))
    }
}

impl Drop for Crypter {
    fn drop(&mut self) {
        self.key.zeroize();
        self.iv.zeroize();
        self.keyed = false;
    }
}

/// Encrypts one record's plaintext under the master key, with the IV
/// taken from the leading bytes of the record identifier.
pub fn encrypt_secret(
    master: &SecureBytes,
    plaintext: &SecureBytes,
    identifier: &Hash256,
) -> Result<Vec<u8>, KeyStoreError> {
    let mut crypter = Crypter::new();
    crypter.set_key(master.as_slice(), &identifier[..WALLET_CRYPTO_IV_SIZE])?;
    crypter.encrypt(plaintext.as_slice())
}

pub fn decrypt_secret(
    master: &SecureBytes,
    ciphertext: &[u8],
    identifier: &Hash256,
) -> Result<SecureBytes, KeyStoreError> {
    let mut crypter = Crypter::new();
    crypter.set_key(master.as_slice(), &identifier[..WALLET_CRYPTO_IV_SIZE])?;
    crypter.decrypt(ciphertext)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyed_crypter() -> Crypter {
        let mut crypter = Crypter::new();
        crypter.set_key(&[0x42; 32], &[0x24; 16]).unwrap();
        crypter
    }

    #[test]
    fn rejects_bad_kdf_parameters() {
        let mut crypter = Crypter::new();
        assert_eq!(
            crypter.set_key_from_passphrase(b"pw", &[0u8; 8], 0, KDF_METHOD_SHA512),
            Err(KeyStoreError::BadParameter("kdf rounds must be at least 1"))
        );
        assert_eq!(
            crypter.set_key_from_passphrase(b"pw", &[0u8; 7], 1, KDF_METHOD_SHA512),
            Err(KeyStoreError::BadParameter("kdf salt must be 8 bytes"))
        );
        assert_eq!(
            crypter.set_key_from_passphrase(b"pw", &[0u8; 8], 1, 1),
            Err(KeyStoreError::BadParameter("unknown kdf method"))
        );
        assert!(!crypter.is_keyed());
    }

    #[test]
    fn unkeyed_cipher_fails() {
        let crypter = Crypter::new();
        assert_eq!(crypter.encrypt(b"data"), Err(KeyStoreError::NotKeyed));
        assert!(matches!(
            crypter.decrypt(&[0u8; 16]),
            Err(KeyStoreError::NotKeyed)
        ));
    }

    #[test]
    fn roundtrip_various_lengths() {
        let crypter = keyed_crypter();
        for len in [0usize, 1, 15, 16, 17, 32, 100] {
            let plaintext = vec![0x5Au8; len];
            let ciphertext = crypter.encrypt(&plaintext).unwrap();
            assert_eq!(ciphertext.len(), len + (AES_BLOCK_SIZE - len % AES_BLOCK_SIZE));
            let decrypted = crypter.decrypt(&ciphertext).unwrap();
            assert_eq!(decrypted.as_slice(), plaintext.as_slice());
        }
    }

    #[test]
    fn decrypt_rejects_truncated_input() {
        let crypter = keyed_crypter();
        let ciphertext = crypter.encrypt(b"some plaintext").unwrap();
        assert_eq!(
            crypter.decrypt(&ciphertext[..ciphertext.len() - 1]),
            Err(KeyStoreError::CipherFailure)
        );
        assert_eq!(crypter.decrypt(&[]), Err(KeyStoreError::CipherFailure));
    }

    #[test]
    fn decrypt_rejects_bad_padding() {
        let crypter = keyed_crypter();
        let mut ciphertext = crypter.encrypt(b"abc").unwrap();
        let last = ciphertext.len() - 1;
        ciphertext[last] ^= 0xFF;
        assert_eq!(
            crypter.decrypt(&ciphertext),
            Err(KeyStoreError::CipherFailure)
        );
    }

    #[test]
    fn secret_helpers_use_identifier_prefix_as_iv() {
        let master = SecureBytes::from_slice(&[0xAA; 32]);
        let plaintext = SecureBytes::from_slice(&[0x01; 32]);

        let mut id_a = [0u8; 32];
        id_a[20] = 7;
        let mut id_b = [0u8; 32];
        id_b[20] = 9;
        // Identifiers differing only beyond the IV prefix produce the
        // same ciphertext; a different prefix changes it.
        let ct_a = encrypt_secret(&master, &plaintext, &id_a).unwrap();
        let ct_b = encrypt_secret(&master, &plaintext, &id_b).unwrap();
        assert_eq!(ct_a, ct_b);

        let mut id_c = [0u8; 32];
        id_c[0] = 1;
        let ct_c = encrypt_secret(&master, &plaintext, &id_c).unwrap();
        assert_ne!(ct_a, ct_c);

        let roundtrip = decrypt_secret(&master, &ct_a, &id_a).unwrap();
        assert_eq!(roundtrip, plaintext);
    }
}
