use ripemd::{Digest as RipemdDigest, Ripemd160};
use sha2::Sha256;

use crate::Hash256;

pub fn sha256(data: &[u8]) -> Hash256 {
    let digest = Sha256::digest(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Double SHA-256, the serialize-hash used for record identifiers.
pub fn sha256d(data: &[u8]) -> Hash256 {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    let mut out = [0u8; 32];
    out.copy_from_slice(&second);
    out
}

pub fn hash160(data: &[u8]) -> [u8; 20] {
    let sha = sha256(data);
    let digest = Ripemd160::digest(sha);
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256d_empty_input() {
        // Double SHA-256 of the empty string.
        let expected = "5df6e0e2761359d30a8275058e299fcc0381534545f55cf43e41983f5d4c9456";
        let mut rendered = String::new();
        for byte in sha256d(b"") {
            rendered.push_str(&format!("{byte:02x}"));
        }
        assert_eq!(rendered, expected);
    }

    #[test]
    fn hash160_known_vector() {
        // hash160 of the generator-point compressed pubkey.
        let pubkey: Vec<u8> = {
            let hex = "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";
            (0..hex.len())
                .step_by(2)
                .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).unwrap())
                .collect()
        };
        let mut rendered = String::new();
        for byte in hash160(&pubkey) {
            rendered.push_str(&format!("{byte:02x}"));
        }
        assert_eq!(rendered, "751e76e8199196d454941c45d1b3a323f1433bd6");
    }
}
