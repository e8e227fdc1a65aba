pub mod encoding;
pub mod hash;

/// 32-byte identifier used throughout the wallet: fingerprints,
/// serialize-hashes and caller-supplied record handles.
pub type Hash256 = [u8; 32];
