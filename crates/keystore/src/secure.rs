use zeroize::Zeroize;

/// Byte container for secret material. The backing storage is wiped
/// when the buffer is released, including every clone.
#[derive(Default)]
pub struct SecureBytes {
    inner: Vec<u8>,
}

impl SecureBytes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_slice(bytes: &[u8]) -> Self {
        Self {
            inner: bytes.to_vec(),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        self.inner.as_slice()
    }

    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        self.inner.extend_from_slice(bytes);
    }
}

impl Clone for SecureBytes {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl PartialEq for SecureBytes {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl Eq for SecureBytes {}

impl Drop for SecureBytes {
    fn drop(&mut self) {
        self.inner.zeroize();
    }
}

impl Zeroize for SecureBytes {
    fn zeroize(&mut self) {
        self.inner.zeroize();
    }
}

impl From<Vec<u8>> for SecureBytes {
    fn from(inner: Vec<u8>) -> Self {
        Self { inner }
    }
}

impl From<&[u8]> for SecureBytes {
    fn from(bytes: &[u8]) -> Self {
        Self::from_slice(bytes)
    }
}

impl AsRef<[u8]> for SecureBytes {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl std::fmt::Debug for SecureBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecureBytes({} bytes)", self.inner.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_slice() {
        let mut buf = SecureBytes::new();
        assert!(buf.is_empty());
        buf.extend_from_slice(&[1, 2]);
        buf.extend_from_slice(&[3]);
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn clones_compare_equal() {
        let buf = SecureBytes::from_slice(&[9u8; 16]);
        let copy = buf.clone();
        assert_eq!(buf, copy);
        assert_ne!(buf, SecureBytes::from_slice(&[8u8; 16]));
    }

    #[test]
    fn zeroize_clears_contents() {
        let mut buf = SecureBytes::from_slice(&[0xFF; 8]);
        buf.zeroize();
        assert!(buf.as_slice().iter().all(|&b| b == 0));
    }

    #[test]
    fn debug_does_not_leak_contents() {
        let buf = SecureBytes::from_slice(&[0xAB; 4]);
        let rendered = format!("{buf:?}");
        assert!(!rendered.contains("ab"));
        assert!(rendered.contains("4 bytes"));
    }
}
