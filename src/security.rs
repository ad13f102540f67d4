//! Wrappers for credential material held in process memory.

use zeroize::{Zeroize, ZeroizeOnDrop};

/// String whose contents are wiped when dropped.
///
/// The token secret keys every token the gateway issues and the password
/// hash is the whole admin identity; both live for the process lifetime,
/// so their backing memory is zeroed rather than just freed.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecureString(String);

impl SecureString {
    pub fn new(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl From<String> for SecureString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secure_string() {
        let s = SecureString::new("secret".to_string());
        assert_eq!(s.as_str(), "secret");
        assert_eq!(s.as_bytes(), b"secret");
        drop(s);
    }
}
