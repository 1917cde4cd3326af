use sha2::{Digest, Sha256};

use crate::crypto::aes::SecretKey;

/// Derives the per-user content key from `login || password`.
///
/// Deterministic and unsalted: the same pair always yields the same key, so a
/// client can re-derive it on every login without storing it anywhere.
pub fn derive_key(login: &str, password: &str) -> SecretKey {
    let mut hasher = Sha256::new();
    hasher.update(login.as_bytes());
    hasher.update(password.as_bytes());
    SecretKey::new(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::aes;

    #[test]
    fn same_pair_same_key() {
        assert_eq!(derive_key("alice", "pw1"), derive_key("alice", "pw1"));
    }

    #[test]
    fn different_pairs_differ() {
        assert_ne!(derive_key("alice", "pw1"), derive_key("alice", "pw2"));
        assert_ne!(derive_key("alice", "pw1"), derive_key("bob", "pw1"));
    }

    #[test]
    fn derived_keys_separate_ciphertexts() {
        let alice = derive_key("alice", "pw1");
        let mallory = derive_key("alice", "pw1!");
        let sealed = aes::encrypt(b"card", &alice).unwrap();
        assert!(aes::decrypt(&sealed, &mallory).is_err());
        assert_eq!(aes::decrypt(&sealed, &alice).unwrap(), b"card");
    }
}
