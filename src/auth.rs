use sha2::{Digest, Sha256};

/// Hash an access token for session lookup (SHA-256 hex).
/// Only the hash is ever stored.
pub fn hash_access_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    let out = hasher.finalize();
    hex::encode(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_hash_is_stable_hex() {
        let h = hash_access_token("patient-token");
        assert_eq!(h.len(), 64);
        assert_eq!(h, hash_access_token("patient-token"));
        assert_ne!(h, hash_access_token("doctor-token"));
    }
}
