//! Password verification seam for the username/password login path.

/// Verifies and produces password hashes. Production deployments plug
/// in their KDF of choice; the crate only needs the boolean answer.
pub trait PasswordVerifier: Send + Sync {
    fn verify(&self, password: &str, hash: &str) -> bool;
    fn hash(&self, password: &str) -> String;
}

/// Unsalted digest verifier for tests and local embedding. Not a KDF.
#[derive(Clone, Debug, Default)]
pub struct DigestPasswordVerifier;

impl PasswordVerifier for DigestPasswordVerifier {
    fn verify(&self, password: &str, hash: &str) -> bool {
        self.hash(password) == hash
    }

    fn hash(&self, password: &str) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(password.as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::{DigestPasswordVerifier, PasswordVerifier};

    #[test]
    fn verify_accepts_matching_password() {
        let verifier = DigestPasswordVerifier;
        let hash = verifier.hash("s3cret");
        assert!(verifier.verify("s3cret", &hash));
        assert!(!verifier.verify("wrong", &hash));
    }

    #[test]
    fn hash_is_stable_hex() {
        let verifier = DigestPasswordVerifier;
        let hash = verifier.hash("s3cret");
        assert_eq!(hash, verifier.hash("s3cret"));
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
