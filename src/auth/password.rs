/// Credential Hashing and Verification
///
/// bcrypt with a cost factor fixed at construction. Used for login passwords
/// and for refresh tokens at rest. The work runs on tokio's blocking pool so a
/// slow hash never stalls unrelated requests.

use std::sync::Arc;

use bcrypt::{hash, verify};
use tokio::sync::OnceCell;

const DECOY_SECRET: &str = "decoy-secret-never-issued";

/// Error raised when bcrypt cannot produce a hash
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct HashError(pub String);

/// Salted one-way hasher for passwords and refresh tokens
#[derive(Debug, Clone)]
pub struct CredentialHasher {
    cost: u32,
    // Hashed on first use at the same cost as real credentials
    decoy: Arc<OnceCell<String>>,
}

impl CredentialHasher {
    /// Create a hasher with the given bcrypt cost (4..=31)
    pub fn new(cost: u32) -> Self {
        Self {
            cost,
            decoy: Arc::new(OnceCell::new()),
        }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Hash a secret
    ///
    /// # Errors
    /// Returns error if bcrypt fails or the blocking task is lost
    pub async fn hash(&self, secret: &str) -> Result<String, HashError> {
        let secret = secret.to_owned();
        let cost = self.cost;

        tokio::task::spawn_blocking(move || hash(secret, cost))
            .await
            .map_err(|e| HashError(format!("hashing task failed: {}", e)))?
            .map_err(|e| HashError(e.to_string()))
    }

    /// Check a secret against a stored hash.
    ///
    /// Malformed hashes and lost tasks count as a mismatch; this never errors.
    pub async fn verify(&self, secret: &str, hashed: &str) -> bool {
        let secret = secret.to_owned();
        let hashed = hashed.to_owned();

        match tokio::task::spawn_blocking(move || verify(secret, &hashed)).await {
            Ok(Ok(matches)) => matches,
            Ok(Err(_)) => false,
            Err(e) => {
                tracing::error!(error = %e, "Verification task failed");
                false
            }
        }
    }

    /// Spend one verification's worth of work on a secret that has no stored
    /// hash to check against. Always false.
    pub async fn verify_against_decoy(&self, secret: &str) -> bool {
        match self.decoy.get_or_try_init(|| self.hash(DECOY_SECRET)).await {
            Ok(decoy) => {
                self.verify(secret, decoy).await;
            }
            Err(e) => tracing::error!(error = %e, "Failed to prepare decoy hash"),
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> CredentialHasher {
        CredentialHasher::new(4 /* bcrypt minimum cost */)
    }

    #[tokio::test]
    async fn test_hash_is_not_plaintext() {
        let hash = hasher().hash("ValidPassword123").await.expect("Failed to hash");

        assert_ne!(hash, "ValidPassword123");
        assert!(hash.starts_with("$2"));
    }

    #[tokio::test]
    async fn test_hash_is_salted() {
        let first = hasher().hash("same-secret").await.unwrap();
        let second = hasher().hash("same-secret").await.unwrap();

        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_verify() {
        let hasher = hasher();
        let hash = hasher.hash("pw1").await.unwrap();

        assert!(hasher.verify("pw1", &hash).await);
        assert!(!hasher.verify("pw2", &hash).await);
    }

    #[tokio::test]
    async fn test_decoy_never_matches() {
        let hasher = hasher();

        assert!(!hasher.verify_against_decoy("pw1").await);
        assert!(!hasher.verify_against_decoy(DECOY_SECRET).await);
    }

    #[tokio::test]
    async fn test_decoy_is_hashed_once_at_configured_cost() {
        let hasher = hasher();
        hasher.verify_against_decoy("pw1").await;
        let first = hasher.decoy.get().cloned().expect("Decoy should be prepared");

        hasher.clone().verify_against_decoy("pw2").await;

        assert_eq!(hasher.decoy.get(), Some(&first));
        assert!(first.starts_with(&format!("$2b${:02}$", 4 /* bcrypt minimum cost */)));
    }

    #[tokio::test]
    async fn test_verify_malformed_hash_is_false() {
        let hasher = hasher();

        assert!(!hasher.verify("pw1", "not-a-bcrypt-hash").await);
        assert!(!hasher.verify("pw1", "").await);
    }
}
