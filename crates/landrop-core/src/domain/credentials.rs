//! The registered user's credentials.
//!
//! The password is never stored: at rest the record carries a random salt
//! and a BLAKE3 digest of the salt followed by the password, hex-encoded.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Credentials of the single registered user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub display_name: String,
    pub email: String,
    salt: String,
    password_digest: String,
}

impl Credentials {
    /// Creates credentials for a new registration, generating a fresh salt
    /// and digesting the password.
    pub fn new(
        display_name: impl Into<String>,
        email: impl Into<String>,
        password: &str,
    ) -> Self {
        let salt_bytes = *Uuid::new_v4().as_bytes();
        Self {
            display_name: display_name.into(),
            email: email.into(),
            salt: hex::encode(salt_bytes),
            password_digest: digest(&salt_bytes, password),
        }
    }

    /// Checks an entered password against the stored digest.
    pub fn verify(&self, password: &str) -> bool {
        match hex::decode(&self.salt) {
            Ok(salt_bytes) => digest(&salt_bytes, password) == self.password_digest,
            Err(_) => false,
        }
    }
}

fn digest(salt: &[u8], password: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize().as_bytes())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_accepts_the_registered_password() {
        let creds = Credentials::new("Alice", "alice@example.com", "hunter2!");
        assert!(creds.verify("hunter2!"));
    }

    #[test]
    fn test_verify_rejects_a_wrong_password() {
        let creds = Credentials::new("Alice", "alice@example.com", "hunter2!");
        assert!(!creds.verify("hunter3!"));
        assert!(!creds.verify(""));
    }

    #[test]
    fn test_same_password_digests_differently_per_registration() {
        let a = Credentials::new("Alice", "alice@example.com", "hunter2!");
        let b = Credentials::new("Alice", "alice@example.com", "hunter2!");
        // Fresh salt per registration: equal passwords, distinct digests.
        assert_ne!(a.password_digest, b.password_digest);
    }

    #[test]
    fn test_credentials_round_trip_through_json() {
        let creds = Credentials::new("Alice", "alice@example.com", "hunter2!");
        let json = serde_json::to_string(&creds).unwrap();
        assert!(
            !json.contains("hunter2!"),
            "the password itself must never be serialized"
        );

        let restored: Credentials = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, creds);
        assert!(restored.verify("hunter2!"));
    }
}
