//! Password hashing with bcrypt

use bcrypt::{hash, verify};

/// Salted one-way password hashing
///
/// The cost factor comes from config and is tuned so a verification takes tens
/// of milliseconds in production; tests use a low cost to stay fast.
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    /// Hashes with a fresh random salt on every call.
    pub fn hash(&self, password: &str) -> Result<String, bcrypt::BcryptError> {
        hash(password, self.cost)
    }

    /// Constant-time comparison; a malformed hash is just a mismatch.
    pub fn verify(&self, password: &str, hash: &str) -> bool {
        verify(password, hash).unwrap_or(false)
    }
}
