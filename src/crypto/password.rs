use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
    Algorithm, Argon2, ParamsBuilder, Version,
};
use zeroize::Zeroizing;

use crate::error::{AppError, Result};

/// The memory cost for Argon2 in MB.
const ARGON2_MEMORY_MB: u32 = 19;
/// The number of iterations for Argon2.
const ARGON2_ITERATIONS: u32 = 3;
/// The parallelism factor for Argon2.
const ARGON2_PARALLELISM: u32 = 2;

/// Server-side password hashing.
///
/// Every hash gets a random per-user salt; the server-wide salt from the
/// configuration is mixed in as the Argon2 secret, so a leaked `users` table
/// alone is not enough to run a dictionary attack.
#[derive(Clone)]
pub struct PasswordHasher {
    server_salt: Zeroizing<Vec<u8>>,
}

impl PasswordHasher {
    /// Creates a hasher bound to the given server salt.
    pub fn new(server_salt: &[u8]) -> Self {
        Self {
            server_salt: Zeroizing::new(server_salt.to_vec()),
        }
    }

    fn argon2(&self) -> Result<Argon2<'_>> {
        let params = ParamsBuilder::new()
            .m_cost(ARGON2_MEMORY_MB * 1024)
            .t_cost(ARGON2_ITERATIONS)
            .p_cost(ARGON2_PARALLELISM)
            .build()
            .map_err(|e| AppError::Internal(format!("Argon2 params: {}", e)))?;

        Argon2::new_with_secret(&self.server_salt, Algorithm::Argon2id, Version::V0x13, params)
            .map_err(|e| AppError::Internal(format!("Argon2 setup: {}", e)))
    }

    /// Hashes a password into a PHC string.
    pub fn hash(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()?
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AppError::Internal(format!("Argon2 hash error: {}", e)))?
            .to_string();

        tracing::debug!("Password hashed successfully with Argon2");
        Ok(hash)
    }

    /// Verifies a password against a PHC string produced by [`PasswordHasher::hash`].
    pub fn verify(&self, password: &str, hash: &str) -> Result<bool> {
        let parsed = PasswordHash::new(hash)
            .map_err(|e| AppError::Internal(format!("Hash parse error: {}", e)))?;

        Ok(self
            .argon2()?
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }
}
