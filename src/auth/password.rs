//! Argon2id credential hashing. Only PHC strings ever reach the store.

use anyhow::Context;
use argon2::{
    password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use lazy_static::lazy_static;
use rand::rngs::OsRng;
use tracing::error;

lazy_static! {
    static ref HASHER: Argon2<'static> = Argon2::default();
    static ref DUMMY_HASH: Option<String> = hash_password("egy360-unknown-account").ok();
}

/// Hashes `plain` with a fresh random salt.
pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    HASHER
        .hash_password(plain.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| anyhow::anyhow!("{e}"))
        .inspect_err(|e| error!(error = %e, "password hashing failed"))
        .context("hash password")
}

/// `Ok(false)` on a mismatch. A stored value that is not a PHC string is an
/// error, not a mismatch.
pub fn verify_password(plain: &str, stored: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(stored).map_err(|e| {
        error!(error = %e, "stored password hash is malformed");
        anyhow::anyhow!("malformed password hash: {e}")
    })?;
    match HASHER.verify_password(plain.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(password_hash::Error::Password) => Ok(false),
        Err(e) => {
            error!(error = %e, "password verification failed");
            Err(anyhow::anyhow!("verify password: {e}"))
        }
    }
}

/// Spends one verification against a throwaway hash so a login for an
/// unknown username costs about as much as one with a wrong password.
pub fn burn_verification(plain: &str) {
    if let Some(hash) = DUMMY_HASH.as_deref() {
        let _ = verify_password(plain, hash);
    }
}
