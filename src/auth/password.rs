//! Argon2id password hashing
//!
//! Hashing and verification are CPU-bound; both run on the blocking pool so a
//! login burst cannot stall the connection tasks.

use argon2::{
    password_hash::{
        self, rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
    },
    Argon2,
};
use tokio::task;

use crate::types::AppError;

fn hash_blocking(password: &[u8]) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password, &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {e}")))
}

fn verify_blocking(password: &[u8], stored: &str) -> Result<bool, AppError> {
    let parsed = PasswordHash::new(stored)
        .map_err(|e| AppError::Internal(format!("Stored hash is not a PHC string: {e}")))?;

    match Argon2::default().verify_password(password, &parsed) {
        Ok(()) => Ok(true),
        Err(password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AppError::Internal(format!("Password verification failed: {e}"))),
    }
}

fn joined<T>(result: Result<Result<T, AppError>, task::JoinError>) -> Result<T, AppError> {
    result.map_err(|e| AppError::Internal(format!("Password task failed: {e}")))?
}

/// Hash `password` into a PHC string carrying its salt and parameters
pub async fn hash_password(password: &str) -> Result<String, AppError> {
    let password = password.to_owned();
    joined(task::spawn_blocking(move || hash_blocking(password.as_bytes())).await)
}

/// Check `password` against a stored PHC hash. A malformed stored hash is a
/// server fault, not a wrong password.
pub async fn verify_password(password: &str, stored: &str) -> Result<bool, AppError> {
    let (password, stored) = (password.to_owned(), stored.to_owned());
    joined(task::spawn_blocking(move || verify_blocking(password.as_bytes(), &stored)).await)
}
