use anyhow::{Result, anyhow};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use rand::Rng;

const SALT_BYTES: usize = 16;

/// Hash a password into an Argon2id PHC string with a fresh random salt.
pub fn hash_password(password: &str) -> Result<String> {
    let bytes: [u8; SALT_BYTES] = rand::rng().random();
    let salt = SaltString::encode_b64(&bytes).map_err(|e| anyhow!("failed to encode salt: {e}"))?;
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("failed to hash password: {e}"))?;
    Ok(hash.to_string())
}

/// Check a password against a stored PHC string. A stored value that does
/// not parse as a hash never matches.
pub fn verify_password(password: &str, stored: &str) -> Result<bool> {
    let Ok(parsed) = PasswordHash::new(stored) else {
        return Ok(false);
    };
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(anyhow!("failed to verify password: {e}")),
    }
}
