use argon2::Argon2;
use password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};

/// Hash a trimmed password into a PHC string. Raw passwords are never stored.
pub fn hash_password(raw: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut password_hash::rand_core::OsRng);
    let hash = Argon2::default()
        .hash_password(raw.trim().as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("hash_password failed: {e}"))?
        .to_string();
    Ok(hash)
}

/// A stored hash that doesn't parse never matches.
pub fn verify_password(raw: &str, stored: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored) else {
        return false;
    };
    Argon2::default()
        .verify_password(raw.trim().as_bytes(), &parsed)
        .is_ok()
}
