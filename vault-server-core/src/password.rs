//! Server-side password hashing. §1's Non-goals explicitly exclude tuning
//! the KDF's parameters — the choice of algorithm here is the minimum
//! needed to make `login`/`createAccount` concrete; callers should treat
//! this module as the opaque utility spec.md describes, not a tunable.

use argon2::password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString};
use argon2::Argon2;
use rand::rngs::OsRng;

use crate::error::{Error, Result};

pub fn hash(password: &str) -> Result<Vec<u8>> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|_| Error::FormatError)?;
    Ok(hash.to_string().into_bytes())
}

pub fn verify(stored: &[u8], password: &str) -> Result<()> {
    let encoded = std::str::from_utf8(stored).map_err(|_| Error::FormatError)?;
    let parsed = PasswordHash::new(encoded).map_err(|_| Error::FormatError)?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| Error::BadPassword)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify_round_trips() {
        let hashed = hash("correct horse battery staple").unwrap();
        assert!(verify(&hashed, "correct horse battery staple").is_ok());
        assert!(matches!(
            verify(&hashed, "wrong password"),
            Err(Error::BadPassword)
        ));
    }
}
