//! The server's signing keypair (`serverSignKey` in the user record),
//! used to authenticate issued session tokens. Algorithm choice for the
//! tokens themselves is intentionally out of scope; this only needs to
//! demonstrate that a token carrying a stale `seq` can be told apart from
//! a fresh one, which the caller enforces by comparing `TokenClaims.seq`
//! against the user's current `tokenSeq`.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;

pub struct SigningKeyPair(SigningKey);

impl SigningKeyPair {
    pub fn generate() -> Self {
        SigningKeyPair(SigningKey::generate(&mut OsRng))
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        SigningKeyPair(SigningKey::from_bytes(&bytes))
    }

    pub fn secret_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.0.verifying_key()
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        self.0.sign(message)
    }
}

pub fn verify(public: &VerifyingKey, message: &[u8], signature: &Signature) -> bool {
    public.verify(message, signature).is_ok()
}
