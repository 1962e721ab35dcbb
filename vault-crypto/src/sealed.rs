//! Anonymous authenticated public-key encryption ("sealed box"): the sender
//! generates an ephemeral X25519 keypair, derives a shared secret with the
//! recipient's static public key, and AEAD-encrypts under it. Used for the
//! `params` request envelope and the `checkKey` challenge (§6.1).

use rand::rngs::OsRng;
use ring::aead;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

use crate::error::Error;

const EPHEMERAL_PK_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// A recipient's long-lived X25519 keypair (a user's or the server's
/// per-account secret key, per §3's `serverKey`/`keyBundle` fields).
pub struct SealedBoxKeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl SealedBoxKeyPair {
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        SealedBoxKeyPair { secret, public }
    }

    pub fn from_secret_bytes(bytes: [u8; 32]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = PublicKey::from(&secret);
        SealedBoxKeyPair { secret, public }
    }

    pub fn public_bytes(&self) -> [u8; 32] {
        self.public.to_bytes()
    }

    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }

    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    /// Opens a box sealed with [`seal`] against this keypair's public key.
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, Error> {
        if sealed.len() < EPHEMERAL_PK_LEN + NONCE_LEN {
            return Err(Error::FormatError);
        }
        let mut ephemeral_pk_bytes = [0u8; EPHEMERAL_PK_LEN];
        ephemeral_pk_bytes.copy_from_slice(&sealed[..EPHEMERAL_PK_LEN]);
        let ephemeral_pk = PublicKey::from(ephemeral_pk_bytes);

        let mut nonce_bytes = [0u8; NONCE_LEN];
        nonce_bytes.copy_from_slice(&sealed[EPHEMERAL_PK_LEN..EPHEMERAL_PK_LEN + NONCE_LEN]);

        let shared = self.secret.diffie_hellman(&ephemeral_pk);
        let key = aead::LessSafeKey::new(
            aead::UnboundKey::new(&aead::AES_256_GCM, shared.as_bytes())
                .map_err(|_| Error::FormatError)?,
        );

        let mut ciphertext = sealed[EPHEMERAL_PK_LEN + NONCE_LEN..].to_vec();
        let plaintext = key
            .open_in_place(
                aead::Nonce::assume_unique_for_key(nonce_bytes),
                aead::Aad::empty(),
                &mut ciphertext,
            )
            .map_err(|_| Error::DecryptFailed)?;
        Ok(plaintext.to_vec())
    }
}

/// Seals `plaintext` for the holder of `recipient_public`. Output layout:
/// `ephemeral_pk(32) || nonce(12) || ciphertext+tag`.
pub fn seal(recipient_public: &PublicKey, plaintext: &[u8]) -> Result<Vec<u8>, Error> {
    let ephemeral_secret = EphemeralSecret::random_from_rng(OsRng);
    let ephemeral_public = PublicKey::from(&ephemeral_secret);
    let shared = ephemeral_secret.diffie_hellman(recipient_public);

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut nonce_bytes);

    let key = aead::LessSafeKey::new(
        aead::UnboundKey::new(&aead::AES_256_GCM, shared.as_bytes())
            .map_err(|_| Error::FormatError)?,
    );
    let mut ciphertext = plaintext.to_vec();
    key.seal_in_place_append_tag(
        aead::Nonce::assume_unique_for_key(nonce_bytes),
        aead::Aad::empty(),
        &mut ciphertext,
    )
    .map_err(|_| Error::FormatError)?;

    let mut out = Vec::with_capacity(EPHEMERAL_PK_LEN + NONCE_LEN + ciphertext.len());
    out.extend_from_slice(ephemeral_public.as_bytes());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

pub fn public_key_from_bytes(bytes: [u8; 32]) -> PublicKey {
    PublicKey::from(bytes)
}
