use hmac::{Hmac, Mac};
use rand::RngCore;
use ring::aead;
use sha2::Sha256;
use std::io::{Read, Write};
use std::num::NonZeroU32;
use std::path::Path;
use zeroize::Zeroizing;

use crate::error::Error;
use crate::file_key::FileKey;
use crate::record;

const ENVELOPE_VERSION: u8 = 1;
const SALT_LEN: usize = 16;
const AEAD_NONCE_LEN: usize = 12;
const MASTER_KEY_LEN: usize = 32;
const ITER_NORMAL: u32 = 200_000;
const ITER_EMPTY_PASSPHRASE: u32 = 10;
const WRAPPED_KEY_LEN: usize = 96;

type HmacSha256 = Hmac<Sha256>;

/// The 256-bit root key. Wrapped by a passphrase-derived key at rest
/// ([`MasterKey::save`]/[`MasterKey::read`]); used directly to deterministically
/// hash logical names ([`MasterKey::hash`]) and to wrap/unwrap per-file keys
/// ([`MasterKey::encrypt`]/[`MasterKey::decrypt`]).
#[derive(Clone)]
pub struct MasterKey(Zeroizing<[u8; MASTER_KEY_LEN]>);

impl MasterKey {
    pub fn generate() -> Self {
        let mut bytes = [0u8; MASTER_KEY_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        MasterKey(Zeroizing::new(bytes))
    }

    pub fn from_bytes(bytes: [u8; MASTER_KEY_LEN]) -> Self {
        MasterKey(Zeroizing::new(bytes))
    }

    fn kek_iterations(passphrase: &str) -> u32 {
        if passphrase.is_empty() {
            ITER_EMPTY_PASSPHRASE
        } else {
            ITER_NORMAL
        }
    }

    fn derive_kek(passphrase: &str, salt: &[u8; SALT_LEN], iterations: u32) -> [u8; 32] {
        let mut kek = [0u8; 32];
        ring::pbkdf2::derive(
            ring::pbkdf2::PBKDF2_HMAC_SHA256,
            NonZeroU32::new(iterations).expect("iteration count is always positive"),
            salt,
            passphrase.as_bytes(),
            &mut kek,
        );
        kek
    }

    /// Writes the versioned envelope described in the persistent-state layout:
    /// `version(1) | salt(16) | iter(4 LE) | nonce(12) | ciphertext+tag`.
    pub fn save(&self, passphrase: &str, path: &Path) -> Result<(), Error> {
        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        let iterations = Self::kek_iterations(passphrase);
        let kek = Self::derive_kek(passphrase, &salt, iterations);

        let mut nonce_bytes = [0u8; AEAD_NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);

        let key = aead::LessSafeKey::new(
            aead::UnboundKey::new(&aead::AES_256_GCM, &kek).map_err(|_| Error::FormatError)?,
        );
        let mut ciphertext = self.0.to_vec();
        key.seal_in_place_append_tag(
            aead::Nonce::assume_unique_for_key(nonce_bytes),
            aead::Aad::empty(),
            &mut ciphertext,
        )
        .map_err(|_| Error::FormatError)?;

        let mut envelope = Vec::with_capacity(1 + SALT_LEN + 4 + AEAD_NONCE_LEN + ciphertext.len());
        envelope.push(ENVELOPE_VERSION);
        envelope.extend_from_slice(&salt);
        envelope.extend_from_slice(&iterations.to_le_bytes());
        envelope.extend_from_slice(&nonce_bytes);
        envelope.extend_from_slice(&ciphertext);

        let tmp = path.with_extension("tmp");
        {
            let mut f = std::fs::File::create(&tmp)?;
            f.write_all(&envelope)?;
            f.sync_all()?;
        }
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn read(passphrase: &str, path: &Path) -> Result<Self, Error> {
        let mut envelope = Vec::new();
        std::fs::File::open(path)?.read_to_end(&mut envelope)?;

        let header_len = 1 + SALT_LEN + 4 + AEAD_NONCE_LEN;
        if envelope.len() <= header_len {
            return Err(Error::FormatError);
        }
        if envelope[0] != ENVELOPE_VERSION {
            return Err(Error::VersionMismatch);
        }

        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&envelope[1..1 + SALT_LEN]);
        let mut iter_bytes = [0u8; 4];
        iter_bytes.copy_from_slice(&envelope[1 + SALT_LEN..1 + SALT_LEN + 4]);
        let iterations = u32::from_le_bytes(iter_bytes);
        let mut nonce_bytes = [0u8; AEAD_NONCE_LEN];
        nonce_bytes.copy_from_slice(&envelope[1 + SALT_LEN + 4..header_len]);
        let mut ciphertext = envelope[header_len..].to_vec();

        let kek = Self::derive_kek(passphrase, &salt, iterations);
        let key = aead::LessSafeKey::new(
            aead::UnboundKey::new(&aead::AES_256_GCM, &kek).map_err(|_| Error::FormatError)?,
        );
        let plaintext = key
            .open_in_place(
                aead::Nonce::assume_unique_for_key(nonce_bytes),
                aead::Aad::empty(),
                &mut ciphertext,
            )
            .map_err(|_| Error::BadPassphrase)?;

        if plaintext.len() != MASTER_KEY_LEN {
            return Err(Error::FormatError);
        }
        let mut bytes = [0u8; MASTER_KEY_LEN];
        bytes.copy_from_slice(plaintext);
        Ok(MasterKey(Zeroizing::new(bytes)))
    }

    /// Deterministically maps a logical name to on-disk path components:
    /// `(fan[0], fan[1], base64url(full hash))`.
    pub fn hash(&self, name: &[u8]) -> [u8; 32] {
        let mut mac = HmacSha256::new_from_slice(&*self.0).expect("HMAC accepts any key length");
        mac.update(name);
        let out = mac.finalize().into_bytes();
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&out);
        digest
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, Error> {
        record::encrypt(&*self.0, plaintext)
    }

    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, Error> {
        record::decrypt(&*self.0, data)
    }

    /// Generates a fresh per-file key and its 96-byte wrapped form in one step.
    pub fn new_encryption_key(&self) -> Result<(FileKey, [u8; WRAPPED_KEY_LEN]), Error> {
        let key = FileKey::generate();
        let wrapped = self.encrypt(key.as_bytes())?;
        let mut fixed = [0u8; WRAPPED_KEY_LEN];
        if wrapped.len() != WRAPPED_KEY_LEN {
            return Err(Error::FormatError);
        }
        fixed.copy_from_slice(&wrapped);
        Ok((key, fixed))
    }

    pub fn read_encrypted_key<R: Read>(&self, r: &mut R) -> Result<FileKey, Error> {
        let mut wrapped = [0u8; WRAPPED_KEY_LEN];
        r.read_exact(&mut wrapped)?;
        let raw = self.decrypt(&wrapped)?;
        if raw.len() != 32 {
            return Err(Error::FormatError);
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&raw);
        Ok(FileKey::from_bytes(bytes))
    }

    pub fn write_encrypted_key<W: Write>(&self, w: &mut W, key: &FileKey) -> Result<(), Error> {
        let wrapped = self.encrypt(key.as_bytes())?;
        if wrapped.len() != WRAPPED_KEY_LEN {
            return Err(Error::FormatError);
        }
        w.write_all(&wrapped)?;
        Ok(())
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey(..)")
    }
}

pub const WRAPPED_KEY_SIZE: usize = WRAPPED_KEY_LEN;

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn round_trip_encryption() {
        let key = MasterKey::generate();
        for message in [&b""[..], b"x", b"a longer message to pad across blocks"] {
            let ciphertext = key.encrypt(message).unwrap();
            let plaintext = key.decrypt(&ciphertext).unwrap();
            assert_eq!(plaintext, message);
        }
    }

    #[test]
    fn tamper_detection() {
        let key = MasterKey::generate();
        let mut ciphertext = key.encrypt(b"sensitive headers").unwrap();
        let last = ciphertext.len() - 1;
        ciphertext[last] ^= 0x80;
        assert!(matches!(key.decrypt(&ciphertext), Err(Error::DecryptFailed)));
    }

    #[test]
    fn bad_passphrase_does_not_touch_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("master.key");
        let key = MasterKey::generate();
        key.save("foo", &path).unwrap();
        let before = std::fs::read(&path).unwrap();

        let result = MasterKey::read("bar", &path);
        assert!(matches!(result, Err(Error::BadPassphrase)));

        let after = std::fs::read(&path).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn save_and_read_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("master.key");
        let key = MasterKey::generate();
        key.save("correct horse", &path).unwrap();
        let read_back = MasterKey::read("correct horse", &path).unwrap();
        assert_eq!(read_back.hash(b"alice@example.com"), key.hash(b"alice@example.com"));
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("master.key");
        let key = MasterKey::generate();
        key.save("pw", &path).unwrap();
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[0] = 2;
        std::fs::write(&path, &bytes).unwrap();
        assert!(matches!(
            MasterKey::read("pw", &path),
            Err(Error::VersionMismatch)
        ));
    }

    #[test]
    fn wrapped_key_round_trips_through_io() {
        let master = MasterKey::generate();
        let (key, wrapped) = master.new_encryption_key().unwrap();
        let mut reader = std::io::Cursor::new(wrapped.to_vec());
        let read_back = master.read_encrypted_key(&mut reader).unwrap();
        assert_eq!(read_back.as_bytes(), key.as_bytes());
    }
}
