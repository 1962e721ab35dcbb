//! The per-file symmetric key ("Crypter" in the component design): a fresh
//! random 256-bit key generated for every stored record, wrapped under the
//! master key for storage and used directly to drive the CTR stream cipher
//! over that record's body.

use aes::Aes256;
use ctr::cipher::{KeyIvInit, StreamCipher};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use std::io::{Read, Write};
use zeroize::Zeroizing;

use crate::error::Error;
use crate::subkey::derive;

type Aes256Ctr = ctr::Ctr128BE<Aes256>;
type HmacSha256 = Hmac<Sha256>;

const IV_LEN: usize = 16;
const TAG_LEN: usize = 32;

#[derive(Clone)]
pub struct FileKey(Zeroizing<[u8; 32]>);

impl FileKey {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        FileKey(Zeroizing::new(bytes))
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        FileKey(Zeroizing::new(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    fn stream_key(&self) -> [u8; 32] {
        derive(&*self.0, b"vault-stream-enc")
    }

    fn mac_key(&self) -> [u8; 32] {
        derive(&*self.0, b"vault-stream-mac")
    }

    /// Encrypts `plaintext` under a fresh random IV and appends a running
    /// HMAC tag over the ciphertext, writing `iv || ciphertext || tag` to
    /// `out`. This is the CTR "StartWriter" stream, materialized eagerly
    /// since every caller in this workspace already holds the full record
    /// in memory before writing it out.
    pub fn encrypt_stream<W: Write>(&self, out: &mut W, plaintext: &[u8]) -> Result<(), Error> {
        let mut iv = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut iv);
        out.write_all(&iv)?;

        let mut ciphertext = plaintext.to_vec();
        let mut cipher = Aes256Ctr::new(&self.stream_key().into(), (&iv).into());
        cipher.apply_keystream(&mut ciphertext);

        let mut mac =
            HmacSha256::new_from_slice(&self.mac_key()).expect("HMAC accepts any key length");
        mac.update(&ciphertext);
        let tag = mac.finalize().into_bytes();

        out.write_all(&ciphertext)?;
        out.write_all(&tag)?;
        Ok(())
    }

    /// Inverse of [`FileKey::encrypt_stream`]. Reads the whole remaining
    /// stream, verifies the trailing MAC in constant time, then decrypts.
    pub fn decrypt_stream<R: Read>(&self, input: &mut R) -> Result<Vec<u8>, Error> {
        let mut data = Vec::new();
        input.read_to_end(&mut data)?;
        if data.len() < IV_LEN + TAG_LEN {
            return Err(Error::FormatError);
        }

        let iv = &data[..IV_LEN];
        let ciphertext = &data[IV_LEN..data.len() - TAG_LEN];
        let tag = &data[data.len() - TAG_LEN..];

        let mut mac =
            HmacSha256::new_from_slice(&self.mac_key()).expect("HMAC accepts any key length");
        mac.update(ciphertext);
        mac.verify_slice(tag).map_err(|_| Error::DecryptFailed)?;

        let mut plaintext = ciphertext.to_vec();
        let mut cipher = Aes256Ctr::new(&self.stream_key().into(), iv.into());
        cipher.apply_keystream(&mut plaintext);
        Ok(plaintext)
    }
}

impl std::fmt::Debug for FileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FileKey(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_round_trips() {
        let key = FileKey::generate();
        let plaintext = b"gallery metadata blob";
        let mut encrypted = Vec::new();
        key.encrypt_stream(&mut encrypted, plaintext).unwrap();

        let mut cursor = std::io::Cursor::new(encrypted);
        let decrypted = key.decrypt_stream(&mut cursor).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn stream_detects_tamper() {
        let key = FileKey::generate();
        let mut encrypted = Vec::new();
        key.encrypt_stream(&mut encrypted, b"payload").unwrap();
        let last = encrypted.len() - 1;
        encrypted[last] ^= 0x01;

        let mut cursor = std::io::Cursor::new(encrypted);
        assert!(matches!(
            key.decrypt_stream(&mut cursor),
            Err(Error::DecryptFailed)
        ));
    }
}
