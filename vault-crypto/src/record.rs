//! Small-record CBC+HMAC encrypt/decrypt, used by [`crate::MasterKey::encrypt`]
//! to wrap per-file keys and other short values.
//!
//! Layout: `iv(16) || ciphertext(len % 16 == 0) || hmac(32)`. The plaintext
//! inside the ciphertext is `padLen(1) || data || random padding(padLen)`,
//! chosen so the total length lands on a 16-byte boundary.

use aes::Aes256;
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

use crate::error::Error;
use crate::subkey::derive;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;
type HmacSha256 = Hmac<Sha256>;

const IV_LEN: usize = 16;
const TAG_LEN: usize = 32;
const BLOCK: usize = 16;

pub(crate) fn encrypt(parent_key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, Error> {
    let enc_key = derive(parent_key, b"vault-record-enc");
    let mac_key = derive(parent_key, b"vault-record-mac");

    let unpadded_len = 1 + plaintext.len();
    let pad_len = (BLOCK - (unpadded_len % BLOCK)) % BLOCK;
    let mut buf = Vec::with_capacity(unpadded_len + pad_len);
    buf.push(pad_len as u8);
    buf.extend_from_slice(plaintext);
    let mut padding = vec![0u8; pad_len];
    rand::thread_rng().fill_bytes(&mut padding);
    buf.extend_from_slice(&padding);
    debug_assert_eq!(buf.len() % BLOCK, 0);

    let mut iv = [0u8; IV_LEN];
    rand::thread_rng().fill_bytes(&mut iv);

    let msg_len = buf.len();
    let ciphertext = Aes256CbcEnc::new((&enc_key).into(), (&iv).into())
        .encrypt_padded_mut::<NoPadding>(&mut buf, msg_len)
        .map_err(|_| Error::FormatError)?;

    let mut mac = HmacSha256::new_from_slice(&mac_key).expect("HMAC accepts any key length");
    mac.update(&iv);
    mac.update(ciphertext);
    let tag = mac.finalize().into_bytes();

    let mut out = Vec::with_capacity(IV_LEN + ciphertext.len() + TAG_LEN);
    out.extend_from_slice(&iv);
    out.extend_from_slice(ciphertext);
    out.extend_from_slice(&tag);
    Ok(out)
}

pub(crate) fn decrypt(parent_key: &[u8], data: &[u8]) -> Result<Vec<u8>, Error> {
    if data.len() < IV_LEN + TAG_LEN || (data.len() - IV_LEN - TAG_LEN) % BLOCK != 0 {
        return Err(Error::FormatError);
    }

    let enc_key = derive(parent_key, b"vault-record-enc");
    let mac_key = derive(parent_key, b"vault-record-mac");

    let iv = &data[..IV_LEN];
    let ciphertext = &data[IV_LEN..data.len() - TAG_LEN];
    let tag = &data[data.len() - TAG_LEN..];

    let mut mac = HmacSha256::new_from_slice(&mac_key).expect("HMAC accepts any key length");
    mac.update(iv);
    mac.update(ciphertext);
    mac.verify_slice(tag).map_err(|_| Error::DecryptFailed)?;

    let mut buf = ciphertext.to_vec();
    let plaintext = Aes256CbcDec::new((&enc_key).into(), iv.into())
        .decrypt_padded_mut::<NoPadding>(&mut buf)
        .map_err(|_| Error::DecryptFailed)?;

    if plaintext.is_empty() {
        return Err(Error::FormatError);
    }
    let pad_len = plaintext[0] as usize;
    if plaintext.len() < 1 + pad_len {
        return Err(Error::FormatError);
    }
    let data_end = plaintext.len() - pad_len;
    Ok(plaintext[1..data_end].to_vec())
}
