use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Derives a 32-byte subkey from a parent key and a fixed label, so a single
/// root secret (master key or per-file key) can drive both a cipher key and
/// a MAC key without reusing the same bytes for both purposes.
pub(crate) fn derive(parent: &[u8], label: &[u8]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(parent).expect("HMAC accepts any key length");
    mac.update(label);
    let out = mac.finalize().into_bytes();
    let mut key = [0u8; 32];
    key.copy_from_slice(&out);
    key
}
