//! Base64 in/out at the wire boundary, mirroring `vault_server_core::encoding`
//! on the client side of the same `§6.1` fields.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::error::{Error, Result};

pub fn decode(s: &str) -> Result<Vec<u8>> {
    STANDARD.decode(s).map_err(|_| Error::FormatError)
}

pub fn decode_fixed<const N: usize>(s: &str) -> Result<[u8; N]> {
    let bytes = decode(s)?;
    bytes.try_into().map_err(|_| Error::FormatError)
}

pub fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}
