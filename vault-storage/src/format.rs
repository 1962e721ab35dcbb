//! On-disk record envelope (§4.4):
//! `"KRIN"(4) | flags(1) | [wrapped-per-file-key(96) if encrypted] | stream`
//!
//! The stream, read outside-in: optional CTR+HMAC encryption under the
//! per-file key, then optional gzip, then the chosen structured encoding
//! (pretty-printed JSON or bincode).

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{Read, Write};
use vault_crypto::{FileKey, MasterKey};

use crate::error::Error;

const MAGIC: &[u8; 4] = b"KRIN";

const FLAG_ENCRYPTED: u8 = 0b0000_0001;
const FLAG_COMPRESSED: u8 = 0b0000_0010;
const FLAG_JSON: u8 = 0b0000_0100;
const FLAG_BINARY: u8 = 0b0000_1000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Encoding {
    Json,
    Binary,
}

#[derive(Clone, Copy, Debug)]
pub struct WriteOptions {
    pub encrypted: bool,
    pub compressed: bool,
    pub encoding: Encoding,
}

impl Default for WriteOptions {
    fn default() -> Self {
        WriteOptions {
            encrypted: true,
            compressed: false,
            encoding: Encoding::Json,
        }
    }
}

fn encode<T: Serialize>(value: &T, encoding: Encoding) -> Result<Vec<u8>, Error> {
    match encoding {
        Encoding::Json => {
            let mut buf = Vec::new();
            let mut ser = serde_json::Serializer::with_formatter(
                &mut buf,
                serde_json::ser::PrettyFormatter::with_indent(b"  "),
            );
            value
                .serialize(&mut ser)
                .map_err(|_| Error::FormatError)?;
            Ok(buf)
        }
        Encoding::Binary => bincode::serialize(value).map_err(|_| Error::FormatError),
    }
}

fn decode<T: DeserializeOwned>(bytes: &[u8], encoding: Encoding) -> Result<T, Error> {
    match encoding {
        Encoding::Json => serde_json::from_slice(bytes).map_err(|_| Error::FormatError),
        Encoding::Binary => bincode::deserialize(bytes).map_err(|_| Error::FormatError),
    }
}

/// Serializes `value` into a full envelope, encrypting under `key` (reusing
/// it if `Some`, otherwise minting a fresh one via `master_key`) when
/// `opts.encrypted` is set. Returns the bytes and the key that was used, so
/// the caller can persist the same key across subsequent saves.
pub(crate) fn write_envelope<T: Serialize>(
    master_key: &MasterKey,
    key: Option<FileKey>,
    value: &T,
    opts: WriteOptions,
) -> Result<(Vec<u8>, Option<FileKey>), Error> {
    let mut body = encode(value, opts.encoding)?;

    if opts.compressed {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(&body)?;
        body = enc.finish()?;
    }

    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);

    let mut flags = match opts.encoding {
        Encoding::Json => FLAG_JSON,
        Encoding::Binary => FLAG_BINARY,
    };
    if opts.compressed {
        flags |= FLAG_COMPRESSED;
    }

    let used_key = if opts.encrypted {
        flags |= FLAG_ENCRYPTED;
        let file_key = key.unwrap_or_else(FileKey::generate);
        out.push(flags);
        master_key.write_encrypted_key(&mut out, &file_key)?;
        file_key.encrypt_stream(&mut out, &body)?;
        Some(file_key)
    } else {
        out.push(flags);
        out.extend_from_slice(&body);
        None
    };

    Ok((out, used_key))
}

/// Parses a full envelope, returning the decoded value and (if encrypted)
/// the per-file key so the caller can reuse it on the next save.
pub(crate) fn read_envelope<T: DeserializeOwned>(
    master_key: &MasterKey,
    data: &[u8],
) -> Result<(T, Option<FileKey>), Error> {
    if data.len() < 5 || &data[..4] != MAGIC {
        return Err(Error::FormatError);
    }
    let flags = data[4];
    let mut cursor = &data[5..];

    let key = if flags & FLAG_ENCRYPTED != 0 {
        let file_key = master_key.read_encrypted_key(&mut cursor)?;
        Some(file_key)
    } else {
        None
    };

    let mut body = if let Some(ref file_key) = key {
        file_key.decrypt_stream(&mut cursor)?
    } else {
        cursor.to_vec()
    };

    if flags & FLAG_COMPRESSED != 0 {
        let mut decoder = GzDecoder::new(&body[..]);
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed)?;
        body = decompressed;
    }

    let encoding = if flags & FLAG_JSON != 0 {
        Encoding::Json
    } else if flags & FLAG_BINARY != 0 {
        Encoding::Binary
    } else {
        return Err(Error::FormatError);
    };

    let value = decode(&body, encoding)?;
    Ok((value, key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, PartialEq, Debug, Default)]
    struct Demo {
        name: String,
        count: u32,
    }

    #[test]
    fn json_round_trip() {
        let master = MasterKey::generate();
        let value = Demo {
            name: "gallery".into(),
            count: 3,
        };
        let (bytes, key) =
            write_envelope(&master, None, &value, WriteOptions::default()).unwrap();
        assert!(key.is_some());
        let (decoded, _): (Demo, _) = read_envelope(&master, &bytes).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn binary_and_compressed_round_trip() {
        let master = MasterKey::generate();
        let value = Demo {
            name: "trash".into(),
            count: 9,
        };
        let opts = WriteOptions {
            encrypted: true,
            compressed: true,
            encoding: Encoding::Binary,
        };
        let (bytes, _) = write_envelope(&master, None, &value, opts).unwrap();
        let (decoded, _): (Demo, _) = read_envelope(&master, &bytes).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn unencrypted_round_trip_preserves_key_continuity_as_none() {
        let master = MasterKey::generate();
        let value = Demo::default();
        let opts = WriteOptions {
            encrypted: false,
            compressed: false,
            encoding: Encoding::Json,
        };
        let (bytes, key) = write_envelope(&master, None, &value, opts).unwrap();
        assert!(key.is_none());
        let (_, key_back): (Demo, _) = read_envelope(&master, &bytes).unwrap();
        assert!(key_back.is_none());
    }

    #[test]
    fn key_continuity_across_saves() {
        let master = MasterKey::generate();
        let value = Demo {
            name: "a".into(),
            count: 1,
        };
        let (bytes, key) =
            write_envelope(&master, None, &value, WriteOptions::default()).unwrap();
        let (_, reread_key): (Demo, _) = read_envelope(&master, &bytes).unwrap();

        let value2 = Demo {
            name: "a".into(),
            count: 2,
        };
        let (bytes2, key2) =
            write_envelope(&master, reread_key, &value2, WriteOptions::default()).unwrap();
        assert_eq!(key.unwrap().as_bytes(), key2.unwrap().as_bytes());
        let (decoded2, _): (Demo, _) = read_envelope(&master, &bytes2).unwrap();
        assert_eq!(decoded2, value2);
    }

    #[test]
    fn corrupt_magic_is_format_error() {
        let master = MasterKey::generate();
        let mut bytes = b"XXXX\x00".to_vec();
        bytes.extend_from_slice(b"garbage");
        let result: Result<(Demo, _), _> = read_envelope(&master, &bytes);
        assert!(matches!(result, Err(Error::FormatError)));
    }
}
