//! KeyVault and Crypter: the passphrase-wrapped master key, the per-file
//! key it wraps, and the small set of symmetric/asymmetric primitives built
//! on top of them that the rest of the workspace uses to encrypt everything
//! that touches disk or the wire.

mod error;
mod file_key;
mod master_key;
mod record;
mod sealed;
mod signing;
mod subkey;

pub use error::Error;
pub use file_key::FileKey;
pub use master_key::{MasterKey, WRAPPED_KEY_SIZE};
pub use sealed::{public_key_from_bytes, seal, SealedBoxKeyPair};
pub use signing::{verify, SigningKeyPair};

pub use ed25519_dalek::{Signature, VerifyingKey};
pub use x25519_dalek::PublicKey as X25519PublicKey;
