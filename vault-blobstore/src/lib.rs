//! BlobStore (§4.5): content-addressed media ciphertext storage. Blob bytes
//! are already encrypted by the caller (under a per-file key minted by
//! `vault-crypto`) before they reach this crate, so the store itself moves
//! opaque bytes around and never touches plaintext.
//!
//! Reference counting rides on the enclosing FileSet transaction: callers
//! are expected to call [`BlobStore::inc_ref_count`] from inside the same
//! `open_for_update`/`open_many_for_update` scope that adds or removes the
//! FileSpec referencing the blob, so a crash between the two leaks a blob at
//! worst (recoverable by a future sweep) rather than losing data.

mod error;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::RngCore;
use std::path::{Path, PathBuf};
use vault_domain::{paths, BlobRef};
use vault_storage::Storage;

pub use error::Error;

#[derive(Clone)]
pub struct BlobStore {
    root: PathBuf,
    storage: Storage,
}

/// Generates an opaque 32-byte name, base64url-encoded with no padding, per
/// §4.5's "opaque random 32-byte (base64url) name".
pub fn generate_name() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

impl BlobStore {
    pub fn open(root: PathBuf, storage: Storage) -> Result<Self, Error> {
        std::fs::create_dir_all(&root)?;
        Ok(BlobStore { root, storage })
    }

    /// `blobs/{name[0:2]}/{name[2:4]}/{name}`, matching the physical layout
    /// §4.5 specifies (distinct from `Storage::hash_string`'s own fan-out).
    fn blob_path(&self, name: &str) -> PathBuf {
        let prefix1 = &name[0..name.len().min(2)];
        let prefix2 = &name[prefix1.len()..name.len().min(4)];
        self.root.join(prefix1).join(prefix2).join(name)
    }

    fn create_dirs_for(path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    pub fn write_blob(&self, name: &str, data: &[u8]) -> Result<(), Error> {
        let path = self.blob_path(name);
        Self::create_dirs_for(&path)?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    pub fn read_blob(&self, name: &str) -> Result<Vec<u8>, Error> {
        std::fs::read(self.blob_path(name)).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound
            } else {
                Error::Io(e)
            }
        })
    }

    /// Adjusts the refcount at `{blob}.ref` by `delta`, unlinking the blob
    /// and its refcount record once the count reaches zero. Returns the
    /// post-adjustment count (`0` after unlinking).
    pub fn inc_ref_count(&self, name: &str, delta: i64) -> Result<u64, Error> {
        let (mut value, mut commit) = self
            .storage
            .open_for_update::<BlobRef>(&paths::blob_ref(name))?;
        value.increment(delta);

        if value.is_orphaned() {
            commit.rollback()?;
            let _ = std::fs::remove_file(self.blob_path(name));
            let _ = std::fs::remove_file(self.storage.hash_string(&paths::blob_ref(name)));
            return Ok(0);
        }

        let mut next = std::collections::BTreeMap::new();
        next.insert(paths::blob_ref(name), value);
        commit.commit(&next)?;
        Ok(value.count)
    }
}
