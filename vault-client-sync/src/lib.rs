//! ClientSync (§4.7): the local mirror, the pull/diff/apply reconciliation
//! loop, and the transport that carries it over `/v2/sync/*`.
//!
//! A sync pass is three steps run in order: [`pull::pull`] merges the
//! server's view of what changed into the local mirror; [`diff::diff`]
//! compares the mirror's live state against that merged snapshot; and
//! [`apply::apply`] pushes the resulting operations back. [`ClientSync::sync`]
//! is the convenience wrapper most callers want.

pub mod apply;
pub mod diff;
pub mod encoding;
pub mod error;
pub mod model;
pub mod pull;
pub mod transport;

use std::path::PathBuf;

use vault_blobstore::BlobStore;
use vault_crypto::MasterKey;
use vault_storage::Storage;
use wire::GetUpdatesParts;

pub use apply::{ApplyReport, KeyRing};
pub use error::{Error, Result};
pub use model::Watermarks;
pub use transport::Transport;

/// Logical names [`ClientSync::open`] seeds so [`Storage::open_for_update`]
/// always finds an existing record rather than erroring on first use.
fn seed_storage(storage: &Storage) -> Result<()> {
    storage.create_empty_file::<Watermarks>(model::paths::WATERMARKS).ok();
    storage.create_empty_file::<model::LocalFileSet>(model::paths::GALLERY).ok();
    storage.create_empty_file::<model::LocalFileSet>(model::paths::TRASH).ok();
    storage
        .create_empty_file::<model::LocalAlbumManifest>(model::paths::MANIFEST)
        .ok();
    storage
        .create_empty_file::<vault_domain::ContactList>(model::paths::CONTACTS)
        .ok();
    Ok(())
}

/// Ties the local mirror ([`Storage`] + [`BlobStore`]) to a server
/// [`Transport`]. One instance per locally-configured account (§4.7, §5
/// "client data directory").
pub struct ClientSync {
    storage: Storage,
    blobs: BlobStore,
    transport: Transport,
}

impl ClientSync {
    /// Opens (creating if absent) the local mirror under `data_dir` and
    /// replays any pending crash-recovery journal before the caller issues
    /// its first transaction, matching the server bootstrap's own
    /// `rollback_pending` step (§4.3, §4.4).
    pub fn open(data_dir: PathBuf, master_key: MasterKey, base_url: impl Into<String>) -> Result<Self> {
        let storage = Storage::open(data_dir.join("meta"), master_key)?;
        storage.rollback_pending()?;
        seed_storage(&storage)?;
        let blobs = BlobStore::open(data_dir.join("blobs"), storage.clone())?;
        let transport = Transport::new(base_url);
        Ok(ClientSync { storage, blobs, transport })
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Runs one full reconciliation pass: pull remote changes into the
    /// mirror, diff the mirror's live state against it, and push the
    /// resulting operations back. Returns the raw pull response (useful for
    /// reporting space usage) alongside the apply pass's outcome.
    pub async fn sync(&self, token: &str, keys: &KeyRing) -> Result<(GetUpdatesParts<'static>, ApplyReport)> {
        let parts = pull::pull(&self.storage, &self.transport, token).await?;
        let computed = diff::diff(&self.storage)?;
        let report = apply::apply(&self.storage, &self.blobs, &self.transport, token, keys, computed).await?;
        Ok((parts, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn open_seeds_every_collection_so_first_read_is_never_a_miss() {
        let dir = TempDir::new().unwrap();
        let sync = ClientSync::open(dir.path().to_path_buf(), MasterKey::generate(), "http://localhost:3000").unwrap();

        let (w, _) = sync.storage().read_data_file::<Watermarks>(model::paths::WATERMARKS).unwrap();
        assert_eq!(w, Watermarks::default());

        let (gallery, _) = sync
            .storage()
            .read_data_file::<model::LocalFileSet>(model::paths::GALLERY)
            .unwrap();
        assert!(gallery.local.files.is_empty());
    }

    #[test]
    fn reopening_an_existing_mirror_does_not_error_on_seed() {
        let dir = TempDir::new().unwrap();
        let key = MasterKey::generate();
        ClientSync::open(dir.path().to_path_buf(), key.clone(), "http://localhost:3000").unwrap();
        let second = ClientSync::open(dir.path().to_path_buf(), key, "http://localhost:3000");
        assert!(second.is_ok());
    }
}
