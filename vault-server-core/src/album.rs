//! Album lifecycle (§4.3, §6.1 `/v2/sync/addAlbum` etc.): creation, metadata
//! edits and deletion. Sharing/membership changes live in [`crate::share`].

use std::collections::BTreeMap;

use vault_domain::{paths, AlbumManifest, AlbumSpec, DeleteEvent, DeleteEventType, FileSet};
use wire::{AddAlbumParams, ChangeAlbumCoverParams, DeleteAlbumParams, RenameAlbumParams};

use crate::encoding;
use crate::error::{Error, Result};
use crate::ServerCore;

/// Creates the album's FileSet before linking it into the owner's manifest,
/// so a crash in between leaves an orphaned FileSet rather than a manifest
/// entry with nothing behind it.
pub fn add_album(core: &ServerCore, owner_id: i64, req: &AddAlbumParams) -> Result<()> {
    let album_id = req.album_id.as_ref();
    let path = paths::album(album_id);

    let mut spec = AlbumSpec::new(album_id.to_string(), owner_id, req.date_created);
    spec.date_modified = req.date_modified;
    spec.enc_private_key = encoding::decode(&req.enc_private_key)?;
    spec.metadata = encoding::decode(&req.metadata)?;
    spec.public_key = encoding::decode_fixed(&req.public_key)?;

    let file_set = FileSet {
        album: Some(spec),
        ..Default::default()
    };
    core.storage.save_data_file(None, &path, &file_set)?;

    let (mut manifest, mut commit) = core
        .storage
        .open_for_update::<AlbumManifest>(&paths::manifest(owner_id))?;
    manifest.insert(album_id.to_string(), path.clone());
    let mut next = BTreeMap::new();
    next.insert(paths::manifest(owner_id), manifest);
    commit.commit(&next)?;

    Ok(())
}

fn load_owned_album(core: &ServerCore, user_id: i64, album_id: &str) -> Result<(FileSet, vault_storage::Commit<FileSet>)> {
    let (file_set, commit) = core
        .storage
        .open_for_update::<FileSet>(&paths::album(album_id))?;
    match &file_set.album {
        Some(spec) if spec.is_owner(user_id) => Ok((file_set, commit)),
        Some(_) => Err(Error::NotOwner),
        None => Err(Error::AlbumNotFound),
    }
}

pub fn rename_album(core: &ServerCore, user_id: i64, req: &RenameAlbumParams) -> Result<()> {
    let (mut file_set, mut commit) = load_owned_album(core, user_id, &req.album_id)?;
    let spec = file_set.album.as_mut().expect("checked Some above");
    spec.metadata = encoding::decode(&req.metadata)?;
    spec.date_modified = core.clock.now_millis();

    let mut next = BTreeMap::new();
    next.insert(paths::album(&req.album_id), file_set);
    commit.commit(&next)?;
    Ok(())
}

pub fn change_album_cover(core: &ServerCore, user_id: i64, req: &ChangeAlbumCoverParams) -> Result<()> {
    let (mut file_set, mut commit) = load_owned_album(core, user_id, &req.album_id)?;
    let spec = file_set.album.as_mut().expect("checked Some above");
    spec.cover = req.cover.to_string();
    spec.date_modified = core.clock.now_millis();

    let mut next = BTreeMap::new();
    next.insert(paths::album(&req.album_id), file_set);
    commit.commit(&next)?;
    Ok(())
}

/// Removes the album from every member's manifest (appending an
/// `AlbumDelete` event so each client's next sync notices the removal),
/// then releases the blob references its files held.
pub fn delete_album(core: &ServerCore, user_id: i64, req: &DeleteAlbumParams) -> Result<()> {
    let album_id = req.album_id.as_ref();
    let (file_set, mut album_commit) = load_owned_album(core, user_id, album_id)?;
    let spec = file_set.album.as_ref().expect("checked Some above");
    let now = core.clock.now_millis();

    let mut member_ids: Vec<i64> = spec.members.iter().copied().collect();
    member_ids.push(spec.owner_id);
    member_ids.sort_unstable();
    member_ids.dedup();

    let manifest_names: Vec<String> = member_ids.iter().map(|id| paths::manifest(*id)).collect();
    let mut manifests_txn = core.storage.open_many_for_update::<AlbumManifest>(&manifest_names)?;
    for name in &manifest_names {
        if let Some(manifest) = manifests_txn.values.get_mut(name) {
            manifest.remove(album_id);
            vault_domain::append_sorted(
                &mut manifest.deletes,
                std::iter::once(DeleteEvent::new(
                    "",
                    album_id,
                    DeleteEventType::AlbumDelete,
                    now,
                )),
            );
        }
    }
    let updated_manifests = manifests_txn.values.clone();
    manifests_txn.into_commit().commit(&updated_manifests)?;

    for file in file_set.files.values() {
        core.blobs.inc_ref_count(&file.store_file, -1)?;
        if !file.store_thumb.is_empty() {
            core.blobs.inc_ref_count(&file.store_thumb, -1)?;
        }
    }

    album_commit.rollback()?;
    std::fs::remove_file(core.storage.hash_string(&paths::album(album_id))).ok();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;
    use tempfile::TempDir;
    use vault_blobstore::BlobStore;
    use vault_crypto::MasterKey;
    use vault_storage::Storage;

    fn core(dir: &TempDir) -> ServerCore {
        let storage = Storage::open(dir.path().join("meta"), MasterKey::generate()).unwrap();
        let blobs = BlobStore::open(dir.path().join("blobs"), storage.clone()).unwrap();
        ServerCore::with_system_clock(storage, blobs, 5000)
    }

    fn add_req(id: &str) -> AddAlbumParams<'static> {
        AddAlbumParams {
            album_id: Cow::Owned(id.to_string()),
            date_created: 100,
            date_modified: 100,
            enc_private_key: Cow::from(encoding::encode(b"key")),
            metadata: Cow::from(encoding::encode(b"meta")),
            public_key: Cow::from(encoding::encode(&[7u8; 32])),
        }
    }

    #[test]
    fn add_album_links_into_owner_manifest() {
        let dir = TempDir::new().unwrap();
        let core = core(&dir);
        core.storage
            .create_empty_file::<AlbumManifest>(&paths::manifest(1))
            .unwrap();

        add_album(&core, 1, &add_req("alb1")).unwrap();

        let (manifest, _): (AlbumManifest, _) = core.storage.read_data_file(&paths::manifest(1)).unwrap();
        assert!(manifest.albums.contains_key("alb1"));
    }

    #[test]
    fn non_owner_cannot_rename() {
        let dir = TempDir::new().unwrap();
        let core = core(&dir);
        core.storage
            .create_empty_file::<AlbumManifest>(&paths::manifest(1))
            .unwrap();
        add_album(&core, 1, &add_req("alb1")).unwrap();

        let result = rename_album(
            &core,
            2,
            &RenameAlbumParams {
                album_id: Cow::from("alb1"),
                metadata: Cow::from(encoding::encode(b"new")),
            },
        );
        assert!(matches!(result, Err(Error::NotOwner)));
    }
}
