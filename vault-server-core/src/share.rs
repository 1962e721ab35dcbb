//! Album membership and permission changes (§4.8): sharing an album to a
//! set of members, editing the shared permission flags, removing a member,
//! unsharing, and a member leaving of their own accord.

use std::collections::BTreeMap;

use vault_domain::{paths, permissions, AlbumManifest, FileSet};
use wire::{EditPermsParams, LeaveAlbumParams, RemoveAlbumMemberParams, ShareAlbumParams, UnshareAlbumParams};

use crate::encoding;
use crate::error::{Error, Result};
use crate::ServerCore;

fn open_album(core: &ServerCore, album_id: &str) -> Result<(FileSet, vault_storage::Commit<FileSet>)> {
    let (file_set, commit) = core
        .storage
        .open_for_update::<FileSet>(&paths::album(album_id))?;
    if file_set.album.is_none() {
        return Err(Error::AlbumNotFound);
    }
    Ok((file_set, commit))
}

/// Only the owner may change who an album is shared with; §4.8 leaves
/// re-sharing (a member sharing onward) out of scope for this pass.
pub fn share_album(core: &ServerCore, user_id: i64, req: &ShareAlbumParams) -> Result<()> {
    let (mut file_set, mut commit) = open_album(core, &req.album_id)?;
    let spec = file_set.album.as_mut().expect("checked Some above");
    if !spec.is_owner(user_id) {
        commit.rollback()?;
        return Err(Error::NotOwner);
    }

    spec.is_shared = req.is_shared;
    spec.is_hidden = req.is_hidden;
    spec.is_locked = req.is_locked;
    spec.permissions = req.permissions.to_string();
    spec.date_modified = core.clock.now_millis();

    for entry in &req.sharing_keys {
        spec.members.insert(entry.user_id);
        spec.sharing_keys
            .insert(entry.user_id, encoding::decode(&entry.enc_private_key)?);
    }

    let album_id = req.album_id.to_string();
    let new_members: Vec<i64> = req.sharing_keys.iter().map(|e| e.user_id).collect();
    let path = paths::album(&album_id);

    let mut next = BTreeMap::new();
    next.insert(path.clone(), file_set);
    commit.commit(&next)?;

    link_into_member_manifests(core, &new_members, &album_id, &path)?;
    for member_id in &new_members {
        crate::contacts::materialize_mutual_contact(core, user_id, *member_id)?;
    }
    Ok(())
}

fn link_into_member_manifests(core: &ServerCore, member_ids: &[i64], album_id: &str, path: &str) -> Result<()> {
    if member_ids.is_empty() {
        return Ok(());
    }
    let mut names: Vec<i64> = member_ids.to_vec();
    names.sort_unstable();
    names.dedup();
    let manifest_names: Vec<String> = names.iter().map(|id| paths::manifest(*id)).collect();

    let mut txn = core.storage.open_many_for_update::<AlbumManifest>(&manifest_names)?;
    for name in &manifest_names {
        if let Some(manifest) = txn.values.get_mut(name) {
            manifest.insert(album_id.to_string(), path.to_string());
        }
    }
    let updated = txn.values.clone();
    txn.into_commit().commit(&updated)?;
    Ok(())
}

fn unlink_from_member_manifest(core: &ServerCore, member_id: i64, album_id: &str) -> Result<()> {
    let (mut manifest, mut commit) = core
        .storage
        .open_for_update::<AlbumManifest>(&paths::manifest(member_id))?;
    manifest.remove(album_id);
    let mut next = BTreeMap::new();
    next.insert(paths::manifest(member_id), manifest);
    commit.commit(&next)?;
    Ok(())
}

pub fn edit_perms(core: &ServerCore, user_id: i64, req: &EditPermsParams) -> Result<()> {
    let (mut file_set, mut commit) = open_album(core, &req.album_id)?;
    let spec = file_set.album.as_mut().expect("checked Some above");
    if !spec.is_owner(user_id) {
        commit.rollback()?;
        return Err(Error::NotOwner);
    }
    spec.permissions = req.permissions.to_string();
    spec.date_modified = core.clock.now_millis();

    let mut next = BTreeMap::new();
    next.insert(paths::album(&req.album_id), file_set);
    commit.commit(&next)?;
    Ok(())
}

pub fn remove_album_member(core: &ServerCore, user_id: i64, req: &RemoveAlbumMemberParams) -> Result<()> {
    let (mut file_set, mut commit) = open_album(core, &req.album_id)?;
    let spec = file_set.album.as_mut().expect("checked Some above");
    if !spec.is_owner(user_id) {
        commit.rollback()?;
        return Err(Error::NotOwner);
    }
    spec.members.remove(&req.member_user_id);
    spec.sharing_keys.remove(&req.member_user_id);
    spec.date_modified = core.clock.now_millis();

    let mut next = BTreeMap::new();
    next.insert(paths::album(&req.album_id), file_set);
    commit.commit(&next)?;

    unlink_from_member_manifest(core, req.member_user_id, &req.album_id)
}

/// Clears membership entirely, turning the album back into a private one;
/// distinct from `delete_album` (§4.3), which also tears down the FileSet.
pub fn unshare_album(core: &ServerCore, user_id: i64, req: &UnshareAlbumParams) -> Result<()> {
    let (mut file_set, mut commit) = open_album(core, &req.album_id)?;
    let spec = file_set.album.as_mut().expect("checked Some above");
    if !spec.is_owner(user_id) {
        commit.rollback()?;
        return Err(Error::NotOwner);
    }
    let departing: Vec<i64> = spec.members.iter().copied().collect();
    spec.members.clear();
    spec.sharing_keys.clear();
    spec.is_shared = false;
    spec.permissions = permissions::DEFAULT_PERMISSIONS.to_string();
    spec.date_modified = core.clock.now_millis();

    let mut next = BTreeMap::new();
    next.insert(paths::album(&req.album_id), file_set);
    commit.commit(&next)?;

    for member_id in departing {
        unlink_from_member_manifest(core, member_id, &req.album_id)?;
    }
    Ok(())
}

/// A non-owner member removing themselves; unlike `remove_album_member`
/// this needs no owner check, only membership.
pub fn leave_album(core: &ServerCore, user_id: i64, req: &LeaveAlbumParams) -> Result<()> {
    let (mut file_set, mut commit) = open_album(core, &req.album_id)?;
    let spec = file_set.album.as_mut().expect("checked Some above");
    if spec.is_owner(user_id) {
        commit.rollback()?;
        return Err(Error::Forbidden);
    }
    if !spec.members.remove(&user_id) {
        commit.rollback()?;
        return Err(Error::Forbidden);
    }
    spec.sharing_keys.remove(&user_id);
    spec.date_modified = core.clock.now_millis();

    let mut next = BTreeMap::new();
    next.insert(paths::album(&req.album_id), file_set);
    commit.commit(&next)?;

    unlink_from_member_manifest(core, user_id, &req.album_id)
}

/// Checks whether `viewer` may add files to `album_id` — used by
/// [`crate::file::upload`] before accepting an upload into a shared album.
pub fn can_add_files(core: &ServerCore, viewer: i64, album_id: &str) -> Result<bool> {
    let (file_set, _) = core.storage.read_data_file::<FileSet>(&paths::album(album_id))?;
    let spec = file_set.album.ok_or(Error::AlbumNotFound)?;
    if spec.is_owner(viewer) {
        return Ok(true);
    }
    if !spec.members.contains(&viewer) {
        return Ok(false);
    }
    Ok(permissions::allows(&spec.permissions, permissions::Permission::Add))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::album::add_album;
    use std::borrow::Cow;
    use tempfile::TempDir;
    use vault_blobstore::BlobStore;
    use vault_crypto::MasterKey;
    use vault_domain::AlbumManifest;
    use vault_storage::Storage;
    use wire::{AddAlbumParams, SharingKeyEntry};

    fn core(dir: &TempDir) -> ServerCore {
        let storage = Storage::open(dir.path().join("meta"), MasterKey::generate()).unwrap();
        let blobs = BlobStore::open(dir.path().join("blobs"), storage.clone()).unwrap();
        ServerCore::with_system_clock(storage, blobs, 5000)
    }

    fn setup_album(core: &ServerCore, owner: i64, member: i64, album_id: &str) {
        core.storage
            .create_empty_file::<AlbumManifest>(&paths::manifest(owner))
            .unwrap();
        core.storage
            .create_empty_file::<AlbumManifest>(&paths::manifest(member))
            .unwrap();
        add_album(
            core,
            owner,
            &AddAlbumParams {
                album_id: Cow::Owned(album_id.to_string()),
                date_created: 1,
                date_modified: 1,
                enc_private_key: Cow::from(encoding::encode(b"k")),
                metadata: Cow::from(encoding::encode(b"m")),
                public_key: Cow::from(encoding::encode(&[1u8; 32])),
            },
        )
        .unwrap();
    }

    #[test]
    fn share_links_album_into_member_manifest() {
        let dir = TempDir::new().unwrap();
        let core = core(&dir);
        setup_album(&core, 1, 2, "alb1");

        share_album(
            &core,
            1,
            &ShareAlbumParams {
                album_id: Cow::from("alb1"),
                permissions: Cow::from("1100"),
                is_shared: true,
                is_hidden: false,
                is_locked: false,
                sharing_keys: vec![SharingKeyEntry {
                    user_id: 2,
                    enc_private_key: Cow::from(encoding::encode(b"wrapped")),
                }],
            },
        )
        .unwrap();

        let (manifest, _): (AlbumManifest, _) = core.storage.read_data_file(&paths::manifest(2)).unwrap();
        assert!(manifest.albums.contains_key("alb1"));
        assert!(can_add_files(&core, 2, "alb1").unwrap());
    }

    #[test]
    fn leave_album_rejects_the_owner() {
        let dir = TempDir::new().unwrap();
        let core = core(&dir);
        setup_album(&core, 1, 2, "alb1");

        let result = leave_album(&core, 1, &LeaveAlbumParams { album_id: Cow::from("alb1") });
        assert!(matches!(result, Err(Error::Forbidden)));
    }
}
