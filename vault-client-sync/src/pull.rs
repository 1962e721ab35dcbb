//! GetUpdates (§4.7 "Pull / GetUpdates"): post the client's per-collection
//! watermarks, then merge each list in the response into the local mirror
//! through its own multi-file transaction, advancing watermarks only to
//! values this pull actually observed.

use std::collections::BTreeMap;

use vault_domain::{AlbumManifestEntry, DeleteEventType, FileSpec};
use wire::{AlbumEntry, ContactEntry, DeleteEventEntry, FileEntry, GetUpdatesParts};

use crate::encoding;
use crate::error::Result;
use crate::model::{paths, LocalAlbumManifest, LocalFileSet, Watermarks};
use crate::transport::Transport;
use vault_storage::Storage;

fn to_file_spec(entry: &FileEntry<'_>) -> Result<FileSpec> {
    Ok(FileSpec {
        file_name: entry.file.to_string(),
        headers: encoding::decode(&entry.headers)?,
        set: entry.set.to_string(),
        album_id: entry.album_id.to_string(),
        date_created: entry.date_created,
        date_modified: entry.date_modified,
        version: entry.version.to_string(),
        store_file: entry.store_file.to_string(),
        store_file_size: entry.store_file_size,
        store_thumb: entry.store_thumb.to_string(),
        store_thumb_size: entry.store_thumb_size,
    })
}

/// Merges a batch of `FileEntry`s into the local mirror at `path`, updating
/// both the live copy and the `RemoteFiles` snapshot (they track together —
/// a pull never represents local intent, only confirmed remote truth).
fn merge_file_entries(storage: &Storage, path: &str, entries: &[FileEntry<'_>]) -> Result<()> {
    if entries.is_empty() {
        return Ok(());
    }
    let (mut set, mut commit) = storage.open_for_update::<LocalFileSet>(path)?;
    for entry in entries {
        let spec = to_file_spec(entry)?;
        set.local.files.insert(spec.file_name.clone(), spec.clone());
        set.remote_files.insert(spec.file_name.clone(), spec);
    }
    let mut next = BTreeMap::new();
    next.insert(path.to_string(), set);
    commit.commit(&next)?;
    Ok(())
}

fn merge_album_entries(storage: &Storage, manifest_path: &str, entries: &[AlbumEntry<'_>]) -> Result<()> {
    if entries.is_empty() {
        return Ok(());
    }
    let (mut manifest, mut commit) = storage.open_for_update::<LocalAlbumManifest>(manifest_path)?;
    for entry in entries {
        let path = paths::album(&entry.album_id);
        let meta = AlbumManifestEntry {
            album_id: entry.album_id.to_string(),
            file_set_path: path,
        };
        manifest.local.insert(meta.album_id.clone(), meta.file_set_path.clone());
        manifest.remote_albums.insert(meta.album_id.clone(), meta);
    }
    let mut next = BTreeMap::new();
    next.insert(manifest_path.to_string(), manifest);
    commit.commit(&next)?;

    for entry in entries {
        let path = paths::album(&entry.album_id);
        storage.create_empty_file::<LocalFileSet>(&path).ok();
        let (mut set, mut commit) = storage.open_for_update::<LocalFileSet>(&path)?;
        let mut spec = set.local.album.clone().unwrap_or_else(|| {
            vault_domain::AlbumSpec::new(entry.album_id.to_string(), 0, entry.date_created)
        });
        spec.album_id = entry.album_id.to_string();
        spec.date_created = entry.date_created;
        spec.date_modified = entry.date_modified;
        spec.enc_private_key = encoding::decode(&entry.enc_private_key)?;
        spec.metadata = encoding::decode(&entry.metadata)?;
        spec.public_key = encoding::decode_fixed(&entry.public_key)?;
        spec.is_shared = entry.is_shared;
        spec.is_hidden = entry.is_hidden;
        spec.is_locked = entry.is_locked;
        spec.permissions = entry.permissions.to_string();
        spec.cover = entry.cover.to_string();
        spec.members = entry.members.iter().copied().collect();
        set.local.album = Some(spec);
        let mut next = BTreeMap::new();
        next.insert(path, set);
        commit.commit(&next)?;
    }
    Ok(())
}

fn merge_contact_entries(storage: &Storage, entries: &[ContactEntry<'_>]) -> Result<()> {
    if entries.is_empty() {
        return Ok(());
    }
    let (mut list, mut commit) = storage.open_for_update::<vault_domain::ContactList>(paths::CONTACTS)?;
    for entry in entries {
        list.upsert(vault_domain::Contact {
            user_id: entry.user_id,
            email: entry.email.to_string(),
            public_key: encoding::decode_fixed(&entry.public_key)?,
            date_modified: entry.date_modified,
        });
    }
    let mut next = BTreeMap::new();
    next.insert(paths::CONTACTS.to_string(), list);
    commit.commit(&next)?;
    Ok(())
}

/// §4.7 "a local file is removed only if the event's date strictly exceeds
/// the local `dateModified`": a file touched again locally after the
/// tombstone's date survives the merge.
fn apply_deletes_to_set(storage: &Storage, path: &str, events: &[&DeleteEventEntry<'_>]) -> Result<()> {
    let (mut set, mut commit) = storage.open_for_update::<LocalFileSet>(path)?;
    let mut touched = false;
    for event in events {
        let should_remove = set
            .local
            .files
            .get(event.file.as_ref())
            .map(|f| event.date > f.date_modified)
            .unwrap_or(true);
        if should_remove {
            set.local.files.remove(event.file.as_ref());
            set.remote_files.remove(event.file.as_ref());
            touched = true;
        }
    }
    if !touched {
        commit.rollback()?;
        return Ok(());
    }
    let mut next = BTreeMap::new();
    next.insert(path.to_string(), set);
    commit.commit(&next)?;
    Ok(())
}

fn merge_delete_entries(storage: &Storage, entries: &[DeleteEventEntry<'_>]) -> Result<()> {
    if entries.is_empty() {
        return Ok(());
    }
    let gallery: Vec<_> = entries
        .iter()
        .filter(|e| matches!(e.kind, DeleteEventType::GalleryMove))
        .collect();
    apply_deletes_to_set(storage, paths::GALLERY, &gallery)?;

    let trash: Vec<_> = entries
        .iter()
        .filter(|e| matches!(e.kind, DeleteEventType::TrashMove | DeleteEventType::TrashDelete))
        .collect();
    apply_deletes_to_set(storage, paths::TRASH, &trash)?;

    for event in entries.iter().filter(|e| matches!(e.kind, DeleteEventType::AlbumFileRemove)) {
        apply_deletes_to_set(storage, &paths::album(&event.album_id), std::slice::from_ref(&event))?;
    }

    for event in entries.iter().filter(|e| matches!(e.kind, DeleteEventType::AlbumDelete)) {
        let (mut manifest, mut commit) = storage.open_for_update::<LocalAlbumManifest>(paths::MANIFEST)?;
        manifest.local.remove(&event.album_id);
        manifest.remote_albums.remove(event.album_id.as_ref());
        let mut next = BTreeMap::new();
        next.insert(paths::MANIFEST.to_string(), manifest);
        commit.commit(&next)?;
    }
    Ok(())
}

/// Runs one pull: fetches updates since the stored watermarks, merges every
/// list into the local mirror, and advances the watermarks to what the
/// server actually returned.
pub async fn pull(
    storage: &Storage,
    transport: &Transport,
    token: &str,
) -> Result<GetUpdatesParts<'static>> {
    let (watermarks, mut commit) = storage.open_for_update::<Watermarks>(paths::WATERMARKS)?;
    let req = watermarks.as_request();
    let parts: GetUpdatesParts<'static> = transport.post_authed("/v2/sync/getUpdates", token, &req).await?;

    merge_file_entries(storage, paths::GALLERY, &parts.files)?;
    merge_file_entries(storage, paths::TRASH, &parts.trash)?;
    merge_album_entries(storage, paths::MANIFEST, &parts.albums)?;
    for entry in &parts.album_files {
        merge_file_entries(storage, &paths::album(&entry.album_id), std::slice::from_ref(entry))?;
    }
    merge_contact_entries(storage, &parts.contacts)?;
    merge_delete_entries(storage, &parts.deletes)?;

    let max_file_date = parts.files.iter().map(|f| f.date_modified).max().unwrap_or(0);
    let max_trash_date = parts.trash.iter().map(|f| f.date_modified).max().unwrap_or(0);
    let max_album_date = parts.albums.iter().map(|a| a.date_modified).max().unwrap_or(0);
    let max_album_file_date = parts.album_files.iter().map(|f| f.date_modified).max().unwrap_or(0);
    let max_cnt_date = parts.contacts.iter().map(|c| c.date_modified).max().unwrap_or(0);
    let max_del_date = parts.deletes.iter().map(|d| d.date).max().unwrap_or(0);

    let mut advanced = watermarks;
    advanced.advance(&Watermarks {
        files_st: max_file_date,
        trash_st: max_trash_date,
        albums_st: max_album_date,
        album_files_st: max_album_file_date,
        cnt_st: max_cnt_date,
        del_st: max_del_date,
    });

    let mut next = BTreeMap::new();
    next.insert(paths::WATERMARKS.to_string(), advanced);
    commit.commit(&next)?;

    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vault_crypto::MasterKey;
    use tempfile::TempDir;

    fn storage(dir: &TempDir) -> Storage {
        let s = Storage::open(dir.path().to_path_buf(), MasterKey::generate()).unwrap();
        s.create_empty_file::<Watermarks>(paths::WATERMARKS).unwrap();
        s.create_empty_file::<LocalFileSet>(paths::GALLERY).unwrap();
        s.create_empty_file::<LocalFileSet>(paths::TRASH).unwrap();
        s.create_empty_file::<LocalAlbumManifest>(paths::MANIFEST).unwrap();
        s.create_empty_file::<vault_domain::ContactList>(paths::CONTACTS).unwrap();
        s
    }

    #[test]
    fn merging_files_populates_local_and_remote_snapshot() {
        let dir = TempDir::new().unwrap();
        let s = storage(&dir);
        let entry = FileEntry {
            file: "f1".into(),
            set: "0".into(),
            album_id: "".into(),
            date_created: 1,
            date_modified: 2,
            version: "1".into(),
            headers: encoding::encode(b"hdrs").into(),
            store_file: "blob1".into(),
            store_file_size: 10,
            store_thumb: "".into(),
            store_thumb_size: 0,
        };
        merge_file_entries(&s, paths::GALLERY, &[entry]).unwrap();

        let (set, _) = s.read_data_file::<LocalFileSet>(paths::GALLERY).unwrap();
        assert!(set.local.files.contains_key("f1"));
        assert!(set.remote_files.contains_key("f1"));
    }

    #[test]
    fn delete_event_keeps_files_modified_after_the_tombstone() {
        let dir = TempDir::new().unwrap();
        let s = storage(&dir);
        let entry = FileEntry {
            file: "f1".into(),
            set: "0".into(),
            album_id: "".into(),
            date_created: 1,
            date_modified: 100,
            version: "1".into(),
            headers: encoding::encode(b"hdrs").into(),
            store_file: "blob1".into(),
            store_file_size: 10,
            store_thumb: "".into(),
            store_thumb_size: 0,
        };
        merge_file_entries(&s, paths::GALLERY, &[entry]).unwrap();

        let event = DeleteEventEntry {
            file: "f1".into(),
            album_id: "".into(),
            kind: DeleteEventType::GalleryMove,
            date: 50,
        };
        merge_delete_entries(&s, &[event]).unwrap();

        let (set, _) = s.read_data_file::<LocalFileSet>(paths::GALLERY).unwrap();
        assert!(set.local.files.contains_key("f1"));
    }
}
