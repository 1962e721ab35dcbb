//! Incremental updates (§4.6 "Incremental updates") behind `/v2/sync/getUpdates`:
//! fan out across a user's gallery, trash and every album they belong to,
//! filter each collection by its watermark, and merge the results in the
//! caller's required sort order.

use vault_domain::{paths, AlbumManifest, AlbumSpec, ContactList, DeleteEvent, FileSet, FileSpec};
use wire::{
    AlbumEntry, ContactEntry, DeleteEventEntry, FileEntry, GetUpdatesParams, GetUpdatesParts,
};

use crate::encoding;
use crate::error::Result;
use crate::ServerCore;

/// The album FileSets a user currently has access to, resolved through
/// their `AlbumManifest` (§4.6, "for `AlbumSet`, fans out across the user's
/// AlbumManifest").
fn member_albums(core: &ServerCore, user_id: i64) -> Result<Vec<FileSet>> {
    let (manifest, _) = core
        .storage
        .read_data_file::<AlbumManifest>(&paths::manifest(user_id))?;
    let mut out = Vec::with_capacity(manifest.albums.len());
    for entry in manifest.albums.values() {
        let (file_set, _) = core.storage.read_data_file::<FileSet>(&entry.file_set_path)?;
        out.push(file_set);
    }
    Ok(out)
}

fn file_entry(spec: &FileSpec) -> FileEntry<'static> {
    FileEntry {
        file: spec.file_name.clone().into(),
        set: spec.set.clone().into(),
        album_id: spec.album_id.clone().into(),
        date_created: spec.date_created,
        date_modified: spec.date_modified,
        version: spec.version.clone().into(),
        headers: encoding::encode(&spec.headers).into(),
        store_file: spec.store_file.clone().into(),
        store_file_size: spec.store_file_size,
        store_thumb: spec.store_thumb.clone().into(),
        store_thumb_size: spec.store_thumb_size,
    }
}

fn delete_entry(event: &DeleteEvent) -> DeleteEventEntry<'static> {
    DeleteEventEntry {
        file: event.file.clone().into(),
        album_id: event.album_id.clone().into(),
        kind: event.kind,
        date: event.date,
    }
}

fn album_entry(spec: &AlbumSpec, viewer: i64) -> AlbumEntry<'static> {
    let enc_private_key = spec
        .enc_private_key_for(viewer)
        .map(encoding::encode)
        .unwrap_or_default();
    AlbumEntry {
        album_id: spec.album_id.clone().into(),
        date_created: spec.date_created,
        date_modified: spec.date_modified,
        enc_private_key: enc_private_key.into(),
        metadata: encoding::encode(&spec.metadata).into(),
        public_key: encoding::encode(&spec.public_key).into(),
        is_shared: spec.is_shared,
        is_hidden: spec.is_hidden,
        is_owner: spec.is_owner(viewer),
        permissions: spec.permissions.clone().into(),
        is_locked: spec.is_locked,
        cover: spec.cover.clone().into(),
        members: spec.members.iter().copied().collect(),
    }
}

/// `/v2/sync/getUpdates`: every changed file/album/contact and every delete
/// event strictly newer than its watermark, plus the user's space usage.
pub fn get_updates(core: &ServerCore, user_id: i64, req: &GetUpdatesParams) -> Result<GetUpdatesParts<'static>> {
    let (gallery, _) = core.storage.read_data_file::<FileSet>(&paths::gallery(user_id))?;
    let (trash, _) = core.storage.read_data_file::<FileSet>(&paths::trash(user_id))?;
    let (manifest, _) = core
        .storage
        .read_data_file::<AlbumManifest>(&paths::manifest(user_id))?;
    let albums = member_albums(core, user_id)?;
    let (contacts, _) = core.storage.read_data_file::<ContactList>(&paths::contacts(user_id))?;

    let files: Vec<FileEntry<'static>> = gallery
        .updated_since(req.files_st)
        .into_iter()
        .map(file_entry)
        .collect();
    let trash_files: Vec<FileEntry<'static>> = trash
        .updated_since(req.trash_st)
        .into_iter()
        .map(file_entry)
        .collect();

    let mut album_files: Vec<FileEntry<'static>> = albums
        .iter()
        .flat_map(|set| set.updated_since(req.album_files_st))
        .map(file_entry)
        .collect();
    album_files.sort_by(|a, b| {
        a.date_modified
            .cmp(&b.date_modified)
            .then_with(|| a.file.cmp(&b.file))
    });

    let mut album_entries: Vec<AlbumEntry<'static>> = albums
        .iter()
        .filter_map(|set| set.album.as_ref())
        .filter(|spec| spec.date_modified > req.albums_st)
        .map(|spec| album_entry(spec, user_id))
        .collect();
    album_entries.sort_by(|a, b| {
        a.date_modified
            .cmp(&b.date_modified)
            .then_with(|| a.album_id.cmp(&b.album_id))
    });

    let contacts: Vec<ContactEntry<'static>> = contacts
        .contacts
        .values()
        .filter(|c| c.date_modified > req.cnt_st)
        .map(|c| ContactEntry {
            user_id: c.user_id,
            email: c.email.clone().into(),
            public_key: encoding::encode(&c.public_key).into(),
            date_modified: c.date_modified,
        })
        .collect();

    let mut deletes: Vec<DeleteEventEntry<'static>> = gallery
        .deletes_since(req.del_st)
        .into_iter()
        .chain(trash.deletes_since(req.del_st))
        .chain(albums.iter().flat_map(|set| set.deletes_since(req.del_st)))
        .chain(manifest.deletes.iter().filter(|d| d.date > req.del_st))
        .map(delete_entry)
        .collect();
    deletes.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.file.cmp(&b.file)));

    let space_used = space_used(core, user_id)?;

    Ok(GetUpdatesParts {
        files,
        trash: trash_files,
        albums: album_entries,
        album_files,
        contacts,
        deletes,
        space_used,
        space_quota: core.space_quota_mib,
    })
}

/// §4.6 "SpaceUsed ... only counts files in sets where the user is the
/// owner (to avoid double-billing shared media)": gallery and trash always
/// count, but a member's view of a shared album is skipped — it is billed
/// once, against the owner.
pub fn space_used(core: &ServerCore, user_id: i64) -> Result<u64> {
    let (gallery, _) = core.storage.read_data_file::<FileSet>(&paths::gallery(user_id))?;
    let (trash, _) = core.storage.read_data_file::<FileSet>(&paths::trash(user_id))?;
    let albums = member_albums(core, user_id)?;

    let owned_bytes: u64 = albums
        .iter()
        .filter(|set| set.album.as_ref().map(|a| a.is_owner(user_id)).unwrap_or(false))
        .map(|set| set.total_size())
        .sum();

    let total = gallery.total_size() + trash.total_size() + owned_bytes;
    Ok(total / (1024 * 1024))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;
    use tempfile::TempDir;
    use vault_blobstore::BlobStore;
    use vault_crypto::MasterKey;
    use vault_storage::Storage;
    use wire::UploadMetadata;

    fn core(dir: &TempDir) -> ServerCore {
        let storage = Storage::open(dir.path().join("meta"), MasterKey::generate()).unwrap();
        let blobs = BlobStore::open(dir.path().join("blobs"), storage.clone()).unwrap();
        ServerCore::with_system_clock(storage, blobs, 5000)
    }

    fn seed(core: &ServerCore, user_id: i64) {
        core.storage.create_empty_file::<FileSet>(&paths::gallery(user_id)).unwrap();
        core.storage.create_empty_file::<FileSet>(&paths::trash(user_id)).unwrap();
        core.storage
            .create_empty_file::<AlbumManifest>(&paths::manifest(user_id))
            .unwrap();
        core.storage
            .create_empty_file::<ContactList>(&paths::contacts(user_id))
            .unwrap();
    }

    #[test]
    fn get_updates_reports_only_files_newer_than_watermark() {
        let dir = TempDir::new().unwrap();
        let core = core(&dir);
        seed(&core, 1);

        crate::file::upload(
            &core,
            1,
            &UploadMetadata {
                headers: Cow::from(encoding::encode(b"h")),
                set: Cow::from(paths::GALLERY_SET),
                album_id: Cow::from(""),
                date_created: 5,
                date_modified: 5,
                version: Cow::from("1"),
            },
            b"data",
            None,
        )
        .unwrap();

        let parts = get_updates(&core, 1, &GetUpdatesParams::default()).unwrap();
        assert_eq!(parts.files.len(), 1);

        let parts2 = get_updates(
            &core,
            1,
            &GetUpdatesParams {
                files_st: 5,
                ..Default::default()
            },
        )
        .unwrap();
        assert!(parts2.files.is_empty());
    }

    #[test]
    fn space_used_counts_owner_album_once() {
        let dir = TempDir::new().unwrap();
        let core = core(&dir);
        seed(&core, 1);

        crate::album::add_album(
            &core,
            1,
            &wire::AddAlbumParams {
                album_id: Cow::from("alb1"),
                date_created: 1,
                date_modified: 1,
                enc_private_key: Cow::from(encoding::encode(b"k")),
                metadata: Cow::from(encoding::encode(b"m")),
                public_key: Cow::from(encoding::encode(&[1u8; 32])),
            },
        )
        .unwrap();

        crate::file::upload(
            &core,
            1,
            &UploadMetadata {
                headers: Cow::from(encoding::encode(b"h")),
                set: Cow::from(""),
                album_id: Cow::from("alb1"),
                date_created: 1,
                date_modified: 1,
                version: Cow::from("1"),
            },
            &vec![0u8; 2 * 1024 * 1024],
            None,
        )
        .unwrap();

        let used = space_used(&core, 1).unwrap();
        assert_eq!(used, 2);
    }
}
