//! Upload, move/copy, delete and download (§4.5, §6.1 `/v2/sync/*`). Blob
//! bytes arrive and leave already encrypted under a per-file key the client
//! alone holds; this module only ever moves ciphertext and tracks refcounts.

use std::collections::{BTreeMap, HashMap};

use rand::RngCore;
use vault_domain::{paths, DeleteEvent, DeleteEventType, FileSet, FileSpec};
use wire::{
    DeleteParams, DownloadQuery, EmptyTrashParams, GetDownloadUrlsParams, GetDownloadUrlsParts,
    MoveFileParams, UploadMetadata,
};

use crate::encoding;
use crate::error::{Error, Result};
use crate::share::can_add_files;
use crate::ServerCore;

fn new_file_name() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn resolve_set_path(user_id: i64, set: &str, album_id: &str) -> String {
    if !album_id.is_empty() {
        return paths::album(album_id);
    }
    if set == paths::TRASH_SET {
        paths::trash(user_id)
    } else {
        paths::gallery(user_id)
    }
}

/// `download`/`getDownloadUrls` carry no separate `albumId` field (§6.1):
/// `set` alone locates the file, doubling as an album id whenever it is
/// neither of the two reserved per-user values.
fn resolve_download_path(user_id: i64, set: &str) -> String {
    match set {
        s if s == paths::GALLERY_SET => paths::gallery(user_id),
        s if s == paths::TRASH_SET => paths::trash(user_id),
        album_id => paths::album(album_id),
    }
}

/// Writes the file's blob(s), then links a new [`FileSpec`] into the target
/// set. Permission-checked against the album (if any) before any bytes are
/// written, so a rejected upload never leaves an orphaned blob behind.
pub fn upload(
    core: &ServerCore,
    user_id: i64,
    req: &UploadMetadata,
    data: &[u8],
    thumb: Option<&[u8]>,
) -> Result<String> {
    if !req.album_id.is_empty() && !can_add_files(core, user_id, &req.album_id)? {
        return Err(Error::Forbidden);
    }

    let store_file = vault_blobstore::generate_name();
    core.blobs.write_blob(&store_file, data)?;
    core.blobs.inc_ref_count(&store_file, 1)?;

    let store_thumb = if let Some(thumb_bytes) = thumb {
        let name = vault_blobstore::generate_name();
        core.blobs.write_blob(&name, thumb_bytes)?;
        core.blobs.inc_ref_count(&name, 1)?;
        name
    } else {
        String::new()
    };

    let file_name = new_file_name();
    let spec = FileSpec {
        file_name: file_name.clone(),
        headers: encoding::decode(&req.headers)?,
        set: req.set.to_string(),
        album_id: req.album_id.to_string(),
        date_created: req.date_created,
        date_modified: req.date_modified,
        version: req.version.to_string(),
        store_file,
        store_file_size: data.len() as u64,
        store_thumb,
        store_thumb_size: thumb.map(|t| t.len() as u64).unwrap_or(0),
    };

    let path = resolve_set_path(user_id, &req.set, &req.album_id);
    let (mut file_set, mut commit) = core.storage.open_for_update::<FileSet>(&path)?;
    file_set.files.insert(file_name.clone(), spec);

    let mut next = BTreeMap::new();
    next.insert(path, file_set);
    commit.commit(&next)?;

    Ok(file_name)
}

fn delete_kind_for_destination(dest_set: &str, dest_album: &str) -> DeleteEventType {
    if !dest_album.is_empty() {
        DeleteEventType::AlbumFileRemove
    } else if dest_set == paths::TRASH_SET {
        DeleteEventType::TrashMove
    } else {
        DeleteEventType::GalleryMove
    }
}

/// Moves (or copies) a batch of files between two sets. `headers[i]` is the
/// re-encrypted header bundle for `filenames[i]` under the destination
/// album's key — only the client can produce this, so the server never
/// re-derives it.
pub fn move_file(core: &ServerCore, user_id: i64, req: &MoveFileParams) -> Result<()> {
    if req.set_from == req.set_to && req.album_id_from == req.album_id_to {
        return Err(Error::SameSourceDestination);
    }
    if req.filenames.len() != req.headers.len() {
        return Err(Error::FormatError);
    }

    let source = resolve_set_path(user_id, &req.set_from, &req.album_id_from);
    let dest = resolve_set_path(user_id, &req.set_to, &req.album_id_to);
    let now = core.clock.now_millis();

    let mut names = vec![source.clone(), dest.clone()];
    names.sort();
    names.dedup();
    let mut txn = core.storage.open_many_for_update::<FileSet>(&names)?;

    let moved: Vec<(String, FileSpec)> = {
        let source_set = txn.values.get_mut(&source).ok_or(Error::FileNotFound)?;
        let mut out = Vec::with_capacity(req.filenames.len());
        for (filename, headers) in req.filenames.iter().zip(req.headers.iter()) {
            let mut spec = if req.is_moving {
                source_set.files.remove(filename.as_ref()).ok_or(Error::FileNotFound)?
            } else {
                source_set
                    .files
                    .get(filename.as_ref())
                    .cloned()
                    .ok_or(Error::FileNotFound)?
            };
            spec.headers = encoding::decode(headers)?;
            spec.set = req.set_to.to_string();
            spec.album_id = req.album_id_to.to_string();
            spec.date_modified = now;
            out.push((filename.to_string(), spec));
        }

        if req.is_moving {
            let kind = delete_kind_for_destination(&req.set_to, &req.album_id_to);
            vault_domain::append_sorted(
                &mut source_set.deletes,
                out.iter()
                    .map(|(name, _)| DeleteEvent::new(name.clone(), req.album_id_from.to_string(), kind, now)),
            );
        }
        out
    };

    let mut overwritten = Vec::new();
    {
        let dest_set = txn.values.get_mut(&dest).ok_or(Error::FileNotFound)?;
        for (name, spec) in &moved {
            if let Some(prev) = dest_set.files.insert(name.clone(), spec.clone()) {
                overwritten.push(prev);
            }
        }
    }

    // A move/copy landing on a name already present at the destination
    // replaces that entry; its blobs are no longer referenced from here,
    // so their refcounts must drop to avoid double-counting (§4.6 MoveFile).
    for spec in &overwritten {
        core.blobs.inc_ref_count(&spec.store_file, -1)?;
        if !spec.store_thumb.is_empty() {
            core.blobs.inc_ref_count(&spec.store_thumb, -1)?;
        }
    }

    if !req.is_moving {
        for (_, spec) in &moved {
            core.blobs.inc_ref_count(&spec.store_file, 1)?;
            if !spec.store_thumb.is_empty() {
                core.blobs.inc_ref_count(&spec.store_thumb, 1)?;
            }
        }
    }

    let next = txn.values.clone();
    txn.into_commit().commit(&next)?;
    Ok(())
}

/// Permanently removes every trashed file whose `dateModified` is at or
/// before `time`, releasing their blobs.
pub fn empty_trash(core: &ServerCore, user_id: i64, req: &EmptyTrashParams) -> Result<()> {
    let path = paths::trash(user_id);
    let (mut file_set, mut commit) = core.storage.open_for_update::<FileSet>(&path)?;

    let expired: Vec<String> = file_set
        .files
        .values()
        .filter(|f| f.date_modified <= req.time)
        .map(|f| f.file_name.clone())
        .collect();

    let mut removed = Vec::with_capacity(expired.len());
    for name in &expired {
        if let Some(spec) = file_set.files.remove(name) {
            removed.push(spec);
        }
    }

    vault_domain::append_sorted(
        &mut file_set.deletes,
        removed
            .iter()
            .map(|spec| DeleteEvent::new(spec.file_name.clone(), String::new(), DeleteEventType::TrashDelete, req.time)),
    );

    let mut next = BTreeMap::new();
    next.insert(path, file_set);
    commit.commit(&next)?;

    for spec in &removed {
        core.blobs.inc_ref_count(&spec.store_file, -1)?;
        if !spec.store_thumb.is_empty() {
            core.blobs.inc_ref_count(&spec.store_thumb, -1)?;
        }
    }
    Ok(())
}

/// Permanently deletes specific files out of the caller's trash (§6.1
/// `/v2/sync/delete` carries no `set`/`album`, so it only ever targets
/// trash — anything still live elsewhere must be moved there first).
pub fn delete_files(core: &ServerCore, user_id: i64, req: &DeleteParams) -> Result<()> {
    let path = paths::trash(user_id);
    let now = core.clock.now_millis();
    let (mut file_set, mut commit) = core.storage.open_for_update::<FileSet>(&path)?;

    let mut removed = Vec::with_capacity(req.filenames.len());
    for filename in &req.filenames {
        if let Some(spec) = file_set.files.remove(filename.as_ref()) {
            removed.push(spec);
        }
    }

    vault_domain::append_sorted(
        &mut file_set.deletes,
        removed
            .iter()
            .map(|spec| DeleteEvent::new(spec.file_name.clone(), String::new(), DeleteEventType::TrashDelete, now)),
    );

    let mut next = BTreeMap::new();
    next.insert(path, file_set);
    commit.commit(&next)?;

    for spec in &removed {
        core.blobs.inc_ref_count(&spec.store_file, -1)?;
        if !spec.store_thumb.is_empty() {
            core.blobs.inc_ref_count(&spec.store_thumb, -1)?;
        }
    }
    Ok(())
}

fn find_file<'a>(file_set: &'a FileSet, filename: &str) -> Result<&'a FileSpec> {
    file_set.files.get(filename).ok_or(Error::FileNotFound)
}

/// Reads the ciphertext bytes for one file (or its thumbnail) out of
/// whichever set/album the query names.
pub fn download(core: &ServerCore, user_id: i64, req: &DownloadQuery) -> Result<Vec<u8>> {
    let path = resolve_download_path(user_id, &req.set);
    let (file_set, _) = core.storage.read_data_file::<FileSet>(&path)?;
    let spec = find_file(&file_set, &req.file)?;
    let blob_name = if req.thumb { &spec.store_thumb } else { &spec.store_file };
    Ok(core.blobs.read_blob(blob_name)?)
}

/// §6.1 lists `getDownloadUrls` for parity with a CDN-backed deployment;
/// without one, the "URL" is just the same opaque download query the client
/// already knows how to issue (§1 Non-goals excludes CDN signing).
pub fn get_download_urls(core: &ServerCore, user_id: i64, req: &GetDownloadUrlsParams) -> Result<GetDownloadUrlsParts> {
    let mut urls = HashMap::new();
    for entry in &req.files {
        let path = resolve_download_path(user_id, &entry.set);
        let (file_set, _) = core.storage.read_data_file::<FileSet>(&path)?;
        find_file(&file_set, &entry.filename)?;
        urls.insert(
            entry.filename.to_string(),
            format!(
                "/v2/sync/download?file={}&set={}&thumb={}",
                entry.filename, entry.set, req.is_thumb
            ),
        );
    }
    Ok(GetDownloadUrlsParts { urls })
}
