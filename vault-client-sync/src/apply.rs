//! Apply (§4.7 "Apply"): pushes a computed [`crate::diff::Diff`] to the
//! server in the ordered passes spec.md requires — add albums, rename,
//! change perms, upload files, move/copy files, delete files, remove
//! albums — fanning uploads out across a fixed-size worker pool (§4.7, §9
//! "task pool of fixed size reading from an input queue").

use std::collections::BTreeMap;

use vault_domain::AlbumSpec;
use wire::{
    AddAlbumParams, DeleteAlbumParams, DeleteParams, EditPermsParams, MoveFileParams,
    RenameAlbumParams, UploadMetadata,
};

use crate::diff::{AlbumDiff, Diff, FileOp, Position};
use crate::encoding;
use crate::error::Result;
use crate::model::{paths, LocalAlbumManifest, LocalFileSet};
use crate::transport::Transport;
use vault_blobstore::BlobStore;
use vault_crypto::{seal, SealedBoxKeyPair};
use vault_storage::Storage;

/// Fixed worker-pool width for bulk IO fan-out (§4.7, §5: "fixed at 5
/// concurrent workers").
pub const WORKER_COUNT: usize = 5;

/// The local user's own sealed-box keypair. Used to open per-album private
/// keys out of `AlbumSpec::sharing_keys`/`encPrivateKey` and to re-encrypt a
/// file's header bundle whenever a move/copy crosses from one recipient key
/// to another (§4.7 "re-encryption of file headers on cross-album moves").
#[derive(Clone)]
pub struct KeyRing {
    user_id: i64,
    user: std::sync::Arc<SealedBoxKeyPair>,
}

impl KeyRing {
    pub fn new(user_id: i64, user: SealedBoxKeyPair) -> Self {
        KeyRing {
            user_id,
            user: std::sync::Arc::new(user),
        }
    }

    fn album_keypair(&self, spec: &AlbumSpec) -> Result<SealedBoxKeyPair> {
        let wrapped = spec
            .enc_private_key_for(self.user_id)
            .ok_or(crate::error::Error::FormatError)?;
        let opened = self.user.open(wrapped)?;
        let secret: [u8; 32] = opened.try_into().map_err(|_| crate::error::Error::FormatError)?;
        Ok(SealedBoxKeyPair::from_secret_bytes(secret))
    }

    fn keypair_for(&self, album: Option<&AlbumSpec>) -> Result<SealedBoxKeyPair> {
        match album {
            Some(spec) => self.album_keypair(spec),
            None => Ok(SealedBoxKeyPair::from_secret_bytes(self.user.secret_bytes())),
        }
    }

    fn public_key_for(&self, album: Option<&AlbumSpec>) -> vault_crypto::X25519PublicKey {
        match album {
            Some(spec) => vault_crypto::public_key_from_bytes(spec.public_key),
            None => self.user.public_key(),
        }
    }

    /// Opens `headers` under `from`'s recipient key and reseals the same
    /// plaintext under `to`'s. A same-recipient move (e.g. gallery→trash)
    /// round-trips through open+reseal unchanged; a cross-album move
    /// produces genuinely different ciphertext.
    pub fn reencrypt_headers(
        &self,
        headers: &[u8],
        from_album: Option<&AlbumSpec>,
        to_album: Option<&AlbumSpec>,
    ) -> Result<Vec<u8>> {
        let opener = self.keypair_for(from_album)?;
        let plaintext = opener.open(headers)?;
        let recipient = self.public_key_for(to_album);
        Ok(seal(&recipient, &plaintext)?)
    }
}

/// Aggregated outcome of one `apply` pass: §9's "aggregated result set" —
/// the first error is surfaced through `Result`, but every other failure in
/// the batch is still visible here rather than silently dropped.
#[derive(Debug, Default)]
pub struct ApplyReport {
    pub albums_added: usize,
    pub albums_renamed: usize,
    pub perms_changed: usize,
    pub files_uploaded: usize,
    pub files_moved_or_copied: usize,
    pub files_deleted: usize,
    pub albums_removed: usize,
    pub errors: Vec<crate::error::Error>,
}

fn position_path(position: &Position) -> String {
    if !position.album_id.is_empty() {
        paths::album(&position.album_id)
    } else if position.set == "1" {
        paths::TRASH.to_string()
    } else {
        paths::GALLERY.to_string()
    }
}

fn position_album(storage: &Storage, position: &Position) -> Result<Option<AlbumSpec>> {
    if position.album_id.is_empty() {
        return Ok(None);
    }
    let (set, _) = storage.read_data_file::<LocalFileSet>(&position_path(position))?;
    Ok(set.local.album)
}

/// A fixed-size worker pool over async upload tasks (§4.7, §9): the
/// producer enqueues every item then closes the channel; each of
/// [`WORKER_COUNT`] workers drains it concurrently, and the caller collects
/// exactly as many results as items pushed.
async fn run_pool<T, F, Fut>(items: Vec<T>, work: F) -> Vec<Result<()>>
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<()>> + Send,
{
    use tokio::sync::mpsc;

    let (input_tx, input_rx) = mpsc::unbounded_channel::<T>();
    let (output_tx, mut output_rx) = mpsc::unbounded_channel::<Result<()>>();
    let input_rx = std::sync::Arc::new(tokio::sync::Mutex::new(input_rx));
    let work = std::sync::Arc::new(work);

    let item_count = items.len();
    for item in items {
        let _ = input_tx.send(item);
    }
    drop(input_tx);

    let mut handles = Vec::with_capacity(WORKER_COUNT);
    for _ in 0..WORKER_COUNT {
        let input_rx = input_rx.clone();
        let output_tx = output_tx.clone();
        let work = work.clone();
        handles.push(tokio::spawn(async move {
            loop {
                let item = {
                    let mut guard = input_rx.lock().await;
                    guard.recv().await
                };
                match item {
                    Some(item) => {
                        let result = work(item).await;
                        let _ = output_tx.send(result);
                    }
                    None => break,
                }
            }
        }));
    }
    drop(output_tx);

    for handle in handles {
        let _ = handle.await;
    }

    let mut results = Vec::with_capacity(item_count);
    while let Some(result) = output_rx.recv().await {
        results.push(result);
    }
    results
}

fn first_error(results: Vec<Result<()>>, errors: &mut Vec<crate::error::Error>, succeeded: &mut usize) {
    for result in results {
        match result {
            Ok(()) => *succeeded += 1,
            Err(e) => errors.push(e),
        }
    }
}

async fn add_albums(
    storage: &Storage,
    transport: &Transport,
    token: &str,
    specs: &[AlbumSpec],
    report: &mut ApplyReport,
) {
    for spec in specs {
        let req = AddAlbumParams {
            album_id: spec.album_id.clone().into(),
            date_created: spec.date_created,
            date_modified: spec.date_modified,
            enc_private_key: encoding::encode(&spec.enc_private_key).into(),
            metadata: encoding::encode(&spec.metadata).into(),
            public_key: encoding::encode(&spec.public_key).into(),
        };
        match transport.post_authed::<_, ()>("/v2/sync/addAlbum", token, &req).await {
            Ok(()) => {
                if let Ok((mut manifest, mut commit)) =
                    storage.open_for_update::<LocalAlbumManifest>(paths::MANIFEST)
                {
                    let entry = vault_domain::AlbumManifestEntry {
                        album_id: spec.album_id.clone(),
                        file_set_path: paths::album(&spec.album_id),
                    };
                    manifest.remote_albums.insert(entry.album_id.clone(), entry);
                    let mut next = BTreeMap::new();
                    next.insert(paths::MANIFEST.to_string(), manifest);
                    let _ = commit.commit(&next);
                }
                report.albums_added += 1;
            }
            Err(e) => report.errors.push(e),
        }
    }
}

async fn rename_and_reperm(
    storage: &Storage,
    transport: &Transport,
    token: &str,
    diff: &AlbumDiff,
    report: &mut ApplyReport,
) -> Result<()> {
    for album_id in &diff.to_rename {
        let (set, _) = storage.read_data_file::<LocalFileSet>(&paths::album(album_id))?;
        let Some(spec) = set.local.album else { continue };
        let req = RenameAlbumParams {
            album_id: spec.album_id.clone().into(),
            metadata: encoding::encode(&spec.metadata).into(),
        };
        match transport.post_authed::<_, ()>("/v2/sync/renameAlbum", token, &req).await {
            Ok(()) => report.albums_renamed += 1,
            Err(e) => report.errors.push(e),
        }
    }
    for album_id in &diff.perms_to_change {
        let (set, _) = storage.read_data_file::<LocalFileSet>(&paths::album(album_id))?;
        let Some(spec) = set.local.album else { continue };
        let req = EditPermsParams {
            album_id: spec.album_id.clone().into(),
            permissions: spec.permissions.clone().into(),
        };
        match transport.post_authed::<_, ()>("/v2/sync/editPerms", token, &req).await {
            Ok(()) => report.perms_changed += 1,
            Err(e) => report.errors.push(e),
        }
    }
    Ok(())
}

struct UploadJob {
    meta: UploadMetadata<'static>,
    data: Vec<u8>,
    thumb: Option<Vec<u8>>,
}

async fn upload_files(
    storage: &Storage,
    blobs: &BlobStore,
    transport: &Transport,
    token: &str,
    uploads: Vec<(String, Position)>,
    report: &mut ApplyReport,
) -> Result<()> {
    let mut jobs = Vec::with_capacity(uploads.len());
    for (file_name, to) in uploads {
        let (set, _) = storage.read_data_file::<LocalFileSet>(&position_path(&to))?;
        let Some(spec) = set.local.files.get(&file_name).cloned() else { continue };
        let data = blobs.read_blob(&spec.store_file)?;
        let thumb = if spec.store_thumb.is_empty() {
            None
        } else {
            blobs.read_blob(&spec.store_thumb).ok()
        };
        let set_field = if to.album_id.is_empty() { to.set.clone() } else { String::new() };
        let meta = UploadMetadata {
            headers: encoding::encode(&spec.headers).into(),
            set: set_field.into(),
            album_id: to.album_id.clone().into(),
            date_created: spec.date_created,
            date_modified: spec.date_modified,
            version: spec.version.clone().into(),
        };
        jobs.push(UploadJob { meta, data, thumb });
    }

    let token = token.to_string();
    let transport = transport.clone();
    let results = run_pool(jobs, move |job: UploadJob| {
        let transport = transport.clone();
        let token = token.clone();
        async move {
            transport.upload(&token, &job.meta, job.data, job.thumb).await?;
            Ok(())
        }
    })
    .await;

    let mut succeeded = 0;
    first_error(results, &mut report.errors, &mut succeeded);
    report.files_uploaded += succeeded;
    Ok(())
}

async fn move_or_copy_files(
    storage: &Storage,
    transport: &Transport,
    token: &str,
    keys: &KeyRing,
    ops: Vec<(String, Position, Position, bool)>,
    report: &mut ApplyReport,
) -> Result<()> {
    // Group by (from, to, is_moving) so files sharing the same pair of
    // positions travel in one `moveFile` call, matching §6.1's batched
    // `filename{i}`/`headers{i}` shape.
    let mut groups: BTreeMap<(String, String, bool), (Position, Position, Vec<String>)> = BTreeMap::new();
    for (file_name, from, to, is_moving) in ops {
        groups
            .entry((position_path(&from), position_path(&to), is_moving))
            .or_insert_with(|| (from, to, Vec::new()))
            .2
            .push(file_name);
    }

    for ((_, _, is_moving), (from, to, file_names)) in groups {
        let from_album = position_album(storage, &from)?;
        let to_album = position_album(storage, &to)?;
        let (from_set, _) = storage.read_data_file::<LocalFileSet>(&position_path(&from))?;

        let mut filenames = Vec::with_capacity(file_names.len());
        let mut headers = Vec::with_capacity(file_names.len());
        for name in &file_names {
            let Some(spec) = from_set.local.files.get(name) else { continue };
            let reenc = keys.reencrypt_headers(&spec.headers, from_album.as_ref(), to_album.as_ref())?;
            filenames.push(name.clone().into());
            headers.push(encoding::encode(&reenc).into());
        }
        if filenames.is_empty() {
            continue;
        }

        let sent = filenames.len();
        let set_from = if from.album_id.is_empty() { from.set.clone() } else { String::new() };
        let set_to = if to.album_id.is_empty() { to.set.clone() } else { String::new() };
        let req = MoveFileParams {
            set_from: set_from.into(),
            set_to: set_to.into(),
            album_id_from: from.album_id.clone().into(),
            album_id_to: to.album_id.clone().into(),
            is_moving,
            filenames,
            headers,
        };
        match transport.post_authed::<_, ()>("/v2/sync/moveFile", token, &req).await {
            Ok(()) => report.files_moved_or_copied += sent,
            Err(e) => report.errors.push(e),
        }
    }
    Ok(())
}

/// §4.7 "candidate delete... stage a move to Trash, then a real delete": a
/// deletion whose position is not already Trash first moves there, then is
/// permanently deleted; a deletion already in Trash skips straight to the
/// permanent delete call.
async fn delete_files(
    storage: &Storage,
    transport: &Transport,
    token: &str,
    keys: &KeyRing,
    deletes: Vec<(String, Position)>,
    report: &mut ApplyReport,
) -> Result<()> {
    let trash = Position {
        set: "1".to_string(),
        album_id: String::new(),
    };
    let mut to_move: BTreeMap<String, Vec<(String, Position)>> = BTreeMap::new();
    let mut to_purge: Vec<String> = Vec::new();

    for (file_name, at) in deletes {
        if at == trash {
            to_purge.push(file_name);
        } else {
            to_move.entry(position_path(&at)).or_default().push((file_name, at));
        }
    }

    for (_, group) in to_move {
        let names: Vec<String> = group.iter().map(|(name, _)| name.clone()).collect();
        let ops: Vec<(String, Position, Position, bool)> = group
            .into_iter()
            .map(|(name, at)| (name, at, trash.clone(), true))
            .collect();
        move_or_copy_files(storage, transport, token, keys, ops, report).await?;
        // §4.7: a candidate delete not already in Trash is moved there and
        // then purged in the same apply pass, not left for a later sync.
        to_purge.extend(names);
    }

    if !to_purge.is_empty() {
        let req = DeleteParams {
            filenames: to_purge.iter().map(|n| n.clone().into()).collect(),
        };
        match transport.post_authed::<_, ()>("/v2/sync/delete", token, &req).await {
            Ok(()) => report.files_deleted += to_purge.len(),
            Err(e) => report.errors.push(e),
        }
    }
    Ok(())
}

async fn remove_albums(
    storage: &Storage,
    transport: &Transport,
    token: &str,
    album_ids: &[String],
    report: &mut ApplyReport,
) {
    for album_id in album_ids {
        let req = DeleteAlbumParams {
            album_id: album_id.clone().into(),
        };
        match transport.post_authed::<_, ()>("/v2/sync/deleteAlbum", token, &req).await {
            Ok(()) => {
                if let Ok((mut manifest, mut commit)) =
                    storage.open_for_update::<LocalAlbumManifest>(paths::MANIFEST)
                {
                    manifest.remote_albums.remove(album_id);
                    let mut next = BTreeMap::new();
                    next.insert(paths::MANIFEST.to_string(), manifest);
                    let _ = commit.commit(&next);
                }
                report.albums_removed += 1;
            }
            Err(e) => report.errors.push(e),
        }
    }
}

/// Runs every pass of `apply` in the order §4.7 specifies. Errors in any
/// one pass do not abort the rest — every op this call could make progress
/// on still runs, and the full set of failures comes back in the report.
pub async fn apply(
    storage: &Storage,
    blobs: &BlobStore,
    transport: &Transport,
    token: &str,
    keys: &KeyRing,
    diff: Diff,
) -> Result<ApplyReport> {
    let mut report = ApplyReport::default();

    add_albums(storage, transport, token, &diff.albums.to_add, &mut report).await;
    rename_and_reperm(storage, transport, token, &diff.albums, &mut report).await?;

    let mut uploads = Vec::new();
    let mut moves_and_copies = Vec::new();
    let mut deletes = Vec::new();
    for op in diff.files {
        match op {
            FileOp::Upload { file_name, to } => uploads.push((file_name, to)),
            FileOp::Copy { file_name, from, to } => moves_and_copies.push((file_name, from, to, false)),
            FileOp::Move { file_name, from, to } => moves_and_copies.push((file_name, from, to, true)),
            FileOp::Delete { file_name, at } => deletes.push((file_name, at)),
        }
    }

    upload_files(storage, blobs, transport, token, uploads, &mut report).await?;
    move_or_copy_files(storage, transport, token, keys, moves_and_copies, &mut report).await?;
    delete_files(storage, transport, token, keys, deletes, &mut report).await?;
    remove_albums(storage, transport, token, &diff.albums.to_remove, &mut report).await;

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyring_reencrypts_headers_across_recipients() {
        let user = SealedBoxKeyPair::generate();
        let album_secret = SealedBoxKeyPair::generate();
        let keys = KeyRing::new(1, SealedBoxKeyPair::from_secret_bytes(user.secret_bytes()));

        let mut spec = AlbumSpec::new("alb1".into(), 1, 0);
        spec.public_key = album_secret.public_bytes();
        spec.enc_private_key = seal(&user.public_key(), &album_secret.secret_bytes()).unwrap();

        let headers = seal(&user.public_key(), b"plaintext-filename").unwrap();
        let reenc = keys.reencrypt_headers(&headers, None, Some(&spec)).unwrap();

        let opened = album_secret.open(&reenc).unwrap();
        assert_eq!(opened, b"plaintext-filename");
    }

    #[test]
    fn position_path_resolves_reserved_sets_and_albums() {
        let gallery = Position { set: "0".to_string(), album_id: String::new() };
        let trash = Position { set: "1".to_string(), album_id: String::new() };
        let album = Position { set: String::new(), album_id: "alb1".to_string() };
        assert_eq!(position_path(&gallery), paths::GALLERY);
        assert_eq!(position_path(&trash), paths::TRASH);
        assert_eq!(position_path(&album), paths::album("alb1"));
    }
}
