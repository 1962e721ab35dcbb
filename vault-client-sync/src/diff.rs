//! Diff (§4.7 "Diff"): compares the local mirror's live file/album
//! positions against its last-known-remote snapshot and emits the set of
//! operations `apply` needs to reconcile the two.

use std::collections::{BTreeMap, HashMap};

use vault_domain::{AlbumManifestEntry, AlbumSpec};

use crate::error::Result;
use crate::model::{paths, LocalAlbumManifest, LocalFileSet};
use vault_storage::Storage;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Position {
    pub set: String,
    pub album_id: String,
}

impl Position {
    fn for_path(path: &str, album_id: &str) -> Self {
        if path == paths::GALLERY {
            Position { set: "0".to_string(), album_id: String::new() }
        } else if path == paths::TRASH {
            Position { set: "1".to_string(), album_id: String::new() }
        } else {
            Position { set: String::new(), album_id: album_id.to_string() }
        }
    }
}

#[derive(Debug, Clone)]
pub enum FileOp {
    Upload { file_name: String, to: Position },
    Copy { file_name: String, from: Position, to: Position },
    Move { file_name: String, from: Position, to: Position },
    /// A position present remotely but not locally: staged as a move to
    /// Trash followed by a real delete (§4.7 "candidate delete").
    Delete { file_name: String, at: Position },
}

#[derive(Debug, Clone, Default)]
pub struct AlbumDiff {
    pub to_add: Vec<AlbumSpec>,
    pub to_rename: Vec<String>,
    pub perms_to_change: Vec<String>,
    pub to_remove: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Diff {
    pub files: Vec<FileOp>,
    pub albums: AlbumDiff,
}

fn collect_positions(
    storage: &Storage,
    paths_to_scan: &[(String, String)],
) -> Result<(HashMap<String, Vec<Position>>, HashMap<String, Vec<Position>>)> {
    let mut local: HashMap<String, Vec<Position>> = HashMap::new();
    let mut remote: HashMap<String, Vec<Position>> = HashMap::new();

    for (path, album_id) in paths_to_scan {
        let (set, _) = storage.read_data_file::<LocalFileSet>(path)?;
        let position = Position::for_path(path, album_id);
        for name in set.local.files.keys() {
            local.entry(name.clone()).or_default().push(position.clone());
        }
        for name in set.remote_files.keys() {
            remote.entry(name.clone()).or_default().push(position.clone());
        }
    }
    Ok((local, remote))
}

/// Every FileSet the local mirror currently knows about: gallery, trash,
/// and one per album in the manifest.
fn all_set_paths(storage: &Storage) -> Result<Vec<(String, String)>> {
    let mut out = vec![
        (paths::GALLERY.to_string(), String::new()),
        (paths::TRASH.to_string(), String::new()),
    ];
    let (manifest, _) = storage.read_data_file::<LocalAlbumManifest>(paths::MANIFEST)?;
    for entry in manifest.local.albums.values() {
        out.push((entry.file_set_path.clone(), entry.album_id.clone()));
    }
    Ok(out)
}

fn diff_files(storage: &Storage) -> Result<Vec<FileOp>> {
    let set_paths = all_set_paths(storage)?;
    let (local, remote) = collect_positions(storage, &set_paths)?;

    let mut file_names: Vec<&String> = local.keys().chain(remote.keys()).collect();
    file_names.sort();
    file_names.dedup();

    let mut ops = Vec::new();
    for name in file_names {
        let locals = local.get(name).cloned().unwrap_or_default();
        let remotes = remote.get(name).cloned().unwrap_or_default();

        let mut candidate_adds: Vec<Position> = locals.iter().filter(|p| !remotes.contains(p)).cloned().collect();
        let mut candidate_deletes: Vec<Position> = remotes.iter().filter(|p| !locals.contains(p)).cloned().collect();

        while let (Some(to), Some(from)) = (candidate_adds.pop(), candidate_deletes.pop()) {
            ops.push(FileOp::Move {
                file_name: name.clone(),
                from,
                to,
            });
        }

        for to in candidate_adds {
            if let Some(from) = remotes.first().cloned() {
                ops.push(FileOp::Copy {
                    file_name: name.clone(),
                    from,
                    to,
                });
            } else {
                ops.push(FileOp::Upload {
                    file_name: name.clone(),
                    to,
                });
            }
        }

        for at in candidate_deletes {
            ops.push(FileOp::Delete {
                file_name: name.clone(),
                at,
            });
        }
    }
    Ok(ops)
}

fn diff_albums(storage: &Storage) -> Result<AlbumDiff> {
    let (manifest, _) = storage.read_data_file::<LocalAlbumManifest>(paths::MANIFEST)?;
    let mut out = AlbumDiff::default();

    let local_ids: BTreeMap<&String, &AlbumManifestEntry> = manifest.local.albums.iter().collect();
    for (id, entry) in &local_ids {
        if !manifest.remote_albums.contains_key(*id) {
            let (set, _) = storage.read_data_file::<LocalFileSet>(&entry.file_set_path)?;
            if let Some(spec) = set.local.album {
                out.to_add.push(spec);
            }
            continue;
        }
        let (set, _) = storage.read_data_file::<LocalFileSet>(&entry.file_set_path)?;
        if let Some(spec) = &set.local.album {
            out.to_rename.push(spec.album_id.clone());
            out.perms_to_change.push(spec.album_id.clone());
        }
    }
    for id in manifest.remote_albums.keys() {
        if !local_ids.contains_key(id) {
            out.to_remove.push(id.clone());
        }
    }
    Ok(out)
}

/// Computes the full local-vs-remote diff (§4.7 "Diff"): file-position
/// moves/copies/uploads/deletes plus album add/rename/perms/remove.
pub fn diff(storage: &Storage) -> Result<Diff> {
    Ok(Diff {
        files: diff_files(storage)?,
        albums: diff_albums(storage)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use vault_crypto::MasterKey;
    use vault_domain::FileSpec;

    fn storage(dir: &TempDir) -> Storage {
        let s = Storage::open(dir.path().to_path_buf(), MasterKey::generate()).unwrap();
        s.create_empty_file::<LocalFileSet>(paths::GALLERY).unwrap();
        s.create_empty_file::<LocalFileSet>(paths::TRASH).unwrap();
        s.create_empty_file::<LocalAlbumManifest>(paths::MANIFEST).unwrap();
        s
    }

    fn spec(name: &str) -> FileSpec {
        FileSpec {
            file_name: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn new_local_only_file_is_an_upload() {
        let dir = TempDir::new().unwrap();
        let s = storage(&dir);
        let (mut set, mut commit) = s.open_for_update::<LocalFileSet>(paths::GALLERY).unwrap();
        set.local.files.insert("f1".into(), spec("f1"));
        let mut next = BTreeMap::new();
        next.insert(paths::GALLERY.to_string(), set);
        commit.commit(&next).unwrap();

        let d = diff(&s).unwrap();
        assert!(matches!(d.files.as_slice(), [FileOp::Upload { .. }]));
    }

    #[test]
    fn moved_from_gallery_to_trash_is_a_move() {
        let dir = TempDir::new().unwrap();
        let s = storage(&dir);
        let (mut set, mut commit) = s.open_for_update::<LocalFileSet>(paths::GALLERY).unwrap();
        set.remote_files.insert("f1".into(), spec("f1"));
        let mut next = BTreeMap::new();
        next.insert(paths::GALLERY.to_string(), set);
        commit.commit(&next).unwrap();

        let (mut set, mut commit) = s.open_for_update::<LocalFileSet>(paths::TRASH).unwrap();
        set.local.files.insert("f1".into(), spec("f1"));
        let mut next = BTreeMap::new();
        next.insert(paths::TRASH.to_string(), set);
        commit.commit(&next).unwrap();

        let d = diff(&s).unwrap();
        assert!(matches!(d.files.as_slice(), [FileOp::Move { .. }]));
    }
}
