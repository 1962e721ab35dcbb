//! `FileSet` and `FileSpec` (§3). Every album has exactly one FileSet; each
//! user additionally owns a "gallery" (`set="0"`) and "trash" (`set="1"`)
//! FileSet of their own.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::album::AlbumSpec;
use crate::delete::DeleteEvent;

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct FileSpec {
    pub file_name: String,
    /// Per-user-encrypted header bundle (base64 on the wire, raw bytes at
    /// rest); opaque to the server.
    pub headers: Vec<u8>,
    pub set: String,
    pub album_id: String,
    pub date_created: i64,
    pub date_modified: i64,
    pub version: String,
    pub store_file: String,
    pub store_file_size: u64,
    pub store_thumb: String,
    pub store_thumb_size: u64,
}

/// One FileSet per album, plus "gallery" and "trash" per user. The
/// `AlbumSpec` is `Some` only for an album's FileSet (§3, "so that adding a
/// member grants atomic access to both").
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct FileSet {
    pub album: Option<AlbumSpec>,
    pub files: BTreeMap<String, FileSpec>,
    pub deletes: Vec<DeleteEvent>,
}

impl FileSet {
    pub fn total_size(&self) -> u64 {
        self.files
            .values()
            .map(|f| f.store_file_size + f.store_thumb_size)
            .sum()
    }

    pub fn updated_since(&self, ts: i64) -> Vec<&FileSpec> {
        let mut out: Vec<&FileSpec> = self
            .files
            .values()
            .filter(|f| f.date_modified > ts)
            .collect();
        out.sort_by(|a, b| {
            a.date_modified
                .cmp(&b.date_modified)
                .then_with(|| a.file_name.cmp(&b.file_name))
        });
        out
    }

    pub fn deletes_since(&self, ts: i64) -> Vec<&DeleteEvent> {
        let mut out: Vec<&DeleteEvent> = self.deletes.iter().filter(|d| d.date > ts).collect();
        out.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.file.cmp(&b.file)));
        out
    }
}

/// One entry in a user's `AlbumManifest` (§3): the album id plus the
/// logical name its FileSet lives under. Every member's entry points at the
/// same path so all mutations converge on one lock.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct AlbumManifestEntry {
    pub album_id: String,
    pub file_set_path: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct AlbumManifest {
    pub albums: BTreeMap<String, AlbumManifestEntry>,
    pub deletes: Vec<DeleteEvent>,
}

impl AlbumManifest {
    pub fn insert(&mut self, album_id: String, file_set_path: String) {
        self.albums.insert(
            album_id.clone(),
            AlbumManifestEntry {
                album_id,
                file_set_path,
            },
        );
    }

    pub fn remove(&mut self, album_id: &str) -> Option<AlbumManifestEntry> {
        self.albums.remove(album_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wire::DeleteEventType;

    fn spec(name: &str, modified: i64) -> FileSpec {
        FileSpec {
            file_name: name.to_string(),
            date_modified: modified,
            store_file_size: 100,
            store_thumb_size: 10,
            ..Default::default()
        }
    }

    #[test]
    fn updated_since_sorts_by_date_then_name() {
        let mut set = FileSet::default();
        set.files.insert("b".into(), spec("b", 20));
        set.files.insert("a".into(), spec("a", 20));
        set.files.insert("c".into(), spec("c", 5));

        let updated = set.updated_since(10);
        let names: Vec<_> = updated.iter().map(|f| f.file_name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn total_size_sums_file_and_thumb() {
        let mut set = FileSet::default();
        set.files.insert("a".into(), spec("a", 1));
        set.files.insert("b".into(), spec("b", 1));
        assert_eq!(set.total_size(), 220);
    }

    #[test]
    fn deletes_since_excludes_boundary_timestamp() {
        let mut set = FileSet::default();
        set.deletes.push(DeleteEvent::new("a", "", DeleteEventType::TrashDelete, 10));
        set.deletes.push(DeleteEvent::new("b", "", DeleteEventType::TrashDelete, 11));
        assert_eq!(set.deletes_since(10).len(), 1);
    }

    #[test]
    fn manifest_insert_and_remove() {
        let mut manifest = AlbumManifest::default();
        manifest.insert("alb1".into(), "album/alb1".into());
        assert_eq!(manifest.albums.len(), 1);
        let removed = manifest.remove("alb1").unwrap();
        assert_eq!(removed.file_set_path, "album/alb1");
        assert!(manifest.albums.is_empty());
    }
}
