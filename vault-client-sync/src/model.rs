//! Local mirror of the server's domain model (§4.7). Every collection the
//! client keeps locally pairs its live copy with a `Remote*` snapshot — the
//! last state the server confirmed — so [`crate::diff`] can tell "added
//! here since last sync" apart from "removed there since last sync"
//! without a second round-trip.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use vault_domain::{AlbumManifest, AlbumManifestEntry, FileSet, FileSpec};

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct LocalFileSet {
    pub local: FileSet,
    pub remote_files: BTreeMap<String, FileSpec>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct LocalAlbumManifest {
    pub local: AlbumManifest,
    pub remote_albums: BTreeMap<String, AlbumManifestEntry>,
}

/// Per-collection watermarks (§4.7, §8 property 6): advanced only to values
/// actually observed in a pull response, never regressed.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Watermarks {
    pub files_st: i64,
    pub trash_st: i64,
    pub albums_st: i64,
    pub album_files_st: i64,
    pub cnt_st: i64,
    pub del_st: i64,
}

impl Watermarks {
    /// Folds `observed` in, keeping the larger value per collection so a
    /// pull response can never move a watermark backwards.
    pub fn advance(&mut self, observed: &Watermarks) {
        self.files_st = self.files_st.max(observed.files_st);
        self.trash_st = self.trash_st.max(observed.trash_st);
        self.albums_st = self.albums_st.max(observed.albums_st);
        self.album_files_st = self.album_files_st.max(observed.album_files_st);
        self.cnt_st = self.cnt_st.max(observed.cnt_st);
        self.del_st = self.del_st.max(observed.del_st);
    }

    pub fn as_request(&self) -> wire::GetUpdatesParams {
        wire::GetUpdatesParams {
            files_st: self.files_st,
            trash_st: self.trash_st,
            albums_st: self.albums_st,
            album_files_st: self.album_files_st,
            cnt_st: self.cnt_st,
            del_st: self.del_st,
        }
    }
}

/// Logical names (mirroring `vault_domain::paths`) the local mirror's own
/// [`vault_storage::Storage`] instance persists under. Kept distinct from
/// the server's own paths module since this is a different root entirely —
/// a local, single-user store rather than a multi-tenant `home/{id}/...`
/// tree.
pub mod paths {
    pub const WATERMARKS: &str = "sync/watermarks";
    pub const GALLERY: &str = "sync/gallery";
    pub const TRASH: &str = "sync/trash";
    pub const MANIFEST: &str = "sync/manifest";
    pub const CONTACTS: &str = "sync/contacts";

    pub fn album(album_id: &str) -> String {
        format!("sync/album/{album_id}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watermarks_advance_never_regresses() {
        let mut w = Watermarks {
            files_st: 100,
            ..Default::default()
        };
        w.advance(&Watermarks {
            files_st: 50,
            trash_st: 10,
            ..Default::default()
        });
        assert_eq!(w.files_st, 100);
        assert_eq!(w.trash_st, 10);
    }
}
