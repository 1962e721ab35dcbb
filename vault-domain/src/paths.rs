//! Logical names (§3/§6.4) under which the domain records persist through
//! [`vault_storage::Storage`]. These are opaque strings hashed by
//! `Storage::hash_string` into the on-disk fan-out; nothing here is a real
//! filesystem path.

pub const DIRECTORY: &str = "directory";

pub const GALLERY_SET: &str = "0";
pub const TRASH_SET: &str = "1";

pub fn user(user_id: i64) -> String {
    format!("home/{user_id}/user")
}

pub fn contacts(user_id: i64) -> String {
    format!("home/{user_id}/contacts")
}

pub fn manifest(user_id: i64) -> String {
    format!("home/{user_id}/manifest")
}

pub fn gallery(user_id: i64) -> String {
    format!("home/{user_id}/gallery")
}

pub fn trash(user_id: i64) -> String {
    format!("home/{user_id}/trash")
}

/// The one canonical path an album's FileSet lives at, regardless of which
/// member is accessing it — every member's [`crate::AlbumManifest`] entry
/// points here so all mutations converge on a single lock (§3, "Ownership").
pub fn album(album_id: &str) -> String {
    format!("album/{album_id}")
}

pub fn blob(name: &str) -> String {
    format!("blobs/{name}")
}

pub fn blob_ref(name: &str) -> String {
    format!("blobs/{name}.ref")
}
