//! Wire protocol types shared between `vault-server-core`, `vault-client-sync`
//! and the `client` binary.
//!
//! These are deliberately separate from the `vault-domain` record types: the
//! wire shapes are what crosses the network boundary (base64 blobs, opaque
//! strings) while the domain types carry the richer, locally-typed state that
//! `vault-storage` persists. Everything here is plain serde data; there is no
//! HTTP binding in this crate (HTTP routing is out of scope for this system).

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;

pub trait IntoOwned {
    type Owned;
    fn into_owned(self) -> Self::Owned;
}

fn owned_vec(v: Vec<Cow<'_, str>>) -> Vec<Cow<'static, str>> {
    v.into_iter().map(|s| Cow::Owned(s.into_owned())).collect()
}

/// Top-level response envelope for every `/v2/...` endpoint.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Nok,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Response<T> {
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parts: Option<T>,
    #[serde(default)]
    pub infos: Vec<String>,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl<T> Response<T> {
    pub fn ok(parts: T) -> Self {
        Response {
            status: Status::Ok,
            parts: Some(parts),
            infos: vec![],
            errors: vec![],
        }
    }

    pub fn ok_empty() -> Response<()> {
        Response {
            status: Status::Ok,
            parts: None,
            infos: vec![],
            errors: vec![],
        }
    }

    pub fn error(message: impl Into<String>) -> Response<()> {
        Response {
            status: Status::Nok,
            parts: None,
            infos: vec![],
            errors: vec![message.into()],
        }
    }

    /// Authentication failures tell the client to tear down its session (§7).
    pub fn logout_required(message: impl Into<String>) -> Response<LogoutFlag> {
        Response {
            status: Status::Nok,
            parts: Some(LogoutFlag { logout: true }),
            infos: vec![],
            errors: vec![message.into()],
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct LogoutFlag {
    pub logout: bool,
}

// ---------------------------------------------------------------------
// Registration / login (§6.1)
// ---------------------------------------------------------------------

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CreateAccount<'a> {
    pub email: Cow<'a, str>,
    pub password: Cow<'a, str>,
    pub salt: Cow<'a, str>,
    pub key_bundle: Cow<'a, str>,
    pub is_backup: bool,
}

impl<'a> IntoOwned for CreateAccount<'a> {
    type Owned = CreateAccount<'static>;
    fn into_owned(self) -> Self::Owned {
        CreateAccount {
            email: Cow::Owned(self.email.into_owned()),
            password: Cow::Owned(self.password.into_owned()),
            salt: Cow::Owned(self.salt.into_owned()),
            key_bundle: Cow::Owned(self.key_bundle.into_owned()),
            is_backup: self.is_backup,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PreLogin<'a> {
    pub email: Cow<'a, str>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PreLoginParts<'a> {
    pub salt: Cow<'a, str>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Login<'a> {
    pub email: Cow<'a, str>,
    pub password: Cow<'a, str>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct LoginParts<'a> {
    pub key_bundle: Cow<'a, str>,
    pub server_public_key: Cow<'a, str>,
    pub token: Cow<'a, str>,
    pub user_id: i64,
    pub is_key_backed_up: bool,
    pub home_folder: Cow<'a, str>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ChangePassParams<'a> {
    pub new_password: Cow<'a, str>,
    pub new_salt: Cow<'a, str>,
    pub key_bundle: Cow<'a, str>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ChangePassParts<'a> {
    pub token: Cow<'a, str>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CheckKey<'a> {
    pub email: Cow<'a, str>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CheckKeyParts<'a> {
    /// Sealed box: an ephemeral challenge only the real account holder can open.
    pub challenge: Cow<'a, str>,
    pub is_key_backed_up: bool,
    pub server_pk: Cow<'a, str>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RecoverAccount<'a> {
    pub email: Cow<'a, str>,
    pub params: ChangePassParams<'a>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ReuploadKeysParams<'a> {
    pub key_bundle: Cow<'a, str>,
}

// ---------------------------------------------------------------------
// Sync (§6.1 /v2/sync/*)
// ---------------------------------------------------------------------

/// Per-collection watermarks posted to `getUpdates`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default)]
pub struct GetUpdatesParams {
    pub files_st: i64,
    pub trash_st: i64,
    pub albums_st: i64,
    pub album_files_st: i64,
    pub cnt_st: i64,
    pub del_st: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FileEntry<'a> {
    pub file: Cow<'a, str>,
    pub set: Cow<'a, str>,
    pub album_id: Cow<'a, str>,
    pub date_created: i64,
    pub date_modified: i64,
    pub version: Cow<'a, str>,
    pub headers: Cow<'a, str>,
    pub store_file: Cow<'a, str>,
    pub store_file_size: u64,
    pub store_thumb: Cow<'a, str>,
    pub store_thumb_size: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AlbumEntry<'a> {
    pub album_id: Cow<'a, str>,
    pub date_created: i64,
    pub date_modified: i64,
    pub enc_private_key: Cow<'a, str>,
    pub metadata: Cow<'a, str>,
    pub public_key: Cow<'a, str>,
    pub is_shared: bool,
    pub is_hidden: bool,
    pub is_owner: bool,
    pub permissions: Cow<'a, str>,
    pub is_locked: bool,
    pub cover: Cow<'a, str>,
    pub members: Vec<i64>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ContactEntry<'a> {
    pub user_id: i64,
    pub email: Cow<'a, str>,
    pub public_key: Cow<'a, str>,
    pub date_modified: i64,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum DeleteEventType {
    GalleryMove,
    TrashMove,
    TrashDelete,
    AlbumDelete,
    AlbumFileRemove,
    ContactRemove,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct DeleteEventEntry<'a> {
    pub file: Cow<'a, str>,
    pub album_id: Cow<'a, str>,
    #[serde(rename = "type")]
    pub kind: DeleteEventType,
    pub date: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct GetUpdatesParts<'a> {
    #[serde(borrow)]
    pub files: Vec<FileEntry<'a>>,
    #[serde(borrow)]
    pub trash: Vec<FileEntry<'a>>,
    #[serde(borrow)]
    pub albums: Vec<AlbumEntry<'a>>,
    #[serde(borrow)]
    pub album_files: Vec<FileEntry<'a>>,
    #[serde(borrow)]
    pub contacts: Vec<ContactEntry<'a>>,
    #[serde(borrow)]
    pub deletes: Vec<DeleteEventEntry<'a>>,
    pub space_used: u64,
    pub space_quota: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct UploadMetadata<'a> {
    pub headers: Cow<'a, str>,
    pub set: Cow<'a, str>,
    pub album_id: Cow<'a, str>,
    pub date_created: i64,
    pub date_modified: i64,
    pub version: Cow<'a, str>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct MoveFileParams<'a> {
    pub set_from: Cow<'a, str>,
    pub set_to: Cow<'a, str>,
    pub album_id_from: Cow<'a, str>,
    pub album_id_to: Cow<'a, str>,
    pub is_moving: bool,
    #[serde(borrow)]
    pub filenames: Vec<Cow<'a, str>>,
    #[serde(borrow)]
    pub headers: Vec<Cow<'a, str>>,
}

impl<'a> IntoOwned for MoveFileParams<'a> {
    type Owned = MoveFileParams<'static>;
    fn into_owned(self) -> Self::Owned {
        MoveFileParams {
            set_from: Cow::Owned(self.set_from.into_owned()),
            set_to: Cow::Owned(self.set_to.into_owned()),
            album_id_from: Cow::Owned(self.album_id_from.into_owned()),
            album_id_to: Cow::Owned(self.album_id_to.into_owned()),
            is_moving: self.is_moving,
            filenames: owned_vec(self.filenames),
            headers: owned_vec(self.headers),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug)]
pub struct EmptyTrashParams {
    pub time: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct DeleteParams<'a> {
    #[serde(borrow)]
    pub filenames: Vec<Cow<'a, str>>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct DownloadQuery<'a> {
    pub file: Cow<'a, str>,
    pub set: Cow<'a, str>,
    pub thumb: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct DownloadUrlRequestEntry<'a> {
    pub filename: Cow<'a, str>,
    pub set: Cow<'a, str>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct GetDownloadUrlsParams<'a> {
    #[serde(borrow)]
    pub files: Vec<DownloadUrlRequestEntry<'a>>,
    pub is_thumb: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct GetDownloadUrlsParts {
    pub urls: HashMap<String, String>,
}

// ---------------------------------------------------------------------
// Albums (§6.1 /v2/sync/*Album*)
// ---------------------------------------------------------------------

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AddAlbumParams<'a> {
    pub album_id: Cow<'a, str>,
    pub date_created: i64,
    pub date_modified: i64,
    pub enc_private_key: Cow<'a, str>,
    pub metadata: Cow<'a, str>,
    pub public_key: Cow<'a, str>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct DeleteAlbumParams<'a> {
    pub album_id: Cow<'a, str>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RenameAlbumParams<'a> {
    pub album_id: Cow<'a, str>,
    pub metadata: Cow<'a, str>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ChangeAlbumCoverParams<'a> {
    pub album_id: Cow<'a, str>,
    pub cover: Cow<'a, str>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SharingKeyEntry<'a> {
    pub user_id: i64,
    pub enc_private_key: Cow<'a, str>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ShareAlbumParams<'a> {
    pub album_id: Cow<'a, str>,
    pub permissions: Cow<'a, str>,
    pub is_shared: bool,
    pub is_hidden: bool,
    pub is_locked: bool,
    #[serde(borrow)]
    pub sharing_keys: Vec<SharingKeyEntry<'a>>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct EditPermsParams<'a> {
    pub album_id: Cow<'a, str>,
    pub permissions: Cow<'a, str>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RemoveAlbumMemberParams<'a> {
    pub album_id: Cow<'a, str>,
    pub member_user_id: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct UnshareAlbumParams<'a> {
    pub album_id: Cow<'a, str>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct LeaveAlbumParams<'a> {
    pub album_id: Cow<'a, str>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct GetContactParams<'a> {
    pub email: Cow<'a, str>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct GetContactParts<'a> {
    #[serde(borrow)]
    pub contact: ContactEntry<'a>,
}

// ---------------------------------------------------------------------
// Token (§6.1 auth header)
// ---------------------------------------------------------------------

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct TokenClaims {
    pub subject: i64,
    pub scope: Cow<'static, str>,
    pub seq: i64,
}

// ---------------------------------------------------------------------
// Media file format (§6.2)
// ---------------------------------------------------------------------

pub const MEDIA_MAGIC: [u8; 2] = *b"SP";
pub const MEDIA_VERSION: u8 = 1;
pub const FILE_ID_LEN: usize = 32;
pub const MAX_ENC_HEADER_LEN: u32 = 64 * 1024;
pub const MAX_CHUNK_SIZE: u32 = 64 * 1024 * 1024;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum FileType {
    General = 0,
    Photo = 1,
    Video = 2,
}

/// The plaintext of `encHeader` once the sealed box around it is opened.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct MediaHeader {
    pub version: u8,
    pub chunk_size: u32,
    pub data_size: u64,
    pub symmetric_key: [u8; 32],
    pub file_type: FileType,
    pub filename: String,
    pub video_duration: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_envelope_round_trips() {
        let resp = Response::ok(PreLoginParts {
            salt: Cow::from("c2FsdA=="),
        });
        let json = serde_json::to_string(&resp).unwrap();
        let back: Response<PreLoginParts> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.parts.unwrap().salt, "c2FsdA==");
        assert!(matches!(back.status, Status::Ok));
    }

    #[test]
    fn error_response_has_no_parts() {
        let resp: Response<()> = Response::error("bad email");
        let json = serde_json::to_string(&resp).unwrap();
        assert!(!json.contains("\"parts\""));
        assert!(json.contains("bad email"));
    }

    #[test]
    fn move_file_params_into_owned() {
        let borrowed = "abc".to_string();
        let params = MoveFileParams {
            set_from: Cow::from("0"),
            set_to: Cow::from("1"),
            album_id_from: Cow::from(""),
            album_id_to: Cow::from(""),
            is_moving: true,
            filenames: vec![Cow::from(&borrowed)],
            headers: vec![],
        };
        let owned = params.into_owned();
        drop(borrowed);
        assert_eq!(owned.filenames[0], "abc");
    }

    #[test]
    fn delete_event_type_serializes_camel_case() {
        let json = serde_json::to_string(&DeleteEventType::TrashDelete).unwrap();
        assert_eq!(json, "\"trashDelete\"");
    }
}
