//! `AlbumSpec` (§3). Embedded inside the album's [`crate::FileSet`] rather
//! than stored standalone, so granting a member access to both the share
//! metadata and the file list is a single atomic write (§3 "Ownership").

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::permissions::DEFAULT_PERMISSIONS;

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct AlbumSpec {
    pub album_id: String,
    pub owner_id: i64,
    pub date_created: i64,
    pub date_modified: i64,
    /// The album private key, wrapped for the owner. Non-owners never see
    /// this field populated; they read their own entry out of `sharing_keys`
    /// instead (§3, "Non-owners see encPrivateKey = their own entry").
    pub enc_private_key: Vec<u8>,
    pub metadata: Vec<u8>,
    pub public_key: [u8; 32],
    pub is_shared: bool,
    pub is_hidden: bool,
    pub is_locked: bool,
    pub cover: String,
    pub permissions: String,
    pub members: BTreeSet<i64>,
    pub sharing_keys: BTreeMap<i64, Vec<u8>>,
}

impl AlbumSpec {
    pub fn new(album_id: String, owner_id: i64, now: i64) -> Self {
        AlbumSpec {
            album_id,
            owner_id,
            date_created: now,
            date_modified: now,
            permissions: DEFAULT_PERMISSIONS.to_string(),
            ..Default::default()
        }
    }

    pub fn is_owner(&self, user_id: i64) -> bool {
        self.owner_id == user_id
    }

    /// `encPrivateKey` as seen by `viewer`: the owner's own wrapped key, or
    /// the viewer's entry in `sharingKeys`.
    pub fn enc_private_key_for(&self, viewer: i64) -> Option<&[u8]> {
        if self.is_owner(viewer) {
            Some(&self.enc_private_key)
        } else {
            self.sharing_keys.get(&viewer).map(Vec::as_slice)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_owner_sees_own_sharing_key_not_owner_key() {
        let mut album = AlbumSpec::new("alb1".into(), 1, 1000);
        album.enc_private_key = vec![9, 9, 9];
        album.sharing_keys.insert(2, vec![1, 2, 3]);

        assert_eq!(album.enc_private_key_for(1), Some(&[9, 9, 9][..]));
        assert_eq!(album.enc_private_key_for(2), Some(&[1, 2, 3][..]));
        assert_eq!(album.enc_private_key_for(3), None);
    }
}
