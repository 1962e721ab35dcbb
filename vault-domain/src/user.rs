//! The `User` record (§3) and the global `UserDirectory` it is indexed by.

use serde::{Deserialize, Serialize};

/// Persisted at `home/{userID}/user`. `hashedPassword`/`salt` guard the login
/// flow; `keyBundle` is an opaque blob the client alone can interpret (it
/// holds the user's public key and, optionally, a passphrase-wrapped secret
/// key for key recovery). `tokenSeq` is bumped on logout or password change
/// so tokens signed against a stale sequence number stop verifying.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct User {
    pub user_id: i64,
    pub email: String,
    pub hashed_password: Vec<u8>,
    pub salt: Vec<u8>,
    pub home_folder: String,
    pub key_bundle: Vec<u8>,
    pub is_backup: bool,
    pub server_secret_key: [u8; 32],
    pub server_public_key: [u8; 32],
    pub server_sign_secret: [u8; 32],
    pub server_verify_key: [u8; 32],
    pub public_key: [u8; 32],
    pub token_seq: u64,
    pub space_quota_mib: u64,
}

/// One entry in the global `UserDirectory` (§3): `home/{userID}/user` for
/// the full record, this for the email→userID lookup used at login.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub user_id: i64,
    pub email: String,
}

/// Stored at the single, global `directory` logical name. Append-only in
/// normal operation; a user is removed only by account deletion.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct UserDirectory {
    pub users: Vec<DirectoryEntry>,
}

impl UserDirectory {
    pub fn find(&self, email: &str) -> Option<&DirectoryEntry> {
        self.users.iter().find(|u| u.email == email)
    }

    pub fn contains_id(&self, user_id: i64) -> bool {
        self.users.iter().any(|u| u.user_id == user_id)
    }

    pub fn insert(&mut self, entry: DirectoryEntry) {
        self.users.push(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_lookup_by_email() {
        let mut dir = UserDirectory::default();
        dir.insert(DirectoryEntry {
            user_id: 1_500_000,
            email: "alice@example.com".into(),
        });
        assert_eq!(dir.find("alice@example.com").unwrap().user_id, 1_500_000);
        assert!(dir.find("bob@example.com").is_none());
        assert!(dir.contains_id(1_500_000));
    }
}
