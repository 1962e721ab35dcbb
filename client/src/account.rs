//! The one local record the CLI itself owns on top of `ClientSync`'s own
//! mirror: the session token and the account's own sealed-box keypair,
//! persisted through the same encrypted `Storage` the sync mirror uses.
//! The teacher's local `sled::Db` held the same two facts (`"key"`/`"url"`,
//! `client/src/main.rs`); this generalizes that onto `vault-storage` so it
//! rides the same crash-safe envelope as everything else in the mirror.

use serde::{Deserialize, Serialize};

pub const PATH: &str = "cli/account";

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Account {
    pub user_id: i64,
    pub email: String,
    pub token: String,
    pub own_secret: [u8; 32],
    pub own_public: [u8; 32],
    pub server_public_key: [u8; 32],
}
