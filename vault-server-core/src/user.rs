//! Account lifecycle (§4.6 "Create user" / §6.1 `/v2/register/*`,
//! `/v2/login/*`, `/v2/keys/*`): registration, login, logout, password
//! change/recovery, and key re-upload.

use std::collections::BTreeMap;

use rand::Rng;
use vault_crypto::{seal, SealedBoxKeyPair, SigningKeyPair};
use vault_domain::{paths, AlbumManifest, ContactList, DirectoryEntry, FileSet, User, UserDirectory};
use wire::{
    ChangePassParams, ChangePassParts, CheckKey, CheckKeyParts, CreateAccount, Login, LoginParts,
    PreLogin, PreLoginParts, RecoverAccount, ReuploadKeysParams,
};

use crate::encoding;
use crate::error::{Error, Result};
use crate::password;
use crate::token;
use crate::ServerCore;

const USER_ID_RANGE: std::ops::Range<i64> = 1_000_000..((1i64 << 31) - 1);

fn random_user_id() -> i64 {
    rand::thread_rng().gen_range(USER_ID_RANGE)
}

/// Registers a new account: reserves a fresh random `userID`, then writes
/// the user record plus the empty per-user collections (contacts, album
/// manifest, gallery, trash) it owns from the start.
pub fn create_account(core: &ServerCore, req: &CreateAccount) -> Result<()> {
    let email = req.email.as_ref();

    let (mut directory, mut commit) = core.storage.open_for_update::<UserDirectory>(paths::DIRECTORY)?;
    if directory.find(email).is_some() {
        commit.rollback()?;
        return Err(Error::EmailTaken);
    }

    let mut user_id = random_user_id();
    while directory.contains_id(user_id) {
        user_id = random_user_id();
    }
    directory.insert(DirectoryEntry {
        user_id,
        email: email.to_string(),
    });

    let mut next = BTreeMap::new();
    next.insert(paths::DIRECTORY.to_string(), directory);
    commit.commit(&next)?;

    let sealed_keys = SealedBoxKeyPair::generate();
    let signing_keys = SigningKeyPair::generate();
    let home_folder = hex::encode(core.storage.content_hash(email.as_bytes()));

    let user = User {
        user_id,
        email: email.to_string(),
        hashed_password: password::hash(&req.password)?,
        salt: encoding::decode(&req.salt)?,
        home_folder,
        key_bundle: encoding::decode(&req.key_bundle)?,
        is_backup: req.is_backup,
        server_secret_key: sealed_keys.secret_bytes(),
        server_public_key: sealed_keys.public_bytes(),
        server_sign_secret: signing_keys.secret_bytes(),
        server_verify_key: signing_keys.verifying_key().to_bytes(),
        public_key: [0u8; 32],
        token_seq: 0,
        space_quota_mib: core.space_quota_mib,
    };

    core.storage.save_data_file(None, &paths::user(user_id), &user)?;
    core.storage.create_empty_file::<ContactList>(&paths::contacts(user_id))?;
    core.storage.create_empty_file::<AlbumManifest>(&paths::manifest(user_id))?;
    core.storage.create_empty_file::<FileSet>(&paths::gallery(user_id))?;
    core.storage.create_empty_file::<FileSet>(&paths::trash(user_id))?;

    Ok(())
}

fn directory_lookup(core: &ServerCore, email: &str) -> Result<i64> {
    let (directory, _): (UserDirectory, _) = core.storage.read_data_file(paths::DIRECTORY)?;
    directory
        .find(email)
        .map(|entry| entry.user_id)
        .ok_or(Error::UnknownUser)
}

fn load_user(core: &ServerCore, user_id: i64) -> Result<User> {
    let (user, _): (User, _) = core.storage.read_data_file(&paths::user(user_id))?;
    if user.user_id != user_id {
        return Err(Error::UnknownUser);
    }
    Ok(user)
}

/// Returns the client-side KDF salt so the client can derive the same
/// password-equivalent locally before `login` ever sends it.
pub fn pre_login(core: &ServerCore, req: &PreLogin) -> Result<PreLoginParts<'static>> {
    let user_id = directory_lookup(core, &req.email)?;
    let user = load_user(core, user_id)?;
    Ok(PreLoginParts {
        salt: encoding::encode(&user.salt).into(),
    })
}

pub fn login(core: &ServerCore, req: &Login) -> Result<LoginParts<'static>> {
    let user_id = directory_lookup(core, &req.email)?;
    let user = load_user(core, user_id)?;
    password::verify(&user.hashed_password, &req.password)?;

    let signing = SigningKeyPair::from_bytes(user.server_sign_secret);
    let token = token::issue(&signing, user.user_id, user.token_seq);

    Ok(LoginParts {
        key_bundle: encoding::encode(&user.key_bundle).into(),
        server_public_key: encoding::encode(&user.server_public_key).into(),
        token: token.into(),
        user_id: user.user_id,
        is_key_backed_up: user.key_bundle.len() > 32,
        home_folder: user.home_folder.clone().into(),
    })
}

/// Bumps `tokenSeq`, invalidating every token issued before this call.
pub fn logout(core: &ServerCore, user_id: i64) -> Result<()> {
    let (mut user, mut commit) = core.storage.open_for_update::<User>(&paths::user(user_id))?;
    user.token_seq += 1;
    let mut next = BTreeMap::new();
    next.insert(paths::user(user_id), user);
    commit.commit(&next)?;
    Ok(())
}

fn apply_password_change(
    core: &ServerCore,
    user_id: i64,
    new_password: &str,
    new_salt: &str,
    key_bundle: &str,
) -> Result<ChangePassParts<'static>> {
    let (mut user, mut commit) = core.storage.open_for_update::<User>(&paths::user(user_id))?;
    user.hashed_password = password::hash(new_password)?;
    user.salt = encoding::decode(new_salt)?;
    user.key_bundle = encoding::decode(key_bundle)?;
    user.token_seq += 1;

    let signing = SigningKeyPair::from_bytes(user.server_sign_secret);
    let token = token::issue(&signing, user.user_id, user.token_seq);

    let mut next = BTreeMap::new();
    next.insert(paths::user(user_id), user);
    commit.commit(&next)?;

    Ok(ChangePassParts {
        token: token.into(),
    })
}

pub fn change_password(
    core: &ServerCore,
    user_id: i64,
    req: &ChangePassParams,
) -> Result<ChangePassParts<'static>> {
    apply_password_change(core, user_id, &req.new_password, &req.new_salt, &req.key_bundle)
}

/// Like `change_password`, but resolves the target user from an email
/// rather than an authenticated token (§6.1 `recoverAccount` runs with no
/// prior session).
pub fn recover_account(core: &ServerCore, req: &RecoverAccount) -> Result<ChangePassParts<'static>> {
    let user_id = directory_lookup(core, &req.email)?;
    apply_password_change(
        core,
        user_id,
        &req.params.new_password,
        &req.params.new_salt,
        &req.params.key_bundle,
    )
}

/// Re-upload of the client's `keyBundle` also bumps `tokenSeq` (§4.6:
/// "changes to password/KeyBundle increment tokenSeq").
pub fn reupload_keys(core: &ServerCore, user_id: i64, req: &ReuploadKeysParams) -> Result<()> {
    let (mut user, mut commit) = core.storage.open_for_update::<User>(&paths::user(user_id))?;
    user.key_bundle = encoding::decode(&req.key_bundle)?;
    user.token_seq += 1;
    let mut next = BTreeMap::new();
    next.insert(paths::user(user_id), user);
    commit.commit(&next)?;
    Ok(())
}

/// Seals a throwaway challenge to the account's public key, so only the
/// holder of the matching secret key can answer it (proves key possession
/// without transmitting anything secret).
pub fn check_key(core: &ServerCore, req: &CheckKey) -> Result<CheckKeyParts<'static>> {
    let user_id = directory_lookup(core, &req.email)?;
    let user = load_user(core, user_id)?;

    let mut nonce = [0u8; 32];
    rand::thread_rng().fill(&mut nonce);
    let recipient = vault_crypto::public_key_from_bytes(user.public_key);
    let challenge = seal(&recipient, &nonce).map_err(vault_server_core_crypto_err)?;

    Ok(CheckKeyParts {
        challenge: encoding::encode(&challenge).into(),
        is_key_backed_up: user.key_bundle.len() > 32,
        server_pk: encoding::encode(&user.server_public_key).into(),
    })
}

fn vault_server_core_crypto_err(e: vault_crypto::Error) -> Error {
    Error::Crypto(e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ServerCore;
    use std::borrow::Cow;
    use tempfile::TempDir;
    use vault_blobstore::BlobStore;
    use vault_crypto::MasterKey;
    use vault_storage::Storage;

    fn core(dir: &TempDir) -> ServerCore {
        let storage = Storage::open(dir.path().join("meta"), MasterKey::generate()).unwrap();
        storage.create_empty_file::<UserDirectory>(paths::DIRECTORY).unwrap();
        let blobs = BlobStore::open(dir.path().join("blobs"), storage.clone()).unwrap();
        ServerCore::with_system_clock(storage, blobs, 5000)
    }

    fn create_req(email: &str) -> CreateAccount<'static> {
        CreateAccount {
            email: Cow::Owned(email.to_string()),
            password: Cow::from("hunter2"),
            salt: Cow::from(encoding::encode(b"client-salt")),
            key_bundle: Cow::from(encoding::encode(b"pubkey-only-32-bytes-of-filler!!")),
            is_backup: false,
        }
    }

    #[test]
    fn create_then_login_round_trips() {
        let dir = TempDir::new().unwrap();
        let core = core(&dir);
        create_account(&core, &create_req("alice@example.com")).unwrap();

        let login_parts = login(
            &core,
            &Login {
                email: Cow::from("alice@example.com"),
                password: Cow::from("hunter2"),
            },
        )
        .unwrap();
        assert!(login_parts.user_id >= 1_000_000);
    }

    #[test]
    fn duplicate_email_is_rejected() {
        let dir = TempDir::new().unwrap();
        let core = core(&dir);
        create_account(&core, &create_req("bob@example.com")).unwrap();
        assert!(matches!(
            create_account(&core, &create_req("bob@example.com")),
            Err(Error::EmailTaken)
        ));
    }

    #[test]
    fn wrong_password_is_rejected() {
        let dir = TempDir::new().unwrap();
        let core = core(&dir);
        create_account(&core, &create_req("carol@example.com")).unwrap();

        let result = login(
            &core,
            &Login {
                email: Cow::from("carol@example.com"),
                password: Cow::from("wrong"),
            },
        );
        assert!(matches!(result, Err(Error::BadPassword)));
    }

    #[test]
    fn logout_invalidates_prior_token() {
        let dir = TempDir::new().unwrap();
        let core = core(&dir);
        create_account(&core, &create_req("dana@example.com")).unwrap();
        let parts = login(
            &core,
            &Login {
                email: Cow::from("dana@example.com"),
                password: Cow::from("hunter2"),
            },
        )
        .unwrap();

        logout(&core, parts.user_id).unwrap();
        let user = load_user(&core, parts.user_id).unwrap();
        let verifying = SigningKeyPair::from_bytes(user.server_sign_secret).verifying_key();
        assert!(token::verify(&verifying, &parts.token, 0).is_err());
        assert!(token::verify(&verifying, &parts.token, 1).is_ok());
    }
}
