//! Resolves an incoming session token to the authenticated `userID` a
//! (not-in-scope) HTTP layer would attach to the request before calling
//! into [`crate::endpoints`] (§6.1 auth header). Mirrors
//! `vault_server_core::token`'s claim shape without re-deriving the signing
//! mechanism itself — verification still goes through `token::verify`.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use vault_domain::{paths, User};
use vault_server_core::error::{Error, Result};
use vault_server_core::{token, ServerCore};
use wire::TokenClaims;

/// Peeks at the token's unverified payload to learn which user's
/// `serverVerifyKey`/`tokenSeq` to check it against, then verifies for
/// real. A token naming a user it wasn't signed by fails as soon as the
/// signature is checked against that user's actual verifying key.
pub fn authenticate(core: &ServerCore, token: &str) -> Result<i64> {
    let (payload_b64, _) = token.split_once('.').ok_or(Error::InvalidToken)?;
    let payload = URL_SAFE_NO_PAD.decode(payload_b64).map_err(|_| Error::InvalidToken)?;
    let claims: TokenClaims = serde_json::from_slice(&payload).map_err(|_| Error::InvalidToken)?;

    let (user, _): (User, _) = core.storage.read_data_file(&paths::user(claims.subject))?;
    if user.user_id != claims.subject {
        return Err(Error::UnknownUser);
    }

    let verifying = vault_crypto::VerifyingKey::from_bytes(&user.server_verify_key).map_err(|_| Error::InvalidToken)?;
    let verified = token::verify(&verifying, token, user.token_seq)?;
    Ok(verified.subject)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use vault_blobstore::BlobStore;
    use vault_crypto::MasterKey;
    use vault_domain::UserDirectory;
    use vault_storage::Storage;
    use wire::{CreateAccount, Login};

    fn core(dir: &TempDir) -> ServerCore {
        let storage = Storage::open(dir.path().join("meta"), MasterKey::generate()).unwrap();
        storage.create_empty_file::<UserDirectory>(paths::DIRECTORY).unwrap();
        let blobs = BlobStore::open(dir.path().join("blobs"), storage.clone()).unwrap();
        ServerCore::with_system_clock(storage, blobs, 5000)
    }

    #[test]
    fn verifies_a_freshly_issued_login_token() {
        let dir = TempDir::new().unwrap();
        let core = core(&dir);
        vault_server_core::user::create_account(
            &core,
            &CreateAccount {
                email: "eve@example.com".into(),
                password: "hunter2".into(),
                salt: vault_server_core::encoding::encode(b"salt").into(),
                key_bundle: vault_server_core::encoding::encode(b"pubkey-only-32-bytes-of-filler!!").into(),
                is_backup: false,
            },
        )
        .unwrap();
        let login = vault_server_core::user::login(
            &core,
            &Login {
                email: "eve@example.com".into(),
                password: "hunter2".into(),
            },
        )
        .unwrap();

        let user_id = authenticate(&core, &login.token).unwrap();
        assert_eq!(user_id, login.user_id);
    }

    #[test]
    fn rejects_a_token_signed_for_no_such_user() {
        let dir = TempDir::new().unwrap();
        let core = core(&dir);
        let signing = vault_crypto::SigningKeyPair::generate();
        let forged = token::issue(&signing, 9_999_999, 0);
        assert!(authenticate(&core, &forged).is_err());
    }
}
