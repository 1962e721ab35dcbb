//! Wraps every `vault-server-core` operation as the `async fn` a
//! (not-in-scope) HTTP layer would call directly (§6.1). Each one offloads
//! the synchronous storage/blob IO onto the blocking pool — the same shape
//! the teacher's `routerify` handlers had before HTTP routing was pulled
//! out from under them (§1 Non-goals).

use vault_server_core::ServerCore;
use wire::*;

use crate::auth;
use crate::error::Result;

async fn blocking<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> vault_server_core::error::Result<T> + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(f).await??)
}

/// Runs `f` against the user id a valid `token` authenticates, inside the
/// same blocking task that does the authentication check, so neither step
/// pays for a second pool hop.
async fn authed<F, T>(core: ServerCore, token: String, f: F) -> Result<T>
where
    F: FnOnce(&ServerCore, i64) -> vault_server_core::error::Result<T> + Send + 'static,
    T: Send + 'static,
{
    blocking(move || {
        let user_id = auth::authenticate(&core, &token)?;
        f(&core, user_id)
    })
    .await
}

// -- Registration / login (§6.1) -----------------------------------------

pub async fn register(core: ServerCore, req: CreateAccount<'static>) -> Result<()> {
    blocking(move || vault_server_core::user::create_account(&core, &req)).await
}

pub async fn pre_login(core: ServerCore, req: PreLogin<'static>) -> Result<PreLoginParts<'static>> {
    blocking(move || vault_server_core::user::pre_login(&core, &req)).await
}

pub async fn login(core: ServerCore, req: Login<'static>) -> Result<LoginParts<'static>> {
    blocking(move || vault_server_core::user::login(&core, &req)).await
}

pub async fn logout(core: ServerCore, token: String) -> Result<()> {
    authed(core, token, |core, user_id| vault_server_core::user::logout(core, user_id)).await
}

pub async fn change_password(
    core: ServerCore,
    token: String,
    req: ChangePassParams<'static>,
) -> Result<ChangePassParts<'static>> {
    authed(core, token, move |core, user_id| {
        vault_server_core::user::change_password(core, user_id, &req)
    })
    .await
}

pub async fn recover_account(core: ServerCore, req: RecoverAccount<'static>) -> Result<ChangePassParts<'static>> {
    blocking(move || vault_server_core::user::recover_account(&core, &req)).await
}

pub async fn reupload_keys(core: ServerCore, token: String, req: ReuploadKeysParams<'static>) -> Result<()> {
    authed(core, token, move |core, user_id| {
        vault_server_core::user::reupload_keys(core, user_id, &req)
    })
    .await
}

pub async fn check_key(core: ServerCore, req: CheckKey<'static>) -> Result<CheckKeyParts<'static>> {
    blocking(move || vault_server_core::user::check_key(&core, &req)).await
}

// -- Albums (§6.1 /v2/sync/*Album*) --------------------------------------

pub async fn add_album(core: ServerCore, token: String, req: AddAlbumParams<'static>) -> Result<()> {
    authed(core, token, move |core, user_id| {
        vault_server_core::album::add_album(core, user_id, &req)
    })
    .await
}

pub async fn rename_album(core: ServerCore, token: String, req: RenameAlbumParams<'static>) -> Result<()> {
    authed(core, token, move |core, user_id| {
        vault_server_core::album::rename_album(core, user_id, &req)
    })
    .await
}

pub async fn change_album_cover(core: ServerCore, token: String, req: ChangeAlbumCoverParams<'static>) -> Result<()> {
    authed(core, token, move |core, user_id| {
        vault_server_core::album::change_album_cover(core, user_id, &req)
    })
    .await
}

pub async fn delete_album(core: ServerCore, token: String, req: DeleteAlbumParams<'static>) -> Result<()> {
    authed(core, token, move |core, user_id| {
        vault_server_core::album::delete_album(core, user_id, &req)
    })
    .await
}

pub async fn share_album(core: ServerCore, token: String, req: ShareAlbumParams<'static>) -> Result<()> {
    authed(core, token, move |core, user_id| {
        vault_server_core::share::share_album(core, user_id, &req)
    })
    .await
}

pub async fn edit_perms(core: ServerCore, token: String, req: EditPermsParams<'static>) -> Result<()> {
    authed(core, token, move |core, user_id| {
        vault_server_core::share::edit_perms(core, user_id, &req)
    })
    .await
}

pub async fn remove_album_member(core: ServerCore, token: String, req: RemoveAlbumMemberParams<'static>) -> Result<()> {
    authed(core, token, move |core, user_id| {
        vault_server_core::share::remove_album_member(core, user_id, &req)
    })
    .await
}

pub async fn unshare_album(core: ServerCore, token: String, req: UnshareAlbumParams<'static>) -> Result<()> {
    authed(core, token, move |core, user_id| {
        vault_server_core::share::unshare_album(core, user_id, &req)
    })
    .await
}

pub async fn leave_album(core: ServerCore, token: String, req: LeaveAlbumParams<'static>) -> Result<()> {
    authed(core, token, move |core, user_id| {
        vault_server_core::share::leave_album(core, user_id, &req)
    })
    .await
}

// -- Files (§6.1 /v2/sync/*, §4.5) ---------------------------------------

pub async fn upload(
    core: ServerCore,
    token: String,
    req: UploadMetadata<'static>,
    data: Vec<u8>,
    thumb: Option<Vec<u8>>,
) -> Result<String> {
    authed(core, token, move |core, _user_id| {
        vault_server_core::file::upload(core, _user_id, &req, &data, thumb.as_deref())
    })
    .await
}

pub async fn move_file(core: ServerCore, token: String, req: MoveFileParams<'static>) -> Result<()> {
    authed(core, token, move |core, user_id| {
        vault_server_core::file::move_file(core, user_id, &req)
    })
    .await
}

pub async fn empty_trash(core: ServerCore, token: String, req: EmptyTrashParams) -> Result<()> {
    authed(core, token, move |core, user_id| {
        vault_server_core::file::empty_trash(core, user_id, &req)
    })
    .await
}

pub async fn delete_files(core: ServerCore, token: String, req: DeleteParams<'static>) -> Result<()> {
    authed(core, token, move |core, user_id| {
        vault_server_core::file::delete_files(core, user_id, &req)
    })
    .await
}

pub async fn download(core: ServerCore, token: String, req: DownloadQuery<'static>) -> Result<Vec<u8>> {
    authed(core, token, move |core, user_id| {
        vault_server_core::file::download(core, user_id, &req)
    })
    .await
}

pub async fn get_download_urls(
    core: ServerCore,
    token: String,
    req: GetDownloadUrlsParams<'static>,
) -> Result<GetDownloadUrlsParts> {
    authed(core, token, move |core, user_id| {
        vault_server_core::file::get_download_urls(core, user_id, &req)
    })
    .await
}

// -- Sync / contacts (§4.6, §4.7) ----------------------------------------

pub async fn get_updates(core: ServerCore, token: String, req: GetUpdatesParams) -> Result<GetUpdatesParts<'static>> {
    authed(core, token, move |core, user_id| {
        vault_server_core::sync::get_updates(core, user_id, &req)
    })
    .await
}

pub async fn get_contact(core: ServerCore, token: String, req: GetContactParams<'static>) -> Result<GetContactParts<'static>> {
    authed(core, token, move |core, _user_id| vault_server_core::contacts::get_contact(core, &req)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use vault_blobstore::BlobStore;
    use vault_crypto::MasterKey;
    use vault_domain::{paths, UserDirectory};
    use vault_storage::Storage;

    fn core(dir: &TempDir) -> ServerCore {
        let storage = Storage::open(dir.path().join("meta"), MasterKey::generate()).unwrap();
        storage.create_empty_file::<UserDirectory>(paths::DIRECTORY).unwrap();
        let blobs = BlobStore::open(dir.path().join("blobs"), storage.clone()).unwrap();
        ServerCore::with_system_clock(storage, blobs, 5000)
    }

    #[tokio::test]
    async fn register_then_login_through_the_async_wrapper() {
        let dir = TempDir::new().unwrap();
        let core = core(&dir);

        register(
            core.clone(),
            CreateAccount {
                email: "frank@example.com".into(),
                password: "hunter2".into(),
                salt: vault_server_core::encoding::encode(b"salt").into(),
                key_bundle: vault_server_core::encoding::encode(b"pubkey-only-32-bytes-of-filler!!").into(),
                is_backup: false,
            },
        )
        .await
        .unwrap();

        let parts = login(
            core.clone(),
            Login {
                email: "frank@example.com".into(),
                password: "hunter2".into(),
            },
        )
        .await
        .unwrap();

        logout(core, parts.token.into_owned()).await.unwrap();
    }
}
