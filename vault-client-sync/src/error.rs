/// Failures a sync pass can hit: transport (§7 "Transport"), the server's
/// own `errors[]`/`logout` response shape, or the local mirror's storage.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed server response")]
    MalformedResponse,
    #[error("server rejected the request: {0:?}")]
    Rejected(Vec<String>),
    #[error("session expired, re-authentication required")]
    LogoutRequired,
    #[error(transparent)]
    Storage(#[from] vault_storage::Error),
    #[error(transparent)]
    Blobstore(#[from] vault_blobstore::Error),
    #[error(transparent)]
    Crypto(#[from] vault_crypto::Error),
    #[error("malformed request field")]
    FormatError,
}

pub type Result<T> = std::result::Result<T, Error>;
