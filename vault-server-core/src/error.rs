/// The error-kind taxonomy, not a one-variant-per-call-site enum: each
/// entry groups the failures that the wire layer reports back the same way
/// (see the response-envelope mapping in `server`).
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("unknown user")]
    UnknownUser,
    #[error("bad password")]
    BadPassword,
    #[error("invalid or expired token")]
    InvalidToken,
    #[error("not album owner")]
    NotOwner,
    #[error("insufficient permissions")]
    Forbidden,
    #[error("email already registered")]
    EmailTaken,
    #[error("album not found")]
    AlbumNotFound,
    #[error("file not found")]
    FileNotFound,
    #[error("user not found")]
    UserNotFound,
    #[error("source and destination are the same set")]
    SameSourceDestination,
    #[error("not implemented")]
    NotImplemented,
    #[error("malformed request field")]
    FormatError,
    #[error(transparent)]
    Storage(#[from] vault_storage::Error),
    #[error(transparent)]
    Blobstore(#[from] vault_blobstore::Error),
    #[error(transparent)]
    Crypto(#[from] vault_crypto::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether this failure should tear down the caller's session
    /// (`parts.logout = 1`, §7 "User-visible failures").
    pub fn requires_logout(&self) -> bool {
        matches!(self, Error::InvalidToken | Error::UnknownUser)
    }
}
