#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("bad passphrase")]
    BadPassphrase,
    #[error("malformed envelope")]
    FormatError,
    #[error("unsupported envelope version")]
    VersionMismatch,
    #[error("authentication failed while decrypting")]
    DecryptFailed,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
