//! The CLI's own error type, wrapping the lower layers it drives
//! (`vault-client-sync`, `vault-crypto`, config IO) plus the two failure
//! modes that are specific to this binary's local bookkeeping.

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
    #[error(transparent)]
    Crypto(#[from] vault_crypto::Error),
    #[error(transparent)]
    Sync(#[from] vault_client_sync::Error),
    #[error("no local keypair for this account — log in on the device that registered it")]
    NoLocalKeys,
    #[error("not logged in; run `login` first")]
    NotLoggedIn,
}

pub type Result<T> = std::result::Result<T, Error>;
