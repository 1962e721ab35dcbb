//! Bootstrap- and wiring-level failures this binary adds on top of
//! `vault_server_core::Error` — config parsing, the blocking-pool join, and
//! the handful of IO calls that happen before any `ServerCore` exists.

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
    #[error(transparent)]
    Crypto(#[from] vault_crypto::Error),
    #[error(transparent)]
    Core(#[from] vault_server_core::error::Error),
    #[error("worker task panicked: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, Error>;
