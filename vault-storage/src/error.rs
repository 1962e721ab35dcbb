#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    AlreadyExists,
    #[error("commit already called")]
    AlreadyCommitted,
    #[error("rollback already called")]
    AlreadyRolledBack,
    #[error("transaction was rolled back")]
    RolledBack,
    #[error("malformed record")]
    FormatError,
    #[error("unsupported record version")]
    VersionMismatch,
    #[error(transparent)]
    Crypto(#[from] vault_crypto::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[cfg(test)]
    #[error("simulated crash")]
    SimulatedCrash,
}
