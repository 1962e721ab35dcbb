#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("blob not found")]
    NotFound,
    #[error(transparent)]
    Storage(#[from] vault_storage::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
