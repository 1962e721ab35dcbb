//! Bootstraps the data directory, replays any pending crash-recovery
//! journal, and builds the `ServerCore` the `endpoints` module's async
//! functions run against. No `hyper`/`routerify` binding lives here — HTTP
//! routing is an explicit non-goal (§1); wiring `endpoints::*` to a real
//! transport is left to that (not-in-scope) layer.

mod auth;
mod config;
#[allow(dead_code)] // the external HTTP layer this binary hands off to is out of scope (§1)
mod endpoints;
mod error;

use std::path::{Path, PathBuf};

use config::Config;
use error::Result;
use vault_blobstore::BlobStore;
use vault_crypto::MasterKey;
use vault_server_core::ServerCore;
use vault_storage::Storage;

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.expect("failed to install CTRL+C signal handler");
}

/// Opens the master key envelope at `path`, generating and saving a fresh
/// one on first run (§6.4 persistent-state layout).
fn open_or_create_master_key(path: &Path, passphrase: &str) -> Result<MasterKey> {
    if path.exists() {
        Ok(MasterKey::read(passphrase, path)?)
    } else {
        let key = MasterKey::generate();
        key.save(passphrase, path)?;
        Ok(key)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from).unwrap_or_else(|| PathBuf::from("vault.toml"));
    let config = Config::load(&config_path)?;
    log::info!("loaded config from {:?}", config_path);

    std::fs::create_dir_all(&config.data_dir)?;
    let master_key = open_or_create_master_key(&config.master_key_path(), &config.master_key_passphrase)?;

    let storage = Storage::open(config.meta_dir(), master_key)?;
    storage.rollback_pending()?;
    storage
        .create_empty_file::<vault_domain::UserDirectory>(vault_domain::paths::DIRECTORY)
        .ok();

    let blobs = BlobStore::open(config.blobs_dir(), storage.clone())?;
    let core = ServerCore::with_system_clock(storage, blobs, config.space_quota_mib);

    log::info!(
        "vault server ready at {:?} (space quota {} MiB/user)",
        config.data_dir,
        core.space_quota_mib
    );

    shutdown_signal().await;
    log::info!("shutting down");
    Ok(())
}
