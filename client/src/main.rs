//! Thin CLI over `vault-client-sync` for local import/export and manual
//! sync (§4.7), rewritten from the teacher's clap v2 `App`/`Arg::with_name`
//! surface (`client/src/main.rs`) into clap v4's `#[derive(Parser)]` idiom.

mod account;
mod config;
mod error;

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rand::RngCore;

use config::Config;
use error::{Error, Result};
use vault_client_sync::{ClientSync, KeyRing};
use vault_crypto::{MasterKey, SealedBoxKeyPair};
use wire::{CreateAccount, Login};

#[derive(Parser)]
#[command(name = "vault-client", version, about = "Encrypted photo vault client")]
struct Cli {
    /// Path to the TOML config file (data directory, server URL).
    #[arg(long, default_value = "vault-client.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Register a new account and initialize the local mirror.
    Register { email: String },
    /// Log in on a device that already holds this account's local keys.
    Login { email: String },
    /// Run one pull/diff/apply reconciliation pass.
    Sync,
    /// Print the local mirror's sync watermarks.
    Status,
}

fn prompt_password(prompt: &str) -> Result<String> {
    Ok(rpassword::prompt_password(prompt)?)
}

fn load_account(sync: &ClientSync) -> Result<account::Account> {
    let (acc, _) = sync.storage().read_data_file::<account::Account>(account::PATH)?;
    Ok(acc)
}

fn store_account(sync: &ClientSync, acc: account::Account) -> Result<()> {
    let (_, mut commit) = sync.storage().open_for_update::<account::Account>(account::PATH)?;
    let mut next = BTreeMap::new();
    next.insert(account::PATH.to_string(), acc);
    commit.commit(&next)?;
    Ok(())
}

async fn complete_login(sync: &ClientSync, email: &str, password: &str, own: SealedBoxKeyPair) -> Result<()> {
    let parts: wire::LoginParts = sync
        .transport()
        .post(
            "/v2/login",
            &Login {
                email: email.into(),
                password: password.into(),
            },
        )
        .await?;

    store_account(
        sync,
        account::Account {
            user_id: parts.user_id,
            email: email.to_string(),
            token: parts.token.into_owned(),
            own_secret: own.secret_bytes(),
            own_public: own.public_bytes(),
            server_public_key: vault_client_sync::encoding::decode_fixed(&parts.server_public_key)?,
        },
    )?;

    println!("logged in as {} (user_id {})", email, parts.user_id);
    Ok(())
}

async fn register(sync: &ClientSync, email: &str) -> Result<()> {
    let password = prompt_password("password: ")?;
    let own = SealedBoxKeyPair::generate();

    let mut salt = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt);

    sync.transport()
        .post::<_, ()>(
            "/v2/register",
            &CreateAccount {
                email: email.into(),
                password: password.as_str().into(),
                salt: vault_client_sync::encoding::encode(&salt).into(),
                key_bundle: vault_client_sync::encoding::encode(&own.public_bytes()).into(),
                is_backup: false,
            },
        )
        .await?;

    println!("account created for {email}");
    complete_login(sync, email, &password, own).await
}

async fn login(sync: &ClientSync, email: &str) -> Result<()> {
    let password = prompt_password("password: ")?;
    let existing = load_account(sync)?;
    if existing.email != email || existing.own_public == [0u8; 32] {
        return Err(Error::NoLocalKeys);
    }
    let own = SealedBoxKeyPair::from_secret_bytes(existing.own_secret);
    complete_login(sync, email, &password, own).await
}

async fn run_sync(sync: &ClientSync) -> Result<()> {
    let acc = load_account(sync)?;
    if acc.token.is_empty() {
        return Err(Error::NotLoggedIn);
    }
    let keys = KeyRing::new(acc.user_id, SealedBoxKeyPair::from_secret_bytes(acc.own_secret));
    let (parts, report) = sync.sync(&acc.token, &keys).await?;

    println!(
        "synced: +{} albums, {} renamed, {} reperm'd, {} uploaded, {} moved/copied, {} deleted, -{} albums ({} errors)",
        report.albums_added,
        report.albums_renamed,
        report.perms_changed,
        report.files_uploaded,
        report.files_moved_or_copied,
        report.files_deleted,
        report.albums_removed,
        report.errors.len()
    );
    println!("space used: {}/{} MiB", parts.space_used, parts.space_quota);
    Ok(())
}

fn print_status(sync: &ClientSync) -> Result<()> {
    let (w, _) = sync
        .storage()
        .read_data_file::<vault_client_sync::Watermarks>(vault_client_sync::model::paths::WATERMARKS)?;
    println!(
        "watermarks: files={} trash={} albums={} album_files={} contacts={} deletes={}",
        w.files_st, w.trash_st, w.albums_st, w.album_files_st, w.cnt_st, w.del_st
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    std::fs::create_dir_all(&config.data_dir)?;

    let passphrase = prompt_password("local passphrase: ")?;
    let master_key_path = config.master_key_path();
    let master_key = if master_key_path.exists() {
        MasterKey::read(&passphrase, &master_key_path)?
    } else {
        let key = MasterKey::generate();
        key.save(&passphrase, &master_key_path)?;
        key
    };

    let sync = ClientSync::open(config.data_dir.clone(), master_key, config.base_url.clone())?;
    sync.storage().create_empty_file::<account::Account>(account::PATH).ok();

    match cli.command {
        Command::Register { email } => register(&sync, &email).await?,
        Command::Login { email } => login(&sync, &email).await?,
        Command::Sync => run_sync(&sync).await?,
        Command::Status => print_status(&sync)?,
    }

    Ok(())
}
