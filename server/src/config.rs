//! Startup configuration (§9): a small TOML file read at launch, replacing
//! the teacher's hardcoded `AppState::new` paths with operator-editable
//! settings, following `Ocean50ul-home-server`'s `toml`+`serde` convention.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::Result;

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_space_quota_mib() -> u64 {
    5_000
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Config {
    pub data_dir: PathBuf,
    pub space_quota_mib: u64,
    /// Wraps the on-disk `MasterKey` envelope (§6.4). Empty by default —
    /// an operator who hasn't set one gets a fast, low-iteration KDF rather
    /// than a silently unprotected key, matching `MasterKey`'s own
    /// empty-passphrase handling.
    pub master_key_passphrase: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: default_data_dir(),
            space_quota_mib: default_space_quota_mib(),
            master_key_passphrase: String::new(),
        }
    }
}

impl Config {
    /// Reads `path` if present; a missing config file is not an error,
    /// matching spec.md §9's "falling back to defaults" so the server can
    /// be started with zero configuration for local testing.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(toml::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Config::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn meta_dir(&self) -> PathBuf {
        self.data_dir.join("meta")
    }

    pub fn blobs_dir(&self) -> PathBuf {
        self.data_dir.join("blobs")
    }

    pub fn master_key_path(&self) -> PathBuf {
        self.data_dir.join("master.key")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::load(&dir.path().join("missing.toml")).unwrap();
        assert_eq!(cfg.space_quota_mib, default_space_quota_mib());
    }

    #[test]
    fn reads_overrides_from_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vault.toml");
        std::fs::write(&path, "space_quota_mib = 9000\n").unwrap();
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.space_quota_mib, 9000);
        assert_eq!(cfg.data_dir, default_data_dir());
    }
}
