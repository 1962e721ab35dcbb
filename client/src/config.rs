//! Local CLI configuration (§9 "configuration"): data directory and server
//! base URL, loaded from a small TOML file and falling back to defaults,
//! mirroring `server`'s own `Config` on the client side.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::Result;

fn default_data_dir() -> PathBuf {
    PathBuf::from(".vault-client")
}

fn default_base_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Config {
    pub data_dir: PathBuf,
    pub base_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: default_data_dir(),
            base_url: default_base_url(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(toml::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Config::default()),
            Err(e) => Err(e.into()),
        }
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
        assert_eq!(cfg.base_url, default_base_url());
    }
}
