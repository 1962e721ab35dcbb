//! Filesystem-based advisory locks with stale-lock reclamation (§4.2).
//!
//! Blocking by design: callers on an async runtime are expected to run
//! lock acquisition inside `spawn_blocking`, the same way the teacher
//! isolates its own blocking calls.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Error;

const STALE_DEADLINE_SECS: u64 = 600;
const STALE_JITTER_SECS: u64 = 60;
const RETRY_BASE_MS: u64 = 50;
const RETRY_JITTER_MS: u64 = 100;

#[derive(Clone)]
pub struct LockManager {
    root: PathBuf,
}

impl LockManager {
    pub fn new(root: PathBuf) -> Self {
        LockManager { root }
    }

    fn lock_path(&self, name: &str) -> PathBuf {
        let encoded = URL_SAFE_NO_PAD.encode(name.as_bytes());
        self.root.join(format!("{encoded}.lock"))
    }

    /// Loops without bound: creates the lock file exclusively, reclaiming
    /// it first if its mtime is older than a randomized 10-11 minute
    /// deadline, otherwise backing off for a randomized 50-150ms.
    pub fn lock(&self, name: &str) -> Result<(), Error> {
        std::fs::create_dir_all(&self.root)?;
        let path = self.lock_path(name);
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_file) => return Ok(()),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if self.is_stale(&path) {
                        let _ = std::fs::remove_file(&path);
                        continue;
                    }
                    let jitter = rand::thread_rng().gen_range(0..RETRY_JITTER_MS);
                    std::thread::sleep(Duration::from_millis(RETRY_BASE_MS + jitter));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn is_stale(&self, path: &Path) -> bool {
        let jitter = rand::thread_rng().gen_range(0..STALE_JITTER_SECS);
        let deadline = Duration::from_secs(STALE_DEADLINE_SECS + jitter);
        std::fs::metadata(path)
            .and_then(|m| m.modified())
            .map(|modified| modified.elapsed().unwrap_or_default() > deadline)
            .unwrap_or(false)
    }

    pub fn unlock(&self, name: &str) {
        let path = self.lock_path(name);
        let _ = std::fs::remove_file(path);
    }

    /// Sorts `names` ascending and locks in that order, so any two callers
    /// racing over overlapping sets converge on the same acquisition order
    /// and cannot deadlock. Returns the sorted order for a matching
    /// `unlock_many` call.
    pub fn lock_many(&self, names: &[String]) -> Result<Vec<String>, Error> {
        let mut sorted = names.to_vec();
        sorted.sort();
        sorted.dedup();

        let mut acquired = Vec::with_capacity(sorted.len());
        for name in &sorted {
            match self.lock(name) {
                Ok(()) => acquired.push(name.clone()),
                Err(e) => {
                    self.unlock_many(&acquired);
                    return Err(e);
                }
            }
        }
        Ok(sorted)
    }

    /// Unlocks in reverse of the order `lock_many` returned.
    pub fn unlock_many(&self, names: &[String]) {
        for name in names.iter().rev() {
            self.unlock(name);
        }
    }
}
