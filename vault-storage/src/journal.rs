//! BackupJournal (§4.3): sideways-copies the pre-commit state of every file
//! touched by a multi-file transaction before any of them are rewritten, so
//! a crash between writes can be undone on the next startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use vault_crypto::MasterKey;

use crate::error::Error;
use crate::format::{self, WriteOptions};

#[derive(Serialize, Deserialize, Default)]
struct PendingRecord {
    ts: u128,
    files: Vec<String>,
}

pub struct BackupHandle {
    ts: u128,
    files: Vec<PathBuf>,
}

#[derive(Clone)]
pub struct BackupJournal {
    root: PathBuf,
    master_key: MasterKey,
}

fn now_ns() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
}

fn backup_path(target: &Path, ts: u128) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str(&format!(".bck-{ts}"));
    target.with_file_name(name)
}

impl BackupJournal {
    pub fn new(root: PathBuf, master_key: MasterKey) -> Self {
        BackupJournal { root, master_key }
    }

    fn pending_dir(&self) -> PathBuf {
        self.root.join("pending")
    }

    fn pending_path(&self, ts: u128) -> PathBuf {
        self.pending_dir().join(ts.to_string())
    }

    pub fn create_backup(&self, files: &[PathBuf]) -> Result<BackupHandle, Error> {
        let ts = now_ns();
        for target in files {
            if target.exists() {
                std::fs::copy(target, backup_path(target, ts))?;
            }
        }

        std::fs::create_dir_all(self.pending_dir())?;
        let record = PendingRecord {
            ts,
            files: files
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect(),
        };
        let (bytes, _) = format::write_envelope(
            &self.master_key,
            None,
            &record,
            WriteOptions {
                encrypted: true,
                compressed: false,
                encoding: format::Encoding::Binary,
            },
        )?;
        write_atomic(&self.pending_path(ts), &bytes)?;

        Ok(BackupHandle {
            ts,
            files: files.to_vec(),
        })
    }

    pub fn restore(&self, handle: &BackupHandle) -> Result<(), Error> {
        for target in &handle.files {
            let bak = backup_path(target, handle.ts);
            if bak.exists() {
                std::fs::rename(&bak, target)?;
            }
        }
        let _ = std::fs::remove_file(self.pending_path(handle.ts));
        Ok(())
    }

    pub fn delete(&self, handle: &BackupHandle) -> Result<(), Error> {
        for target in &handle.files {
            let _ = std::fs::remove_file(backup_path(target, handle.ts));
        }
        let _ = std::fs::remove_file(self.pending_path(handle.ts));
        Ok(())
    }

    /// Replays every pending manifest found at startup, restoring the
    /// pre-commit state of an interrupted multi-file commit.
    pub fn rollback_pending(&self) -> Result<(), Error> {
        let dir = self.pending_dir();
        if !dir.exists() {
            return Ok(());
        }
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let bytes = match std::fs::read(entry.path()) {
                Ok(b) => b,
                Err(_) => continue,
            };
            let record: PendingRecord = match format::read_envelope(&self.master_key, &bytes) {
                Ok((record, _)) => record,
                Err(_) => continue,
            };

            // Give a still-running commit a chance to finish on its own
            // before we assume it crashed.
            std::thread::sleep(Duration::from_millis(50));

            let handle = BackupHandle {
                ts: record.ts,
                files: record.files.iter().map(PathBuf::from).collect(),
            };
            self.restore(&handle)?;
        }
        Ok(())
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension(format!("tmp-{}", now_ns()));
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn backup_restore_round_trip() {
        let dir = TempDir::new().unwrap();
        let master = MasterKey::generate();
        let journal = BackupJournal::new(dir.path().to_path_buf(), master);

        let file_a = dir.path().join("a");
        let file_b = dir.path().join("b");
        std::fs::write(&file_a, b"original a").unwrap();
        std::fs::write(&file_b, b"original b").unwrap();

        let handle = journal.create_backup(&[file_a.clone(), file_b.clone()]).unwrap();
        std::fs::write(&file_a, b"new a").unwrap();
        std::fs::write(&file_b, b"new b").unwrap();

        journal.restore(&handle).unwrap();
        assert_eq!(std::fs::read(&file_a).unwrap(), b"original a");
        assert_eq!(std::fs::read(&file_b).unwrap(), b"original b");
        assert!(!journal.pending_path(handle.ts).exists());
    }

    #[test]
    fn delete_removes_sideways_copies_and_pending_record() {
        let dir = TempDir::new().unwrap();
        let master = MasterKey::generate();
        let journal = BackupJournal::new(dir.path().to_path_buf(), master);

        let file_a = dir.path().join("a");
        std::fs::write(&file_a, b"original").unwrap();
        let handle = journal.create_backup(&[file_a.clone()]).unwrap();
        journal.delete(&handle).unwrap();

        assert!(!backup_path(&file_a, handle.ts).exists());
        assert!(!journal.pending_path(handle.ts).exists());
    }

    #[test]
    fn rollback_pending_restores_after_simulated_crash() {
        let dir = TempDir::new().unwrap();
        let master = MasterKey::generate();
        let journal = BackupJournal::new(dir.path().to_path_buf(), master);

        let file_a = dir.path().join("a");
        let file_b = dir.path().join("b");
        std::fs::write(&file_a, b"original a").unwrap();
        std::fs::write(&file_b, b"original b").unwrap();

        let _handle = journal
            .create_backup(&[file_a.clone(), file_b.clone()])
            .unwrap();
        // Simulated crash: rewrite only the first file, never call restore/delete.
        std::fs::write(&file_a, b"half-committed a").unwrap();

        journal.rollback_pending().unwrap();
        assert_eq!(std::fs::read(&file_a).unwrap(), b"original a");
        assert_eq!(std::fs::read(&file_b).unwrap(), b"original b");
        assert!(!journal.pending_dir().read_dir().unwrap().next().is_some());
    }
}
