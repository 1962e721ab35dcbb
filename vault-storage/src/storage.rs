//! Storage (§4.4): the encrypted transactional KV engine tying together
//! [`crate::lock::LockManager`], [`crate::journal::BackupJournal`] and the
//! record envelope in [`crate::format`].
//!
//! Every logical name maps to a path via [`Storage::hash_string`]; reads and
//! writes go through [`Storage::read_data_file`]/[`Storage::save_data_file`];
//! transactions are opened with [`Storage::open_for_update`] or
//! [`Storage::open_many_for_update`] and settled through the returned
//! [`Commit`] handle exactly once.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use vault_crypto::{FileKey, MasterKey};

use crate::error::Error;
use crate::fault;
use crate::format::{self, WriteOptions};
use crate::journal::BackupJournal;
use crate::lock::LockManager;

fn now_ns() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
}

/// Outcome of a settled [`Commit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Committed,
    RolledBack,
}

#[derive(Clone)]
pub struct Storage {
    root: PathBuf,
    master_key: MasterKey,
    locks: LockManager,
    journal: BackupJournal,
}

impl Storage {
    pub fn open(root: PathBuf, master_key: MasterKey) -> Result<Self, Error> {
        std::fs::create_dir_all(root.join("metadata"))?;
        let locks = LockManager::new(root.join("locks"));
        let journal = BackupJournal::new(root.clone(), master_key.clone());
        Ok(Storage {
            root,
            master_key,
            locks,
            journal,
        })
    }

    /// Replays any pending multi-file commit left over from a crash. Must be
    /// called once at startup, before any transaction is opened.
    pub fn rollback_pending(&self) -> Result<(), Error> {
        self.journal.rollback_pending()
    }

    /// Maps a logical name to its on-disk path:
    /// `metadata/{hash[0]:02x}/{hash[1]:02x}/{base64url(hash)}`.
    pub fn hash_string(&self, name: &str) -> PathBuf {
        let digest = self.master_key.hash(name.as_bytes());
        let leaf = URL_SAFE_NO_PAD.encode(digest);
        self.root
            .join("metadata")
            .join(format!("{:02x}", digest[0]))
            .join(format!("{:02x}", digest[1]))
            .join(leaf)
    }

    /// Raw master-key MAC over arbitrary bytes, exposed for callers (e.g.
    /// the home-folder naming scheme) that need the same primitive
    /// `hash_string` uses without going through the filesystem fan-out.
    pub fn content_hash(&self, data: &[u8]) -> [u8; 32] {
        self.master_key.hash(data)
    }

    fn create_dirs_for(path: &Path) -> Result<(), Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    /// Writes a default-initialized instance; fails with [`Error::AlreadyExists`]
    /// if the path is already occupied.
    pub fn create_empty_file<T: Serialize + Default>(&self, name: &str) -> Result<(), Error> {
        let path = self.hash_string(name);
        if path.exists() {
            return Err(Error::AlreadyExists);
        }
        self.save_data_file(None, name, &T::default())?;
        Ok(())
    }

    /// Parses the header, unwraps the per-file key, and decodes the body.
    /// Returns the key alongside the value so a subsequent save can reuse it
    /// (preserving key continuity across updates), and `(default, None)` if
    /// the record does not exist yet (so callers opening a newly-created
    /// object can pass an empty instance through the same path).
    pub fn read_data_file<T: DeserializeOwned + Default>(
        &self,
        name: &str,
    ) -> Result<(T, Option<FileKey>), Error> {
        let path = self.hash_string(name);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok((T::default(), None));
            }
            Err(e) => return Err(e.into()),
        };
        let (value, key) = format::read_envelope(&self.master_key, &bytes)?;
        Ok((value, key))
    }

    /// Writes the envelope atomically: serialize to a `.tmp-{ts}` sibling,
    /// fsync, then rename over the target. Generates a fresh per-file key
    /// when `key` is `None`.
    pub fn save_data_file<T: Serialize>(
        &self,
        key: Option<FileKey>,
        name: &str,
        value: &T,
    ) -> Result<FileKey, Error> {
        let path = self.hash_string(name);
        Self::create_dirs_for(&path)?;

        let (bytes, used_key) =
            format::write_envelope(&self.master_key, key, value, WriteOptions::default())?;

        let tmp = path.with_file_name(format!(
            "{}.tmp-{}",
            path.file_name().unwrap().to_string_lossy(),
            now_ns()
        ));
        {
            let mut f = std::fs::File::create(&tmp)?;
            use std::io::Write;
            f.write_all(&bytes)?;
            f.sync_all()?;
        }
        std::fs::rename(&tmp, &path)?;

        used_key.ok_or(Error::FormatError)
    }

    /// Single-file transaction; equivalent to `open_many_for_update(&[name])`
    /// but hands back the value directly instead of a one-entry map.
    pub fn open_for_update<T: DeserializeOwned + Default + Serialize + Clone>(
        &self,
        name: &str,
    ) -> Result<(T, Commit<T>), Error> {
        let txn = self.open_many_for_update::<T>(std::slice::from_ref(&name.to_string()))?;
        let value = txn.values.get(name).cloned().unwrap_or_default();
        Ok((value, txn.into_commit()))
    }

    /// Locks `names` (sorted, so concurrent overlapping callers converge on
    /// one acquisition order), reads each current value, and returns a
    /// [`Transaction`] keyed by logical name so callers never have to track
    /// positional order across the sort.
    pub fn open_many_for_update<T: DeserializeOwned + Default>(
        &self,
        names: &[String],
    ) -> Result<Transaction<T>, Error> {
        let held = self.locks.lock_many(names)?;

        let mut values = BTreeMap::new();
        let mut keys = BTreeMap::new();
        for name in &held {
            match self.read_data_file::<T>(name) {
                Ok((value, key)) => {
                    values.insert(name.clone(), value);
                    keys.insert(name.clone(), key);
                }
                Err(e) => {
                    self.locks.unlock_many(&held);
                    return Err(e);
                }
            }
        }

        Ok(Transaction {
            storage: self.clone(),
            names: held,
            keys,
            values,
            settled: false,
        })
    }
}

/// The bundle returned by `open_many_for_update`: the current value of every
/// named record (keyed by logical name) plus the commit handle that settles
/// all of them atomically.
pub struct Transaction<T> {
    storage: Storage,
    names: Vec<String>,
    keys: BTreeMap<String, Option<FileKey>>,
    pub values: BTreeMap<String, T>,
    settled: bool,
}

impl<T> Transaction<T> {
    /// Splits the transaction into a commit handle that writes back whatever
    /// values the caller passes to [`Commit::commit`], keyed by the same
    /// logical names.
    pub fn into_commit(mut self) -> Commit<T> {
        self.settled = true;
        Commit {
            storage: self.storage.clone(),
            names: std::mem::take(&mut self.names),
            keys: std::mem::take(&mut self.keys),
            state: CommitState::Pending,
            _marker: std::marker::PhantomData,
        }
    }
}

impl<T> Drop for Transaction<T> {
    fn drop(&mut self) {
        // A transaction consumed via `into_commit` already moved its names
        // out; one dropped with names still in place was abandoned without
        // taking a commit handle, so release its locks here.
        if !self.settled && !self.names.is_empty() {
            self.storage.locks.unlock_many(&self.names);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommitState {
    Pending,
    Committed,
    RolledBack,
}

/// The deferred-rollback idiom: callers commit explicitly with
/// [`Commit::commit`] and the handle rolls back on drop if neither
/// `commit` nor `rollback` was reached, so early returns and `?`
/// propagation always end the transaction exactly once. A second
/// settlement call on the same handle reports which state it already
/// reached rather than performing more IO.
pub struct Commit<T> {
    storage: Storage,
    names: Vec<String>,
    keys: BTreeMap<String, Option<FileKey>>,
    state: CommitState,
    _marker: std::marker::PhantomData<T>,
}

impl<T: Serialize> Commit<T> {
    /// Writes back `values` (keyed by the same logical names the
    /// transaction was opened with) and releases the locks. A single-file
    /// transaction writes directly; a multi-file one goes through the
    /// backup journal so a crash between writes can be undone at the next
    /// startup.
    pub fn commit(&mut self, values: &BTreeMap<String, T>) -> Result<Outcome, Error> {
        match self.state {
            CommitState::Committed => return Err(Error::AlreadyCommitted),
            CommitState::RolledBack => return Err(Error::AlreadyRolledBack),
            CommitState::Pending => {}
        }

        if values.len() != self.names.len() || !self.names.iter().all(|n| values.contains_key(n))
        {
            return Err(Error::FormatError);
        }

        let result = if self.names.len() == 1 {
            let name = &self.names[0];
            let key = self.keys.get_mut(name).and_then(Option::take);
            self.storage
                .save_data_file(key, name, &values[name])
                .map(|_| ())
        } else {
            self.commit_many(values)
        };

        self.storage.locks.unlock_many(&self.names);
        self.state = CommitState::Committed;
        result.map(|()| Outcome::Committed)
    }

    fn commit_many(&mut self, values: &BTreeMap<String, T>) -> Result<(), Error> {
        let paths: Vec<PathBuf> = self
            .names
            .iter()
            .map(|n| self.storage.hash_string(n))
            .collect();
        let handle = self.storage.journal.create_backup(&paths)?;

        let mut completed = 0usize;
        let mut first_err: Option<Error> = None;
        for name in &self.names {
            if let Err(e) = fault::maybe_crash(completed) {
                first_err = Some(e);
                break;
            }
            let key = self.keys.get_mut(name).and_then(Option::take);
            if let Err(e) = self.storage.save_data_file(key, name, &values[name]) {
                first_err = Some(e);
                break;
            }
            completed += 1;
        }

        if let Some(err) = first_err {
            self.storage.journal.restore(&handle)?;
            return Err(err);
        }

        self.storage.journal.delete(&handle)?;
        Ok(())
    }

    /// Abandons the transaction without writing anything back, releasing
    /// locks. Returns [`Outcome::RolledBack`] on first call; a subsequent
    /// call returns [`Error::AlreadyCommitted`]/[`Error::AlreadyRolledBack`].
    pub fn rollback(&mut self) -> Result<Outcome, Error> {
        match self.state {
            CommitState::Committed => return Err(Error::AlreadyCommitted),
            CommitState::RolledBack => return Err(Error::AlreadyRolledBack),
            CommitState::Pending => {}
        }
        self.storage.locks.unlock_many(&self.names);
        self.state = CommitState::RolledBack;
        Ok(Outcome::RolledBack)
    }
}

impl<T> Drop for Commit<T> {
    /// A handle dropped while still `Pending` (an early return via `?` before
    /// an explicit `commit`/`rollback` was reached) rolls back, matching the
    /// source's deferred-rollback idiom.
    fn drop(&mut self) {
        if self.state == CommitState::Pending {
            self.storage.locks.unlock_many(&self.names);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Serialize, Deserialize, Default, Clone, Debug, PartialEq)]
    struct Demo {
        count: u32,
    }

    fn storage(dir: &TempDir) -> Storage {
        Storage::open(dir.path().to_path_buf(), MasterKey::generate()).unwrap()
    }

    #[test]
    fn single_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let s = storage(&dir);
        s.create_empty_file::<Demo>("gallery").unwrap();

        let (value, mut commit): (Demo, _) = s.open_for_update("gallery").unwrap();
        assert_eq!(value, Demo { count: 0 });
        let mut next = BTreeMap::new();
        next.insert("gallery".to_string(), Demo { count: 5 });
        let outcome = commit.commit(&next).unwrap();
        assert_eq!(outcome, Outcome::Committed);

        let (value2, _): (Demo, _) = s.read_data_file("gallery").unwrap();
        assert_eq!(value2, Demo { count: 5 });
    }

    #[test]
    fn rollback_leaves_file_untouched() {
        let dir = TempDir::new().unwrap();
        let s = storage(&dir);
        s.create_empty_file::<Demo>("trash").unwrap();

        let (_value, mut commit): (Demo, _) = s.open_for_update("trash").unwrap();
        commit.rollback().unwrap();

        let (value2, _): (Demo, _) = s.read_data_file("trash").unwrap();
        assert_eq!(value2, Demo { count: 0 });
    }

    #[test]
    fn commit_closure_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let s = storage(&dir);
        s.create_empty_file::<Demo>("album").unwrap();

        let (_value, mut commit): (Demo, _) = s.open_for_update("album").unwrap();
        let mut next = BTreeMap::new();
        next.insert("album".to_string(), Demo { count: 1 });
        commit.commit(&next).unwrap();

        let mut next2 = BTreeMap::new();
        next2.insert("album".to_string(), Demo { count: 2 });
        assert!(matches!(
            commit.commit(&next2),
            Err(Error::AlreadyCommitted)
        ));
        assert!(matches!(commit.rollback(), Err(Error::AlreadyCommitted)));
    }

    #[test]
    fn multi_file_atomic_commit() {
        let dir = TempDir::new().unwrap();
        let s = storage(&dir);
        s.create_empty_file::<Demo>("a").unwrap();
        s.create_empty_file::<Demo>("b").unwrap();

        let names = vec!["a".to_string(), "b".to_string()];
        let txn: Transaction<Demo> = s.open_many_for_update(&names).unwrap();
        let mut commit = txn.into_commit();
        let mut next = BTreeMap::new();
        next.insert("a".to_string(), Demo { count: 10 });
        next.insert("b".to_string(), Demo { count: 20 });
        commit.commit(&next).unwrap();

        let (a, _): (Demo, _) = s.read_data_file("a").unwrap();
        let (b, _): (Demo, _) = s.read_data_file("b").unwrap();
        assert_eq!(a.count, 10);
        assert_eq!(b.count, 20);
    }

    #[test]
    fn simulated_crash_recovers_pre_commit_state_on_restart() {
        let dir = TempDir::new().unwrap();
        let s = storage(&dir);
        s.create_empty_file::<Demo>("a").unwrap();
        s.create_empty_file::<Demo>("b").unwrap();
        // Pre-transaction contents to be preserved across the crash.
        let (_v, mut c): (Demo, _) = s.open_for_update("a").unwrap();
        let mut n = BTreeMap::new();
        n.insert("a".to_string(), Demo { count: 1 });
        c.commit(&n).unwrap();
        let (_v, mut c): (Demo, _) = s.open_for_update("b").unwrap();
        let mut n = BTreeMap::new();
        n.insert("b".to_string(), Demo { count: 2 });
        c.commit(&n).unwrap();

        fault::test_support::crash_after_writes(1);
        let names = vec!["a".to_string(), "b".to_string()];
        let txn: Transaction<Demo> = s.open_many_for_update(&names).unwrap();
        let mut commit = txn.into_commit();
        let mut next = BTreeMap::new();
        next.insert("a".to_string(), Demo { count: 100 });
        next.insert("b".to_string(), Demo { count: 200 });
        let err = commit.commit(&next).unwrap_err();
        assert!(matches!(err, Error::SimulatedCrash));

        // Simulate a fresh process: new Storage over the same root, then replay.
        let s2 = Storage::open(dir.path().to_path_buf(), s.master_key.clone()).unwrap();
        s2.rollback_pending().unwrap();

        let (a, _): (Demo, _) = s2.read_data_file("a").unwrap();
        let (b, _): (Demo, _) = s2.read_data_file("b").unwrap();
        assert_eq!(a.count, 1);
        assert_eq!(b.count, 2);
    }

    #[test]
    fn lock_many_sets_in_both_orders_make_progress() {
        use std::sync::Arc;
        let dir = TempDir::new().unwrap();
        let s = Arc::new(storage(&dir));
        s.create_empty_file::<Demo>("x").unwrap();
        s.create_empty_file::<Demo>("y").unwrap();

        let s1 = s.clone();
        let t1 = std::thread::spawn(move || {
            let names = vec!["x".to_string(), "y".to_string()];
            let txn: Transaction<Demo> = s1.open_many_for_update(&names).unwrap();
            let mut commit = txn.into_commit();
            std::thread::sleep(std::time::Duration::from_millis(10));
            let mut next = BTreeMap::new();
            next.insert("x".to_string(), Demo { count: 1 });
            next.insert("y".to_string(), Demo { count: 1 });
            commit.commit(&next).unwrap();
        });

        let s2 = s.clone();
        let t2 = std::thread::spawn(move || {
            let names = vec!["y".to_string(), "x".to_string()];
            let txn: Transaction<Demo> = s2.open_many_for_update(&names).unwrap();
            let mut commit = txn.into_commit();
            std::thread::sleep(std::time::Duration::from_millis(10));
            let mut next = BTreeMap::new();
            next.insert("x".to_string(), Demo { count: 2 });
            next.insert("y".to_string(), Demo { count: 2 });
            commit.commit(&next).unwrap();
        });

        t1.join().unwrap();
        t2.join().unwrap();
    }
}
