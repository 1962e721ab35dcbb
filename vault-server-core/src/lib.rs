//! The storage-and-blob-agnostic request handlers behind every `/v2/*`
//! endpoint (§4, §6.1). This crate owns account, album, sharing, file and
//! sync semantics; wiring them to an HTTP surface is left to the `server`
//! binary so the two can be tested independently.

pub mod album;
pub mod contacts;
pub mod encoding;
pub mod error;
pub mod file;
pub mod password;
pub mod share;
pub mod sync;
pub mod token;
pub mod user;

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use vault_blobstore::BlobStore;
use vault_storage::Storage;

/// The only piece of ambient global state the core needs (§9 "current time
/// for sorting/expiry decisions"): injected so tests can hold it fixed
/// instead of racing the wall clock.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

#[derive(Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock predates the epoch")
            .as_millis() as i64
    }
}

/// The handle every endpoint handler runs against: the encrypted metadata
/// store, the content-addressed blob store, and the injected clock. Cheap
/// to clone (both `Storage` and `BlobStore` are themselves clonable handles
/// onto shared state), so one instance is built at startup and handed to
/// each request.
#[derive(Clone)]
pub struct ServerCore {
    pub storage: Storage,
    pub blobs: BlobStore,
    pub clock: Arc<dyn Clock>,
    pub space_quota_mib: u64,
}

impl ServerCore {
    pub fn new(storage: Storage, blobs: BlobStore, clock: Arc<dyn Clock>, space_quota_mib: u64) -> Self {
        Self {
            storage,
            blobs,
            clock,
            space_quota_mib,
        }
    }

    pub fn with_system_clock(storage: Storage, blobs: BlobStore, space_quota_mib: u64) -> Self {
        Self::new(storage, blobs, Arc::new(SystemClock), space_quota_mib)
    }
}
