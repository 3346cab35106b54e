//! Concurrency guard
//!
//! One async mutex per ledger key. Producers (a camera loop, an operator
//! command, a request handler) run the whole read-classify-persist cycle
//! while holding the lease for the ledger they touch, so two producers can
//! never interleave on the same month of the same person. Different ledgers
//! proceed in parallel.
//!
//! The lease is an RAII token: dropping it releases the lock, whichever way
//! the holder exits. [`LedgerStore::apply`](crate::ledger::LedgerStore::apply)
//! demands a lease for its key, so the store cannot be mutated unguarded.

use crate::error::{Error, Result};
use crate::ledger::LedgerKey;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, warn};

/// Lock map size above which idle entries are dropped
const PRUNE_THRESHOLD: usize = 256;

/// Proof that the holder exclusively owns one ledger
#[derive(Debug)]
pub struct LedgerLease {
    key: LedgerKey,
    _guard: OwnedMutexGuard<()>,
}

impl LedgerLease {
    pub fn key(&self) -> &LedgerKey {
        &self.key
    }
}

type LockMap = HashMap<LedgerKey, Arc<AsyncMutex<()>>>;

/// Registry of per-ledger locks, cheap to clone and share between producers
#[derive(Debug, Clone)]
pub struct ConcurrencyGuard {
    locks: Arc<Mutex<LockMap>>,
    timeout: Duration,
}

impl ConcurrencyGuard {
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: Arc::new(Mutex::new(HashMap::new())),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn lock_for(&self, key: &LedgerKey) -> Arc<AsyncMutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if locks.len() > PRUNE_THRESHOLD {
            // Only the map itself holds an idle lock
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }

        locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Wait for exclusive ownership of `key`, up to the configured timeout
    pub async fn acquire(&self, key: &LedgerKey) -> Result<LedgerLease> {
        let lock = self.lock_for(key);
        match tokio::time::timeout(self.timeout, lock.lock_owned()).await {
            Ok(guard) => {
                debug!(ledger = %key, "Ledger lock acquired");
                Ok(LedgerLease {
                    key: key.clone(),
                    _guard: guard,
                })
            }
            Err(_) => {
                let waited_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
                warn!(ledger = %key, waited_ms, "Timed out waiting for ledger lock");
                Err(Error::ConcurrencyTimeout {
                    key: key.to_string(),
                    waited_ms,
                })
            }
        }
    }

    /// Run `work` while holding the lease for `key`
    ///
    /// The lease moves into `work` and is released when the future
    /// completes, fails, or is dropped.
    pub async fn with_lock<F, Fut, T>(&self, key: &LedgerKey, work: F) -> Result<T>
    where
        F: FnOnce(LedgerLease) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let lease = self.acquire(key).await?;
        work(lease).await
    }

    /// Number of tracked lock entries
    pub fn tracked(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

impl Default for ConcurrencyGuard {
    fn default() -> Self {
        Self::new(Duration::from_millis(5000))
    }
}
