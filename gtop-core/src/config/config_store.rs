//! Versioned config cell that long-running tasks can wait on.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{RwLock, RwLockReadGuard, watch};

/// A shared configuration value plus a change signal.
///
/// Request handlers just [`read`](ConfigStore::read) it. Background loops
/// also hold a [`ConfigWatcher`] so a SIGHUP reload can interrupt a sleep
/// that was computed from the old value.
pub struct ConfigStore<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    data: RwLock<T>,
    version: AtomicU64,
    version_tx: watch::Sender<u64>,
}

/// Resolves once per [`ConfigStore::update`].
pub struct ConfigWatcher {
    version_rx: watch::Receiver<u64>,
}

impl<T> ConfigStore<T> {
    pub fn new(initial: T) -> Self {
        let (version_tx, _) = watch::channel(0u64);
        Self {
            inner: Arc::new(Inner {
                data: RwLock::new(initial),
                version: AtomicU64::new(0),
                version_tx,
            }),
        }
    }

    /// Replace the value, then wake every watcher.
    pub async fn update(&self, value: T) {
        let mut guard = self.inner.data.write().await;
        *guard = value;
        let version = self.inner.version.fetch_add(1, Ordering::Relaxed) + 1;
        // release the lock first so woken watchers can read immediately
        drop(guard);
        self.inner.version_tx.send_replace(version);
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, T> {
        self.inner.data.read().await
    }

    pub fn version(&self) -> u64 {
        self.inner.version.load(Ordering::Relaxed)
    }

    pub fn subscribe(&self) -> ConfigWatcher {
        ConfigWatcher {
            version_rx: self.inner.version_tx.subscribe(),
        }
    }
}

impl<T: Clone> ConfigStore<T> {
    /// Clone the current value out so no lock is held while it is used.
    pub async fn snapshot(&self) -> T {
        self.inner.data.read().await.clone()
    }
}

impl<T> Clone for ConfigStore<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl ConfigWatcher {
    /// Wait for the next update. Errors once the store is dropped.
    pub async fn changed(&mut self) -> Result<(), watch::error::RecvError> {
        self.version_rx.changed().await
    }
}
