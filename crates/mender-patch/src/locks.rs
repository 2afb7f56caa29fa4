//! Per-service mutual exclusion for patch application

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async lock per service directory
///
/// Clones share the same lock table.
#[derive(Debug, Clone, Default)]
pub struct ServiceLocks {
    inner: Arc<Mutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>>,
}

impl ServiceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `service_dir`
    pub async fn lock(&self, service_dir: &Path) -> OwnedMutexGuard<()> {
        let key = service_dir
            .canonicalize()
            .unwrap_or_else(|_| service_dir.to_path_buf());

        let lock = {
            let mut table = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            table.entry(key).or_default().clone()
        };
        lock.lock_owned().await
    }
}
