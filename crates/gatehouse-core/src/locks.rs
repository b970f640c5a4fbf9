//! Keyed lock table: one async mutex per gate pass, created on demand.
//!
//! Admitting a scan reads the pass, validates it, and bumps `uses_count`.
//! Holding the pass's lock across that sequence keeps two scans on the same
//! pass from both spending the last use. Scans on different passes never
//! wait on each other.

use std::{
  collections::HashMap,
  sync::{Arc, Mutex, PoisonError},
};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

/// Held for the duration of one pass mutation.
pub type PassGuard = OwnedMutexGuard<()>;

/// Idle entries are pruned once the table grows past this many passes.
const PRUNE_AT: usize = 1024;

#[derive(Debug, Clone, Default)]
pub struct PassLocks {
  table: Arc<Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>>,
}

impl PassLocks {
  pub fn new() -> Self { Self::default() }

  /// Wait for exclusive access to `pass_id`.
  pub async fn lock(&self, pass_id: Uuid) -> PassGuard {
    let slot = {
      let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
      if table.len() >= PRUNE_AT {
        table.retain(|_, slot| Arc::strong_count(slot) > 1);
      }
      Arc::clone(table.entry(pass_id).or_default())
    };
    slot.lock_owned().await
  }

  /// Drop entries nobody holds or waits on.
  pub fn prune(&self) {
    let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
    table.retain(|_, slot| Arc::strong_count(slot) > 1);
  }

  /// Number of passes with a lock entry.
  pub fn len(&self) -> usize {
    self.table.lock().unwrap_or_else(PoisonError::into_inner).len()
  }

  pub fn is_empty(&self) -> bool { self.len() == 0 }
}
