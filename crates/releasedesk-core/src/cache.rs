//! A process-local TTL cache guarded by a reader/writer lock.
//!
//! Every entry carries a tag (the product id of the deployment it describes)
//! so a release can evict exactly the entries of one product. Expired entries
//! are dropped lazily by the read that finds them.
//!
//! Populating the cache races with invalidation: a reader may compute a value
//! from pre-release data and try to store it after the release evicted the
//! key. To keep the release observable on the next read, every eviction bumps
//! an epoch, and [`TtlCache::insert`] refuses values computed under an older
//! epoch.

use std::{collections::HashMap, time::Duration};

use parking_lot::RwLock;
use tokio::time::Instant;

/// Entries live this long unless evicted first.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Cache key for the pending updates of one deployment.
pub fn deployment_key(id: uuid::Uuid) -> String { format!("deployment:{id}") }

struct Entry<V> {
  value:      V,
  tag:        String,
  expires_at: Instant,
}

struct Inner<V> {
  entries: HashMap<String, Entry<V>>,
  epoch:   u64,
}

pub struct TtlCache<V> {
  ttl:   Duration,
  inner: RwLock<Inner<V>>,
}

impl<V: Clone> TtlCache<V> {
  pub fn new(ttl: Duration) -> Self {
    Self {
      ttl,
      inner: RwLock::new(Inner { entries: HashMap::new(), epoch: 0 }),
    }
  }

  pub fn ttl(&self) -> Duration { self.ttl }

  /// The current invalidation epoch. Read it before computing a value that
  /// will be passed to [`TtlCache::insert`].
  pub fn epoch(&self) -> u64 { self.inner.read().epoch }

  pub fn get(&self, key: &str) -> Option<V> {
    let now = Instant::now();
    {
      let inner = self.inner.read();
      match inner.entries.get(key) {
        None => return None,
        Some(entry) if entry.expires_at > now => {
          return Some(entry.value.clone());
        }
        Some(_) => {}
      }
    }

    // Expired: take the write lock and re-check before removing, another
    // writer may have refreshed the entry in between.
    let mut inner = self.inner.write();
    if inner.entries.get(key).is_some_and(|e| e.expires_at <= now) {
      inner.entries.remove(key);
    }
    None
  }

  /// Store `value` unless an eviction happened since `epoch` was read.
  /// Returns whether the value was stored.
  pub fn insert(
    &self,
    key: impl Into<String>,
    tag: impl Into<String>,
    value: V,
    epoch: u64,
  ) -> bool {
    let mut inner = self.inner.write();
    if inner.epoch != epoch {
      return false;
    }
    let entry = Entry {
      value,
      tag: tag.into(),
      expires_at: Instant::now() + self.ttl,
    };
    inner.entries.insert(key.into(), entry);
    true
  }

  pub fn evict(&self, key: &str) -> bool {
    let mut inner = self.inner.write();
    inner.epoch += 1;
    inner.entries.remove(key).is_some()
  }

  /// Evict every entry carrying `tag`; returns how many were removed.
  pub fn evict_tag(&self, tag: &str) -> usize {
    let mut inner = self.inner.write();
    inner.epoch += 1;
    let before = inner.entries.len();
    inner.entries.retain(|_, e| e.tag != tag);
    before - inner.entries.len()
  }

  pub fn clear(&self) {
    let mut inner = self.inner.write();
    inner.epoch += 1;
    inner.entries.clear();
  }

  /// Number of stored entries, expired ones included.
  pub fn len(&self) -> usize { self.inner.read().entries.len() }

  pub fn is_empty(&self) -> bool { self.len() == 0 }
}

impl<V: Clone> Default for TtlCache<V> {
  fn default() -> Self { Self::new(DEFAULT_TTL) }
}

impl<V> std::fmt::Debug for TtlCache<V> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let inner = self.inner.read();
    f.debug_struct("TtlCache")
      .field("ttl", &self.ttl)
      .field("entries", &inner.entries.len())
      .field("epoch", &inner.epoch)
      .finish()
  }
}
