//! Per-feed pass serialization.
//!
//! Closing the open history and status rows is not idempotent under
//! interleaving: two passes over the same feed could each close a different
//! "current" row or leave two rows open. [`FeedLocks`] hands out one
//! [`tokio::sync::Mutex`] per feed; a pass holds the guard from its start to
//! its terminal state. Passes over different feeds do not contend.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use super::FeedId;
use crate::error::TrackerError;

/// Proof that the holder is the only pass running for a feed.
pub type FeedPassGuard = OwnedMutexGuard<()>;

/// Registry of per-feed pass locks.
#[derive(Debug, Default)]
pub struct FeedLocks {
    locks: RwLock<HashMap<FeedId, Arc<Mutex<()>>>>,
}

impl FeedLocks {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the pass lock of `feed_id` without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::PassInProgress`] if another pass currently
    /// holds the lock.
    pub async fn try_acquire(&self, feed_id: FeedId) -> Result<FeedPassGuard, TrackerError> {
        let lock = self.lock_for(feed_id).await;
        lock.try_lock_owned()
            .map_err(|_| TrackerError::PassInProgress(feed_id))
    }

    /// Returns `true` if a pass is running for `feed_id`.
    pub async fn is_locked(&self, feed_id: FeedId) -> bool {
        let map = self.locks.read().await;
        map.get(&feed_id).is_some_and(|lock| lock.try_lock().is_err())
    }

    async fn lock_for(&self, feed_id: FeedId) -> Arc<Mutex<()>> {
        if let Some(lock) = self.locks.read().await.get(&feed_id) {
            return Arc::clone(lock);
        }
        let mut map = self.locks.write().await;
        Arc::clone(map.entry(feed_id).or_default())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_pass_on_same_feed_is_rejected() {
        let locks = FeedLocks::new();
        let Ok(_guard) = locks.try_acquire(FeedId::new(1)).await else {
            panic!("first acquire failed");
        };
        let second = locks.try_acquire(FeedId::new(1)).await;
        assert!(matches!(second, Err(TrackerError::PassInProgress(id)) if id == FeedId::new(1)));
    }

    #[test]
    fn different_feeds_do_not_contend() {
        let locks = FeedLocks::new();
        let _first = tokio_test::assert_ok!(tokio_test::block_on(locks.try_acquire(FeedId::new(1))));
        let _second = tokio_test::assert_ok!(tokio_test::block_on(locks.try_acquire(FeedId::new(2))));
        tokio_test::assert_err!(tokio_test::block_on(locks.try_acquire(FeedId::new(1))));
    }

    #[tokio::test]
    async fn lock_is_released_on_drop() {
        let locks = FeedLocks::new();
        let Ok(guard) = locks.try_acquire(FeedId::new(3)).await else {
            panic!("first acquire failed");
        };
        assert!(locks.is_locked(FeedId::new(3)).await);
        drop(guard);
        assert!(!locks.is_locked(FeedId::new(3)).await);
        assert!(locks.try_acquire(FeedId::new(3)).await.is_ok());
    }
}
