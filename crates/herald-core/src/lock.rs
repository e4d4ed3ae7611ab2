//! Distributed lock manager
//!
//! Serializes work across independently launched processes that share only
//! the credential store file. A lock is a row in `locks`; it is taken with a
//! conditional upsert and expires on its own after the TTL, so a process
//! that dies while holding it blocks others for at most that long.
//!
//! Waiters poll. There is no queue and no fairness: whoever's write lands
//! first after the lock frees up wins.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::constants::locks;
use crate::storage::{is_busy, now_micros, Database, LockStore};

/// Lock timing
#[derive(Debug, Clone, Copy)]
pub struct LockConfig {
    pub ttl: Duration,
    pub poll_interval: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            ttl: locks::TTL,
            poll_interval: locks::POLL_INTERVAL,
        }
    }
}

impl LockConfig {
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    fn ttl_micros(&self) -> i64 {
        i64::try_from(self.ttl.as_micros()).unwrap_or(i64::MAX)
    }
}

/// Opaque proof of ownership returned by [`LockManager::acquire`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HolderToken(String);

impl HolderToken {
    fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HolderToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lock manager over the shared database at `db_path`
#[derive(Debug, Clone)]
pub struct LockManager {
    db_path: PathBuf,
    config: LockConfig,
}

impl LockManager {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self::with_config(db_path, LockConfig::default())
    }

    pub fn with_config(db_path: impl Into<PathBuf>, config: LockConfig) -> Self {
        Self {
            db_path: db_path.into(),
            config,
        }
    }

    /// Wait until `operation` is owned by this caller.
    ///
    /// Polls without a deadline; the host's own time budget bounds it.
    /// Contention from other connections counts as "not yet", any other
    /// store failure is returned.
    pub async fn acquire(&self, operation: &str) -> Result<HolderToken> {
        self.lock(operation)
            .await?
            .into_token()
            .context("Lock guard released before hand-off")
    }

    /// Acquire `operation` and hold it until the guard is dropped.
    ///
    /// Each attempt claims through a guard built on the blocking thread. If
    /// this future is dropped mid-attempt, tokio drops the detached task's
    /// output and the guard releases the row.
    pub async fn lock(&self, operation: &str) -> Result<LockGuard> {
        let token = HolderToken::generate();
        let mut attempts: u64 = 0;

        loop {
            attempts += 1;
            let db_path = self.db_path.clone();
            let op = operation.to_string();
            let holder = token.clone();
            let ttl_micros = self.config.ttl_micros();

            let attempt = tokio::task::spawn_blocking(move || {
                claim_guard(db_path, op, holder, ttl_micros)
            })
            .await
            .context("Lock attempt task failed")?;

            match attempt {
                Ok(Some(guard)) => {
                    debug!(operation, holder = %token, attempts, "Lock acquired");
                    return Ok(guard);
                }
                Ok(None) => {
                    debug!(operation, attempts, "Lock held elsewhere, polling");
                }
                Err(e) if is_busy(&e) => {
                    debug!(operation, attempts, "Credential store busy, polling");
                }
                Err(e) => return Err(e.context(format!("Failed to acquire lock {operation}"))),
            }

            sleep(self.config.poll_interval).await;
        }
    }

    /// Delete every lock row owned by `token`.
    ///
    /// Releasing twice, or after the lock went stale and was taken over,
    /// is a no-op.
    pub fn release(&self, token: &HolderToken) -> Result<()> {
        release_at(&self.db_path, token)
    }
}

fn claim_guard(
    db_path: PathBuf,
    operation: String,
    holder: HolderToken,
    ttl_micros: i64,
) -> Result<Option<LockGuard>> {
    if !try_claim(&db_path, &operation, &holder, ttl_micros)? {
        return Ok(None);
    }
    Ok(Some(LockGuard {
        db_path,
        operation,
        token: Some(holder),
    }))
}

fn try_claim(db_path: &Path, operation: &str, holder: &HolderToken, ttl_micros: i64) -> Result<bool> {
    let db = Database::new(db_path)?;
    let store = LockStore::new(&db);

    if let Some(true) = store.try_claim(operation, holder.as_str(), now_micros(), ttl_micros)? {
        return Ok(true);
    }

    // Some SQLite builds report nothing back from the upsert even when it
    // wrote the row; the row itself is authoritative
    let current = store.holder(operation)?;
    Ok(current.as_deref() == Some(holder.as_str()))
}

fn release_at(db_path: &Path, token: &HolderToken) -> Result<()> {
    let db = Database::new(db_path)?;
    let removed = LockStore::new(&db).release(token.as_str())?;
    debug!(holder = %token, removed, "Lock released");
    Ok(())
}

/// Held lock; released on drop
pub struct LockGuard {
    db_path: PathBuf,
    operation: String,
    token: Option<HolderToken>,
}

impl LockGuard {
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Hand the held lock over to the caller without releasing it
    fn into_token(mut self) -> Option<HolderToken> {
        self.token.take()
    }

    /// Release now, reporting failures instead of logging them
    pub fn release(mut self) -> Result<()> {
        match self.token.take() {
            Some(token) => release_at(&self.db_path, &token),
            None => Ok(()),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            if let Err(e) = release_at(&self.db_path, &token) {
                // The row expires after the TTL anyway
                warn!(operation = %self.operation, error = %e, "Failed to release lock");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    use tempfile::TempDir;

    use super::*;

    fn fast_config() -> LockConfig {
        LockConfig::default().with_poll_interval(Duration::from_millis(10))
    }

    fn manager(temp: &TempDir) -> LockManager {
        LockManager::with_config(temp.path().join("common.sqlite"), fast_config())
    }

    #[tokio::test]
    async fn test_acquire_then_release_frees_lock_immediately() {
        let temp = TempDir::new().unwrap();
        let first = manager(&temp);
        let second = manager(&temp);

        let token = first.acquire("refresh").await.unwrap();
        first.release(&token).unwrap();

        let started = Instant::now();
        let other = tokio::time::timeout(Duration::from_secs(5), second.acquire("refresh"))
            .await
            .expect("second process should not wait out the TTL")
            .unwrap();
        assert_ne!(other, token);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_held_lock_blocks_other_holders() {
        let temp = TempDir::new().unwrap();
        let first = manager(&temp);
        let second = manager(&temp);

        let _token = first.acquire("refresh").await.unwrap();
        let waited =
            tokio::time::timeout(Duration::from_millis(200), second.acquire("refresh")).await;
        assert!(waited.is_err(), "lock must not be granted twice");
    }

    #[tokio::test]
    async fn test_stale_lock_is_taken_over() {
        let temp = TempDir::new().unwrap();
        let config = fast_config().with_ttl(Duration::from_millis(100));
        let crashed = LockManager::with_config(temp.path().join("common.sqlite"), config);
        let survivor = LockManager::with_config(temp.path().join("common.sqlite"), config);

        // Never released, as if the holder died
        let _abandoned = crashed.acquire("refresh").await.unwrap();

        let token = tokio::time::timeout(Duration::from_secs(5), survivor.acquire("refresh"))
            .await
            .expect("stale lock should be taken over")
            .unwrap();

        let db = Database::new(&temp.path().join("common.sqlite")).unwrap();
        let holder = LockStore::new(&db).holder("refresh").unwrap();
        assert_eq!(holder.as_deref(), Some(token.as_str()));
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let locks = manager(&temp);

        let token = locks.acquire("refresh").await.unwrap();
        locks.release(&token).unwrap();
        locks.release(&token).unwrap();
    }

    #[tokio::test]
    async fn test_guard_releases_on_drop() {
        let temp = TempDir::new().unwrap();
        let locks = manager(&temp);

        {
            let guard = locks.lock("refresh").await.unwrap();
            assert_eq!(guard.operation(), "refresh");
        }

        let db = Database::new(&temp.path().join("common.sqlite")).unwrap();
        assert!(LockStore::new(&db).get("refresh").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_abandoned_attempt_does_not_leave_lock_held() {
        let temp = TempDir::new().unwrap();
        let locks = manager(&temp);
        Database::new(&temp.path().join("common.sqlite")).unwrap();

        // Gives up right after the claim is handed to the blocking pool
        let abandoned = tokio::time::timeout(Duration::ZERO, locks.lock("refresh")).await;
        drop(abandoned);

        let db = Database::new(&temp.path().join("common.sqlite")).unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        while LockStore::new(&db).get("refresh").unwrap().is_some() {
            assert!(Instant::now() < deadline, "abandoned claim still holds the lock");
            sleep(Duration::from_millis(10)).await;
        }

        let other = manager(&temp);
        let started = Instant::now();
        tokio::time::timeout(Duration::from_secs(1), other.acquire("refresh"))
            .await
            .expect("lock should be free well before the TTL")
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_holders_never_overlap() {
        let temp = TempDir::new().unwrap();
        let db_path = temp.path().join("common.sqlite");
        Database::new(&db_path).unwrap();

        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));
        let mut tasks = Vec::new();

        // Each task opens its own connections, like a separate process
        for _ in 0..6 {
            let locks = LockManager::with_config(db_path.clone(), fast_config());
            let inside = inside.clone();
            let max_inside = max_inside.clone();
            tasks.push(tokio::spawn(async move {
                for _ in 0..3 {
                    let guard = locks.lock("X").await.unwrap();
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    sleep(Duration::from_millis(5)).await;
                    inside.fetch_sub(1, Ordering::SeqCst);
                    guard.release().unwrap();
                }
            }));
        }

        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }
}
