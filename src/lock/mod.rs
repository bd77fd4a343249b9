// Copyright 2025 Adobe. All rights reserved.
// This file is licensed to you under the Apache License,
// Version 2.0 (http://www.apache.org/licenses/LICENSE-2.0)
// or the MIT license (http://opensource.org/licenses/MIT),
// at your option.
//
// Unless required by applicable law or agreed to in writing,
// this software is distributed on an "AS IS" BASIS, WITHOUT
// WARRANTIES OR REPRESENTATIONS OF ANY KIND, either express or
// implied. See the LICENSE-MIT and LICENSE-APACHE files for the
// specific language governing permissions and limitations under
// each license.

//! Cooperative file lock backed by a shared database table.
//!
//! Remote keys have no filesystem lock to lean on, so writers serialize
//! through a `object_storage_file_lock` row per key. The claim is a single
//! compare-and-set UPDATE, which the database serializes across processes;
//! waiters poll at a fixed interval until a retry budget runs out.
//!
//! The lock is advisory. It only protects writers that go through this
//! module, and a holder that dies without releasing leaves the row claimed
//! until an operator clears it.

use serde_json::Value;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::storage::adapter::ObjectStorage;
use crate::storage::error::{StorageError, StorageResult};

const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_MAX_RETRIES: usize = 100;
const MAX_CONNECTIONS: u32 = 5;

/// Handle to the shared lock table.
pub struct FileLockRegistry {
    pool: SqlitePool,
    retry_interval: Duration,
    max_retries: usize,
}

impl FileLockRegistry {
    /// Connect to the lock database and create the table if absent.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect(database_url)
            .await?;
        let registry = Self {
            pool,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            max_retries: DEFAULT_MAX_RETRIES,
        };
        registry.migrate().await?;
        Ok(registry)
    }

    /// How long a waiter sleeps between claim attempts.
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// How many claim attempts a waiter makes before timing out.
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    async fn migrate(&self) -> StorageResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS object_storage_file_lock (
                 file_key TEXT PRIMARY KEY,
                 access_lock INTEGER NOT NULL DEFAULT 0,
                 created_at TEXT NOT NULL,
                 updated_at TEXT NOT NULL
             )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Make sure a lock row exists for `key`. Two writers racing on the
    /// insert is fine; the loser's insert is ignored.
    async fn ensure_row(&self, key: &str) -> StorageResult<()> {
        let now = chrono::Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT OR IGNORE INTO object_storage_file_lock
                 (file_key, access_lock, created_at, updated_at)
             VALUES (?, 0, ?, ?)",
        )
        .bind(key)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Claim the lock for `key`, polling until the retry budget is spent.
    pub async fn acquire(&self, key: &str) -> StorageResult<()> {
        self.ensure_row(key).await?;

        for attempt in 1..=self.max_retries {
            let result = sqlx::query(
                "UPDATE object_storage_file_lock
                 SET access_lock = 1, updated_at = ?
                 WHERE file_key = ? AND access_lock = 0",
            )
            .bind(chrono::Utc::now().to_rfc3339())
            .bind(key)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 1 {
                debug!("Acquired file lock: {}", key);
                return Ok(());
            }

            info!(
                "Waiting for file lock: {} (attempt {}/{})",
                key, attempt, self.max_retries
            );
            tokio::time::sleep(self.retry_interval).await;
        }

        Err(StorageError::LockTimeout {
            key: key.to_string(),
        })
    }

    /// Release the lock for `key`. Safe to call on an unclaimed key.
    pub async fn release(&self, key: &str) -> StorageResult<()> {
        sqlx::query(
            "UPDATE object_storage_file_lock
             SET access_lock = 0, updated_at = ?
             WHERE file_key = ?",
        )
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(key)
        .execute(&self.pool)
        .await?;
        debug!("Released file lock: {}", key);
        Ok(())
    }

    /// Run `operation` while holding the lock for `key`, releasing it on
    /// every exit path.
    pub async fn with_lock<T, F, Fut>(&self, key: &str, operation: F) -> StorageResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = StorageResult<T>>,
    {
        self.acquire(key).await?;
        let outcome = operation().await;
        if let Err(e) = self.release(key).await {
            error!("Failed to release file lock {}: {}", key, e);
            if outcome.is_ok() {
                return Err(e);
            }
        }
        outcome
    }

    /// Locked read-modify-write of a JSON array object.
    ///
    /// A missing or unreadable object reads as an empty array, so the first
    /// writer can append without a separate create step and a corrupt
    /// object is repaired by the next write. The mutated array is written
    /// back unconditionally and returned.
    pub async fn access_file_as_data<F>(
        &self,
        storage: &dyn ObjectStorage,
        key: &str,
        mutate: F,
    ) -> StorageResult<Vec<Value>>
    where
        F: FnOnce(Vec<Value>) -> Vec<Value> + Send,
    {
        self.with_lock(key, || async {
            let members: Vec<Value> = match storage.get_object(key).await {
                Ok(bytes) => match serde_json::from_slice(&bytes) {
                    Ok(members) => members,
                    Err(e) => {
                        warn!("Unreadable lock-managed object {}: {}", key, e);
                        Vec::new()
                    }
                },
                Err(e) if e.is_not_found() => Vec::new(),
                Err(e) => return Err(e),
            };
            let updated = mutate(members);
            storage.put_object(&Value::Array(updated.clone()), key).await?;
            Ok(updated)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::config::StorageConfig;
    use crate::storage::local::LocalAdapter;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn test_registry(temp_dir: &TempDir) -> FileLockRegistry {
        // An on-disk database, so every pool connection sees the same table.
        let url = format!("sqlite://{}/locks.db?mode=rwc", temp_dir.path().display());
        FileLockRegistry::connect(&url)
            .await
            .unwrap()
            .with_retry_interval(Duration::from_millis(10))
            .with_max_retries(50)
    }

    #[tokio::test]
    async fn test_acquire_and_release() {
        let temp_dir = TempDir::new().unwrap();
        let registry = test_registry(&temp_dir).await;

        registry.acquire("uploads/a.json").await.unwrap();
        registry.release("uploads/a.json").await.unwrap();
        // Reacquire after release succeeds immediately.
        registry.acquire("uploads/a.json").await.unwrap();
        registry.release("uploads/a.json").await.unwrap();
    }

    #[tokio::test]
    async fn test_independent_keys_do_not_contend() {
        let temp_dir = TempDir::new().unwrap();
        let registry = test_registry(&temp_dir).await;

        registry.acquire("a.json").await.unwrap();
        registry.acquire("b.json").await.unwrap();
        registry.release("a.json").await.unwrap();
        registry.release("b.json").await.unwrap();
    }

    #[tokio::test]
    async fn test_contended_key_times_out() {
        let temp_dir = TempDir::new().unwrap();
        let registry = test_registry(&temp_dir).await.with_max_retries(3);

        registry.acquire("contended.json").await.unwrap();
        let err = registry.acquire("contended.json").await.unwrap_err();
        match err {
            StorageError::LockTimeout { key } => assert_eq!(key, "contended.json"),
            other => panic!("Expected LockTimeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_release_on_unclaimed_key_is_harmless() {
        let temp_dir = TempDir::new().unwrap();
        let registry = test_registry(&temp_dir).await;
        registry.release("never-claimed.json").await.unwrap();
    }

    #[tokio::test]
    async fn test_with_lock_releases_on_error() {
        let temp_dir = TempDir::new().unwrap();
        let registry = test_registry(&temp_dir).await;

        let err = registry
            .with_lock("k.json", || async {
                Err::<(), _>(StorageError::ConfigError("boom".to_string()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::ConfigError(_)));

        // The lock is free again.
        registry.acquire("k.json").await.unwrap();
        registry.release("k.json").await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_with_lock_is_mutually_exclusive() {
        let temp_dir = TempDir::new().unwrap();
        let registry = Arc::new(test_registry(&temp_dir).await.with_max_retries(500));

        let in_critical = Arc::new(AtomicBool::new(false));
        let completed = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            let in_critical = in_critical.clone();
            let completed = completed.clone();
            handles.push(tokio::spawn(async move {
                registry
                    .with_lock("shared.json", || async {
                        assert!(!in_critical.swap(true, Ordering::SeqCst));
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        in_critical.store(false, Ordering::SeqCst);
                        completed.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .await
            }));
        }

        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(completed.load(Ordering::SeqCst), 8);
    }

    #[tokio::test]
    async fn test_access_file_as_data_appends() {
        let temp_dir = TempDir::new().unwrap();
        let registry = test_registry(&temp_dir).await;

        let storage_dir = TempDir::new().unwrap();
        let config = StorageConfig::local()
            .with_option("local_path", storage_dir.path().to_string_lossy());
        let storage = LocalAdapter::new(&config).unwrap();

        // A missing object starts from an empty array.
        let updated = registry
            .access_file_as_data(&storage, "members/list.json", |mut members| {
                assert!(members.is_empty());
                members.push(json!({"id": 1}));
                members
            })
            .await
            .unwrap();
        assert_eq!(updated.len(), 1);

        let updated = registry
            .access_file_as_data(&storage, "members/list.json", |mut members| {
                members.push(json!({"id": 2}));
                members
            })
            .await
            .unwrap();
        assert_eq!(updated, vec![json!({"id": 1}), json!({"id": 2})]);

        // The stored object matches what was returned.
        let bytes = storage.get_object("members/list.json").await.unwrap();
        let stored: Vec<Value> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(stored, updated);
    }

    #[tokio::test]
    async fn test_access_file_as_data_recovers_corrupt_object() {
        let temp_dir = TempDir::new().unwrap();
        let registry = test_registry(&temp_dir).await;

        let storage_dir = TempDir::new().unwrap();
        let config = StorageConfig::local()
            .with_option("local_path", storage_dir.path().to_string_lossy());
        let storage = LocalAdapter::new(&config).unwrap();
        std::fs::write(storage_dir.path().join("broken.json"), b"{ not json").unwrap();

        // Unreadable content reads as empty, and the write repairs it.
        let updated = registry
            .access_file_as_data(&storage, "broken.json", |mut members| {
                assert!(members.is_empty());
                members.push(json!({"id": 1}));
                members
            })
            .await
            .unwrap();
        assert_eq!(updated, vec![json!({"id": 1})]);

        let bytes = storage.get_object("broken.json").await.unwrap();
        let stored: Vec<Value> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(stored, updated);
    }
}
