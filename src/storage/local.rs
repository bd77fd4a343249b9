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

//! Local filesystem backend, rooted at a configured directory.
//!
//! Keys map to paths below the root, so the same key space works against
//! this backend and the remote ones. All transfers run synchronously; the
//! async flag is accepted and ignored, with callbacks invoked inline.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::debug;

use super::adapter::{
    apply_csv_filter, notify_sync_outcome, ObjectMetadata, ObjectStorage, TransferOptions,
};
use super::config::{StorageConfig, StorageOptions, StorageType};
use super::error::{StorageError, StorageResult};
use super::prefix::{join_key, walk_local_files};

/// Storage adapter over a directory tree.
pub struct LocalAdapter {
    options: StorageOptions,
    root: PathBuf,
}

impl LocalAdapter {
    /// Build the adapter, creating the root directory if absent.
    pub fn new(config: &StorageConfig) -> StorageResult<Self> {
        let options = config.storage_options();
        if options.local_path.is_empty() {
            return Err(StorageError::ConfigError(
                "Local storage requires the 'local_path' option".to_string(),
            ));
        }

        let root = PathBuf::from(&options.local_path);
        std::fs::create_dir_all(&root)?;
        debug!("Created local storage rooted at: {}", root.display());

        Ok(Self { options, root })
    }

    fn full_path(&self, key: &str) -> PathBuf {
        self.root.join(key.trim_start_matches('/'))
    }

    async fn copy_file(&self, source: &Path, target: &Path) -> StorageResult<u64> {
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        match tokio::fs::copy(source, target).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound {
                path: source.to_string_lossy().to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }
}

impl std::fmt::Debug for LocalAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalAdapter")
            .field("root", &self.root)
            .finish()
    }
}

#[async_trait]
impl ObjectStorage for LocalAdapter {
    fn storage_type(&self) -> StorageType {
        StorageType::Local
    }

    fn storage_options(&self) -> &StorageOptions {
        &self.options
    }

    async fn path_exists(&self, path: &str) -> StorageResult<bool> {
        Ok(tokio::fs::try_exists(self.full_path(path)).await?)
    }

    async fn list_files(&self, folder: &str, filter_csv: bool) -> StorageResult<Vec<String>> {
        let folder_path = self.full_path(folder);
        if !folder_path.exists() {
            return Ok(Vec::new());
        }

        let keys = walk_local_files(&folder_path)
            .await?
            .into_iter()
            .map(|(_, relative)| join_key(folder.trim_start_matches('/'), &relative))
            .collect();
        Ok(apply_csv_filter(keys, filter_csv))
    }

    async fn get_object(&self, key: &str) -> StorageResult<Vec<u8>> {
        match tokio::fs::read(self.full_path(key)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound {
                path: key.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn put_object(&self, obj: &Value, key: &str) -> StorageResult<()> {
        let path = self.full_path(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, serde_json::to_vec(obj)?).await?;
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> StorageResult<()> {
        match tokio::fs::remove_file(self.full_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound {
                path: key.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn upload_file(
        &self,
        local_path: &Path,
        key: &str,
        options: TransferOptions,
    ) -> StorageResult<()> {
        let started = Instant::now();
        let outcome = self.copy_file(local_path, &self.full_path(key)).await;
        notify_sync_outcome(options, started, &outcome);
        outcome.map(|_| ())
    }

    async fn upload_folder(
        &self,
        local_path: &Path,
        key: &str,
        _prefer_async: bool,
    ) -> StorageResult<()> {
        for (absolute, relative) in walk_local_files(local_path).await? {
            let object_key = join_key(key, &relative);
            self.upload_file(&absolute, &object_key, TransferOptions::sync())
                .await?;
        }
        Ok(())
    }

    async fn download_file(
        &self,
        key: &str,
        local_path: &Path,
        options: TransferOptions,
    ) -> StorageResult<()> {
        let started = Instant::now();
        let outcome = match self.copy_file(&self.full_path(key), local_path).await {
            Err(StorageError::NotFound { .. }) => Err(StorageError::NotFound {
                path: key.to_string(),
            }),
            other => other,
        };
        notify_sync_outcome(options, started, &outcome);
        outcome.map(|_| ())
    }

    async fn download_folder(
        &self,
        key: &str,
        local_path: &Path,
        _prefer_async: bool,
    ) -> StorageResult<()> {
        let folder_path = self.full_path(key);
        for (absolute, relative) in walk_local_files(&folder_path).await? {
            self.copy_file(&absolute, &local_path.join(&relative))
                .await?;
        }
        Ok(())
    }

    /// Serve a public URL when a domain fronts the storage root; there is no
    /// signing, so the expiry is not enforced.
    async fn generate_presigned_url(
        &self,
        key: &str,
        _expires_in: Duration,
    ) -> StorageResult<String> {
        if self.options.domain_name.is_empty() {
            return Err(StorageError::UnsupportedOperation(
                "generate_presigned_url (local, no domain_name configured)".to_string(),
            ));
        }
        let url = url::Url::parse(&format!(
            "{}/{}",
            self.options.domain_name.trim_end_matches('/'),
            key.trim_start_matches('/')
        ))?;
        Ok(url.to_string())
    }

    async fn head_object(&self, key: &str) -> StorageResult<Option<ObjectMetadata>> {
        match tokio::fs::metadata(self.full_path(key)).await {
            Ok(meta) => Ok(Some(ObjectMetadata {
                size: meta.len(),
                last_modified: meta.modified().ok().map(DateTime::<Utc>::from),
                etag: None,
                content_type: None,
            })),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn test_adapter() -> (TempDir, LocalAdapter) {
        let temp_dir = TempDir::new().unwrap();
        let config = StorageConfig::local()
            .with_option("local_path", temp_dir.path().to_string_lossy());
        let adapter = LocalAdapter::new(&config).unwrap();
        (temp_dir, adapter)
    }

    #[test]
    fn test_new_requires_local_path() {
        let err = LocalAdapter::new(&StorageConfig::local()).unwrap_err();
        match err {
            StorageError::ConfigError(msg) => assert!(msg.contains("local_path")),
            other => panic!("Expected ConfigError, got {:?}", other),
        }
    }

    #[test]
    fn test_new_creates_root() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("nested/storage");
        let config = StorageConfig::local().with_option("local_path", root.to_string_lossy());
        let adapter = LocalAdapter::new(&config).unwrap();

        assert!(root.is_dir());
        assert_eq!(adapter.storage_type(), StorageType::Local);
        assert!(format!("{:?}", adapter).contains("LocalAdapter"));
    }

    #[tokio::test]
    async fn test_put_get_delete_round_trip() {
        let (_tmp, adapter) = test_adapter();
        let obj = json!({"id": 42, "tags": ["a", "b"]});

        adapter.put_object(&obj, "data/object.json").await.unwrap();
        assert!(adapter.path_exists("data/object.json").await.unwrap());

        let bytes = adapter.get_object("data/object.json").await.unwrap();
        assert_eq!(bytes, serde_json::to_vec(&obj).unwrap());

        adapter.delete_object("data/object.json").await.unwrap();
        assert!(!adapter.path_exists("data/object.json").await.unwrap());
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let (_tmp, adapter) = test_adapter();
        let err = adapter.get_object("missing.json").await.unwrap_err();
        assert!(err.is_not_found());

        let err = adapter.delete_object("missing.json").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_list_files_recursive_with_filter() {
        let (_tmp, adapter) = test_adapter();
        let obj = json!([]);
        adapter.put_object(&obj, "exports/a.csv").await.unwrap();
        adapter.put_object(&obj, "exports/sub/b.csv").await.unwrap();
        adapter.put_object(&obj, "exports/_SUCCESS").await.unwrap();
        adapter.put_object(&obj, "exports/meta.json").await.unwrap();
        adapter.put_object(&obj, "other/c.csv").await.unwrap();

        let mut all = adapter.list_files("exports", false).await.unwrap();
        all.sort();
        assert_eq!(
            all,
            vec![
                "exports/_SUCCESS",
                "exports/a.csv",
                "exports/meta.json",
                "exports/sub/b.csv"
            ]
        );

        let mut csv_only = adapter.list_files("exports", true).await.unwrap();
        csv_only.sort();
        assert_eq!(csv_only, vec!["exports/a.csv", "exports/sub/b.csv"]);

        // A missing folder lists as empty, matching prefix semantics.
        assert!(adapter.list_files("absent", false).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upload_file_fires_success_callback_inline() {
        let (_tmp, adapter) = test_adapter();
        let source_dir = TempDir::new().unwrap();
        let source = source_dir.path().join("in.bin");
        fs::write(&source, b"payload!").unwrap();

        let reported = Arc::new(AtomicU64::new(0));
        let reported_clone = reported.clone();
        let options = TransferOptions::asynchronous()
            .on_success(move |size, _secs| reported_clone.store(size, Ordering::SeqCst))
            .on_failure(|msg| panic!("unexpected failure: {}", msg));

        adapter.upload_file(&source, "in/in.bin", options).await.unwrap();

        // Local transfers are synchronous, so the callback has already run.
        assert_eq!(reported.load(Ordering::SeqCst), 8);
        // The source survives a synchronous upload.
        assert!(source.exists());
        assert!(adapter.path_exists("in/in.bin").await.unwrap());
    }

    #[tokio::test]
    async fn test_download_missing_fires_failure_callback() {
        let (_tmp, adapter) = test_adapter();
        let target_dir = TempDir::new().unwrap();

        let failed = Arc::new(AtomicU64::new(0));
        let failed_clone = failed.clone();
        let options = TransferOptions::sync()
            .on_failure(move |_msg| failed_clone.store(1, Ordering::SeqCst));

        let err = adapter
            .download_file("missing.bin", &target_dir.path().join("out.bin"), options)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(failed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_folder_round_trip_preserves_relative_paths() {
        let (_tmp, adapter) = test_adapter();
        let source_dir = TempDir::new().unwrap();
        fs::create_dir_all(source_dir.path().join("sub")).unwrap();
        fs::write(source_dir.path().join("a.txt"), "a").unwrap();
        fs::write(source_dir.path().join("sub/b.txt"), "b").unwrap();

        adapter
            .upload_folder(source_dir.path(), "archive", false)
            .await
            .unwrap();
        assert!(adapter.path_exists("archive/a.txt").await.unwrap());
        assert!(adapter.path_exists("archive/sub/b.txt").await.unwrap());

        let target_dir = TempDir::new().unwrap();
        adapter
            .download_folder("archive", target_dir.path(), false)
            .await
            .unwrap();
        assert_eq!(fs::read(target_dir.path().join("a.txt")).unwrap(), b"a");
        assert_eq!(fs::read(target_dir.path().join("sub/b.txt")).unwrap(), b"b");
    }

    #[tokio::test]
    async fn test_presigned_url_requires_domain() {
        let (_tmp, adapter) = test_adapter();
        let err = adapter
            .generate_presigned_url("k.csv", Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::UnsupportedOperation(_)));

        let temp_dir = TempDir::new().unwrap();
        let config = StorageConfig::local()
            .with_option("local_path", temp_dir.path().to_string_lossy())
            .with_option("domain_name", "https://cdn.example.com/");
        let adapter = LocalAdapter::new(&config).unwrap();
        let url = adapter
            .generate_presigned_url("/reports/k.csv", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(url, "https://cdn.example.com/reports/k.csv");
    }

    #[tokio::test]
    async fn test_head_object_and_last_modified() {
        let (_tmp, adapter) = test_adapter();
        assert_eq!(adapter.head_object("none").await.unwrap(), None);
        assert!(adapter.get_last_modified("none").await.unwrap_err().is_not_found());

        adapter.put_object(&json!({"k": 1}), "meta.json").await.unwrap();
        let meta = adapter.head_object("meta.json").await.unwrap().unwrap();
        assert_eq!(meta.size, serde_json::to_vec(&json!({"k": 1})).unwrap().len() as u64);
        assert!(meta.last_modified.is_some());

        let modified = adapter.get_last_modified("meta.json").await.unwrap();
        assert!(modified <= Utc::now() + chrono::Duration::seconds(5));
    }
}
