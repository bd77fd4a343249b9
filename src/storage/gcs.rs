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

//! Google Cloud Storage backend.

use async_trait::async_trait;
use http::Method;
use object_store::gcp::{GoogleCloudStorage, GoogleCloudStorageBuilder};
use object_store::signer::Signer;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::adapter::{
    apply_csv_filter, notify_sync_outcome, string_to_path, ObjectMetadata, ObjectStorage,
    TransferOptions,
};
use super::config::{StorageConfig, StorageOptions, StorageType};
use super::error::{StorageError, StorageResult};
use super::prefix::{
    build_client_options, build_retry_options, join_key, walk_local_files, PrefixStore,
};
use crate::transfer::{TransferEngine, TransferTask};

/// Storage adapter backed by one GCS bucket.
pub struct GcsAdapter {
    options: StorageOptions,
    client: Arc<GoogleCloudStorage>,
    store: PrefixStore,
    transfer: TransferEngine,
}

impl GcsAdapter {
    /// Build the adapter from configuration. Application-default credentials
    /// from the environment apply first; explicit options override them.
    ///
    /// A missing bucket name is a fatal configuration error.
    pub fn new(config: &StorageConfig) -> StorageResult<Self> {
        let options = config.storage_options();
        if options.bucket_name.is_empty() {
            return Err(StorageError::ConfigError(
                "GCS storage requires the 'bucket_name' option".to_string(),
            ));
        }

        let mut builder = GoogleCloudStorageBuilder::from_env()
            .with_bucket_name(&options.bucket_name)
            .with_client_options(build_client_options(config))
            .with_retry(build_retry_options(config));

        for (key, value) in &config.options {
            if value.is_empty() {
                continue;
            }
            match key.as_str() {
                "service_account_key_path" => builder = builder.with_service_account_path(value),
                "service_account_key" => builder = builder.with_service_account_key(value),
                "bucket_name" | "base_path" | "local_path" | "domain_name" | "timeout"
                | "connect_timeout" | "max_retries" | "retry_timeout" => {}
                other => warn!("Ignoring unknown GCS option: {}", other),
            }
        }

        let client = Arc::new(builder.build()?);
        debug!("Created GCS storage for bucket: {}", options.bucket_name);

        Ok(Self {
            options,
            store: PrefixStore::new(client.clone()),
            client,
            transfer: TransferEngine::new(),
        })
    }

    /// Drain in-flight transfers and stop the completion reaper.
    pub async fn shutdown(&self) {
        self.transfer.shutdown().await;
    }
}

impl std::fmt::Debug for GcsAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcsAdapter")
            .field("bucket", &self.options.bucket_name)
            .finish()
    }
}

#[async_trait]
impl ObjectStorage for GcsAdapter {
    fn storage_type(&self) -> StorageType {
        StorageType::Gcs
    }

    fn storage_options(&self) -> &StorageOptions {
        &self.options
    }

    async fn path_exists(&self, path: &str) -> StorageResult<bool> {
        self.store.prefix_exists(path).await
    }

    async fn list_files(&self, folder: &str, filter_csv: bool) -> StorageResult<Vec<String>> {
        let keys = self.store.list_keys(folder).await?;
        Ok(apply_csv_filter(keys, filter_csv))
    }

    async fn get_object(&self, key: &str) -> StorageResult<Vec<u8>> {
        self.store.get(key).await
    }

    async fn put_object(&self, obj: &Value, key: &str) -> StorageResult<()> {
        self.store.put_json(obj, key).await
    }

    async fn delete_object(&self, key: &str) -> StorageResult<()> {
        self.store.delete(key).await
    }

    async fn upload_file(
        &self,
        local_path: &Path,
        key: &str,
        options: TransferOptions,
    ) -> StorageResult<()> {
        if options.prefer_async {
            let task = TransferTask::upload(local_path.to_string_lossy(), key)
                .with_callbacks(options);
            let io = self.store.upload_io(local_path.to_path_buf(), key.to_string());
            self.transfer.submit(task, io);
            return Ok(());
        }

        let started = Instant::now();
        let outcome = self.store.upload(local_path, key).await;
        notify_sync_outcome(options, started, &outcome);
        outcome.map(|_| ())
    }

    async fn upload_folder(
        &self,
        local_path: &Path,
        key: &str,
        prefer_async: bool,
    ) -> StorageResult<()> {
        for (absolute, relative) in walk_local_files(local_path).await? {
            let object_key = join_key(key, &relative);
            let options = if prefer_async {
                TransferOptions::asynchronous()
            } else {
                TransferOptions::sync()
            };
            self.upload_file(&absolute, &object_key, options).await?;
        }
        Ok(())
    }

    async fn download_file(
        &self,
        key: &str,
        local_path: &Path,
        options: TransferOptions,
    ) -> StorageResult<()> {
        if options.prefer_async {
            let task = TransferTask::download(key, local_path.to_string_lossy())
                .with_callbacks(options);
            let io = self.store.download_io(key.to_string(), local_path.to_path_buf());
            self.transfer.submit(task, io);
            return Ok(());
        }

        let started = Instant::now();
        let outcome = self.store.download(key, local_path).await;
        notify_sync_outcome(options, started, &outcome);
        outcome.map(|_| ())
    }

    async fn download_folder(
        &self,
        key: &str,
        local_path: &Path,
        prefer_async: bool,
    ) -> StorageResult<()> {
        let prefix = key.trim_end_matches('/');
        for object_key in self.store.list_keys(key).await? {
            let relative = object_key
                .strip_prefix(prefix)
                .unwrap_or(object_key.as_str())
                .trim_start_matches('/')
                .to_string();
            let target = local_path.join(&relative);
            let options = if prefer_async {
                TransferOptions::asynchronous()
            } else {
                TransferOptions::sync()
            };
            self.download_file(&object_key, &target, options).await?;
        }
        Ok(())
    }

    async fn generate_presigned_url(
        &self,
        key: &str,
        expires_in: Duration,
    ) -> StorageResult<String> {
        let url = self
            .client
            .signed_url(Method::GET, &string_to_path(key), expires_in)
            .await?;
        Ok(url.to_string())
    }

    async fn head_object(&self, key: &str) -> StorageResult<Option<ObjectMetadata>> {
        self.store.head(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_requires_bucket_name() {
        let err = GcsAdapter::new(&StorageConfig::gcs()).unwrap_err();
        match err {
            StorageError::ConfigError(msg) => assert!(msg.contains("bucket_name")),
            other => panic!("Expected ConfigError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_new_rejects_garbage_service_account_key() {
        let config = StorageConfig::gcs()
            .with_option("bucket_name", "test-bucket")
            .with_option("service_account_key", "not-a-key");
        assert!(GcsAdapter::new(&config).is_err());
    }
}
