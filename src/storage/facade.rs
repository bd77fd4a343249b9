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

//! Named storage facade and the registry application code resolves
//! storages through. Backend selection is an explicit match on
//! [`StorageType`]; adding a backend means adding an arm here.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::info;

use super::adapter::{ObjectMetadata, ObjectStorage, TransferOptions};
use super::config::{StorageConfig, StorageOptions, StorageType};
use super::error::{StorageError, StorageResult};
use super::gcs::GcsAdapter;
use super::local::LocalAdapter;
use super::s3::S3Adapter;
use super::sftp::SftpAdapter;

/// One named storage instance bound to a backend adapter.
///
/// The facade forwards every operation unchanged; its value is the stable
/// name and the single construction point for adapters.
pub struct FileStorage {
    name: String,
    adapter: Arc<dyn ObjectStorage>,
}

impl FileStorage {
    /// Build the adapter selected by the configuration and bind it to
    /// `name`.
    pub async fn connect(name: impl Into<String>, config: &StorageConfig) -> StorageResult<Self> {
        let name = name.into();
        let adapter: Arc<dyn ObjectStorage> = match config.storage_type {
            StorageType::S3 => Arc::new(S3Adapter::new(config)?),
            StorageType::Gcs => Arc::new(GcsAdapter::new(config)?),
            StorageType::Local => Arc::new(LocalAdapter::new(config)?),
            StorageType::Sftp => Arc::new(SftpAdapter::new(config).await?),
        };
        info!(
            "Connected storage '{}' ({})",
            name,
            config.storage_type.as_str()
        );
        Ok(Self { name, adapter })
    }

    /// Resolve the configuration for `name` from the environment and
    /// connect.
    pub async fn from_env(name: &str) -> StorageResult<Self> {
        let config = StorageConfig::from_env(name)?;
        Self::connect(name, &config).await
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn storage_type(&self) -> StorageType {
        self.adapter.storage_type()
    }

    pub fn storage_options(&self) -> &StorageOptions {
        self.adapter.storage_options()
    }

    /// The underlying adapter, for callers that pass it on (tagging, lock
    /// helpers).
    pub fn adapter(&self) -> Arc<dyn ObjectStorage> {
        self.adapter.clone()
    }

    pub async fn path_exists(&self, path: &str) -> StorageResult<bool> {
        self.adapter.path_exists(path).await
    }

    pub async fn list_files(&self, folder: &str, filter_csv: bool) -> StorageResult<Vec<String>> {
        self.adapter.list_files(folder, filter_csv).await
    }

    pub async fn list_files_with_path(
        &self,
        folder: &str,
        scheme: &str,
        filter_csv: bool,
    ) -> StorageResult<Vec<String>> {
        self.adapter
            .list_files_with_path(folder, scheme, filter_csv)
            .await
    }

    pub async fn get_object(&self, key: &str) -> StorageResult<Vec<u8>> {
        self.adapter.get_object(key).await
    }

    pub async fn put_object(&self, obj: &Value, key: &str) -> StorageResult<()> {
        self.adapter.put_object(obj, key).await
    }

    pub async fn delete_object(&self, key: &str) -> StorageResult<()> {
        self.adapter.delete_object(key).await
    }

    pub async fn upload_file(
        &self,
        local_path: &Path,
        key: &str,
        options: TransferOptions,
    ) -> StorageResult<()> {
        self.adapter.upload_file(local_path, key, options).await
    }

    pub async fn upload_folder(
        &self,
        local_path: &Path,
        key: &str,
        prefer_async: bool,
    ) -> StorageResult<()> {
        self.adapter
            .upload_folder(local_path, key, prefer_async)
            .await
    }

    pub async fn download_file(
        &self,
        key: &str,
        local_path: &Path,
        options: TransferOptions,
    ) -> StorageResult<()> {
        self.adapter.download_file(key, local_path, options).await
    }

    pub async fn download_folder(
        &self,
        key: &str,
        local_path: &Path,
        prefer_async: bool,
    ) -> StorageResult<()> {
        self.adapter
            .download_folder(key, local_path, prefer_async)
            .await
    }

    pub async fn generate_presigned_url(
        &self,
        key: &str,
        expires_in: Duration,
    ) -> StorageResult<String> {
        self.adapter.generate_presigned_url(key, expires_in).await
    }

    pub async fn head_object(&self, key: &str) -> StorageResult<Option<ObjectMetadata>> {
        self.adapter.head_object(key).await
    }

    pub async fn get_last_modified(&self, key: &str) -> StorageResult<DateTime<Utc>> {
        self.adapter.get_last_modified(key).await
    }
}

impl std::fmt::Debug for FileStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStorage")
            .field("name", &self.name)
            .field("type", &self.storage_type().as_str())
            .finish()
    }
}

/// Name-to-storage registry, passed to the components that need it rather
/// than held in module state.
#[derive(Default)]
pub struct StorageRegistry {
    storages: RwLock<HashMap<String, Arc<FileStorage>>>,
}

impl StorageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connected storage under its name. Registering the same
    /// name twice is a configuration error.
    pub fn register(&self, storage: FileStorage) -> StorageResult<Arc<FileStorage>> {
        let mut storages = self
            .storages
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if storages.contains_key(storage.name()) {
            return Err(StorageError::ConfigError(format!(
                "Storage '{}' is already registered",
                storage.name()
            )));
        }
        let storage = Arc::new(storage);
        storages.insert(storage.name().to_string(), storage.clone());
        Ok(storage)
    }

    /// Look up a storage by name.
    pub fn get(&self, name: &str) -> StorageResult<Arc<FileStorage>> {
        self.storages
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(name)
            .cloned()
            .ok_or_else(|| {
                StorageError::ConfigError(format!("Unknown storage instance: '{}'", name))
            })
    }

    /// Names of every registered storage, unordered.
    pub fn names(&self) -> Vec<String> {
        self.storages
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .keys()
            .cloned()
            .collect()
    }
}
