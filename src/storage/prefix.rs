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

//! Shared machinery for prefix-addressed object stores (S3, GCS).
//!
//! These backends have no real directories: "folders" are key prefixes, and
//! recursive listing walks delimiter pages, merging direct object keys with
//! the contents of every common prefix a page reports.

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::stream::StreamExt;
use object_store::path::Path as ObjectPath;
use object_store::{
    Attribute, Attributes, ClientOptions, GetOptions, ObjectStore, PutOptions, RetryConfig,
};
use serde_json::Value;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::adapter::{string_to_path, ObjectMetadata};
use super::config::StorageConfig;
use super::error::{StorageError, StorageResult};

/// Generic operations over one `object_store` backend.
#[derive(Clone)]
pub(crate) struct PrefixStore {
    store: Arc<dyn ObjectStore>,
}

impl PrefixStore {
    pub(crate) fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    fn prefix_path(prefix: &str) -> Option<ObjectPath> {
        if prefix.is_empty() {
            None
        } else {
            Some(string_to_path(prefix))
        }
    }

    /// Recursively list keys under `prefix`.
    ///
    /// A delimiter page can yield both direct object keys and sub-prefixes
    /// that need further calls; an explicit stack walks them depth-first in
    /// page order without recursion, so deeply nested buckets cannot
    /// exhaust the call stack.
    pub(crate) async fn list_keys(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut pending: Vec<Option<ObjectPath>> = vec![Self::prefix_path(prefix)];

        while let Some(current) = pending.pop() {
            let page = self.store.list_with_delimiter(current.as_ref()).await?;
            for meta in page.objects {
                keys.push(meta.location.to_string());
            }
            // Reversed so the first sub-prefix of a page is visited first.
            for sub_prefix in page.common_prefixes.into_iter().rev() {
                pending.push(Some(sub_prefix));
            }
        }

        Ok(keys)
    }

    /// True iff at least one object exists under `prefix`.
    pub(crate) async fn prefix_exists(&self, prefix: &str) -> StorageResult<bool> {
        let path = Self::prefix_path(prefix);
        let mut stream = self.store.list(path.as_ref());
        Ok(stream.next().await.transpose()?.is_some())
    }

    pub(crate) async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        let result = self.store.get(&string_to_path(key)).await?;
        let bytes: Bytes = result.bytes().await?;
        Ok(bytes.to_vec())
    }

    pub(crate) async fn put_json(&self, obj: &Value, key: &str) -> StorageResult<()> {
        let body = serde_json::to_vec(obj)?;
        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, "application/json".into());
        self.store
            .put_opts(
                &string_to_path(key),
                body.into(),
                PutOptions {
                    attributes,
                    ..Default::default()
                },
            )
            .await?;
        Ok(())
    }

    pub(crate) async fn delete(&self, key: &str) -> StorageResult<()> {
        self.store.delete(&string_to_path(key)).await?;
        Ok(())
    }

    /// Head semantics shared by S3 and GCS: a 404 is "no metadata", not an
    /// error.
    pub(crate) async fn head(&self, key: &str) -> StorageResult<Option<ObjectMetadata>> {
        let get_options = GetOptions {
            head: true,
            ..Default::default()
        };
        match self.store.get_opts(&string_to_path(key), get_options).await {
            Ok(result) => {
                let content_type = result
                    .attributes
                    .get(&Attribute::ContentType)
                    .map(|value| value.to_string());
                Ok(Some(ObjectMetadata {
                    size: result.meta.size,
                    last_modified: Some(result.meta.last_modified),
                    etag: result.meta.e_tag.clone(),
                    content_type,
                }))
            }
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Blocking upload of one local file.
    pub(crate) async fn upload(&self, local_path: &Path, key: &str) -> StorageResult<u64> {
        let bytes = tokio::fs::read(local_path).await?;
        let size = bytes.len() as u64;
        self.store.put(&string_to_path(key), bytes.into()).await?;
        Ok(size)
    }

    /// Blocking download of one object to a local file, creating parent
    /// directories as needed.
    pub(crate) async fn download(&self, key: &str, local_path: &Path) -> StorageResult<u64> {
        let result = self.store.get(&string_to_path(key)).await?;
        let bytes: Bytes = result.bytes().await?;
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(local_path, &bytes).await?;
        Ok(bytes.len() as u64)
    }

    /// Owned upload future for the transfer engine.
    pub(crate) fn upload_io(
        &self,
        local_path: PathBuf,
        key: String,
    ) -> BoxFuture<'static, StorageResult<u64>> {
        let this = self.clone();
        Box::pin(async move { this.upload(&local_path, &key).await })
    }

    /// Owned download future for the transfer engine.
    pub(crate) fn download_io(
        &self,
        key: String,
        local_path: PathBuf,
    ) -> BoxFuture<'static, StorageResult<u64>> {
        let this = self.clone();
        Box::pin(async move { this.download(&key, &local_path).await })
    }
}

/// Join a remote prefix and a relative local path into one object key.
pub(crate) fn join_key(prefix: &str, relative: &Path) -> String {
    let relative = relative.to_string_lossy().replace('\\', "/");
    if prefix.is_empty() {
        relative
    } else {
        format!("{}/{}", prefix.trim_end_matches('/'), relative)
    }
}

/// Walk a local directory, collecting `(absolute, relative)` file paths in
/// traversal order.
pub(crate) async fn walk_local_files(root: &Path) -> StorageResult<Vec<(PathBuf, PathBuf)>> {
    if !root.exists() {
        return Err(StorageError::NotFound {
            path: root.to_string_lossy().to_string(),
        });
    }

    let mut files = Vec::new();
    let mut pending = VecDeque::from([root.to_path_buf()]);

    while let Some(dir) = pending.pop_front() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                pending.push_back(path);
            } else {
                let relative = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
                files.push((path, relative));
            }
        }
    }

    Ok(files)
}

/// Build HTTP client options from the configuration bag.
pub(crate) fn build_client_options(config: &StorageConfig) -> ClientOptions {
    let mut client_options = ClientOptions::default();
    if let Some(timeout) = config.get_option("timeout") {
        if timeout == "0" || timeout == "disabled" {
            client_options = client_options.with_timeout_disabled();
        } else if let Ok(secs) = timeout.parse::<u64>() {
            client_options = client_options.with_timeout(Duration::from_secs(secs));
        }
    }
    if let Some(connect_timeout) = config.get_option("connect_timeout") {
        if connect_timeout == "0" || connect_timeout == "disabled" {
            client_options = client_options.with_connect_timeout_disabled();
        } else if let Ok(secs) = connect_timeout.parse::<u64>() {
            client_options = client_options.with_connect_timeout(Duration::from_secs(secs));
        }
    }
    client_options
}

/// Build transport-level retry options from the configuration bag.
pub(crate) fn build_retry_options(config: &StorageConfig) -> RetryConfig {
    let defaults = RetryConfig::default();
    let max_retries = config
        .get_option("max_retries")
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(defaults.max_retries);
    let retry_timeout = config
        .get_option("retry_timeout")
        .and_then(|s| Some(Duration::from_secs(s.parse::<u64>().ok()?)))
        .unwrap_or(defaults.retry_timeout);
    RetryConfig {
        backoff: Default::default(),
        max_retries,
        retry_timeout,
    }
}
