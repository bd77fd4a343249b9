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

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use object_store::path::Path as ObjectPath;
use serde_json::Value;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::path::Path;
use std::time::Duration;

use super::config::{StorageOptions, StorageType};
use super::error::{StorageError, StorageResult};

/// Metadata about one remote object
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectMetadata {
    /// Object size in bytes
    pub size: u64,

    /// Last modified timestamp (if the backend reports one)
    pub last_modified: Option<DateTime<Utc>>,

    /// Entity tag (if the backend reports one)
    pub etag: Option<String>,

    /// Content type (if the backend reports one)
    pub content_type: Option<String>,
}

/// Success callback for a transfer: `(byte_size, duration_seconds)`.
pub type SuccessCallback = Box<dyn FnOnce(u64, f64) + Send + 'static>;

/// Failure callback for a transfer: `(error_message)`.
pub type FailureCallback = Box<dyn FnOnce(String) + Send + 'static>;

/// How a single file transfer should run.
///
/// `prefer_async` asks the adapter to schedule the transfer on its
/// background engine and return immediately; backends without an engine
/// (local filesystem, SFTP) run synchronously regardless and invoke the
/// callbacks inline. Each callback fires at most once.
pub struct TransferOptions {
    pub prefer_async: bool,
    pub on_success: Option<SuccessCallback>,
    pub on_failure: Option<FailureCallback>,
}

impl TransferOptions {
    /// Block until the transfer completes or fails.
    pub fn sync() -> Self {
        Self {
            prefer_async: false,
            on_success: None,
            on_failure: None,
        }
    }

    /// Return after scheduling; completion is reported through callbacks.
    pub fn asynchronous() -> Self {
        Self {
            prefer_async: true,
            on_success: None,
            on_failure: None,
        }
    }

    pub fn on_success(mut self, callback: impl FnOnce(u64, f64) + Send + 'static) -> Self {
        self.on_success = Some(Box::new(callback));
        self
    }

    pub fn on_failure(mut self, callback: impl FnOnce(String) + Send + 'static) -> Self {
        self.on_failure = Some(Box::new(callback));
        self
    }
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self::sync()
    }
}

impl Debug for TransferOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("TransferOptions")
            .field("prefer_async", &self.prefer_async)
            .field("on_success", &self.on_success.is_some())
            .field("on_failure", &self.on_failure.is_some())
            .finish()
    }
}

/// Common contract implemented by every storage backend.
///
/// Adapters hide the structural differences between prefix-addressed object
/// stores (S3, GCS) and real filesystems (local, SFTP) behind one operation
/// set. Each adapter owns exactly one underlying client handle, created at
/// construction and immutable afterwards.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Which backend this adapter talks to.
    fn storage_type(&self) -> StorageType;

    /// The shared per-storage options this adapter was built with.
    fn storage_options(&self) -> &StorageOptions;

    /// True iff at least one object matches `path` as a prefix (S3/GCS) or
    /// the path exists on the filesystem (local/SFTP). No side effects.
    async fn path_exists(&self, path: &str) -> StorageResult<bool>;

    /// Recursively list object keys under `folder`, in the order the
    /// backend's native listing produces them.
    ///
    /// With `filter_csv` set, only keys ending in `.csv` are returned and
    /// any key containing the `_SUCCESS` marker is dropped.
    async fn list_files(&self, folder: &str, filter_csv: bool) -> StorageResult<Vec<String>>;

    /// Same listing with `{scheme}://{bucket}/{key}` prefixes, for callers
    /// that hand paths to external engines.
    async fn list_files_with_path(
        &self,
        folder: &str,
        scheme: &str,
        filter_csv: bool,
    ) -> StorageResult<Vec<String>> {
        let bucket = self.storage_options().bucket_name.clone();
        let files = self.list_files(folder, filter_csv).await?;
        Ok(files
            .into_iter()
            .map(|f| format!("{}://{}/{}", scheme, bucket, f))
            .collect())
    }

    /// Fetch the full content of one object. Fails with
    /// [`StorageError::NotFound`] when the key is absent.
    async fn get_object(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Serialize `obj` as UTF-8 JSON and write it to `key` with content type
    /// `application/json`, overwriting unconditionally.
    async fn put_object(&self, obj: &Value, key: &str) -> StorageResult<()>;

    /// Delete a single object.
    ///
    /// Developer use only: not wired into normal application code paths, and
    /// errors (including not-found where the backend reports it) propagate.
    async fn delete_object(&self, key: &str) -> StorageResult<()>;

    /// Upload one local file to `key`.
    ///
    /// With `options.prefer_async` on a backend that has a transfer engine,
    /// this returns immediately after scheduling; the local source file is
    /// deleted after a successful asynchronous upload.
    async fn upload_file(
        &self,
        local_path: &Path,
        key: &str,
        options: TransferOptions,
    ) -> StorageResult<()>;

    /// Recursively upload a local directory, preserving relative paths, one
    /// `upload_file` per leaf in walk order.
    async fn upload_folder(
        &self,
        local_path: &Path,
        key: &str,
        prefer_async: bool,
    ) -> StorageResult<()>;

    /// Download one object to a local path, creating parent directories as
    /// needed.
    async fn download_file(
        &self,
        key: &str,
        local_path: &Path,
        options: TransferOptions,
    ) -> StorageResult<()>;

    /// Recursively download everything under `key` into `local_path`.
    async fn download_folder(
        &self,
        key: &str,
        local_path: &Path,
        prefer_async: bool,
    ) -> StorageResult<()>;

    /// Generate a time-limited URL granting direct access to one object.
    ///
    /// Only meaningful for the S3 and GCS backends; the local backend serves
    /// a `{domain_name}/{key}` URL when a domain is configured, and SFTP
    /// always reports [`StorageError::UnsupportedOperation`].
    async fn generate_presigned_url(
        &self,
        _key: &str,
        _expires_in: Duration,
    ) -> StorageResult<String> {
        Err(StorageError::UnsupportedOperation(format!(
            "generate_presigned_url ({})",
            self.storage_type().as_str()
        )))
    }

    /// Fetch object metadata. Returns `Ok(None)` when the object does not
    /// exist; a 404 on metadata lookup is never an error.
    async fn head_object(&self, key: &str) -> StorageResult<Option<ObjectMetadata>>;

    /// Last-modified timestamp of one object; [`StorageError::NotFound`]
    /// when absent or when the backend reports no timestamp.
    async fn get_last_modified(&self, key: &str) -> StorageResult<DateTime<Utc>> {
        let meta = self
            .head_object(key)
            .await?
            .ok_or_else(|| StorageError::NotFound {
                path: key.to_string(),
            })?;
        meta.last_modified.ok_or_else(|| StorageError::NotFound {
            path: key.to_string(),
        })
    }
}

impl Debug for dyn ObjectStorage {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "ObjectStorage(type={}, bucket={})",
            self.storage_type().as_str(),
            self.storage_options().bucket_name
        )
    }
}

/// Helper function to create an ObjectPath from a string
pub(crate) fn string_to_path(s: &str) -> ObjectPath {
    ObjectPath::from(s)
}

/// Report a transfer that ran to completion on the caller's task through
/// the optional callbacks. Consumes the options so each callback can fire
/// at most once.
pub(crate) fn notify_sync_outcome(
    options: TransferOptions,
    started: std::time::Instant,
    outcome: &StorageResult<u64>,
) {
    match outcome {
        Ok(size) => {
            if let Some(callback) = options.on_success {
                callback(*size, started.elapsed().as_secs_f64());
            }
        }
        Err(e) => {
            if let Some(callback) = options.on_failure {
                callback(e.to_string());
            }
        }
    }
}

/// Apply the CSV listing filter shared by every backend.
pub(crate) fn apply_csv_filter(files: Vec<String>, filter_csv: bool) -> Vec<String> {
    if filter_csv {
        files
            .into_iter()
            .filter(|f| !f.contains("_SUCCESS") && f.ends_with(".csv"))
            .collect()
    } else {
        files
    }
}
