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

//! Uniform file storage over S3-compatible stores, Google Cloud Storage,
//! the local filesystem, and SFTP.
//!
//! The crate is organized around a small set of pieces:
//!
//! - [`storage`] — the [`ObjectStorage`] adapter contract, the four backend
//!   implementations, and the [`FileStorage`] facade with its
//!   [`StorageRegistry`] of named instances.
//! - [`transfer`] — the background engine S3 and GCS use for asynchronous
//!   uploads and downloads with completion callbacks.
//! - [`lock`] — a cooperative database-backed lock serializing writers of
//!   shared remote keys.
//! - [`tagging`] — partitioned bulk JSON writes for tagging runs.
//!
//! # Example
//!
//! ```no_run
//! use filestore::{FileStorage, StorageConfig};
//! use serde_json::json;
//!
//! # async fn run() -> filestore::StorageResult<()> {
//! let config = StorageConfig::s3()
//!     .with_option("bucket_name", "datahub")
//!     .with_option("region", "us-east-1");
//! let storage = FileStorage::connect("datahub", &config).await?;
//!
//! storage.put_object(&json!({"rows": 3}), "reports/summary.json").await?;
//! let reports = storage.list_files("reports", false).await?;
//! # let _ = reports;
//! # Ok(())
//! # }
//! ```

pub mod lock;
pub mod storage;
pub mod tagging;
pub mod transfer;
pub mod util;

pub use lock::FileLockRegistry;
pub use storage::{
    FileStorage, ObjectMetadata, ObjectStorage, StorageConfig, StorageError, StorageOptions,
    StorageRegistry, StorageResult, StorageType, TransferOptions,
};
pub use tagging::TaggingMembers;
pub use transfer::{TransferEngine, TransferTask};
