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

//! Storage backends behind one adapter contract.
//!
//! [`FileStorage::connect`] builds the adapter a [`StorageConfig`] selects;
//! application code holds named storages in a [`StorageRegistry`] and talks
//! to them through the [`ObjectStorage`] trait.

pub mod adapter;
pub mod config;
pub mod error;
pub mod facade;
pub mod gcs;
pub mod local;
mod prefix;
pub mod s3;
pub mod sftp;

pub use adapter::{
    FailureCallback, ObjectMetadata, ObjectStorage, SuccessCallback, TransferOptions,
};
pub use config::{StorageConfig, StorageOptions, StorageType};
pub use error::{StorageError, StorageResult};
pub use facade::{FileStorage, StorageRegistry};
pub use gcs::GcsAdapter;
pub use local::LocalAdapter;
pub use s3::S3Adapter;
pub use sftp::SftpAdapter;
