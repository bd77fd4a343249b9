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

use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Object not found: {path}")]
    NotFound { path: String },

    #[error("Operation not supported by this backend: {0}")]
    UnsupportedOperation(String),

    #[error("Failed to get file lock {key}")]
    LockTimeout { key: String },

    #[error("Exceeded maximum retry attempts: {0}")]
    RetryExhausted(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Object store error: {0}")]
    ObjectStoreError(object_store::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("SFTP error: {0}")]
    SftpError(#[from] ssh2::Error),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),
}

impl From<object_store::Error> for StorageError {
    /// Normalize `object_store` not-found errors so every backend reports
    /// absence the same way.
    fn from(err: object_store::Error) -> Self {
        match err {
            object_store::Error::NotFound { path, .. } => StorageError::NotFound { path },
            other => StorageError::ObjectStoreError(other),
        }
    }
}

impl StorageError {
    /// True when the error means the object simply does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
