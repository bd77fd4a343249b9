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

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;

use super::error::{StorageError, StorageResult};

/// Storage backend type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    /// S3-compatible object storage
    S3,
    /// Google Cloud Storage blobs
    Gcs,
    /// Local filesystem storage
    Local,
    /// SFTP remote filesystem
    Sftp,
}

impl StorageType {
    /// Parse a backend name from configuration.
    ///
    /// Unknown names are a fatal configuration error, resolved once at
    /// startup rather than retried.
    pub fn parse(name: &str) -> StorageResult<Self> {
        match name.to_lowercase().as_str() {
            "s3" | "aws" => Ok(StorageType::S3),
            "gcs" | "gcp" => Ok(StorageType::Gcs),
            "local" => Ok(StorageType::Local),
            "sftp" => Ok(StorageType::Sftp),
            other => Err(StorageError::ConfigError(format!(
                "Unknown storage backend: {}",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StorageType::S3 => "s3",
            StorageType::Gcs => "gcs",
            StorageType::Local => "local",
            StorageType::Sftp => "sftp",
        }
    }
}

/// Per-storage options shared by every adapter.
///
/// Resolved once from the environment at adapter instantiation, keyed by a
/// storage-instance name prefix (e.g. `DATAHUB_BUCKET_NAME` for the
/// "datahub" bucket), and read-only thereafter.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageOptions {
    /// Remote bucket or container name
    pub bucket_name: String,
    /// Key prefix used for application uploads
    pub base_path: String,
    /// Root directory for the local backend
    pub local_path: String,
    /// Optional public domain serving this bucket
    pub domain_name: String,
}

impl StorageOptions {
    /// Resolve options from `{PREFIX}_BUCKET_NAME`, `{PREFIX}_BASE_PATH`,
    /// `{PREFIX}_LOCAL_PATH` and `{PREFIX}_DOMAIN_NAME`.
    pub fn from_env(prefix: &str) -> Self {
        let prefix = prefix.to_uppercase();
        let var = |suffix: &str| env::var(format!("{}_{}", prefix, suffix)).unwrap_or_default();

        Self {
            bucket_name: var("BUCKET_NAME"),
            base_path: {
                let v = var("BASE_PATH");
                if v.is_empty() {
                    "uploads/".to_string()
                } else {
                    v
                }
            },
            local_path: var("LOCAL_PATH"),
            domain_name: var("DOMAIN_NAME"),
        }
    }
}

/// Configuration for one storage instance.
///
/// Backend-specific settings (credentials, endpoint, SFTP host) live in a
/// string option bag passed through to the backend builders; the typed
/// [`StorageOptions`] carry the fields every adapter shares.
///
/// # Examples
///
/// ## Local filesystem
/// ```
/// use filestore::storage::StorageConfig;
///
/// let config = StorageConfig::local().with_option("local_path", "/tmp/data");
/// ```
///
/// ## S3-compatible store
/// ```
/// use filestore::storage::StorageConfig;
///
/// let config = StorageConfig::s3()
///     .with_option("bucket_name", "my-bucket")
///     .with_option("region", "us-east-1")
///     .with_option("endpoint", "http://localhost:9000")
///     .with_option("allow_http", "true");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Storage backend type
    #[serde(rename = "type")]
    pub storage_type: StorageType,

    /// Backend-specific configuration options
    ///
    /// Common keys:
    ///
    /// S3:
    /// - bucket_name, region, access_key_id, secret_access_key,
    ///   session_token, endpoint, allow_http
    ///
    /// GCS:
    /// - bucket_name, service_account_key_path, service_account_key
    ///
    /// Local:
    /// - local_path, domain_name
    ///
    /// SFTP:
    /// - host, port, username, password, private_key_path, root_path
    ///
    /// All backends honor `timeout`, `connect_timeout`, `max_retries` and
    /// `retry_timeout` where the underlying client supports them.
    #[serde(default)]
    pub options: HashMap<String, String>,
}

impl StorageConfig {
    pub fn new(storage_type: StorageType) -> Self {
        Self {
            storage_type,
            options: HashMap::new(),
        }
    }

    pub fn s3() -> Self {
        Self::new(StorageType::S3)
    }

    pub fn gcs() -> Self {
        Self::new(StorageType::Gcs)
    }

    pub fn local() -> Self {
        Self::new(StorageType::Local)
    }

    pub fn sftp() -> Self {
        Self::new(StorageType::Sftp)
    }

    /// Resolve the configuration for a named storage instance from the
    /// environment.
    ///
    /// `{NAME}_BACKEND` selects the adapter type; the shared
    /// [`StorageOptions`] keys and backend credentials are merged into the
    /// option bag. SFTP connection settings come from the global `SFTP_*`
    /// variables.
    pub fn from_env(storage_name: &str) -> StorageResult<Self> {
        let prefix = storage_name.to_uppercase();
        let backend = env::var(format!("{}_BACKEND", prefix)).map_err(|_| {
            StorageError::ConfigError(format!(
                "Missing {}_BACKEND for storage instance '{}'",
                prefix, storage_name
            ))
        })?;
        let storage_type = StorageType::parse(&backend)?;

        let shared = StorageOptions::from_env(&prefix);
        let mut config = Self::new(storage_type)
            .with_option("bucket_name", shared.bucket_name)
            .with_option("base_path", shared.base_path)
            .with_option("local_path", shared.local_path)
            .with_option("domain_name", shared.domain_name);

        let mut copy_env = |key: &str, var: &str| {
            if let Ok(value) = env::var(var) {
                config.options.insert(key.to_string(), value);
            }
        };

        match storage_type {
            StorageType::S3 => {
                copy_env("endpoint", "S3_ENDPOINT_URL");
                copy_env("region", "AWS_REGION");
                copy_env("access_key_id", "AWS_ACCESS_KEY_ID");
                copy_env("secret_access_key", "AWS_SECRET_ACCESS_KEY");
                copy_env("session_token", "AWS_SESSION_TOKEN");
            }
            StorageType::Gcs => {
                copy_env("service_account_key_path", "GOOGLE_APPLICATION_CREDENTIALS");
            }
            StorageType::Sftp => {
                copy_env("host", "SFTP_HOST");
                copy_env("port", "SFTP_PORT");
                copy_env("username", "SFTP_USERNAME");
                copy_env("password", "SFTP_PASSWORD");
                copy_env("private_key_path", "SFTP_PRIVATE_KEY_PATH");
                copy_env("root_path", "SFTP_ROOT");
            }
            StorageType::Local => {}
        }

        Ok(config)
    }

    /// Add a configuration option.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Add multiple configuration options.
    pub fn with_options(mut self, options: HashMap<String, String>) -> Self {
        self.options.extend(options);
        self
    }

    /// Get a configuration option.
    pub fn get_option(&self, key: &str) -> Option<&String> {
        self.options.get(key)
    }

    /// Get a configuration option, or empty when unset.
    pub fn option_or_default(&self, key: &str) -> String {
        self.options.get(key).cloned().unwrap_or_default()
    }

    /// Typed view of the shared per-storage options.
    pub fn storage_options(&self) -> StorageOptions {
        StorageOptions {
            bucket_name: self.option_or_default("bucket_name"),
            base_path: self.option_or_default("base_path"),
            local_path: self.option_or_default("local_path"),
            domain_name: self.option_or_default("domain_name"),
        }
    }
}
