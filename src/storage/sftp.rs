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

//! SFTP backend over one persistent SSH session.
//!
//! libssh2 is a blocking C library and a session is not thread-safe, so the
//! connection lives behind a mutex and every operation runs on the blocking
//! thread pool. Keys map to remote paths below the configured `root_path`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use ssh2::{ErrorCode, Session, Sftp};
use std::collections::VecDeque;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::adapter::{
    apply_csv_filter, notify_sync_outcome, ObjectMetadata, ObjectStorage, TransferOptions,
};
use super::config::{StorageConfig, StorageOptions, StorageType};
use super::error::{StorageError, StorageResult};
use super::prefix::{join_key, walk_local_files};
use crate::util::retry_with_attempts;

const CONNECT_ATTEMPTS: usize = 3;
const CONNECT_BACKOFF: Duration = Duration::from_millis(500);
const DEFAULT_PORT: u16 = 22;
const REMOTE_DIR_MODE: i32 = 0o755;

/// SSH_FX_NO_SUCH_FILE from the SFTP status codes.
const SFTP_NO_SUCH_FILE: i32 = 2;

#[derive(Clone)]
struct SftpSettings {
    host: String,
    port: u16,
    username: String,
    password: String,
    private_key_path: String,
}

struct SftpConnection {
    session: Session,
    sftp: Sftp,
}

/// Storage adapter over one SFTP account.
pub struct SftpAdapter {
    options: StorageOptions,
    root: PathBuf,
    connection: Arc<Mutex<SftpConnection>>,
}

fn not_found_or(e: ssh2::Error, path: &str) -> StorageError {
    match e.code() {
        ErrorCode::SFTP(code) if code == SFTP_NO_SUCH_FILE => StorageError::NotFound {
            path: path.to_string(),
        },
        _ => StorageError::SftpError(e),
    }
}

fn connect_blocking(settings: &SftpSettings) -> StorageResult<SftpConnection> {
    let address = format!("{}:{}", settings.host, settings.port);
    let tcp = TcpStream::connect(&address).map_err(|e| {
        StorageError::ConnectionError(format!("SFTP connect to {} failed: {}", address, e))
    })?;

    let mut session = Session::new()?;
    session.set_tcp_stream(tcp);
    session.handshake()?;

    if !settings.password.is_empty() {
        session.userauth_password(&settings.username, &settings.password)?;
    } else {
        session.userauth_pubkey_file(
            &settings.username,
            None,
            Path::new(&settings.private_key_path),
            None,
        )?;
    }
    if !session.authenticated() {
        return Err(StorageError::ConnectionError(format!(
            "SFTP authentication failed for {}@{}",
            settings.username, settings.host
        )));
    }

    let sftp = session.sftp()?;
    Ok(SftpConnection { session, sftp })
}

/// Create every missing directory on the way down to `dir`.
fn ensure_remote_dir(sftp: &Sftp, dir: &Path) -> StorageResult<()> {
    let mut current = PathBuf::new();
    for component in dir.components() {
        current.push(component);
        if sftp.stat(&current).is_err() {
            sftp.mkdir(&current, REMOTE_DIR_MODE)?;
        }
    }
    Ok(())
}

fn read_remote(conn: &SftpConnection, path: &Path, key: &str) -> StorageResult<Vec<u8>> {
    let mut file = conn
        .sftp
        .open(path)
        .map_err(|e| not_found_or(e, key))?;
    let mut contents = Vec::new();
    file.read_to_end(&mut contents)?;
    Ok(contents)
}

fn write_remote(conn: &SftpConnection, path: &Path, contents: &[u8]) -> StorageResult<u64> {
    if let Some(parent) = path.parent() {
        ensure_remote_dir(&conn.sftp, parent)?;
    }
    let mut file = conn.sftp.create(path)?;
    file.write_all(contents)?;
    Ok(contents.len() as u64)
}

/// Recursive remote listing with an explicit worklist.
fn list_remote(conn: &SftpConnection, root: &Path, folder: &Path) -> StorageResult<Vec<String>> {
    let mut keys = Vec::new();
    let mut pending = VecDeque::from([folder.to_path_buf()]);

    while let Some(dir) = pending.pop_front() {
        let entries = conn
            .sftp
            .readdir(&dir)
            .map_err(|e| not_found_or(e, &dir.to_string_lossy()))?;
        for (path, stat) in entries {
            if stat.is_dir() {
                pending.push_back(path);
            } else {
                let relative = path.strip_prefix(root).unwrap_or(&path);
                keys.push(relative.to_string_lossy().replace('\\', "/"));
            }
        }
    }

    Ok(keys)
}

impl SftpAdapter {
    /// Connect and authenticate, retrying transient connection failures a
    /// few times before giving up.
    pub async fn new(config: &StorageConfig) -> StorageResult<Self> {
        let options = config.storage_options();
        let host = config.option_or_default("host");
        let username = config.option_or_default("username");
        if host.is_empty() || username.is_empty() {
            return Err(StorageError::ConfigError(
                "SFTP storage requires the 'host' and 'username' options".to_string(),
            ));
        }

        let password = config.option_or_default("password");
        let private_key_path = config.option_or_default("private_key_path");
        if password.is_empty() && private_key_path.is_empty() {
            return Err(StorageError::ConfigError(
                "SFTP storage requires 'password' or 'private_key_path'".to_string(),
            ));
        }

        let port = match config.get_option("port") {
            Some(raw) => raw.parse::<u16>().map_err(|_| {
                StorageError::ConfigError(format!("Invalid SFTP port: {}", raw))
            })?,
            None => DEFAULT_PORT,
        };

        let settings = SftpSettings {
            host,
            port,
            username,
            password,
            private_key_path,
        };

        let connection = retry_with_attempts(
            CONNECT_ATTEMPTS,
            CONNECT_BACKOFF,
            "sftp connect",
            || {
                let settings = settings.clone();
                async move {
                    tokio::task::spawn_blocking(move || connect_blocking(&settings))
                        .await
                        .map_err(|e| {
                            StorageError::ConnectionError(format!(
                                "SFTP worker task failed: {}",
                                e
                            ))
                        })?
                }
            },
        )
        .await?;
        debug!("Connected to SFTP host: {}:{}", settings.host, settings.port);

        let root = match config.get_option("root_path") {
            Some(path) if !path.is_empty() => PathBuf::from(path),
            _ => PathBuf::from("."),
        };

        Ok(Self {
            options,
            root,
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    fn remote_path(&self, key: &str) -> PathBuf {
        self.root.join(key.trim_start_matches('/'))
    }

    async fn blocking<T, F>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&SftpConnection) -> StorageResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let connection = self.connection.clone();
        tokio::task::spawn_blocking(move || {
            let guard = connection.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            f(&guard)
        })
        .await
        .map_err(|e| StorageError::ConnectionError(format!("SFTP worker task failed: {}", e)))?
    }

    /// Tear down the SSH session. Operations after this fail.
    pub async fn disconnect(&self) -> StorageResult<()> {
        info!("Disconnecting from SFTP host");
        self.blocking(|conn| {
            conn.session
                .disconnect(None, "closing storage adapter", None)?;
            Ok(())
        })
        .await
    }
}

impl std::fmt::Debug for SftpAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SftpAdapter")
            .field("root", &self.root)
            .finish()
    }
}

#[async_trait]
impl ObjectStorage for SftpAdapter {
    fn storage_type(&self) -> StorageType {
        StorageType::Sftp
    }

    fn storage_options(&self) -> &StorageOptions {
        &self.options
    }

    async fn path_exists(&self, path: &str) -> StorageResult<bool> {
        let remote = self.remote_path(path);
        self.blocking(move |conn| Ok(conn.sftp.stat(&remote).is_ok()))
            .await
    }

    async fn list_files(&self, folder: &str, filter_csv: bool) -> StorageResult<Vec<String>> {
        let root = self.root.clone();
        let remote = self.remote_path(folder);
        let keys = self
            .blocking(move |conn| list_remote(conn, &root, &remote))
            .await?;
        Ok(apply_csv_filter(keys, filter_csv))
    }

    async fn get_object(&self, key: &str) -> StorageResult<Vec<u8>> {
        let remote = self.remote_path(key);
        let key = key.to_string();
        self.blocking(move |conn| read_remote(conn, &remote, &key))
            .await
    }

    async fn put_object(&self, obj: &Value, key: &str) -> StorageResult<()> {
        let contents = serde_json::to_vec(obj)?;
        let remote = self.remote_path(key);
        self.blocking(move |conn| write_remote(conn, &remote, &contents).map(|_| ()))
            .await
    }

    async fn delete_object(&self, key: &str) -> StorageResult<()> {
        let remote = self.remote_path(key);
        let key = key.to_string();
        self.blocking(move |conn| {
            conn.sftp.unlink(&remote).map_err(|e| not_found_or(e, &key))
        })
        .await
    }

    async fn upload_file(
        &self,
        local_path: &Path,
        key: &str,
        options: TransferOptions,
    ) -> StorageResult<()> {
        let started = Instant::now();
        let remote = self.remote_path(key);
        let local = local_path.to_path_buf();
        let outcome = self
            .blocking(move |conn| {
                let contents = std::fs::read(&local)?;
                write_remote(conn, &remote, &contents)
            })
            .await;
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
        let remote = self.remote_path(key);
        let local = local_path.to_path_buf();
        let key = key.to_string();
        let outcome = self
            .blocking(move |conn| {
                let contents = read_remote(conn, &remote, &key)?;
                if let Some(parent) = local.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&local, &contents)?;
                Ok(contents.len() as u64)
            })
            .await;
        notify_sync_outcome(options, started, &outcome);
        outcome.map(|_| ())
    }

    async fn download_folder(
        &self,
        key: &str,
        local_path: &Path,
        _prefer_async: bool,
    ) -> StorageResult<()> {
        let prefix = key.trim_end_matches('/');
        for object_key in self.list_files(key, false).await? {
            let relative = object_key
                .strip_prefix(prefix)
                .unwrap_or(object_key.as_str())
                .trim_start_matches('/')
                .to_string();
            let target = local_path.join(&relative);
            self.download_file(&object_key, &target, TransferOptions::sync())
                .await?;
        }
        Ok(())
    }

    async fn head_object(&self, key: &str) -> StorageResult<Option<ObjectMetadata>> {
        let remote = self.remote_path(key);
        self.blocking(move |conn| {
            match conn.sftp.stat(&remote) {
                Ok(stat) => Ok(Some(ObjectMetadata {
                    size: stat.size.unwrap_or(0),
                    last_modified: stat
                        .mtime
                        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs as i64, 0)),
                    etag: None,
                    content_type: None,
                })),
                Err(e) => match not_found_or(e, "") {
                    StorageError::NotFound { .. } => Ok(None),
                    other => Err(other),
                },
            }
        })
        .await
    }
}
