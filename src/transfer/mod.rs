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

//! Background transfer engine
//!
//! Runs upload/download operations without blocking the caller and reports
//! completion through caller-supplied callbacks. One task is spawned per
//! transfer (no admission limit); a reaper task drains a completion channel
//! and joins finished work with a short timeout so completed tasks never
//! accumulate. Callbacks fire exactly once per transfer, after the
//! underlying I/O completes or fails; the reaper only joins, it never
//! invokes callbacks.

use futures::future::BoxFuture;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::storage::adapter::{FailureCallback, SuccessCallback, TransferOptions};
use crate::storage::error::StorageResult;

/// How long the reaper waits when joining one finished transfer.
const JOIN_TIMEOUT: Duration = Duration::from_millis(200);

/// Bound on waiting for the reaper itself at shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Direction of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOp {
    Upload,
    Download,
}

/// One unit of background work, owned by the engine for its lifetime.
pub struct TransferTask {
    pub operation: TransferOp,
    pub source: String,
    pub destination: String,
    pub on_success: Option<SuccessCallback>,
    pub on_failure: Option<FailureCallback>,
    pub enqueued_at: Instant,
}

impl TransferTask {
    pub fn upload(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self::new(TransferOp::Upload, source, destination)
    }

    pub fn download(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self::new(TransferOp::Download, source, destination)
    }

    fn new(
        operation: TransferOp,
        source: impl Into<String>,
        destination: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            source: source.into(),
            destination: destination.into(),
            on_success: None,
            on_failure: None,
            enqueued_at: Instant::now(),
        }
    }

    /// Attach the callbacks carried by a caller's [`TransferOptions`].
    pub fn with_callbacks(mut self, options: TransferOptions) -> Self {
        self.on_success = options.on_success;
        self.on_failure = options.on_failure;
        self
    }
}

/// Fire-and-forget transfer engine with a completion reaper.
pub struct TransferEngine {
    completions: mpsc::UnboundedSender<JoinHandle<()>>,
    shutdown: CancellationToken,
    reaper: Mutex<Option<JoinHandle<()>>>,
}

impl TransferEngine {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let reaper = tokio::spawn(Self::reap(rx, shutdown.clone()));

        Self {
            completions: tx,
            shutdown,
            reaper: Mutex::new(Some(reaper)),
        }
    }

    /// Schedule one transfer. Returns immediately; `io` runs on its own
    /// task and must yield the number of bytes moved.
    pub fn submit(&self, task: TransferTask, io: BoxFuture<'static, StorageResult<u64>>) {
        let handle = tokio::spawn(Self::run(task, io));
        // A closed channel only means shutdown already began; the worker
        // still runs to completion on the runtime.
        let _ = self.completions.send(handle);
    }

    async fn run(task: TransferTask, io: BoxFuture<'static, StorageResult<u64>>) {
        let TransferTask {
            operation,
            source,
            destination,
            on_success,
            on_failure,
            enqueued_at,
        } = task;

        match io.await {
            Ok(bytes) => {
                if operation == TransferOp::Upload {
                    // The caller no longer needs the local copy once the
                    // object is remote.
                    if let Err(e) = tokio::fs::remove_file(&source).await {
                        warn!("Could not remove uploaded source {}: {}", source, e);
                    }
                }
                let duration = enqueued_at.elapsed().as_secs_f64();
                debug!(
                    "Transfer {:?} {} -> {} done, bytes={}, took={:.3}s",
                    operation, source, destination, bytes, duration
                );
                if let Some(callback) = on_success {
                    callback(bytes, duration);
                }
            }
            Err(e) => {
                error!(
                    "Transfer {:?} {} -> {} failed: {}",
                    operation, source, destination, e
                );
                if let Some(callback) = on_failure {
                    callback(e.to_string());
                }
            }
        }
    }

    async fn reap(mut completions: mpsc::UnboundedReceiver<JoinHandle<()>>, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                handle = completions.recv() => match handle {
                    Some(handle) => {
                        let _ = tokio::time::timeout(JOIN_TIMEOUT, handle).await;
                    }
                    None => break,
                },
            }
        }

        // Bounded drain of whatever finished while shutting down.
        while let Ok(handle) = completions.try_recv() {
            let _ = tokio::time::timeout(JOIN_TIMEOUT, handle).await;
        }
    }

    /// Stop the reaper, waiting a bounded time for it to drain. In-flight
    /// transfers keep running on the runtime; their callbacks still fire.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let reaper = self
            .reaper
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = reaper {
            let _ = tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await;
        }
    }
}

impl Default for TransferEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TransferEngine {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
