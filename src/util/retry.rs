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

//! Fixed-interval retry for fallible operations.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::storage::error::{StorageError, StorageResult};

/// Run `operation` up to `max_attempts` times, sleeping `interval` between
/// attempts. Every attempt retries regardless of the error kind; once the
/// budget is spent the last error is reported as
/// [`StorageError::RetryExhausted`].
pub async fn retry_with_attempts<T, F, Fut>(
    max_attempts: usize,
    interval: Duration,
    operation_name: &str,
    mut operation: F,
) -> StorageResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StorageResult<T>>,
{
    let mut last_error = String::new();

    for attempt in 1..=max_attempts.max(1) {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                warn!(
                    "Attempt {}/{} of {} failed: {}",
                    attempt, max_attempts, operation_name, e
                );
                last_error = e.to_string();
            }
        }
        if attempt < max_attempts {
            tokio::time::sleep(interval).await;
        }
    }

    Err(StorageError::RetryExhausted(format!(
        "{}: {}",
        operation_name, last_error
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_succeeds_first_attempt() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let result = retry_with_attempts(3, Duration::from_millis(1), "noop", move || {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, StorageError>(7)
            }
        })
        .await
        .unwrap();

        assert_eq!(result, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let result = retry_with_attempts(5, Duration::from_millis(1), "flaky", move || {
            let calls = calls_clone.clone();
            async move {
                let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if attempt < 3 {
                    Err(StorageError::ConnectionError("still down".to_string()))
                } else {
                    Ok("up")
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result, "up");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausts_budget_and_reports_last_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let err = retry_with_attempts(3, Duration::from_millis(1), "doomed", move || {
            let calls = calls_clone.clone();
            async move {
                let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Err::<(), _>(StorageError::ConnectionError(format!("failure {}", attempt)))
            }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match err {
            StorageError::RetryExhausted(msg) => {
                assert!(msg.contains("doomed"));
                assert!(msg.contains("failure 3"));
            }
            other => panic!("Expected RetryExhausted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_zero_attempts_still_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let result = retry_with_attempts(0, Duration::from_millis(1), "once", move || {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, StorageError>(())
            }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
