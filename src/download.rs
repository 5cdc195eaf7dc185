//! Single-object download with resume, retry and verification.

use crate::error::RestoreError;
use crate::remote::ObjectStore;
use crate::types::ObjectEntry;
use crate::verify::verify_local_object;
use std::path::Path;
use tokio_retry2::{Retry, RetryError};
use tracing::{info, warn};

/// How often and how patiently a download is attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, first one included.
    pub attempts: usize,
    /// Delay between attempts in milliseconds.
    pub interval_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            interval_ms: 2_000,
        }
    }
}

/// What `fetch_object` had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    /// The object was downloaded and verified.
    Downloaded,
    /// A verified local copy already existed.
    AlreadyPresent,
}

/// Downloads `entry` to `dest`, creating parent directories.
///
/// An existing file that already matches the listed size/ETag is kept. A
/// download that does not verify is deleted and retried; after the last
/// attempt the error is returned.
pub(crate) async fn fetch_object<S: ObjectStore>(
    store: &S,
    entry: &ObjectEntry,
    dest: &Path,
    policy: RetryPolicy,
) -> Result<FetchStatus, RestoreError> {
    if verify_local_object(dest, entry).await? {
        info!("✅ {} already present and verified", entry.key);
        return Ok(FetchStatus::AlreadyPresent);
    }

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let retry_strategy = tokio_retry2::strategy::FixedInterval::from_millis(policy.interval_ms)
        .take(policy.attempts.saturating_sub(1));

    Retry::spawn(retry_strategy, || async move {
        match download_and_verify(store, entry, dest).await {
            Ok(()) => Ok(FetchStatus::Downloaded),
            Err(e) => {
                warn!("Failed to download {} due to error: {}", entry.key, e);
                RetryError::to_transient(e)
            }
        }
    })
    .await
}

async fn download_and_verify<S: ObjectStore>(
    store: &S,
    entry: &ObjectEntry,
    dest: &Path,
) -> Result<(), RestoreError> {
    info!("⬇️  Downloading {} to {}", entry.key, dest.display());
    if let Err(e) = store.get_object(&entry.key, dest).await {
        let _ = tokio::fs::remove_file(dest).await;
        return Err(e);
    }

    if !verify_local_object(dest, entry).await? {
        // corrupted download, never leave it where the scanner would pick it up
        let _ = tokio::fs::remove_file(dest).await;
        return Err(RestoreError::Download {
            key: entry.key.clone(),
            reason: "downloaded object does not match the listed size/ETag".to_string(),
        });
    }
    Ok(())
}
