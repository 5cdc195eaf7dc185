//! Verification of downloaded archive objects (size and MD5/ETag checks).

use crate::error::RestoreError;
use crate::types::ObjectEntry;
use std::path::Path;
use tracing::{info, warn};

/// Computes the MD5 hash of a local file.
///
/// The file is read in 1MB chunks on the blocking pool so journal files of
/// several gigabytes never sit in memory or stall the runtime.
pub(crate) async fn compute_file_md5(path: &Path) -> Result<String, RestoreError> {
    let path = path.to_path_buf();

    tokio::task::spawn_blocking(move || {
        use md5::{Digest, Md5};
        use std::io::Read;

        let file = std::fs::File::open(&path)?;
        let mut reader = std::io::BufReader::with_capacity(1024 * 1024, file);
        let mut hasher = Md5::new();
        let mut buffer = vec![0u8; 1024 * 1024];

        loop {
            let n = reader.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }

        Ok::<String, RestoreError>(format!("{:x}", hasher.finalize()))
    })
    .await
    .map_err(|e| RestoreError::IoError(std::io::Error::other(format!("Task join error: {}", e))))?
}

/// The ETag as a plain MD5 hex string, if it is one.
///
/// Multipart uploads carry `<md5>-<parts>` ETags that are not a content hash.
fn content_md5(entry: &ObjectEntry) -> Option<&str> {
    let etag = entry.etag.as_deref()?.trim_matches('"');
    if etag.is_empty() || etag.contains('-') {
        None
    } else {
        Some(etag)
    }
}

/// Checks a local file against the listed object.
///
/// # Returns
///
/// `Ok(true)` if the file exists with the listed size and, when the ETag is a
/// plain MD5, a matching hash. `Ok(false)` if it is missing or differs.
pub(crate) async fn verify_local_object(path: &Path, entry: &ObjectEntry) -> Result<bool, RestoreError> {
    let local_metadata = match tokio::fs::metadata(path).await {
        Ok(m) => m,
        Err(_) => return Ok(false),
    };

    if local_metadata.len() != entry.size {
        info!(
            "Size mismatch for {}: local={} bytes, remote={} bytes",
            entry.key,
            local_metadata.len(),
            entry.size
        );
        return Ok(false);
    }

    let Some(expected) = content_md5(entry) else {
        // size match is all a multipart or ETag-less object allows
        return Ok(true);
    };

    match compute_file_md5(path).await {
        Ok(local_md5) if local_md5 == expected => Ok(true),
        Ok(local_md5) => {
            info!(
                "MD5 mismatch for {}: local={}, remote={}",
                entry.key, local_md5, expected
            );
            Ok(false)
        }
        Err(e) => {
            warn!("Failed to compute MD5 for {}: {}", entry.key, e);
            Ok(false)
        }
    }
}
