//! Copying eligible buckets from the archive into the staging (thawed) area.

use crate::error::RestoreError;
use crate::progress::stage_bar;
use crate::types::{Bucket, BucketError};
use std::fs;
use std::io;
use std::path::Path;
use tracing::{error, info};
use walkdir::WalkDir;

/// Result of staging a set of buckets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageOutcome {
    /// Buckets now present under the staging root, in input order.
    pub copied: Vec<Bucket>,
    pub errors: Vec<BucketError>,
}

/// Copies each bucket tree from `source_root/<name>` to `dest_root/<name>`.
///
/// A destination that already exists is an error for that bucket; nothing is
/// overwritten. A failed copy is removed again and the next bucket is tried.
pub async fn stage(
    source_root: &Path,
    dest_root: &Path,
    buckets: &[Bucket],
    show_progress: bool,
) -> StageOutcome {
    info!("Copying {} bucket(s) to {}", buckets.len(), dest_root.display());
    let pb = stage_bar(buckets.len(), format!("📂 Copying {} bucket(s)", buckets.len()), show_progress);
    let mut outcome = StageOutcome::default();

    for (i, bucket) in buckets.iter().enumerate() {
        info!("Processing bucket {}/{}: {}", i + 1, buckets.len(), bucket.raw_name);
        pb.set_message(format!("| 📂 {}", bucket.raw_name));

        let source = source_root.join(&bucket.raw_name);
        let dest = dest_root.join(&bucket.raw_name);
        let result = tokio::task::spawn_blocking(move || copy_bucket(&source, &dest))
            .await
            .map_err(|e| io::Error::other(format!("Task join error: {}", e)))
            .and_then(|r| r);

        match result {
            Ok(()) => outcome.copied.push(bucket.clone()),
            Err(e) => {
                let err = RestoreError::Copy {
                    bucket: bucket.raw_name.clone(),
                    reason: e.to_string(),
                };
                error!("{}", err);
                outcome.errors.push(BucketError {
                    bucket: bucket.raw_name.clone(),
                    reason: e.to_string(),
                });
            }
        }
        pb.inc(1);
    }

    pb.finish_with_message(format!(
        "✅ Copied {} bucket(s), {} failed",
        outcome.copied.len(),
        outcome.errors.len()
    ));
    outcome
}

/// Copies one bucket tree, refusing to touch an existing destination.
pub(crate) fn copy_bucket(source: &Path, dest: &Path) -> io::Result<()> {
    if !source.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("source bucket {} is not a directory", source.display()),
        ));
    }
    // create_dir fails with AlreadyExists, which is the conflict check
    fs::create_dir(dest).map_err(|e| match e.kind() {
        io::ErrorKind::AlreadyExists => io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("destination {} already exists", dest.display()),
        ),
        _ => e,
    })?;

    if let Err(e) = copy_tree(source, dest) {
        let _ = fs::remove_dir_all(dest);
        return Err(e);
    }
    Ok(())
}

/// Copies the contents of `source` into the existing directory `dest`.
///
/// Links are not followed; each one is recreated pointing at the same target.
fn copy_tree(source: &Path, dest: &Path) -> io::Result<()> {
    for entry in WalkDir::new(source).min_depth(1).follow_links(false) {
        let entry = entry.map_err(io::Error::other)?;
        let rel = entry.path().strip_prefix(source).map_err(io::Error::other)?;
        let target = dest.join(rel);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir(&target)?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(fs::read_link(src)?, dst)
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dst: &Path) -> io::Result<()> {
    fs::copy(src, dst).map(|_| ())
}
