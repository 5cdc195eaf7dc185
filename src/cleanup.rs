//! Detection and removal of replicated duplicate buckets in a frozen archive.
//!
//! Index clustering freezes both the original (`db_`) and each replicated
//! (`rb_`) copy of a bucket. The copies share everything after the first `_`,
//! so the replicas can be moved away or deleted without losing data.

use crate::error::RestoreError;
use crate::stage::copy_bucket;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const ORIGINAL_PREFIX: &str = "db";
const REPLICA_PREFIX: &str = "rb";

/// Archive entries grouped by duplicate status, each list sorted by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DuplicateReport {
    /// `db_` buckets that have at least one sibling with the same suffix.
    pub originals: Vec<String>,
    /// `rb_` buckets that have at least one sibling with the same suffix.
    pub replicas: Vec<String>,
    /// Entries whose suffix is unique in the archive.
    pub singles: Vec<String>,
    /// Every entry in the archive.
    pub total: usize,
}

/// What to do with the replicated duplicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupAction {
    /// Only report them.
    Show,
    /// Move them into the given directory.
    Move(PathBuf),
    /// Delete them.
    Remove,
}

/// Groups the archive entries by the part of their name after the first `_`.
pub fn find_duplicates(archive: &Path) -> Result<DuplicateReport, RestoreError> {
    let entries = fs::read_dir(archive).map_err(|source| RestoreError::SourceUnavailable {
        path: archive.to_path_buf(),
        source,
    })?;

    let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut report = DuplicateReport::default();
    for entry in entries {
        let name = entry?.file_name().to_string_lossy().into_owned();
        report.total += 1;
        let suffix = name.split_once('_').map(|(_, rest)| rest).unwrap_or(&name).to_string();
        groups.entry(suffix).or_default().push(name);
    }

    for (_, names) in groups {
        if names.len() == 1 {
            report.singles.extend(names);
            continue;
        }
        for name in names {
            match name.split_once('_').map(|(prefix, _)| prefix) {
                Some(ORIGINAL_PREFIX) => report.originals.push(name),
                Some(REPLICA_PREFIX) => report.replicas.push(name),
                _ => {}
            }
        }
    }

    report.originals.sort();
    report.replicas.sort();
    report.singles.sort();

    info!("The number of buckets found: {}.", report.total);
    info!("The number of original buckets found: {}.", report.originals.len());
    info!("The number of replicated buckets found: {}.", report.replicas.len());
    info!("The number of single buckets found: {}.", report.singles.len());
    Ok(report)
}

/// Applies `action` to every replica in `report`, returning the names handled.
///
/// Stops at the first bucket that cannot be moved or removed.
pub fn apply(
    archive: &Path,
    report: &DuplicateReport,
    action: &CleanupAction,
) -> Result<Vec<String>, RestoreError> {
    info!("The number of buckets: {}", report.replicas.len());
    match action {
        CleanupAction::Show => {
            for name in &report.replicas {
                info!("Duplicate bucket: {}", name);
            }
        }
        CleanupAction::Move(dest) => {
            fs::create_dir_all(dest)?;
            for name in &report.replicas {
                let from = archive.join(name);
                let to = dest.join(name);
                info!("Moving {} to {}", from.display(), to.display());
                move_bucket(&from, &to)?;
            }
            info!("✅ Buckets are successfully moved...");
        }
        CleanupAction::Remove => {
            for name in &report.replicas {
                let path = archive.join(name);
                info!("Deleting {}", path.display());
                fs::remove_dir_all(&path)?;
            }
            info!("✅ Duplicate buckets are successfully deleted...");
        }
    }
    Ok(report.replicas.clone())
}

/// Renames, falling back to copy and delete across filesystems.
fn move_bucket(from: &Path, to: &Path) -> Result<(), RestoreError> {
    if to.exists() {
        return Err(RestoreError::Copy {
            bucket: from.display().to_string(),
            reason: format!("destination {} already exists", to.display()),
        });
    }
    if let Err(e) = fs::rename(from, to) {
        warn!("Rename failed ({}), copying {} instead", e, from.display());
        copy_bucket(from, to).map_err(|e| RestoreError::Copy {
            bucket: from.display().to_string(),
            reason: e.to_string(),
        })?;
        fs::remove_dir_all(from)?;
    }
    Ok(())
}
