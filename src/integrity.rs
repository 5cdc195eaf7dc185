//! Integrity classification of candidate buckets.
//!
//! Buckets whose `rawdata` carries too little to verify are set aside as
//! [`IntegrityVerdict::NotCheckable`] and never handed to the engine. The rest
//! are checked concurrently; a verdict is only `Passed` when the engine output
//! explicitly reports zero failures.

use crate::engine::BucketEngine;
use crate::error::RestoreError;
use crate::types::{Bucket, IntegrityVerdict};
use futures_util::stream::{self, StreamExt};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, error, info, warn};

/// Prefix of the hash files written when a bucket was indexed with integrity checking on.
pub const HASH_FILE_PREFIX: &str = "l2Hash";

/// Minimum `rawdata` entries for a bucket without hash files to be checked.
pub const MIN_RAWDATA_ENTRIES: usize = 3;

/// Counts parsed from `check-integrity` output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckCounts {
    pub succeeded: u64,
    pub failed: u64,
}

fn counts_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"succeeded=(\d+),\s*failed=(\d+)").expect("integrity pattern is valid")
    })
}

/// Extracts the first `succeeded=<n>,failed=<n>` pair from engine output.
pub fn parse_counts(output: &str) -> Option<CheckCounts> {
    let captures = counts_pattern().captures(output)?;
    Some(CheckCounts {
        succeeded: captures.get(1)?.as_str().parse().ok()?,
        failed: captures.get(2)?.as_str().parse().ok()?,
    })
}

/// Maps parsed output to a verdict. Missing or unparsable counts fail.
pub fn verdict_from_output(output: &str) -> IntegrityVerdict {
    match parse_counts(output) {
        Some(counts) if counts.failed == 0 => IntegrityVerdict::Passed,
        _ => IntegrityVerdict::Failed,
    }
}

/// True when the bucket's `rawdata` exists, holds fewer than three entries and
/// no hash file.
///
/// A bucket without a readable `rawdata` directory is still handed to the
/// engine, which reports it as failed.
pub fn is_not_checkable(bucket_path: &Path) -> bool {
    let Ok(entries) = std::fs::read_dir(bucket_path.join("rawdata")) else {
        return false;
    };
    let names: Vec<String> = entries
        .flatten()
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.len() < MIN_RAWDATA_ENTRIES && !names.iter().any(|n| n.starts_with(HASH_FILE_PREFIX))
}

/// Runs the engine check on one checkable bucket.
pub async fn check<E: BucketEngine>(engine: &E, bucket_path: &Path) -> IntegrityVerdict {
    let name = bucket_path.display();
    match engine.check_integrity(bucket_path).await {
        Ok(output) if output.success => {
            let text = output.combined();
            debug!("{}", text.trim());
            if parse_counts(&text).is_none() {
                warn!("Could not parse integrity result for bucket '{}'. Adding to failed list.", name);
            }
            verdict_from_output(&text)
        }
        Ok(output) => {
            error!("{}", check_error(bucket_path, output.failure_reason()));
            IntegrityVerdict::Failed
        }
        Err(e) => {
            error!("{}", check_error(bucket_path, e.to_string()));
            IntegrityVerdict::Failed
        }
    }
}

fn check_error(bucket_path: &Path, reason: String) -> RestoreError {
    RestoreError::IntegrityCheck {
        bucket: bucket_path.display().to_string(),
        reason,
    }
}

/// Verdicts for a set of buckets, keyed by bucket name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrityReport {
    pub verdicts: BTreeMap<String, IntegrityVerdict>,
}

impl IntegrityReport {
    fn names_with(&self, verdict: IntegrityVerdict) -> Vec<String> {
        self.verdicts
            .iter()
            .filter(|(_, v)| **v == verdict)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn passed(&self) -> Vec<String> {
        self.names_with(IntegrityVerdict::Passed)
    }

    pub fn failed(&self) -> Vec<String> {
        self.names_with(IntegrityVerdict::Failed)
    }

    pub fn not_checkable(&self) -> Vec<String> {
        self.names_with(IntegrityVerdict::NotCheckable)
    }

    /// Buckets that go on to staging: everything that did not fail.
    pub fn eligible<'a>(&self, found: &'a [Bucket]) -> Vec<&'a Bucket> {
        found
            .iter()
            .filter(|b| self.verdicts.get(&b.raw_name) != Some(&IntegrityVerdict::Failed))
            .collect()
    }
}

/// Classifies every bucket under `source_root`.
///
/// The not-checkable subset is split off first; the checkable subset is run
/// through the engine with at most `max_concurrent` checks in flight. Every
/// input bucket ends up with exactly one verdict.
pub async fn check_all<E: BucketEngine>(
    engine: &E,
    source_root: &Path,
    buckets: &[Bucket],
    max_concurrent: usize,
) -> IntegrityReport {
    let (not_checkable, checkable): (Vec<&Bucket>, Vec<&Bucket>) = buckets
        .iter()
        .partition(|b| is_not_checkable(&source_root.join(&b.raw_name)));

    let mut report = IntegrityReport::default();
    for bucket in &not_checkable {
        report
            .verdicts
            .insert(bucket.raw_name.clone(), IntegrityVerdict::NotCheckable);
    }

    let checked: Vec<(String, IntegrityVerdict)> = stream::iter(checkable)
        .map(|bucket| async move {
            let verdict = check(engine, &source_root.join(&bucket.raw_name)).await;
            if verdict == IntegrityVerdict::Failed {
                warn!("Integrity check has failed for the bucket: {}", bucket.raw_name);
                warn!("This bucket will be removed from rebuilding list...");
            }
            (bucket.raw_name.clone(), verdict)
        })
        .buffered(max_concurrent.max(1))
        .collect()
        .await;
    report.verdicts.extend(checked);

    info!("Data integrity is checked...");
    info!("The number of buckets has failed: {}", report.failed().len());
    info!("The number of buckets has succeeded: {}", report.passed().len());
    info!(
        "The number of buckets have no data integrity control: {}",
        report.not_checkable().len()
    );
    info!(
        "The number of buckets will be rebuilt: {}",
        report.passed().len() + report.not_checkable().len()
    );
    report
}
