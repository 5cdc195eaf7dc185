//! Sequential rebuild of staged buckets.

use crate::engine::BucketEngine;
use crate::error::RestoreError;
use crate::progress::stage_bar;
use crate::types::{Bucket, BucketError};
use std::path::Path;
use tracing::{error, info};

/// Result of rebuilding the staged buckets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildOutcome {
    pub passed: Vec<Bucket>,
    pub failed: Vec<BucketError>,
}

/// Runs the engine rebuild on each staged bucket, in staging order.
///
/// A failed rebuild is recorded and the next bucket is rebuilt; nothing is
/// retried.
pub async fn rebuild<E: BucketEngine>(
    engine: &E,
    staging_root: &Path,
    staged: &[Bucket],
    dest_index: &str,
    show_progress: bool,
) -> RebuildOutcome {
    let pb = stage_bar(staged.len(), format!("🔄 Rebuilding {} bucket(s)", staged.len()), show_progress);
    let mut outcome = RebuildOutcome::default();

    for (i, bucket) in staged.iter().enumerate() {
        info!("Rebuilding bucket {}/{}: {}", i + 1, staged.len(), bucket.raw_name);
        pb.set_message(format!("| 🔄 {}", bucket.raw_name));

        let bucket_path = staging_root.join(&bucket.raw_name);
        let reason = match engine.rebuild(&bucket_path, dest_index).await {
            Ok(output) if output.success => None,
            Ok(output) => Some(output.failure_reason()),
            Err(e) => Some(e.to_string()),
        };

        match reason {
            None => outcome.passed.push(bucket.clone()),
            Some(reason) => {
                let err = RestoreError::Rebuild {
                    bucket: bucket.raw_name.clone(),
                    reason: reason.clone(),
                };
                error!("{}", err);
                outcome.failed.push(BucketError {
                    bucket: bucket.raw_name.clone(),
                    reason,
                });
            }
        }
        pb.inc(1);
    }

    pb.finish_with_message(format!(
        "✅ Rebuilt {} bucket(s), {} failed",
        outcome.passed.len(),
        outcome.failed.len()
    ));
    info!("The number of buckets that rebuilt successfully: {}", outcome.passed.len());
    info!("The number of buckets that failed to rebuild: {}", outcome.failed.len());
    outcome
}
