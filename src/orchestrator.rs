//! Main orchestration logic for restoring frozen buckets.

use crate::download::RetryPolicy;
use crate::engine::BucketEngine;
use crate::error::RestoreError;
use crate::integrity;
use crate::rebuild::rebuild;
use crate::remote::{self, AwsCliStore, ObjectStore};
use crate::report;
use crate::scanner::{self, ScanOutcome};
use crate::stage::stage;
use crate::time_range::{format_epoch, now_epoch};
use crate::types::{Bucket, BucketError, IntegrityVerdict, JobStage, RestoreConfig, SkipReason, TimeWindow};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Outcome of a per-bucket step that can fail without stopping the job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum StepOutcome {
    Succeeded,
    Failed(String),
}

/// Everything the job learned about one bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BucketRecord {
    pub bucket: Bucket,
    /// `None` when integrity checking was not requested.
    pub integrity: Option<IntegrityVerdict>,
    /// `None` when the bucket was not eligible for staging.
    pub copy: Option<StepOutcome>,
    /// `None` when the bucket was not staged.
    pub rebuild: Option<StepOutcome>,
}

/// Per-bucket state keyed by bucket name. Iteration order is staging order.
pub type BucketLedger = BTreeMap<String, BucketRecord>;

/// Counts and failure lists of a finished job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobSummary {
    /// Stages entered, in order.
    pub stages: Vec<JobStage>,
    /// Remote keys that matched the index and window.
    pub remote_matched: usize,
    pub downloaded: usize,
    pub already_present: usize,
    pub download_errors: Vec<BucketError>,
    /// Buckets found in the window.
    pub found: usize,
    /// Entries whose name could not be decoded.
    pub skipped: Vec<SkipReason>,
    pub out_of_range: usize,
    pub integrity_passed: usize,
    pub integrity_failed: Vec<String>,
    pub not_checkable: usize,
    pub copied: usize,
    pub copy_errors: Vec<BucketError>,
    pub rebuilt: usize,
    pub rebuild_failed: Vec<BucketError>,
    pub restarted: bool,
    /// Audit reports written by the job.
    pub reports: Vec<PathBuf>,
}

impl JobSummary {
    /// Writes the summary to the log.
    pub fn log(&self) {
        info!("📊 Restore summary");
        if self.stages.contains(&JobStage::RemoteFetch) {
            info!(
                "  Remote: {} matched, {} downloaded, {} already present, {} failed",
                self.remote_matched,
                self.downloaded,
                self.already_present,
                self.download_errors.len()
            );
        }
        info!(
            "  Found: {} bucket(s), {} outside the window, {} skipped",
            self.found,
            self.out_of_range,
            self.skipped.len()
        );
        if self.stages.contains(&JobStage::IntegrityCheck) {
            info!(
                "  Integrity: {} passed, {} failed, {} not checkable",
                self.integrity_passed,
                self.integrity_failed.len(),
                self.not_checkable
            );
        }
        info!("  Copied: {}, copy errors: {}", self.copied, self.copy_errors.len());
        info!("  Rebuilt: {}, rebuild failures: {}", self.rebuilt, self.rebuild_failed.len());
        for failure in self.copy_errors.iter().chain(&self.rebuild_failed) {
            warn!("  ❌ {}: {}", failure.bucket, failure.reason);
        }
    }

    /// Writes the summary as pretty-printed JSON.
    pub fn write_json(&self, path: &Path) -> Result<(), RestoreError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// True when every found bucket was rebuilt.
    pub fn is_clean(&self) -> bool {
        self.download_errors.is_empty()
            && self.integrity_failed.is_empty()
            && self.copy_errors.is_empty()
            && self.rebuild_failed.is_empty()
    }
}

/// A single restore run: discovery, optional fetch and integrity check,
/// staging, rebuild and optional restart.
///
/// The job is strictly linear. Per-bucket failures are recorded in the
/// ledger and never stop the job; configuration, remote listing and restart
/// failures end it.
pub struct RestoreJob<E, S = AwsCliStore> {
    config: RestoreConfig,
    engine: E,
    store: Option<S>,
    stage: JobStage,
    ledger: BucketLedger,
    summary: JobSummary,
}

impl<E: BucketEngine, S: ObjectStore> RestoreJob<E, S> {
    /// Creates a job. `store` is required when `config.remote` is set.
    pub fn new(config: RestoreConfig, engine: E, store: Option<S>) -> Self {
        Self {
            config,
            engine,
            store,
            stage: JobStage::Discover,
            ledger: BucketLedger::new(),
            summary: JobSummary::default(),
        }
    }

    pub fn stage(&self) -> JobStage {
        self.stage
    }

    pub fn ledger(&self) -> &BucketLedger {
        &self.ledger
    }

    fn enter(&mut self, stage: JobStage) {
        info!("▶️  Stage: {}", stage);
        self.stage = stage;
        self.summary.stages.push(stage);
    }

    fn record_mut(&mut self, name: &str) -> Option<&mut BucketRecord> {
        self.ledger.get_mut(name)
    }

    /// Runs every stage and returns the summary.
    ///
    /// # Returns
    ///
    /// The job summary, or a fatal error. Configuration errors are reported
    /// before anything on disk is touched.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use thawsync::{RestoreConfig, RestoreJob, SplunkEngine, TimeWindow};
    /// use thawsync::remote::AwsCliStore;
    ///
    /// # async fn example() -> Result<(), thawsync::RestoreError> {
    /// let config = RestoreConfig {
    ///     archive_path: "/opt/splunk/var/lib/splunk/wineventlog/frozendb".into(),
    ///     staging_path: "/opt/splunk/var/lib/splunk/archive_wineventlog/thaweddb".into(),
    ///     dest_index: "archive_wineventlog".to_string(),
    ///     window: TimeWindow::new(1615593600, 1615852800),
    ///     ..RestoreConfig::default()
    /// };
    /// let engine = SplunkEngine::new(&config.splunk_home);
    /// let mut job = RestoreJob::<_, AwsCliStore>::new(config, engine, None);
    /// let summary = job.run().await?;
    /// summary.log();
    /// # Ok(())
    /// # }
    /// ```
    pub async fn run(&mut self) -> Result<JobSummary, RestoreError> {
        let config = self.config.validate()?;
        if config.remote.is_some() && self.store.is_none() {
            return Err(RestoreError::Config(
                "A remote source is configured but no object store was provided".to_string(),
            ));
        }
        self.config = config;
        let source_root = self.config.source_root();
        info!(
            "Restoring buckets from {} to {} between {} and {}",
            source_root.display(),
            self.config.staging_path.display(),
            format_epoch(self.config.window.oldest),
            format_epoch(self.config.window.newest)
        );

        let found = self.discover(&source_root).await?;
        if found.is_empty() {
            warn!("No buckets found in the requested time range");
        }

        let eligible = if self.config.check_integrity {
            self.check_integrity(&source_root, &found).await
        } else {
            found
        };

        let staged = self.stage_buckets(&source_root, &eligible).await;
        self.rebuild_buckets(&staged).await;

        if self.config.restart {
            self.restart().await?;
        }

        self.enter(JobStage::Done);
        info!("✅ Restore completed");
        Ok(self.summary.clone())
    }

    /// `Discover` and, with a remote source, `RemoteFetch`.
    async fn discover(&mut self, source_root: &Path) -> Result<Vec<Bucket>, RestoreError> {
        self.enter(JobStage::Discover);

        if let Some(store) = self.store.take() {
            let fetched = self.fetch_remote(&store).await;
            self.store = Some(store);
            fetched?;
        }
        let scan = scanner::scan(source_root, &self.config.window);

        let ScanOutcome {
            mut matched,
            skipped,
            out_of_range,
        } = scan;
        // a bucket whose download failed is never staged, whatever is left on disk
        if !self.summary.download_errors.is_empty() {
            let failed: HashSet<&str> = self
                .summary
                .download_errors
                .iter()
                .map(|e| e.bucket.as_str())
                .collect();
            matched.retain(|b| !failed.contains(b.raw_name.as_str()));
        }
        self.summary.found = matched.len();
        self.summary.skipped = skipped;
        self.summary.out_of_range = out_of_range;
        for bucket in &matched {
            self.ledger.insert(
                bucket.raw_name.clone(),
                BucketRecord {
                    bucket: bucket.clone(),
                    integrity: None,
                    copy: None,
                    rebuild: None,
                },
            );
        }
        info!("The number of buckets found: {}", matched.len());
        Ok(matched)
    }

    /// Lists and matches the remote keys, then downloads them under the archive.
    async fn fetch_remote(&mut self, store: &S) -> Result<(), RestoreError> {
        let matched = remote::select(store, &self.config.dest_index, &self.config.window).await?;
        self.summary.remote_matched = matched.len();

        self.enter(JobStage::RemoteFetch);
        let policy = RetryPolicy {
            attempts: self.config.download_retries,
            interval_ms: self.config.retry_interval_ms,
        };
        let fetched = remote::fetch(
            store,
            &matched,
            &self.config.archive_path,
            policy,
            self.config.show_progress,
        )
        .await;
        self.summary.downloaded = fetched.downloaded;
        self.summary.already_present = fetched.already_present;
        self.summary.download_errors = fetched.errors;
        Ok(())
    }

    async fn check_integrity(&mut self, source_root: &Path, found: &[Bucket]) -> Vec<Bucket> {
        self.enter(JobStage::IntegrityCheck);
        let checked = integrity::check_all(
            &self.engine,
            source_root,
            found,
            self.config.max_concurrent_checks,
        )
        .await;

        for (name, verdict) in &checked.verdicts {
            if let Some(record) = self.record_mut(name) {
                record.integrity = Some(*verdict);
            }
        }

        let (passed, failed, not_checkable) =
            (checked.passed(), checked.failed(), checked.not_checkable());
        debug_assert_eq!(found.len(), passed.len() + failed.len() + not_checkable.len());
        self.summary.integrity_passed = passed.len();
        self.summary.not_checkable = not_checkable.len();

        let report_dir = self.config.resolved_report_dir();
        match report::write_integrity_report(&report_dir, now_epoch(), &failed, &passed, &not_checkable) {
            Ok(path) => self.summary.reports.push(path),
            Err(e) => error!("Could not write integrity report to {}: {}", report_dir.display(), e),
        }
        self.summary.integrity_failed = failed;

        checked.eligible(found).into_iter().cloned().collect()
    }

    async fn stage_buckets(&mut self, source_root: &Path, eligible: &[Bucket]) -> Vec<Bucket> {
        self.enter(JobStage::Stage);
        let outcome = stage(
            source_root,
            &self.config.staging_path,
            eligible,
            self.config.show_progress,
        )
        .await;

        for bucket in &outcome.copied {
            if let Some(record) = self.record_mut(&bucket.raw_name) {
                record.copy = Some(StepOutcome::Succeeded);
            }
        }
        for failure in &outcome.errors {
            if let Some(record) = self.record_mut(&failure.bucket) {
                record.copy = Some(StepOutcome::Failed(failure.reason.clone()));
            }
        }
        debug_assert_eq!(outcome.copied.len(), eligible.len() - outcome.errors.len());
        self.summary.copied = outcome.copied.len();
        self.summary.copy_errors = outcome.errors;
        outcome.copied
    }

    async fn rebuild_buckets(&mut self, staged: &[Bucket]) {
        self.enter(JobStage::Rebuild);
        let outcome = rebuild(
            &self.engine,
            &self.config.staging_path,
            staged,
            &self.config.dest_index,
            self.config.show_progress,
        )
        .await;

        for bucket in &outcome.passed {
            if let Some(record) = self.record_mut(&bucket.raw_name) {
                record.rebuild = Some(StepOutcome::Succeeded);
            }
        }
        for failure in &outcome.failed {
            if let Some(record) = self.record_mut(&failure.bucket) {
                record.rebuild = Some(StepOutcome::Failed(failure.reason.clone()));
            }
        }

        let passed: Vec<String> = outcome.passed.iter().map(|b| b.raw_name.clone()).collect();
        let failed: Vec<String> = outcome.failed.iter().map(|f| f.bucket.clone()).collect();
        let report_dir = self.config.resolved_report_dir();
        match report::write_rebuild_report(&report_dir, now_epoch(), &passed, &failed) {
            Ok(path) => self.summary.reports.push(path),
            Err(e) => error!("Could not write rebuild report to {}: {}", report_dir.display(), e),
        }
        self.summary.rebuilt = outcome.passed.len();
        self.summary.rebuild_failed = outcome.failed;
    }

    async fn restart(&mut self) -> Result<(), RestoreError> {
        self.enter(JobStage::Restart);
        info!("🔄 Restarting Splunk");
        let reason = match self.engine.restart().await {
            Ok(output) if output.success => None,
            Ok(output) => Some(output.failure_reason()),
            Err(e) => Some(e.to_string()),
        };
        match reason {
            None => {
                self.summary.restarted = true;
                info!("✅ Splunk restarted");
                Ok(())
            }
            Some(reason) => {
                self.summary.log();
                Err(RestoreError::RestartFailed(reason))
            }
        }
    }
}

/// Oldest and newest data available for restore.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AvailableRange {
    pub buckets: usize,
    /// `(oldest, newest)` epochs, `None` when nothing was found.
    pub range: Option<(i64, i64)>,
}

impl AvailableRange {
    fn from_buckets<'a, I: IntoIterator<Item = &'a Bucket>>(buckets: I) -> Self {
        let buckets: Vec<&Bucket> = buckets.into_iter().collect();
        Self {
            buckets: buckets.len(),
            range: scanner::date_range(buckets.iter().copied()),
        }
    }

    /// Human readable range for the console.
    pub fn describe(&self) -> String {
        match self.range {
            Some((oldest, newest)) => format!(
                "{} bucket(s) available from {} to {}",
                self.buckets,
                format_epoch(oldest),
                format_epoch(newest)
            ),
            None => "No buckets available".to_string(),
        }
    }
}

/// Date range of the buckets in a local archive directory.
pub fn local_range(archive: &Path) -> AvailableRange {
    let scan = scanner::scan(archive, &TimeWindow::up_to(now_epoch()));
    AvailableRange::from_buckets(&scan.matched)
}

/// Date range of the buckets stored remotely under `index`. Nothing is downloaded.
pub async fn remote_range<S: ObjectStore>(
    store: &S,
    index: &str,
) -> Result<AvailableRange, RestoreError> {
    let located = remote::locate(
        store,
        index,
        &TimeWindow::up_to(now_epoch()),
        Path::new(""),
        RetryPolicy::default(),
        false,
    )
    .await?;

    let mut seen = std::collections::BTreeSet::new();
    let buckets = located
        .matched
        .iter()
        .map(|key| &key.bucket)
        .filter(|bucket| seen.insert(bucket.raw_name.clone()));
    Ok(AvailableRange::from_buckets(buckets))
}
