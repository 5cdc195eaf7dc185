//! Data structures for restore operations.

use crate::error::RestoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// One archived data partition, decoded from its directory name.
///
/// `raw_name` is authoritative; the other fields are derived from it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct Bucket {
    /// Leading name field (the bucket type prefix such as `db`, or an index name).
    pub index: String,
    /// Most recent event time contained in the bucket (first numeric field).
    pub newest_epoch: i64,
    /// Oldest event time contained in the bucket (second numeric field).
    pub oldest_epoch: i64,
    /// Opaque tie-breaker, may itself contain `_`.
    pub unique_id: String,
    /// Canonical on-disk / object-key name.
    pub raw_name: String,
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw_name)
    }
}

/// Requested time span, both bounds inclusive, as Unix epochs.
///
/// `oldest <= newest` is a precondition; it is checked at configuration time
/// and never swapped.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub oldest: i64,
    pub newest: i64,
}

impl TimeWindow {
    pub fn new(oldest: i64, newest: i64) -> Self {
        Self { oldest, newest }
    }

    /// A window with no lower bound, used to discover what is available.
    pub fn up_to(newest: i64) -> Self {
        Self { oldest: 0, newest }
    }

    /// Discovery mode: no lower bound was requested.
    pub fn is_unbounded(&self) -> bool {
        self.oldest == 0
    }
}

/// Outcome of the integrity stage for one bucket.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityVerdict {
    /// The external check reported no failures.
    Passed,
    /// The external check reported a failure, or its output could not be trusted.
    Failed,
    /// The bucket lacks the hash files needed for a meaningful check.
    NotCheckable,
}

/// A directory entry that was not a decodable bucket.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SkipReason {
    pub name: String,
    pub reason: String,
}

/// A bucket that failed in a per-bucket stage.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BucketError {
    pub bucket: String,
    pub reason: String,
}

/// One object returned by the remote store listing.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "Size", default)]
    pub size: u64,
    #[serde(rename = "ETag", default)]
    pub etag: Option<String>,
}

/// A remote object key that matched the index prefix, key pattern and window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteKey {
    pub entry: ObjectEntry,
    pub bucket: Bucket,
}

/// Where to find archived buckets in an S3-compatible store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSource {
    /// Name of the S3 bucket holding the archive.
    pub bucket: String,
    /// Non-default endpoint (e.g. `http://localhost:4566`).
    pub endpoint: Option<String>,
}

/// Configuration for a restore job.
///
/// # Example
///
/// ```
/// use thawsync::{RestoreConfig, TimeWindow};
///
/// let config = RestoreConfig {
///     archive_path: "/opt/splunk/var/lib/splunk/wineventlog/frozendb".into(),
///     staging_path: "/opt/splunk/var/lib/splunk/archive_wineventlog/thaweddb".into(),
///     dest_index: "archive_wineventlog".to_string(),
///     window: TimeWindow::new(1615593600, 1615852800),
///     check_integrity: true,
///     ..RestoreConfig::default()
/// };
/// assert!(!config.restart);
/// ```
#[derive(Debug, Clone)]
pub struct RestoreConfig {
    /// Frozen archive directory holding one sub-directory per bucket.
    pub archive_path: PathBuf,
    /// Thawed directory the buckets are copied into before rebuild.
    pub staging_path: PathBuf,
    /// Index the buckets are rebuilt into. Also the key prefix in the remote store.
    pub dest_index: String,
    /// Requested time span.
    pub window: TimeWindow,
    /// Splunk installation root; the engine binary is `<home>/bin/splunk`.
    pub splunk_home: PathBuf,
    /// Optional S3 source downloaded into `archive_path` before scanning.
    pub remote: Option<RemoteSource>,
    /// Run `splunk check-integrity` before staging.
    pub check_integrity: bool,
    /// Run `splunk restart` after rebuilding.
    pub restart: bool,
    /// Where the audit reports go. `None` selects `./logs` or `<home>/var/log/splunk`.
    pub report_dir: Option<PathBuf>,
    /// Maximum number of integrity checks running at once (default: 4).
    pub max_concurrent_checks: usize,
    /// Attempts per remote object download (default: 3).
    pub download_retries: usize,
    /// Delay between download attempts in milliseconds (default: 2000).
    pub retry_interval_ms: u64,
    /// Draw progress bars for the copy and rebuild stages.
    pub show_progress: bool,
}

impl Default for RestoreConfig {
    fn default() -> Self {
        Self {
            archive_path: PathBuf::new(),
            staging_path: PathBuf::new(),
            dest_index: String::new(),
            window: TimeWindow::new(0, 0),
            splunk_home: PathBuf::from(DEFAULT_SPLUNK_HOME),
            remote: None,
            check_integrity: false,
            restart: false,
            report_dir: None,
            max_concurrent_checks: 4,
            download_retries: 3,
            retry_interval_ms: 2_000,
            show_progress: true,
        }
    }
}

/// Default Splunk installation root.
pub const DEFAULT_SPLUNK_HOME: &str = "/opt/splunk";

impl RestoreConfig {
    /// Directory the local scan, integrity check and copy read buckets from.
    ///
    /// Remote downloads mirror the object key, so with a remote source the
    /// buckets land under `<archive>/<index>/`.
    pub fn source_root(&self) -> PathBuf {
        match self.remote {
            Some(_) => self.archive_path.join(&self.dest_index),
            None => self.archive_path.clone(),
        }
    }

    /// Path of the external engine binary.
    pub fn splunk_binary(&self) -> PathBuf {
        self.splunk_home.join("bin").join("splunk")
    }

    /// Checks the configuration and returns a copy with absolute paths.
    ///
    /// Nothing is created or modified. External tools are checked separately
    /// by the engine and store before a job starts.
    pub fn validate(&self) -> Result<RestoreConfig, RestoreError> {
        if self.dest_index.trim().is_empty() {
            return Err(RestoreError::Config("Destination index name is empty".to_string()));
        }
        if self.window.oldest > self.window.newest {
            return Err(RestoreError::Config(format!(
                "Oldest time ({}) is after newest time ({})",
                self.window.oldest, self.window.newest
            )));
        }
        if self.max_concurrent_checks == 0 {
            return Err(RestoreError::Config(
                "max_concurrent_checks must be at least 1".to_string(),
            ));
        }
        if self.download_retries == 0 {
            return Err(RestoreError::Config("download_retries must be at least 1".to_string()));
        }

        let mut config = self.clone();
        // the archive is created by the download in remote mode
        config.archive_path = match self.remote {
            Some(_) => absolute(&self.archive_path)?,
            None => existing_dir(&self.archive_path, "Archive path")?,
        };
        config.staging_path = existing_dir(&self.staging_path, "Staging path")?;
        config.splunk_home = absolute(&self.splunk_home)?;
        Ok(config)
    }

    /// Resolves the audit report directory.
    pub fn resolved_report_dir(&self) -> PathBuf {
        if let Some(dir) = &self.report_dir {
            return dir.clone();
        }
        let local = PathBuf::from("logs");
        if local.is_dir() {
            local
        } else {
            self.splunk_home.join("var").join("log").join("splunk")
        }
    }
}

fn absolute(path: &Path) -> Result<PathBuf, RestoreError> {
    if path.as_os_str().is_empty() {
        return Err(RestoreError::Config("Empty path".to_string()));
    }
    Ok(std::path::absolute(path)?)
}

fn existing_dir(path: &Path, what: &str) -> Result<PathBuf, RestoreError> {
    if !path.is_dir() {
        return Err(RestoreError::Config(format!(
            "{} does not exist or is not a directory: {}",
            what,
            path.display()
        )));
    }
    Ok(path.canonicalize()?)
}

/// Stage of a restore job, in execution order.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum JobStage {
    /// Select candidate buckets (remote listing, or local scan when no remote source).
    Discover,
    /// Download matched remote objects, then scan the local mirror.
    RemoteFetch,
    /// Optional integrity classification.
    IntegrityCheck,
    /// Copy eligible buckets into the staging area.
    Stage,
    /// Run the external rebuild on each staged bucket.
    Rebuild,
    /// Optional external service restart.
    Restart,
    /// Terminal.
    Done,
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobStage::Discover => "discover",
            JobStage::RemoteFetch => "remote-fetch",
            JobStage::IntegrityCheck => "integrity-check",
            JobStage::Stage => "stage",
            JobStage::Rebuild => "rebuild",
            JobStage::Restart => "restart",
            JobStage::Done => "done",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_root_follows_remote_layout() {
        let mut config = RestoreConfig {
            archive_path: PathBuf::from("/frozen"),
            dest_index: "wineventlog".to_string(),
            ..RestoreConfig::default()
        };
        assert_eq!(config.source_root(), PathBuf::from("/frozen"));

        config.remote = Some(RemoteSource {
            bucket: "archive".to_string(),
            endpoint: None,
        });
        assert_eq!(config.source_root(), PathBuf::from("/frozen/wineventlog"));
    }

    #[test]
    fn test_validate_rejects_bad_config() {
        let dir = tempfile::tempdir().unwrap();
        let valid = RestoreConfig {
            archive_path: dir.path().to_path_buf(),
            staging_path: dir.path().to_path_buf(),
            dest_index: "archive_idx".to_string(),
            window: TimeWindow::new(10, 20),
            ..RestoreConfig::default()
        };
        let checked = valid.validate().unwrap();
        assert!(checked.archive_path.is_absolute());

        let reversed = RestoreConfig {
            window: TimeWindow::new(20, 10),
            ..valid.clone()
        };
        assert!(matches!(reversed.validate(), Err(RestoreError::Config(_))));

        let missing = RestoreConfig {
            archive_path: dir.path().join("missing"),
            ..valid.clone()
        };
        assert!(matches!(missing.validate(), Err(RestoreError::Config(_))));

        // a remote archive may not exist yet
        let remote = RestoreConfig {
            archive_path: dir.path().join("missing"),
            remote: Some(RemoteSource {
                bucket: "archive".to_string(),
                endpoint: None,
            }),
            ..valid.clone()
        };
        assert!(remote.validate().is_ok());

        let no_index = RestoreConfig {
            dest_index: " ".to_string(),
            ..valid
        };
        assert!(matches!(no_index.validate(), Err(RestoreError::Config(_))));
    }

    #[test]
    fn test_explicit_report_dir_wins() {
        let config = RestoreConfig {
            report_dir: Some(PathBuf::from("/tmp/reports")),
            ..RestoreConfig::default()
        };
        assert_eq!(config.resolved_report_dir(), PathBuf::from("/tmp/reports"));
    }

    #[test]
    fn test_object_entry_from_aws_json() {
        let json = r#"[{"Key": "idx/db_2_1_0/rawdata/journal.zst", "Size": 42, "ETag": "\"abc\""},
                       {"Key": "idx/other", "Size": 1}]"#;
        let entries: Vec<ObjectEntry> = serde_json::from_str(json).unwrap();
        assert_eq!(entries[0].size, 42);
        assert_eq!(entries[0].etag.as_deref(), Some("\"abc\""));
        assert_eq!(entries[1].etag, None);
    }
}
