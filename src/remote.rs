//! Remote archive access: listing and matching object keys, staging downloads.
//!
//! Archived buckets are stored one object per bucket under
//! `<index>/<bucketName>/rawdata/journal.<ext>`. Only that key shape is a
//! candidate; everything else in the store is ignored.

use crate::bucket_name;
use crate::download::{fetch_object, FetchStatus, RetryPolicy};
use crate::engine::run_command;
use crate::error::RestoreError;
use crate::progress::stage_bar;
use crate::time_range::overlaps;
use crate::types::{BucketError, ObjectEntry, RemoteKey, RemoteSource, TimeWindow};
use regex::Regex;
use std::collections::BTreeSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tokio::process::Command;
use tracing::{error, info, warn};

/// List/get access to an object store holding archived buckets.
pub trait ObjectStore: Send + Sync {
    /// Every object in the store with its size and ETag.
    fn list_objects(&self) -> impl Future<Output = Result<Vec<ObjectEntry>, RestoreError>> + Send;

    /// Downloads one key to a local file path.
    fn get_object(
        &self,
        key: &str,
        dest: &Path,
    ) -> impl Future<Output = Result<(), RestoreError>> + Send;
}

/// An S3 bucket reached through the `aws` command line client.
#[derive(Debug, Clone)]
pub struct AwsCliStore {
    source: RemoteSource,
    program: PathBuf,
}

const LIST_QUERY: &str = "Contents[].{Key: Key, Size: Size, ETag: ETag}";

impl AwsCliStore {
    pub fn new(source: RemoteSource) -> Self {
        Self {
            source,
            program: PathBuf::from("aws"),
        }
    }

    /// Fails with a configuration error if the `aws` CLI cannot be run.
    pub async fn validate(&self) -> Result<(), RestoreError> {
        let mut command = Command::new(&self.program);
        command.arg("--version");
        match run_command(command, "aws").await {
            Ok(output) if output.success => Ok(()),
            _ => Err(RestoreError::Config(
                "AWS CLI not found. Please install AWS CLI for S3 operations.".to_string(),
            )),
        }
    }

    fn s3api(&self, operation: &str) -> Command {
        let mut command = Command::new(&self.program);
        command
            .arg("s3api")
            .arg(operation)
            .arg("--bucket")
            .arg(&self.source.bucket);
        if let Some(endpoint) = &self.source.endpoint {
            command.arg("--endpoint-url").arg(endpoint);
        }
        command
    }
}

impl ObjectStore for AwsCliStore {
    async fn list_objects(&self) -> Result<Vec<ObjectEntry>, RestoreError> {
        match &self.source.endpoint {
            Some(endpoint) => info!("Listing objects in s3://{} via {}", self.source.bucket, endpoint),
            None => info!("Listing objects in s3://{} from default AWS endpoint", self.source.bucket),
        }

        let mut command = self.s3api("list-objects");
        command.args(["--query", LIST_QUERY, "--output", "json"]);
        let output = run_command(command, "aws").await?;
        if !output.success {
            return Err(RestoreError::RemoteListing(output.failure_reason()));
        }
        parse_listing(&output.stdout)
    }

    async fn get_object(&self, key: &str, dest: &Path) -> Result<(), RestoreError> {
        let mut command = self.s3api("get-object");
        command.arg("--key").arg(key).arg(dest);
        let output = run_command(command, "aws").await?;
        if output.success {
            Ok(())
        } else {
            Err(RestoreError::Download {
                key: key.to_string(),
                reason: output.failure_reason(),
            })
        }
    }
}

/// Parses `list-objects` JSON. An empty bucket prints `null`.
pub(crate) fn parse_listing(stdout: &str) -> Result<Vec<ObjectEntry>, RestoreError> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let entries: Option<Vec<ObjectEntry>> = serde_json::from_str(trimmed)
        .map_err(|e| RestoreError::RemoteListing(format!("unparsable list output: {}", e)))?;
    Ok(entries.unwrap_or_default())
}

fn journal_key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^([^/_]+_\d+_\d+_[^/]+)/rawdata/journal\.[^/]+$")
            .expect("journal key pattern is valid")
    })
}

/// Matches one listed object against the index prefix, key shape and window.
pub fn match_key(entry: &ObjectEntry, index: &str, window: &TimeWindow) -> Option<RemoteKey> {
    let (prefix, rest) = entry.key.split_once('/')?;
    if prefix != index {
        return None;
    }
    let captures = journal_key_pattern().captures(rest)?;
    let bucket = bucket_name::parse(captures.get(1)?.as_str()).ok()?;
    overlaps(&bucket, window).then(|| RemoteKey {
        entry: entry.clone(),
        bucket,
    })
}

/// Lists the store and keeps the keys that match, sorted by key.
pub async fn select<S: ObjectStore>(
    store: &S,
    index: &str,
    window: &TimeWindow,
) -> Result<Vec<RemoteKey>, RestoreError> {
    let entries = store.list_objects().await?;
    let mut matched: Vec<RemoteKey> = entries
        .iter()
        .filter_map(|entry| match_key(entry, index, window))
        .collect();
    matched.sort_by(|a, b| a.entry.key.cmp(&b.entry.key));
    info!(
        "Found {} matching bucket(s) in S3 out of {} object(s).",
        matched.len(),
        entries.len()
    );
    Ok(matched)
}

/// Result of downloading the matched keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchOutcome {
    pub downloaded: usize,
    pub already_present: usize,
    pub errors: Vec<BucketError>,
}

/// Downloads each key to `<archive_root>/<key>`.
///
/// A failed key is logged and recorded; the remaining keys are still fetched.
/// Directories created for a failed key are removed again when they are
/// empty, so the bucket never shows up in a later scan of the mirror.
pub async fn fetch<S: ObjectStore>(
    store: &S,
    keys: &[RemoteKey],
    archive_root: &Path,
    policy: RetryPolicy,
    show_progress: bool,
) -> FetchOutcome {
    let pb = stage_bar(keys.len(), format!("📦 Downloading {} bucket(s)", keys.len()), show_progress);
    let mut outcome = FetchOutcome::default();

    for key in keys {
        let dest = archive_root.join(&key.entry.key);
        pb.set_message(format!("| ⬇️  {}", key.bucket.raw_name));
        match fetch_object(store, &key.entry, &dest, policy).await {
            Ok(FetchStatus::Downloaded) => outcome.downloaded += 1,
            Ok(FetchStatus::AlreadyPresent) => outcome.already_present += 1,
            Err(e) => {
                error!("S3 download failed: {} - {}", key.entry.key, e);
                let index_root = match key.entry.key.split_once('/') {
                    Some((index, _)) => archive_root.join(index),
                    None => archive_root.to_path_buf(),
                };
                remove_empty_parents(&dest, &index_root);
                outcome.errors.push(BucketError {
                    bucket: key.bucket.raw_name.clone(),
                    reason: e.to_string(),
                });
            }
        }
        pb.inc(1);
    }

    pb.finish_with_message(format!(
        "✅ {} downloaded, {} already present, {} failed",
        outcome.downloaded,
        outcome.already_present,
        outcome.errors.len()
    ));
    outcome
}

/// Removes the empty directories above `path`, stopping at `root`.
fn remove_empty_parents(path: &Path, root: &Path) {
    let mut dir = path.parent();
    while let Some(current) = dir {
        if current == root || !current.starts_with(root) {
            break;
        }
        // fails on the first non-empty directory
        if std::fs::remove_dir(current).is_err() {
            break;
        }
        dir = current.parent();
    }
}

/// Result of a `locate` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocateOutcome {
    pub matched: Vec<RemoteKey>,
    /// Distinct bucket names among the matched keys.
    pub bucket_names: Vec<String>,
    /// `None` in discovery mode.
    pub fetch: Option<FetchOutcome>,
}

/// Lists the remote archive for `index` and, unless the window is unbounded,
/// downloads every matching bucket under `archive_root`.
///
/// An unbounded window (`oldest == 0`) only reports what is available.
pub async fn locate<S: ObjectStore>(
    store: &S,
    index: &str,
    window: &TimeWindow,
    archive_root: &Path,
    policy: RetryPolicy,
    show_progress: bool,
) -> Result<LocateOutcome, RestoreError> {
    let matched = select(store, index, window).await?;
    let bucket_names: Vec<String> = matched
        .iter()
        .map(|k| k.bucket.raw_name.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let fetched = if window.is_unbounded() {
        None
    } else {
        let outcome = fetch(store, &matched, archive_root, policy, show_progress).await;
        if !outcome.errors.is_empty() {
            warn!("{} bucket(s) could not be downloaded", outcome.errors.len());
        }
        Some(outcome)
    };

    Ok(LocateOutcome {
        matched,
        bucket_names,
        fetch: fetched,
    })
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory object store for tests.

    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    pub struct MemoryStore {
        objects: BTreeMap<String, Vec<u8>>,
        fail_first: usize,
        fail_listing: bool,
        gets: AtomicUsize,
    }

    impl MemoryStore {
        pub fn with_object(mut self, key: &str, data: &[u8]) -> Self {
            self.objects.insert(key.to_string(), data.to_vec());
            self
        }

        /// The first `n` get calls fail.
        pub fn failing_first(mut self, n: usize) -> Self {
            self.fail_first = n;
            self
        }

        pub fn failing_listing(mut self) -> Self {
            self.fail_listing = true;
            self
        }

        pub fn entries(&self) -> Vec<ObjectEntry> {
            self.objects
                .iter()
                .map(|(key, data)| ObjectEntry {
                    key: key.clone(),
                    size: data.len() as u64,
                    etag: None,
                })
                .collect()
        }

        pub fn get_count(&self) -> usize {
            self.gets.load(Ordering::SeqCst)
        }
    }

    impl ObjectStore for MemoryStore {
        async fn list_objects(&self) -> Result<Vec<ObjectEntry>, RestoreError> {
            if self.fail_listing {
                return Err(RestoreError::RemoteListing("access denied".to_string()));
            }
            Ok(self.entries())
        }

        async fn get_object(&self, key: &str, dest: &Path) -> Result<(), RestoreError> {
            let attempt = self.gets.fetch_add(1, Ordering::SeqCst);
            if attempt < self.fail_first {
                return Err(RestoreError::Download {
                    key: key.to_string(),
                    reason: "connection reset".to_string(),
                });
            }
            let data = self.objects.get(key).ok_or_else(|| RestoreError::Download {
                key: key.to_string(),
                reason: "NoSuchKey".to_string(),
            })?;
            tokio::fs::write(dest, data).await?;
            Ok(())
        }
    }
}
