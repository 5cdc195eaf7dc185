//! Local archive scanning: bucket selection, inventory listing and date range discovery.

use crate::bucket_name;
use crate::error::RestoreError;
use crate::time_range::{format_epoch, overlaps};
use crate::types::{Bucket, SkipReason, TimeWindow};
use serde::Serialize;
use std::path::Path;
use tracing::{error, info, warn};
use walkdir::WalkDir;

/// Result of scanning one directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOutcome {
    /// Buckets whose span overlaps the window, sorted by name.
    pub matched: Vec<Bucket>,
    /// Entries whose name could not be decoded.
    pub skipped: Vec<SkipReason>,
    /// Decodable buckets outside the window.
    pub out_of_range: usize,
}

impl ScanOutcome {
    /// One-line summary for logs.
    pub fn summary(&self) -> String {
        format!(
            "{} matched, {} outside the window, {} skipped",
            self.matched.len(),
            self.out_of_range,
            self.skipped.len()
        )
    }
}

/// Lists `path` and selects the buckets that overlap `window`.
///
/// An unreadable directory is logged and yields an empty outcome. Names that
/// fail to decode are recorded in `skipped` and never abort the scan.
pub fn scan(path: &Path, window: &TimeWindow) -> ScanOutcome {
    let names = match entry_names(path) {
        Ok(names) => names,
        Err(e) => {
            error!("{}", e);
            return ScanOutcome::default();
        }
    };

    let mut outcome = ScanOutcome::default();
    for name in names {
        match decode(&name) {
            Ok(bucket) if overlaps(&bucket, window) => outcome.matched.push(bucket),
            Ok(_) => outcome.out_of_range += 1,
            Err(e) => {
                warn!("Skipping bucket '{}' - {}", name, e);
                outcome.skipped.push(SkipReason {
                    name,
                    reason: e.to_string(),
                });
            }
        }
    }
    outcome.matched.sort_by(|a, b| a.raw_name.cmp(&b.raw_name));

    info!("Scanned {}: {}", path.display(), outcome.summary());
    outcome
}

/// Decodes one directory entry name into a bucket.
fn decode(name: &str) -> Result<Bucket, RestoreError> {
    Ok(bucket_name::parse(name)?)
}

/// Sorted entry names of a directory.
fn entry_names(path: &Path) -> Result<Vec<String>, RestoreError> {
    let unavailable = |source| RestoreError::SourceUnavailable {
        path: path.to_path_buf(),
        source,
    };
    let mut names = Vec::new();
    for entry in std::fs::read_dir(path).map_err(unavailable)? {
        let entry = entry.map_err(unavailable)?;
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}

/// Oldest and newest event epochs covered by a set of buckets.
pub fn date_range<'a, I>(buckets: I) -> Option<(i64, i64)>
where
    I: IntoIterator<Item = &'a Bucket>,
{
    buckets.into_iter().fold(None, |range, bucket| match range {
        None => Some((bucket.oldest_epoch, bucket.newest_epoch)),
        Some((oldest, newest)) => Some((
            oldest.min(bucket.oldest_epoch),
            newest.max(bucket.newest_epoch),
        )),
    })
}

/// One row of the bucket inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BucketListing {
    pub bucket: Bucket,
    /// Total size of the files under `rawdata/`.
    pub rawdata_bytes: u64,
    /// Number of files under `rawdata/`.
    pub rawdata_files: u64,
}

/// Inventories the bucket directories in `path`, oldest first.
///
/// Non-directories and undecodable names are left out.
pub fn list_available_buckets(path: &Path) -> Result<Vec<BucketListing>, RestoreError> {
    let mut listings = Vec::new();
    for name in entry_names(path)? {
        let bucket_path = path.join(&name);
        if !bucket_path.is_dir() {
            continue;
        }
        let Ok(bucket) = bucket_name::parse(&name) else {
            continue;
        };
        let (rawdata_bytes, rawdata_files) = tree_size(&bucket_path.join("rawdata"));
        listings.push(BucketListing {
            bucket,
            rawdata_bytes,
            rawdata_files,
        });
    }
    listings.sort_by(|a, b| {
        (a.bucket.oldest_epoch, &a.bucket.raw_name).cmp(&(b.bucket.oldest_epoch, &b.bucket.raw_name))
    });
    Ok(listings)
}

/// Total bytes and file count below `dir`. Unreadable entries are ignored.
fn tree_size(dir: &Path) -> (u64, u64) {
    WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .fold((0, 0), |(bytes, files), metadata| (bytes + metadata.len(), files + 1))
}

/// Human readable size in KB, MB or GB.
pub fn format_size(bytes: u64) -> String {
    const MB: f64 = 1024.0 * 1024.0;
    const GB: f64 = MB * 1024.0;
    let bytes = bytes as f64;
    if bytes < MB {
        format!("{:.1} KB", bytes / 1024.0)
    } else if bytes < GB {
        format!("{:.1} MB", bytes / MB)
    } else {
        format!("{:.1} GB", bytes / GB)
    }
}

/// Renders the inventory as a fixed-width table.
pub fn render_listing(listings: &[BucketListing]) -> String {
    let rule = "=".repeat(120);
    let mut out = String::new();
    out.push_str(&format!("{}\nAVAILABLE BUCKETS\n{}\n", rule, rule));
    out.push_str(&format!(
        "{:<50} {:<20} {:<20} {:<10} {:<8}\n",
        "Bucket Name", "Oldest Event", "Newest Event", "Size", "Files"
    ));
    out.push_str(&format!("{}\n", "-".repeat(120)));
    for listing in listings {
        out.push_str(&format!(
            "{:<50} {:<20} {:<20} {:<10} {:<8}\n",
            listing.bucket.raw_name,
            format_epoch(listing.bucket.oldest_epoch),
            format_epoch(listing.bucket.newest_epoch),
            format_size(listing.rawdata_bytes),
            listing.rawdata_files
        ));
    }
    out.push_str(&format!("{}\n", "-".repeat(120)));
    out.push_str(&format!("Total buckets found: {}\n{}\n", listings.len(), rule));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BucketNameError;
    use std::fs;
    use tempfile::TempDir;

    const VALID: [&str; 3] = [
        "wineventlog_1609459200_1609459200_1234567890",
        "wineventlog_1640995200_1640995200_1234567891",
        "wineventlog_1625097600_1625097600_1234567892",
    ];
    const INVALID: [&str; 6] = [
        "invalid_bucket",
        "wineventlog_1609459200",
        "wineventlog",
        "wineventlog_1609459200_1609459200",
        "wineventlog_invalid_epoch_1234567890",
        "wineventlog_1609459200_invalid_epoch_1234567890",
    ];
    const OUT_OF_RANGE: [&str; 2] = [
        "wineventlog_1500000000_1500000000_1234567893",
        "wineventlog_1700000000_1700000000_1234567894",
    ];

    fn archive() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        for name in VALID.iter().chain(INVALID.iter()).chain(OUT_OF_RANGE.iter()) {
            let rawdata = dir.path().join(name).join("rawdata");
            fs::create_dir_all(&rawdata).unwrap();
            fs::write(rawdata.join("sample.log"), "sample log data").unwrap();
        }
        dir
    }

    fn window() -> TimeWindow {
        TimeWindow::new(1609459200, 1640995200)
    }

    #[test]
    fn test_scan_selects_overlapping_buckets() {
        let dir = archive();
        let outcome = scan(dir.path(), &window());

        let mut expected: Vec<&str> = VALID.to_vec();
        expected.sort();
        let names: Vec<&str> = outcome.matched.iter().map(|b| b.raw_name.as_str()).collect();
        assert_eq!(names, expected);
        assert_eq!(outcome.out_of_range, 2);
    }

    #[test]
    fn test_scan_reports_malformed_names_as_skipped() {
        let dir = archive();
        let outcome = scan(dir.path(), &window());

        let mut skipped: Vec<&str> = outcome.skipped.iter().map(|s| s.name.as_str()).collect();
        skipped.sort();
        let mut expected = INVALID.to_vec();
        expected.sort();
        assert_eq!(skipped, expected);

        let wrong_epoch = outcome
            .skipped
            .iter()
            .find(|s| s.name == "wineventlog_invalid_epoch_1234567890")
            .unwrap();
        assert_eq!(
            wrong_epoch.reason,
            "invalid epoch 'invalid' in bucket name 'wineventlog_invalid_epoch_1234567890'"
        );
    }

    #[test]
    fn test_decode_errors_are_bucket_name_errors() {
        assert!(matches!(
            decode("wineventlog_1609459200"),
            Err(RestoreError::BucketName(BucketNameError::MalformedName(_)))
        ));
        assert!(matches!(
            decode("wineventlog_1609459200_oops_1"),
            Err(RestoreError::BucketName(BucketNameError::InvalidEpoch { .. }))
        ));
        assert_eq!(decode(VALID[0]).unwrap().raw_name, VALID[0]);
    }

    #[test]
    fn test_scan_is_idempotent() {
        let dir = archive();
        assert_eq!(scan(dir.path(), &window()), scan(dir.path(), &window()));
    }

    #[test]
    fn test_scan_of_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = scan(&dir.path().join("nope"), &window());
        assert_eq!(outcome, ScanOutcome::default());
    }

    #[test]
    fn test_date_range_spans_all_buckets() {
        let buckets: Vec<Bucket> = ["db_300_200_a", "db_150_100_b", "db_500_400_c"]
            .iter()
            .map(|n| bucket_name::parse(n).unwrap())
            .collect();
        assert_eq!(date_range(&buckets), Some((100, 500)));
        assert_eq!(date_range(Vec::<Bucket>::new().iter()), None);
    }

    #[test]
    fn test_list_available_buckets_sorted_with_sizes() {
        let dir = tempfile::tempdir().unwrap();
        let newer = dir.path().join("db_2000_1500_1").join("rawdata");
        let older = dir.path().join("db_1000_900_2").join("rawdata");
        fs::create_dir_all(&newer).unwrap();
        fs::create_dir_all(older.join("nested")).unwrap();
        fs::write(newer.join("journal.zst"), vec![0u8; 2048]).unwrap();
        fs::write(older.join("journal.zst"), vec![0u8; 10]).unwrap();
        fs::write(older.join("nested").join("slices.dat"), vec![0u8; 5]).unwrap();
        fs::write(dir.path().join("db_1_1_file"), "not a directory").unwrap();

        let listings = list_available_buckets(dir.path()).unwrap();
        assert_eq!(listings.len(), 2);
        assert_eq!(listings[0].bucket.raw_name, "db_1000_900_2");
        assert_eq!((listings[0].rawdata_bytes, listings[0].rawdata_files), (15, 2));
        assert_eq!((listings[1].rawdata_bytes, listings[1].rawdata_files), (2048, 1));

        let table = render_listing(&listings);
        assert!(table.contains("Total buckets found: 2"));
        assert!(table.contains("2.0 KB"));
    }

    #[test]
    fn test_format_size_units() {
        assert_eq!(format_size(512), "0.5 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MB");
        assert_eq!(format_size(2 * 1024 * 1024 * 1024), "2.0 GB");
    }
}
