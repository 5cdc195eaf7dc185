//! Plain-text audit reports for the integrity and rebuild stages.

use crate::error::RestoreError;
use crate::time_range::format_epoch;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::info;

const SEPARATOR: &str = "\n\n";

/// Integrity check report file name suffix.
pub const INTEGRITY_REPORT_SUFFIX: &str = "_integrity_check.log";

/// Rebuild report file name suffix.
pub const REBUILD_REPORT_SUFFIX: &str = "_buckets_rebuilt.log";

/// `YYYY-mm-dd-HH-MM-SS` stamp used as a report file name prefix.
pub fn file_stamp(epoch: i64) -> String {
    format_epoch(epoch).replace([' ', ':'], "-")
}

fn push_section(out: &mut String, title: &str, names: &[String]) {
    let rule = "-".repeat(title.len() + 4);
    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out, "  {}  ", title);
    let _ = writeln!(out, "{}\n", rule);
    for (i, name) in names.iter().enumerate() {
        let _ = writeln!(out, "{}- {}", i + 1, name);
    }
}

/// Renders the integrity report body.
pub fn render_integrity_report(
    epoch: i64,
    failed: &[String],
    passed: &[String],
    not_checkable: &[String],
) -> String {
    let mut out = format!("Timestamp: {}\n\n", format_epoch(epoch));
    push_section(&mut out, "Buckets Failed", failed);
    out.push_str(SEPARATOR);
    push_section(&mut out, "Buckets Passed", passed);
    out.push_str(SEPARATOR);
    push_section(&mut out, "Buckets Have No Data Integrity Check", not_checkable);
    out
}

/// Renders the rebuild report body.
pub fn render_rebuild_report(epoch: i64, passed: &[String], failed: &[String]) -> String {
    let mut out = format!("Timestamp: {}\n\n", format_epoch(epoch));
    push_section(&mut out, "Buckets Successfully Rebuilt", passed);
    out.push_str(SEPARATOR);
    push_section(&mut out, "Buckets Failed to Rebuild", failed);
    out
}

fn write_report(dir: &Path, epoch: i64, suffix: &str, body: &str) -> Result<PathBuf, RestoreError> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}{}", file_stamp(epoch), suffix));
    std::fs::write(&path, body)?;
    Ok(path)
}

/// Writes `<stamp>_integrity_check.log` into `dir`, creating it if missing.
pub fn write_integrity_report(
    dir: &Path,
    epoch: i64,
    failed: &[String],
    passed: &[String],
    not_checkable: &[String],
) -> Result<PathBuf, RestoreError> {
    let body = render_integrity_report(epoch, failed, passed, not_checkable);
    let path = write_report(dir, epoch, INTEGRITY_REPORT_SUFFIX, &body)?;
    info!("Integrity check log written to: {}", path.display());
    Ok(path)
}

/// Writes `<stamp>_buckets_rebuilt.log` into `dir`, creating it if missing.
pub fn write_rebuild_report(
    dir: &Path,
    epoch: i64,
    passed: &[String],
    failed: &[String],
) -> Result<PathBuf, RestoreError> {
    let body = render_rebuild_report(epoch, passed, failed);
    let path = write_report(dir, epoch, REBUILD_REPORT_SUFFIX, &body)?;
    info!("Rebuild results log written to: {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_file_stamp() {
        // 2021-03-13 00:00:00 UTC
        assert_eq!(file_stamp(1615593600), "2021-03-13-00-00-00");
    }

    #[test]
    fn test_integrity_report_sections() {
        let body = render_integrity_report(
            1615593600,
            &names(&["db_2_1_bad"]),
            &names(&["db_2_1_a", "db_2_1_b"]),
            &[],
        );
        assert!(body.starts_with("Timestamp: 2021-03-13 00:00:00\n\n"));
        assert!(body.contains("  Buckets Failed  \n"));
        assert!(body.contains("1- db_2_1_bad\n"));
        assert!(body.contains("2- db_2_1_b\n"));
        assert!(body.contains("Buckets Have No Data Integrity Check"));
        assert!(!body.contains("\\r\\n"));

        let failed_at = body.find("Buckets Failed").unwrap();
        let passed_at = body.find("Buckets Passed").unwrap();
        assert!(failed_at < passed_at);
    }

    #[test]
    fn test_write_reports_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let reports = dir.path().join("nested").join("logs");

        let path = write_rebuild_report(&reports, 1615593600, &names(&["db_2_1_a"]), &[]).unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "2021-03-13-00-00-00_buckets_rebuilt.log"
        );
        let body = std::fs::read_to_string(&path).unwrap();
        assert!(body.contains("Buckets Successfully Rebuilt"));
        assert!(body.contains("1- db_2_1_a"));

        let path = write_integrity_report(&reports, 1615593600, &[], &[], &names(&["db_2_1_a"])).unwrap();
        assert!(path.to_string_lossy().ends_with(INTEGRITY_REPORT_SUFFIX));
    }
}
