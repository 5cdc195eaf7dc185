//! End-to-end restore through the public API with a scripted engine.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use thawsync::remote::AwsCliStore;
use thawsync::{
    BucketEngine, CommandOutput, IntegrityVerdict, JobStage, RestoreConfig, RestoreError,
    RestoreJob, StepOutcome, TimeWindow,
};

#[derive(Default)]
struct ScriptedEngine {
    corrupt: HashSet<String>,
    broken_rebuilds: HashSet<String>,
    rebuilt: Mutex<Vec<String>>,
}

fn name_of(path: &Path) -> String {
    path.file_name().unwrap().to_string_lossy().into_owned()
}

fn ok(success: bool, stdout: &str) -> CommandOutput {
    CommandOutput {
        success,
        code: Some(if success { 0 } else { 2 }),
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

impl BucketEngine for ScriptedEngine {
    async fn check_integrity(&self, bucket_path: &Path) -> Result<CommandOutput, RestoreError> {
        let failed = u8::from(self.corrupt.contains(&name_of(bucket_path)));
        Ok(ok(true, &format!("succeeded={},failed={}", 1 - failed, failed)))
    }

    async fn rebuild(&self, bucket_path: &Path, _dest_index: &str) -> Result<CommandOutput, RestoreError> {
        let name = name_of(bucket_path);
        assert!(bucket_path.join("rawdata").is_dir(), "rebuild ran on an unstaged bucket");
        self.rebuilt.lock().unwrap().push(name.clone());
        Ok(ok(!self.broken_rebuilds.contains(&name), ""))
    }

    async fn restart(&self) -> Result<CommandOutput, RestoreError> {
        Ok(ok(true, ""))
    }
}

fn frozen_bucket(root: &Path, name: &str, hashed: bool) {
    let rawdata = root.join(name).join("rawdata");
    fs::create_dir_all(&rawdata).unwrap();
    fs::write(rawdata.join("journal.zst"), name).unwrap();
    if hashed {
        fs::write(rawdata.join("l2Hash_0_0.dat"), "hash").unwrap();
    }
}

#[tokio::test]
async fn restores_overlapping_buckets_and_records_every_outcome() {
    let archive = tempfile::tempdir().unwrap();
    let thawed = tempfile::tempdir().unwrap();
    let reports = tempfile::tempdir().unwrap();

    // 2021-01-01 00:00:00 .. 2021-12-31 23:59:59 UTC
    let window = TimeWindow::new(1609459200, 1640995199);
    frozen_bucket(archive.path(), "db_1612137600_1609459200_1", true);
    frozen_bucket(archive.path(), "db_1625097600_1622505600_2", true);
    frozen_bucket(archive.path(), "db_1630454400_1627776000_3", false);
    frozen_bucket(archive.path(), "db_1633046400_1630454400_4", true);
    frozen_bucket(archive.path(), "db_1580515200_1577836800_5", true);
    frozen_bucket(archive.path(), "db_notanumber_1609459200_6", true);

    let engine = ScriptedEngine {
        corrupt: HashSet::from(["db_1625097600_1622505600_2".to_string()]),
        broken_rebuilds: HashSet::from(["db_1633046400_1630454400_4".to_string()]),
        ..ScriptedEngine::default()
    };
    let config = RestoreConfig {
        archive_path: archive.path().to_path_buf(),
        staging_path: thawed.path().to_path_buf(),
        dest_index: "archive_main".to_string(),
        window,
        check_integrity: true,
        report_dir: Some(reports.path().to_path_buf()),
        show_progress: false,
        ..RestoreConfig::default()
    };

    let mut job = RestoreJob::<_, AwsCliStore>::new(config, engine, None);
    let summary = job.run().await.unwrap();

    assert_eq!(summary.found, 4);
    assert_eq!(summary.out_of_range, 1);
    assert_eq!(summary.skipped.len(), 1);
    assert_eq!(summary.integrity_passed, 2);
    assert_eq!(summary.integrity_failed, vec!["db_1625097600_1622505600_2"]);
    assert_eq!(summary.not_checkable, 1);
    assert_eq!(summary.copied, 3);
    assert!(summary.copy_errors.is_empty());
    assert_eq!(summary.rebuilt, 2);
    assert_eq!(summary.rebuild_failed[0].bucket, "db_1633046400_1630454400_4");
    assert!(!summary.restarted);
    assert_eq!(*summary.stages.last().unwrap(), JobStage::Done);
    assert!(!summary.stages.contains(&JobStage::Restart));

    let ledger = job.ledger();
    assert_eq!(ledger.len(), 4);
    assert_eq!(
        ledger["db_1630454400_1627776000_3"].integrity,
        Some(IntegrityVerdict::NotCheckable)
    );
    assert_eq!(
        ledger["db_1633046400_1630454400_4"].rebuild,
        Some(StepOutcome::Failed("exit code 2".to_string()))
    );

    let report_names: Vec<String> = fs::read_dir(reports.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(report_names.len(), 2);
    assert!(report_names.iter().any(|n| n.ends_with("_integrity_check.log")));
    assert!(report_names.iter().any(|n| n.ends_with("_buckets_rebuilt.log")));

    // the archive is left as it was
    assert_eq!(fs::read_dir(archive.path()).unwrap().count(), 6);
}
