//! ThawSync - Restore frozen Splunk buckets into a thawed index
//!
//! This library selects archived ("frozen") buckets whose time span overlaps a
//! requested window, optionally downloads them from an S3-compatible store,
//! optionally runs `splunk check-integrity` on them, copies them into a thawed
//! directory and rebuilds each one with `splunk rebuild`.
//!
//! # Features
//!
//! - **Window Selection**: Buckets are matched on the epochs encoded in their names
//! - **Remote Archives**: Resumable, verified downloads through the `aws` CLI
//! - **Integrity Checks**: Concurrent `check-integrity` runs with conservative verdicts
//! - **Continue on Error**: One bad bucket never stops the rest of the restore
//! - **Audit Reports**: Timestamped integrity and rebuild logs
//!
//! # Example
//!
//! ```no_run
//! use thawsync::{RestoreConfig, RestoreJob, SplunkEngine, TimeWindow};
//! use thawsync::remote::AwsCliStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RestoreConfig {
//!     archive_path: "/opt/splunk/var/lib/splunk/wineventlog/frozendb".into(),
//!     staging_path: "/opt/splunk/var/lib/splunk/archive_wineventlog/thaweddb".into(),
//!     dest_index: "archive_wineventlog".to_string(),
//!     window: TimeWindow::new(1615593600, 1615852800),
//!     check_integrity: true,
//!     ..RestoreConfig::default()
//! };
//!
//! let engine = SplunkEngine::new(&config.splunk_home);
//! let summary = RestoreJob::<_, AwsCliStore>::new(config, engine, None).run().await?;
//! summary.log();
//! # Ok(())
//! # }
//! ```

pub mod bucket_name;
pub mod cleanup;
pub mod download;
pub mod engine;
pub mod error;
pub mod integrity;
pub mod orchestrator;
mod progress;
pub mod rebuild;
pub mod remote;
pub mod report;
pub mod scanner;
pub mod stage;
pub mod time_range;
pub mod types;
mod verify;

// Re-export commonly used items
pub use engine::{BucketEngine, CommandOutput, SplunkEngine};
pub use error::{BucketNameError, RestoreError};
pub use orchestrator::{AvailableRange, BucketLedger, BucketRecord, JobSummary, RestoreJob, StepOutcome};
pub use remote::ObjectStore;
pub use types::{Bucket, IntegrityVerdict, JobStage, RemoteSource, RestoreConfig, TimeWindow};
