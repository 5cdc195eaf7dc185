//! Subprocess seam to the external Splunk binary.
//!
//! Every call is an explicit argument vector with an explicit working
//! directory; nothing is passed through a shell and the process-wide working
//! directory is never changed.

use crate::error::RestoreError;
use std::ffi::OsStr;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Captured result of one external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit status was zero.
    pub success: bool,
    /// Exit code, if the process was not killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// stdout followed by stderr, the way a terminal would show it.
    pub fn combined(&self) -> String {
        let mut text = self.stdout.clone();
        text.push_str(&self.stderr);
        text
    }

    /// Short description of a failed run for logs and reports.
    pub fn failure_reason(&self) -> String {
        let status = match self.code {
            Some(code) => format!("exit code {}", code),
            None => "terminated by signal".to_string(),
        };
        let combined = self.combined();
        let tail = combined.trim();
        if tail.is_empty() {
            status
        } else {
            format!("{}: {}", status, last_line(tail))
        }
    }
}

fn last_line(text: &str) -> &str {
    text.lines().last().unwrap_or(text)
}

/// Operations the restore job needs from the data engine.
pub trait BucketEngine: Send + Sync {
    /// `check-integrity -bucketPath <path>`.
    fn check_integrity(
        &self,
        bucket_path: &Path,
    ) -> impl Future<Output = Result<CommandOutput, RestoreError>> + Send;

    /// `rebuild <path> <index>`.
    fn rebuild(
        &self,
        bucket_path: &Path,
        dest_index: &str,
    ) -> impl Future<Output = Result<CommandOutput, RestoreError>> + Send;

    /// `restart`.
    fn restart(&self) -> impl Future<Output = Result<CommandOutput, RestoreError>> + Send;
}

/// The real `$SPLUNK_HOME/bin/splunk` binary.
#[derive(Debug, Clone)]
pub struct SplunkEngine {
    binary: PathBuf,
    working_dir: PathBuf,
}

impl SplunkEngine {
    /// Engine for the installation rooted at `splunk_home`.
    ///
    /// A relative home is resolved against the current directory here, since
    /// the binary is later spawned from inside its own `bin` directory.
    pub fn new(splunk_home: &Path) -> Self {
        let home = std::path::absolute(splunk_home).unwrap_or_else(|_| splunk_home.to_path_buf());
        let working_dir = home.join("bin");
        Self {
            binary: working_dir.join("splunk"),
            working_dir,
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Fails with a configuration error if the binary is missing.
    pub fn validate(&self) -> Result<(), RestoreError> {
        if self.binary.is_file() {
            Ok(())
        } else {
            Err(RestoreError::Config(format!(
                "Splunk binary not found at: {}",
                self.binary.display()
            )))
        }
    }

    async fn run<I, S>(&self, args: I) -> Result<CommandOutput, RestoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut command = Command::new(&self.binary);
        command.args(args).current_dir(&self.working_dir);
        run_command(command, &self.binary.display().to_string()).await
    }
}

impl BucketEngine for SplunkEngine {
    async fn check_integrity(&self, bucket_path: &Path) -> Result<CommandOutput, RestoreError> {
        self.run([
            OsStr::new("check-integrity"),
            OsStr::new("-bucketPath"),
            bucket_path.as_os_str(),
        ])
        .await
    }

    async fn rebuild(
        &self,
        bucket_path: &Path,
        dest_index: &str,
    ) -> Result<CommandOutput, RestoreError> {
        self.run([
            OsStr::new("rebuild"),
            bucket_path.as_os_str(),
            OsStr::new(dest_index),
        ])
        .await
    }

    async fn restart(&self) -> Result<CommandOutput, RestoreError> {
        self.run(["restart"]).await
    }
}

/// Runs a prepared command to completion, capturing stdout and stderr.
pub(crate) async fn run_command(
    mut command: Command,
    program: &str,
) -> Result<CommandOutput, RestoreError> {
    debug!("Running {:?}", command.as_std());
    let output = command
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|source| RestoreError::Process {
            program: program.to_string(),
            source,
        })?;

    Ok(CommandOutput {
        success: output.status.success(),
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted engine for tests.

    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    /// Records every call and answers from per-bucket scripts.
    #[derive(Default)]
    pub struct FakeEngine {
        /// Integrity output per bucket directory name. Missing entries pass.
        pub integrity_output: HashMap<String, String>,
        /// Bucket directory names whose rebuild exits non-zero.
        pub failing_rebuilds: HashSet<String>,
        pub fail_restart: bool,
        pub calls: Mutex<Vec<String>>,
    }

    impl FakeEngine {
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    fn name_of(path: &Path) -> String {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn output(success: bool, text: &str) -> CommandOutput {
        CommandOutput {
            success,
            code: Some(if success { 0 } else { 1 }),
            stdout: text.to_string(),
            stderr: String::new(),
        }
    }

    impl BucketEngine for FakeEngine {
        async fn check_integrity(&self, bucket_path: &Path) -> Result<CommandOutput, RestoreError> {
            let name = name_of(bucket_path);
            self.record(format!("check-integrity {}", name));
            let text = self
                .integrity_output
                .get(&name)
                .cloned()
                .unwrap_or_else(|| "Integrity check: succeeded=1, failed=0".to_string());
            Ok(output(true, &text))
        }

        async fn rebuild(
            &self,
            bucket_path: &Path,
            dest_index: &str,
        ) -> Result<CommandOutput, RestoreError> {
            let name = name_of(bucket_path);
            self.record(format!("rebuild {} {}", name, dest_index));
            Ok(output(!self.failing_rebuilds.contains(&name), "rebuild finished"))
        }

        async fn restart(&self) -> Result<CommandOutput, RestoreError> {
            self.record("restart".to_string());
            Ok(output(!self.fail_restart, "splunkd restarted"))
        }
    }
}
