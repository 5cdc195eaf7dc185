use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use thawsync::cleanup::{self, CleanupAction};
use thawsync::orchestrator::{local_range, remote_range};
use thawsync::remote::AwsCliStore;
use thawsync::scanner::{list_available_buckets, render_listing};
use thawsync::time_range::{parse_date_time, DATE_FORMAT};
use thawsync::types::DEFAULT_SPLUNK_HOME;
use thawsync::{RemoteSource, RestoreConfig, RestoreJob, SplunkEngine, TimeWindow};
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "thawsync")]
#[command(about = "Restore frozen Splunk buckets from local archives or S3 and rebuild them", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Restore and rebuild the buckets overlapping a time window
    Restore(RestoreArgs),
    /// Show the oldest and newest data available in an archive
    Range(RangeArgs),
    /// List the buckets in a frozen or thawed directory
    List {
        /// Directory holding one sub-directory per bucket
        path: PathBuf,
    },
    /// Find replicated duplicate buckets and show, move or remove them
    Cleanup(CleanupArgs),
}

#[derive(Args, Debug)]
struct RemoteArgs {
    /// S3 bucket holding the archive (objects keyed `<index>/<bucket>/rawdata/journal.*`)
    #[arg(long)]
    s3_bucket: Option<String>,

    /// Custom S3 endpoint URL (e.g. http://localhost:4566)
    #[arg(long, env = "AWS_ENDPOINT_URL")]
    s3_endpoint: Option<String>,
}

impl RemoteArgs {
    fn source(&self) -> Option<RemoteSource> {
        self.s3_bucket.as_ref().map(|bucket| RemoteSource {
            bucket: bucket.clone(),
            endpoint: self.s3_endpoint.clone(),
        })
    }
}

#[derive(Args, Debug)]
struct RestoreArgs {
    /// Frozen archive directory (download target when --s3-bucket is set)
    #[arg(short, long)]
    archive: PathBuf,

    /// Thawed directory the buckets are copied into
    #[arg(short, long)]
    thawed: PathBuf,

    /// Index the buckets are rebuilt into
    #[arg(short, long)]
    index: String,

    /// Start of the window, "YYYY-MM-DD HH:MM:SS" (UTC)
    #[arg(long)]
    start: String,

    /// End of the window, "YYYY-MM-DD HH:MM:SS" (UTC)
    #[arg(long)]
    end: String,

    /// Splunk installation root
    #[arg(long, env = "SPLUNK_HOME", default_value = DEFAULT_SPLUNK_HOME)]
    splunk_home: PathBuf,

    #[command(flatten)]
    remote: RemoteArgs,

    /// Run `splunk check-integrity` before copying
    #[arg(long)]
    check_integrity: bool,

    /// Restart Splunk after rebuilding
    #[arg(long)]
    restart: bool,

    /// Directory for the integrity and rebuild reports
    #[arg(long)]
    report_dir: Option<PathBuf>,

    /// Maximum integrity checks running at once
    #[arg(long, default_value = "4")]
    max_concurrent_checks: usize,

    /// Attempts per S3 object download
    #[arg(long, default_value = "3")]
    download_retries: usize,

    /// Hide progress bars
    #[arg(long)]
    no_progress: bool,

    /// Write the job summary as JSON to this file
    #[arg(long)]
    summary_json: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct RangeArgs {
    /// Local archive directory
    #[arg(short, long, required_unless_present = "s3_bucket")]
    archive: Option<PathBuf>,

    /// Index prefix in the S3 bucket
    #[arg(short, long, requires = "s3_bucket")]
    index: Option<String>,

    #[command(flatten)]
    remote: RemoteArgs,
}

#[derive(ValueEnum, Clone, Debug, PartialEq, Eq)]
enum CleanupCommand {
    Show,
    Move,
    Remove,
}

#[derive(Args, Debug)]
struct CleanupArgs {
    /// Frozen archive directory
    archive: PathBuf,

    /// Operation on the replicated duplicates
    #[arg(value_enum)]
    command: CleanupCommand,

    /// Destination for `move`
    #[arg(required_if_eq("command", "move"))]
    moving_path: Option<PathBuf>,
}

fn init_tracing(verbose: bool, log_file: Option<&PathBuf>) -> anyhow::Result<()> {
    let log_level = if verbose { "debug" } else { "info" };
    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(EnvFilter::new(format!("thawsync={}", log_level)))
        .with(fmt::layer())
        .with(file_layer)
        .init();
    Ok(())
}

async fn restore(args: RestoreArgs) -> anyhow::Result<()> {
    let window = TimeWindow::new(parse_date_time(&args.start)?, parse_date_time(&args.end)?);
    info!("Archive: {:?}", args.archive);
    info!("Thawed: {:?}", args.thawed);
    info!("Index: {}", args.index);
    info!("Window: {} - {} ({})", args.start, args.end, DATE_FORMAT);

    let config = RestoreConfig {
        archive_path: args.archive,
        staging_path: args.thawed,
        dest_index: args.index,
        window,
        splunk_home: args.splunk_home,
        remote: args.remote.source(),
        check_integrity: args.check_integrity,
        restart: args.restart,
        report_dir: args.report_dir,
        max_concurrent_checks: args.max_concurrent_checks,
        download_retries: args.download_retries,
        show_progress: !args.no_progress,
        ..RestoreConfig::default()
    };

    let engine = SplunkEngine::new(&config.splunk_home);
    engine.validate()?;
    let store = match &config.remote {
        Some(source) => {
            let store = AwsCliStore::new(source.clone());
            store.validate().await?;
            Some(store)
        }
        None => None,
    };

    let summary = RestoreJob::new(config, engine, store).run().await?;
    summary.log();
    if !summary.is_clean() {
        warn!("⚠️  Restore finished with failures, see the summary above and the reports");
    }

    if let Some(path) = args.summary_json {
        summary
            .write_json(&path)
            .with_context(|| format!("cannot write summary to {}", path.display()))?;
        info!("Summary written to {}", path.display());
    }
    Ok(())
}

async fn range(args: RangeArgs) -> anyhow::Result<()> {
    let available = match (args.remote.source(), args.archive) {
        (Some(source), _) => {
            let Some(index) = args.index else {
                bail!("--index is required with --s3-bucket");
            };
            let store = AwsCliStore::new(source);
            store.validate().await?;
            remote_range(&store, &index).await?
        }
        (None, Some(archive)) => local_range(&archive),
        (None, None) => bail!("either --archive or --s3-bucket is required"),
    };
    println!("{}", available.describe());
    Ok(())
}

fn clean_duplicates(args: CleanupArgs) -> anyhow::Result<()> {
    let action = match args.command {
        CleanupCommand::Show => CleanupAction::Show,
        CleanupCommand::Remove => CleanupAction::Remove,
        CleanupCommand::Move => match args.moving_path {
            Some(path) => CleanupAction::Move(path),
            None => bail!("a moving path is required for 'move'"),
        },
    };
    let report = cleanup::find_duplicates(&args.archive)?;
    let handled = cleanup::apply(&args.archive, &report, &action)?;
    if action == CleanupAction::Show {
        for name in handled {
            println!("{}", name);
        }
    }
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Restore(args) => restore(args).await,
        Command::Range(args) => range(args).await,
        Command::List { path } => {
            let listings = list_available_buckets(&path)?;
            println!("{}", render_listing(&listings));
            Ok(())
        }
        Command::Cleanup(args) => clean_duplicates(args),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.verbose, cli.log_file.as_ref()) {
        eprintln!("❌ Error: {:#}", e);
        std::process::exit(1);
    }

    info!("🧊 ThawSync - Splunk frozen bucket restore");

    match run(cli).await {
        Ok(()) => {
            info!("✅ Done");
        }
        Err(e) => {
            eprintln!("❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}
