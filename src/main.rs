//! s3mirror -- download everything under a bucket prefix into a local tree.

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Args, Parser, Subcommand};
use tracing::{error, info, warn};

use s3mirror::config::{Config, LoggingConfig};
use s3mirror::mirror::{default_destination, download_one, MirrorOptions};
use s3mirror::store::aws::AwsStore;

/// Command-line arguments for s3mirror.
#[derive(Parser, Debug)]
#[command(
    name = "s3mirror",
    version,
    about = "Mirror an S3 bucket prefix into a local directory tree"
)]
struct Cli {
    /// Path to the YAML configuration file (optional).
    #[arg(short, long, default_value = "s3mirror.yaml")]
    config: PathBuf,

    /// Override the source bucket.
    #[arg(short, long, global = true)]
    bucket: Option<String>,

    /// Override the AWS region.
    #[arg(long, global = true)]
    region: Option<String>,

    /// Override the S3 endpoint (MinIO, LocalStack, ...).
    #[arg(long, global = true)]
    endpoint_url: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Mirror every object under a prefix (default).
    Mirror(MirrorArgs),
    /// Download a single object.
    Get {
        /// Object key.
        key: String,
        /// Destination file (defaults to the key's last segment).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Create a bucket in the configured region.
    CreateBucket {
        /// Bucket name.
        name: String,
    },
    /// List buckets visible to the credentials.
    Buckets,
}

#[derive(Args, Debug, Default)]
struct MirrorArgs {
    /// Only mirror keys starting with this prefix.
    #[arg(short, long)]
    prefix: Option<String>,

    /// Local directory to mirror into.
    #[arg(short, long)]
    local: Option<String>,

    /// Downloads in flight at once.
    #[arg(long)]
    concurrency: Option<usize>,

    /// Stop at the first failed download.
    #[arg(long)]
    fail_fast: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = s3mirror::config::load_config(&cli.config)?;
    if let Some(bucket) = cli.bucket {
        config.source.bucket = bucket;
    }
    if let Some(region) = cli.region {
        config.source.region = region;
    }
    if let Some(endpoint_url) = cli.endpoint_url {
        config.source.endpoint_url = endpoint_url;
    }

    init_tracing(&config.logging);
    info!("Loaded configuration from {}", cli.config.display());

    let metrics_file = config.observability.metrics_file.clone();
    if !metrics_file.is_empty() {
        s3mirror::metrics::init_metrics()?;
        s3mirror::metrics::describe_metrics();
    }

    let result = match cli.command.unwrap_or(Command::Mirror(MirrorArgs::default())) {
        Command::Mirror(args) => run_mirror(config, args).await,
        Command::Get { key, output } => run_get(&config, &key, output).await,
        Command::CreateBucket { name } => {
            let store = AwsStore::new(&config.source).await?;
            let region = config.source.region.clone();
            if s3mirror::bucket::create_bucket(&store, &name, Some(&region)).await {
                Ok(())
            } else {
                Err(anyhow::anyhow!("bucket {name} was not created"))
            }
        }
        Command::Buckets => {
            let store = AwsStore::new(&config.source).await?;
            for name in s3mirror::bucket::list_buckets(&store).await? {
                println!("{name}");
            }
            Ok(())
        }
    };

    if !metrics_file.is_empty() {
        if let Err(e) = s3mirror::metrics::write_textfile(Path::new(&metrics_file)) {
            warn!("Failed to write metrics to {}: {:#}", metrics_file, e);
        }
    }

    result
}

/// Initialize tracing from the logging config; `RUST_LOG` wins if set.
fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    let builder = log_builder(filter);
    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Lines read `<timestamp> <LEVEL> <message>`, without the module target.
fn log_builder(
    filter: tracing_subscriber::EnvFilter,
) -> tracing_subscriber::fmt::SubscriberBuilder<
    tracing_subscriber::fmt::format::DefaultFields,
    tracing_subscriber::fmt::format::Format,
    tracing_subscriber::EnvFilter,
> {
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
}

async fn run_mirror(mut config: Config, args: MirrorArgs) -> anyhow::Result<()> {
    if let Some(prefix) = args.prefix {
        config.mirror.prefix = prefix;
    }
    if let Some(local) = args.local {
        config.mirror.local_root = local;
    }
    if let Some(concurrency) = args.concurrency {
        config.mirror.concurrency = concurrency;
    }
    config.mirror.fail_fast |= args.fail_fast;
    config.check()?;

    let store = AwsStore::new(&config.source).await?;
    let options = MirrorOptions::from_config(&config);

    info!("Downloading...");
    let started = Instant::now();

    let report = s3mirror::mirror(&store, &options).await?;

    info!(
        "Downloaded in {:.2} seconds.",
        started.elapsed().as_secs_f64()
    );
    info!(
        "{} files ({} bytes), {} directories, {} pages",
        report.downloaded, report.bytes, report.directories, report.pages
    );
    if !report.skipped_unsafe.is_empty() {
        warn!(
            "{} keys skipped because they would escape {}",
            report.skipped_unsafe.len(),
            options.local_root.display()
        );
    }
    if !report.is_complete() {
        for failed in &report.failed {
            error!("  {}: {}", failed.key, failed.reason);
        }
        anyhow::bail!("{} object(s) failed to download", report.failed.len());
    }

    Ok(())
}

async fn run_get(config: &Config, key: &str, output: Option<PathBuf>) -> anyhow::Result<()> {
    config.check()?;
    let destination = match output {
        Some(path) => path,
        None => default_destination(key)
            .ok_or_else(|| anyhow::anyhow!("cannot derive a file name from key '{key}'"))?,
    };

    let store = AwsStore::new(&config.source).await?;
    let started = Instant::now();
    let bytes = download_one(&store, &config.source.bucket, key, &destination).await?;
    info!(
        "Downloaded {} bytes to {} in {:.2} seconds.",
        bytes,
        destination.display(),
        started.elapsed().as_secs_f64()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_text_lines_carry_level_and_message_only() {
        let buffer = LogBuffer::default();
        let writer = buffer.clone();
        let subscriber = log_builder(tracing_subscriber::EnvFilter::new("info"))
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            info!("downloaded - docs/readme.txt");
            tracing::debug!("filtered out");
        });

        let logs = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        let lines: Vec<&str> = logs.lines().collect();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains(" INFO "));
        assert!(lines[0].ends_with("INFO downloaded - docs/readme.txt"));
        assert!(!lines[0].contains("s3mirror"));
    }

    #[test]
    fn test_cli_defaults_to_mirror() {
        let cli = Cli::parse_from(["s3mirror", "--bucket", "kamleshtest1"]);
        assert_eq!(cli.bucket.as_deref(), Some("kamleshtest1"));
        assert!(cli.command.is_none());
    }
}
