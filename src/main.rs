//! Linkbucket CLI
//!
//! Command-line interface for bucketing link events:
//! - Ingest record files into the bucket store
//! - Dump every (bucket, link) pair
//! - Generate random test input
//! - Write a default config file

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use linkbucket::config::{generate_default_config, Config, LoggingConfig};
use linkbucket::{
    generate_lines, open_store, read_files, BucketIterator, BucketStore, BucketWidth,
    GeneratorConfig, IngestPipeline, IngestReport,
};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "linkbucket")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Group link events into fixed-width time buckets")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: standard locations, then environment)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format for dump and run
    #[arg(short, long, value_enum, default_value = "text", global = true)]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OutputFormat {
    Text,
    Csv,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ingest record files into the store
    Ingest {
        /// Files with `<time>,<link>` lines or JSON lines
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Bucket width in seconds (overrides config)
        #[arg(short, long)]
        width: Option<i64>,
        /// Keep existing store contents
        #[arg(long)]
        no_reset: bool,
    },

    /// Print every (bucket, link) pair in the store
    Dump,

    /// Ingest files, then dump the result
    Run {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[arg(short, long)]
        width: Option<i64>,
        #[arg(long)]
        no_reset: bool,
    },

    /// Generate random `<time>,<link>` lines
    Generate {
        /// Number of lines
        #[arg(short = 'n', long, default_value = "50000")]
        count: usize,
        /// Spread timestamps over the last N seconds
        #[arg(long, default_value = "18000")]
        window_secs: i64,
        /// Highest link number
        #[arg(long, default_value = "1001")]
        max_link: u32,
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };

    init_logging(&config.logging);

    match cli.command {
        Commands::Ingest {
            files,
            width,
            no_reset,
        } => {
            if let Some(w) = width {
                config.bucket.width = w;
            }
            config.validate()?;

            let store = open_store(&config.store)?;
            let report = ingest_files(&config, store.clone(), &files, !no_reset).await?;
            println!("Ingested {} events ({} skipped)", report.processed, report.skipped);
            store.close().await?;
        }

        Commands::Dump => {
            config.validate()?;

            let store = open_store(&config.store)?;
            dump(&config, store.clone(), cli.format).await?;
            store.close().await?;
        }

        Commands::Run {
            files,
            width,
            no_reset,
        } => {
            if let Some(w) = width {
                config.bucket.width = w;
            }
            config.validate()?;

            let store = open_store(&config.store)?;
            ingest_files(&config, store.clone(), &files, !no_reset).await?;
            dump(&config, store.clone(), cli.format).await?;
            store.close().await?;
        }

        Commands::Generate {
            count,
            window_secs,
            max_link,
            output,
        } => {
            anyhow::ensure!(max_link >= 1, "--max-link must be at least 1");

            let generator = GeneratorConfig {
                count,
                window_secs,
                links: 1..=max_link,
            };
            let lines = generate_lines(&generator, chrono::Utc::now().timestamp())?;
            let mut text = lines.join("\n");
            text.push('\n');

            match output {
                Some(path) => {
                    std::fs::write(&path, text)
                        .with_context(|| format!("writing {:?}", path))?;
                    tracing::info!("Wrote {} lines to {:?}", count, path);
                }
                None => print!("{}", text),
            }
        }

        Commands::Config { output } => {
            let content = generate_default_config();
            match output {
                Some(path) => {
                    std::fs::write(&path, content)
                        .with_context(|| format!("writing {:?}", path))?;
                    println!("Config written to {:?}", path);
                }
                None => print!("{}", content),
            }
        }
    }

    Ok(())
}

fn init_logging(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| format!("linkbucket={}", logging.level)),
    );

    // Logs go to stderr so dumped pairs on stdout stay clean
    if logging.format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn ingest_files(
    config: &Config,
    store: Arc<dyn BucketStore>,
    files: &[PathBuf],
    reset: bool,
) -> anyhow::Result<IngestReport> {
    let width = BucketWidth::new(config.bucket.width)?;
    let pipeline =
        IngestPipeline::new(store, width).with_concurrency(config.ingest.concurrency);

    if reset && config.ingest.reset_on_start {
        pipeline.start_clean().await?;
    }

    let records = read_files(files)?;
    let report = pipeline
        .ingest_records(records, config.ingest.on_malformed)
        .await?;
    Ok(report)
}

async fn dump(
    config: &Config,
    store: Arc<dyn BucketStore>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let iterator =
        BucketIterator::new(store).with_lookup_concurrency(config.iterate.lookup_concurrency);

    match write_pairs(&iterator, std::io::stdout().lock(), format).await {
        // Reader went away (`dump | head`); nothing left to report
        Err(e) if is_broken_pipe(&e) => {
            tracing::debug!("Output closed early: {}", e);
            Ok(())
        }
        other => other,
    }
}

/// Write every (bucket, link) pair to `out` in the given format.
///
/// After the first write error nothing more is written; iteration still
/// runs to completion and the error is returned.
async fn write_pairs<S, W>(
    iterator: &BucketIterator<S>,
    mut out: W,
    format: OutputFormat,
) -> anyhow::Result<()>
where
    S: BucketStore + ?Sized,
    W: Write,
{
    let mut write_error: Option<std::io::Error> = None;

    match format {
        OutputFormat::Text => {
            iterator
                .iterate(|bucket, link| {
                    if write_error.is_none() {
                        if let Err(e) = writeln!(out, "time: {} link: {}", bucket, link) {
                            write_error = Some(e);
                        }
                    }
                })
                .await?;
        }
        OutputFormat::Csv => {
            let mut writer = csv::Writer::from_writer(&mut out);
            writer
                .write_record(["bucket", "link"])
                .map_err(std::io::Error::from)?;

            iterator
                .iterate(|bucket, link| {
                    if write_error.is_none() {
                        if let Err(e) = writer.write_record([bucket.to_string().as_str(), link]) {
                            write_error = Some(e.into());
                        }
                    }
                })
                .await?;

            if write_error.is_none() {
                writer.flush()?;
            }
        }
        OutputFormat::Json => {
            let buckets = iterator.collect().await?;
            let body: Vec<serde_json::Value> = buckets
                .into_iter()
                .map(|(bucket, links)| serde_json::json!({ "bucket": bucket, "links": links }))
                .collect();

            serde_json::to_writer_pretty(&mut out, &body).map_err(std::io::Error::from)?;
            writeln!(out)?;
        }
    }

    if let Some(e) = write_error {
        return Err(e.into());
    }
    out.flush()?;
    Ok(())
}

fn is_broken_pipe(err: &anyhow::Error) -> bool {
    err.downcast_ref::<std::io::Error>()
        .is_some_and(|e| e.kind() == std::io::ErrorKind::BrokenPipe)
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkbucket::{Event, MemoryStore};

    /// Accepts `lines` complete lines, then fails with a broken pipe
    struct ClosingWriter {
        written: Vec<u8>,
        lines: usize,
        failures: usize,
    }

    impl ClosingWriter {
        fn new(lines: usize) -> Self {
            Self {
                written: Vec::new(),
                lines,
                failures: 0,
            }
        }
    }

    impl Write for ClosingWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            let done = self.written.iter().filter(|&&b| b == b'\n').count();
            if done >= self.lines {
                self.failures += 1;
                return Err(std::io::ErrorKind::BrokenPipe.into());
            }
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    async fn sample_iterator() -> BucketIterator<MemoryStore> {
        let store = Arc::new(MemoryStore::new().with_page_size(2));
        let events: Vec<Event> = (0..20).map(|i| Event::new(i * 300, format!("link-{}", i))).collect();
        IngestPipeline::new(store.clone(), BucketWidth::new(300).unwrap())
            .ingest(events)
            .await
            .unwrap();
        BucketIterator::new(store)
    }

    #[tokio::test]
    async fn test_text_output() {
        let iterator = sample_iterator().await;
        let mut out = Vec::new();
        write_pairs(&iterator, &mut out, OutputFormat::Text).await.unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 20);
        assert!(text.contains("time: 600 link: link-2\n"));
    }

    #[tokio::test]
    async fn test_closed_output_stops_writing() {
        let iterator = sample_iterator().await;
        let mut out = ClosingWriter::new(3);

        let err = write_pairs(&iterator, &mut out, OutputFormat::Text)
            .await
            .unwrap_err();

        assert!(is_broken_pipe(&err));
        assert_eq!(out.failures, 1);
        assert_eq!(String::from_utf8(out.written).unwrap().lines().count(), 3);
    }

    #[tokio::test]
    async fn test_closed_output_csv() {
        let iterator = sample_iterator().await;
        let mut out = ClosingWriter::new(0);

        let err = write_pairs(&iterator, &mut out, OutputFormat::Csv)
            .await
            .unwrap_err();
        assert!(is_broken_pipe(&err));
    }

    #[test]
    fn test_broken_pipe_detection() {
        let err = anyhow::Error::from(std::io::Error::from(std::io::ErrorKind::BrokenPipe));
        assert!(is_broken_pipe(&err));
        assert!(!is_broken_pipe(&anyhow::anyhow!("other")));
    }
}
