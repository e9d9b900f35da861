#![forbid(unsafe_code)]

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kam_scores::ingest::{self, IngestSummary};
use kam_scores::month::{month_from_filename, MonthKey};
use kam_scores::scoring::{
    compute_scores_range, load_config_from_path, render_report_markdown, JsonlTraceSink,
    ScoreTraceSink, ScoringConfig,
};
use kam_scores::store::SqliteRecordStore;

#[derive(Parser)]
#[command(name = "kam-scores", version, about = "KAM monthly score CLI")]
struct Cli {
    /// SQLite store (defaults to $KAM_SCORES_STORE, then .kam_scores.sqlite)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Log progress to stderr (RUST_LOG overrides the filter)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replace one month with the rows of an upload
    Ingest {
        /// Month the upload belongs to; inferred from the file name when omitted
        #[arg(long)]
        month: Option<MonthKey>,
        #[arg(long)]
        file: PathBuf,
    },
    /// Ingest several uploads, one month each
    IngestBulk {
        #[arg(long = "file", required = true)]
        files: Vec<PathBuf>,
        /// One per file, in order; inferred from file names when omitted
        #[arg(long = "month")]
        months: Vec<MonthKey>,
    },
    /// List ingested months
    Months,
    /// Compute scores for a month range
    Scores {
        #[arg(long)]
        from: MonthKey,
        #[arg(long)]
        to: MonthKey,
        /// Write here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = ReportFormat::Json)]
        format: ReportFormat,
        /// Scoring constants as JSON
        #[arg(long)]
        config: Option<PathBuf>,
        /// JSONL file of per-project rule hits
        #[arg(long)]
        trace: Option<PathBuf>,
    },
    /// Export stored records to JSONL
    Export {
        #[arg(long)]
        out: PathBuf,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ReportFormat {
    Json,
    Md,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    if cli.verbose || std::env::var_os("RUST_LOG").is_some() {
        init_logging();
    }

    let store_path = cli.store.unwrap_or_else(SqliteRecordStore::default_path);

    match cli.command {
        Commands::Ingest { month, file } => {
            let month = match month {
                Some(month) => month,
                None => infer_month(&file)?,
            };
            let store = SqliteRecordStore::new(&store_path)?;
            let _lock = store.lock_exclusive()?;
            let summary = ingest::ingest_file(&store, month, &file).await?;
            print_summary(&summary);
        }
        Commands::IngestBulk { files, months } => {
            let store = SqliteRecordStore::new(&store_path)?;
            let _lock = store.lock_exclusive()?;
            for summary in ingest::ingest_bulk(&store, &files, &months).await? {
                print_summary(&summary);
            }
        }
        Commands::Months => {
            let store = SqliteRecordStore::new(&store_path)?;
            let months = store.list_months().await?;
            if months.is_empty() {
                println!("no months ingested");
            }
            for summary in months {
                println!(
                    "{}\t{} rows\t{} kams\t{}",
                    summary.month,
                    summary.rows,
                    summary.kams,
                    summary.source_name.as_deref().unwrap_or("-")
                );
            }
        }
        Commands::Scores {
            from,
            to,
            out,
            format,
            config,
            trace,
        } => {
            if to < from {
                return Err(format!("--to ({to}) must not be before --from ({from})").into());
            }
            let config = match config {
                Some(path) => load_config_from_path(path)?,
                None => ScoringConfig::default(),
            };
            let store = SqliteRecordStore::new(&store_path)?;

            let (trace_sink, trace_worker) = if let Some(path) = trace {
                let (sink, worker) = JsonlTraceSink::new(path)?;
                (Some(sink), Some(worker))
            } else {
                (None, None)
            };
            let trace_ref = trace_sink.as_ref().map(|sink| sink as &dyn ScoreTraceSink);

            let report = compute_scores_range(&store, from, to, &config, trace_ref).await?;

            drop(trace_sink);
            if let Some(worker) = trace_worker {
                worker.join()?;
            }

            let rendered = match format {
                ReportFormat::Json => serde_json::to_string_pretty(&report)?,
                ReportFormat::Md => render_report_markdown(&report),
            };
            match out {
                Some(path) => std::fs::write(path, rendered)?,
                None => {
                    let mut stdout = io::stdout().lock();
                    writeln!(stdout, "{rendered}")?;
                }
            }
        }
        Commands::Export { out } => {
            let store = SqliteRecordStore::new(&store_path)?;
            let rows = store.export_jsonl(&out).await?;
            println!("exported {rows} rows to {}", out.display());
        }
    }

    Ok(())
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kam_scores=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn infer_month(file: &Path) -> Result<MonthKey, Box<dyn std::error::Error>> {
    let name = file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    month_from_filename(&name)
        .ok_or_else(|| format!("cannot infer month from '{name}'; pass --month YYYY-MM").into())
}

fn print_summary(summary: &IngestSummary) {
    println!(
        "{}: {} rows from {} ({} skipped)",
        summary.month, summary.rows, summary.source_name, summary.skipped
    );
}
