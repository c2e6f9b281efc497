use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};

use pos_archive_lib::clock::{format_date, yesterday};
use pos_archive_lib::{
    config, diagnostics, ArchiveConfig, ArchiveScheduler, ArchiveStore, Clock, DataSource,
    ReportGenerator, ReportRange, SqliteDocumentStore, SystemClock,
};

#[derive(Parser)]
#[command(name = "pos-archive")]
#[command(about = "Nightly order archival and settlement reports for the POS")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the nightly archive scheduler until Ctrl-C (default).
    Run,
    /// Archive one day now (`YYYY-MM-DD`), e.g. to backfill a missed night.
    Archive { date: String },
    /// Print the settlement report for a day or an inclusive range.
    Report {
        start: String,
        end: Option<String>,
        #[arg(long, value_enum, default_value_t = SourceCli::Live)]
        source: SourceCli,
    },
    /// Print an accounting export as CSV.
    Export {
        start: String,
        end: Option<String>,
        #[arg(long, value_enum, default_value_t = SourceCli::Live)]
        source: SourceCli,
        #[arg(long, value_enum, default_value_t = ExportKind::Orders)]
        kind: ExportKind,
    },
    /// Print the archive screen's CSV for one archived day.
    ArchiveCsv { date: String },
}

#[derive(Copy, Clone, ValueEnum)]
enum SourceCli {
    Live,
    Archived,
    Both,
}

impl From<SourceCli> for DataSource {
    fn from(value: SourceCli) -> Self {
        match value {
            SourceCli::Live => DataSource::Live,
            SourceCli::Archived => DataSource::Archived,
            SourceCli::Both => DataSource::Both,
        }
    }
}

#[derive(Copy, Clone, ValueEnum)]
enum ExportKind {
    Orders,
    Lines,
    Daily,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let data_dir = config::data_dir();
    let _log_guard = pos_archive_lib::init_logging(&data_dir);
    info!(about = %diagnostics::about_info(), "Starting");

    let store = Arc::new(SqliteDocumentStore::open(&data_dir).map_err(|e| anyhow!(e))?);
    let archive_config = {
        let conn = store
            .db()
            .conn
            .lock()
            .map_err(|e| anyhow!("Database lock poisoned: {e}"))?;
        ArchiveConfig::load(&conn).context("Failed to load archive config")?
    };
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let archive = Arc::new(ArchiveStore::new(store.clone(), clock.clone(), &archive_config));
    let reports = ReportGenerator::new(store, archive_config.top_products_limit);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_scheduler(archive, clock, archive_config).await,
        Commands::Archive { date } => {
            let run = archive.archive_date(&date).await?;
            println!("{}", serde_json::to_string_pretty(&run)?);
            if !run.is_complete() {
                warn!(
                    date = %run.archive_date,
                    failed = run.failed.len(),
                    "Archive run left orders in the live store"
                );
            }
            Ok(())
        }
        Commands::Report { start, end, source } => {
            let range = parse_range(&start, end.as_deref(), source)?;
            let report = reports.build_settlement_report(&range).await?;
            print!("{}", report.render_text());
            Ok(())
        }
        Commands::Export {
            start,
            end,
            source,
            kind,
        } => {
            let range = parse_range(&start, end.as_deref(), source)?;
            let export = reports.build_accounting_export(&range).await?;
            let drifted = export.drifted_orders().count();
            if drifted > 0 {
                warn!(drifted, "Orders whose line items do not add up to the subtotal");
            }
            let csv = match kind {
                ExportKind::Orders => export.orders_csv()?,
                ExportKind::Lines => export.lines_csv()?,
                ExportKind::Daily => export.daily_csv()?,
            };
            print!("{csv}");
            Ok(())
        }
        Commands::ArchiveCsv { date } => {
            print!("{}", reports.export_archived_orders_csv(&date).await?);
            Ok(())
        }
    }
}

fn parse_range(start: &str, end: Option<&str>, source: SourceCli) -> anyhow::Result<ReportRange> {
    Ok(ReportRange::parse(start, end.unwrap_or(start), source.into())?)
}

async fn run_scheduler(
    archive: Arc<ArchiveStore<SqliteDocumentStore>>,
    clock: Arc<dyn Clock>,
    archive_config: ArchiveConfig,
) -> anyhow::Result<()> {
    let now = clock.now();
    match diagnostics::archive_health(&archive, now).await {
        Ok(health) => {
            if health["yesterdayArchived"] == false {
                warn!(
                    yesterday = %format_date(yesterday(now)),
                    %health,
                    "Yesterday has not been archived yet"
                );
            } else {
                info!(%health, "Archive health");
            }
        }
        Err(e) => warn!("Archive health check failed: {e}"),
    }

    let scheduler = ArchiveScheduler::new(archive, clock, archive_config);
    let handle = scheduler.start();

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    scheduler.stop();
    handle.await.context("Archive scheduler task panicked")?;
    if let Some(last) = scheduler.last_run() {
        info!(?last, "Last archive run");
    }
    Ok(())
}
