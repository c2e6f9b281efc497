//! POS daily archive and settlement reporting.
//!
//! Moves each closed day of orders from the live collections into the
//! archive on a nightly timer, and builds settlement reports and accounting
//! exports over live or archived data with identical arithmetic.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod aggregation;
pub mod archive;
pub mod clock;
pub mod config;
pub mod db;
pub mod diagnostics;
pub mod error;
pub mod models;
pub mod money;
pub mod reports;
pub mod scheduler;
pub mod store;

pub use archive::{ArchiveRun, ArchiveStore, FailedOrder};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::ArchiveConfig;
pub use error::{ArchiveError, ConfigError, ReportError, StoreError};
pub use money::Money;
pub use reports::{AccountingExport, DataSource, ReportGenerator, ReportRange, SettlementReport};
pub use scheduler::{ArchiveScheduler, SchedulerState};
pub use store::{DocumentStore, SqliteDocumentStore};

/// Default filter when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "info,pos_archive_lib=debug";

/// Initialize structured logging (console + daily rolling file in
/// `{data_dir}/logs`).
///
/// The returned guard flushes the file writer on drop; hold it for the
/// lifetime of the process.
pub fn init_logging(data_dir: &Path) -> WorkerGuard {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let log_dir = diagnostics::log_dir(data_dir);
    std::fs::create_dir_all(&log_dir).ok();

    // Prune old log files before setting up the appender
    diagnostics::prune_old_logs(&log_dir);

    let file_appender = tracing_appender::rolling::daily(&log_dir, diagnostics::LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);
    let console_layer = fmt::layer().with_target(true);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    guard
}
