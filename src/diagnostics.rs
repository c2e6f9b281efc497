//! Diagnostics for the archive service.
//!
//! Provides:
//! - **Log rotation helpers**: used by `lib.rs` to configure rolling log files.
//! - **About info**: version and platform, logged at startup.
//! - **Archive health**: whether last night's archive ran and how many past
//!   days' orders are still live, for an operator-visible warning.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde_json::{json, Value};
use tracing::warn;

use crate::archive::ArchiveStore;
use crate::clock;
use crate::error::ArchiveError;
use crate::models::Order;
use crate::store::{decode_records, DocumentStore, ORDERS};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum number of log files to retain.
pub const MAX_LOG_FILES: usize = 10;

/// File name prefix of the rolling log (`archive.YYYY-MM-DD`).
pub const LOG_FILE_PREFIX: &str = "archive";

// ---------------------------------------------------------------------------
// About info
// ---------------------------------------------------------------------------

pub fn about_info() -> Value {
    json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "platform": std::env::consts::OS,
        "arch": std::env::consts::ARCH,
    })
}

// ---------------------------------------------------------------------------
// Archive health
// ---------------------------------------------------------------------------

/// Snapshot of the archive's state relative to `now`.
///
/// `pendingOrders` counts live orders from before today: after a healthy
/// night it is zero.
pub async fn archive_health<S: DocumentStore>(
    archive: &ArchiveStore<S>,
    now: NaiveDateTime,
) -> Result<Value, ArchiveError> {
    let dates = archive.get_available_archive_dates().await?;
    let yesterday = clock::format_date(clock::yesterday(now));

    let raw = archive
        .store()
        .list_all(ORDERS)
        .await
        .map_err(ArchiveError::read(ORDERS))?;
    let today = now.date();
    let pending = decode_records::<Order>(ORDERS, raw)
        .iter()
        .filter_map(|o| o.created_at.as_deref().and_then(clock::local_date))
        .filter(|d| *d < today)
        .count();

    Ok(json!({
        "lastArchiveDate": dates.first(),
        "yesterdayArchived": dates.contains(&yesterday),
        "pendingOrders": pending,
        "archivedDays": dates.len(),
    }))
}

// ---------------------------------------------------------------------------
// Log rotation
// ---------------------------------------------------------------------------

/// `{data_dir}/logs`.
pub fn log_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("logs")
}

/// Prune old log files, keeping only the most recent `MAX_LOG_FILES`.
/// Returns how many files were removed.
pub fn prune_old_logs(log_dir: &Path) -> usize {
    if !log_dir.exists() {
        return 0;
    }

    let prefix = format!("{LOG_FILE_PREFIX}.");
    let mut log_files: Vec<(PathBuf, std::time::SystemTime)> = Vec::new();
    if let Ok(entries) = fs::read_dir(log_dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let is_log = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|name| name.starts_with(&prefix));
            if is_log {
                let modified = entry
                    .metadata()
                    .ok()
                    .and_then(|m| m.modified().ok())
                    .unwrap_or(std::time::UNIX_EPOCH);
                log_files.push((path, modified));
            }
        }
    }

    // Newest first
    log_files.sort_by(|a, b| b.1.cmp(&a.1));

    let mut removed = 0;
    for (path, _) in log_files.iter().skip(MAX_LOG_FILES) {
        match fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(e) => warn!("Failed to prune log file {}: {e}", path.display()),
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, FixedClock};
    use crate::config::ArchiveConfig;
    use crate::store::SqliteDocumentStore;
    use std::sync::Arc;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("pos-archive-diag-{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_about_info_has_required_fields() {
        let info = about_info();
        assert_eq!(info["name"], "pos-archive");
        assert!(info.get("version").is_some());
        assert!(info.get("platform").is_some());
    }

    #[test]
    fn test_prune_keeps_newest_log_files() {
        let dir = temp_dir();
        fs::create_dir_all(&dir).unwrap();
        for day in 1..=12 {
            fs::write(dir.join(format!("archive.2024-01-{day:02}")), "log").unwrap();
        }
        fs::write(dir.join("notes.txt"), "keep").unwrap();

        assert_eq!(prune_old_logs(&dir), 2);
        let remaining = fs::read_dir(&dir).unwrap().count();
        assert_eq!(remaining, MAX_LOG_FILES + 1);
        assert!(dir.join("notes.txt").exists());
        assert_eq!(prune_old_logs(&dir), 0);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_prune_missing_dir_is_noop() {
        assert_eq!(prune_old_logs(&temp_dir()), 0);
    }

    #[tokio::test]
    async fn test_archive_health_reports_backlog() {
        let now = NaiveDateTime::parse_from_str("2024-01-16 09:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        let clock: Arc<dyn Clock> = Arc::new(FixedClock(now));
        let store = Arc::new(SqliteDocumentStore::in_memory().unwrap());
        for ts in ["2024-01-15T10:00:00", "2024-01-16T08:00:00"] {
            store
                .insert(ORDERS, json!({"payment_mode": "Cash", "total": 5, "created_at": ts}))
                .await
                .unwrap();
        }
        let archive = ArchiveStore::new(store, clock, &ArchiveConfig::default());

        let before = archive_health(&archive, now).await.unwrap();
        assert_eq!(before["pendingOrders"], 1);
        assert_eq!(before["yesterdayArchived"], false);
        assert!(before["lastArchiveDate"].is_null());

        archive.archive_yesterday().await.unwrap();
        let after = archive_health(&archive, now).await.unwrap();
        assert_eq!(after["pendingOrders"], 0);
        assert_eq!(after["yesterdayArchived"], true);
        assert_eq!(after["lastArchiveDate"], "2024-01-15");
    }
}
