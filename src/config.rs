//! Runtime configuration for the archive job.
//!
//! Defaults cover a single-store install; any value can be overridden in the
//! `local_settings` table under the `archive` category, e.g.
//! `('archive', 'target_hour', '3')`.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use rusqlite::Connection;
use tracing::debug;

use crate::db;
use crate::error::ConfigError;

/// Settings category read by [`ArchiveConfig::load`].
pub const SETTINGS_CATEGORY: &str = "archive";

/// Overrides the data directory (database and logs).
pub const DATA_DIR_ENV: &str = "POS_ARCHIVE_DATA_DIR";

const APP_DIR_NAME: &str = "pos-archive";

/// Upper bound for the report's top-products list.
pub const MAX_TOP_PRODUCTS: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveConfig {
    /// Local wall-clock hour of the nightly run (0-23).
    pub target_hour: u32,
    pub target_minute: u32,
    /// Upper bound for migrating one order (write + deletes).
    pub step_timeout: Duration,
    /// Same-night retries after a failed or partial run.
    pub retry_attempts: u32,
    pub retry_delay: Duration,
    pub top_products_limit: usize,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            target_hour: 2,
            target_minute: 0,
            step_timeout: Duration::from_secs(30),
            retry_attempts: 1,
            retry_delay: Duration::from_secs(15 * 60),
            top_products_limit: 10,
        }
    }
}

impl ArchiveConfig {
    /// Defaults overlaid with whatever `local_settings` holds.
    pub fn load(conn: &Connection) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            target_hour: read(conn, "target_hour", defaults.target_hour)?,
            target_minute: read(conn, "target_minute", defaults.target_minute)?,
            step_timeout: Duration::from_secs(read(
                conn,
                "step_timeout_secs",
                defaults.step_timeout.as_secs(),
            )?),
            retry_attempts: read(conn, "retry_attempts", defaults.retry_attempts)?,
            retry_delay: Duration::from_secs(read(
                conn,
                "retry_delay_secs",
                defaults.retry_delay.as_secs(),
            )?),
            top_products_limit: read(conn, "top_products_limit", defaults.top_products_limit)?,
        };
        config.validate()?;
        debug!(?config, "Archive config loaded");
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.target_hour > 23 {
            return Err(invalid("target_hour", self.target_hour));
        }
        if self.target_minute > 59 {
            return Err(invalid("target_minute", self.target_minute));
        }
        if self.step_timeout.is_zero() {
            return Err(invalid("step_timeout_secs", 0));
        }
        if !(1..=MAX_TOP_PRODUCTS).contains(&self.top_products_limit) {
            return Err(invalid("top_products_limit", self.top_products_limit));
        }
        Ok(())
    }
}

fn read<T: FromStr>(conn: &Connection, key: &str, default: T) -> Result<T, ConfigError> {
    match db::get_setting(conn, SETTINGS_CATEGORY, key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw,
        }),
    }
}

fn invalid(key: &str, value: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

/// Directory holding the database and `logs/`.
///
/// `POS_ARCHIVE_DATA_DIR` wins; otherwise the platform's local data dir.
pub fn data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(dir);
    }
    let base = std::env::var("LOCALAPPDATA")
        .or_else(|_| std::env::var("XDG_DATA_HOME"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            #[cfg(target_os = "windows")]
            {
                PathBuf::from(std::env::var("USERPROFILE").unwrap_or_else(|_| ".".into()))
                    .join("AppData")
                    .join("Local")
            }
            #[cfg(not(target_os = "windows"))]
            {
                PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()))
                    .join(".local")
                    .join("share")
            }
        });
    base.join(APP_DIR_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_defaults_when_nothing_stored() {
        let db = db::init_in_memory().expect("init");
        let conn = db.conn.lock().unwrap();
        assert_eq!(ArchiveConfig::load(&conn).unwrap(), ArchiveConfig::default());
        let d = ArchiveConfig::default();
        assert_eq!((d.target_hour, d.target_minute), (2, 0));
        assert_eq!(d.top_products_limit, 10);
    }

    #[test]
    fn test_overrides_from_local_settings() {
        let db = db::init_in_memory().expect("init");
        let conn = db.conn.lock().unwrap();
        db::set_setting(&conn, SETTINGS_CATEGORY, "target_hour", "4").unwrap();
        db::set_setting(&conn, SETTINGS_CATEGORY, "retry_attempts", "0").unwrap();
        db::set_setting(&conn, SETTINGS_CATEGORY, "step_timeout_secs", " 5 ").unwrap();
        let config = ArchiveConfig::load(&conn).unwrap();
        assert_eq!(config.target_hour, 4);
        assert_eq!(config.retry_attempts, 0);
        assert_eq!(config.step_timeout, Duration::from_secs(5));
        assert_eq!(config.retry_delay, Duration::from_secs(900));
    }

    #[test]
    fn test_rejects_bad_values() {
        let db = db::init_in_memory().expect("init");
        let conn = db.conn.lock().unwrap();
        db::set_setting(&conn, SETTINGS_CATEGORY, "target_hour", "two").unwrap();
        assert!(matches!(
            ArchiveConfig::load(&conn),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "target_hour"
        ));
        db::set_setting(&conn, SETTINGS_CATEGORY, "target_hour", "24").unwrap();
        assert!(ArchiveConfig::load(&conn).is_err());
    }

    #[test]
    fn test_top_products_limit_is_bounded() {
        let db = db::init_in_memory().expect("init");
        let conn = db.conn.lock().unwrap();
        db::set_setting(&conn, SETTINGS_CATEGORY, "top_products_limit", "5").unwrap();
        assert_eq!(ArchiveConfig::load(&conn).unwrap().top_products_limit, 5);

        for bad in ["11", "0"] {
            db::set_setting(&conn, SETTINGS_CATEGORY, "top_products_limit", bad).unwrap();
            assert!(matches!(
                ArchiveConfig::load(&conn),
                Err(ConfigError::InvalidValue { ref key, .. }) if key == "top_products_limit"
            ));
        }
    }

    #[test]
    #[serial]
    fn test_data_dir_env_override() {
        std::env::set_var(DATA_DIR_ENV, "/tmp/pos-archive-test");
        assert_eq!(data_dir(), PathBuf::from("/tmp/pos-archive-test"));
        std::env::remove_var(DATA_DIR_ENV);
    }

    #[test]
    #[serial]
    fn test_data_dir_default_is_app_scoped() {
        std::env::remove_var(DATA_DIR_ENV);
        assert!(data_dir().ends_with(APP_DIR_NAME));
    }
}
