//! Day-close archival: moves one calendar day of orders out of the live
//! collections into `archived_orders` and records a summary per day.
//!
//! The store has no transactions, so each order is migrated as a small saga:
//!
//! 1. write the archived copy (skipped if one already exists for the order)
//! 2. delete the order's line items
//! 3. delete the order
//!
//! A crash or failure between steps leaves the order either still live (and
//! picked up by the next run) or already archived (the next run only
//! finishes the deletes). The day's metadata is written last, only when
//! every order of the run made it, and is derived from what the archive
//! holds for the date rather than from the run itself.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::aggregation;
use crate::clock::{self, Clock};
use crate::config::ArchiveConfig;
use crate::error::ArchiveError;
use crate::models::{ArchiveMetadata, ArchivedOrder, LineItem, Order};
use crate::money::Money;
use crate::store::{
    decode_records, DocumentStore, ARCHIVED_ORDERS, ARCHIVE_METADATA, ORDERS, ORDER_ITEMS,
};

/// An order the run could not migrate. It stays where it was and is retried
/// by the next run for the same date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedOrder {
    pub order_id: String,
    pub reason: String,
}

/// Outcome of one `archive_day` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveRun {
    pub archive_date: String,
    /// Orders migrated by this call.
    pub archived_count: u64,
    /// `sum(total)` over the orders migrated by this call.
    pub total_revenue: Money,
    pub failed: Vec<FailedOrder>,
    pub metadata_written: bool,
}

impl ArchiveRun {
    fn empty(archive_date: String) -> Self {
        ArchiveRun {
            archive_date,
            archived_count: 0,
            total_revenue: Money::ZERO,
            failed: Vec::new(),
            metadata_written: false,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct ArchiveStore<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    step_timeout: Duration,
    date_locks: Mutex<HashMap<NaiveDate, Arc<tokio::sync::Mutex<()>>>>,
}

impl<S: DocumentStore> ArchiveStore<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, config: &ArchiveConfig) -> Self {
        ArchiveStore {
            store,
            clock,
            step_timeout: config.step_timeout,
            date_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Archive the day before the clock's current date.
    pub async fn archive_yesterday(&self) -> Result<ArchiveRun, ArchiveError> {
        self.archive_day(clock::yesterday(self.clock.now())).await
    }

    /// Archive a `YYYY-MM-DD` date (manual or backfill trigger).
    pub async fn archive_date(&self, date: &str) -> Result<ArchiveRun, ArchiveError> {
        let day = clock::parse_date(date).ok_or_else(|| ArchiveError::InvalidDate(date.to_string()))?;
        self.archive_day(day).await
    }

    /// Migrate every live order created on `date` (local time).
    ///
    /// Read failures of the live orders abort the run. Per-order failures,
    /// timeouts included, are collected in [`ArchiveRun::failed`] and the run
    /// moves on; metadata is then left unwritten for the date.
    pub async fn archive_day(&self, date: NaiveDate) -> Result<ArchiveRun, ArchiveError> {
        let lock = self.date_lock(date);
        let result = {
            let _guard = lock.lock().await;
            self.archive_day_locked(date).await
        };
        drop(lock);
        self.release_date_locks();
        result
    }

    async fn archive_day_locked(&self, date: NaiveDate) -> Result<ArchiveRun, ArchiveError> {
        let archive_date = clock::format_date(date);
        info!(%archive_date, "Archive run started");

        let raw = self
            .store
            .list_all(ORDERS)
            .await
            .map_err(ArchiveError::read(ORDERS))?;
        let (orders, undecodable) = live_orders_on(raw, date);

        if orders.is_empty() && undecodable.is_empty() {
            let mut run = ArchiveRun::empty(archive_date);
            run.metadata_written = self.repair_metadata(&run.archive_date).await?;
            info!(archive_date = %run.archive_date, "No live orders to archive");
            return Ok(run);
        }

        debug!(%archive_date, candidates = orders.len(), "Migrating orders");

        let mut run = ArchiveRun::empty(archive_date);
        run.failed = undecodable;
        let mut migrated: Vec<Order> = Vec::with_capacity(orders.len());
        for order in orders {
            let outcome = tokio::time::timeout(self.step_timeout, self.migrate_order(&order))
                .await
                .unwrap_or_else(|_| Err(ArchiveError::Timeout(self.step_timeout)));
            match outcome {
                Ok(()) => migrated.push(order),
                Err(e) => {
                    warn!(order_id = %order.id, error = %e, "Order migration failed");
                    run.failed.push(FailedOrder {
                        order_id: order.id.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        run.archived_count = migrated.len() as u64;
        run.total_revenue = aggregation::total_revenue(&migrated);

        if run.is_complete() {
            run.metadata_written = self.write_metadata(&run.archive_date).await?;
            info!(
                archive_date = %run.archive_date,
                archived = run.archived_count,
                revenue = %run.total_revenue,
                "Archive run complete"
            );
        } else {
            error!(
                archive_date = %run.archive_date,
                archived = run.archived_count,
                failed = run.failed.len(),
                "Archive run incomplete; metadata not written"
            );
        }
        Ok(run)
    }

    fn date_lock(&self, date: NaiveDate) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.date_locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(date).or_default().clone()
    }

    /// Forget locks no run is holding or waiting on.
    fn release_date_locks(&self) {
        let mut locks = self.date_locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    async fn migrate_order(&self, order: &Order) -> Result<(), ArchiveError> {
        if order.id.is_empty() {
            return Err(ArchiveError::MissingId(ORDERS));
        }
        let order_key = json!(order.id);

        let raw_items = self
            .store
            .list_where(ORDER_ITEMS, "order_id", &order_key)
            .await
            .map_err(ArchiveError::read(ORDER_ITEMS))?;
        let (item_ids, items) = decode_items(raw_items)?;

        let already_archived = !self
            .store
            .list_where(ARCHIVED_ORDERS, "original_order_id", &order_key)
            .await
            .map_err(ArchiveError::read(ARCHIVED_ORDERS))?
            .is_empty();

        if already_archived {
            debug!(order_id = %order.id, "Already archived; finishing live cleanup");
        } else {
            let archived_date = order
                .created_at
                .as_deref()
                .and_then(clock::local_date)
                .map(clock::format_date)
                .unwrap_or_default();
            let record = ArchivedOrder::from_live(order, items, archived_date, self.clock.now_rfc3339());
            let body = serde_json::to_value(&record).map_err(|e| ArchiveError::InvalidRecord {
                collection: ARCHIVED_ORDERS,
                id: order.id.clone(),
                source: e,
            })?;
            self.store
                .insert(ARCHIVED_ORDERS, body)
                .await
                .map_err(ArchiveError::write(ARCHIVED_ORDERS))?;
        }

        for item_id in &item_ids {
            self.store
                .delete(ORDER_ITEMS, item_id)
                .await
                .map_err(ArchiveError::write(ORDER_ITEMS))?;
        }
        self.store
            .delete(ORDERS, &order.id)
            .await
            .map_err(ArchiveError::write(ORDERS))?;
        Ok(())
    }

    /// Summary of what the archive holds for `archive_date`, one entry per
    /// original order.
    async fn derive_metadata(&self, archive_date: &str) -> Result<ArchiveMetadata, ArchiveError> {
        let archived = self.get_archived_orders_by_date(archive_date).await?;
        let mut seen = HashSet::new();
        let mut order_ids = Vec::new();
        let mut total_revenue = Money::ZERO;
        for record in archived {
            if seen.insert(record.original_order_id.clone()) {
                total_revenue += record.total;
                order_ids.push(record.original_order_id);
            }
        }
        Ok(ArchiveMetadata {
            id: String::new(),
            archive_date: archive_date.to_string(),
            archived_at: self.clock.now_rfc3339(),
            total_orders: order_ids.len() as u64,
            total_revenue,
            order_ids,
        })
    }

    /// Write (or replace) the metadata for a date. Returns whether a new
    /// record was written; an existing record that already matches is kept.
    async fn write_metadata(&self, archive_date: &str) -> Result<bool, ArchiveError> {
        let fresh = self.derive_metadata(archive_date).await?;
        let existing = self.metadata_records(archive_date).await?;

        if existing.iter().any(|m| same_summary(m, &fresh)) && existing.len() == 1 {
            debug!(%archive_date, "Archive metadata already current");
            return Ok(false);
        }

        let body = serde_json::to_value(&fresh).map_err(|e| ArchiveError::InvalidRecord {
            collection: ARCHIVE_METADATA,
            id: archive_date.to_string(),
            source: e,
        })?;
        self.store
            .insert(ARCHIVE_METADATA, body)
            .await
            .map_err(ArchiveError::write(ARCHIVE_METADATA))?;
        for old in existing {
            self.store
                .delete(ARCHIVE_METADATA, &old.id)
                .await
                .map_err(ArchiveError::write(ARCHIVE_METADATA))?;
        }
        info!(
            %archive_date,
            total_orders = fresh.total_orders,
            total_revenue = %fresh.total_revenue,
            "Archive metadata written"
        );
        Ok(true)
    }

    /// Complete an interrupted run: archived orders exist, metadata does not.
    async fn repair_metadata(&self, archive_date: &str) -> Result<bool, ArchiveError> {
        if !self.metadata_records(archive_date).await?.is_empty() {
            return Ok(false);
        }
        if self.get_archived_orders_by_date(archive_date).await?.is_empty() {
            return Ok(false);
        }
        warn!(%archive_date, "Archived orders without metadata; writing it now");
        self.write_metadata(archive_date).await
    }

    async fn metadata_records(&self, archive_date: &str) -> Result<Vec<ArchiveMetadata>, ArchiveError> {
        let raw = self
            .store
            .list_where(ARCHIVE_METADATA, "archiveDate", &json!(archive_date))
            .await
            .map_err(ArchiveError::read(ARCHIVE_METADATA))?;
        Ok(decode_records(ARCHIVE_METADATA, raw))
    }

    // -----------------------------------------------------------------------
    // Retrieval
    // -----------------------------------------------------------------------

    pub async fn get_archived_orders_by_date(&self, date: &str) -> Result<Vec<ArchivedOrder>, ArchiveError> {
        let raw = self
            .store
            .list_where(ARCHIVED_ORDERS, "archived_date", &json!(date))
            .await
            .map_err(ArchiveError::read(ARCHIVED_ORDERS))?;
        Ok(decode_records(ARCHIVED_ORDERS, raw))
    }

    /// Archived orders with `start <= archived_date <= end` (lexical on
    /// `YYYY-MM-DD`).
    pub async fn get_archived_orders_by_date_range(
        &self,
        start: &str,
        end: &str,
    ) -> Result<Vec<ArchivedOrder>, ArchiveError> {
        let raw = self
            .store
            .list_all(ARCHIVED_ORDERS)
            .await
            .map_err(ArchiveError::read(ARCHIVED_ORDERS))?;
        Ok(decode_records::<ArchivedOrder>(ARCHIVED_ORDERS, raw)
            .into_iter()
            .filter(|o| o.archived_date.as_str() >= start && o.archived_date.as_str() <= end)
            .collect())
    }

    /// The metadata for `date`. If a replacement left two records behind,
    /// the newest `archivedAt` wins.
    pub async fn get_archive_metadata(&self, date: &str) -> Result<Option<ArchiveMetadata>, ArchiveError> {
        Ok(self
            .metadata_records(date)
            .await?
            .into_iter()
            .max_by(|a, b| a.archived_at.cmp(&b.archived_at)))
    }

    /// Distinct dates with metadata, most recent first.
    pub async fn get_available_archive_dates(&self) -> Result<Vec<String>, ArchiveError> {
        let raw = self
            .store
            .list_all(ARCHIVE_METADATA)
            .await
            .map_err(ArchiveError::read(ARCHIVE_METADATA))?;
        let dates: BTreeSet<String> = decode_records::<ArchiveMetadata>(ARCHIVE_METADATA, raw)
            .into_iter()
            .map(|m| m.archive_date)
            .collect();
        Ok(dates.into_iter().rev().collect())
    }
}

fn same_summary(a: &ArchiveMetadata, b: &ArchiveMetadata) -> bool {
    a.total_orders == b.total_orders && a.total_revenue == b.total_revenue && a.order_ids == b.order_ids
}

/// Live orders created on `date`. Records dated `date` that do not decode
/// come back as failures so the run cannot report them as archived.
fn live_orders_on(raw: Vec<Value>, date: NaiveDate) -> (Vec<Order>, Vec<FailedOrder>) {
    let mut orders = Vec::new();
    let mut failed = Vec::new();
    for record in raw {
        let id = record
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let on_date = record
            .get("created_at")
            .and_then(Value::as_str)
            .and_then(clock::local_date)
            == Some(date);
        match serde_json::from_value::<Order>(record) {
            Ok(order) => orders.push(order),
            Err(e) if on_date => {
                warn!(order_id = %id, error = %e, "Undecodable live order left in place");
                failed.push(FailedOrder {
                    order_id: id,
                    reason: format!("undecodable order: {e}"),
                });
            }
            Err(e) => debug!(order_id = %id, error = %e, "Skipping undecodable live order"),
        }
    }
    (aggregation::filter_by_date_range(orders, date, date), failed)
}

/// Split raw line items into the ids to delete and the decoded items to
/// embed. One undecodable item fails the whole order so nothing is deleted
/// without an archived copy.
fn decode_items(raw: Vec<Value>) -> Result<(Vec<String>, Vec<LineItem>), ArchiveError> {
    let mut ids = Vec::with_capacity(raw.len());
    let mut items = Vec::with_capacity(raw.len());
    for record in raw {
        let id = record
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let item: LineItem = serde_json::from_value(record).map_err(|e| ArchiveError::InvalidRecord {
            collection: ORDER_ITEMS,
            id: id.clone(),
            source: e,
        })?;
        ids.push(id);
        items.push(item);
    }
    Ok((ids, items))
}
