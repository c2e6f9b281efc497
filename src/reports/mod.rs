//! Settlement report and accounting export.
//!
//! Both generators load the same order set through [`load_orders`] and
//! compute every figure through [`crate::aggregation`], so for one range
//! they can never disagree. Cancelled orders are excluded from both.

pub mod accounting;
pub mod settlement;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::aggregation::{self, CategoryLookup};
use crate::clock;
use crate::error::ReportError;
use crate::models::{ArchivedOrder, LineItem, Order, OrderWithItems, StoreSettings};
use crate::store::{
    decode_records, DocumentStore, ARCHIVED_ORDERS, ORDERS, ORDER_ITEMS, PRODUCTS, SETTINGS,
};

pub use accounting::AccountingExport;
pub use settlement::SettlementReport;

/// Which collections a report reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    #[default]
    Live,
    Archived,
    Both,
}

impl DataSource {
    fn includes_live(self) -> bool {
        matches!(self, DataSource::Live | DataSource::Both)
    }

    fn includes_archive(self) -> bool {
        matches!(self, DataSource::Archived | DataSource::Both)
    }
}

/// Inclusive range of local calendar days plus the source to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub source: DataSource,
}

impl ReportRange {
    pub fn new(start: NaiveDate, end: NaiveDate, source: DataSource) -> Result<Self, ReportError> {
        if start > end {
            return Err(ReportError::InvalidRange {
                start: clock::format_date(start),
                end: clock::format_date(end),
            });
        }
        Ok(ReportRange { start, end, source })
    }

    pub fn day(date: NaiveDate, source: DataSource) -> Self {
        ReportRange {
            start: date,
            end: date,
            source,
        }
    }

    /// Build from `YYYY-MM-DD` strings.
    pub fn parse(start: &str, end: &str, source: DataSource) -> Result<Self, ReportError> {
        let parse = |s: &str| clock::parse_date(s).ok_or_else(|| ReportError::InvalidDate(s.to_string()));
        Self::new(parse(start)?, parse(end)?, source)
    }

    fn start_str(&self) -> String {
        clock::format_date(self.start)
    }

    fn end_str(&self) -> String {
        clock::format_date(self.end)
    }
}

// ---------------------------------------------------------------------------
// Product catalog
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ProductRecord {
    name: String,
    #[serde(default)]
    category: Option<String>,
}

/// Product name → category, from the `products` collection.
#[derive(Debug, Default, Clone)]
pub struct ProductCatalog {
    categories: HashMap<String, String>,
}

impl ProductCatalog {
    pub async fn load<S: DocumentStore>(store: &S) -> Result<Self, ReportError> {
        let raw = store
            .list_all(PRODUCTS)
            .await
            .map_err(ReportError::read(PRODUCTS))?;
        let categories = decode_records::<ProductRecord>(PRODUCTS, raw)
            .into_iter()
            .filter_map(|p| p.category.map(|c| (p.name, c)))
            .collect();
        Ok(ProductCatalog { categories })
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

impl CategoryLookup for ProductCatalog {
    fn category_for(&self, product_name: &str) -> Option<String> {
        self.categories.category_for(product_name)
    }
}

impl FromIterator<(String, String)> for ProductCatalog {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        ProductCatalog {
            categories: iter.into_iter().collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Store settings: the most recently written `settings` record, defaults
/// when there is none.
pub async fn load_settings<S: DocumentStore>(store: &S) -> Result<StoreSettings, ReportError> {
    let raw = store
        .list_all(SETTINGS)
        .await
        .map_err(ReportError::read(SETTINGS))?;
    Ok(decode_records::<StoreSettings>(SETTINGS, raw)
        .pop()
        .unwrap_or_default())
}

/// The non-cancelled orders of `range`, joined with their line items and
/// sorted by creation time.
///
/// With [`DataSource::Both`], an order caught between its archive write and
/// its live delete is counted once, from the archive.
pub async fn load_orders<S: DocumentStore>(
    store: &S,
    range: &ReportRange,
) -> Result<Vec<OrderWithItems>, ReportError> {
    let mut orders = Vec::new();

    if range.source.includes_archive() {
        let raw = store
            .list_all(ARCHIVED_ORDERS)
            .await
            .map_err(ReportError::read(ARCHIVED_ORDERS))?;
        let (start, end) = (range.start_str(), range.end_str());
        orders.extend(
            decode_records::<ArchivedOrder>(ARCHIVED_ORDERS, raw)
                .into_iter()
                .filter(|a| a.archived_date >= start && a.archived_date <= end)
                .map(|a| a.to_order_with_items()),
        );
    }

    if range.source.includes_live() {
        let archived_ids: HashSet<String> = orders.iter().map(|o| o.order.id.clone()).collect();
        let live = load_live_orders(store, range).await?;
        orders.extend(live.into_iter().filter(|o| !archived_ids.contains(&o.order.id)));
    }

    let orders = aggregation::filter_by_date_range(orders, range.start, range.end);
    let mut orders = aggregation::filter_excluding_cancelled(orders);
    orders.sort_by_key(|o| o.order.created_at.as_deref().and_then(clock::parse_local_timestamp));

    debug!(
        start = %range.start,
        end = %range.end,
        source = ?range.source,
        orders = orders.len(),
        "Report orders loaded"
    );
    Ok(orders)
}

async fn load_live_orders<S: DocumentStore>(
    store: &S,
    range: &ReportRange,
) -> Result<Vec<OrderWithItems>, ReportError> {
    let raw = store
        .list_all(ORDERS)
        .await
        .map_err(ReportError::read(ORDERS))?;
    let orders = aggregation::filter_by_date_range(
        decode_records::<Order>(ORDERS, raw),
        range.start,
        range.end,
    );
    if orders.is_empty() {
        return Ok(Vec::new());
    }

    let raw_items = store
        .list_all(ORDER_ITEMS)
        .await
        .map_err(ReportError::read(ORDER_ITEMS))?;
    let mut by_order: HashMap<String, Vec<LineItem>> = HashMap::new();
    for item in decode_records::<LineItem>(ORDER_ITEMS, raw_items) {
        by_order.entry(item.order_id.clone()).or_default().push(item);
    }

    Ok(orders
        .into_iter()
        .map(|order| {
            let items = by_order.remove(&order.id).unwrap_or_default();
            OrderWithItems { order, items }
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Generator
// ---------------------------------------------------------------------------

/// On-demand report entry points over one document store.
pub struct ReportGenerator<S> {
    store: Arc<S>,
    top_products_limit: usize,
}

impl<S: DocumentStore> ReportGenerator<S> {
    pub fn new(store: Arc<S>, top_products_limit: usize) -> Self {
        ReportGenerator {
            store,
            top_products_limit,
        }
    }

    pub async fn build_settlement_report(
        &self,
        range: &ReportRange,
    ) -> Result<SettlementReport, ReportError> {
        let orders = load_orders(self.store.as_ref(), range).await?;
        let catalog = ProductCatalog::load(self.store.as_ref()).await?;
        let settings = load_settings(self.store.as_ref()).await?;
        Ok(SettlementReport::from_orders(
            range,
            orders,
            &catalog,
            &settings,
            self.top_products_limit,
        ))
    }

    pub async fn build_accounting_export(
        &self,
        range: &ReportRange,
    ) -> Result<AccountingExport, ReportError> {
        let orders = load_orders(self.store.as_ref(), range).await?;
        let settings = load_settings(self.store.as_ref()).await?;
        Ok(AccountingExport::from_orders(range, &orders, &settings))
    }

    /// CSV of the archived orders filed under `date` (`YYYY-MM-DD`), as the
    /// archive screen downloads it. Cancelled orders are included.
    pub async fn export_archived_orders_csv(&self, date: &str) -> Result<String, ReportError> {
        if clock::parse_date(date).is_none() {
            return Err(ReportError::InvalidDate(date.to_string()));
        }
        let raw = self
            .store
            .list_where(ARCHIVED_ORDERS, "archived_date", &json!(date))
            .await
            .map_err(ReportError::read(ARCHIVED_ORDERS))?;
        let archived = decode_records::<ArchivedOrder>(ARCHIVED_ORDERS, raw);
        accounting::archived_orders_csv(&archived)
    }
}
