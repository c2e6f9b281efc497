//! Accounting export: aggregates plus the unaggregated order and line
//! ledgers, in the shape bookkeeping imports expect.

use serde::Serialize;

use super::{DataSource, ReportRange};
use crate::aggregation::{self, DailySales, PaymentBreakdown};
use crate::clock;
use crate::error::ReportError;
use crate::models::{ArchivedOrder, OrderWithItems, StoreSettings};
use crate::money::Money;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportTotals {
    pub order_count: u64,
    pub items_sold: u64,
    pub gross_revenue: Money,
    pub tax_collected: Money,
    pub net_sales: Money,
    pub average_order_value: Money,
    /// `gross - (net + tax)`; zero when the stored amounts agree.
    pub drift: Money,
}

/// One order, unaggregated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub order_id: String,
    pub created_at: String,
    pub customer: String,
    pub staff: String,
    pub payment_method: String,
    pub payment_status: String,
    pub item_count: usize,
    pub subtotal: Money,
    pub tax: Money,
    pub total: Money,
    /// `sum(line totals) - subtotal`.
    pub line_item_drift: Money,
}

/// One line item, unaggregated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineLedgerEntry {
    pub order_id: String,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub line_total: Money,
    /// `quantity × unit_price == line_total`.
    pub consistent: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountingExport {
    pub start_date: String,
    pub end_date: String,
    pub source: DataSource,
    pub currency: String,
    pub totals: ExportTotals,
    pub payments: PaymentBreakdown,
    pub daily: Vec<DailySales>,
    pub orders: Vec<LedgerEntry>,
    pub lines: Vec<LineLedgerEntry>,
}

impl AccountingExport {
    pub fn from_orders(range: &ReportRange, orders: &[OrderWithItems], settings: &StoreSettings) -> Self {
        let totals = aggregation::tax_and_net_totals(orders);
        let order_count = orders.len() as u64;

        let ledger = orders.iter().map(ledger_entry).collect();
        let lines = orders
            .iter()
            .flat_map(|o| {
                o.items.iter().map(|item| LineLedgerEntry {
                    order_id: o.order.id.clone(),
                    product_name: item.product_name.clone(),
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                    line_total: item.total,
                    consistent: item.is_consistent(),
                })
            })
            .collect();

        AccountingExport {
            start_date: range.start_str(),
            end_date: range.end_str(),
            source: range.source,
            currency: settings.currency.clone(),
            totals: ExportTotals {
                order_count,
                items_sold: aggregation::items_sold(aggregation::line_items(orders)),
                gross_revenue: totals.gross_revenue,
                tax_collected: totals.tax_collected,
                net_sales: totals.net_sales,
                average_order_value: aggregation::average_order_value(totals.gross_revenue, order_count),
                drift: totals.drift(),
            },
            payments: aggregation::sum_by_payment_method(orders),
            daily: aggregation::daily_breakdown(orders),
            orders: ledger,
            lines,
        }
    }

    /// Orders whose line totals disagree with their subtotal.
    pub fn drifted_orders(&self) -> impl Iterator<Item = &LedgerEntry> {
        self.orders.iter().filter(|e| !e.line_item_drift.is_zero())
    }

    /// Order ledger as CSV, one row per order.
    pub fn orders_csv(&self) -> Result<String, ReportError> {
        write_csv(self.orders.iter().map(|e| OrderRow {
            order_id: &e.order_id,
            created_at: &e.created_at,
            customer: &e.customer,
            staff: &e.staff,
            payment_method: &e.payment_method,
            payment_status: &e.payment_status,
            items: e.item_count,
            subtotal: e.subtotal.to_string(),
            tax: e.tax.to_string(),
            total: e.total.to_string(),
            drift: e.line_item_drift.to_string(),
        }))
    }

    /// Line ledger as CSV, one row per line item.
    pub fn lines_csv(&self) -> Result<String, ReportError> {
        write_csv(self.lines.iter().map(|l| LineRow {
            order_id: &l.order_id,
            product: &l.product_name,
            quantity: l.quantity,
            unit_price: l.unit_price.to_string(),
            line_total: l.line_total.to_string(),
            consistent: l.consistent,
        }))
    }

    /// Per-day totals as CSV.
    pub fn daily_csv(&self) -> Result<String, ReportError> {
        write_csv(self.daily.iter().map(|d| DailyRow {
            date: &d.date,
            orders: d.orders,
            gross: d.gross_revenue.to_string(),
            tax: d.tax_collected.to_string(),
            net: d.net_sales.to_string(),
        }))
    }
}

fn ledger_entry(o: &OrderWithItems) -> LedgerEntry {
    let order = &o.order;
    LedgerEntry {
        order_id: order.id.clone(),
        created_at: order.created_at.clone().unwrap_or_default(),
        customer: order.customer_name.clone().unwrap_or_default(),
        staff: order.staff_name.clone().unwrap_or_default(),
        payment_method: order.payment_method.to_string(),
        payment_status: order.payment_status.to_string(),
        item_count: o.items.len(),
        subtotal: order.subtotal,
        tax: order.tax,
        total: order.total,
        line_item_drift: aggregation::line_item_drift(o),
    }
}

// ---------------------------------------------------------------------------
// CSV rows
// ---------------------------------------------------------------------------

/// Column names, written even when there are no rows.
trait CsvRow: Serialize {
    const HEADERS: &'static [&'static str];
}

#[derive(Serialize)]
struct OrderRow<'a> {
    order_id: &'a str,
    created_at: &'a str,
    customer: &'a str,
    staff: &'a str,
    payment_method: &'a str,
    payment_status: &'a str,
    items: usize,
    subtotal: String,
    tax: String,
    total: String,
    drift: String,
}

impl CsvRow for OrderRow<'_> {
    const HEADERS: &'static [&'static str] = &[
        "Order ID", "Created At", "Customer", "Staff", "Payment Method", "Status", "Items",
        "Subtotal", "Tax", "Total", "Line Drift",
    ];
}

#[derive(Serialize)]
struct LineRow<'a> {
    order_id: &'a str,
    product: &'a str,
    quantity: u32,
    unit_price: String,
    line_total: String,
    consistent: bool,
}

impl CsvRow for LineRow<'_> {
    const HEADERS: &'static [&'static str] = &[
        "Order ID", "Product", "Quantity", "Unit Price", "Line Total", "Consistent",
    ];
}

#[derive(Serialize)]
struct DailyRow<'a> {
    date: &'a str,
    orders: u64,
    gross: String,
    tax: String,
    net: String,
}

impl CsvRow for DailyRow<'_> {
    const HEADERS: &'static [&'static str] = &["Date", "Orders", "Gross", "Tax", "Net"];
}

#[derive(Serialize)]
struct ArchiveRow<'a> {
    order_id: &'a str,
    date: String,
    time: String,
    customer: &'a str,
    staff: &'a str,
    payment_method: &'a str,
    status: &'a str,
    items: usize,
    subtotal: String,
    tax: String,
    total: String,
}

impl CsvRow for ArchiveRow<'_> {
    const HEADERS: &'static [&'static str] = &[
        "Order ID", "Date", "Time", "Customer", "Staff", "Payment Method", "Status", "Items",
        "Subtotal", "Tax", "Total",
    ];
}

fn non_empty<'a>(value: Option<&'a str>, fallback: &'a str) -> &'a str {
    value.map(str::trim).filter(|s| !s.is_empty()).unwrap_or(fallback)
}

/// The archive screen's CSV: one row per archived order, cancelled
/// included, with `Walk-in` / `Unknown` / `N/A` for missing names.
pub fn archived_orders_csv(orders: &[ArchivedOrder]) -> Result<String, ReportError> {
    write_csv(orders.iter().map(|o| {
        let ts = o.created_at.as_deref().and_then(clock::parse_local_timestamp);
        ArchiveRow {
            order_id: &o.original_order_id,
            date: ts.map(|t| t.format("%d/%m/%Y").to_string()).unwrap_or_default(),
            time: ts.map(|t| t.format("%H:%M").to_string()).unwrap_or_default(),
            customer: non_empty(o.customer_name.as_deref(), "Walk-in"),
            staff: non_empty(o.staff_name.as_deref(), "Unknown"),
            payment_method: non_empty(Some(o.payment_mode.as_str()), "N/A"),
            status: o.payment_status.as_str(),
            items: o.order_items.len(),
            subtotal: o.subtotal.to_string(),
            tax: o.tax.to_string(),
            total: o.total.to_string(),
        }
    }))
}

/// Serialize rows under a header line; no rows still yields the header.
fn write_csv<T: CsvRow>(rows: impl IntoIterator<Item = T>) -> Result<String, ReportError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(T::HEADERS)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush().map_err(csv::Error::from)?;
    let bytes = writer
        .into_inner()
        .map_err(|e| ReportError::Csv(csv::Error::from(e.into_error())))?;
    Ok(String::from_utf8(bytes)?)
}
